use super::encode::*;

// Expected bytes taken from RFC 8949 Appendix A.

#[test]
fn uints() {
    assert_eq!(emit(&0u64), vec![0x00]);
    assert_eq!(emit(&1u64), vec![0x01]);
    assert_eq!(emit(&10u64), vec![0x0a]);
    assert_eq!(emit(&23u64), vec![0x17]);
    assert_eq!(emit(&24u64), vec![0x18, 0x18]);
    assert_eq!(emit(&25u64), vec![0x18, 0x19]);
    assert_eq!(emit(&100u64), vec![0x18, 0x64]);
    assert_eq!(emit(&1000u64), vec![0x19, 0x03, 0xe8]);
    assert_eq!(emit(&1000000u64), vec![0x1a, 0x00, 0x0f, 0x42, 0x40]);
    assert_eq!(
        emit(&1000000000000u64),
        vec![0x1b, 0x00, 0x00, 0x00, 0xe8, 0xd4, 0xa5, 0x10, 0x00]
    );
    assert_eq!(
        emit(&18446744073709551615u64),
        vec![0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
    );
}

#[test]
fn bools() {
    assert_eq!(emit(&false), vec![0xf4]);
    assert_eq!(emit(&true), vec![0xf5]);
}

#[test]
fn floats() {
    let mut e = Encoder::new();
    e.emit_f32(100000.0);
    assert_eq!(e.into_bytes(), vec![0xfa, 0x47, 0xc3, 0x50, 0x00]);

    let mut e = Encoder::new();
    e.emit_f32(3.4028234663852886e38);
    assert_eq!(e.into_bytes(), vec![0xfa, 0x7f, 0x7f, 0xff, 0xff]);
}

#[test]
fn strings() {
    assert_eq!(emit(""), vec![0x60]);
    assert_eq!(emit("a"), vec![0x61, 0x61]);
    assert_eq!(emit("IETF"), vec![0x64, 0x49, 0x45, 0x54, 0x46]);
    assert_eq!(emit("\"\\"), vec![0x62, 0x22, 0x5c]);
    assert_eq!(emit("\u{00fc}"), vec![0x62, 0xc3, 0xbc]);
}

#[test]
fn byte_strings() {
    assert_eq!(emit::<[u8]>(&[]), vec![0x40]);
    assert_eq!(
        emit::<[u8]>(&[0x01, 0x02, 0x03, 0x04]),
        vec![0x44, 0x01, 0x02, 0x03, 0x04]
    );
}

#[test]
fn arrays() {
    assert_eq!(emit_array(Some(0), |_| {}), vec![0x80]);

    assert_eq!(
        emit_array(Some(3), |a| {
            a.emit_uint(1);
            a.emit_uint(2);
            a.emit_uint(3);
        }),
        vec![0x83, 0x01, 0x02, 0x03]
    );

    assert_eq!(
        emit_array(Some(3), |a| {
            a.emit_uint(1);
            a.emit_array(Some(2), |a| {
                a.emit_uint(2);
                a.emit_uint(3);
            });
            a.emit_array(Some(2), |a| {
                a.emit_uint(4);
                a.emit_uint(5);
            });
        }),
        vec![0x83, 0x01, 0x82, 0x02, 0x03, 0x82, 0x04, 0x05]
    );

    let many = emit_array(Some(25), |a| {
        for i in 1..=25u64 {
            a.emit_uint(i);
        }
    });
    assert_eq!(many[..2], [0x98, 0x19]);
}

#[test]
fn indefinite_arrays() {
    assert_eq!(emit_array(None, |_| {}), vec![0x9f, 0xff]);

    assert_eq!(
        emit_array(None, |a| {
            a.emit_uint(1);
            a.emit_array(Some(2), |a| {
                a.emit_uint(2);
                a.emit_uint(3);
            });
        }),
        vec![0x9f, 0x01, 0x82, 0x02, 0x03, 0xff]
    );
}

#[test]
#[should_panic(expected = "declared")]
fn definite_array_underflow_panics() {
    emit_array(Some(2), |a| {
        a.emit_uint(1);
    });
}

#[test]
#[should_panic(expected = "too many items")]
fn definite_array_overflow_panics() {
    emit_array(Some(1), |a| {
        a.emit_uint(1);
        a.emit_uint(2);
    });
}
