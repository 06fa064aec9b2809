use super::decode::*;

#[test]
fn uints() {
    assert_eq!(Decoder::new(&[0x00]).pull_uint().unwrap(), 0);
    assert_eq!(Decoder::new(&[0x17]).pull_uint().unwrap(), 23);
    assert_eq!(Decoder::new(&[0x18, 0x64]).pull_uint().unwrap(), 100);
    assert_eq!(Decoder::new(&[0x19, 0x03, 0xe8]).pull_uint().unwrap(), 1000);
    assert_eq!(
        Decoder::new(&[0x1a, 0x00, 0x0f, 0x42, 0x40])
            .pull_uint()
            .unwrap(),
        1000000
    );
    assert_eq!(
        Decoder::new(&[0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff])
            .pull_uint()
            .unwrap(),
        u64::MAX
    );
}

#[test]
fn type_mismatch_does_not_consume() {
    let mut d = Decoder::new(&[0x61, 0x61]);
    assert!(matches!(
        d.pull_uint(),
        Err(Error::IncorrectType {
            expected: "unsigned integer",
            ..
        })
    ));
    // the cursor is rewound, the text is still readable
    assert_eq!(d.pull_text().unwrap(), "a");
}

#[test]
fn bools_and_floats() {
    assert!(!Decoder::new(&[0xf4]).pull_bool().unwrap());
    assert!(Decoder::new(&[0xf5]).pull_bool().unwrap());
    assert_eq!(
        Decoder::new(&[0xfa, 0x47, 0xc3, 0x50, 0x00])
            .pull_f32()
            .unwrap(),
        100000.0
    );
}

#[test]
fn strings() {
    assert_eq!(
        Decoder::new(&[0x64, 0x49, 0x45, 0x54, 0x46])
            .pull_text()
            .unwrap(),
        "IETF"
    );
    assert_eq!(
        Decoder::new(&[0x44, 0x01, 0x02, 0x03, 0x04])
            .pull_bytes()
            .unwrap(),
        &[0x01, 0x02, 0x03, 0x04]
    );
    // chunked strings are rejected
    assert!(matches!(
        Decoder::new(&[0x5f, 0x41, 0x01, 0xff]).pull_bytes(),
        Err(Error::ChunkedString)
    ));
}

#[test]
fn truncated_input() {
    assert!(matches!(
        Decoder::new(&[0x19, 0x03]).pull_uint(),
        Err(Error::NotEnoughData)
    ));
    assert!(matches!(
        Decoder::new(&[0x62, 0x61]).pull_text(),
        Err(Error::NotEnoughData)
    ));
}

#[test]
fn arrays() {
    let mut d = Decoder::new(&[0x83, 0x01, 0x02, 0x03]);
    assert_eq!(d.pull_array().unwrap(), Some(3));
    assert_eq!(d.pull_uint().unwrap(), 1);
    assert_eq!(d.pull_uint().unwrap(), 2);
    assert_eq!(d.pull_uint().unwrap(), 3);
    assert!(d.is_empty());
}

#[test]
fn indefinite_arrays() {
    let mut d = Decoder::new(&[0x9f, 0x01, 0x82, 0x02, 0x03, 0xff]);
    assert_eq!(d.pull_array().unwrap(), None);
    assert_eq!(d.pull_uint().unwrap(), 1);
    assert!(!d.at_break());
    assert_eq!(d.pull_array().unwrap(), Some(2));
    assert_eq!(d.pull_uint().unwrap(), 2);
    assert_eq!(d.pull_uint().unwrap(), 3);
    assert!(d.at_break());
    d.pull_break().unwrap();
    assert!(d.is_empty());
}

#[test]
fn skip_values() {
    // [1, [2, 3], "x", h'00', 4]
    let mut d = Decoder::new(&[0x85, 0x01, 0x82, 0x02, 0x03, 0x61, 0x78, 0x41, 0x00, 0x04]);
    assert_eq!(d.pull_array().unwrap(), Some(5));
    d.skip_value().unwrap(); // 1
    d.skip_value().unwrap(); // [2, 3]
    d.skip_value().unwrap(); // "x"
    d.skip_value().unwrap(); // h'00'
    assert_eq!(d.pull_uint().unwrap(), 4);
    assert!(d.is_empty());
}

#[test]
fn skip_tracks_offset() {
    let mut d = Decoder::new(&[0x82, 0x02, 0x03, 0x04]);
    assert_eq!(d.offset(), 0);
    d.skip_value().unwrap();
    assert_eq!(d.offset(), 3);
    assert_eq!(d.pull_uint().unwrap(), 4);
}

#[test]
fn skip_recursion_bound() {
    // 20 nested indefinite arrays, never terminated
    let data = [0x9f; 20];
    assert!(matches!(
        Decoder::new(&data).skip_value(),
        Err(Error::MaxRecursion | Error::NotEnoughData)
    ));
}
