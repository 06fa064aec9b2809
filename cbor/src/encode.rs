/// A value that knows how to write itself to an [`Encoder`].
pub trait ToCbor {
    fn to_cbor(&self, encoder: &mut Encoder);
}

/// Streaming CBOR encoder over a growable byte buffer.
#[derive(Default)]
pub struct Encoder {
    data: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit_uint_minor(&mut self, major: u8, val: u64) {
        if val < 24 {
            self.data.push((major << 5) | (val as u8));
        } else if val <= u8::MAX as u64 {
            self.data.push((major << 5) | 24);
            self.data.push(val as u8);
        } else if val <= u16::MAX as u64 {
            self.data.push((major << 5) | 25);
            self.data.extend((val as u16).to_be_bytes());
        } else if val <= u32::MAX as u64 {
            self.data.push((major << 5) | 26);
            self.data.extend((val as u32).to_be_bytes());
        } else {
            self.data.push((major << 5) | 27);
            self.data.extend(val.to_be_bytes());
        }
    }

    pub fn emit_uint(&mut self, val: u64) {
        self.emit_uint_minor(0, val);
    }

    pub fn emit_bool(&mut self, val: bool) {
        self.data.push((7 << 5) | if val { 21 } else { 20 });
    }

    pub fn emit_f32(&mut self, val: f32) {
        self.data.push((7 << 5) | 26);
        self.data.extend(val.to_be_bytes());
    }

    pub fn emit_text(&mut self, val: &str) {
        self.emit_uint_minor(3, val.len() as u64);
        self.data.extend(val.as_bytes());
    }

    pub fn emit_bytes(&mut self, val: &[u8]) {
        self.emit_uint_minor(2, val.len() as u64);
        self.data.extend(val);
    }

    /// Appends pre-encoded CBOR verbatim.
    pub fn emit_raw(&mut self, data: &[u8]) {
        self.data.extend(data);
    }

    pub fn emit<T: ToCbor + ?Sized>(&mut self, value: &T) {
        value.to_cbor(self)
    }

    /// Emits an array. `Some(n)` writes a definite-length header and the
    /// closure must emit exactly `n` items; `None` writes an
    /// indefinite-length header and a break stop code after the closure
    /// returns.
    pub fn emit_array<F>(&mut self, count: Option<usize>, f: F)
    where
        F: FnOnce(&mut Array),
    {
        match count {
            Some(n) => self.emit_uint_minor(4, n as u64),
            None => self.data.push((4 << 5) | 31),
        }
        let mut a = Array {
            encoder: self,
            expected: count,
            emitted: 0,
        };
        f(&mut a);
        let emitted = a.emitted;
        match count {
            Some(n) if emitted != n => {
                panic!("definite-length array holds {emitted} items, declared {n}")
            }
            Some(_) => {}
            None => self.data.push(0xFF),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Scope for the items of a single array, tracking the item count.
pub struct Array<'a> {
    encoder: &'a mut Encoder,
    expected: Option<usize>,
    emitted: usize,
}

impl Array<'_> {
    fn count_item(&mut self) {
        self.emitted += 1;
        if let Some(n) = self.expected {
            if self.emitted > n {
                panic!("too many items for definite-length array of {n}");
            }
        }
    }

    pub fn emit_uint(&mut self, val: u64) {
        self.count_item();
        self.encoder.emit_uint(val);
    }

    pub fn emit_bool(&mut self, val: bool) {
        self.count_item();
        self.encoder.emit_bool(val);
    }

    pub fn emit_f32(&mut self, val: f32) {
        self.count_item();
        self.encoder.emit_f32(val);
    }

    pub fn emit_text(&mut self, val: &str) {
        self.count_item();
        self.encoder.emit_text(val);
    }

    pub fn emit_bytes(&mut self, val: &[u8]) {
        self.count_item();
        self.encoder.emit_bytes(val);
    }

    /// Appends one pre-encoded item verbatim.
    pub fn emit_raw(&mut self, data: &[u8]) {
        self.count_item();
        self.encoder.emit_raw(data);
    }

    pub fn emit<T: ToCbor + ?Sized>(&mut self, value: &T) {
        self.count_item();
        self.encoder.emit(value);
    }

    pub fn emit_array<F>(&mut self, count: Option<usize>, f: F)
    where
        F: FnOnce(&mut Array),
    {
        self.count_item();
        self.encoder.emit_array(count, f);
    }
}

impl ToCbor for u64 {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_uint(*self)
    }
}

impl ToCbor for bool {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_bool(*self)
    }
}

impl ToCbor for str {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_text(self)
    }
}

impl ToCbor for [u8] {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_bytes(self)
    }
}

/// Encodes a single value to a fresh buffer.
pub fn emit<T: ToCbor + ?Sized>(value: &T) -> Vec<u8> {
    let mut e = Encoder::new();
    e.emit(value);
    e.into_bytes()
}

/// Encodes a single array to a fresh buffer.
pub fn emit_array<F>(count: Option<usize>, f: F) -> Vec<u8>
where
    F: FnOnce(&mut Array),
{
    let mut e = Encoder::new();
    e.emit_array(count, f);
    e.into_bytes()
}
