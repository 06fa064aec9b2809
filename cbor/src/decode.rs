use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("not enough data for encoded value")]
    NotEnoughData,

    #[error("incorrect type, expecting {expected}, found {found}")]
    IncorrectType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid minor-type value {0}")]
    InvalidMinorValue(u8),

    #[error("indefinite-length string chunks are not supported")]
    ChunkedString,

    #[error("unexpected break stop code")]
    UnexpectedBreak,

    #[error("maximum recursion depth reached")]
    MaxRecursion,

    #[error("text string is not valid UTF-8")]
    InvalidUtf8(#[from] core::str::Utf8Error),
}

const MAX_SKIP_DEPTH: usize = 16;

/// The argument carried by a data-item head.
enum Arg {
    Value(u64),
    Indefinite,
}

fn type_name(major: u8) -> &'static str {
    match major {
        0 => "unsigned integer",
        1 => "negative integer",
        2 => "byte string",
        3 => "text string",
        4 => "array",
        5 => "map",
        6 => "tag",
        _ => "simple or float",
    }
}

/// Cursor-style CBOR reader over a borrowed byte slice.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Byte offset of the next unread item.
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let end = self.pos.checked_add(n).ok_or(Error::NotEnoughData)?;
        if end > self.data.len() {
            return Err(Error::NotEnoughData);
        }
        let s = &self.data[self.pos..end];
        self.pos = end;
        Ok(s)
    }

    fn peek(&self) -> Result<u8, Error> {
        self.data.get(self.pos).copied().ok_or(Error::NotEnoughData)
    }

    /// Reads one data-item head, advancing past it.
    fn read_head(&mut self) -> Result<(u8, Arg), Error> {
        let ib = self.take(1)?[0];
        let major = ib >> 5;
        let minor = ib & 0x1F;
        let arg = match minor {
            0..=23 => Arg::Value(minor as u64),
            24 => Arg::Value(self.take(1)?[0] as u64),
            25 => Arg::Value(u16::from_be_bytes(self.take(2)?.try_into().unwrap()) as u64),
            26 => Arg::Value(u32::from_be_bytes(self.take(4)?.try_into().unwrap()) as u64),
            27 => Arg::Value(u64::from_be_bytes(self.take(8)?.try_into().unwrap())),
            31 => Arg::Indefinite,
            m => return Err(Error::InvalidMinorValue(m)),
        };
        Ok((major, arg))
    }

    fn expect_head(&mut self, want: u8, expected: &'static str) -> Result<Arg, Error> {
        let saved = self.pos;
        let (major, arg) = self.read_head()?;
        if major != want {
            self.pos = saved;
            return Err(Error::IncorrectType {
                expected,
                found: type_name(major),
            });
        }
        Ok(arg)
    }

    pub fn pull_uint(&mut self) -> Result<u64, Error> {
        match self.expect_head(0, "unsigned integer")? {
            Arg::Value(v) => Ok(v),
            Arg::Indefinite => Err(Error::InvalidMinorValue(31)),
        }
    }

    pub fn pull_bool(&mut self) -> Result<bool, Error> {
        let saved = self.pos;
        match self.read_head()? {
            (7, Arg::Value(20)) => Ok(false),
            (7, Arg::Value(21)) => Ok(true),
            (major, _) => {
                self.pos = saved;
                Err(Error::IncorrectType {
                    expected: "boolean",
                    found: type_name(major),
                })
            }
        }
    }

    pub fn pull_f32(&mut self) -> Result<f32, Error> {
        let saved = self.pos;
        let ib = self.take(1)?[0];
        if ib == (7 << 5) | 26 {
            return Ok(f32::from_be_bytes(self.take(4)?.try_into().unwrap()));
        }
        self.pos = saved;
        Err(Error::IncorrectType {
            expected: "single-precision float",
            found: type_name(ib >> 5),
        })
    }

    pub fn pull_bytes(&mut self) -> Result<&'a [u8], Error> {
        match self.expect_head(2, "byte string")? {
            Arg::Value(len) => self.take(len as usize),
            Arg::Indefinite => Err(Error::ChunkedString),
        }
    }

    pub fn pull_text(&mut self) -> Result<&'a str, Error> {
        match self.expect_head(3, "text string")? {
            Arg::Value(len) => Ok(core::str::from_utf8(self.take(len as usize)?)?),
            Arg::Indefinite => Err(Error::ChunkedString),
        }
    }

    /// Reads an array head. `Some(n)` for a definite-length array of `n`
    /// items, `None` for an indefinite-length array (terminated by a break
    /// stop code, see [`pull_break`](Self::pull_break)).
    pub fn pull_array(&mut self) -> Result<Option<u64>, Error> {
        match self.expect_head(4, "array")? {
            Arg::Value(n) => Ok(Some(n)),
            Arg::Indefinite => Ok(None),
        }
    }

    /// True when the next byte is a break stop code.
    pub fn at_break(&self) -> bool {
        matches!(self.peek(), Ok(0xFF))
    }

    pub fn pull_break(&mut self) -> Result<(), Error> {
        if self.peek()? == 0xFF {
            self.pos += 1;
            Ok(())
        } else {
            Err(Error::IncorrectType {
                expected: "break stop code",
                found: type_name(self.peek()? >> 5),
            })
        }
    }

    /// Skips one complete data item, recursing into nested containers.
    pub fn skip_value(&mut self) -> Result<(), Error> {
        self.skip_inner(MAX_SKIP_DEPTH)
    }

    fn skip_inner(&mut self, depth: usize) -> Result<(), Error> {
        if depth == 0 {
            return Err(Error::MaxRecursion);
        }
        if self.at_break() {
            return Err(Error::UnexpectedBreak);
        }
        let (major, arg) = self.read_head()?;
        match (major, arg) {
            (0 | 1, _) => Ok(()),
            (2 | 3, Arg::Value(len)) => self.take(len as usize).map(|_| ()),
            (2 | 3, Arg::Indefinite) => {
                while !self.at_break() {
                    self.skip_inner(depth - 1)?;
                }
                self.pull_break()
            }
            (4 | 5, Arg::Value(n)) => {
                let items = if major == 5 { n * 2 } else { n };
                for _ in 0..items {
                    self.skip_inner(depth - 1)?;
                }
                Ok(())
            }
            (4 | 5, Arg::Indefinite) => {
                while !self.at_break() {
                    self.skip_inner(depth - 1)?;
                }
                self.pull_break()
            }
            (6, _) => self.skip_inner(depth - 1),
            (7, Arg::Value(v)) => {
                // 25/26/27 already consumed their payload as the head argument
                let _ = v;
                Ok(())
            }
            (7, Arg::Indefinite) => Err(Error::UnexpectedBreak),
            _ => unreachable!(),
        }
    }
}
