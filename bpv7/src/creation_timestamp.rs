use crate::dtn_time::DtnTime;
use crate::Error;
use tundra_cbor::{decode, encode};

/// The creation timestamp of a bundle: DTN creation time plus a sequence
/// number disambiguating bundles created in the same millisecond (or, for
/// sources without a synchronized clock, all bundles from that source).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CreationTimestamp {
    pub creation_time: DtnTime,
    pub sequence_number: u64,
}

impl CreationTimestamp {
    pub fn new(creation_time: DtnTime, sequence_number: u64) -> Self {
        Self {
            creation_time,
            sequence_number,
        }
    }

    pub fn parse(dec: &mut decode::Decoder) -> Result<Self, Error> {
        let Some(2) = dec.pull_array()? else {
            return Err(Error::InvalidStructure(
                "creation timestamp must be a 2-element array",
            ));
        };
        Ok(Self {
            creation_time: DtnTime::new(dec.pull_uint()?),
            sequence_number: dec.pull_uint()?,
        })
    }
}

impl encode::ToCbor for CreationTimestamp {
    fn to_cbor(&self, encoder: &mut encode::Encoder) {
        encoder.emit_array(Some(2), |a| {
            a.emit_uint(self.creation_time.millisecs());
            a.emit_uint(self.sequence_number);
        });
    }
}

impl std::fmt::Display for CreationTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}",
            self.creation_time.millisecs(),
            self.sequence_number
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let ts = CreationTimestamp::new(DtnTime::new(1_700_000_000_000), 42);
        let bytes = tundra_cbor::encode::emit(&ts);
        let mut dec = decode::Decoder::new(&bytes);
        assert_eq!(CreationTimestamp::parse(&mut dec).unwrap(), ts);
    }

    #[test]
    fn display_is_id_fragment() {
        let ts = CreationTimestamp::new(DtnTime::ZERO, 7);
        assert_eq!(ts.to_string(), "0-7");
    }
}
