//! The primary block (RFC 9171 §4.3.1).

use crate::bundle_flags::BundleFlags;
use crate::crc::{self, CrcType};
use crate::creation_timestamp::CreationTimestamp;
use crate::eid::Eid;
use crate::Error;
use tundra_cbor::{decode, encode};

/// The only bundle protocol version this node speaks.
pub const BP_VERSION: u64 = 7;

/// Fragment bookkeeping, present exactly when the is-fragment flag is set.
/// This node never fragments, but a received fragment's fields are carried
/// through untouched.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FragmentInfo {
    pub offset: u64,
    pub total_adu_length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryBlock {
    pub flags: BundleFlags,
    pub crc_type: CrcType,
    pub destination: Eid,
    pub source: Eid,
    pub report_to: Eid,
    pub timestamp: CreationTimestamp,
    /// Lifetime in milliseconds after creation.
    pub lifetime: u64,
    pub fragment_info: Option<FragmentInfo>,
}

impl PrimaryBlock {
    pub fn new(
        destination: Eid,
        source: Eid,
        report_to: Eid,
        timestamp: CreationTimestamp,
        lifetime: u64,
        crc_type: CrcType,
    ) -> Self {
        Self {
            flags: BundleFlags::default(),
            crc_type,
            destination,
            source,
            report_to,
            timestamp,
            lifetime,
            fragment_info: None,
        }
    }

    /// Serializes the block as a definite array of 8–11 items with the CRC
    /// patched into the trailing slot.
    pub fn to_bytes(&self) -> Vec<u8> {
        let fragment = self.flags.is_fragment;
        let items = 8 + if fragment { 2 } else { 0 } + usize::from(self.crc_type != CrcType::None);
        let mut bytes = encode::emit_array(Some(items), |a| {
            a.emit_uint(BP_VERSION);
            a.emit_uint(u64::from(self.flags));
            a.emit_uint(u64::from(self.crc_type));
            a.emit(&self.destination);
            a.emit(&self.source);
            a.emit(&self.report_to);
            a.emit(&self.timestamp);
            a.emit_uint(self.lifetime);
            if fragment {
                let info = self.fragment_info.unwrap_or(FragmentInfo {
                    offset: 0,
                    total_adu_length: 0,
                });
                a.emit_uint(info.offset);
                a.emit_uint(info.total_adu_length);
            }
            if self.crc_type != CrcType::None {
                a.emit_bytes(&[0u8; 4][..self.crc_type.width()]);
            }
        });
        crc::patch(self.crc_type, &mut bytes);
        bytes
    }

    /// Parses the primary block from the decoder, verifying its CRC over the
    /// raw input bytes.
    pub fn parse(dec: &mut decode::Decoder, raw: &[u8]) -> Result<Self, Error> {
        let start = dec.offset();
        let Some(items @ 8..=11) = dec.pull_array()? else {
            return Err(Error::InvalidStructure(
                "primary block must be a definite array of 8 to 11 items",
            ));
        };

        let version = dec.pull_uint()?;
        if version != BP_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let flags = BundleFlags::from(dec.pull_uint()?);
        let crc_type = CrcType::try_from(dec.pull_uint()?)?;
        let destination = Eid::parse(dec)?;
        let source = Eid::parse(dec)?;
        let report_to = Eid::parse(dec)?;
        let timestamp = CreationTimestamp::parse(dec)?;
        let lifetime = dec.pull_uint()?;

        let fragment_info = if flags.is_fragment {
            Some(FragmentInfo {
                offset: dec.pull_uint()?,
                total_adu_length: dec.pull_uint()?,
            })
        } else {
            None
        };

        let expected =
            8 + if flags.is_fragment { 2 } else { 0 } + u64::from(crc_type != CrcType::None);
        if items != expected {
            return Err(Error::InvalidStructure(
                "primary block item count does not match its flags and CRC type",
            ));
        }
        if crc_type != CrcType::None && dec.pull_bytes()?.len() != crc_type.width() {
            return Err(Error::InvalidStructure("CRC value has the wrong length"));
        }

        crc::verify(crc_type, &raw[start..dec.offset()])?;

        Ok(Self {
            flags,
            crc_type,
            destination,
            source,
            report_to,
            timestamp,
            lifetime,
            fragment_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtn_time::DtnTime;

    fn sample(crc_type: CrcType) -> PrimaryBlock {
        PrimaryBlock::new(
            "dtn:dest".parse().unwrap(),
            "dtn:source".parse().unwrap(),
            Eid::Null,
            CreationTimestamp::new(DtnTime::new(1_700_000_000_000), 3),
            60_000,
            crc_type,
        )
    }

    fn roundtrip(block: &PrimaryBlock) -> PrimaryBlock {
        let bytes = block.to_bytes();
        PrimaryBlock::parse(&mut decode::Decoder::new(&bytes), &bytes).unwrap()
    }

    #[test]
    fn roundtrip_all_crc_types() {
        for crc_type in [CrcType::None, CrcType::X25, CrcType::Crc32c] {
            let block = sample(crc_type);
            assert_eq!(roundtrip(&block), block);
        }
    }

    #[test]
    fn fragment_fields_preserved() {
        let mut block = sample(CrcType::None);
        block.flags.is_fragment = true;
        block.fragment_info = Some(FragmentInfo {
            offset: 512,
            total_adu_length: 4096,
        });
        assert_eq!(roundtrip(&block), block);
    }

    #[test]
    fn wrong_version_rejected() {
        let bytes = sample(CrcType::None).to_bytes();
        // item 0 is the version: patch 7 -> 6
        let mut bad = bytes.clone();
        assert_eq!(bad[1], 0x07);
        bad[1] = 0x06;
        assert!(matches!(
            PrimaryBlock::parse(&mut decode::Decoder::new(&bad), &bad),
            Err(Error::UnsupportedVersion(6))
        ));
    }

    #[test]
    fn crc32c_slot_matches_recomputation() {
        let bytes = sample(CrcType::Crc32c).to_bytes();
        let mut zeroed = bytes.clone();
        let at = zeroed.len() - 4;
        zeroed[at..].fill(0);
        crc::patch(CrcType::Crc32c, &mut zeroed);
        assert_eq!(zeroed, bytes);
    }
}
