//! Canonical blocks (RFC 9171 §4.3.2) and the well-known extension blocks.
//!
//! There is no runtime polymorphism over block types: a canonical block is a
//! plain struct, and the well-known extension blocks (previous-node,
//! bundle-age, hop-count) are factory constructors that pre-encode the
//! block-type-specific data.

use crate::block_flags::BlockFlags;
use crate::crc::{self, CrcType};
use crate::eid::Eid;
use crate::Error;
use tundra_cbor::{decode, encode};

/// Block type codes this node understands.
pub mod type_code {
    pub const PAYLOAD: u64 = 1;
    pub const PREVIOUS_NODE: u64 = 6;
    pub const BUNDLE_AGE: u64 = 7;
    pub const HOP_COUNT: u64 = 10;

    /// Whether this node knows how to process a block of the given type.
    pub fn is_known(block_type: u64) -> bool {
        matches!(block_type, PAYLOAD | PREVIOUS_NODE | BUNDLE_AGE | HOP_COUNT)
    }
}

/// A canonical block: type code, number, flags, CRC type and opaque
/// block-type-specific data. CRC bytes are not stored; they are recomputed
/// on every serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalBlock {
    pub block_type: u64,
    /// 1 is reserved for the payload block; 0 requests automatic numbering
    /// on insertion.
    pub block_number: u64,
    pub flags: BlockFlags,
    pub crc_type: CrcType,
    pub data: Box<[u8]>,
}

impl CanonicalBlock {
    pub fn new(block_type: u64, flags: BlockFlags, crc_type: CrcType, data: Box<[u8]>) -> Self {
        Self {
            block_type,
            block_number: 0,
            flags,
            crc_type,
            data,
        }
    }

    /// The payload block, always block number 1.
    pub fn payload(data: &[u8], crc_type: CrcType) -> Self {
        Self {
            block_type: type_code::PAYLOAD,
            block_number: 1,
            flags: BlockFlags::default(),
            crc_type,
            data: data.into(),
        }
    }

    /// A previous-node block naming the forwarding node. Marked
    /// discard-if-unprocessable so nodes that do not know the type drop the
    /// block, not the bundle.
    pub fn previous_node(eid: &Eid, crc_type: CrcType) -> Self {
        Self {
            block_type: type_code::PREVIOUS_NODE,
            block_number: 0,
            flags: BlockFlags {
                discard_block_unprocessable: true,
                ..Default::default()
            },
            crc_type,
            data: tundra_cbor::encode::emit(eid).into(),
        }
    }

    /// A bundle-age block carrying the bundle's age in milliseconds.
    pub fn bundle_age(age_ms: u64, crc_type: CrcType) -> Self {
        Self {
            block_type: type_code::BUNDLE_AGE,
            block_number: 0,
            flags: BlockFlags::default(),
            crc_type,
            data: tundra_cbor::encode::emit(&age_ms).into(),
        }
    }

    /// A hop-count block `[hop_limit, hop_count]`.
    pub fn hop_count(hop_limit: u64, hop_count: u64, crc_type: CrcType) -> Self {
        let data = encode::emit_array(Some(2), |a| {
            a.emit_uint(hop_limit);
            a.emit_uint(hop_count);
        });
        Self {
            block_type: type_code::HOP_COUNT,
            block_number: 0,
            flags: BlockFlags::default(),
            crc_type,
            data: data.into(),
        }
    }

    /// Reads the age of a bundle-age block. `None` for any other type or
    /// undecodable data.
    pub fn age(&self) -> Option<u64> {
        if self.block_type != type_code::BUNDLE_AGE {
            return None;
        }
        decode::Decoder::new(&self.data).pull_uint().ok()
    }

    pub fn set_age(&mut self, age_ms: u64) {
        if self.block_type == type_code::BUNDLE_AGE {
            self.data = tundra_cbor::encode::emit(&age_ms).into();
        }
    }

    /// Reads `(hop_limit, hop_count)` from a hop-count block.
    pub fn hop_info(&self) -> Option<(u64, u64)> {
        if self.block_type != type_code::HOP_COUNT {
            return None;
        }
        let mut dec = decode::Decoder::new(&self.data);
        match dec.pull_array() {
            Ok(Some(2)) => Some((dec.pull_uint().ok()?, dec.pull_uint().ok()?)),
            _ => None,
        }
    }

    pub fn set_hop_info(&mut self, hop_limit: u64, hop_count: u64) {
        if self.block_type == type_code::HOP_COUNT {
            self.data = encode::emit_array(Some(2), |a| {
                a.emit_uint(hop_limit);
                a.emit_uint(hop_count);
            })
            .into();
        }
    }

    /// Serializes the block as a definite array of 5 or 6 items with the CRC
    /// patched into the trailing slot.
    pub fn to_bytes(&self) -> Vec<u8> {
        let items = if self.crc_type == CrcType::None { 5 } else { 6 };
        let mut bytes = encode::emit_array(Some(items), |a| {
            a.emit_uint(self.block_type);
            a.emit_uint(self.block_number);
            a.emit_uint(u64::from(self.flags));
            a.emit_uint(u64::from(self.crc_type));
            a.emit_bytes(&self.data);
            if self.crc_type != CrcType::None {
                a.emit_bytes(&[0u8; 4][..self.crc_type.width()]);
            }
        });
        crc::patch(self.crc_type, &mut bytes);
        bytes
    }

    /// Parses one canonical block from the decoder, verifying its CRC over
    /// the raw input bytes.
    pub fn parse(dec: &mut decode::Decoder, raw: &[u8]) -> Result<Self, Error> {
        let start = dec.offset();
        let Some(items @ 5..=6) = dec.pull_array()? else {
            return Err(Error::InvalidStructure(
                "canonical block must be a definite array of 5 or 6 items",
            ));
        };

        let block_type = dec.pull_uint()?;
        let block_number = dec.pull_uint()?;
        let flags = BlockFlags::from(dec.pull_uint()?);
        let crc_type = CrcType::try_from(dec.pull_uint()?)?;
        let data: Box<[u8]> = dec.pull_bytes()?.into();

        match (items, crc_type) {
            (5, CrcType::None) => {}
            (5, _) => return Err(Error::InvalidStructure("block is missing its CRC value")),
            (6, CrcType::None) => {
                return Err(Error::InvalidStructure("block has a CRC value but type 0"))
            }
            (6, _) => {
                if dec.pull_bytes()?.len() != crc_type.width() {
                    return Err(Error::InvalidStructure("CRC value has the wrong length"));
                }
            }
            _ => unreachable!(),
        }

        crc::verify(crc_type, &raw[start..dec.offset()])?;

        Ok(Self {
            block_type,
            block_number,
            flags,
            crc_type,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(block: &CanonicalBlock) -> CanonicalBlock {
        let bytes = block.to_bytes();
        CanonicalBlock::parse(&mut decode::Decoder::new(&bytes), &bytes).unwrap()
    }

    #[test]
    fn payload_roundtrip() {
        let mut block = CanonicalBlock::payload(b"hello", CrcType::None);
        block.block_number = 1;
        assert_eq!(roundtrip(&block), block);
    }

    #[test]
    fn crc_protected_roundtrip() {
        for crc_type in [CrcType::X25, CrcType::Crc32c] {
            let mut block = CanonicalBlock::payload(b"hello", crc_type);
            block.block_number = 1;
            assert_eq!(roundtrip(&block), block);
        }
    }

    #[test]
    fn corrupt_byte_fails_crc() {
        let mut block = CanonicalBlock::bundle_age(1234, CrcType::X25);
        block.block_number = 2;
        let bytes = block.to_bytes();
        for i in 0..bytes.len() {
            let mut corrupt = bytes.clone();
            corrupt[i] ^= 0x40;
            assert!(
                CanonicalBlock::parse(&mut decode::Decoder::new(&corrupt), &corrupt).is_err(),
                "flipped byte {i} went undetected"
            );
        }
    }

    #[test]
    fn age_accessors() {
        let mut block = CanonicalBlock::bundle_age(100, CrcType::None);
        assert_eq!(block.age(), Some(100));
        block.set_age(5000);
        assert_eq!(block.age(), Some(5000));
        assert_eq!(block.hop_info(), None);
    }

    #[test]
    fn hop_accessors() {
        let mut block = CanonicalBlock::hop_count(32, 3, CrcType::None);
        assert_eq!(block.hop_info(), Some((32, 3)));
        block.set_hop_info(32, 4);
        assert_eq!(block.hop_info(), Some((32, 4)));
        assert_eq!(block.age(), None);
    }

    #[test]
    fn previous_node_data_is_bare_eid() {
        let block = CanonicalBlock::previous_node(&Eid::Dtn("relay".into()), CrcType::None);
        let mut dec = decode::Decoder::new(&block.data);
        assert_eq!(Eid::parse(&mut dec).unwrap(), Eid::Dtn("relay".into()));
        assert!(block.flags.discard_block_unprocessable);
    }
}
