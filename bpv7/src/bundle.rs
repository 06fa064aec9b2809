//! Bundle assembly and the RFC 9171 top-level codec.

use crate::block::{type_code, CanonicalBlock};
use crate::crc::CrcType;
use crate::dtn_time::local_millis;
use crate::eid::Eid;
use crate::primary_block::PrimaryBlock;
use crate::Error;
use std::collections::BTreeSet;
use tundra_cbor::decode::Decoder;

/// A bundle: exactly one primary block, exactly one payload block (block
/// number 1), and zero or more extension blocks with unique numbers ≥ 2.
///
/// `received_at` is stamped in node-local milliseconds when the bundle is
/// constructed or decoded; storage restores it when a persisted bundle is
/// reloaded. The three `has_*` flags mirror extension-block presence and are
/// maintained by the insert/remove operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub primary: PrimaryBlock,
    payload: CanonicalBlock,
    extensions: Vec<CanonicalBlock>,
    used_numbers: BTreeSet<u64>,
    pub received_at: u64,
    pub has_previous_node: bool,
    pub has_bundle_age: bool,
    pub has_hop_count: bool,
}

impl Bundle {
    /// The minimum valid bundle: primary block plus payload.
    pub fn new(primary: PrimaryBlock, mut payload: CanonicalBlock) -> Self {
        payload.block_number = 1;
        Self {
            primary,
            payload,
            extensions: Vec::new(),
            used_numbers: BTreeSet::from([1]),
            received_at: local_millis(),
            has_previous_node: false,
            has_bundle_age: false,
            has_hop_count: false,
        }
    }

    /// The bundle ID: `<source>-<creation_time>-<sequence>`, with a
    /// `-<fragment_offset>` suffix for fragments.
    pub fn id(&self) -> String {
        let mut id = format!("{}-{}", self.primary.source, self.primary.timestamp);
        if self.primary.flags.is_fragment {
            let offset = self.primary.fragment_info.map(|f| f.offset).unwrap_or(0);
            id.push('-');
            id.push_str(&offset.to_string());
        }
        id
    }

    pub fn destination(&self) -> &Eid {
        &self.primary.destination
    }

    pub fn source(&self) -> &Eid {
        &self.primary.source
    }

    pub fn payload(&self) -> &CanonicalBlock {
        &self.payload
    }

    pub fn payload_data(&self) -> &[u8] {
        &self.payload.data
    }

    pub fn extensions(&self) -> &[CanonicalBlock] {
        &self.extensions
    }

    /// Inserts a canonical block. A payload block (type 1) fills the payload
    /// slot if it is empty; any other block is assigned the lowest unused
    /// number ≥ 2 when its number is 0 or collides. Returns the number the
    /// block ended up with.
    pub fn insert_canonical(&mut self, mut block: CanonicalBlock) -> u64 {
        if block.block_type == type_code::PAYLOAD {
            if self.payload.data.is_empty() {
                block.block_number = 1;
                self.payload = block;
            }
            return 1;
        }

        let mut number = block.block_number;
        if number == 0 || self.used_numbers.contains(&number) {
            number = 2;
            while self.used_numbers.contains(&number) {
                number += 1;
            }
        }
        block.block_number = number;
        self.used_numbers.insert(number);
        self.note_presence(block.block_type, true);
        self.extensions.push(block);
        number
    }

    /// Removes the extension block with the given number, if present.
    pub fn remove_block(&mut self, number: u64) -> Option<CanonicalBlock> {
        let at = self.extensions.iter().position(|b| b.block_number == number)?;
        let block = self.extensions.remove(at);
        self.used_numbers.remove(&number);
        self.note_presence(block.block_type, false);
        Some(block)
    }

    /// Removes the previous-node block, if present.
    pub fn remove_previous_node(&mut self) -> Option<CanonicalBlock> {
        let number = self
            .extensions
            .iter()
            .find(|b| b.block_type == type_code::PREVIOUS_NODE)?
            .block_number;
        self.remove_block(number)
    }

    fn note_presence(&mut self, block_type: u64, present: bool) {
        match block_type {
            type_code::PREVIOUS_NODE => self.has_previous_node = present,
            type_code::BUNDLE_AGE => self.has_bundle_age = present,
            type_code::HOP_COUNT => self.has_hop_count = present,
            _ => {}
        }
    }

    fn find_block(&self, block_type: u64) -> Option<&CanonicalBlock> {
        self.extensions.iter().find(|b| b.block_type == block_type)
    }

    fn find_block_mut(&mut self, block_type: u64) -> Option<&mut CanonicalBlock> {
        self.extensions
            .iter_mut()
            .find(|b| b.block_type == block_type)
    }

    /// Age carried in the bundle-age block, if one is present.
    pub fn age(&self) -> Option<u64> {
        self.find_block(type_code::BUNDLE_AGE).and_then(|b| b.age())
    }

    pub fn set_age(&mut self, age_ms: u64) {
        if let Some(block) = self.find_block_mut(type_code::BUNDLE_AGE) {
            block.set_age(age_ms);
        }
    }

    /// Adds `delta_ms` to the bundle-age block, if one is present.
    pub fn increase_age(&mut self, delta_ms: u64) {
        if let Some(block) = self.find_block_mut(type_code::BUNDLE_AGE) {
            if let Some(age) = block.age() {
                block.set_age(age.saturating_add(delta_ms));
            }
        }
    }

    pub fn hop_count(&self) -> Option<u64> {
        self.find_block(type_code::HOP_COUNT)
            .and_then(|b| b.hop_info())
            .map(|(_, count)| count)
    }

    pub fn hop_limit(&self) -> Option<u64> {
        self.find_block(type_code::HOP_COUNT)
            .and_then(|b| b.hop_info())
            .map(|(limit, _)| limit)
    }

    /// Increments the hop count, preserving the hop limit.
    pub fn increase_hop_count(&mut self) {
        if let Some(block) = self.find_block_mut(type_code::HOP_COUNT) {
            if let Some((limit, count)) = block.hop_info() {
                block.set_hop_info(limit, count + 1);
            }
        }
    }

    /// Serializes the bundle: an indefinite-length array holding the primary
    /// block, the extension blocks, and the payload block last, closed by a
    /// break stop code. Every block's CRC is recomputed.
    pub fn to_cbor(&self) -> Vec<u8> {
        let mut out = vec![0x9F];
        out.extend(self.primary.to_bytes());
        for block in &self.extensions {
            out.extend(block.to_bytes());
        }
        out.extend(self.payload.to_bytes());
        out.push(0xFF);
        out
    }

    /// Decodes a bundle from its wire form, verifying structure and CRCs.
    pub fn from_cbor(data: &[u8]) -> Result<Self, Error> {
        let mut dec = Decoder::new(data);
        if dec.pull_array()?.is_some() {
            return Err(Error::InvalidStructure(
                "bundle must be an indefinite-length array",
            ));
        }

        let primary = PrimaryBlock::parse(&mut dec, data)?;

        let mut payload = None;
        let mut extensions = Vec::new();
        let mut used_numbers = BTreeSet::from([1u64]);
        let mut has_previous_node = false;
        let mut has_bundle_age = false;
        let mut has_hop_count = false;

        while !dec.at_break() {
            let block = CanonicalBlock::parse(&mut dec, data)?;
            if block.block_type == type_code::PAYLOAD {
                if block.block_number != 1 {
                    return Err(Error::InvalidStructure("payload block must be number 1"));
                }
                if payload.replace(block).is_some() {
                    return Err(Error::InvalidStructure("bundle has two payload blocks"));
                }
            } else {
                if block.block_number < 2 || !used_numbers.insert(block.block_number) {
                    return Err(Error::InvalidStructure("duplicate or reserved block number"));
                }
                match block.block_type {
                    type_code::PREVIOUS_NODE => has_previous_node = true,
                    type_code::BUNDLE_AGE => has_bundle_age = true,
                    type_code::HOP_COUNT => has_hop_count = true,
                    _ => {}
                }
                extensions.push(block);
            }
        }
        dec.pull_break()?;
        if !dec.is_empty() {
            return Err(Error::InvalidStructure("data after end of bundle"));
        }

        Ok(Self {
            primary,
            payload: payload.ok_or(Error::InvalidStructure("bundle has no payload block"))?,
            extensions,
            used_numbers,
            received_at: local_millis(),
            has_previous_node,
            has_bundle_age,
            has_hop_count,
        })
    }
}

/// Convenience constructors mirroring the well-known block factories.
impl Bundle {
    /// Attaches a fresh previous-node block naming `eid`.
    pub fn attach_previous_node(&mut self, eid: &Eid, crc_type: CrcType) -> u64 {
        self.insert_canonical(CanonicalBlock::previous_node(eid, crc_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creation_timestamp::CreationTimestamp;
    use crate::dtn_time::DtnTime;

    fn tiny(crc_type: CrcType) -> Bundle {
        let primary = PrimaryBlock::new(
            "dtn:dest".parse().unwrap(),
            "dtn:source".parse().unwrap(),
            Eid::Null,
            CreationTimestamp::new(DtnTime::new(1_700_000_000_000), 0),
            60_000,
            crc_type,
        );
        Bundle::new(primary, CanonicalBlock::payload(b"hi", crc_type))
    }

    #[test]
    fn tiny_roundtrip_no_crc() {
        let bundle = tiny(CrcType::None);
        let wire = bundle.to_cbor();
        assert_eq!(wire.first(), Some(&0x9F));
        assert_eq!(wire.last(), Some(&0xFF));

        let parsed = Bundle::from_cbor(&wire).unwrap();
        assert_eq!(parsed.payload_data(), &[0x68, 0x69]);
        assert_eq!(parsed.source().uri(), "dtn:source");
        assert_eq!(parsed.destination().uri(), "dtn:dest");
        assert_eq!(parsed.id(), "dtn:source-1700000000000-0");
    }

    #[test]
    fn roundtrip_with_extensions_and_crc() {
        for crc_type in [CrcType::X25, CrcType::Crc32c] {
            let mut bundle = tiny(crc_type);
            bundle.insert_canonical(CanonicalBlock::bundle_age(12, crc_type));
            bundle.insert_canonical(CanonicalBlock::hop_count(8, 1, crc_type));
            let parsed = Bundle::from_cbor(&bundle.to_cbor()).unwrap();
            assert_eq!(parsed.primary, bundle.primary);
            assert_eq!(parsed.age(), Some(12));
            assert_eq!(parsed.hop_count(), Some(1));
            assert_eq!(parsed.hop_limit(), Some(8));
            assert!(parsed.has_bundle_age);
            assert!(parsed.has_hop_count);
        }
    }

    #[test]
    fn single_byte_corruption_detected() {
        let mut bundle = tiny(CrcType::Crc32c);
        bundle.insert_canonical(CanonicalBlock::bundle_age(0, CrcType::Crc32c));
        let wire = bundle.to_cbor();
        // skip the array framing bytes, corrupt everything in between
        for i in 1..wire.len() - 1 {
            let mut corrupt = wire.clone();
            corrupt[i] ^= 0x20;
            assert!(
                Bundle::from_cbor(&corrupt).is_err(),
                "flipped byte {i} went undetected"
            );
        }
    }

    #[test]
    fn definite_outer_array_rejected() {
        let bundle = tiny(CrcType::None);
        let mut wire = bundle.to_cbor();
        // rewrite the indefinite head as a definite 2-element array and drop
        // the break
        wire[0] = 0x82;
        wire.pop();
        assert!(matches!(
            Bundle::from_cbor(&wire),
            Err(Error::InvalidStructure(_))
        ));
    }

    #[test]
    fn block_numbering_is_unique() {
        let mut bundle = tiny(CrcType::None);
        let a = bundle.insert_canonical(CanonicalBlock::bundle_age(0, CrcType::None));
        let b = bundle.insert_canonical(CanonicalBlock::hop_count(4, 0, CrcType::None));
        // a colliding explicit number gets reassigned
        let mut dup = CanonicalBlock::previous_node(&Eid::Null, CrcType::None);
        dup.block_number = a;
        let c = bundle.insert_canonical(dup);
        assert_eq!(a, 2);
        assert_eq!(b, 3);
        assert_eq!(c, 4);

        bundle.remove_block(b);
        assert!(!bundle.has_hop_count);
        let d = bundle.insert_canonical(CanonicalBlock::hop_count(4, 0, CrcType::None));
        assert_eq!(d, 3);

        let numbers: Vec<u64> = bundle.extensions().iter().map(|e| e.block_number).collect();
        let mut deduped = numbers.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(numbers.len(), deduped.len());
    }

    #[test]
    fn remove_previous_node_clears_flag() {
        let mut bundle = tiny(CrcType::None);
        bundle.attach_previous_node(&"dtn:relay".parse().unwrap(), CrcType::None);
        assert!(bundle.has_previous_node);
        assert!(bundle.remove_previous_node().is_some());
        assert!(!bundle.has_previous_node);
        assert!(bundle.remove_previous_node().is_none());
    }

    #[test]
    fn fragment_id_has_offset_suffix() {
        let mut bundle = tiny(CrcType::None);
        bundle.primary.flags.is_fragment = true;
        bundle.primary.fragment_info = Some(crate::primary_block::FragmentInfo {
            offset: 77,
            total_adu_length: 1000,
        });
        assert_eq!(bundle.id(), "dtn:source-1700000000000-0-77");
    }

    #[test]
    fn age_update_in_place() {
        let mut bundle = tiny(CrcType::None);
        bundle.insert_canonical(CanonicalBlock::bundle_age(100, CrcType::None));
        bundle.increase_age(400);
        assert_eq!(bundle.age(), Some(500));
        bundle.increase_hop_count(); // no hop-count block: no-op
        assert_eq!(bundle.hop_count(), None);
    }
}
