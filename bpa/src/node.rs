//! The peer model: everything this node knows about another DTN node.

use std::collections::BTreeSet;
use tundra_bpv7::dtn_time::local_millis;
use tundra_bpv7::eid::Eid;
use tundra_bpv7::Error;
use tundra_cbor::{decode, encode};

/// `last_seen` value marking a statically-added peer; never aged out.
pub const STATIC_PEER: u64 = u64::MAX;

/// A known peer.
///
/// `identifier` is the transport-level address (a MAC address, a serial port
/// name); `uri` is the peer's DTN URI. The two may coincide when the
/// transport cannot tell them apart.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub identifier: String,
    pub uri: String,
    pub eids: Vec<Eid>,
    /// Node-local milliseconds at which the peer was last heard from, or
    /// [`STATIC_PEER`].
    pub last_seen: u64,
    pub position: Option<(f32, f32)>,
    /// Hashes of bundle ids the peer has advertised as received.
    pub received_hashes: BTreeSet<u64>,
    /// Set when the peer confirmed reception of the bundle this entry is
    /// attached to (only meaningful inside a `forwarded_to` list).
    pub confirmed_reception: bool,
}

impl Node {
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let eids = uri.parse::<Eid>().into_iter().collect();
        Self {
            identifier: uri.clone(),
            uri,
            eids,
            last_seen: 0,
            position: None,
            received_hashes: BTreeSet::new(),
            confirmed_reception: false,
        }
    }

    /// Lowercase-hex identifier from raw bytes, e.g. a MAC address.
    pub fn id_from_bytes(bytes: &[u8]) -> String {
        let mut s = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }

    pub fn is_static(&self) -> bool {
        self.last_seen == STATIC_PEER
    }

    /// Refreshes `last_seen` to now. No-op on statically-added peers.
    pub fn touch(&mut self) {
        if !self.is_static() {
            self.last_seen = local_millis();
        }
    }

    pub fn set_position(&mut self, lat: f32, lng: f32) {
        self.position = Some((lat, lng));
    }

    /// Drops the position. Returns whether one was set.
    pub fn remove_position(&mut self) -> bool {
        self.position.take().is_some()
    }

    /// Serializes the peer for storage: a definite array of
    /// `[identifier, eids, uri, last_seen, has_position]`, extended by
    /// `lat, lng` when a position is set and by
    /// `confirmed_reception, received_hashes` when confirmation state exists.
    pub fn serialize(&self) -> Vec<u8> {
        let has_confirmation = self.confirmed_reception || !self.received_hashes.is_empty();
        let items = 5
            + if self.position.is_some() { 2 } else { 0 }
            + if has_confirmation { 2 } else { 0 };
        encode::emit_array(Some(items), |a| {
            a.emit_text(&self.identifier);
            a.emit_array(Some(self.eids.len()), |a| {
                for eid in &self.eids {
                    a.emit(eid);
                }
            });
            a.emit_text(&self.uri);
            a.emit_uint(self.last_seen);
            a.emit_bool(self.position.is_some());
            if let Some((lat, lng)) = self.position {
                a.emit_f32(lat);
                a.emit_f32(lng);
            }
            if has_confirmation {
                a.emit_bool(self.confirmed_reception);
                a.emit_array(Some(self.received_hashes.len()), |a| {
                    for hash in &self.received_hashes {
                        a.emit_uint(*hash);
                    }
                });
            }
        })
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, Error> {
        let mut dec = decode::Decoder::new(data);
        let Some(items @ 5..=9) = dec.pull_array()? else {
            return Err(Error::InvalidStructure("node must be a 5 to 9 item array"));
        };

        let identifier = dec.pull_text()?.to_string();
        let Some(eid_count) = dec.pull_array()? else {
            return Err(Error::InvalidStructure("node EID list must be definite"));
        };
        let mut eids = Vec::with_capacity(eid_count as usize);
        for _ in 0..eid_count {
            eids.push(Eid::parse(&mut dec)?);
        }
        let uri = dec.pull_text()?.to_string();
        let last_seen = dec.pull_uint()?;
        let has_position = dec.pull_bool()?;

        let mut consumed = 5u64;
        let position = if has_position {
            consumed += 2;
            Some((dec.pull_f32()?, dec.pull_f32()?))
        } else {
            None
        };

        let (confirmed_reception, received_hashes) = if items > consumed {
            let confirmed = dec.pull_bool()?;
            let Some(hash_count) = dec.pull_array()? else {
                return Err(Error::InvalidStructure("node hash set must be definite"));
            };
            let mut hashes = BTreeSet::new();
            for _ in 0..hash_count {
                hashes.insert(dec.pull_uint()?);
            }
            (confirmed, hashes)
        } else {
            (false, BTreeSet::new())
        };

        Ok(Self {
            identifier,
            uri,
            eids,
            last_seen,
            position,
            received_hashes,
            confirmed_reception,
        })
    }
}
