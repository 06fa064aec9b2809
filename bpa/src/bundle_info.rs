//! Routing metadata wrapped around a bundle while it moves through the node.

use crate::node::Node;
use tundra_bpv7::bundle::Bundle;
use tundra_bpv7::Error;
use tundra_cbor::{decode, encode};

/// The bundle's current lifecycle marker inside the BPA (RFC 9171 §5).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u64)]
pub enum Retention {
    #[default]
    None = 0,
    ForwardPending = 1,
    DispatchPending = 2,
}

impl TryFrom<u64> for Retention {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self, Error> {
        match value {
            0 => Ok(Retention::None),
            1 => Ok(Retention::ForwardPending),
            2 => Ok(Retention::DispatchPending),
            _ => Err(Error::InvalidStructure("unknown retention constraint")),
        }
    }
}

/// A bundle plus the metadata the routers and the retry machinery need:
/// which peers already hold it, how often it was broadcast, and when.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleInfo {
    pub bundle: Bundle,
    pub retention: Retention,
    pub locally_delivered: bool,
    /// Peers known (or assumed) to have received this bundle.
    pub forwarded_to: Vec<Node>,
    pub num_of_broadcasts: u32,
    /// Node-local milliseconds of the last broadcast, 0 if never.
    pub last_broadcast_time: u64,
}

impl BundleInfo {
    pub fn new(bundle: Bundle) -> Self {
        Self {
            bundle,
            retention: Retention::DispatchPending,
            locally_delivered: false,
            forwarded_to: Vec::new(),
            num_of_broadcasts: 0,
            last_broadcast_time: 0,
        }
    }

    pub fn id(&self) -> String {
        self.bundle.id()
    }

    /// True when `uri` is already listed in `forwarded_to`.
    pub fn was_forwarded_to(&self, uri: &str) -> bool {
        self.forwarded_to.iter().any(|n| n.uri == uri)
    }

    /// Serializes for storage: a definite array of 7 items
    /// `[retention, locally_delivered, forwarded_to, num_of_broadcasts,
    /// last_broadcast_time, received_at, bundle_cbor]`, where `forwarded_to`
    /// is an array of node serializations as byte strings.
    pub fn serialize(&self) -> Vec<u8> {
        encode::emit_array(Some(7), |a| {
            a.emit_uint(self.retention as u64);
            a.emit_bool(self.locally_delivered);
            a.emit_array(Some(self.forwarded_to.len()), |a| {
                for node in &self.forwarded_to {
                    a.emit_bytes(&node.serialize());
                }
            });
            a.emit_uint(self.num_of_broadcasts as u64);
            a.emit_uint(self.last_broadcast_time);
            a.emit_uint(self.bundle.received_at);
            a.emit_bytes(&self.bundle.to_cbor());
        })
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, Error> {
        let mut dec = decode::Decoder::new(data);
        let Some(7) = dec.pull_array()? else {
            return Err(Error::InvalidStructure("bundle info must be a 7 item array"));
        };

        let retention = Retention::try_from(dec.pull_uint()?)?;
        let locally_delivered = dec.pull_bool()?;
        let Some(node_count) = dec.pull_array()? else {
            return Err(Error::InvalidStructure("forwarded-to list must be definite"));
        };
        let mut forwarded_to = Vec::with_capacity(node_count as usize);
        for _ in 0..node_count {
            forwarded_to.push(Node::deserialize(dec.pull_bytes()?)?);
        }
        let num_of_broadcasts = dec.pull_uint()? as u32;
        let last_broadcast_time = dec.pull_uint()?;
        let received_at = dec.pull_uint()?;
        let mut bundle = Bundle::from_cbor(dec.pull_bytes()?)?;
        bundle.received_at = received_at;

        Ok(Self {
            bundle,
            retention,
            locally_delivered,
            forwarded_to,
            num_of_broadcasts,
            last_broadcast_time,
        })
    }
}

/// A bundle fresh off a transport, paired with the sender's transport
/// address. `from` is `"none"` when the transport cannot identify the
/// sender.
#[derive(Debug, Clone)]
pub struct ReceivedBundle {
    pub bundle: Bundle,
    pub from: String,
}

impl ReceivedBundle {
    pub fn new(bundle: Bundle, from: impl Into<String>) -> Self {
        Self {
            bundle,
            from: from.into(),
        }
    }

    /// A received bundle whose sender is unknown.
    pub fn anonymous(bundle: Bundle) -> Self {
        Self::new(bundle, "none")
    }
}
