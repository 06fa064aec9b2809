//! Bounded persistence of bundles, seen-ids and peers.
//!
//! All implementations are thread-safe behind coarse per-collection mutexes.
//! Storage moves bundles in and out by value: a bundle handed to [`delay`]
//! belongs to the store, a bundle returned by [`get_bundles_retry`] or
//! [`delete_oldest`] belongs to the caller again.
//!
//! [`delay`]: Storage::delay
//! [`get_bundles_retry`]: Storage::get_bundles_retry
//! [`delete_oldest`]: Storage::delete_oldest

use crate::bundle_info::BundleInfo;
use crate::config::Config;
use crate::node::Node;
use crate::SetupError;
use std::sync::Arc;

mod flash;
mod in_memory;
mod serialized;

pub use flash::{FlashStorage, MemoryKv};
pub use in_memory::InMemoryStorage;
pub use serialized::{SerializedIaStorage, SerializedStorage};

pub trait Storage: Send + Sync {
    /// Inserts or overwrites a peer, keyed by its URI.
    fn add_node(&self, node: Node);

    /// No-op if the peer is unknown.
    fn remove_node(&self, uri: &str);

    fn get_node(&self, uri: &str) -> Option<Node>;

    /// Snapshot of all known peers.
    fn get_nodes(&self) -> Vec<Node>;

    fn check_seen(&self, id: &str) -> bool;

    /// Idempotent insert into the seen set.
    fn store_seen(&self, id: &str);

    /// Returns whether a bundle with that id was present and removed.
    fn remove_bundle(&self, id: &str) -> bool;

    /// Persists a bundle for a later forwarding attempt. Bundles evicted to
    /// make space are returned to the caller, oldest first.
    fn delay(&self, info: BundleInfo) -> Vec<BundleInfo>;

    /// Snapshots the number of persisted bundles; the following
    /// [`get_bundles_retry`](Self::get_bundles_retry) calls are bounded by
    /// that snapshot, so bundles re-delayed during the cycle are not
    /// returned again.
    fn begin_retry_cycle(&self);

    /// Returns the next batch of persisted bundles in FIFO order, removing
    /// each from storage.
    fn get_bundles_retry(&self) -> Vec<BundleInfo>;

    /// True while the current retry cycle has bundles left.
    fn has_bundles_to_retry(&self) -> bool;

    /// Removes and returns the oldest stored bundle.
    fn delete_oldest(&self) -> Option<BundleInfo>;
}

/// A key-value blob store backing [`FlashStorage`]. On a real device this is
/// the NVS flash partition; tests use [`MemoryKv`].
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, value: &[u8]);
    fn remove(&self, key: &str);
    /// Erases the whole namespace.
    fn clear(&self);
}

/// Builds the storage backend named in the config.
pub fn by_name(config: &Config) -> Result<Arc<dyn Storage>, SetupError> {
    match config.storage.as_str() {
        "in-memory" => Ok(Arc::new(InMemoryStorage::new(config))),
        "in-memory-serialized" => Ok(Arc::new(SerializedStorage::new(config))),
        "in-memory-serialized-ia" => Ok(Arc::new(SerializedIaStorage::new(config))),
        "flash" => {
            let kv = config.kv_store.clone().ok_or(SetupError::MissingKvStore)?;
            Ok(Arc::new(FlashStorage::new(config, kv)))
        }
        "dummy" => Ok(Arc::new(DummyStorage)),
        other => Err(SetupError::UnknownStorage(other.to_string())),
    }
}

/// The eviction-ordering key of a stored bundle: reception time plus the
/// fields breaking ties between equal reception times.
#[derive(Debug, Copy, Clone)]
pub(crate) struct AgeKey {
    received_at: u64,
    creation_time: u64,
    sequence: u64,
}

impl AgeKey {
    pub(crate) fn of(info: &BundleInfo) -> Self {
        Self {
            received_at: info.bundle.received_at,
            creation_time: info.bundle.primary.timestamp.creation_time.millisecs(),
            sequence: info.bundle.primary.timestamp.sequence_number,
        }
    }

    /// Smaller `received_at` is older; ties prefer keeping bundles without
    /// a synchronized creation time (they count as newer), then compare
    /// creation time, then sequence number.
    pub(crate) fn is_older_than(&self, other: &AgeKey) -> bool {
        if self.received_at != other.received_at {
            return self.received_at < other.received_at;
        }
        match (self.creation_time, other.creation_time) {
            (0, 0) => self.sequence < other.sequence,
            (0, _) => false,
            (_, 0) => true,
            _ if self.creation_time == other.creation_time => self.sequence < other.sequence,
            _ => self.creation_time < other.creation_time,
        }
    }
}

/// Orders two bundles by age, per the rule on [`AgeKey::is_older_than`].
pub(crate) fn is_older(a: &BundleInfo, b: &BundleInfo) -> bool {
    AgeKey::of(a).is_older_than(&AgeKey::of(b))
}

/// Storage for nodes that only originate bundles: every operation succeeds
/// and nothing is kept.
pub struct DummyStorage;

impl Storage for DummyStorage {
    fn add_node(&self, _node: Node) {}
    fn remove_node(&self, _uri: &str) {}
    fn get_node(&self, _uri: &str) -> Option<Node> {
        None
    }
    fn get_nodes(&self) -> Vec<Node> {
        Vec::new()
    }
    fn check_seen(&self, _id: &str) -> bool {
        false
    }
    fn store_seen(&self, _id: &str) {}
    fn remove_bundle(&self, _id: &str) -> bool {
        false
    }
    fn delay(&self, _info: BundleInfo) -> Vec<BundleInfo> {
        Vec::new()
    }
    fn begin_retry_cycle(&self) {}
    fn get_bundles_retry(&self) -> Vec<BundleInfo> {
        Vec::new()
    }
    fn has_bundles_to_retry(&self) -> bool {
        false
    }
    fn delete_oldest(&self) -> Option<BundleInfo> {
        None
    }
}
