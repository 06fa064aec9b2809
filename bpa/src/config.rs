//! Node configuration.
//!
//! Every field has a default so a config file only needs to name what it
//! changes. Storage backend and routing policy are selected by name; unknown
//! names abort setup with a [`SetupError`](crate::SetupError).

use crate::storage::KvStore;
use crate::SetupError;
use std::sync::Arc;
use tundra_bpv7::crc::CrcType;

#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage backend: `in-memory`, `in-memory-serialized`,
    /// `in-memory-serialized-ia`, `flash` or `dummy`.
    pub storage: String,

    /// Routing policy: `broadcast` or `epidemic`.
    pub router: String,

    pub receive_queue_size: usize,
    pub forward_queue_size: usize,

    /// Hard cap for the count-bounded storage backend.
    pub max_stored_bundles: usize,
    /// Byte budget for the heap-bounded serialized backends.
    pub target_free_heap: usize,
    /// Cap on evictions per `delay` call in the serialized backends.
    pub max_removed_bundles: usize,

    pub retry_batch_size: usize,
    pub retry_interval_ms: u64,
    /// Gap between bundles re-enqueued by one retry batch.
    pub retry_send_gap_ms: u64,
    pub poll_interval_ms: u64,
    pub max_peer_age_ms: u64,

    /// Broadcast router: direct-send threshold for declaring success.
    pub min_forwards: usize,
    /// Broadcast router: broadcast cap per bundle.
    pub max_broadcasts: u32,
    /// Broadcast router: minimum spacing between broadcasts of one bundle.
    pub ms_between_broadcast: u64,
    /// Epidemic router: acceptance threshold.
    pub required_forwards: usize,
    /// Epidemic router: track per-peer reception confirmation hashes.
    pub use_received_set: bool,

    /// Whether this node may stamp nonzero creation times once its clock is
    /// synchronized.
    pub has_accurate_clock: bool,
    pub attach_hop_count: bool,
    pub hop_limit: u64,
    pub attach_previous_node: bool,

    pub default_lifetime_ms: u64,
    /// When set, overrides the primary-block lifetime during expiry checks.
    pub override_lifetime_ms: Option<u64>,

    /// CRC type for locally-originated primary blocks (0, 1 or 2).
    pub primary_crc_type: u64,
    /// CRC type for locally-originated canonical blocks (0, 1 or 2).
    pub canonical_crc_type: u64,

    /// Flash backend: persist state pointers across restarts.
    pub keep_between_restart: bool,

    /// Key-value store for the flash backend. Not part of the serialized
    /// config; wire it up in code.
    #[serde(skip)]
    pub kv_store: Option<Arc<dyn KvStore>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: "in-memory".into(),
            router: "epidemic".into(),
            receive_queue_size: 8,
            forward_queue_size: 8,
            max_stored_bundles: 32,
            target_free_heap: 64 * 1024,
            max_removed_bundles: 4,
            retry_batch_size: 4,
            retry_interval_ms: 30_000,
            retry_send_gap_ms: 100,
            poll_interval_ms: 5_000,
            max_peer_age_ms: 600_000,
            min_forwards: 0,
            max_broadcasts: 3,
            ms_between_broadcast: 10_000,
            required_forwards: 1,
            use_received_set: false,
            has_accurate_clock: false,
            attach_hop_count: false,
            hop_limit: 32,
            attach_previous_node: true,
            default_lifetime_ms: 24 * 60 * 60 * 1000,
            override_lifetime_ms: None,
            primary_crc_type: 1,
            canonical_crc_type: 0,
            keep_between_restart: false,
            kv_store: None,
        }
    }
}

impl Config {
    pub fn primary_crc(&self) -> Result<CrcType, SetupError> {
        CrcType::try_from(self.primary_crc_type)
            .map_err(|_| SetupError::InvalidCrcType(self.primary_crc_type))
    }

    pub fn canonical_crc(&self) -> Result<CrcType, SetupError> {
        CrcType::try_from(self.canonical_crc_type)
            .map_err(|_| SetupError::InvalidCrcType(self.canonical_crc_type))
    }

    /// The lifetime used for expiry decisions on a bundle that declares
    /// `lifetime` in its primary block.
    pub fn effective_lifetime(&self, lifetime: u64) -> u64 {
        self.override_lifetime_ms.unwrap_or(lifetime)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("storage", &self.storage)
            .field("router", &self.router)
            .field("max_stored_bundles", &self.max_stored_bundles)
            .field("retry_interval_ms", &self.retry_interval_ms)
            .field("use_received_set", &self.use_received_set)
            .field("has_accurate_clock", &self.has_accurate_clock)
            .finish_non_exhaustive()
    }
}
