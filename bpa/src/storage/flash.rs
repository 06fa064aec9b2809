//! Flash-backed bundle storage over a key-value blob store.
//!
//! Bundles are written under decimal stringifications of a
//! monotonically-increasing u32 key; peers and seen-ids stay in memory.
//! With `keep_between_restart` the three key-range scalars are persisted so
//! the store can pick up where it left off after a reboot.

use super::{AgeKey, KvStore, Storage};
use crate::bundle_info::BundleInfo;
use crate::config::Config;
use crate::node::Node;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

const HIGHEST_KEY: &str = "highest_used";
const LOWEST_KEY: &str = "lowest_used";
const OLDEST_KEY: &str = "oldest_key";

struct FlashState {
    /// Last key handed out; 0 means none yet.
    highest_used: u32,
    /// Lower bound of the live key range.
    lowest_used: u32,
    /// Key and ordering key of the oldest stored bundle; `None` when the
    /// tracking was invalidated and the range must be rescanned.
    oldest: Option<(u32, AgeKey)>,
    live: usize,
    /// Retry-cycle state: bundles still owed, and the scan position.
    to_return: usize,
    cursor: u32,
}

/// An in-memory [`KvStore`] for tests and hosted targets.
#[derive(Default)]
pub struct MemoryKv {
    map: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.map.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &[u8]) {
        self.map.lock().unwrap().insert(key.to_string(), value.to_vec());
    }

    fn remove(&self, key: &str) {
        self.map.lock().unwrap().remove(key);
    }

    fn clear(&self) {
        self.map.lock().unwrap().clear();
    }
}

pub struct FlashStorage {
    kv: Arc<dyn KvStore>,
    nodes: Mutex<HashMap<String, Node>>,
    seen: Mutex<HashSet<String>>,
    state: Mutex<FlashState>,
    max_stored: usize,
    retry_batch: usize,
    keep_between_restart: bool,
}

fn get_u32(kv: &dyn KvStore, key: &str) -> u32 {
    kv.get(key)
        .and_then(|v| v.try_into().ok())
        .map(u32::from_be_bytes)
        .unwrap_or(0)
}

impl FlashStorage {
    pub fn new(config: &Config, kv: Arc<dyn KvStore>) -> Self {
        let mut state = FlashState {
            highest_used: 0,
            lowest_used: 0,
            oldest: None,
            live: 0,
            to_return: 0,
            cursor: 0,
        };

        if !config.keep_between_restart {
            kv.clear();
        } else {
            state.highest_used = get_u32(kv.as_ref(), HIGHEST_KEY);
            state.lowest_used = get_u32(kv.as_ref(), LOWEST_KEY);
            // recount the live entries in the recovered key range
            for key in state.lowest_used.max(1)..=state.highest_used {
                if kv.get(&key.to_string()).is_some() {
                    state.live += 1;
                }
            }
            // re-read the tracked oldest entry to recover its ordering key
            let oldest_key = get_u32(kv.as_ref(), OLDEST_KEY);
            if oldest_key != 0 {
                if let Some(blob) = kv.get(&oldest_key.to_string()) {
                    if let Ok(oldest) = BundleInfo::deserialize(&blob) {
                        state.oldest = Some((oldest_key, AgeKey::of(&oldest)));
                    }
                }
            }
            info!(
                live = state.live,
                lowest = state.lowest_used,
                highest = state.highest_used,
                "recovered flash storage state"
            );
        }

        Self {
            kv,
            nodes: Mutex::new(HashMap::new()),
            seen: Mutex::new(HashSet::new()),
            state: Mutex::new(state),
            max_stored: config.max_stored_bundles,
            retry_batch: config.retry_batch_size,
            keep_between_restart: config.keep_between_restart,
        }
    }

    fn persist_scalars(&self, state: &FlashState) {
        if self.keep_between_restart {
            let oldest_key = state.oldest.map_or(0, |(key, _)| key);
            self.kv.set(HIGHEST_KEY, &state.highest_used.to_be_bytes());
            self.kv.set(LOWEST_KEY, &state.lowest_used.to_be_bytes());
            self.kv.set(OLDEST_KEY, &oldest_key.to_be_bytes());
        }
    }

    fn read(&self, key: u32) -> Option<(u32, BundleInfo)> {
        let blob = self.kv.get(&key.to_string())?;
        match BundleInfo::deserialize(&blob) {
            Ok(info) => Some((key, info)),
            Err(e) => {
                warn!(key, error = %e, "dropping undecodable flash entry");
                self.kv.remove(&key.to_string());
                None
            }
        }
    }

    /// Scans the live key range for the oldest bundle, ordered by
    /// [`AgeKey::is_older_than`].
    fn find_oldest(&self, state: &FlashState) -> Option<(u32, AgeKey)> {
        let mut oldest: Option<(u32, AgeKey)> = None;
        for key in state.lowest_used.max(1)..=state.highest_used {
            if let Some((_, info)) = self.read(key) {
                let age = AgeKey::of(&info);
                if oldest.map(|(_, best)| age.is_older_than(&best)).unwrap_or(true) {
                    oldest = Some((key, age));
                }
            }
        }
        oldest
    }

    fn remove_key(&self, state: &mut FlashState, key: u32) {
        self.kv.remove(&key.to_string());
        state.live = state.live.saturating_sub(1);
        if key == state.lowest_used {
            state.lowest_used = key + 1;
        }
        if state.oldest.map_or(false, |(oldest, _)| oldest == key) {
            state.oldest = None;
        }
        self.persist_scalars(state);
    }
}

impl Storage for FlashStorage {
    fn add_node(&self, node: Node) {
        self.nodes.lock().unwrap().insert(node.uri.clone(), node);
    }

    fn remove_node(&self, uri: &str) {
        self.nodes.lock().unwrap().remove(uri);
    }

    fn get_node(&self, uri: &str) -> Option<Node> {
        self.nodes.lock().unwrap().get(uri).cloned()
    }

    fn get_nodes(&self) -> Vec<Node> {
        self.nodes.lock().unwrap().values().cloned().collect()
    }

    fn check_seen(&self, id: &str) -> bool {
        self.seen.lock().unwrap().contains(id)
    }

    fn store_seen(&self, id: &str) {
        self.seen.lock().unwrap().insert(id.to_string());
    }

    fn remove_bundle(&self, id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        for key in state.lowest_used.max(1)..=state.highest_used {
            if let Some((_, info)) = self.read(key) {
                if info.id() == id {
                    self.remove_key(&mut state, key);
                    return true;
                }
            }
        }
        false
    }

    fn delay(&self, info: BundleInfo) -> Vec<BundleInfo> {
        let mut removed = Vec::new();
        let mut state = self.state.lock().unwrap();

        while state.live >= self.max_stored {
            let key = match state.oldest.or_else(|| self.find_oldest(&state)) {
                Some((key, _)) => key,
                None => break,
            };
            if let Some((_, old)) = self.read(key) {
                removed.push(old);
            }
            self.remove_key(&mut state, key);
        }

        state.highest_used += 1;
        if state.lowest_used == 0 {
            state.lowest_used = state.highest_used;
        }
        let key = state.highest_used;
        self.kv.set(&key.to_string(), &info.serialize());
        state.live += 1;

        // A re-delayed bundle can be older than anything stored, so the
        // oldest entry is tracked by age, not key order. When the tracking
        // was invalidated by a removal, rescan instead of assuming the new
        // bundle is oldest.
        let age = AgeKey::of(&info);
        match state.oldest {
            Some((_, best)) if !age.is_older_than(&best) => {}
            Some(_) => state.oldest = Some((key, age)),
            None => state.oldest = self.find_oldest(&state),
        }
        self.persist_scalars(&state);
        debug!(key, live = state.live, "bundle written to flash");
        removed
    }

    fn begin_retry_cycle(&self) {
        let mut state = self.state.lock().unwrap();
        state.to_return = state.live;
        state.cursor = state.lowest_used.max(1);
    }

    fn get_bundles_retry(&self) -> Vec<BundleInfo> {
        let mut state = self.state.lock().unwrap();
        let mut batch = Vec::new();
        while batch.len() < self.retry_batch && state.to_return > 0 {
            if state.cursor > state.highest_used {
                state.to_return = 0;
                break;
            }
            let key = state.cursor;
            state.cursor += 1;
            if let Some((_, info)) = self.read(key) {
                self.remove_key(&mut state, key);
                state.to_return -= 1;
                batch.push(info);
            }
        }
        batch
    }

    fn has_bundles_to_retry(&self) -> bool {
        self.state.lock().unwrap().to_return != 0
    }

    fn delete_oldest(&self) -> Option<BundleInfo> {
        let mut state = self.state.lock().unwrap();
        let (key, _) = state.oldest.or_else(|| self.find_oldest(&state))?;
        let info = self.read(key).map(|(_, info)| info);
        self.remove_key(&mut state, key);
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::{exercise_backend, info};

    fn flash(max: usize, kv: Arc<dyn KvStore>, keep: bool) -> FlashStorage {
        let config = Config {
            max_stored_bundles: max,
            retry_batch_size: 2,
            keep_between_restart: keep,
            ..Config::default()
        };
        FlashStorage::new(&config, kv)
    }

    #[test]
    fn backend_contract() {
        exercise_backend(&flash(32, Arc::new(MemoryKv::new()), false));
    }

    #[test]
    fn keys_are_monotonic_decimal_strings() {
        let kv = Arc::new(MemoryKv::new());
        let storage = flash(8, kv.clone(), false);
        storage.delay(info(0, 1));
        storage.delay(info(1, 2));
        assert!(kv.get("1").is_some());
        assert!(kv.get("2").is_some());
        assert!(kv.get("3").is_none());
    }

    #[test]
    fn capacity_bound_evicts_oldest() {
        let storage = flash(2, Arc::new(MemoryKv::new()), false);
        storage.delay(info(0, 50));
        storage.delay(info(1, 10));
        let removed = storage.delay(info(2, 60));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].bundle.received_at, 10);

        // the eviction invalidated the tracked oldest entry; the remaining
        // oldest is the first bundle, not the newest insert
        assert_eq!(storage.delete_oldest().unwrap().bundle.received_at, 50);
        assert_eq!(storage.delete_oldest().unwrap().bundle.received_at, 60);
        assert!(storage.delete_oldest().is_none());
    }

    #[test]
    fn tie_break_matches_the_other_backends() {
        let storage = flash(8, Arc::new(MemoryKv::new()), false);
        let mut with_clock = info(0, 100);
        with_clock.bundle.primary.timestamp.creation_time = 500_u64.into();
        storage.delay(with_clock);
        storage.delay(info(1, 100));
        // equal reception times: the bundle with a synchronized creation
        // time counts as older
        let oldest = storage.delete_oldest().unwrap();
        assert_eq!(
            oldest.bundle.primary.timestamp.creation_time.millisecs(),
            500
        );
        assert_eq!(
            storage
                .delete_oldest()
                .unwrap()
                .bundle
                .primary
                .timestamp
                .creation_time
                .millisecs(),
            0
        );
    }

    #[test]
    fn survives_restart_when_configured() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        {
            let storage = flash(8, kv.clone(), true);
            storage.delay(info(0, 100));
            storage.delay(info(1, 200));
        }
        // a new instance over the same kv picks the bundles back up
        let storage = flash(8, kv, true);
        storage.begin_retry_cycle();
        assert!(storage.has_bundles_to_retry());
        let batch = storage.get_bundles_retry();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].bundle.received_at, 100);
    }

    #[test]
    fn restart_keeps_the_oldest_entry_tracked() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        {
            let storage = flash(8, kv.clone(), true);
            storage.delay(info(0, 200));
            storage.delay(info(1, 100));
        }
        let storage = flash(8, kv, true);
        // a fresh insert must not displace the recovered oldest entry
        storage.delay(info(2, 300));
        assert_eq!(storage.delete_oldest().unwrap().bundle.received_at, 100);
        assert_eq!(storage.delete_oldest().unwrap().bundle.received_at, 200);
        assert_eq!(storage.delete_oldest().unwrap().bundle.received_at, 300);
    }

    #[test]
    fn fresh_instance_without_keep_ignores_old_state() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        {
            let storage = flash(8, kv.clone(), true);
            storage.delay(info(0, 100));
        }
        let storage = flash(8, kv, false);
        storage.begin_retry_cycle();
        assert!(!storage.has_bundles_to_retry());
    }
}
