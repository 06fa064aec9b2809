//! Count-bounded in-memory storage.

use super::{is_older, Storage};
use crate::bundle_info::BundleInfo;
use crate::config::Config;
use crate::node::Node;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Keeps bundles as live objects in a FIFO list, capped at
/// `max_stored_bundles`; eviction removes the oldest by `received_at`.
pub struct InMemoryStorage {
    bundles: Mutex<VecDeque<BundleInfo>>,
    nodes: Mutex<HashMap<String, Node>>,
    seen: Mutex<HashSet<String>>,
    /// Bundles still owed to the current retry cycle.
    to_return: AtomicUsize,
    max_stored: usize,
    retry_batch: usize,
}

impl InMemoryStorage {
    pub fn new(config: &Config) -> Self {
        Self {
            bundles: Mutex::new(VecDeque::new()),
            nodes: Mutex::new(HashMap::new()),
            seen: Mutex::new(HashSet::new()),
            to_return: AtomicUsize::new(0),
            max_stored: config.max_stored_bundles,
            retry_batch: config.retry_batch_size,
        }
    }

    fn delete_oldest_locked(bundles: &mut VecDeque<BundleInfo>) -> Option<BundleInfo> {
        let oldest = bundles
            .iter()
            .enumerate()
            .reduce(|a, b| if is_older(b.1, a.1) { b } else { a })?
            .0;
        bundles.remove(oldest)
    }
}

impl Storage for InMemoryStorage {
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
        let mut bundles = self.bundles.lock().unwrap();
        if let Some(at) = bundles.iter().position(|b| b.id() == id) {
            bundles.remove(at);
            true
        } else {
            false
        }
    }

    fn delay(&self, info: BundleInfo) -> Vec<BundleInfo> {
        let mut removed = Vec::new();
        let mut bundles = self.bundles.lock().unwrap();
        while bundles.len() >= self.max_stored {
            match Self::delete_oldest_locked(&mut bundles) {
                Some(old) => removed.push(old),
                None => break,
            }
        }
        debug!(
            stored = bundles.len() + 1,
            evicted = removed.len(),
            "delaying bundle"
        );
        bundles.push_back(info);
        removed
    }

    fn begin_retry_cycle(&self) {
        let count = self.bundles.lock().unwrap().len();
        self.to_return.store(count, Ordering::Release);
    }

    fn get_bundles_retry(&self) -> Vec<BundleInfo> {
        let mut bundles = self.bundles.lock().unwrap();
        let mut batch = Vec::new();
        for _ in 0..self.retry_batch {
            if self.to_return.load(Ordering::Acquire) == 0 {
                break;
            }
            let Some(info) = bundles.pop_front() else {
                self.to_return.store(0, Ordering::Release);
                break;
            };
            batch.push(info);
            self.to_return.fetch_sub(1, Ordering::AcqRel);
        }
        batch
    }

    fn has_bundles_to_retry(&self) -> bool {
        self.to_return.load(Ordering::Acquire) != 0
    }

    fn delete_oldest(&self) -> Option<BundleInfo> {
        Self::delete_oldest_locked(&mut self.bundles.lock().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::{exercise_backend, info};

    fn storage(max: usize) -> InMemoryStorage {
        let config = Config {
            max_stored_bundles: max,
            retry_batch_size: 2,
            ..Config::default()
        };
        InMemoryStorage::new(&config)
    }

    #[test]
    fn backend_contract() {
        exercise_backend(&storage(32));
    }

    #[test]
    fn eviction_removes_the_oldest() {
        let storage = storage(3);
        storage.delay(info(0, 30));
        storage.delay(info(1, 10));
        storage.delay(info(2, 20));
        let removed = storage.delay(info(3, 40));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].bundle.received_at, 10);

        // next eviction takes the next-oldest
        let removed = storage.delay(info(4, 50));
        assert_eq!(removed[0].bundle.received_at, 20);
    }

    #[test]
    fn tie_break_prefers_unsynced_sources() {
        let storage = storage(2);
        let mut with_clock = info(0, 100);
        with_clock.bundle.primary.timestamp.creation_time = 500_u64.into();
        storage.delay(with_clock);
        storage.delay(info(1, 100));
        // both received at 100; the one with a synchronized creation time is
        // considered older
        let removed = storage.delay(info(2, 200));
        assert_eq!(
            removed[0]
                .bundle
                .primary
                .timestamp
                .creation_time
                .millisecs(),
            500
        );
    }

    #[test]
    fn retry_cycle_ignores_re_delayed_bundles() {
        let storage = storage(8);
        storage.delay(info(0, 1));
        storage.delay(info(1, 2));
        storage.begin_retry_cycle();

        let mut returned = 0;
        while storage.has_bundles_to_retry() {
            for bi in storage.get_bundles_retry() {
                returned += 1;
                // routers may re-delay during the cycle
                storage.delay(bi);
            }
        }
        assert_eq!(returned, 2);
        assert_eq!(storage.bundles.lock().unwrap().len(), 2);
    }
}
