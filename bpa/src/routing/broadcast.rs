//! Simple flooding: direct sends to every known peer, plus rate-limited
//! broadcasts over unidirectional links.

use super::{note_forwarded, Router, RouterContext};
use crate::bundle_info::BundleInfo;
use crate::cla::Cla;
use crate::config::Config;
use crate::reason::ReasonCode;
use crate::storage::Storage;
use crate::SetupError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};
use tundra_bpv7::dtn_time::local_millis;
use tundra_bpv7::eid::Eid;

pub struct SimpleBroadcastRouter {
    ctx: RouterContext,
    min_forwards: usize,
    max_broadcasts: u32,
    ms_between_broadcast: u64,
}

impl SimpleBroadcastRouter {
    pub fn new(
        config: &Config,
        storage: Arc<dyn Storage>,
        local_eid: Eid,
    ) -> Result<Self, SetupError> {
        Ok(Self {
            ctx: RouterContext::new(config, storage, local_eid)?,
            min_forwards: config.min_forwards,
            max_broadcasts: config.max_broadcasts,
            ms_between_broadcast: config.ms_between_broadcast,
        })
    }
}

#[async_trait]
impl Router for SimpleBroadcastRouter {
    fn add_cla(&self, cla: Arc<dyn Cla>) {
        self.ctx.clas.write().unwrap().push(cla);
    }

    fn clas(&self) -> Vec<Arc<dyn Cla>> {
        self.ctx.clas()
    }

    async fn forward(&self, info: &mut BundleInfo) -> (bool, ReasonCode) {
        let clas = self.ctx.clas();
        let prepared = self.ctx.prepare(info);
        let mut reason = ReasonCode::NoTimelyContact;

        // address every known peer that does not hold the bundle yet
        for peer in self.ctx.storage.get_nodes() {
            if info.was_forwarded_to(&peer.uri) {
                continue;
            }
            for cla in &clas {
                if !cla.can_address() {
                    continue;
                }
                trace!(cla = cla.name(), peer = %peer.uri, "direct send attempt");
                if cla.send(&prepared, Some(&peer)).await {
                    note_forwarded(info, &peer);
                    break;
                }
                reason = ReasonCode::NoTimelyContact;
            }
        }

        // broadcast, spaced out per bundle
        let now = local_millis();
        if info.last_broadcast_time == 0
            || now.saturating_sub(info.last_broadcast_time) >= self.ms_between_broadcast
        {
            for cla in &clas {
                if cla.can_address() {
                    continue;
                }
                if cla.send(&prepared, None).await {
                    reason = ReasonCode::ForwardedOverUnidirectionalLink;
                    info.num_of_broadcasts += 1;
                    info.last_broadcast_time = now;
                } else {
                    reason = ReasonCode::TrafficPared;
                }
            }
        } else {
            trace!(id = %info.id(), "broadcast suppressed, last one too recent");
        }

        let success = info.forwarded_to.len() >= self.min_forwards
            || info.num_of_broadcasts >= self.max_broadcasts;
        debug!(
            id = %info.id(),
            forwarded = info.forwarded_to.len(),
            broadcasts = info.num_of_broadcasts,
            success,
            "broadcast forwarding pass done"
        );
        (success, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::routing::test_support::ScriptedCla;
    use crate::storage::test_support::info;
    use crate::storage::InMemoryStorage;

    fn router(
        config: &Config,
        storage: Arc<dyn Storage>,
        cla: Arc<dyn Cla>,
    ) -> SimpleBroadcastRouter {
        let router =
            SimpleBroadcastRouter::new(config, storage, "dtn:me".parse().unwrap()).unwrap();
        router.add_cla(cla);
        router
    }

    #[tokio::test]
    async fn single_broadcast_is_enough() {
        // min_forwards 0, max_broadcasts 1, one always-successful broadcast CLA
        let config = Config {
            min_forwards: 0,
            max_broadcasts: 1,
            ..Config::default()
        };
        let storage = Arc::new(InMemoryStorage::new(&config));
        let cla = Arc::new(ScriptedCla::new("lora", false, true));
        let router = router(&config, storage, cla.clone());

        let mut bi = info(0, local_millis());
        let (success, reason) = router.forward(&mut bi).await;

        assert!(success);
        assert_eq!(reason, ReasonCode::ForwardedOverUnidirectionalLink);
        assert_eq!(bi.num_of_broadcasts, 1);
        assert_eq!(cla.sends(), vec![None]);
    }

    #[tokio::test]
    async fn broadcast_spacing_respected() {
        let config = Config {
            min_forwards: 9,
            max_broadcasts: 9,
            ms_between_broadcast: 60_000,
            ..Config::default()
        };
        let storage = Arc::new(InMemoryStorage::new(&config));
        let cla = Arc::new(ScriptedCla::new("lora", false, true));
        let router = router(&config, storage, cla.clone());

        let mut bi = info(0, local_millis());
        router.forward(&mut bi).await;
        assert_eq!(bi.num_of_broadcasts, 1);
        // immediately again: suppressed
        router.forward(&mut bi).await;
        assert_eq!(bi.num_of_broadcasts, 1);
        assert_eq!(cla.sends().len(), 1);
    }

    #[tokio::test]
    async fn direct_sends_skip_covered_peers() {
        let config = Config {
            min_forwards: 1,
            max_broadcasts: 0,
            ..Config::default()
        };
        let storage = Arc::new(InMemoryStorage::new(&config));
        storage.add_node(Node::new("dtn:a"));
        storage.add_node(Node::new("dtn:b"));
        let cla = Arc::new(ScriptedCla::new("uart", true, true));
        let router = router(&config, storage, cla.clone());

        let mut bi = info(0, local_millis());
        bi.forwarded_to.push(Node::new("dtn:a"));
        let (success, _) = router.forward(&mut bi).await;

        assert!(success);
        assert_eq!(cla.sends(), vec![Some("dtn:b".to_string())]);
        assert_eq!(bi.forwarded_to.len(), 2);
    }

    #[tokio::test]
    async fn failed_broadcast_reports_traffic_pared() {
        let config = Config {
            min_forwards: 1,
            max_broadcasts: 1,
            ..Config::default()
        };
        let storage = Arc::new(InMemoryStorage::new(&config));
        let cla = Arc::new(ScriptedCla::new("lora", false, false));
        let router = router(&config, storage, cla);

        let mut bi = info(0, local_millis());
        let (success, reason) = router.forward(&mut bi).await;
        assert!(!success);
        assert_eq!(reason, ReasonCode::TrafficPared);
        assert_eq!(bi.num_of_broadcasts, 0);
    }
}
