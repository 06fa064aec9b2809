//! Peer-aware epidemic flooding with optional reception confirmation.
//!
//! The router only transmits while there are known peers that do not hold
//! the bundle yet, so it depends on some discovery mechanism feeding the
//! peer table. With `use_received_set` enabled, peers advertise hashes of
//! the bundle ids they received; an assumed delivery that is never confirmed
//! is rolled back and the peer gets the bundle again.

use super::{note_forwarded, Router, RouterContext};
use crate::bundle_info::BundleInfo;
use crate::cla::Cla;
use crate::config::Config;
use crate::hash::bundle_id_hash;
use crate::node::Node;
use crate::reason::ReasonCode;
use crate::storage::Storage;
use crate::SetupError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};
use tundra_bpv7::dtn_time::local_millis;
use tundra_bpv7::eid::Eid;

pub struct EpidemicRouter {
    ctx: RouterContext,
    required_forwards: usize,
    use_received_set: bool,
}

impl EpidemicRouter {
    pub fn new(
        config: &Config,
        storage: Arc<dyn Storage>,
        local_eid: Eid,
    ) -> Result<Self, SetupError> {
        Ok(Self {
            ctx: RouterContext::new(config, storage, local_eid)?,
            required_forwards: config.required_forwards,
            use_received_set: config.use_received_set,
        })
    }

    /// Decides whether `peer` already holds the bundle.
    ///
    /// With reception confirmation on: a peer advertising `hash(id)` is
    /// confirmed (the hash is consumed and the peer entry persisted), and a
    /// peer that was assumed to have received the bundle but never confirmed
    /// it is removed from `forwarded_to` so it gets the bundle again.
    fn check_forwarded_to(&self, mut peer: Node, info: &mut BundleInfo, id: &str) -> bool {
        if self.use_received_set {
            let hash = bundle_id_hash(id);
            if peer.received_hashes.remove(&hash) {
                peer.confirmed_reception = true;
                self.ctx.storage.add_node(peer.clone());
                trace!(peer = %peer.uri, id, "reception confirmed by advertised hash");
                match info.forwarded_to.iter_mut().find(|f| f.uri == peer.uri) {
                    Some(entry) => entry.confirmed_reception = true,
                    None => info.forwarded_to.push(peer),
                }
                return true;
            }

            if let Some(at) = info.forwarded_to.iter().position(|f| f.uri == peer.uri) {
                if info.forwarded_to[at].confirmed_reception {
                    return true;
                }
                // assumed delivery was never confirmed: roll it back
                info.forwarded_to.remove(at);
                trace!(peer = %peer.uri, id, "unconfirmed delivery rolled back");
                return false;
            }
            return false;
        }

        info.was_forwarded_to(&peer.uri)
    }
}

#[async_trait]
impl Router for EpidemicRouter {
    fn add_cla(&self, cla: Arc<dyn Cla>) {
        self.ctx.clas.write().unwrap().push(cla);
    }

    fn clas(&self) -> Vec<Arc<dyn Cla>> {
        self.ctx.clas()
    }

    async fn forward(&self, info: &mut BundleInfo) -> (bool, ReasonCode) {
        let id = info.id();
        let peers = self.ctx.storage.get_nodes();
        let to_forward: Vec<Node> = peers
            .into_iter()
            .filter(|peer| !self.check_forwarded_to(peer.clone(), info, &id))
            .collect();

        if to_forward.is_empty() {
            debug!(id = %id, "no peers missing this bundle");
            return (false, ReasonCode::NoTimelyContact);
        }

        let clas = self.ctx.clas();
        let prepared = self.ctx.prepare(info);
        let mut reason = ReasonCode::NoTimelyContact;
        let mut broadcast_succeeded = false;

        for cla in &clas {
            if cla.can_address() {
                for peer in &to_forward {
                    if cla.send(&prepared, Some(peer)).await {
                        note_forwarded(info, peer);
                    }
                }
            } else if cla.send(&prepared, None).await {
                reason = ReasonCode::ForwardedOverUnidirectionalLink;
                info.num_of_broadcasts += 1;
                info.last_broadcast_time = local_millis();
                broadcast_succeeded = true;
            } else {
                reason = ReasonCode::TrafficPared;
            }
        }

        // one successful broadcast is assumed to have reached every
        // outstanding peer
        if broadcast_succeeded {
            for peer in &to_forward {
                note_forwarded(info, peer);
            }
        }

        let success = info.forwarded_to.len() >= self.required_forwards;
        debug!(
            id = %id,
            forwarded = info.forwarded_to.len(),
            broadcasts = info.num_of_broadcasts,
            success,
            "epidemic forwarding pass done"
        );
        (success, reason)
    }
}
