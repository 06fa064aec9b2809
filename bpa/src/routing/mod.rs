//! Forwarding policy: which peers get a bundle, over which CLAs, and when
//! to give up versus store for retry.

use crate::bundle_info::{BundleInfo, ReceivedBundle};
use crate::cla::Cla;
use crate::config::Config;
use crate::node::Node;
use crate::reason::ReasonCode;
use crate::storage::Storage;
use crate::SetupError;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tundra_bpv7::bundle::Bundle;
use tundra_bpv7::crc::CrcType;
use tundra_bpv7::dtn_time::local_millis;
use tundra_bpv7::eid::Eid;

mod broadcast;
mod epidemic;

pub use broadcast::SimpleBroadcastRouter;
pub use epidemic::EpidemicRouter;

#[async_trait]
pub trait Router: Send + Sync {
    /// Registers a transport with this router.
    fn add_cla(&self, cla: Arc<dyn Cla>);

    /// Snapshot of the registered transports.
    fn clas(&self) -> Vec<Arc<dyn Cla>>;

    /// One forwarding attempt. Mutates the routing metadata (`forwarded_to`,
    /// broadcast counters) and reports overall success plus the reason code
    /// describing the outcome.
    async fn forward(&self, info: &mut BundleInfo) -> (bool, ReasonCode);
}

/// Drains the poll interface of every CLA registered with the router.
pub async fn poll_new_bundles(router: &dyn Router) -> Vec<ReceivedBundle> {
    let mut polled = Vec::new();
    for cla in router.clas() {
        polled.extend(cla.poll_new_bundles().await);
    }
    polled
}

/// Per-send bundle preparation (RFC 9171 §5.4 step 4): work on a clone,
/// replace any previous-node block with one naming this node, account the
/// residence time into the bundle-age block, and take the hop.
pub(crate) fn prepare_for_send(
    info: &BundleInfo,
    local_eid: &Eid,
    attach_previous_node: bool,
    canonical_crc: CrcType,
) -> Bundle {
    let mut prepared = info.bundle.clone();
    prepared.remove_previous_node();
    if attach_previous_node {
        prepared.attach_previous_node(local_eid, canonical_crc);
    }
    if prepared.has_bundle_age {
        prepared.increase_age(local_millis().saturating_sub(info.bundle.received_at));
    }
    if prepared.has_hop_count {
        prepared.increase_hop_count();
    }
    prepared
}

/// Settings shared by the routing policies, wired once at setup.
pub(crate) struct RouterContext {
    pub clas: RwLock<Vec<Arc<dyn Cla>>>,
    pub storage: Arc<dyn Storage>,
    pub local_eid: Eid,
    pub attach_previous_node: bool,
    pub canonical_crc: CrcType,
}

impl RouterContext {
    fn new(config: &Config, storage: Arc<dyn Storage>, local_eid: Eid) -> Result<Self, SetupError> {
        Ok(Self {
            clas: RwLock::new(Vec::new()),
            storage,
            local_eid,
            attach_previous_node: config.attach_previous_node,
            canonical_crc: config.canonical_crc()?,
        })
    }

    fn clas(&self) -> Vec<Arc<dyn Cla>> {
        self.clas.read().unwrap().clone()
    }

    fn prepare(&self, info: &BundleInfo) -> Bundle {
        prepare_for_send(
            info,
            &self.local_eid,
            self.attach_previous_node,
            self.canonical_crc,
        )
    }
}

/// Builds the routing policy named in the config.
pub fn by_name(
    config: &Config,
    storage: Arc<dyn Storage>,
    local_eid: Eid,
) -> Result<Arc<dyn Router>, SetupError> {
    match config.router.as_str() {
        "broadcast" => Ok(Arc::new(SimpleBroadcastRouter::new(
            config, storage, local_eid,
        )?)),
        "epidemic" => Ok(Arc::new(EpidemicRouter::new(config, storage, local_eid)?)),
        other => Err(SetupError::UnknownRouter(other.to_string())),
    }
}

/// Appends a peer to `forwarded_to` unless its URI is already listed.
pub(crate) fn note_forwarded(info: &mut BundleInfo, peer: &Node) {
    if !info.was_forwarded_to(&peer.uri) {
        info.forwarded_to.push(peer.clone());
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::info;
    use tundra_bpv7::block::CanonicalBlock;

    #[test]
    fn prepare_replaces_previous_node_and_takes_the_hop() {
        let mut bi = info(0, local_millis().saturating_sub(250));
        bi.bundle
            .insert_canonical(CanonicalBlock::previous_node(
                &"dtn:old-relay".parse().unwrap(),
                CrcType::None,
            ));
        bi.bundle
            .insert_canonical(CanonicalBlock::bundle_age(1_000, CrcType::None));
        bi.bundle
            .insert_canonical(CanonicalBlock::hop_count(16, 2, CrcType::None));

        let local: Eid = "dtn:me".parse().unwrap();
        let prepared = prepare_for_send(&bi, &local, true, CrcType::None);

        assert_eq!(prepared.hop_count(), Some(3));
        assert_eq!(prepared.hop_limit(), Some(16));
        assert!(prepared.age().unwrap() >= 1_250);
        // the original is untouched
        assert_eq!(bi.bundle.hop_count(), Some(2));
        assert_eq!(bi.bundle.age(), Some(1_000));

        let prev = prepared
            .extensions()
            .iter()
            .find(|b| b.block_type == tundra_bpv7::block::type_code::PREVIOUS_NODE)
            .unwrap();
        let mut dec = tundra_cbor::decode::Decoder::new(&prev.data);
        assert_eq!(Eid::parse(&mut dec).unwrap(), local);
    }

    #[test]
    fn prepare_can_skip_the_previous_node_block() {
        let bi = info(0, local_millis());
        let prepared = prepare_for_send(&bi, &"dtn:me".parse().unwrap(), false, CrcType::None);
        assert!(!prepared.has_previous_node);
    }
}
