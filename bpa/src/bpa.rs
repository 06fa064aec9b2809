//! The Bundle Protocol Agent: queues, endpoint registry, and the
//! receive/dispatch/forward/delete procedures of RFC 9171 §5.

use crate::bundle_info::{BundleInfo, ReceivedBundle, Retention};
use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::hash::bundle_id_hash;
use crate::node::Node;
use crate::reason::ReasonCode;
use crate::routing::Router;
use crate::storage::Storage;
use crate::{SendError, SetupError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Notify;
use tracing::{debug, info, trace, warn};
use tundra_bpv7::block::type_code;
use tundra_bpv7::bundle::Bundle;
use tundra_bpv7::crc::CrcType;
use tundra_bpv7::dtn_time::{local_millis, DtnTime};
use tundra_bpv7::eid::Eid;

pub struct Bpa {
    pub(crate) config: Config,
    pub(crate) primary_crc: CrcType,
    pub(crate) canonical_crc: CrcType,
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) router: Arc<dyn Router>,
    /// This node, as a peer: its URI, EIDs, and the received-hashes set
    /// advertised to neighbours. Never stored in the peer table.
    pub(crate) local_node: Mutex<Node>,
    local_endpoint: Arc<Endpoint>,
    endpoints: RwLock<Vec<Arc<Endpoint>>>,
    pub(crate) receive_tx: flume::Sender<ReceivedBundle>,
    pub(crate) receive_rx: flume::Receiver<ReceivedBundle>,
    pub(crate) forward_tx: flume::Sender<BundleInfo>,
    pub(crate) forward_rx: flume::Receiver<BundleInfo>,
    clock_synced: AtomicBool,
    pub(crate) retry_notify: Notify,
}

impl Bpa {
    pub(crate) fn new(
        uri: &str,
        config: Config,
        storage: Arc<dyn Storage>,
        router: Arc<dyn Router>,
    ) -> Result<Arc<Self>, SetupError> {
        let eid: Eid = uri.parse()?;
        let (receive_tx, receive_rx) = flume::bounded(config.receive_queue_size);
        let (forward_tx, forward_rx) = flume::bounded(config.forward_queue_size);

        let mut local_node = Node::new(uri);
        local_node.identifier = uri.to_string();

        let bpa = Arc::new(Self {
            primary_crc: config.primary_crc()?,
            canonical_crc: config.canonical_crc()?,
            config,
            storage,
            router,
            local_node: Mutex::new(local_node),
            local_endpoint: Endpoint::new(eid),
            endpoints: RwLock::new(Vec::new()),
            receive_tx,
            receive_rx,
            forward_tx,
            forward_rx,
            clock_synced: AtomicBool::new(false),
            retry_notify: Notify::new(),
        });

        let local = bpa.local_endpoint.clone();
        bpa.register_endpoint(&local);
        Ok(bpa)
    }

    pub fn local_endpoint(&self) -> Arc<Endpoint> {
        self.local_endpoint.clone()
    }

    pub fn local_uri(&self) -> String {
        self.local_node.lock().unwrap().uri.clone()
    }

    /// Registers an endpoint. Refuses a second endpoint with the same URI.
    pub fn register_endpoint(self: &Arc<Self>, endpoint: &Arc<Endpoint>) -> bool {
        let mut endpoints = self.endpoints.write().unwrap();
        if endpoints.iter().any(|e| e.eid() == endpoint.eid()) {
            warn!(eid = %endpoint.eid(), "endpoint already registered");
            return false;
        }
        endpoint.attach(self);
        info!(eid = %endpoint.eid(), "registered endpoint");
        endpoints.push(endpoint.clone());
        true
    }

    /// Unregisters by URI and returns the detached endpoint.
    pub fn unregister_endpoint(&self, uri: &str) -> Option<Arc<Endpoint>> {
        let mut endpoints = self.endpoints.write().unwrap();
        let at = endpoints.iter().position(|e| e.uri() == uri)?;
        let endpoint = endpoints.remove(at);
        endpoint.detach();
        Some(endpoint)
    }

    pub fn is_local_dest(&self, destination: &Eid) -> bool {
        self.endpoints
            .read()
            .unwrap()
            .iter()
            .any(|e| e.eid() == destination)
    }

    pub fn clock_synced(&self) -> bool {
        self.clock_synced.load(Ordering::Acquire)
    }

    /// Marks the node clock as synchronized to DTN time. Only honored when
    /// the node is configured with an accurate clock.
    pub fn set_clock_synced(&self, synced: bool) {
        if self.config.has_accurate_clock {
            self.clock_synced.store(synced, Ordering::Release);
        } else if synced {
            warn!("ignoring clock sync, node is not configured with an accurate clock");
        }
    }

    /// Local origination: enqueue onto the receive queue as if the bundle
    /// had arrived from this node itself.
    pub(crate) async fn bundle_transmission(&self, bundle: Bundle) -> Result<(), SendError> {
        let from = self.local_uri();
        self.receive_tx
            .send_async(ReceivedBundle::new(bundle, from))
            .await
            .map_err(|_| SendError::Closed)
    }

    /// Removes a not-yet-retried bundle from storage. Bundles already in
    /// the queues or in flight cannot be cancelled.
    pub fn cancel_transmission(&self, id: &str) -> bool {
        self.storage.remove_bundle(id)
    }

    /// One receive-queue item: peer bookkeeping, duplicate suppression,
    /// then reception proper.
    pub(crate) async fn handle_received(&self, received: ReceivedBundle) {
        let id = received.bundle.id();
        trace!(id = %id, from = %received.from, "bundle off the receive queue");

        if self.config.use_received_set {
            // advertise that this node now holds the bundle
            self.local_node
                .lock()
                .unwrap()
                .received_hashes
                .insert(bundle_id_hash(&id));
        }

        let local_uri = self.local_uri();
        if received.from != "none" && received.from != local_uri {
            // implicit discovery: an unknown sender becomes a known peer
            let mut peer = self
                .storage
                .get_node(&received.from)
                .unwrap_or_else(|| Node::new(received.from.clone()));
            peer.touch();
            self.storage.add_node(peer);
        }

        if self.storage.check_seen(&id) {
            debug!(id = %id, "duplicate bundle discarded");
            return;
        }
        self.storage.store_seen(&id);
        self.bundle_reception(received.bundle, &received.from).await;
    }

    /// RFC 9171 §5.6 bundle reception.
    pub(crate) async fn bundle_reception(&self, mut bundle: Bundle, from: &str) {
        let id = bundle.id();

        // per-block processing-flag checks for unknown extension types
        let mut discard = Vec::new();
        for block in bundle.extensions() {
            if type_code::is_known(block.block_type) {
                continue;
            }
            if block.flags.report_unprocessable {
                // status-report hook; emission is deferred
                debug!(id = %id, block = block.block_number, "unprocessable block report requested");
            }
            if block.flags.delete_bundle_unprocessable {
                self.bundle_deletion(&id, ReasonCode::BlockUnsupported);
                return;
            }
            if block.flags.discard_block_unprocessable {
                discard.push(block.block_number);
            }
        }
        for number in discard {
            debug!(id = %id, block = number, "discarding unsupported block");
            bundle.remove_block(number);
        }

        if bundle.has_hop_count {
            if let (Some(count), Some(limit)) = (bundle.hop_count(), bundle.hop_limit()) {
                if count >= limit {
                    self.bundle_deletion(&id, ReasonCode::HopLimitExceeded);
                    return;
                }
            }
        }

        let lifetime = self.config.effective_lifetime(bundle.primary.lifetime);
        if bundle.has_bundle_age {
            if let Some(age) = bundle.age() {
                if age >= lifetime {
                    self.bundle_deletion(&id, ReasonCode::LifetimeExpired);
                    return;
                }
            }
        }
        if self.clock_synced() && !bundle.primary.timestamp.creation_time.is_unset() {
            let expires = bundle.primary.timestamp.creation_time.millisecs() + lifetime;
            if expires < DtnTime::now().millisecs() {
                self.bundle_deletion(&id, ReasonCode::LifetimeExpired);
                return;
            }
        }

        let mut info = BundleInfo::new(bundle);
        if from != "none" {
            // never offer the bundle back to its sender
            if let Some(mut peer) = self.storage.get_node(from) {
                peer.touch();
                self.storage.add_node(peer.clone());
                if self.config.use_received_set {
                    peer.confirmed_reception = true;
                }
                info.forwarded_to.push(peer);
            }
        }

        self.bundle_dispatching(info).await;
    }

    /// RFC 9171 §5.3 dispatching: deliver locally when a registered
    /// endpoint matches, and queue for forwarding either way.
    pub(crate) async fn bundle_dispatching(&self, mut info: BundleInfo) {
        if self.is_local_dest(info.bundle.destination()) {
            self.local_delivery(&mut info);
        }
        trace!(id = %info.id(), "dispatched to forward queue");
        if self.forward_tx.send_async(info).await.is_err() {
            debug!("forward queue is gone, node is shutting down");
        }
    }

    fn local_delivery(&self, info: &mut BundleInfo) {
        let destination = info.bundle.destination().clone();
        let endpoints = self.endpoints.read().unwrap().clone();
        for endpoint in endpoints {
            if *endpoint.eid() == destination {
                debug!(id = %info.id(), eid = %destination, "delivering locally");
                endpoint.deliver(&info.bundle);
                info.locally_delivered = true;
            }
        }
        if info.locally_delivered {
            // the node is a member of the destination endpoint and must not
            // forward the bundle to itself
            let local = self.local_node.lock().unwrap().clone();
            if !info.was_forwarded_to(&local.uri) {
                info.forwarded_to.push(local);
            }
        }
    }

    /// RFC 9171 §5.4 forwarding, driven by the forward loop.
    pub(crate) async fn bundle_forwarding(&self, mut info: BundleInfo) {
        info.retention = Retention::ForwardPending;

        let (success, reason) = self.router.forward(&mut info).await;

        if success {
            debug!(id = %info.id(), "forwarding succeeded");
            info.retention = Retention::None;
            return;
        }

        if reason.is_no_failure() {
            debug!(id = %info.id(), ?reason, "no forwarding progress, delaying");
            for evicted in self.storage.delay(info) {
                self.bundle_deletion(&evicted.id(), ReasonCode::DepletedStorage);
            }
            return;
        }

        // forwarding contraindicated for good (RFC 9171 §5.4.2)
        if self.is_local_dest(info.bundle.destination()) {
            info.retention = Retention::None;
        } else {
            self.bundle_deletion(&info.id(), reason);
        }
    }

    /// Drops a bundle. Status-report emission would hook in here.
    pub(crate) fn bundle_deletion(&self, id: &str, reason: ReasonCode) {
        info!(id, ?reason, code = reason.code(), "deleting bundle");
    }

    /// Whether a stored bundle is still worth retrying.
    pub(crate) fn check_expiration(&self, info: &BundleInfo) -> bool {
        let lifetime = self
            .config
            .effective_lifetime(info.bundle.primary.lifetime);

        if info.bundle.has_bundle_age {
            if let Some(stored_age) = info.bundle.age() {
                let residence = local_millis().saturating_sub(info.bundle.received_at);
                let current_age = residence + stored_age;
                if current_age >= lifetime {
                    self.bundle_deletion(&info.id(), ReasonCode::LifetimeExpired);
                    return false;
                }
            }
        }
        if self.clock_synced() && !info.bundle.primary.timestamp.creation_time.is_unset() {
            let expires = info.bundle.primary.timestamp.creation_time.millisecs() + lifetime;
            if expires < DtnTime::now().millisecs() {
                self.bundle_deletion(&info.id(), ReasonCode::LifetimeExpired);
                return false;
            }
        }
        true
    }
}
