//! Node assembly and the long-running tasks.
//!
//! [`Runtime::start`] wires the configured storage backend and routing
//! policy to a [`Bpa`] and spawns the receive, forward, retry and CLA-poll
//! loops. [`Runtime::shutdown`] stops the tasks, then the transports, then
//! drops storage.

use crate::bpa::Bpa;
use crate::cla::{Cla, ReceiveHandle};
use crate::config::Config;
use crate::endpoint::{DeliveryCallback, Endpoint};
use crate::node::{Node, STATIC_PEER};
use crate::storage::Storage;
use crate::task_pool::TaskPool;
use crate::{routing, storage, SetupError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tundra_bpv7::dtn_time::local_millis;
use tundra_bpv7::eid::Eid;

pub struct Runtime {
    bpa: Arc<Bpa>,
    tasks: TaskPool,
}

impl Runtime {
    /// Builds a node with `uri` as its node id and starts its tasks.
    /// Must be called from within a tokio runtime.
    pub fn start(uri: &str, config: Config) -> Result<Self, SetupError> {
        let local_eid: Eid = uri.parse()?;
        let storage = storage::by_name(&config)?;
        let router = routing::by_name(&config, storage.clone(), local_eid)?;
        let bpa = Bpa::new(uri, config, storage, router)?;
        info!(uri, "node starting");

        let tasks = TaskPool::new();
        tasks.spawn(receive_loop(bpa.clone(), tasks.cancel_token()));
        tasks.spawn(forward_loop(bpa.clone(), tasks.cancel_token()));
        tasks.spawn(retry_loop(bpa.clone(), tasks.cancel_token()));
        tasks.spawn(poll_cla_loop(bpa.clone(), tasks.cancel_token()));

        Ok(Self { bpa, tasks })
    }

    /// The central endpoint carrying the node URI.
    pub fn local_endpoint(&self) -> Arc<Endpoint> {
        self.bpa.local_endpoint()
    }

    pub fn local_uri(&self) -> String {
        self.bpa.local_uri()
    }

    /// Creates and registers an application endpoint. With a duplicate URI
    /// the endpoint is returned unattached and its sends fail with
    /// `NotRegistered`.
    pub fn register_endpoint(
        &self,
        uri: &str,
        callback: Option<DeliveryCallback>,
    ) -> Result<Arc<Endpoint>, SetupError> {
        let eid: Eid = uri.parse()?;
        let endpoint = Endpoint::new(eid);
        if let Some(callback) = callback {
            endpoint.set_callback(callback);
        }
        self.bpa.register_endpoint(&endpoint);
        Ok(endpoint)
    }

    pub fn unregister_endpoint(&self, uri: &str) -> Option<Arc<Endpoint>> {
        self.bpa.unregister_endpoint(uri)
    }

    /// Registers a transport with the routing policy.
    pub fn add_cla(&self, cla: Arc<dyn Cla>) {
        info!(cla = cla.name(), "registering CLA");
        self.bpa.router.add_cla(cla);
    }

    /// A handle push CLAs use to enqueue received bundles.
    pub fn receive_handle(&self) -> ReceiveHandle {
        ReceiveHandle::new(self.bpa.receive_tx.clone())
    }

    /// Adds a peer that is never aged out.
    pub fn add_static_peer(&self, mut node: Node) {
        node.last_seen = STATIC_PEER;
        self.bpa.storage.add_node(node);
    }

    /// Records this node's own position (e.g. from a GPS fix).
    pub fn set_local_position(&self, lat: f32, lng: f32) {
        self.bpa
            .local_node
            .lock()
            .unwrap()
            .set_position(lat, lng);
    }

    pub fn set_clock_synced(&self, synced: bool) {
        self.bpa.set_clock_synced(synced);
    }

    /// Wakes the retry task ahead of its interval.
    pub fn trigger_retry(&self) {
        self.bpa.retry_notify.notify_one();
    }

    /// Cancels a pending retransmission. True iff the bundle was held in
    /// storage at the moment of the call.
    pub fn cancel_transmission(&self, id: &str) -> bool {
        self.bpa.cancel_transmission(id)
    }

    /// The storage backend, for diagnostics and peer-table inspection.
    pub fn storage(&self) -> Arc<dyn Storage> {
        self.bpa.storage.clone()
    }

    /// Stops the node: tasks first (they source and sink bundles), then the
    /// transports, then storage goes down with the runtime.
    pub async fn shutdown(self) {
        info!("node shutting down");
        self.tasks.shutdown().await;
        for cla in self.bpa.router.clas() {
            cla.shutdown().await;
        }
    }
}

async fn receive_loop(bpa: Arc<Bpa>, cancel: CancellationToken) {
    debug!("receive loop started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = bpa.receive_rx.recv_async() => match received {
                Ok(received) => bpa.handle_received(received).await,
                Err(_) => break,
            },
        }
    }
    debug!("receive loop stopped");
}

async fn forward_loop(bpa: Arc<Bpa>, cancel: CancellationToken) {
    debug!("forward loop started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            info = bpa.forward_rx.recv_async() => match info {
                Ok(info) => bpa.bundle_forwarding(info).await,
                Err(_) => break,
            },
        }
    }
    debug!("forward loop stopped");
}

/// Periodically ages out peers and re-enqueues stored bundles, in cycles
/// bounded by the storage snapshot. An external trigger can cut the wait
/// short.
async fn retry_loop(bpa: Arc<Bpa>, cancel: CancellationToken) {
    let interval = Duration::from_millis(bpa.config.retry_interval_ms);
    let gap = Duration::from_millis(bpa.config.retry_send_gap_ms);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
            _ = bpa.retry_notify.notified() => {
                debug!("retry cycle triggered externally");
            }
        }

        clear_old_peers(&bpa);

        debug!("retrying stored bundles");
        bpa.storage.begin_retry_cycle();
        while bpa.storage.has_bundles_to_retry() {
            for info in bpa.storage.get_bundles_retry() {
                if cancel.is_cancelled() {
                    return;
                }
                // a bundle fetched for retry is no longer stored; expired
                // ones are dropped right here
                if bpa.check_expiration(&info) {
                    if bpa.forward_tx.send_async(info).await.is_err() {
                        return;
                    }
                }
                // spaced out so a slow receiver can keep up
                tokio::time::sleep(gap).await;
            }
        }
    }
}

async fn poll_cla_loop(bpa: Arc<Bpa>, cancel: CancellationToken) {
    let interval = Duration::from_millis(bpa.config.poll_interval_ms);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        for received in routing::poll_new_bundles(bpa.router.as_ref()).await {
            if bpa.receive_tx.send_async(received).await.is_err() {
                return;
            }
        }
    }
}

/// Removes peers not heard from within `max_peer_age_ms`. Statically-added
/// peers are exempt.
fn clear_old_peers(bpa: &Bpa) {
    let now = local_millis();
    for node in bpa.storage.get_nodes() {
        if node.is_static() {
            continue;
        }
        if now.saturating_sub(node.last_seen) > bpa.config.max_peer_age_ms {
            info!(peer = %node.uri, "removing aged-out peer");
            bpa.storage.remove_node(&node.uri);
        }
    }
}
