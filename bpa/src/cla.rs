//! The Convergence Layer Adapter contract.
//!
//! A CLA wraps one transport (a radio, a serial link, a socket). Transports
//! that can push hand received bundles straight to the node through a
//! [`ReceiveHandle`]; transports that cannot are drained periodically via
//! [`Cla::poll_new_bundles`].

use crate::bundle_info::ReceivedBundle;
use crate::node::Node;
use async_trait::async_trait;
use tundra_bpv7::bundle::Bundle;

#[async_trait]
pub trait Cla: Send + Sync {
    /// A unique, readable transport name for logs.
    fn name(&self) -> &str;

    /// True when the CLA can target a specific peer; false for
    /// broadcast-only transports.
    fn can_address(&self) -> bool;

    /// Sends a bundle, to `peer` when [`can_address`](Self::can_address) is
    /// true. Must return within a transport-defined deadline and must return
    /// `false` instead of queuing when a duty-cycle or rate bound would be
    /// exceeded.
    async fn send(&self, bundle: &Bundle, peer: Option<&Node>) -> bool;

    /// Bundles received since the last poll. Push transports return an
    /// empty list and use their [`ReceiveHandle`] instead.
    async fn poll_new_bundles(&self) -> Vec<ReceivedBundle>;

    /// Stops the transport. Called once during node shutdown.
    async fn shutdown(&self) {}
}

/// A clone-able handle onto the node's receive queue, for push CLAs.
///
/// Enqueueing blocks while the queue is full; there is no drop-on-full.
#[derive(Clone)]
pub struct ReceiveHandle {
    tx: flume::Sender<ReceivedBundle>,
}

impl ReceiveHandle {
    pub(crate) fn new(tx: flume::Sender<ReceivedBundle>) -> Self {
        Self { tx }
    }

    /// Hands a received bundle to the node. Use `from = "none"` when the
    /// transport cannot identify the sender. Returns `false` when the node
    /// is shutting down.
    pub async fn push(&self, bundle: Bundle, from: impl Into<String>) -> bool {
        self.tx
            .send_async(ReceivedBundle::new(bundle, from))
            .await
            .is_ok()
    }

    /// Blocking variant for CLA-internal threads without an async context.
    pub fn push_blocking(&self, bundle: Bundle, from: impl Into<String>) -> bool {
        self.tx.send(ReceivedBundle::new(bundle, from)).is_ok()
    }
}
