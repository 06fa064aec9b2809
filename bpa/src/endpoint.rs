//! Local application attachment points.
//!
//! An endpoint owns a local EID. Applications either attach a callback
//! (invoked from the receive task, so it must be quick and thread-safe) or
//! poll a buffered inbox.

use crate::bpa::Bpa;
use crate::SendError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;
use tundra_bpv7::block::CanonicalBlock;
use tundra_bpv7::bundle::Bundle;
use tundra_bpv7::creation_timestamp::CreationTimestamp;
use tundra_bpv7::dtn_time::DtnTime;
use tundra_bpv7::eid::Eid;
use tundra_bpv7::primary_block::PrimaryBlock;

/// A bundle handed to an application: the payload plus the addressing
/// fields applications usually care about, and the full primary block for
/// the rest.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub payload: Box<[u8]>,
    pub destination: Eid,
    pub source: Eid,
    pub primary: PrimaryBlock,
}

pub type DeliveryCallback = Box<dyn Fn(Delivery) + Send + Sync>;

struct TxState {
    sequence: u64,
    last_creation_time: u64,
}

pub struct Endpoint {
    eid: Eid,
    bpa: Mutex<Weak<Bpa>>,
    callback: Mutex<Option<DeliveryCallback>>,
    inbox: Mutex<VecDeque<Delivery>>,
    tx_state: Mutex<TxState>,
}

impl Endpoint {
    pub(crate) fn new(eid: Eid) -> Arc<Self> {
        Arc::new(Self {
            eid,
            bpa: Mutex::new(Weak::new()),
            callback: Mutex::new(None),
            inbox: Mutex::new(VecDeque::new()),
            tx_state: Mutex::new(TxState {
                sequence: 0,
                last_creation_time: 0,
            }),
        })
    }

    pub fn eid(&self) -> &Eid {
        &self.eid
    }

    pub fn uri(&self) -> String {
        self.eid.to_string()
    }

    /// Attaches a receive callback. Buffered deliveries from the
    /// callback-less era are dropped.
    pub fn set_callback(&self, callback: DeliveryCallback) {
        self.inbox.lock().unwrap().clear();
        *self.callback.lock().unwrap() = Some(callback);
    }

    pub fn clear_callback(&self) {
        *self.callback.lock().unwrap() = None;
    }

    /// Builds a bundle around `data` and submits it for transmission.
    ///
    /// `anonymous` sends with `dtn:none` as source and report-to. Without a
    /// synchronized clock the creation time is zero and a bundle-age block
    /// is attached instead. `lifetime_ms` falls back to the configured
    /// default.
    pub async fn send(
        &self,
        data: &[u8],
        destination: &str,
        anonymous: bool,
        lifetime_ms: Option<u64>,
    ) -> Result<(), SendError> {
        let bpa = self
            .bpa
            .lock()
            .unwrap()
            .upgrade()
            .ok_or(SendError::NotRegistered)?;
        let destination: Eid = destination.parse()?;

        let (timestamp, attach_age) = {
            let mut tx = self.tx_state.lock().unwrap();
            if bpa.clock_synced() {
                let now = DtnTime::now();
                // same-millisecond sends are told apart by sequence number
                if tx.last_creation_time == now.millisecs() {
                    tx.sequence += 1;
                }
                tx.last_creation_time = now.millisecs();
                (CreationTimestamp::new(now, tx.sequence), false)
            } else {
                tx.sequence += 1;
                (CreationTimestamp::new(DtnTime::ZERO, tx.sequence), true)
            }
        };

        let (source, report_to) = if anonymous {
            (Eid::Null, Eid::Null)
        } else {
            (self.eid.clone(), self.eid.clone())
        };

        let primary = PrimaryBlock::new(
            destination,
            source,
            report_to,
            timestamp,
            lifetime_ms.unwrap_or(bpa.config.default_lifetime_ms),
            bpa.primary_crc,
        );
        let mut bundle = Bundle::new(
            primary,
            CanonicalBlock::payload(data, bpa.canonical_crc),
        );
        if attach_age {
            bundle.insert_canonical(CanonicalBlock::bundle_age(0, bpa.canonical_crc));
        }
        if bpa.config.attach_hop_count {
            bundle.insert_canonical(CanonicalBlock::hop_count(
                bpa.config.hop_limit,
                0,
                bpa.canonical_crc,
            ));
        }

        debug!(id = %bundle.id(), endpoint = %self.eid, "submitting bundle");
        bpa.bundle_transmission(bundle).await
    }

    /// [`send`](Self::send) for text payloads, with default options.
    pub async fn send_text(&self, text: &str, destination: &str) -> Result<(), SendError> {
        self.send(text.as_bytes(), destination, false, None).await
    }

    /// Takes one buffered delivery, oldest first. Always empty while a
    /// callback is attached.
    pub fn poll(&self) -> Option<Delivery> {
        self.inbox.lock().unwrap().pop_front()
    }

    pub fn has_data(&self) -> bool {
        !self.inbox.lock().unwrap().is_empty()
    }

    /// Hands a bundle destined for this endpoint to the application.
    pub(crate) fn deliver(&self, bundle: &Bundle) {
        let delivery = Delivery {
            payload: bundle.payload_data().into(),
            destination: bundle.destination().clone(),
            source: bundle.source().clone(),
            primary: bundle.primary.clone(),
        };
        if let Some(callback) = self.callback.lock().unwrap().as_ref() {
            callback(delivery);
        } else {
            self.inbox.lock().unwrap().push_back(delivery);
        }
    }

    pub(crate) fn attach(&self, bpa: &Arc<Bpa>) {
        *self.bpa.lock().unwrap() = Arc::downgrade(bpa);
    }

    pub(crate) fn detach(&self) {
        *self.bpa.lock().unwrap() = Weak::new();
    }
}
