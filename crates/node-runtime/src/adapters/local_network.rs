//! # In-Process Network
//!
//! Routes envelopes between replicas and clients living in one process
//! over unbounded `tokio::sync::mpsc` channels. Used by local clusters and
//! the integration tests.
//!
//! A fault hook decides per envelope whether it is delivered, dropped,
//! duplicated or held back; held-back envelopes are released in reverse
//! order by [`LocalNetwork::flush_deferred`], which reorders traffic.
//! Isolated nodes neither send nor receive.

use parking_lot::{Mutex, RwLock};
use ql_01_consensus::Transport;
use shared_types::{Endpoint, Envelope, NodeId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

/// What the network does with one envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Deliver,
    Drop,
    Duplicate,
    /// Hold until the next `flush_deferred`.
    Defer,
}

pub type FaultHook = Arc<dyn Fn(&Envelope, &Endpoint) -> Delivery + Send + Sync>;

/// Traffic counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub delivered: u64,
    pub dropped: u64,
}

#[derive(Default)]
pub struct LocalNetwork {
    nodes: RwLock<HashMap<NodeId, UnboundedSender<Envelope>>>,
    clients: RwLock<HashMap<String, UnboundedSender<Envelope>>>,
    isolated: RwLock<HashSet<NodeId>>,
    fault: RwLock<Option<FaultHook>>,
    deferred: Mutex<Vec<(Envelope, Endpoint)>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a replica; returns its inbox.
    pub fn register_node(&self, id: NodeId) -> UnboundedReceiver<Envelope> {
        let (tx, rx) = unbounded_channel();
        self.nodes.write().insert(id, tx);
        rx
    }

    /// Attach a client under its reply address; returns its inbox.
    pub fn register_client(&self, address: &str) -> UnboundedReceiver<Envelope> {
        let (tx, rx) = unbounded_channel();
        self.clients.write().insert(address.to_string(), tx);
        rx
    }

    pub fn set_fault_hook(&self, hook: FaultHook) {
        *self.fault.write() = Some(hook);
    }

    pub fn clear_fault_hook(&self) {
        *self.fault.write() = None;
    }

    /// Cut a replica off from everyone.
    pub fn isolate(&self, id: NodeId) {
        debug!(node = id, "isolating node");
        self.isolated.write().insert(id);
    }

    pub fn heal(&self, id: NodeId) {
        debug!(node = id, "healing node");
        self.isolated.write().remove(&id);
    }

    /// Release held-back envelopes, newest first. Returns how many.
    pub fn flush_deferred(&self) -> usize {
        let deferred = std::mem::take(&mut *self.deferred.lock());
        let count = deferred.len();
        for (envelope, destination) in deferred.into_iter().rev() {
            self.route(envelope, &destination);
        }
        count
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn is_cut(&self, envelope: &Envelope, destination: &Endpoint) -> bool {
        let isolated = self.isolated.read();
        if isolated.is_empty() {
            return false;
        }
        let touches = |endpoint: &Endpoint| matches!(endpoint, Endpoint::Node(id) if isolated.contains(id));
        touches(&envelope.from) || touches(destination)
    }

    fn route(&self, envelope: Envelope, destination: &Endpoint) {
        let sender = match destination {
            Endpoint::Node(id) => self.nodes.read().get(id).cloned(),
            Endpoint::Client(address) => self.clients.read().get(address).cloned(),
        };
        let Some(sender) = sender else {
            trace!(%destination, "no such endpoint; dropping");
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if sender.send(envelope).is_ok() {
            self.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Transport for LocalNetwork {
    fn send(&self, envelope: Envelope, destination: Endpoint) {
        if self.is_cut(&envelope, &destination) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let decision = match self.fault.read().as_ref() {
            Some(hook) => hook(&envelope, &destination),
            None => Delivery::Deliver,
        };
        match decision {
            Delivery::Deliver => self.route(envelope, &destination),
            Delivery::Drop => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Delivery::Duplicate => {
                self.route(envelope.clone(), &destination);
                self.route(envelope, &destination);
            }
            Delivery::Defer => self.deferred.lock().push((envelope, destination)),
        }
    }
}
