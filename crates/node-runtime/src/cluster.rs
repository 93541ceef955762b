//! # Local Cluster
//!
//! `n` replicas and any number of clients in one process, connected by a
//! [`LocalNetwork`].
//!
//! Two ways to drive it:
//! - **Stepped** ([`LocalCluster::new`]): a shared manual clock and
//!   [`LocalCluster::pump`], which drains every inbox synchronously until
//!   the network is quiet. Deterministic; used by the integration tests.
//! - **Spawned** ([`LocalCluster::spawn`]): one tokio task per replica on
//!   the system clock, as the `local-cluster` command runs it.

use crate::adapters::LocalNetwork;
use crate::container::NodeConfig;
use crate::node::Node;
use anyhow::Result;
use parking_lot::Mutex;
use ql_01_consensus::{ManualTimeSource, TimeSource, Transport};
use shared_types::{
    CodecError, Endpoint, Envelope, EnvelopeKind, InMemoryKVStore, KeyValueStore, NodeId,
    ReplyStatus, Request,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Envelope handlings per `pump` before giving up on quiescence.
const PUMP_LIMIT: usize = 1_000_000;

/// Clock start for stepped clusters.
const MANUAL_EPOCH_MS: u64 = 1_700_000_000_000;

pub struct LocalCluster {
    network: Arc<LocalNetwork>,
    nodes: Vec<Arc<Node>>,
    stores: Vec<Arc<InMemoryKVStore>>,
    inboxes: Mutex<Vec<UnboundedReceiver<Envelope>>>,
    clock: Option<Arc<ManualTimeSource>>,
}

impl LocalCluster {
    /// Stepped cluster of `n` replicas; `configure` adjusts each node's config.
    pub fn new(n: usize, configure: impl Fn(&mut NodeConfig)) -> Result<Self> {
        let clock = Arc::new(ManualTimeSource::new(MANUAL_EPOCH_MS));
        Self::build(n, configure, Some(clock))
    }

    /// Cluster on the system clock, for [`LocalCluster::spawn`].
    pub fn with_system_clock(n: usize, configure: impl Fn(&mut NodeConfig)) -> Result<Self> {
        Self::build(n, configure, None)
    }

    fn build(
        n: usize,
        configure: impl Fn(&mut NodeConfig),
        clock: Option<Arc<ManualTimeSource>>,
    ) -> Result<Self> {
        let network = Arc::new(LocalNetwork::new());
        let mut nodes = Vec::with_capacity(n);
        let mut stores = Vec::with_capacity(n);
        let mut inboxes = Vec::with_capacity(n);
        for id in 0..n {
            let id = id as NodeId;
            let mut config = NodeConfig::local(id, n, 0);
            configure(&mut config);
            for warning in config.validate()? {
                warn!(node = id, "{warning}");
            }
            let store = Arc::new(InMemoryKVStore::new());
            let kv: Arc<dyn KeyValueStore> = store.clone();
            let transport: Arc<dyn Transport> = network.clone();
            let time = clock.clone().map(|c| c as Arc<dyn TimeSource>);
            inboxes.push(network.register_node(id));
            nodes.push(Arc::new(Node::build(config, kv, transport, time)?));
            stores.push(store);
        }
        Ok(Self {
            network,
            nodes,
            stores,
            inboxes: Mutex::new(inboxes),
            clock,
        })
    }

    pub fn network(&self) -> &Arc<LocalNetwork> {
        &self.network
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &Arc<Node> {
        &self.nodes[id as usize]
    }

    /// Ledger Store of replica `id` (tests compare or break them).
    pub fn store(&self, id: NodeId) -> &Arc<InMemoryKVStore> {
        &self.stores[id as usize]
    }

    pub fn f(&self) -> usize {
        self.nodes.len().saturating_sub(1) / 3
    }

    pub fn client(&self, address: &str) -> LocalClient {
        LocalClient {
            address: address.to_string(),
            inbox: Mutex::new(self.network.register_client(address)),
            network: Arc::clone(&self.network),
            validators: self.nodes.iter().map(|n| n.id()).collect(),
            quorum: self.f() + 1,
            replies: Mutex::new(BTreeMap::new()),
        }
    }

    /// Deliver queued envelopes until every inbox is empty. Returns how
    /// many envelopes were handled.
    pub fn pump(&self) -> usize {
        let mut inboxes = self.inboxes.lock();
        let mut handled = 0;
        loop {
            let mut progressed = false;
            for (node, inbox) in self.nodes.iter().zip(inboxes.iter_mut()) {
                while let Ok(envelope) = inbox.try_recv() {
                    node.handle_envelope(&envelope);
                    handled += 1;
                    progressed = true;
                }
            }
            if !progressed || handled >= PUMP_LIMIT {
                break;
            }
        }
        handled
    }

    /// Move the shared clock, fire every replica's timer and settle.
    pub fn advance(&self, millis: u64) {
        if let Some(clock) = &self.clock {
            clock.advance(millis);
        }
        for node in &self.nodes {
            node.tick();
        }
        self.pump();
    }

    /// Hand every replica to its own task.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let inboxes = std::mem::take(&mut *self.inboxes.lock());
        self.nodes
            .iter()
            .cloned()
            .zip(inboxes)
            .map(|(node, inbox)| tokio::spawn(node.run(inbox, shutdown.clone())))
            .collect()
    }
}

/// A client attached to the local network.
///
/// Requests go to every replica; a result is accepted once `f + 1`
/// replicas sent the same reply.
pub struct LocalClient {
    address: String,
    inbox: Mutex<UnboundedReceiver<Envelope>>,
    network: Arc<LocalNetwork>,
    validators: Vec<NodeId>,
    quorum: usize,
    replies: Mutex<BTreeMap<String, BTreeMap<NodeId, ReplyStatus>>>,
}

impl LocalClient {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Broadcast to all replicas.
    pub fn submit(&self, request: &Request) -> Result<(), CodecError> {
        for id in &self.validators {
            self.submit_to(*id, request)?;
        }
        Ok(())
    }

    /// Send to one replica only.
    pub fn submit_to(&self, node: NodeId, request: &Request) -> Result<(), CodecError> {
        let envelope = Envelope::client_request(request, node)?;
        self.network.send(envelope, Endpoint::Node(node));
        Ok(())
    }

    fn drain(&self) {
        let mut inbox = self.inbox.lock();
        let mut replies = self.replies.lock();
        while let Ok(envelope) = inbox.try_recv() {
            if envelope.kind != EnvelopeKind::Reply {
                continue;
            }
            match envelope.decode_reply() {
                Ok(reply) => {
                    replies
                        .entry(reply.message_id)
                        .or_default()
                        .insert(reply.node, reply.status);
                }
                Err(e) => warn!(client = %self.address, error = %e, "undecodable reply"),
            }
        }
    }

    /// Latest reply per replica for `message_id`.
    pub fn replies(&self, message_id: &str) -> BTreeMap<NodeId, ReplyStatus> {
        self.drain();
        self.replies
            .lock()
            .get(message_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The reply at least `f + 1` replicas agree on, if any.
    pub fn result(&self, message_id: &str) -> Option<ReplyStatus> {
        let replies = self.replies(message_id);
        let statuses: Vec<&ReplyStatus> = replies.values().collect();
        statuses
            .iter()
            .find(|candidate| statuses.iter().filter(|s| s == candidate).count() >= self.quorum)
            .map(|status| (*status).clone())
    }

    /// Forget replies for `message_id` (before resubmitting it).
    pub fn forget(&self, message_id: &str) {
        self.drain();
        self.replies.lock().remove(message_id);
    }

    /// Poll for an accepted result until `timeout` passes.
    pub async fn wait_for(&self, message_id: &str, timeout: Duration) -> Option<ReplyStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(status) = self.result(message_id) {
                return Some(status);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::Ed25519KeyPair;
    use shared_types::Transaction;

    fn register(seed: u8) -> Request {
        let key = Ed25519KeyPair::from_seed([seed; 32]);
        let tx = Transaction::register(key.public_key().as_bytes());
        Request::for_transaction(&tx, "client", seed as u64).unwrap()
    }

    #[test]
    fn test_request_commits_on_every_replica() {
        let cluster = LocalCluster::new(4, |_| {}).unwrap();
        let client = cluster.client("client");
        let request = register(1);
        client.submit(&request).unwrap();
        cluster.pump();

        match client.result(&request.message_id) {
            Some(ReplyStatus::Committed(receipt)) => assert!(receipt.outcome.is_success()),
            other => panic!("unexpected result {other:?}"),
        }
        for node in cluster.nodes() {
            assert_eq!(node.query().tip_height(), 1);
        }
        assert_eq!(client.replies(&request.message_id).len(), 4);
    }

    #[test]
    fn test_no_result_below_quorum() {
        let cluster = LocalCluster::new(4, |_| {}).unwrap();
        let client = cluster.client("client");
        for id in 1..4 {
            cluster.network().isolate(id);
        }
        let request = register(2);
        client.submit(&request).unwrap();
        cluster.pump();
        assert!(client.result(&request.message_id).is_none());
    }

    #[tokio::test]
    async fn test_spawned_cluster_commits() {
        let cluster = LocalCluster::with_system_clock(4, |_| {}).unwrap();
        let client = cluster.client("client");
        let (stop, shutdown) = watch::channel(false);
        let handles = cluster.spawn(shutdown);

        let request = register(3);
        client.submit(&request).unwrap();
        let result = client
            .wait_for(&request.message_id, Duration::from_secs(10))
            .await;
        assert!(matches!(result, Some(ReplyStatus::Committed(_))));

        stop.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
