//! # Test Fixtures
//!
//! A four-replica stepped cluster plus one client, and helpers that push
//! transactions through the full client → consensus → execution path.

use node_runtime::{LocalClient, LocalCluster, Node, NodeConfig};
use serde_json::json;
use shared_crypto::Ed25519KeyPair;
use shared_types::{
    Address, Args, NodeId, Receipt, ReplyStatus, Request, Transaction, Value,
};
use std::cell::Cell;
use std::sync::{Arc, Once};

pub const CLIENT: &str = "client-1";
pub const REPLICAS: usize = 4;

static LOGGING: Once = Once::new();

/// Route `tracing` output through the test harness (`RUST_LOG` filters it).
pub fn init_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn keypair(seed: u8) -> Ed25519KeyPair {
    Ed25519KeyPair::from_seed([seed; 32])
}

pub fn address(keypair: &Ed25519KeyPair) -> Address {
    Address::from_public_key(keypair.public_key().as_bytes())
}

pub fn int_args(name: &str, value: i64) -> Args {
    let mut args = Args::new();
    args.insert(name.into(), Value::Int(value));
    args
}

/// Contract keeping a running total, with an oracle round trip.
pub fn vault_code() -> String {
    json!({
        "module": "contract",
        "init": [{"op": "set", "path": [{"lit": "total"}], "value": {"lit": 0}}],
        "methods": {
            "deposit": {
                "params": {"amount": "int"},
                "body": [
                    {"op": "require", "cond": {"gt": [{"arg": "amount"}, {"lit": 0}]}, "message": "amount must be positive"},
                    {"op": "let", "name": "next", "value": {"add": [{"get": {"path": [{"lit": "total"}]}}, {"arg": "amount"}]}},
                    {"op": "set", "path": [{"lit": "total"}], "value": {"var": "next"}},
                    {"op": "return", "value": {"var": "next"}}
                ]
            },
            "total": {
                "body": [{"op": "return", "value": {"get": {"path": [{"lit": "total"}]}}}]
            },
            "ask": {
                "body": [
                    {"op": "call", "contract": "oracle", "method": "query_data",
                     "args": {"method": {"lit": "receive"}}, "into": "key"},
                    {"op": "return", "value": {"var": "key"}}
                ]
            },
            "receive": {
                "params": {"data": "any", "key": "str"},
                "body": [
                    {"op": "set", "path": [{"lit": "price"}], "value": {"arg": "data"}},
                    {"op": "return", "value": {"arg": "data"}}
                ]
            }
        }
    })
    .to_string()
}

/// Stepped cluster with one attached client.
pub struct Harness {
    pub cluster: LocalCluster,
    pub client: LocalClient,
    timestamp: Cell<u64>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with(|_| {})
    }

    pub fn with(configure: impl Fn(&mut NodeConfig)) -> Self {
        init_logging();
        let cluster = LocalCluster::new(REPLICAS, configure).expect("cluster builds");
        let client = cluster.client(CLIENT);
        Self {
            cluster,
            client,
            timestamp: Cell::new(1),
        }
    }

    pub fn node(&self, id: NodeId) -> &Arc<Node> {
        self.cluster.node(id)
    }

    /// Wrap `tx` with a fresh client timestamp.
    pub fn request(&self, tx: &Transaction) -> Request {
        let timestamp = self.timestamp.get();
        self.timestamp.set(timestamp + 1);
        Request::for_transaction(tx, CLIENT, timestamp).expect("request encodes")
    }

    /// Broadcast and run the cluster until it is quiet.
    pub fn send(&self, request: &Request) {
        self.client.submit(request).expect("request encodes");
        self.cluster.pump();
    }

    pub fn submit(&self, tx: &Transaction) -> Request {
        let request = self.request(tx);
        self.send(&request);
        request
    }

    pub fn result(&self, request: &Request) -> Option<ReplyStatus> {
        self.client.result(&request.message_id)
    }

    /// Submit `tx` and return the receipt `f + 1` replicas agree on.
    pub fn commit(&self, tx: &Transaction) -> Receipt {
        let request = self.submit(tx);
        expect_committed(self.result(&request))
    }

    /// Register `keypair` and check it succeeded.
    pub fn register(&self, keypair: &Ed25519KeyPair) -> Address {
        let receipt = self.commit(&Transaction::register(keypair.public_key().as_bytes()));
        assert!(receipt.outcome.is_success(), "register failed: {receipt:?}");
        address(keypair)
    }

    /// Publish the vault contract as `owner`.
    pub fn publish_vault(&self, owner: &Ed25519KeyPair, nonce: u64) {
        let tx = Transaction::publish(address(owner), "vault", &vault_code(), nonce).signed(owner);
        let receipt = self.commit(&tx);
        assert!(receipt.outcome.is_success(), "publish failed: {receipt:?}");
    }

    pub fn balance(&self, node: NodeId, address: &Address) -> Option<u64> {
        self.node(node)
            .query()
            .get_account(address)
            .expect("account query")
            .map(|account| account.balance)
    }

    pub fn vault(&self, node: NodeId, key: &str) -> Value {
        self.node(node)
            .query()
            .get_contract_data("vault", &[key.to_string()])
            .expect("contract data")
    }

    /// Every listed replica holds byte-identical ledger state.
    pub fn assert_replicas_agree(&self, ids: &[NodeId]) {
        let reference = self.cluster.store(ids[0]).snapshot();
        assert!(!reference.is_empty());
        for id in &ids[1..] {
            assert!(
                self.cluster.store(*id).snapshot() == reference,
                "replica {id} diverged from replica {}",
                ids[0]
            );
        }
    }
}

pub fn expect_committed(status: Option<ReplyStatus>) -> Receipt {
    match status {
        Some(ReplyStatus::Committed(receipt)) => receipt,
        other => panic!("expected a committed receipt, got {other:?}"),
    }
}
