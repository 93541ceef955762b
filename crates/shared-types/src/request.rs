//! # Client Requests
//!
//! A [`Request`] is what the consensus layer orders. Its `content` is opaque
//! to consensus: a JSON [`Transaction`] for `Transaction` requests, a JSON
//! [`EventMessage`] for oracle `Event` requests.
//!
//! Wire shape (JSON):
//!
//! ```text
//! {"message": {"id": "...", "content": "<hex>"}, "timestamp": 1,
//!  "clientAddress": "host:port", "type": 0}
//! ```

use crate::codec::{from_json, to_json};
use crate::entities::{hash_args, Address, Args, Hash, Value};
use crate::errors::CodecError;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shared_crypto::{verify_signature, CanonicalHasher, CryptoError, Ed25519KeyPair};

/// Request kinds; `0` = transaction, `1` = event on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RequestKind {
    Transaction,
    Event,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Transaction => "transaction",
            RequestKind::Event => "event",
        }
    }
}

impl TryFrom<u8> for RequestKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RequestKind::Transaction),
            1 => Ok(RequestKind::Event),
            other => Err(format!("unknown request type {other}")),
        }
    }
}

impl From<RequestKind> for u8 {
    fn from(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Transaction => 0,
            RequestKind::Event => 1,
        }
    }
}

/// Client request as ordered by consensus. Immutable once submitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RequestWire", into = "RequestWire")]
pub struct Request {
    pub message_id: String,
    pub content: Vec<u8>,
    pub timestamp: u64,
    pub client_address: String,
    pub kind: RequestKind,
}

#[serde_as]
#[derive(Clone, Serialize, Deserialize)]
struct MessageWire {
    id: String,
    #[serde_as(as = "Hex")]
    content: Vec<u8>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestWire {
    message: MessageWire,
    timestamp: u64,
    client_address: String,
    #[serde(rename = "type")]
    kind: RequestKind,
}

impl From<RequestWire> for Request {
    fn from(wire: RequestWire) -> Self {
        Self {
            message_id: wire.message.id,
            content: wire.message.content,
            timestamp: wire.timestamp,
            client_address: wire.client_address,
            kind: wire.kind,
        }
    }
}

impl From<Request> for RequestWire {
    fn from(request: Request) -> Self {
        Self {
            message: MessageWire {
                id: request.message_id,
                content: request.content,
            },
            timestamp: request.timestamp,
            client_address: request.client_address,
            kind: request.kind,
        }
    }
}

impl Request {
    /// Wrap a transaction; the message id is the transaction hash.
    pub fn for_transaction(
        tx: &Transaction,
        client_address: impl Into<String>,
        timestamp: u64,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            message_id: hex::encode(tx.hash),
            content: to_json(tx)?,
            timestamp,
            client_address: client_address.into(),
            kind: RequestKind::Transaction,
        })
    }

    /// Wrap an oracle event with a fresh message id.
    pub fn for_event(
        event: &EventMessage,
        client_address: impl Into<String>,
        timestamp: u64,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            content: to_json(event)?,
            timestamp,
            client_address: client_address.into(),
            kind: RequestKind::Event,
        })
    }

    /// Content hash binding consensus votes to this exact request.
    pub fn digest(&self) -> Hash {
        let mut hasher = CanonicalHasher::new("ql/request");
        self.hash_into(&mut hasher);
        hasher.finalize()
    }

    /// Canonical serialization used by digests and block hashes.
    pub fn hash_into(&self, hasher: &mut CanonicalHasher) {
        hasher
            .str(&self.message_id)
            .bytes(&self.content)
            .u64(self.timestamp)
            .str(&self.client_address)
            .u8(u8::from(self.kind));
    }

    pub fn decode_transaction(&self) -> Result<Transaction, CodecError> {
        if self.kind != RequestKind::Transaction {
            return Err(CodecError::WrongKind {
                expected: RequestKind::Transaction.as_str(),
                actual: self.kind.as_str(),
            });
        }
        from_json(&self.content)
    }

    pub fn decode_event(&self) -> Result<EventMessage, CodecError> {
        if self.kind != RequestKind::Event {
            return Err(CodecError::WrongKind {
                expected: RequestKind::Event.as_str(),
                actual: self.kind.as_str(),
            });
        }
        from_json(&self.content)
    }

    /// Leaf used for the block Merkle root: the transaction hash when the
    /// content decodes as a transaction, the event hash for events, and the
    /// request digest otherwise.
    pub fn leaf_hash(&self) -> Hash {
        match self.kind {
            RequestKind::Transaction => self
                .decode_transaction()
                .map(|tx| tx.hash)
                .unwrap_or_else(|_| self.digest()),
            RequestKind::Event => self
                .decode_event()
                .map(|event| event.compute_hash())
                .unwrap_or_else(|_| self.digest()),
        }
    }
}

/// Off-chain report delivered to the oracle bridge.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    /// Reporter address.
    pub from: Address,
    pub event_key: String,
    #[serde(default)]
    pub args: Args,
    /// Free-form report body.
    #[serde(default)]
    pub report: Value,
    #[serde_as(as = "Hex")]
    #[serde(default)]
    pub public_key: Vec<u8>,
    #[serde_as(as = "Hex")]
    #[serde(default)]
    pub signature: Vec<u8>,
}

impl EventMessage {
    pub fn new(from: Address, event_key: impl Into<String>, args: Args, report: Value) -> Self {
        Self {
            from,
            event_key: event_key.into(),
            args,
            report,
            public_key: Vec::new(),
            signature: Vec::new(),
        }
    }

    /// Hash over every field except `signature`.
    pub fn compute_hash(&self) -> Hash {
        let mut hasher = CanonicalHasher::new("ql/event");
        hasher.str(self.from.as_str()).str(&self.event_key);
        hash_args(&self.args, &mut hasher);
        self.report.hash_into(&mut hasher);
        hasher.bytes(&self.public_key);
        hasher.finalize()
    }

    /// Sign as `keypair`; also sets `from` to the key's address.
    pub fn signed(mut self, keypair: &Ed25519KeyPair) -> Self {
        self.public_key = keypair.public_key().as_bytes().to_vec();
        self.from = Address::from_public_key(&self.public_key);
        self.signature = keypair.sign(&self.compute_hash()).as_bytes().to_vec();
        self
    }

    /// Unsigned events are accepted as-is; a present signature must verify
    /// and the reporter address must match the key.
    pub fn verify(&self) -> Result<(), CryptoError> {
        if self.signature.is_empty() {
            return Ok(());
        }
        if Address::from_public_key(&self.public_key) != self.from {
            return Err(CryptoError::InvalidPublicKey);
        }
        verify_signature(&self.public_key, &self.compute_hash(), &self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> Request {
        let kp = Ed25519KeyPair::from_seed([1; 32]);
        let tx = Transaction::register(kp.public_key().as_bytes());
        Request::for_transaction(&tx, "127.0.0.1:9000", 42).unwrap()
    }

    #[test]
    fn test_wire_format_shape() {
        let request = sample_request();
        let json: serde_json::Value = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], 0);
        assert_eq!(json["clientAddress"], "127.0.0.1:9000");
        assert_eq!(json["message"]["id"], request.message_id.as_str());
        let back: Request = serde_json::from_value(json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_bincode_roundtrip() {
        let request = sample_request();
        let bytes = bincode::serialize(&request).unwrap();
        let back: Request = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.digest(), request.digest());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let raw = r#"{"message":{"id":"x","content":""},"timestamp":0,"clientAddress":"","type":7}"#;
        assert!(serde_json::from_str::<Request>(raw).is_err());
    }

    #[test]
    fn test_digest_changes_with_content() {
        let a = sample_request();
        let mut b = a.clone();
        b.timestamp += 1;
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_leaf_hash_is_transaction_hash() {
        let request = sample_request();
        let tx = request.decode_transaction().unwrap();
        assert_eq!(request.leaf_hash(), tx.hash);
    }

    #[test]
    fn test_decode_wrong_kind() {
        let request = sample_request();
        assert!(matches!(request.decode_event(), Err(CodecError::WrongKind { .. })));
    }

    #[test]
    fn test_event_signature() {
        let kp = Ed25519KeyPair::from_seed([8; 32]);
        let event = EventMessage::new(Address::default(), "k", Args::new(), Value::Int(3)).signed(&kp);
        assert!(event.verify().is_ok());

        let mut forged = event.clone();
        forged.report = Value::Int(4);
        assert_eq!(forged.verify(), Err(CryptoError::SignatureVerificationFailed));
    }

    #[test]
    fn test_unsigned_event_accepted() {
        let event = EventMessage::new(Address::new("ab"), "k", Args::new(), Value::Null);
        assert!(event.verify().is_ok());
    }
}
