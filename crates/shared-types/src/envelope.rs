//! # Transport Envelope
//!
//! `{type, content, from, to}`: the only thing the transport sees. The
//! content is opaque bytes; `kind` tells the receiver how to decode it.

use crate::codec::{from_json, from_wire, to_json, to_wire};
use crate::entities::{Hash, NodeId, Receipt};
use crate::errors::CodecError;
use crate::request::Request;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use std::fmt;

/// Addressable party on the network.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    /// A replica, by validator index.
    Node(NodeId),
    /// A client, by the reply address it put in its request.
    Client(String),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Node(id) => write!(f, "node-{id}"),
            Endpoint::Client(addr) => write!(f, "client@{addr}"),
        }
    }
}

/// Envelope type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeKind {
    /// Replica-to-replica consensus protocol traffic (bincode).
    Consensus,
    /// A client request (JSON [`Request`]).
    ClientRequest,
    /// A node's answer to a client (JSON [`Reply`]).
    Reply,
}

/// Transport envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub content: Vec<u8>,
    pub from: Endpoint,
    pub to: Endpoint,
}

impl Envelope {
    /// Wrap an already encoded consensus message.
    pub fn consensus(content: Vec<u8>, from: NodeId, to: NodeId) -> Self {
        Self {
            kind: EnvelopeKind::Consensus,
            content,
            from: Endpoint::Node(from),
            to: Endpoint::Node(to),
        }
    }

    pub fn client_request(request: &Request, to: NodeId) -> Result<Self, CodecError> {
        Ok(Self {
            kind: EnvelopeKind::ClientRequest,
            content: to_json(request)?,
            from: Endpoint::Client(request.client_address.clone()),
            to: Endpoint::Node(to),
        })
    }

    pub fn reply(reply: &Reply, to: String) -> Result<Self, CodecError> {
        Ok(Self {
            kind: EnvelopeKind::Reply,
            content: to_json(reply)?,
            from: Endpoint::Node(reply.node),
            to: Endpoint::Client(to),
        })
    }

    pub fn decode_request(&self) -> Result<Request, CodecError> {
        from_json(&self.content)
    }

    pub fn decode_reply(&self) -> Result<Reply, CodecError> {
        from_json(&self.content)
    }

    /// Frame the whole envelope for a byte stream.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        to_wire(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        from_wire(bytes)
    }
}

/// What a node tells a client about its request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ReplyStatus {
    /// Executed inside a finalized block (successfully or not).
    Committed(Receipt),
    /// Rejected before consensus; nothing was ordered.
    Rejected(String),
    /// Dropped by a view change; safe to resubmit.
    ConsensusFailure(String),
}

/// Reply envelope content.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub message_id: String,
    #[serde_as(as = "Hex")]
    pub request_digest: Hash,
    pub node: NodeId,
    pub status: ReplyStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Outcome, Value};

    #[test]
    fn test_reply_envelope_roundtrip() {
        let reply = Reply {
            message_id: "m".into(),
            request_digest: [3u8; 32],
            node: 2,
            status: ReplyStatus::Committed(Receipt {
                tx_hash: [1u8; 32],
                message_id: "m".into(),
                height: 4,
                index: 0,
                kind: "transfer".into(),
                outcome: Outcome::Success(Value::Int(1)),
                logs: vec![],
            }),
        };
        let env = Envelope::reply(&reply, "10.0.0.1:1".into()).unwrap();
        let framed = env.to_bytes().unwrap();
        let back = Envelope::from_bytes(&framed).unwrap();
        assert_eq!(back.to, Endpoint::Client("10.0.0.1:1".into()));
        assert_eq!(back.decode_reply().unwrap(), reply);
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::Node(3).to_string(), "node-3");
    }
}
