//! # Replica Signatures
//!
//! Every consensus message travels as a [`SignedMessage`]. Prepared
//! certificates and NewView messages embed messages signed by other
//! replicas, so a receiver can check a claim without trusting whoever
//! forwarded it.

use super::config::ConsensusConfig;
use super::error::{ConsensusError, ConsensusResult};
use super::messages::ConsensusMessage;
use serde::{Deserialize, Serialize};
use shared_crypto::{sha256, verify_signature, Ed25519KeyPair, Ed25519PublicKey};
use shared_types::codec::{from_wire, to_wire};
use shared_types::NodeId;
use std::fmt;
use std::sync::Arc;

const SIGNING_DOMAIN: &[u8] = b"ql/consensus";

/// Signing identity of one replica.
#[derive(Clone)]
pub struct ReplicaKey(Arc<Ed25519KeyPair>);

impl ReplicaKey {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self(Arc::new(Ed25519KeyPair::from_seed(seed)))
    }

    /// Key derived from the replica id alone. Anyone can recompute it, so it
    /// is only fit for local clusters and tests.
    pub fn development(id: NodeId) -> Self {
        Self::from_seed(sha256(format!("ql/dev-replica/{id}").as_bytes()))
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.0.public_key()
    }

    pub fn sign(&self, message: ConsensusMessage) -> ConsensusResult<SignedMessage> {
        let signature = self.0.sign(&signing_bytes(&message)?);
        Ok(SignedMessage {
            message,
            signature: signature.as_bytes().to_vec(),
        })
    }
}

impl fmt::Debug for ReplicaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReplicaKey({})", self.public_key().to_hex())
    }
}

fn signing_bytes(message: &ConsensusMessage) -> ConsensusResult<Vec<u8>> {
    let body = to_wire(message).map_err(|e| ConsensusError::Malformed(e.to_string()))?;
    Ok([SIGNING_DOMAIN, body.as_slice()].concat())
}

/// A consensus message plus its sender's Ed25519 signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    pub message: ConsensusMessage,
    pub signature: Vec<u8>,
}

impl SignedMessage {
    pub fn sender(&self) -> NodeId {
        self.message.sender()
    }

    /// The signature matches the configured key of the claimed sender.
    pub fn verify(&self, config: &ConsensusConfig) -> bool {
        let Some(key) = config.validator_keys.get(&self.sender()) else {
            return false;
        };
        signing_bytes(&self.message)
            .map(|bytes| verify_signature(key.as_bytes(), &bytes, &self.signature).is_ok())
            .unwrap_or(false)
    }

    pub fn encode(&self) -> ConsensusResult<Vec<u8>> {
        to_wire(self).map_err(|e| ConsensusError::Malformed(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> ConsensusResult<Self> {
        from_wire(bytes).map_err(|e| ConsensusError::Malformed(e.to_string()))
    }
}
