//! # Transactions
//!
//! A client-signed ledger operation. The hash covers every field except
//! `signature` (and the hash itself); the signature is Ed25519 over the
//! 32-byte hash and must verify against `public_key` for every kind except
//! `Register`.

use crate::entities::{hash_args, Address, Args, Hash, Height};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shared_crypto::{verify_signature, CanonicalHasher, CryptoError, Ed25519KeyPair, NodeSide, ZERO_HASH};
use thiserror::Error;

/// Transaction kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Register,
    Publish,
    Transfer,
    Invoke,
    CrossChain,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Register => "register",
            TransactionKind::Publish => "publish",
            TransactionKind::Transfer => "transfer",
            TransactionKind::Invoke => "invoke",
            TransactionKind::CrossChain => "cross_chain",
        }
    }

    fn tag(self) -> u8 {
        match self {
            TransactionKind::Register => 0,
            TransactionKind::Publish => 1,
            TransactionKind::Transfer => 2,
            TransactionKind::Invoke => 3,
            TransactionKind::CrossChain => 4,
        }
    }

    /// Register is the only kind that may arrive unsigned.
    pub fn requires_signature(self) -> bool {
        !matches!(self, TransactionKind::Register)
    }
}

/// Inclusion proof for a transaction of a foreign chain.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossTranProof {
    /// Sibling hashes from the leaf level up.
    #[serde_as(as = "Vec<Hex>")]
    pub merkle_path: Vec<Hash>,
    #[serde_as(as = "Hex")]
    pub transaction_hash: Hash,
    pub height: Height,
    /// Side of the running hash at each level (`0` left, `1` right).
    pub merkle_index: Vec<NodeSide>,
}

/// Local action to perform once a cross-chain proof verifies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossTranParam {
    pub contract_name: String,
    pub contract_func: String,
    #[serde(default)]
    pub contract_args: Args,
}

/// Payload of a `CrossChain` transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainCall {
    pub proof: CrossTranProof,
    pub param: CrossTranParam,
}

/// Signed ledger transaction.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub kind: TransactionKind,
    #[serde(default)]
    pub from: Address,
    #[serde(default)]
    pub to: Address,
    /// Foreign chain name for `CrossChain` transactions.
    #[serde(default)]
    pub dest: String,
    #[serde(default)]
    pub contract_name: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub args: Args,
    /// Contract module source for `Publish`.
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub value: u64,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub cross_chain: Option<CrossChainCall>,
    #[serde_as(as = "Hex")]
    #[serde(default)]
    pub hash: Hash,
    #[serde_as(as = "Hex")]
    #[serde(default)]
    pub public_key: Vec<u8>,
    #[serde_as(as = "Hex")]
    #[serde(default)]
    pub signature: Vec<u8>,
}

/// Structural problems found before a transaction is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("Hash mismatch: transaction hash does not match its contents")]
    HashMismatch,

    #[error("Missing public key")]
    MissingPublicKey,

    #[error("Missing signature")]
    MissingSignature,

    #[error("Signature rejected: {0}")]
    BadSignature(#[from] CryptoError),

    #[error("Sender {from} is not derived from the attached public key")]
    SenderKeyMismatch { from: Address },
}

impl Transaction {
    fn empty(kind: TransactionKind) -> Self {
        Self {
            kind,
            from: Address::default(),
            to: Address::default(),
            dest: String::new(),
            contract_name: String::new(),
            method: String::new(),
            args: Args::new(),
            code: String::new(),
            value: 0,
            nonce: 0,
            cross_chain: None,
            hash: ZERO_HASH,
            public_key: Vec::new(),
            signature: Vec::new(),
        }
    }

    /// Self-registration of `public_key`; needs no signature.
    pub fn register(public_key: &[u8]) -> Self {
        let mut tx = Self::empty(TransactionKind::Register);
        tx.from = Address::from_public_key(public_key);
        tx.public_key = public_key.to_vec();
        tx.seal()
    }

    pub fn transfer(from: Address, to: Address, value: u64, nonce: u64) -> Self {
        let mut tx = Self::empty(TransactionKind::Transfer);
        tx.from = from;
        tx.to = to;
        tx.value = value;
        tx.nonce = nonce;
        tx.seal()
    }

    pub fn publish(from: Address, contract_name: &str, code: &str, nonce: u64) -> Self {
        let mut tx = Self::empty(TransactionKind::Publish);
        tx.from = from;
        tx.contract_name = contract_name.to_string();
        tx.code = code.to_string();
        tx.nonce = nonce;
        tx.seal()
    }

    pub fn invoke(
        from: Address,
        contract_name: &str,
        method: &str,
        args: Args,
        value: u64,
        nonce: u64,
    ) -> Self {
        let mut tx = Self::empty(TransactionKind::Invoke);
        tx.from = from;
        tx.contract_name = contract_name.to_string();
        tx.method = method.to_string();
        tx.args = args;
        tx.value = value;
        tx.nonce = nonce;
        tx.seal()
    }

    pub fn cross_chain(from: Address, dest: &str, call: CrossChainCall, nonce: u64) -> Self {
        let mut tx = Self::empty(TransactionKind::CrossChain);
        tx.from = from;
        tx.dest = dest.to_string();
        tx.contract_name = call.param.contract_name.clone();
        tx.method = call.param.contract_func.clone();
        tx.cross_chain = Some(call);
        tx.nonce = nonce;
        tx.seal()
    }

    /// Hash over every field except `hash` and `signature`.
    pub fn compute_hash(&self) -> Hash {
        let mut h = CanonicalHasher::new("ql/tx");
        h.u8(self.kind.tag())
            .str(self.from.as_str())
            .str(self.to.as_str())
            .str(&self.dest)
            .str(&self.contract_name)
            .str(&self.method);
        hash_args(&self.args, &mut h);
        h.str(&self.code).u64(self.value).u64(self.nonce);
        match &self.cross_chain {
            None => {
                h.u8(0);
            }
            Some(call) => {
                h.u8(1).u64(call.proof.merkle_path.len() as u64);
                for sibling in &call.proof.merkle_path {
                    h.hash(sibling);
                }
                h.hash(&call.proof.transaction_hash).u64(call.proof.height);
                h.u64(call.proof.merkle_index.len() as u64);
                for side in &call.proof.merkle_index {
                    h.u8(u8::from(*side));
                }
                h.str(&call.param.contract_name).str(&call.param.contract_func);
                hash_args(&call.param.contract_args, &mut h);
            }
        }
        h.bytes(&self.public_key);
        h.finalize()
    }

    /// Recompute and store the hash.
    pub fn seal(mut self) -> Self {
        self.hash = self.compute_hash();
        self
    }

    /// Attach `keypair`'s public key, re-seal and sign the hash.
    pub fn signed(mut self, keypair: &Ed25519KeyPair) -> Self {
        self.public_key = keypair.public_key().as_bytes().to_vec();
        self = self.seal();
        self.signature = keypair.sign(&self.hash).as_bytes().to_vec();
        self
    }

    pub fn verify_hash(&self) -> Result<(), TransactionError> {
        if self.compute_hash() == self.hash {
            Ok(())
        } else {
            Err(TransactionError::HashMismatch)
        }
    }

    /// Hash, signature and sender binding, as required for this kind.
    pub fn verify_authenticity(&self) -> Result<(), TransactionError> {
        self.verify_hash()?;
        if self.public_key.is_empty() {
            return Err(TransactionError::MissingPublicKey);
        }
        if Address::from_public_key(&self.public_key) != self.from {
            return Err(TransactionError::SenderKeyMismatch {
                from: self.from.clone(),
            });
        }
        if !self.kind.requires_signature() {
            return Ok(());
        }
        if self.signature.is_empty() {
            return Err(TransactionError::MissingSignature);
        }
        verify_signature(&self.public_key, &self.hash, &self.signature)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Value;

    fn keypair(seed: u8) -> Ed25519KeyPair {
        Ed25519KeyPair::from_seed([seed; 32])
    }

    fn address(kp: &Ed25519KeyPair) -> Address {
        Address::from_public_key(kp.public_key().as_bytes())
    }

    #[test]
    fn test_hash_excludes_signature() {
        let kp = keypair(1);
        let mut tx = Transaction::transfer(address(&kp), address(&keypair(2)), 10, 0).signed(&kp);
        let before = tx.compute_hash();
        tx.signature = vec![0u8; 64];
        assert_eq!(tx.compute_hash(), before);
    }

    #[test]
    fn test_hash_covers_every_other_field() {
        let kp = keypair(1);
        let base = Transaction::invoke(address(&kp), "c", "m", Args::new(), 0, 0).signed(&kp);
        let mut changed = base.clone();
        changed.args.insert("a".into(), Value::Int(1));
        assert_ne!(changed.compute_hash(), base.hash);
        let mut changed = base.clone();
        changed.nonce = 1;
        assert_ne!(changed.compute_hash(), base.hash);
        let mut changed = base.clone();
        changed.value = 1;
        assert_ne!(changed.compute_hash(), base.hash);
    }

    #[test]
    fn test_json_roundtrip_preserves_hash() {
        let kp = keypair(3);
        let mut args = Args::new();
        args.insert("amount".into(), Value::Int(5));
        let tx = Transaction::invoke(address(&kp), "fund", "give", args, 7, 2).signed(&kp);
        let json = serde_json::to_vec(&tx).unwrap();
        let back: Transaction = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, tx);
        assert_eq!(back.compute_hash(), tx.hash);
        assert!(back.verify_authenticity().is_ok());
    }

    #[test]
    fn test_wire_field_names_are_camel_case() {
        let kp = keypair(3);
        let tx = Transaction::publish(address(&kp), "c1", "{}", 0).signed(&kp);
        let json: serde_json::Value = serde_json::to_value(&tx).unwrap();
        assert!(json.get("contractName").is_some());
        assert!(json.get("publicKey").is_some());
        assert_eq!(json["kind"], "publish");
    }

    #[test]
    fn test_register_may_be_unsigned() {
        let kp = keypair(4);
        let tx = Transaction::register(kp.public_key().as_bytes());
        assert!(tx.signature.is_empty());
        assert!(tx.verify_authenticity().is_ok());
    }

    #[test]
    fn test_unsigned_transfer_rejected() {
        let kp = keypair(5);
        let mut tx = Transaction::transfer(address(&kp), address(&keypair(6)), 1, 0);
        tx.public_key = kp.public_key().as_bytes().to_vec();
        let tx = tx.seal();
        assert_eq!(tx.verify_authenticity(), Err(TransactionError::MissingSignature));
    }

    #[test]
    fn test_tampered_transfer_rejected() {
        let kp = keypair(5);
        let mut tx = Transaction::transfer(address(&kp), address(&keypair(6)), 1, 0).signed(&kp);
        tx.value = 1_000;
        assert_eq!(tx.verify_authenticity(), Err(TransactionError::HashMismatch));
    }

    #[test]
    fn test_sender_must_own_key() {
        let kp = keypair(5);
        let victim = keypair(9);
        let tx = Transaction::transfer(address(&victim), address(&keypair(6)), 1, 0).signed(&kp);
        assert!(matches!(
            tx.verify_authenticity(),
            Err(TransactionError::SenderKeyMismatch { .. })
        ));
    }
}
