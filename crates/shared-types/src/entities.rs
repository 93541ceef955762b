//! # Core Domain Entities
//!
//! Ledger-level types shared by every subsystem: identities, the typed
//! [`Value`] model used for contract arguments and storage, accounts,
//! blocks and execution receipts.

use crate::request::Request;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shared_crypto::{sha256, CanonicalHasher};
use std::collections::BTreeMap;
use std::fmt;

/// 32-byte SHA-256 digest.
pub use shared_crypto::Hash;

/// Replica identifier (index into the configured validator table).
pub type NodeId = u32;

/// Block height.
pub type Height = u64;

/// Ledger address: lowercase hex of `SHA-256(public key)`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wrap an address string as received on the wire.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Derive the account address owned by `public_key`.
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self(hex::encode(sha256(public_key)))
    }

    /// Derive the account address of a deployed contract.
    ///
    /// Contract accounts have no key pair; funds leave them only through the
    /// contract's own `transferFrom` calls.
    pub fn for_contract(name: &str, deployer: &Address) -> Self {
        let mut hasher = CanonicalHasher::new("ql/contract-address");
        hasher.str(name).str(deployer.as_str());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 64 lowercase hex characters.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 64 && self.0.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Deterministic typed value.
///
/// Used for contract arguments, contract storage and method results. There
/// is deliberately no floating point variant: every replica must compute
/// bit-identical results.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// String-keyed argument mapping passed to contract methods.
pub type Args = BTreeMap<String, Value>;

impl Value {
    /// Short type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }

    /// Truthiness used by contract conditions: only `true` is true.
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    /// Render as a plain string (strings unquoted, everything else as JSON).
    pub fn render(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }

    /// Feed the value into a canonical hasher.
    pub fn hash_into(&self, hasher: &mut CanonicalHasher) {
        match self {
            Value::Null => {
                hasher.u8(0);
            }
            Value::Bool(v) => {
                hasher.u8(1).bool(*v);
            }
            Value::Int(v) => {
                hasher.u8(2).i64(*v);
            }
            Value::Str(v) => {
                hasher.u8(3).str(v);
            }
            Value::List(items) => {
                hasher.u8(4).u64(items.len() as u64);
                for item in items {
                    item.hash_into(hasher);
                }
            }
            Value::Map(entries) => {
                hash_args(entries, hasher.u8(5));
            }
        }
    }
}

/// Feed an argument map into a canonical hasher (keys are already sorted).
pub fn hash_args(args: &Args, hasher: &mut CanonicalHasher) {
    hasher.u64(args.len() as u64);
    for (key, value) in args {
        hasher.str(key);
        value.hash_into(hasher);
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// Ledger account.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: Address,
    #[serde_as(as = "Hex")]
    pub public_key: Vec<u8>,
    pub balance: u64,
}

/// Immutable, hash-linked block of ordered requests.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub height: Height,
    #[serde_as(as = "Hex")]
    pub previous_hash: Hash,
    #[serde_as(as = "Hex")]
    pub hash: Hash,
    /// Root over [`Request::leaf_hash`] of every request, in order.
    #[serde_as(as = "Hex")]
    pub merkle_root: Hash,
    /// Greatest request timestamp in the block (0 for genesis).
    pub timestamp: u64,
    pub requests: Vec<Request>,
}

impl Block {
    /// `H(previousHash || height || serialized ordered requests)`.
    pub fn compute_hash(previous_hash: &Hash, height: Height, requests: &[Request]) -> Hash {
        let mut hasher = CanonicalHasher::new("ql/block");
        hasher.hash(previous_hash).u64(height).u64(requests.len() as u64);
        for request in requests {
            request.hash_into(&mut hasher);
        }
        hasher.finalize()
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }
}

/// Diagnostic line emitted by a contract through `info(message)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub contract: String,
    pub depth: u32,
    pub message: String,
}

/// Result of executing one committed request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    Success(Value),
    Failed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// Persisted execution record for one request of a block.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Transaction hash (or event hash for oracle events).
    #[serde_as(as = "Hex")]
    pub tx_hash: Hash,
    pub message_id: String,
    pub height: Height,
    pub index: u32,
    pub kind: String,
    pub outcome: Outcome,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}
