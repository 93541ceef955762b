//! Oracle records and their key layout.
//!
//! | Key | Value |
//! |-----|-------|
//! | `o:report/{index:020}` | [`OracleReport`] |
//! | `o:acct/{address}` | [`OracleAccount`] |
//! | `o:meta/report_count` | `u64` |
//!
//! Callback registrations and contract events live in the `oracle` system
//! contract's own storage (`s:oracle/callback/{key}`, `s:oracle/event/{index:020}`)
//! so contracts can read them with `get`.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shared_types::{Address, Args, Height, Value};

pub const REPORT_PREFIX: &[u8] = b"o:report/";
pub const ACCOUNT_PREFIX: &[u8] = b"o:acct/";
pub const REPORT_COUNT_KEY: &[u8] = b"o:meta/report_count";

/// Name of the system contract that registers callbacks.
pub const ORACLE_CONTRACT: &str = "oracle";

pub fn report_key(index: u64) -> Vec<u8> {
    let mut key = REPORT_PREFIX.to_vec();
    key.extend_from_slice(format!("{index:020}").as_bytes());
    key
}

pub fn account_key(address: &Address) -> Vec<u8> {
    let mut key = ACCOUNT_PREFIX.to_vec();
    key.extend_from_slice(address.as_str().as_bytes());
    key
}

pub const CALLBACK_ENTRY_PREFIX: &str = "callback/";
pub const EVENT_ENTRY_PREFIX: &str = "event/";

/// Storage entry of a pending callback inside the `oracle` contract.
pub fn callback_entry(event_key: &str) -> String {
    format!("{CALLBACK_ENTRY_PREFIX}{event_key}")
}

/// Storage entry of a contract event inside the `oracle` contract.
pub fn event_entry(index: u64) -> String {
    format!("{EVENT_ENTRY_PREFIX}{index:020}")
}

/// One off-chain report, as appended to the log. Never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleReport {
    pub index: u64,
    pub event_key: String,
    pub reporter: Address,
    pub body: Value,
    #[serde(default)]
    pub args: Args,
    /// Height of the block that committed the event.
    pub height: Height,
    /// `contract.method` the report was delivered to, if any.
    #[serde(default)]
    pub callback: Option<String>,
}

/// Per-reporter summary.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleAccount {
    pub address: Address,
    #[serde_as(as = "Hex")]
    #[serde(default)]
    pub public_key: Vec<u8>,
    pub reports: u64,
    pub last_event_key: String,
    pub last_height: Height,
}

/// A contract waiting for external data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackRegistration {
    pub event_key: String,
    pub contract: String,
    pub method: String,
    /// Address that called `query_data`.
    pub requester: Address,
    /// Registration counter value at the time of the request.
    pub index: u64,
    /// Extra arguments passed to the callback alongside the data.
    #[serde(default)]
    pub args: Args,
    /// Free-form description of the data wanted, for off-chain reporters.
    #[serde(default)]
    pub request: Value,
}

/// Event appended by a contract through `record_event`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractEvent {
    pub index: u64,
    /// Calling contract name, or the caller address for direct invocations.
    pub source: String,
    pub caller: Address,
    pub data: Args,
}
