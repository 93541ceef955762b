//! # `oracle` System Contract
//!
//! Native module through which contracts ask for external data.
//!
//! | Method | Arguments | Result |
//! |--------|-----------|--------|
//! | `query_data` | `method`, `contract?`, `key?`, `args?`, `request?` | event key |
//! | `cancel` | `key` | null |
//! | `record_event` | any | event index |
//! | `pending` | none | list of registrations |
//!
//! A registration is answered by the first committed event carrying its
//! key; see [`crate::OracleBridge`]. Without `key` the event key is derived
//! from the callback and a counter. An explicit `key` may only be chosen by
//! a contract registering a callback into itself, and is stored as
//! `{contract}/{key}` so contracts cannot claim each other's keys.

use crate::domain::{
    callback_entry, event_entry, CallbackRegistration, ContractEvent, CALLBACK_ENTRY_PREFIX,
};
use ql_04_contracts::{
    check_args, ContractError, ContractHost, ContractModule, ContractResult, MethodDef, Param,
    ParamType,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_crypto::CanonicalHasher;
use shared_types::{Args, Value};
use std::collections::BTreeMap;

const CALLBACK_COUNT: &str = "callback_count";
const EVENT_COUNT: &str = "event_count";

/// The `oracle` system contract.
pub struct OracleModule {
    schemas: BTreeMap<&'static str, MethodDef>,
}

impl Default for OracleModule {
    fn default() -> Self {
        Self::new()
    }
}

impl OracleModule {
    pub fn new() -> Self {
        let param = |ty, optional| Param { ty, optional };
        let schema = |params: &[(&str, Param)]| MethodDef {
            params: params.iter().map(|(name, p)| (name.to_string(), *p)).collect(),
            body: Vec::new(),
        };
        let mut schemas = BTreeMap::new();
        schemas.insert(
            "query_data",
            schema(&[
                ("method", param(ParamType::Str, false)),
                ("contract", param(ParamType::Str, true)),
                ("key", param(ParamType::Str, true)),
                ("args", param(ParamType::Map, true)),
                ("request", param(ParamType::Any, true)),
            ]),
        );
        schemas.insert("cancel", schema(&[("key", param(ParamType::Str, false))]));
        schemas.insert("pending", schema(&[]));
        Self { schemas }
    }

    fn query_data(&self, host: &mut dyn ContractHost, args: &Args) -> ContractResult<Value> {
        let method = str_arg(args, "method").unwrap_or_default().to_string();
        let contract = match str_arg(args, "contract").or(host.caller_contract()) {
            Some(name) => name.to_string(),
            None => {
                return Err(ContractError::Failed(
                    "query_data needs a callback contract".into(),
                ))
            }
        };
        // Fails with ContractNotFound for unknown contracts.
        host.get(&contract, &[])?;

        let index = counter(host, CALLBACK_COUNT)?;
        let event_key = match str_arg(args, "key") {
            Some(key) if key.is_empty() => {
                return Err(ContractError::Failed("callback key must not be empty".into()))
            }
            Some(key) if host.caller_contract() != Some(contract.as_str()) => {
                return Err(ContractError::Failed(format!(
                    "explicit key {key} may only be registered by {contract} itself"
                )))
            }
            Some(key) => scoped_event_key(&contract, key),
            None => derive_event_key(&contract, &method, index),
        };
        let entry = vec![callback_entry(&event_key)];
        if !matches!(host.get(host.name(), &entry)?, Value::Null) {
            return Err(ContractError::Failed(format!(
                "callback {event_key} already registered"
            )));
        }

        let registration = CallbackRegistration {
            event_key: event_key.clone(),
            contract,
            method,
            requester: host.caller().clone(),
            index,
            args: match args.get("args") {
                Some(Value::Map(extra)) => extra.clone(),
                _ => Args::new(),
            },
            request: args.get("request").cloned().unwrap_or_default(),
        };
        host.set(&entry, to_value(&registration)?)?;
        host.set(&[CALLBACK_COUNT.to_string()], Value::Int(next(index)?))?;
        host.info(&format!(
            "callback {event_key} registered for {}.{}",
            registration.contract, registration.method
        ));
        Ok(Value::Str(event_key))
    }

    fn cancel(&self, host: &mut dyn ContractHost, args: &Args) -> ContractResult<Value> {
        let key = str_arg(args, "key").unwrap_or_default();
        let entry = vec![callback_entry(key)];
        let stored = host.get(host.name(), &entry)?;
        if matches!(stored, Value::Null) {
            return Err(ContractError::Failed(format!("no pending callback {key}")));
        }
        let registration: CallbackRegistration = from_value(stored)?;
        let allowed = *host.caller() == registration.requester
            || host.caller_contract() == Some(registration.contract.as_str());
        if !allowed {
            return Err(ContractError::Failed(format!(
                "callback {key} belongs to {}",
                registration.contract
            )));
        }
        host.delete(&entry)?;
        host.info(&format!("callback {key} cancelled"));
        Ok(Value::Null)
    }

    fn record_event(&self, host: &mut dyn ContractHost, args: &Args) -> ContractResult<Value> {
        let index = counter(host, EVENT_COUNT)?;
        let count = next(index)?;
        let event = ContractEvent {
            index,
            source: host
                .caller_contract()
                .map(str::to_string)
                .unwrap_or_else(|| host.caller().to_string()),
            caller: host.caller().clone(),
            data: args.clone(),
        };
        host.set(&[event_entry(index)], to_value(&event)?)?;
        host.set(&[EVENT_COUNT.to_string()], Value::Int(count))?;
        Ok(Value::Int(count - 1))
    }

    fn pending(&self, host: &mut dyn ContractHost) -> ContractResult<Value> {
        let entries = host.entries(CALLBACK_ENTRY_PREFIX)?;
        Ok(Value::List(entries.into_iter().map(|(_, value)| value).collect()))
    }
}

impl ContractModule for OracleModule {
    fn call(&self, host: &mut dyn ContractHost, method: &str, args: &Args) -> ContractResult<Value> {
        if method == "record_event" {
            return self.record_event(host, args);
        }
        let schema = self
            .schemas
            .get(method)
            .ok_or_else(|| ContractError::MethodNotFound {
                contract: host.name().to_string(),
                method: method.to_string(),
            })?;
        check_args(method, schema, args)?;
        match method {
            "query_data" => self.query_data(host, args),
            "cancel" => self.cancel(host, args),
            _ => self.pending(host),
        }
    }
}

/// `hex(H(contract, method, registration index))`.
pub fn derive_event_key(contract: &str, method: &str, index: u64) -> String {
    let mut hasher = CanonicalHasher::new("ql/oracle-callback");
    hasher.str(contract).str(method).u64(index);
    hex::encode(hasher.finalize())
}

/// Event key for an explicit `key` chosen by `contract`.
pub fn scoped_event_key(contract: &str, key: &str) -> String {
    format!("{contract}/{key}")
}

fn str_arg<'a>(args: &'a Args, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

fn counter(host: &dyn ContractHost, entry: &str) -> ContractResult<u64> {
    match host.get(host.name(), &[entry.to_string()])? {
        Value::Null => Ok(0),
        Value::Int(n) if n >= 0 => Ok(n as u64),
        other => Err(ContractError::TypeMismatch {
            op: "counter",
            expected: "int",
            actual: other.type_name(),
        }),
    }
}

fn next(index: u64) -> ContractResult<i64> {
    i64::try_from(index)
        .ok()
        .and_then(|n| n.checked_add(1))
        .ok_or(ContractError::Arithmetic("oracle counter overflow"))
}

/// Storage values are [`Value`]s; records pass through JSON to get there.
pub(crate) fn to_value<T: Serialize>(record: &T) -> ContractResult<Value> {
    serde_json::to_value(record)
        .and_then(serde_json::from_value)
        .map_err(|e| ContractError::Failed(format!("oracle record encoding: {e}")))
}

pub(crate) fn from_value<T: DeserializeOwned>(value: Value) -> ContractResult<T> {
    serde_json::to_value(value)
        .and_then(serde_json::from_value)
        .map_err(|e| ContractError::Failed(format!("oracle record decoding: {e}")))
}
