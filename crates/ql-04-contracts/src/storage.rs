//! # Contract Storage Layout
//!
//! | Key | Value |
//! |-----|-------|
//! | `c:{name}` | [`ContractRecord`] |
//! | `s:{name}/{key}` | top-level storage entry ([`Value`]) |
//!
//! A key path selects a top-level entry with its first element and walks
//! nested maps with the rest. Contract names cannot contain `/`, so one
//! contract's prefix never covers another's.

use crate::domain::ContractRecord;
use crate::errors::{ContractError, ContractResult};
use shared_types::{RecordAccess, StateAccess, Value};
use std::collections::BTreeMap;

pub const CONTRACT_PREFIX: &[u8] = b"c:";
pub const STORAGE_PREFIX: &[u8] = b"s:";

pub fn contract_key(name: &str) -> Vec<u8> {
    let mut key = CONTRACT_PREFIX.to_vec();
    key.extend_from_slice(name.as_bytes());
    key
}

pub fn storage_prefix(contract: &str) -> Vec<u8> {
    let mut key = STORAGE_PREFIX.to_vec();
    key.extend_from_slice(contract.as_bytes());
    key.push(b'/');
    key
}

pub fn storage_key(contract: &str, entry: &str) -> Vec<u8> {
    let mut key = storage_prefix(contract);
    key.extend_from_slice(entry.as_bytes());
    key
}

pub fn load_contract<S: StateAccess + ?Sized>(
    state: &S,
    name: &str,
) -> ContractResult<Option<ContractRecord>> {
    Ok(state.get_record(&contract_key(name))?)
}

/// Every deployed contract, ordered by name.
pub fn all_contracts<S: StateAccess + ?Sized>(state: &S) -> ContractResult<Vec<ContractRecord>> {
    Ok(state
        .scan_records::<ContractRecord>(CONTRACT_PREFIX)?
        .into_iter()
        .map(|(_, record)| record)
        .collect())
}

/// Value at `path`; null when absent. An empty path returns the whole
/// storage as a map.
pub fn read_path<S: StateAccess + ?Sized>(
    state: &S,
    contract: &str,
    path: &[String],
) -> ContractResult<Value> {
    let Some((first, rest)) = path.split_first() else {
        let entries = entries(state, contract, "")?;
        return Ok(Value::Map(entries.into_iter().collect()));
    };
    let top: Option<Value> = state.get_record(&storage_key(contract, first))?;
    let mut current = top.unwrap_or_default();
    for segment in rest {
        current = match current {
            Value::Map(mut map) => map.remove(segment).unwrap_or_default(),
            _ => return Ok(Value::Null),
        };
    }
    Ok(current)
}

/// Write `value` at `path`, creating intermediate maps.
pub fn write_path<S: StateAccess + ?Sized>(
    state: &mut S,
    contract: &str,
    path: &[String],
    value: Value,
) -> ContractResult<()> {
    let Some((first, rest)) = path.split_first() else {
        return Err(ContractError::Failed("storage path is empty".into()));
    };
    let key = storage_key(contract, first);
    if rest.is_empty() {
        state.put_record(&key, &value)?;
        return Ok(());
    }
    let mut top: Value = state
        .get_record(&key)?
        .unwrap_or_else(|| Value::Map(BTreeMap::new()));
    insert_nested(&mut top, rest, value)?;
    state.put_record(&key, &top)?;
    Ok(())
}

fn insert_nested(target: &mut Value, path: &[String], value: Value) -> ContractResult<()> {
    if matches!(target, Value::Null) {
        *target = Value::Map(BTreeMap::new());
    }
    let actual = target.type_name();
    let Value::Map(map) = target else {
        return Err(ContractError::TypeMismatch {
            op: "set",
            expected: "map",
            actual,
        });
    };
    match path {
        [] => Ok(()),
        [last] => {
            map.insert(last.clone(), value);
            Ok(())
        }
        [head, tail @ ..] => insert_nested(map.entry(head.clone()).or_default(), tail, value),
    }
}

/// Remove the value at `path`; absent paths are a no-op.
pub fn delete_path<S: StateAccess + ?Sized>(
    state: &mut S,
    contract: &str,
    path: &[String],
) -> ContractResult<()> {
    let Some((first, rest)) = path.split_first() else {
        return Err(ContractError::Failed("storage path is empty".into()));
    };
    let key = storage_key(contract, first);
    if rest.is_empty() {
        state.remove(&key);
        return Ok(());
    }
    let Some(mut top) = state.get_record::<Value>(&key)? else {
        return Ok(());
    };
    if remove_nested(&mut top, rest) {
        state.put_record(&key, &top)?;
    }
    Ok(())
}

fn remove_nested(target: &mut Value, path: &[String]) -> bool {
    let Value::Map(map) = target else {
        return false;
    };
    match path {
        [] => false,
        [last] => map.remove(last).is_some(),
        [head, tail @ ..] => map
            .get_mut(head)
            .map(|child| remove_nested(child, tail))
            .unwrap_or(false),
    }
}

/// Top-level entries whose key starts with `prefix`, in key order.
pub fn entries<S: StateAccess + ?Sized>(
    state: &S,
    contract: &str,
    prefix: &str,
) -> ContractResult<Vec<(String, Value)>> {
    let base = storage_prefix(contract);
    let scan = storage_key(contract, prefix);
    state
        .scan_records::<Value>(&scan)?
        .into_iter()
        .map(|(key, value)| {
            let name = String::from_utf8_lossy(&key[base.len()..]).into_owned();
            Ok((name, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{InMemoryKVStore, StateOverlay};
    use std::sync::Arc;

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn state() -> StateOverlay {
        StateOverlay::new(Arc::new(InMemoryKVStore::new()))
    }

    #[test]
    fn test_nested_write_and_read() {
        let mut s = state();
        write_path(&mut s, "fund", &path(&["deposit", "Money", "alice"]), Value::Int(5)).unwrap();
        write_path(&mut s, "fund", &path(&["deposit", "Money", "bob"]), Value::Int(7)).unwrap();
        assert_eq!(
            read_path(&s, "fund", &path(&["deposit", "Money", "bob"])).unwrap(),
            Value::Int(7)
        );
        let money = read_path(&s, "fund", &path(&["deposit", "Money"])).unwrap();
        assert_eq!(money.as_map().map(|m| m.len()), Some(2));
    }

    #[test]
    fn test_missing_paths_read_null() {
        let mut s = state();
        write_path(&mut s, "fund", &path(&["ready"]), Value::Bool(true)).unwrap();
        assert_eq!(read_path(&s, "fund", &path(&["nope"])).unwrap(), Value::Null);
        assert_eq!(
            read_path(&s, "fund", &path(&["ready", "deeper"])).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_write_through_scalar_fails() {
        let mut s = state();
        write_path(&mut s, "fund", &path(&["ready"]), Value::Bool(true)).unwrap();
        let err = write_path(&mut s, "fund", &path(&["ready", "x"]), Value::Int(1)).unwrap_err();
        assert!(matches!(err, ContractError::TypeMismatch { op: "set", .. }));
    }

    #[test]
    fn test_namespaces_do_not_overlap() {
        let mut s = state();
        write_path(&mut s, "a", &path(&["k"]), Value::Int(1)).unwrap();
        write_path(&mut s, "ab", &path(&["k"]), Value::Int(2)).unwrap();
        let whole = read_path(&s, "a", &[]).unwrap();
        assert_eq!(whole.as_map().map(|m| m.len()), Some(1));
    }

    #[test]
    fn test_delete() {
        let mut s = state();
        write_path(&mut s, "c", &path(&["m", "x"]), Value::Int(1)).unwrap();
        write_path(&mut s, "c", &path(&["m", "y"]), Value::Int(2)).unwrap();
        delete_path(&mut s, "c", &path(&["m", "x"])).unwrap();
        assert_eq!(read_path(&s, "c", &path(&["m", "x"])).unwrap(), Value::Null);
        delete_path(&mut s, "c", &path(&["m"])).unwrap();
        assert!(entries(&s, "c", "").unwrap().is_empty());
    }

    #[test]
    fn test_entries_by_prefix() {
        let mut s = state();
        write_path(&mut s, "o", &path(&["event/1"]), Value::Int(1)).unwrap();
        write_path(&mut s, "o", &path(&["event/2"]), Value::Int(2)).unwrap();
        write_path(&mut s, "o", &path(&["other"]), Value::Int(3)).unwrap();
        let events = entries(&s, "o", "event/").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, "event/1");
    }
}
