//! # Ledger Store Port and State Overlay
//!
//! [`KeyValueStore`] is the driven port for durable byte storage
//! (production: `RocksDbStore` in node-runtime; testing: [`InMemoryKVStore`]).
//!
//! [`StateOverlay`] is the transactional view every request executes
//! against: writes are buffered in stacked layers and only reach the store
//! through one atomic batch when the request succeeds. Nested contract calls
//! push a layer and discard it when the call fails.

use crate::codec::{decode_record, encode_record};
use crate::errors::StorageError;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Abstract interface for key-value database operations.
///
/// Methods take `&self`: one store handle is shared by the block builder,
/// the dispatcher and the query service, and implementations synchronize
/// internally.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Put a single key-value pair.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.
    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

    /// Execute an atomic batch write.
    ///
    /// Either ALL operations in the batch succeed, or NONE are applied.
    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), StorageError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    /// All pairs whose key starts with `prefix`, in key order.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key.
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

/// In-memory key-value store for tests and single-process clusters.
#[derive(Default)]
pub struct InMemoryKVStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl InMemoryKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (simulates a dying disk).
    pub fn inject_write_failure(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of the full contents, for cross-replica comparisons.
    pub fn snapshot(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.data.read().clone()
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::DatabaseError("injected write failure".into()));
        }
        Ok(())
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.check_writable()?;
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.check_writable()?;
        self.data.write().remove(key);
        Ok(())
    }

    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), StorageError> {
        self.check_writable()?;
        let mut data = self.data.write();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let data = self.data.read();
        Ok(data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Read/write access to ledger state during execution.
pub trait StateAccess {
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    fn write(&mut self, key: &[u8], value: Vec<u8>);

    fn remove(&mut self, key: &[u8]);

    /// All live pairs under `prefix`, in key order.
    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;
}

/// Typed JSON records on top of [`StateAccess`].
pub trait RecordAccess: StateAccess {
    fn get_record<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StorageError> {
        match self.read(key)? {
            Some(bytes) => decode_record(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    fn put_record<T: Serialize>(&mut self, key: &[u8], record: &T) -> Result<(), StorageError> {
        let bytes = encode_record(record)?;
        self.write(key, bytes);
        Ok(())
    }

    fn scan_records<T: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, T)>, StorageError> {
        self.scan(prefix)?
            .into_iter()
            .map(|(key, bytes)| {
                let record = decode_record(&key, &bytes)?;
                Ok((key, record))
            })
            .collect()
    }
}

impl<S: StateAccess + ?Sized> RecordAccess for S {}

type Layer = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// Layered write buffer over a [`KeyValueStore`].
pub struct StateOverlay {
    store: Arc<dyn KeyValueStore>,
    layers: Vec<Layer>,
}

impl StateOverlay {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            layers: vec![Layer::new()],
        }
    }

    /// Open a nested layer.
    pub fn begin_layer(&mut self) {
        self.layers.push(Layer::new());
    }

    /// Fold the top layer into the one below. The base layer is kept.
    pub fn commit_layer(&mut self) {
        if self.layers.len() < 2 {
            return;
        }
        if let Some(top) = self.layers.pop() {
            if let Some(below) = self.layers.last_mut() {
                below.extend(top);
            }
        }
    }

    /// Drop the top layer's writes. The base layer is cleared instead of removed.
    pub fn discard_layer(&mut self) {
        if self.layers.len() > 1 {
            self.layers.pop();
        } else if let Some(base) = self.layers.last_mut() {
            base.clear();
        }
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.layers.iter().any(|layer| !layer.is_empty())
    }

    /// Flatten every layer into batch operations, oldest first.
    pub fn into_batch(self) -> Vec<BatchOperation> {
        let mut merged = Layer::new();
        for layer in self.layers {
            merged.extend(layer);
        }
        merged
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => BatchOperation::Put { key, value },
                None => BatchOperation::Delete { key },
            })
            .collect()
    }

    /// Write everything through one atomic batch.
    pub fn commit(self) -> Result<(), StorageError> {
        let store = Arc::clone(&self.store);
        let batch = self.into_batch();
        if batch.is_empty() {
            return Ok(());
        }
        store.atomic_batch_write(batch)
    }
}

impl StateAccess for StateOverlay {
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        for layer in self.layers.iter().rev() {
            if let Some(entry) = layer.get(key) {
                return Ok(entry.clone());
            }
        }
        self.store.get(key)
    }

    fn write(&mut self, key: &[u8], value: Vec<u8>) {
        if let Some(top) = self.layers.last_mut() {
            top.insert(key.to_vec(), Some(value));
        }
    }

    fn remove(&mut self, key: &[u8]) {
        if let Some(top) = self.layers.last_mut() {
            top.insert(key.to_vec(), None);
        }
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self.store.prefix_scan(prefix)?.into_iter().collect();
        for layer in &self.layers {
            for (key, value) in layer.range(prefix.to_vec()..) {
                if !key.starts_with(prefix) {
                    break;
                }
                match value {
                    Some(v) => {
                        merged.insert(key.clone(), v.clone());
                    }
                    None => {
                        merged.remove(key);
                    }
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}
