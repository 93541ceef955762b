//! # RocksDB Ledger Store
//!
//! Durable [`KeyValueStore`] for production replicas.
//!
//! Every record lives in the default column family; the key prefixes
//! (`b:`, `a:`, `s:`, `x:`, `o:`, `r:`) already keep subsystems apart and
//! prefix scans stay ordered within one keyspace. Batches go through a
//! single `WriteBatch`, so a request's overlay lands all-or-nothing, and
//! writes are fsynced by default.

use rocksdb::{
    BlockBasedOptions, Cache, DBCompressionType, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use shared_types::{BatchOperation, KeyValueStore, StorageError};
use std::path::{Path, PathBuf};
use tracing::info;

/// RocksDB tuning.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    pub path: PathBuf,
    /// Block cache size in bytes (default: 256MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 64MB)
    pub write_buffer_size: usize,
    pub max_write_buffer_number: i32,
    pub target_file_size_base: u64,
    /// fsync after each write.
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/ledger"),
            block_cache_size: 256 * 1024 * 1024,
            write_buffer_size: 64 * 1024 * 1024,
            max_write_buffer_number: 3,
            target_file_size_base: 64 * 1024 * 1024,
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Small buffers, no fsync.
    pub fn for_testing(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            block_cache_size: 8 * 1024 * 1024,
            write_buffer_size: 4 * 1024 * 1024,
            max_write_buffer_number: 2,
            target_file_size_base: 4 * 1024 * 1024,
            sync_writes: false,
        }
    }
}

pub struct RocksDbStore {
    db: DB,
    config: RocksDbConfig,
}

fn db_error(op: &str, e: rocksdb::Error) -> StorageError {
    StorageError::DatabaseError(format!("RocksDB {op} failed: {e}"))
}

impl RocksDbStore {
    /// Open or create the database at `config.path`.
    pub fn open(config: RocksDbConfig) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.set_target_file_size_base(config.target_file_size_base);
        opts.set_compression_type(DBCompressionType::Snappy);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, &config.path).map_err(|e| db_error("open", e))?;
        info!(path = %config.path.display(), "ledger store opened");
        Ok(Self { db, config })
    }

    fn write_options(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.db.get(key).map_err(|e| db_error("get", e))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.db
            .put_opt(key, value, &self.write_options())
            .map_err(|e| db_error("put", e))
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.db
            .delete_opt(key, &self.write_options())
            .map_err(|e| db_error("delete", e))
    }

    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => batch.put(&key, &value),
                BatchOperation::Delete { key } => batch.delete(&key),
            }
        }
        self.db
            .write_opt(batch, &self.write_options())
            .map_err(|e| db_error("batch write", e))
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        self.db
            .get_pinned(key)
            .map(|v| v.is_some())
            .map_err(|e| db_error("exists", e))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut results = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|e| db_error("scan", e))?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{Account, Address, RecordAccess, StateOverlay};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_basic_operations() {
        let dir = TempDir::new().unwrap();
        let store = RocksDbStore::open(RocksDbConfig::for_testing(dir.path())).unwrap();

        store.put(b"a:1", b"one").unwrap();
        assert_eq!(store.get(b"a:1").unwrap(), Some(b"one".to_vec()));
        assert!(store.exists(b"a:1").unwrap());
        store.delete(b"a:1").unwrap();
        assert!(!store.exists(b"a:1").unwrap());
    }

    #[test]
    fn test_prefix_scan_stops_at_prefix_end() {
        let dir = TempDir::new().unwrap();
        let store = RocksDbStore::open(RocksDbConfig::for_testing(dir.path())).unwrap();
        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"s:bank/a".to_vec(), b"1".to_vec()),
                BatchOperation::put(b"s:bank/b".to_vec(), b"2".to_vec()),
                BatchOperation::put(b"s:bankx/a".to_vec(), b"3".to_vec()),
                BatchOperation::put(b"t:0".to_vec(), b"4".to_vec()),
            ])
            .unwrap();
        let scanned = store.prefix_scan(b"s:bank/").unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0].0, b"s:bank/a".to_vec());
    }

    #[test]
    fn test_overlay_commit_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let account = Account {
            address: Address::new("ab".repeat(32)),
            public_key: vec![1; 32],
            balance: 42,
        };
        {
            let store: Arc<dyn KeyValueStore> =
                Arc::new(RocksDbStore::open(RocksDbConfig::for_testing(dir.path())).unwrap());
            let mut overlay = StateOverlay::new(store);
            overlay.put_record(b"a:test", &account).unwrap();
            overlay.commit().unwrap();
        }
        let store: Arc<dyn KeyValueStore> =
            Arc::new(RocksDbStore::open(RocksDbConfig::for_testing(dir.path())).unwrap());
        let overlay = StateOverlay::new(store);
        assert_eq!(overlay.get_record::<Account>(b"a:test").unwrap(), Some(account));
    }
}
