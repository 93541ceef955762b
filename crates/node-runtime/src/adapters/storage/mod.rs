//! # Ledger Store Backends
//!
//! The in-memory store from `shared-types` serves tests and local
//! clusters; RocksDB backs production replicas behind the `rocksdb`
//! feature:
//!
//! ```toml
//! node-runtime = { path = "...", features = ["rocksdb"] }
//! ```

#[cfg(feature = "rocksdb")]
pub mod rocksdb_adapter;

#[cfg(feature = "rocksdb")]
pub use rocksdb_adapter::{RocksDbConfig, RocksDbStore};

pub use shared_types::InMemoryKVStore;
