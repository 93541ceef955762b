//! # Node Container
//!
//! Configuration plus the wiring of one replica's subsystems.

pub mod config;
pub mod subsystems;

pub use config::{ConfigError, NodeConfig, StorageBackend};
pub use subsystems::{open_store, NodeConsensus, SubsystemContainer};
