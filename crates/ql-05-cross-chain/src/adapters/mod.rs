//! Adapters for the cross-chain ports.

pub mod root_table;

pub use root_table::StaticRootTable;
