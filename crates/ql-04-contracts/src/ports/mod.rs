//! Ports between the runtime and contract code.

pub mod host;

pub use host::{ContractHost, ContractModule};
