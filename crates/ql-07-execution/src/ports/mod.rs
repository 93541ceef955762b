//! Ports of the execution subsystem.

pub mod inbound;

pub use inbound::{ExecutionApi, RequestAdmission};
