//! Ports: the chain read API and the checksum dependency.

pub mod inbound;
pub mod outbound;

pub use inbound::BlockStorageApi;
pub use outbound::{ChecksumProvider, DefaultChecksumProvider};
