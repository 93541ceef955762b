//! Ports: what the engine offers and what it needs.

pub mod inbound;
pub mod outbound;

pub use inbound::{ConsensusApi, ConsensusStatus};
pub use outbound::{CommitSink, ManualTimeSource, SystemTimeSource, TimeSource, Transport};
