//! # Handlers
//!
//! What a replica does with traffic and commits: the commit pipeline
//! (consensus → blocks → execution → replies), the client gateway
//! (validation and submission) and the read-only query service.

pub mod client;
pub mod pipeline;
pub mod query;

pub use client::ClientGateway;
pub use pipeline::CommitPipeline;
pub use query::{QueryError, QueryResult, QueryService, TransactionRecord};
