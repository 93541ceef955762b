//! Block storage domain: stored records, key layout, batching policy.

pub mod block;
pub mod errors;
pub mod keys;
pub mod policy;

pub use block::{genesis_block, seal_block, ChainTip, StoredBlock, TransactionLocation};
pub use errors::BlockStorageError;
pub use keys::KeyPrefix;
pub use policy::BatchPolicy;
