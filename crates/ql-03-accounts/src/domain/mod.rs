//! Account ledger domain: configuration, errors, key layout.

mod errors;

pub use errors::AccountError;

use serde::{Deserialize, Serialize};
use shared_types::Address;

/// Ledger parameters; identical on every replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Balance granted by a Register transaction.
    pub initial_balance: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_balance: 100,
        }
    }
}

/// Account records: `a:{address}` -> JSON [`Account`](shared_types::Account)
pub const ACCOUNT_PREFIX: &[u8] = b"a:";

pub fn account_key(address: &Address) -> Vec<u8> {
    let mut key = ACCOUNT_PREFIX.to_vec();
    key.extend_from_slice(address.as_str().as_bytes());
    key
}
