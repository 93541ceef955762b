//! Ledger Store key layout for chain data.
//!
//! | key                      | value                 |
//! |--------------------------|-----------------------|
//! | `b:{block hash}`         | `StoredBlock`         |
//! | `h:{height, big-endian}` | block hash            |
//! | `m:tip`                  | `ChainTip`            |
//! | `t:{request leaf hash}`  | `TransactionLocation` |

use shared_types::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPrefix {
    Block,
    BlockByHeight,
    Metadata,
    Transaction,
}

impl KeyPrefix {
    const fn tag(self) -> &'static [u8; 2] {
        match self {
            Self::Block => b"b:",
            Self::BlockByHeight => b"h:",
            Self::Metadata => b"m:",
            Self::Transaction => b"t:",
        }
    }

    fn join(self, tail: &[u8]) -> Vec<u8> {
        [self.tag().as_slice(), tail].concat()
    }

    pub fn block_key(hash: &Hash) -> Vec<u8> {
        Self::Block.join(hash)
    }

    /// Big-endian so a prefix scan returns blocks in height order.
    pub fn height_key(height: u64) -> Vec<u8> {
        Self::BlockByHeight.join(&height.to_be_bytes())
    }

    pub fn tip_key() -> Vec<u8> {
        Self::Metadata.join(b"tip")
    }

    pub fn transaction_key(leaf: &Hash) -> Vec<u8> {
        Self::Transaction.join(leaf)
    }
}
