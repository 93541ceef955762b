//! Receipt key layout.
//!
//! | Key | Value |
//! |-----|-------|
//! | `r:tx/{tx_hash}` | first [`Receipt`](shared_types::Receipt) recorded for the hash |
//! | `r:blk/{height:020}/{index:010}` | receipt of the request at that block position |
//! | `e:executed` | height of the last fully executed block |
//!
//! Duplicates only get the positional entry, so `r:tx/` keeps pointing at
//! the execution that took effect. A positional entry is written once and
//! never replaced.

use shared_types::{Hash, Height};

pub const TX_RECEIPT_PREFIX: &[u8] = b"r:tx/";
pub const BLOCK_RECEIPT_PREFIX: &[u8] = b"r:blk/";
pub const EXECUTED_HEIGHT_KEY: &[u8] = b"e:executed";

pub fn tx_receipt_key(tx_hash: &Hash) -> Vec<u8> {
    let mut key = TX_RECEIPT_PREFIX.to_vec();
    key.extend_from_slice(hex::encode(tx_hash).as_bytes());
    key
}

pub fn block_receipt_prefix(height: Height) -> Vec<u8> {
    let mut key = BLOCK_RECEIPT_PREFIX.to_vec();
    key.extend_from_slice(format!("{height:020}/").as_bytes());
    key
}

pub fn block_receipt_key(height: Height, index: u32) -> Vec<u8> {
    let mut key = block_receipt_prefix(height);
    key.extend_from_slice(format!("{index:010}").as_bytes());
    key
}
