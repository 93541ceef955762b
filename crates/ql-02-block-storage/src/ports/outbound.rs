//! # Outbound Ports
//!
//! The Ledger Store itself is the shared
//! [`KeyValueStore`](shared_types::KeyValueStore) port; block storage only
//! adds an integrity check for encoded blocks on top of it.

/// Checksum stamped on every stored block and re-checked on read.
pub trait ChecksumProvider: Send + Sync {
    fn compute_crc32(&self, data: &[u8]) -> u32;

    fn verify_crc32(&self, data: &[u8], expected: u32) -> bool {
        self.compute_crc32(data) == expected
    }
}

/// crc32fast-backed provider used by every replica.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultChecksumProvider;

impl ChecksumProvider for DefaultChecksumProvider {
    fn compute_crc32(&self, data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}
