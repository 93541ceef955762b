//! Driven ports (Outbound dependencies)

use crate::domain::OrderedCommit;
use parking_lot::Mutex;
use shared_types::{Endpoint, Envelope, Request, StorageError};

/// Point-to-point message delivery.
///
/// `send` must not block: delivery is fire-and-forget and may be delayed,
/// duplicated or reordered.
pub trait Transport: Send + Sync {
    fn send(&self, envelope: Envelope, destination: Endpoint);
}

/// Consumer of the totally ordered commit stream.
pub trait CommitSink: Send + Sync {
    /// Called once per non-null commit, in sequence order, from a single
    /// thread at a time. Must persist before returning `Ok`; an error halts
    /// the node.
    fn deliver(&self, commit: &OrderedCommit) -> Result<(), StorageError>;

    /// A locally submitted request was dropped by a view change.
    fn request_abandoned(&self, request: &Request, reason: &str);
}

/// Time source for timeouts.
pub trait TimeSource: Send + Sync {
    /// Milliseconds since the unix epoch.
    fn now_millis(&self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}

/// Default time source using system time
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Manually advanced clock (for testing)
#[derive(Default)]
pub struct ManualTimeSource {
    now: Mutex<u64>,
}

impl ManualTimeSource {
    pub fn new(start: u64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, millis: u64) {
        *self.now.lock() += millis;
    }
}

impl TimeSource for ManualTimeSource {
    fn now_millis(&self) -> u64 {
        *self.now.lock()
    }
}
