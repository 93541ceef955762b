//! Batching policy: when the block in progress closes.

use serde::{Deserialize, Serialize};

/// Block boundaries depend only on the delivered request stream, so every
/// replica cuts the same blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "size", rename_all = "snake_case")]
pub enum BatchPolicy {
    /// One request per block.
    #[default]
    PerRequest,
    /// Close after `n` requests.
    Window(usize),
}

impl BatchPolicy {
    /// Whether a draft holding `pending` requests must close.
    pub fn should_close(&self, pending: usize) -> bool {
        match self {
            BatchPolicy::PerRequest => pending >= 1,
            BatchPolicy::Window(n) => pending >= (*n).max(1),
        }
    }
}
