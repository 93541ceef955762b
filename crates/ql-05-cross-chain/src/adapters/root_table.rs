//! Static Root Table Adapter
//!
//! Implements [`TrustedRootSource`] from the `[[cross_chain.roots]]` table
//! of the node configuration.

use crate::domain::TrustedRoot;
use crate::ports::TrustedRootSource;
use parking_lot::RwLock;
use shared_types::{Hash, Height};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// In-memory `(chain, height) -> root` table.
#[derive(Debug, Default)]
pub struct StaticRootTable {
    roots: RwLock<BTreeMap<(String, Height), Hash>>,
}

impl StaticRootTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configured roots. A later entry for the same `(chain, height)`
    /// replaces an earlier one.
    pub fn from_roots(roots: &[TrustedRoot]) -> Self {
        let table = Self::new();
        for entry in roots {
            table.insert(entry.clone());
        }
        info!(roots = roots.len(), "trusted foreign roots loaded");
        table
    }

    pub fn insert(&self, entry: TrustedRoot) {
        let key = (entry.chain.clone(), entry.height);
        if let Some(previous) = self.roots.write().insert(key, entry.root) {
            if previous != entry.root {
                warn!(
                    chain = %entry.chain,
                    height = entry.height,
                    "trusted root replaced by a different value"
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.roots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.read().is_empty()
    }

    /// Every configured entry, ordered by chain then height.
    pub fn entries(&self) -> Vec<TrustedRoot> {
        self.roots
            .read()
            .iter()
            .map(|((chain, height), root)| TrustedRoot {
                chain: chain.clone(),
                height: *height,
                root: *root,
            })
            .collect()
    }
}

impl TrustedRootSource for StaticRootTable {
    fn root(&self, chain: &str, height: Height) -> Option<Hash> {
        self.roots.read().get(&(chain.to_string(), height)).copied()
    }
}
