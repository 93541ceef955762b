//! Consensus configuration and quorum arithmetic.

use super::error::{ConsensusError, ConsensusResult};
use super::signing::ReplicaKey;
use shared_crypto::Ed25519PublicKey;
use shared_types::NodeId;
use std::collections::BTreeMap;

/// Static membership and timing parameters.
///
/// Built once at startup from the node configuration and handed to the
/// engine; membership never changes while the node runs.
#[derive(Clone, Debug)]
pub struct ConsensusConfig {
    /// This replica's id.
    pub node_id: NodeId,
    /// Ordered validator ids; `primary(view) = validators[view % n]`.
    pub validators: Vec<NodeId>,
    /// Base timeout before a backup suspects the primary.
    pub view_change_timeout_ms: u64,
    /// Sequences accepted above the last delivered one.
    pub watermark_window: u64,
    /// Upper bound on buffered messages for views not yet entered.
    pub max_future_messages: usize,
    /// Public key of every validator; messages are checked against it.
    pub validator_keys: BTreeMap<NodeId, Ed25519PublicKey>,
    /// This replica's own signing key.
    pub signing_key: ReplicaKey,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self::for_node(0, vec![0, 1, 2, 3])
    }
}

impl ConsensusConfig {
    /// Configuration with [`ReplicaKey::development`] keys for every
    /// validator.
    pub fn for_node(node_id: NodeId, validators: Vec<NodeId>) -> Self {
        let validator_keys = validators
            .iter()
            .map(|id| (*id, ReplicaKey::development(*id).public_key()))
            .collect();
        Self {
            node_id,
            validators,
            view_change_timeout_ms: 2_000,
            watermark_window: 256,
            max_future_messages: 4_096,
            validator_keys,
            signing_key: ReplicaKey::development(node_id),
        }
    }

    /// Number of replicas.
    pub fn n(&self) -> usize {
        self.validators.len()
    }

    /// Byzantine faults tolerated: `f = (n - 1) / 3`.
    pub fn f(&self) -> usize {
        self.n().saturating_sub(1) / 3
    }

    /// `2f + 1`.
    pub fn quorum(&self) -> usize {
        2 * self.f() + 1
    }

    /// Prepares needed besides the PrePrepare: `2f`.
    pub fn prepare_threshold(&self) -> usize {
        2 * self.f()
    }

    /// `f + 1`: enough view-change votes that at least one is honest.
    pub fn weak_quorum(&self) -> usize {
        self.f() + 1
    }

    pub fn primary_of(&self, view: u64) -> NodeId {
        let n = self.n().max(1) as u64;
        self.validators
            .get((view % n) as usize)
            .copied()
            .unwrap_or(self.node_id)
    }

    pub fn is_validator(&self, id: NodeId) -> bool {
        self.validators.contains(&id)
    }

    /// Other replicas (broadcast targets).
    pub fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.validators
            .iter()
            .copied()
            .filter(move |id| *id != self.node_id)
    }

    pub fn validate(&self) -> ConsensusResult<()> {
        if self.validators.is_empty() {
            return Err(ConsensusError::InvalidConfig("validator set is empty".into()));
        }
        if !self.is_validator(self.node_id) {
            return Err(ConsensusError::InvalidConfig(format!(
                "node {} is not in the validator set",
                self.node_id
            )));
        }
        let mut sorted = self.validators.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != self.validators.len() {
            return Err(ConsensusError::InvalidConfig("duplicate validator ids".into()));
        }
        if let Some(missing) = self.validators.iter().find(|id| !self.validator_keys.contains_key(id)) {
            return Err(ConsensusError::InvalidConfig(format!(
                "no public key for validator {missing}"
            )));
        }
        if self.validator_keys.get(&self.node_id) != Some(&self.signing_key.public_key()) {
            return Err(ConsensusError::InvalidConfig(format!(
                "signing key does not match the public key of node {}",
                self.node_id
            )));
        }
        if self.view_change_timeout_ms == 0 || self.watermark_window == 0 {
            return Err(ConsensusError::InvalidConfig(
                "timeout and watermark window must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_sizes() {
        let config = ConsensusConfig::for_node(0, vec![0, 1, 2, 3]);
        assert_eq!(config.f(), 1);
        assert_eq!(config.quorum(), 3);
        assert_eq!(config.prepare_threshold(), 2);
        assert_eq!(config.weak_quorum(), 2);

        let seven = ConsensusConfig::for_node(0, (0..7).collect());
        assert_eq!(seven.f(), 2);
        assert_eq!(seven.quorum(), 5);

        let single = ConsensusConfig::for_node(0, vec![0]);
        assert_eq!(single.f(), 0);
        assert_eq!(single.quorum(), 1);
    }

    #[test]
    fn test_primary_rotates_with_view() {
        let config = ConsensusConfig::for_node(0, vec![10, 11, 12, 13]);
        assert_eq!(config.primary_of(0), 10);
        assert_eq!(config.primary_of(1), 11);
        assert_eq!(config.primary_of(5), 11);
    }

    #[test]
    fn test_validate_rejects_bad_membership() {
        assert!(ConsensusConfig::for_node(9, vec![0, 1, 2, 3]).validate().is_err());
        assert!(ConsensusConfig::for_node(0, vec![0, 0, 1, 2]).validate().is_err());
        assert!(ConsensusConfig::for_node(0, vec![]).validate().is_err());
        assert!(ConsensusConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_checks_keys() {
        let mut wrong_key = ConsensusConfig::for_node(1, vec![0, 1, 2, 3]);
        wrong_key.signing_key = ReplicaKey::development(2);
        assert!(wrong_key.validate().is_err());

        let mut missing = ConsensusConfig::for_node(1, vec![0, 1, 2, 3]);
        missing.validator_keys.remove(&3);
        assert!(missing.validate().is_err());
    }
}
