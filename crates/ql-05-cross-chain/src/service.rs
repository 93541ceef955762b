//! # Cross-Chain Verifier Service
//!
//! Verifies a foreign inclusion proof, then runs the requested local
//! contract call at most once per `(chain, height, transaction hash)`.

use crate::domain::{
    marker_chain_prefix, marker_key, verify_inclusion, ConsumedMarker, CrossChainError,
    CrossChainResult, MARKER_PREFIX,
};
use crate::ports::TrustedRootSource;
use ql_04_contracts::ContractRuntime;
use shared_types::{
    CrossTranProof, LogEntry, Outcome, RecordAccess, StateAccess, StateOverlay, Transaction,
};
use std::sync::Arc;
use tracing::{debug, info};

/// What a `CrossChain` transaction produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossChainExecution {
    pub outcome: Outcome,
    pub logs: Vec<LogEntry>,
    /// The proof was already consumed; `outcome` is the recorded one.
    pub replayed: bool,
}

/// The Cross-Chain Verifier.
pub struct CrossChainVerifier {
    roots: Arc<dyn TrustedRootSource>,
}

impl CrossChainVerifier {
    pub fn new(roots: Arc<dyn TrustedRootSource>) -> Self {
        Self { roots }
    }

    /// Check `proof` against the trusted root of `chain` at its height.
    pub fn verify(&self, chain: &str, proof: &CrossTranProof) -> CrossChainResult<()> {
        let trusted = self
            .roots
            .root(chain, proof.height)
            .ok_or_else(|| CrossChainError::UnknownRoot {
                chain: chain.to_string(),
                height: proof.height,
            })?;
        verify_inclusion(proof, &trusted)
    }

    /// Execute a committed `CrossChain` transaction against `state`.
    ///
    /// The marker is written into the same overlay as the invocation's
    /// effects, so both land in one batch or not at all. Any error leaves
    /// `state` as it was.
    pub fn execute(
        &self,
        state: &mut StateOverlay,
        runtime: &ContractRuntime,
        tx: &Transaction,
    ) -> CrossChainResult<CrossChainExecution> {
        let call = tx.cross_chain.as_ref().ok_or(CrossChainError::MissingProof)?;
        let proof = &call.proof;
        self.verify(&tx.dest, proof)?;

        let key = marker_key(&tx.dest, proof.height, &proof.transaction_hash);
        if let Some(marker) = state.get_record::<ConsumedMarker>(&key)? {
            debug!(
                chain = %tx.dest,
                height = proof.height,
                tx_hash = %hex::encode(proof.transaction_hash),
                "proof already consumed, returning recorded outcome"
            );
            return Ok(CrossChainExecution {
                outcome: marker.outcome,
                logs: Vec::new(),
                replayed: true,
            });
        }

        let param = &call.param;
        let execution = runtime.invoke(
            state,
            &tx.from,
            &param.contract_name,
            &param.contract_func,
            &param.contract_args,
            0,
        );
        let value = execution.result?;
        let outcome = Outcome::Success(value);
        let marker = ConsumedMarker {
            chain: tx.dest.clone(),
            height: proof.height,
            transaction_hash: proof.transaction_hash,
            consumed_by: tx.from.clone(),
            contract_name: param.contract_name.clone(),
            contract_func: param.contract_func.clone(),
            outcome: outcome.clone(),
        };
        state.put_record(&key, &marker)?;
        info!(
            chain = %tx.dest,
            height = proof.height,
            tx_hash = %hex::encode(proof.transaction_hash),
            contract = %param.contract_name,
            "cross-chain proof consumed"
        );
        Ok(CrossChainExecution {
            outcome,
            logs: execution.logs,
            replayed: false,
        })
    }

    /// Consumed marker for one foreign transaction.
    pub fn marker<S: StateAccess + ?Sized>(
        &self,
        state: &S,
        chain: &str,
        proof: &CrossTranProof,
    ) -> CrossChainResult<Option<ConsumedMarker>> {
        Ok(state.get_record(&marker_key(chain, proof.height, &proof.transaction_hash))?)
    }

    /// Consumed markers, optionally restricted to one chain.
    pub fn markers<S: StateAccess + ?Sized>(
        &self,
        state: &S,
        chain: Option<&str>,
    ) -> CrossChainResult<Vec<ConsumedMarker>> {
        let prefix = match chain {
            Some(chain) => marker_chain_prefix(chain),
            None => MARKER_PREFIX.to_vec(),
        };
        Ok(state
            .scan_records::<ConsumedMarker>(&prefix)?
            .into_iter()
            .map(|(_, marker)| marker)
            .collect())
    }
}
