//! # Contract Entities

use crate::errors::ContractError;
use serde::{Deserialize, Serialize};
use shared_types::{Address, LogEntry, Value};

/// Deployed contract instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRecord {
    pub name: String,
    /// Ledger account owned by the contract.
    pub address: Address,
    pub deployer: Address,
    /// Module source as submitted.
    pub code: String,
}

/// Whether state-changing capabilities are available.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Executing a committed request.
    Committed,
    /// Read-only client query; writes and transfers fail.
    Query,
}

/// Runtime limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Deepest nested `call` allowed below the top-level frame.
    pub max_call_depth: u32,
    /// Instruction budget checked at deployment.
    pub max_instructions: usize,
    /// Steps one top-level entry may take across all of its frames.
    pub max_steps: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 8,
            max_instructions: 4096,
            max_steps: 100_000,
        }
    }
}

/// Step budget of one top-level entry. Entering a frame and executing an
/// instruction each cost one step, so the total work of a call tree is
/// bounded no matter how calls fan out.
#[derive(Debug)]
pub struct StepMeter {
    limit: u64,
    used: u64,
}

impl StepMeter {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    pub fn charge(&mut self, steps: u64) -> Result<(), ContractError> {
        let used = self.used.saturating_add(steps);
        if used > self.limit {
            self.used = self.limit;
            return Err(ContractError::StepLimitExceeded { limit: self.limit });
        }
        self.used = used;
        Ok(())
    }

    pub fn used(&self) -> u64 {
        self.used
    }
}

/// Result of one top-level runtime entry.
///
/// `logs` holds every `info` emitted, including those of nested calls that
/// later failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Execution {
    pub result: Result<Value, ContractError>,
    pub logs: Vec<LogEntry>,
}

impl Execution {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}
