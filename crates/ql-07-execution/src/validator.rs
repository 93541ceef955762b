//! # Pre-consensus Validation
//!
//! Cheap checks against committed state that reject requests before they
//! are ordered. Passing does not guarantee success: state may change
//! between validation and execution, and the dispatcher repeats every
//! check that matters.

use crate::domain::{tx_receipt_key, SubmitError};
use crate::ports::RequestAdmission;
use ql_03_accounts::AccountError;
use ql_04_contracts::{ContractError, ContractRuntime};
use shared_types::{
    Account, EventMessage, Hash, KeyValueStore, Request, RequestKind, StateAccess, StateOverlay,
    Transaction, TransactionKind,
};
use std::sync::Arc;
use tracing::debug;

/// Validates client requests against committed state.
pub struct RequestValidator {
    store: Arc<dyn KeyValueStore>,
    runtime: Arc<ContractRuntime>,
}

impl RequestValidator {
    pub fn new(store: Arc<dyn KeyValueStore>, runtime: Arc<ContractRuntime>) -> Self {
        Self { store, runtime }
    }

    fn check_transaction(&self, state: &StateOverlay, tx: &Transaction) -> Result<(), SubmitError> {
        tx.verify_authenticity()?;
        self.check_not_committed(state, &tx.hash)?;

        let ledger = self.runtime.ledger();
        match tx.kind {
            TransactionKind::Register => {
                if ledger.exists(state, &tx.from)? {
                    return Err(AccountError::DuplicateAccount {
                        address: tx.from.clone(),
                    }
                    .into());
                }
            }
            TransactionKind::Publish => {
                self.sender(state, tx)?;
                self.runtime.check_deploy(state, &tx.contract_name, &tx.code)?;
            }
            TransactionKind::Transfer => {
                if tx.value == 0 {
                    return Err(AccountError::NonPositiveValue.into());
                }
                if tx.from == tx.to {
                    return Err(AccountError::SelfTransfer {
                        address: tx.from.clone(),
                    }
                    .into());
                }
                let sender = self.sender(state, tx)?;
                ledger.require(state, &tx.to)?;
                check_balance(&sender, tx.value)?;
            }
            TransactionKind::Invoke => {
                let sender = self.sender(state, tx)?;
                if !self.runtime.is_system(&tx.contract_name)
                    && self.runtime.contract(state, &tx.contract_name)?.is_none()
                {
                    return Err(ContractError::ContractNotFound {
                        name: tx.contract_name.clone(),
                    }
                    .into());
                }
                check_balance(&sender, tx.value)?;
            }
            TransactionKind::CrossChain => {
                self.sender(state, tx)?;
                let complete = tx.cross_chain.as_ref().is_some_and(|call| {
                    !call.param.contract_name.is_empty() && !call.param.contract_func.is_empty()
                });
                if tx.dest.is_empty() || !complete {
                    return Err(SubmitError::MissingCrossChainPayload);
                }
            }
        }
        Ok(())
    }

    fn check_event(&self, state: &StateOverlay, event: &EventMessage) -> Result<(), SubmitError> {
        event
            .verify()
            .map_err(|e| SubmitError::InvalidEvent(e.to_string()))?;
        if event.event_key.is_empty() {
            return Err(SubmitError::InvalidEvent("event key is empty".into()));
        }
        self.check_not_committed(state, &event.compute_hash())
    }

    fn check_not_committed(&self, state: &StateOverlay, hash: &Hash) -> Result<(), SubmitError> {
        if state.read(&tx_receipt_key(hash))?.is_some() {
            return Err(SubmitError::AlreadyCommitted(hex::encode(hash)));
        }
        Ok(())
    }

    fn sender(&self, state: &StateOverlay, tx: &Transaction) -> Result<Account, SubmitError> {
        self.runtime
            .ledger()
            .get(state, &tx.from)?
            .ok_or_else(|| SubmitError::UnknownSender(tx.from.clone()))
    }
}

fn check_balance(sender: &Account, value: u64) -> Result<(), SubmitError> {
    if sender.balance < value {
        return Err(AccountError::InsufficientBalance {
            address: sender.address.clone(),
            required: value,
            available: sender.balance,
        }
        .into());
    }
    Ok(())
}

impl RequestAdmission for RequestValidator {
    fn validate(&self, request: &Request) -> Result<(), SubmitError> {
        let state = StateOverlay::new(Arc::clone(&self.store));
        let result = match request.kind {
            RequestKind::Transaction => {
                let tx = request.decode_transaction()?;
                self.check_transaction(&state, &tx)
            }
            RequestKind::Event => {
                let event = request.decode_event()?;
                self.check_event(&state, &event)
            }
        };
        if let Err(err) = &result {
            debug!(message_id = %request.message_id, error = %err, "request rejected");
        }
        result
    }
}
