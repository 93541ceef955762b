//! Routing of one committed request to its handler.

use super::TransactionDispatcher;
use crate::domain::{ExecutionError, ExecutionResult};
use ql_04_contracts::Execution;
use shared_types::{
    EventMessage, Height, LogEntry, Outcome, Request, RequestKind, StateOverlay, Transaction,
    TransactionKind, Value,
};

/// Handler result plus whatever the contracts logged along the way.
pub(super) struct Handled {
    pub kind: &'static str,
    pub result: ExecutionResult<Outcome>,
    pub logs: Vec<LogEntry>,
}

impl Handled {
    fn new(kind: &'static str, result: ExecutionResult<Outcome>) -> Self {
        Self {
            kind,
            result,
            logs: Vec::new(),
        }
    }

    fn from_execution(kind: &'static str, execution: Execution) -> Self {
        Self {
            kind,
            result: execution
                .result
                .map(Outcome::Success)
                .map_err(ExecutionError::from),
            logs: execution.logs,
        }
    }
}

impl TransactionDispatcher {
    pub(super) fn route(
        &self,
        state: &mut StateOverlay,
        height: Height,
        request: &Request,
    ) -> Handled {
        match request.kind {
            RequestKind::Transaction => match request.decode_transaction() {
                Ok(tx) => self.apply_transaction(state, &tx),
                Err(err) => Handled::new(request.kind.as_str(), Err(err.into())),
            },
            RequestKind::Event => match request.decode_event() {
                Ok(event) => self.apply_event(state, &event, height),
                Err(err) => Handled::new(request.kind.as_str(), Err(err.into())),
            },
        }
    }

    fn apply_transaction(&self, state: &mut StateOverlay, tx: &Transaction) -> Handled {
        let kind = tx.kind.as_str();
        if let Err(err) = tx.verify_authenticity() {
            return Handled::new(kind, Err(err.into()));
        }
        let ledger = self.ledger();
        match tx.kind {
            TransactionKind::Register => Handled::new(
                kind,
                ledger
                    .register(state, &tx.public_key)
                    .map(|account| Outcome::Success(Value::Str(account.address.to_string())))
                    .map_err(ExecutionError::from),
            ),
            TransactionKind::Transfer => Handled::new(
                kind,
                ledger
                    .transfer(state, &tx.from, &tx.to, tx.value)
                    .map(|()| Outcome::Success(Value::Null))
                    .map_err(ExecutionError::from),
            ),
            TransactionKind::Publish => {
                if let Err(err) = ledger.require(&*state, &tx.from) {
                    return Handled::new(kind, Err(err.into()));
                }
                let execution = self
                    .runtime
                    .deploy(state, &tx.from, &tx.contract_name, &tx.code);
                Handled::from_execution(kind, execution)
            }
            TransactionKind::Invoke => {
                if let Err(err) = ledger.require(&*state, &tx.from) {
                    return Handled::new(kind, Err(err.into()));
                }
                let execution = self.runtime.invoke(
                    state,
                    &tx.from,
                    &tx.contract_name,
                    &tx.method,
                    &tx.args,
                    tx.value,
                );
                Handled::from_execution(kind, execution)
            }
            TransactionKind::CrossChain => {
                if let Err(err) = ledger.require(&*state, &tx.from) {
                    return Handled::new(kind, Err(err.into()));
                }
                match self.cross_chain.execute(state, &self.runtime, tx) {
                    Ok(execution) => Handled {
                        kind,
                        result: Ok(execution.outcome),
                        logs: execution.logs,
                    },
                    Err(err) => Handled::new(kind, Err(err.into())),
                }
            }
        }
    }

    fn apply_event(&self, state: &mut StateOverlay, event: &EventMessage, height: Height) -> Handled {
        let kind = RequestKind::Event.as_str();
        match self.oracle.handle_event(state, &self.runtime, event, height) {
            Ok(execution) => Handled {
                kind,
                result: Ok(execution.outcome),
                logs: execution.logs,
            },
            Err(err) => Handled::new(kind, Err(err.into())),
        }
    }
}
