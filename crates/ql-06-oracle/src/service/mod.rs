//! # Oracle Event Bridge
//!
//! Turns a committed `Event` request into a log entry and, when a contract
//! is waiting for that event key, a callback invocation.
//!
//! The report append, the reporter account update, the removal of the
//! registration and the callback's own effects form one unit: when the
//! callback fails none of them is kept and the registration stays pending.

use crate::domain::{
    callback_entry, CallbackRegistration, ContractEvent, OracleAccount, OracleError,
    OracleReport, OracleResult, CALLBACK_ENTRY_PREFIX, EVENT_ENTRY_PREFIX, ORACLE_CONTRACT,
};
use crate::log::OracleLog;
use crate::module::from_value;
use ql_04_contracts::{storage, ContractRuntime};
use shared_types::{EventMessage, Height, LogEntry, Outcome, StateAccess, StateOverlay, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};


/// What a committed event produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventExecution {
    pub outcome: Outcome,
    pub logs: Vec<LogEntry>,
    pub report_index: u64,
    /// The registration the event answered, if any.
    pub callback: Option<CallbackRegistration>,
}

/// The Oracle Event Bridge.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleBridge {
    log: OracleLog,
}

impl OracleBridge {
    pub fn new() -> Self {
        Self { log: OracleLog::new() }
    }

    pub fn log(&self) -> &OracleLog {
        &self.log
    }

    /// Record a committed event and deliver it to a pending callback.
    ///
    /// On error `state` is left as it was.
    pub fn handle_event(
        &self,
        state: &mut StateOverlay,
        runtime: &ContractRuntime,
        event: &EventMessage,
        height: Height,
    ) -> OracleResult<EventExecution> {
        event.verify()?;
        if event.event_key.is_empty() {
            return Err(OracleError::InvalidEvent("event key is empty".into()));
        }

        state.begin_layer();
        let result = self.apply(state, runtime, event, height);
        match &result {
            Ok(_) => state.commit_layer(),
            Err(_) => state.discard_layer(),
        }
        result
    }

    fn apply(
        &self,
        state: &mut StateOverlay,
        runtime: &ContractRuntime,
        event: &EventMessage,
        height: Height,
    ) -> OracleResult<EventExecution> {
        let callback = self.pending_callback(&*state, &event.event_key)?;
        let report = OracleReport {
            index: 0,
            event_key: event.event_key.clone(),
            reporter: event.from.clone(),
            body: event.report.clone(),
            args: event.args.clone(),
            height,
            callback: callback
                .as_ref()
                .map(|reg| format!("{}.{}", reg.contract, reg.method)),
        };
        let report_index = self.log.append(state, report)?;
        self.log.record_reporter(
            state,
            &event.from,
            &event.public_key,
            &event.event_key,
            height,
        )?;

        let Some(registration) = callback else {
            debug!(event_key = %event.event_key, report_index, "oracle report stored");
            let mut result = BTreeMap::new();
            result.insert("report".to_string(), Value::Int(report_index as i64));
            return Ok(EventExecution {
                outcome: Outcome::Success(Value::Map(result)),
                logs: Vec::new(),
                report_index,
                callback: None,
            });
        };

        storage::delete_path(state, ORACLE_CONTRACT, &[callback_entry(&event.event_key)])?;
        let mut args = registration.args.clone();
        args.extend(event.args.clone());
        args.insert("data".to_string(), event.report.clone());
        args.insert("key".to_string(), Value::Str(event.event_key.clone()));

        let execution = runtime.invoke(
            state,
            &event.from,
            &registration.contract,
            &registration.method,
            &args,
            0,
        );
        let value = execution.result?;
        info!(
            event_key = %event.event_key,
            contract = %registration.contract,
            method = %registration.method,
            report_index,
            "oracle callback delivered"
        );
        Ok(EventExecution {
            outcome: Outcome::Success(value),
            logs: execution.logs,
            report_index,
            callback: Some(registration),
        })
    }

    /// Registration waiting for `event_key`, if any.
    pub fn pending_callback<S: StateAccess + ?Sized>(
        &self,
        state: &S,
        event_key: &str,
    ) -> OracleResult<Option<CallbackRegistration>> {
        match storage::read_path(state, ORACLE_CONTRACT, &[callback_entry(event_key)])? {
            Value::Null => Ok(None),
            value => Ok(Some(from_value(value)?)),
        }
    }

    /// Every pending registration, ordered by event key.
    pub fn pending_callbacks<S: StateAccess + ?Sized>(
        &self,
        state: &S,
    ) -> OracleResult<Vec<CallbackRegistration>> {
        storage::entries(state, ORACLE_CONTRACT, CALLBACK_ENTRY_PREFIX)?
            .into_iter()
            .map(|(_, value)| Ok(from_value(value)?))
            .collect()
    }

    /// Events contracts appended through `record_event`, in order.
    pub fn events<S: StateAccess + ?Sized>(&self, state: &S) -> OracleResult<Vec<ContractEvent>> {
        storage::entries(state, ORACLE_CONTRACT, EVENT_ENTRY_PREFIX)?
            .into_iter()
            .map(|(_, value)| Ok(from_value(value)?))
            .collect()
    }

    pub fn reports<S: StateAccess + ?Sized>(&self, state: &S) -> OracleResult<Vec<OracleReport>> {
        self.log.reports(state)
    }

    pub fn accounts<S: StateAccess + ?Sized>(&self, state: &S) -> OracleResult<Vec<OracleAccount>> {
        self.log.accounts(state)
    }
}
