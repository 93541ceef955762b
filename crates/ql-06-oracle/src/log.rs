//! # Oracle Report Log
//!
//! Append-only log of off-chain reports plus one summary record per
//! reporter. Reports are only ever appended; an index, once assigned, always
//! names the same report.

use crate::domain::{
    account_key, report_key, OracleAccount, OracleReport, OracleResult, ACCOUNT_PREFIX,
    REPORT_COUNT_KEY, REPORT_PREFIX,
};
use shared_types::{Address, Height, RecordAccess, StateAccess};

/// Read/append access to the report log.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleLog;

impl OracleLog {
    pub fn new() -> Self {
        Self
    }

    /// Number of reports appended so far.
    pub fn len<S: StateAccess + ?Sized>(&self, state: &S) -> OracleResult<u64> {
        Ok(state.get_record::<u64>(REPORT_COUNT_KEY)?.unwrap_or(0))
    }

    /// Append `report` at the next index and return that index. The
    /// `index` field of the argument is overwritten.
    pub fn append<S: StateAccess + ?Sized>(
        &self,
        state: &mut S,
        mut report: OracleReport,
    ) -> OracleResult<u64> {
        let index = self.len(state)?;
        report.index = index;
        state.put_record(&report_key(index), &report)?;
        state.put_record(REPORT_COUNT_KEY, &(index + 1))?;
        Ok(index)
    }

    pub fn get<S: StateAccess + ?Sized>(
        &self,
        state: &S,
        index: u64,
    ) -> OracleResult<Option<OracleReport>> {
        Ok(state.get_record(&report_key(index))?)
    }

    /// Every report in append order.
    pub fn reports<S: StateAccess + ?Sized>(&self, state: &S) -> OracleResult<Vec<OracleReport>> {
        Ok(state
            .scan_records::<OracleReport>(REPORT_PREFIX)?
            .into_iter()
            .map(|(_, report)| report)
            .collect())
    }

    /// Count a report against its reporter's account, creating it on first use.
    pub fn record_reporter<S: StateAccess + ?Sized>(
        &self,
        state: &mut S,
        reporter: &Address,
        public_key: &[u8],
        event_key: &str,
        height: Height,
    ) -> OracleResult<OracleAccount> {
        let key = account_key(reporter);
        let mut account = state
            .get_record::<OracleAccount>(&key)?
            .unwrap_or_else(|| OracleAccount {
                address: reporter.clone(),
                public_key: Vec::new(),
                reports: 0,
                last_event_key: String::new(),
                last_height: 0,
            });
        if account.public_key.is_empty() && !public_key.is_empty() {
            account.public_key = public_key.to_vec();
        }
        account.reports += 1;
        account.last_event_key = event_key.to_string();
        account.last_height = height;
        state.put_record(&key, &account)?;
        Ok(account)
    }

    pub fn account<S: StateAccess + ?Sized>(
        &self,
        state: &S,
        address: &Address,
    ) -> OracleResult<Option<OracleAccount>> {
        Ok(state.get_record(&account_key(address))?)
    }

    /// Every reporter account, ordered by address.
    pub fn accounts<S: StateAccess + ?Sized>(&self, state: &S) -> OracleResult<Vec<OracleAccount>> {
        Ok(state
            .scan_records::<OracleAccount>(ACCOUNT_PREFIX)?
            .into_iter()
            .map(|(_, account)| account)
            .collect())
    }
}
