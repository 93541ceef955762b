//! # Account Ledger
//!
//! Balances and identities. Every mutation goes through a [`StateAccess`]
//! handed in by the dispatcher, so it lands in the request's overlay and is
//! committed or discarded with the rest of the request.

use crate::domain::{account_key, AccountError, LedgerConfig, ACCOUNT_PREFIX};
use shared_types::{Account, Address, RecordAccess, StateAccess};
use tracing::debug;

/// Account ledger operations over a state view.
#[derive(Debug, Clone, Default)]
pub struct AccountLedger {
    config: LedgerConfig,
}

impl AccountLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn get<S: StateAccess + ?Sized>(
        &self,
        state: &S,
        address: &Address,
    ) -> Result<Option<Account>, AccountError> {
        Ok(state.get_record(&account_key(address))?)
    }

    pub fn exists<S: StateAccess + ?Sized>(
        &self,
        state: &S,
        address: &Address,
    ) -> Result<bool, AccountError> {
        Ok(state.read(&account_key(address))?.is_some())
    }

    /// Account or `AccountNotFound`.
    pub fn require<S: StateAccess + ?Sized>(
        &self,
        state: &S,
        address: &Address,
    ) -> Result<Account, AccountError> {
        self.get(state, address)?
            .ok_or_else(|| AccountError::AccountNotFound {
                address: address.clone(),
            })
    }

    pub fn balance<S: StateAccess + ?Sized>(
        &self,
        state: &S,
        address: &Address,
    ) -> Result<u64, AccountError> {
        Ok(self.require(state, address)?.balance)
    }

    /// Create the account for `public_key` with the initial balance.
    ///
    /// The address is `hex(sha256(public_key))`; registering the same key
    /// twice fails with `DuplicateAccount`.
    pub fn register<S: StateAccess + ?Sized>(
        &self,
        state: &mut S,
        public_key: &[u8],
    ) -> Result<Account, AccountError> {
        if public_key.is_empty() {
            return Err(AccountError::EmptyPublicKey);
        }
        let address = Address::from_public_key(public_key);
        if self.exists(state, &address)? {
            return Err(AccountError::DuplicateAccount { address });
        }
        let account = Account {
            address,
            public_key: public_key.to_vec(),
            balance: self.config.initial_balance,
        };
        state.put_record(&account_key(&account.address), &account)?;
        debug!(address = %account.address, balance = account.balance, "account registered");
        Ok(account)
    }

    /// Zero-balance account owned by a deployed contract.
    pub fn open_contract_account<S: StateAccess + ?Sized>(
        &self,
        state: &mut S,
        address: &Address,
    ) -> Result<Account, AccountError> {
        if self.exists(state, address)? {
            return Err(AccountError::DuplicateAccount {
                address: address.clone(),
            });
        }
        let account = Account {
            address: address.clone(),
            public_key: Vec::new(),
            balance: 0,
        };
        state.put_record(&account_key(address), &account)?;
        Ok(account)
    }

    /// Move `value` from `from` to `to`.
    ///
    /// Both accounts must exist, `value > 0` and `from != to`. On error
    /// nothing is written.
    pub fn transfer<S: StateAccess + ?Sized>(
        &self,
        state: &mut S,
        from: &Address,
        to: &Address,
        value: u64,
    ) -> Result<(), AccountError> {
        if value == 0 {
            return Err(AccountError::NonPositiveValue);
        }
        if from == to {
            return Err(AccountError::SelfTransfer {
                address: from.clone(),
            });
        }
        let mut sender = self.require(state, from)?;
        let mut recipient = self.require(state, to)?;
        if sender.balance < value {
            return Err(AccountError::InsufficientBalance {
                address: from.clone(),
                required: value,
                available: sender.balance,
            });
        }
        recipient.balance = recipient
            .balance
            .checked_add(value)
            .ok_or_else(|| AccountError::BalanceOverflow { address: to.clone() })?;
        sender.balance -= value;

        state.put_record(&account_key(from), &sender)?;
        state.put_record(&account_key(to), &recipient)?;
        debug!(%from, %to, value, "transfer applied");
        Ok(())
    }

    /// Every account, ordered by address.
    pub fn all_accounts<S: StateAccess + ?Sized>(
        &self,
        state: &S,
    ) -> Result<Vec<Account>, AccountError> {
        Ok(state
            .scan_records::<Account>(ACCOUNT_PREFIX)?
            .into_iter()
            .map(|(_, account)| account)
            .collect())
    }
}
