//! Account state

use std::collections::BTreeMap;

use bytes::Bytes;
use ethflow_evm::Host;
use ethflow_primitives::{Address, H256, U256};

/// Genesis allocation for one account
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenesisAccount {
    /// Balance in wei
    pub balance: U256,
    /// Runtime code
    pub code: Bytes,
    /// Storage slots
    pub storage: BTreeMap<H256, U256>,
    /// Nonce
    pub nonce: u64,
}

impl GenesisAccount {
    /// Externally owned account with a balance
    pub fn with_balance(balance: impl Into<U256>) -> Self {
        Self { balance: balance.into(), ..Self::default() }
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct AccountState {
    pub balance: U256,
    pub nonce: u64,
    pub code: Bytes,
    pub storage: BTreeMap<H256, U256>,
}

impl From<GenesisAccount> for AccountState {
    fn from(g: GenesisAccount) -> Self {
        Self { balance: g.balance, nonce: g.nonce, code: g.code, storage: g.storage }
    }
}

/// World state after some block; cloned per block for historical reads
#[derive(Clone, Debug, Default)]
pub(crate) struct WorldState {
    accounts: BTreeMap<Address, AccountState>,
}

impl WorldState {
    pub fn from_alloc(alloc: impl IntoIterator<Item = (Address, GenesisAccount)>) -> Self {
        Self { accounts: alloc.into_iter().map(|(a, g)| (a, g.into())).collect() }
    }

    pub fn balance(&self, address: &Address) -> U256 {
        self.accounts.get(address).map(|a| a.balance).unwrap_or_default()
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.accounts.get(address).map(|a| a.nonce).unwrap_or_default()
    }

    pub fn code(&self, address: &Address) -> Bytes {
        self.accounts.get(address).map(|a| a.code.clone()).unwrap_or_default()
    }

    fn account_mut(&mut self, address: Address) -> &mut AccountState {
        self.accounts.entry(address).or_default()
    }

    pub fn credit(&mut self, address: Address, amount: U256) {
        if amount.is_zero() {
            return;
        }
        let account = self.account_mut(address);
        account.balance = account.balance.saturating_add(amount);
    }

    /// `false` leaves the balance untouched
    pub fn debit(&mut self, address: Address, amount: U256) -> bool {
        let account = self.account_mut(address);
        match account.balance.checked_sub(amount) {
            Some(rest) => {
                account.balance = rest;
                true
            }
            None => false,
        }
    }

    pub fn increment_nonce(&mut self, address: Address) {
        let account = self.account_mut(address);
        account.nonce += 1;
    }

    pub fn set_code(&mut self, address: Address, code: Bytes) {
        self.account_mut(address).code = code;
    }

    pub fn apply_storage(&mut self, address: Address, changes: Vec<(H256, U256)>) {
        if changes.is_empty() {
            return;
        }
        let storage = &mut self.account_mut(address).storage;
        for (key, value) in changes {
            if value.is_zero() {
                storage.remove(&key);
            } else {
                storage.insert(key, value);
            }
        }
    }
}

impl Host for WorldState {
    fn balance(&self, address: &Address) -> U256 {
        WorldState::balance(self, address)
    }

    fn storage(&self, address: &Address, key: &H256) -> U256 {
        self.accounts
            .get(address)
            .and_then(|a| a.storage.get(key).copied())
            .unwrap_or_default()
    }
}
