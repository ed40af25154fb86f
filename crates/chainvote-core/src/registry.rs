//! Account registry — every deployed contract's state as of one block
//!
//! The registry is an ordered list: deployment order first, and each update
//! keeps the account at its original position. Updates return a new registry
//! so the snapshot held by the parent block is never disturbed.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::account::ContractAccount;
use crate::normalizer;
use crate::{Error, Result};

/// Ordered collection of contract accounts, at most one per address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ContractAccount>", into = "Vec<ContractAccount>")]
pub struct AccountRegistry {
    accounts: Vec<ContractAccount>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        AccountRegistry {
            accounts: Vec::new(),
        }
    }

    /// Build a registry from accounts, rejecting duplicate addresses.
    pub fn from_accounts(accounts: Vec<ContractAccount>) -> Result<Self> {
        check_unique_addresses(&accounts).map_err(Error::Validation)?;
        Ok(AccountRegistry { accounts })
    }

    pub fn find_by_address(&self, address: &str) -> Option<&ContractAccount> {
        self.accounts
            .iter()
            .find(|account| account.address() == address)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ContractAccount> {
        self.accounts.iter().find(|account| account.name() == name)
    }

    pub fn contains_address(&self, address: &str) -> bool {
        self.find_by_address(address).is_some()
    }

    /// A new registry where the account at `account.address()` is replaced,
    /// or `account` is appended if the address is new. All other accounts keep
    /// their relative order.
    pub fn with_updated(&self, account: ContractAccount) -> AccountRegistry {
        let mut accounts = self.accounts.clone();
        match accounts
            .iter()
            .position(|existing| existing.address() == account.address())
        {
            Some(index) => accounts[index] = account,
            None => accounts.push(account),
        }
        AccountRegistry { accounts }
    }

    /// Decode a list of wire accounts. Any element failing to decode, or two
    /// elements sharing an address, fails the whole decode.
    pub fn decode(wire: &[serde_json::Value]) -> Result<Self> {
        let accounts = wire
            .iter()
            .enumerate()
            .map(|(i, item)| {
                ContractAccount::decode(item)
                    .map_err(|e| Error::Decode(format!("account #{}: {}", i, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        check_unique_addresses(&accounts).map_err(Error::Decode)?;
        Ok(AccountRegistry { accounts })
    }

    pub fn encode(&self) -> Vec<serde_json::Value> {
        self.accounts.iter().map(ContractAccount::encode).collect()
    }

    /// SHA-256 over the canonical encoding. Equal hashes mean byte-identical
    /// registries.
    pub fn state_hash(&self) -> String {
        let encoded = serde_json::Value::Array(self.encode());
        normalizer::sha256_hex(normalizer::canonical_json(&encoded).as_bytes())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ContractAccount> {
        self.accounts.iter()
    }

    pub fn accounts(&self) -> &[ContractAccount] {
        &self.accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl TryFrom<Vec<ContractAccount>> for AccountRegistry {
    type Error = String;

    fn try_from(accounts: Vec<ContractAccount>) -> std::result::Result<Self, Self::Error> {
        check_unique_addresses(&accounts)?;
        Ok(AccountRegistry { accounts })
    }
}

impl From<AccountRegistry> for Vec<ContractAccount> {
    fn from(registry: AccountRegistry) -> Self {
        registry.accounts
    }
}

impl<'a> IntoIterator for &'a AccountRegistry {
    type Item = &'a ContractAccount;
    type IntoIter = std::slice::Iter<'a, ContractAccount>;

    fn into_iter(self) -> Self::IntoIter {
        self.accounts.iter()
    }
}

fn check_unique_addresses(accounts: &[ContractAccount]) -> std::result::Result<(), String> {
    let mut seen = BTreeSet::new();
    for account in accounts {
        if !seen.insert(account.address()) {
            return Err(format!(
                "address '{}' appears more than once in registry",
                account.address()
            ));
        }
    }
    Ok(())
}
