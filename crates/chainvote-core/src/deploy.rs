//! Contract deployment — assigns addresses and registers new accounts
//!
//! Addresses are derived, never typed in: the deployer, contract name, code
//! and the registry position are hashed, so every node deploying the same
//! genesis list gets the same addresses. The [`ContractDirectory`] keeps the
//! name → address table that front ends use to find a contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::account::ContractAccount;
use crate::contract::LogicRegistry;
use crate::normalizer;
use crate::registry::AccountRegistry;
use crate::{Error, Result};

/// Hex characters kept from the identity hash for the address.
pub const ADDRESS_HEX_LEN: usize = 40;

/// A request to deploy one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    pub name: String,
    pub code: String,
    pub deployer: String,
    /// Initial `variable`
    pub state: serde_json::Value,
}

/// Deterministic `(id, address)` for a deployment at registry position
/// `nonce`.
pub fn derive_identity(request: &DeploymentRequest, nonce: u64) -> (String, String) {
    let body = serde_json::json!({
        "deployer": request.deployer,
        "name": request.name,
        "code": request.code,
        "nonce": nonce,
    });
    let id = normalizer::sha256_hex(normalizer::canonical_json(&body).as_bytes());
    let address = id[..ADDRESS_HEX_LEN].to_string();
    (id, address)
}

/// Deploy `request` on top of `registry`.
///
/// Fails with `Validation` if the name is empty or taken, the code has no
/// registered logic, or the initial state breaks the variant's invariants.
pub fn deploy(
    logic: &LogicRegistry,
    registry: &AccountRegistry,
    request: &DeploymentRequest,
) -> Result<(AccountRegistry, ContractAccount)> {
    if request.name.trim().is_empty() {
        return Err(Error::Validation("contract name must not be empty".into()));
    }
    if request.deployer.is_empty() {
        return Err(Error::Validation("deployer address must not be empty".into()));
    }
    if registry.find_by_name(&request.name).is_some() {
        return Err(Error::Validation(format!(
            "a contract named '{}' is already deployed",
            request.name
        )));
    }
    let variant = logic.get(&request.code).ok_or_else(|| {
        Error::Validation(format!("no contract logic registered for code '{}'", request.code))
    })?;
    variant.validate_state(&request.state)?;

    let (id, address) = derive_identity(request, registry.len() as u64);
    if registry.contains_address(&address) {
        return Err(Error::Validation(format!(
            "address '{}' is already in use",
            address
        )));
    }
    let account = ContractAccount::new(
        id,
        address,
        request.name.clone(),
        request.code.clone(),
        request.state.clone(),
    )?;
    info!(name = %request.name, code = %request.code, address = %account.address(), "contract deployed");
    Ok((registry.with_updated(account.clone()), account))
}

/// Name → address table of deployed contracts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDirectory {
    entries: BTreeMap<String, String>,
}

impl ContractDirectory {
    pub fn new() -> Self {
        ContractDirectory {
            entries: BTreeMap::new(),
        }
    }

    /// Rebuild the table from a registry snapshot.
    pub fn from_registry(registry: &AccountRegistry) -> Self {
        let entries = registry
            .iter()
            .map(|account| (account.name().to_string(), account.address().to_string()))
            .collect();
        ContractDirectory { entries }
    }

    pub fn register(&mut self, account: &ContractAccount) {
        self.entries
            .insert(account.name().to_string(), account.address().to_string());
    }

    /// Address of the contract deployed as `name`.
    pub fn resolve(&self, name: &str) -> Result<&str> {
        self.entries
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| Error::ContractNotFound {
                address: format!("<unregistered name '{}'>", name),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, a)| (n.as_str(), a.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
