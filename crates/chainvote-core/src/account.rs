//! Contract accounts — identity, code pointer and current state snapshot

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One deployed contract as of one block.
///
/// Values are never mutated in place: a successful call produces a new
/// account through [`ContractAccount::with_variable`] that keeps `id`,
/// `address`, `name` and `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AccountWire")]
pub struct ContractAccount {
    id: String,
    address: String,
    name: String,
    code: String,
    variable: serde_json::Value,
}

/// Lenient wire shape; identity is checked when converting.
#[derive(Deserialize)]
struct AccountWire {
    id: String,
    address: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    variable: serde_json::Value,
}

impl TryFrom<AccountWire> for ContractAccount {
    type Error = String;

    fn try_from(wire: AccountWire) -> std::result::Result<Self, Self::Error> {
        let account = ContractAccount {
            id: wire.id,
            address: wire.address,
            name: wire.name,
            code: wire.code,
            variable: wire.variable,
        };
        account.check_identity()?;
        Ok(account)
    }
}

impl ContractAccount {
    /// Build an account, rejecting empty `id` or `address`.
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        name: impl Into<String>,
        code: impl Into<String>,
        variable: serde_json::Value,
    ) -> Result<Self> {
        let account = ContractAccount {
            id: id.into(),
            address: address.into(),
            name: name.into(),
            code: code.into(),
            variable,
        };
        account.check_identity().map_err(Error::Validation)?;
        Ok(account)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn variable(&self) -> &serde_json::Value {
        &self.variable
    }

    /// Same identity, new state.
    pub fn with_variable(&self, variable: serde_json::Value) -> ContractAccount {
        ContractAccount {
            id: self.id.clone(),
            address: self.address.clone(),
            name: self.name.clone(),
            code: self.code.clone(),
            variable,
        }
    }

    /// True if `other` is the same deployed contract (state aside).
    pub fn same_identity(&self, other: &ContractAccount) -> bool {
        self.id == other.id
            && self.address == other.address
            && self.name == other.name
            && self.code == other.code
    }

    /// Decode the wire form `{id, address, name, code, variable}`.
    ///
    /// Unrecognized fields are ignored. Fails with `Decode` if `id` or
    /// `address` is missing or empty.
    pub fn decode(wire: &serde_json::Value) -> Result<Self> {
        if !wire.is_object() {
            return Err(Error::Decode(format!(
                "contract account must be an object, found {}",
                json_type_name(wire)
            )));
        }
        serde_json::from_value(wire.clone())
            .map_err(|e| Error::Decode(format!("invalid contract account: {}", e)))
    }

    /// Encode to the wire form.
    pub fn encode(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "address": self.address,
            "name": self.name,
            "code": self.code,
            "variable": self.variable,
        })
    }

    fn check_identity(&self) -> std::result::Result<(), String> {
        if self.id.is_empty() {
            return Err("contract account id must not be empty".into());
        }
        if self.address.is_empty() {
            return Err("contract account address must not be empty".into());
        }
        Ok(())
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
