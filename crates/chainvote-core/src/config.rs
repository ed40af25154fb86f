//! Chain configuration — genesis deployments and execution limits
//!
//! Loaded from JSON:
//!
//! ```json
//! {
//!   "deployments": [
//!     { "name": "election", "code": "voting", "deployer": "genesis",
//!       "candidates": ["Dung", "Tuan", "Thanh", "Cuong"] }
//!   ],
//!   "limits": { "maxBlockTransactions": 100 }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::contract::{VotingState, VOTING_CODE};
use crate::deploy::DeploymentRequest;
use crate::{Error, Result};

/// Name of the contract deployed by the default configuration.
pub const DEFAULT_CONTRACT_NAME: &str = "election";

/// Default upper bound on transactions considered per assembled block.
pub const DEFAULT_MAX_BLOCK_TRANSACTIONS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub deployments: Vec<DeploymentSpec>,
    #[serde(default)]
    pub limits: ExecutionLimits,
}

/// One genesis contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    pub name: String,
    #[serde(default = "default_code")]
    pub code: String,
    #[serde(default = "default_deployer")]
    pub deployer: String,
    /// Candidate names for voting contracts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
    /// Explicit initial state; takes precedence over `candidates`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLimits {
    #[serde(default = "default_max_block_transactions")]
    pub max_block_transactions: usize,
}

fn default_code() -> String {
    VOTING_CODE.to_string()
}

fn default_deployer() -> String {
    "genesis".to_string()
}

fn default_max_block_transactions() -> usize {
    DEFAULT_MAX_BLOCK_TRANSACTIONS
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        ExecutionLimits {
            max_block_transactions: DEFAULT_MAX_BLOCK_TRANSACTIONS,
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            deployments: vec![DeploymentSpec {
                name: DEFAULT_CONTRACT_NAME.to_string(),
                code: default_code(),
                deployer: default_deployer(),
                candidates: ["Dung", "Tuan", "Thanh", "Cuong"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                state: None,
            }],
            limits: ExecutionLimits::default(),
        }
    }
}

impl DeploymentSpec {
    /// Turn the declaration into a deployment request with a concrete initial state.
    pub fn to_request(&self) -> Result<DeploymentRequest> {
        let state = match (&self.state, self.code.as_str()) {
            (Some(state), _) => state.clone(),
            (None, VOTING_CODE) => {
                let voting = VotingState::new(self.candidates.iter().cloned())
                    .map_err(|e| Error::Config(format!("deployment '{}': {}", self.name, e)))?;
                serde_json::to_value(voting)
                    .map_err(|e| Error::Config(format!("deployment '{}': {}", self.name, e)))?
            }
            (None, code) => {
                return Err(Error::Config(format!(
                    "deployment '{}': code '{}' needs an explicit initial state",
                    self.name, code
                )))
            }
        };
        Ok(DeploymentRequest {
            name: self.name.clone(),
            code: self.code.clone(),
            deployer: self.deployer.clone(),
            state,
        })
    }
}

impl ChainConfig {
    /// Parse and validate configuration text.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: ChainConfig =
            serde_json::from_str(text).map_err(|e| Error::Config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("cannot encode config: {}", e)))
    }

    /// Structural checks that do not need the logic table.
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_block_transactions == 0 {
            return Err(Error::Config("maxBlockTransactions must be at least 1".into()));
        }
        let mut names = std::collections::BTreeSet::new();
        for deployment in &self.deployments {
            if deployment.name.trim().is_empty() {
                return Err(Error::Config("deployment name must not be empty".into()));
            }
            if !names.insert(deployment.name.as_str()) {
                return Err(Error::Config(format!(
                    "deployment '{}' declared more than once",
                    deployment.name
                )));
            }
        }
        Ok(())
    }
}
