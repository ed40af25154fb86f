//! Error types for chainvote
//!
//! All fallible operations return `Result<T, Error>`.
//! Per-transaction errors are recovered by the execution pipeline and
//! reported on the transaction's receipt; the rest abort the caller.

use thiserror::Error;

/// chainvote error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed call payload, contract state or deployment request
    #[error("Validation error: {0}")]
    Validation(String),

    /// The caller has already voted on this contract
    #[error("Duplicate voter: address '{address}' has already voted")]
    DuplicateVoter { address: String },

    /// The payload names a candidate the contract does not know
    #[error("Unknown candidate: '{candidate}'")]
    UnknownCandidate { candidate: String },

    /// No contract is deployed at the target address
    #[error("Contract not found at address '{address}'")]
    ContractNotFound { address: String },

    /// The account names a contract code with no registered logic
    #[error("Contract not found: no logic registered for code '{code}' (address '{address}')")]
    UnknownCode { address: String, code: String },

    /// Malformed persisted or wire form
    #[error("Decode error: {0}")]
    Decode(String),

    /// A transaction with the same id is already pending or committed
    #[error("Duplicate transaction: '{0}'")]
    DuplicateTransaction(String),

    /// No block at the requested index
    #[error("Block not found at index {0}")]
    BlockNotFound(u64),

    /// A received block failed validation
    #[error("Block rejected: {0}")]
    BlockRejected(String),

    /// Chain configuration could not be loaded or is inconsistent
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// True for failures confined to a single contract call. The pipeline
    /// drops the offending transaction and keeps going.
    pub fn is_per_transaction(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::DuplicateVoter { .. }
                | Error::UnknownCandidate { .. }
                | Error::ContractNotFound { .. }
                | Error::UnknownCode { .. }
        )
    }

    /// True for the "target has no usable contract" class.
    pub fn is_contract_not_found(&self) -> bool {
        matches!(
            self,
            Error::ContractNotFound { .. } | Error::UnknownCode { .. }
        )
    }

    /// Short stable label used in receipts and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::DuplicateVoter { .. } => "duplicate_voter",
            Error::UnknownCandidate { .. } => "unknown_candidate",
            Error::ContractNotFound { .. } => "contract_not_found",
            Error::UnknownCode { .. } => "unknown_code",
            Error::Decode(_) => "decode",
            Error::DuplicateTransaction(_) => "duplicate_transaction",
            Error::BlockNotFound(_) => "block_not_found",
            Error::BlockRejected(_) => "block_rejected",
            Error::Config(_) => "config",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

/// Result type alias for chainvote operations
pub type Result<T> = std::result::Result<T, Error>;
