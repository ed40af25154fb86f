//! chainvote core - deterministic voting contracts on a block ledger
//!
//! Contracts live as accounts inside each block's registry. A call
//! transaction targets a contract by address; executing a block replays its
//! calls in order against the parent's registry and yields the next one.
//!
//! # Architecture
//!
//! ```text
//! Transaction → Pool → ExecutionPipeline → AccountRegistry → Block
//!                            ↓                                 ↓
//!                      ContractLogic (voting)          Verifier (replay)
//! ```
//!
//! # Guarantees
//!
//! - **Deterministic**: Same parent registry and transactions always yield
//!   byte-identical state and hashes
//! - **Atomic per call**: A failing call leaves no trace in the registry
//! - **Replayable**: Any node can re-derive a block's registry from its parent
//! - **Append-only**: Voters are recorded once and counts never decrease

pub mod account;
pub mod block;
pub mod config;
pub mod contract;
pub mod deploy;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod normalizer;
pub mod registry;
pub mod transaction;
pub mod verifier;

pub use account::ContractAccount;
pub use block::Block;
pub use config::ChainConfig;
pub use contract::{Candidate, ContractLogic, LogicRegistry, VotingContract, VotingState};
pub use error::{Error, Result};
pub use executor::{execute_block, BlockExecution, CallReceipt, ExecutionPipeline};
pub use ledger::{Ledger, LedgerSnapshot, MinedBlock};
pub use registry::AccountRegistry;
pub use transaction::{Transaction, TransactionPool};
