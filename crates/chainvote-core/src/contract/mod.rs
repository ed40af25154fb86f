//! Contract logic — the pure call semantics behind each deployed `code`
//!
//! Every contract variant implements [`ContractLogic`] over the account's
//! opaque `variable`. The execution pipeline never knows which variant it is
//! running: it looks the account's `code` up in a [`LogicRegistry`] and hands
//! over the current state, the authenticated caller and the call payload.
//!
//! # Determinism
//!
//! Implementations are pure functions of their inputs and finish in time
//! bounded by the size of those inputs. They never mutate the
//! state they are given: a successful call returns a fresh value, a rejected
//! call returns an error and the caller keeps the untouched original.

pub mod voting;

use std::collections::BTreeMap;
use std::fmt;

use crate::Result;

pub use voting::{Candidate, VotePayload, VotingContract, VotingState, VOTING_CODE};

/// Call semantics for one contract variant.
pub trait ContractLogic: fmt::Debug + Send + Sync {
    /// The `code` identifier accounts use to select this variant.
    fn code(&self) -> &'static str;

    /// Apply one call. `Ok` carries the new state; `Err` means the call was
    /// not applied and `variable` stays authoritative.
    fn apply(
        &self,
        variable: &serde_json::Value,
        caller: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value>;

    /// Check that a state value is well-formed and satisfies the variant's
    /// invariants.
    fn validate_state(&self, variable: &serde_json::Value) -> Result<()>;

    /// Check invariants that relate two successive states of one account.
    fn check_transition(
        &self,
        _before: &serde_json::Value,
        _after: &serde_json::Value,
    ) -> Result<()> {
        Ok(())
    }
}

/// Explicit table of contract variants keyed by `code`.
#[derive(Debug)]
pub struct LogicRegistry {
    variants: BTreeMap<&'static str, Box<dyn ContractLogic>>,
}

impl LogicRegistry {
    /// An empty table. Every call dispatched against it fails with
    /// `UnknownCode`.
    pub fn empty() -> Self {
        LogicRegistry {
            variants: BTreeMap::new(),
        }
    }

    /// The built-in variants.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(VotingContract));
        registry
    }

    /// Register a variant, replacing any previous one with the same code.
    pub fn register(&mut self, logic: Box<dyn ContractLogic>) {
        self.variants.insert(logic.code(), logic);
    }

    pub fn get(&self, code: &str) -> Option<&dyn ContractLogic> {
        self.variants.get(code).map(|logic| logic.as_ref())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.variants.contains_key(code)
    }

    /// Registered codes in sorted order.
    pub fn codes(&self) -> Vec<&'static str> {
        self.variants.keys().copied().collect()
    }
}

impl Default for LogicRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
