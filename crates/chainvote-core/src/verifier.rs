//! Block verifier — accepts a received block only if replay reproduces it
//!
//! A block is checked against its parent in four phases and every problem
//! found is reported, not just the first:
//!
//! 1. **Linkage** — index follows the parent, `previousHash` names it
//! 2. **Integrity** — the block hash and every transaction id match content
//! 3. **Replay** — re-executing the block's transactions from the parent
//!    registry applies every one of them and yields the block's registry
//! 4. **Invariants** — every account's state is valid for its code, no
//!    contract disappeared or changed identity, transitions are legal

use std::collections::BTreeSet;

use crate::block::Block;
use crate::contract::LogicRegistry;
use crate::executor;
use crate::normalizer::ZERO_HASH;
use crate::registry::AccountRegistry;
use crate::{Error, Result};

// ── Verification Result Types ─────────────────────────────

/// Accumulated diagnostics for one block
#[derive(Debug, Clone, Default)]
pub struct VerificationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl VerificationResult {
    pub fn new() -> Self {
        Self {
            diagnostics: Vec::new(),
        }
    }

    /// True if no errors were found (warnings are OK)
    pub fn is_valid(&self) -> bool {
        !self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .collect()
    }

    /// `Ok` if valid, otherwise `BlockRejected` listing every error.
    pub fn into_result(self) -> Result<()> {
        if self.is_valid() {
            return Ok(());
        }
        let messages: Vec<String> = self.errors().iter().map(|d| d.to_string()).collect();
        Err(Error::BlockRejected(messages.join("; ")))
    }

    fn add_error(&mut self, kind: DiagnosticKind, message: String) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            kind,
            message,
        });
    }

    fn add_warning(&mut self, kind: DiagnosticKind, message: String) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            kind,
            message,
        });
    }
}

/// A single verification diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{} [{}]: {}", prefix, self.kind, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Linkage,
    Integrity,
    Replay,
    Invariant,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DiagnosticKind::Linkage => write!(f, "linkage"),
            DiagnosticKind::Integrity => write!(f, "integrity"),
            DiagnosticKind::Replay => write!(f, "replay"),
            DiagnosticKind::Invariant => write!(f, "invariant"),
        }
    }
}

// ── Public API ────────────────────────────────────────────

/// Verify `block` as the child of `parent`.
pub fn verify_block(logic: &LogicRegistry, parent: &Block, block: &Block) -> VerificationResult {
    let mut result = VerificationResult::new();
    check_linkage(parent, block, &mut result);
    check_integrity(block, &mut result);
    check_replay(logic, parent, block, &mut result);
    check_invariants(logic, Some(parent.contract_accounts()), block.contract_accounts(), &mut result);
    result
}

/// Verify a genesis block: no parent, no transactions, valid deployments.
pub fn verify_genesis(logic: &LogicRegistry, block: &Block) -> VerificationResult {
    let mut result = VerificationResult::new();
    if block.index() != 0 {
        result.add_error(
            DiagnosticKind::Linkage,
            format!("genesis block has index {}", block.index()),
        );
    }
    if block.previous_hash() != ZERO_HASH {
        result.add_error(
            DiagnosticKind::Linkage,
            "genesis block must not reference a parent".into(),
        );
    }
    if !block.transactions().is_empty() {
        result.add_error(
            DiagnosticKind::Integrity,
            format!("genesis block carries {} transactions", block.transactions().len()),
        );
    }
    check_integrity(block, &mut result);
    check_invariants(logic, None, block.contract_accounts(), &mut result);
    result
}

// ── Phase 1: Linkage ──────────────────────────────────────

fn check_linkage(parent: &Block, block: &Block, result: &mut VerificationResult) {
    if block.index() != parent.index() + 1 {
        result.add_error(
            DiagnosticKind::Linkage,
            format!(
                "invalid index {} (expected {})",
                block.index(),
                parent.index() + 1
            ),
        );
    }
    if block.previous_hash() != parent.hash() {
        result.add_error(
            DiagnosticKind::Linkage,
            format!(
                "previous hash '{}' does not match parent '{}'",
                block.previous_hash(),
                parent.hash()
            ),
        );
    }
}

// ── Phase 2: Integrity ────────────────────────────────────

fn check_integrity(block: &Block, result: &mut VerificationResult) {
    if !block.has_valid_hash() {
        result.add_error(
            DiagnosticKind::Integrity,
            format!(
                "block hash '{}' does not match content (expected '{}')",
                block.hash(),
                block.compute_hash()
            ),
        );
    }
    let mut ids = BTreeSet::new();
    for tx in block.transactions() {
        if let Err(e) = tx.validate() {
            result.add_error(
                DiagnosticKind::Integrity,
                format!("transaction '{}': {}", tx.id, e),
            );
        }
        if !ids.insert(tx.id.as_str()) {
            result.add_error(
                DiagnosticKind::Integrity,
                format!("transaction '{}' included twice", tx.id),
            );
        }
    }
}

// ── Phase 3: Replay ───────────────────────────────────────

fn check_replay(logic: &LogicRegistry, parent: &Block, block: &Block, result: &mut VerificationResult) {
    let replay = executor::execute_block(logic, parent.contract_accounts(), block.transactions());

    for receipt in replay.rejected() {
        if let Some(error) = &receipt.error {
            result.add_error(
                DiagnosticKind::Replay,
                format!(
                    "transaction '{}' does not apply: {}",
                    receipt.transaction_id, error
                ),
            );
        }
    }

    if replay.registry != *block.contract_accounts() {
        result.add_error(
            DiagnosticKind::Replay,
            format!(
                "replayed state hash '{}' differs from block state hash '{}'",
                replay.registry.state_hash(),
                block.contract_accounts().state_hash()
            ),
        );
    }
}

// ── Phase 4: Invariants ───────────────────────────────────

fn check_invariants(
    logic: &LogicRegistry,
    parent: Option<&AccountRegistry>,
    registry: &AccountRegistry,
    result: &mut VerificationResult,
) {
    for account in registry {
        match logic.get(account.code()) {
            Some(variant) => {
                if let Err(e) = variant.validate_state(account.variable()) {
                    result.add_error(
                        DiagnosticKind::Invariant,
                        format!("contract '{}': {}", account.address(), e),
                    );
                }
                let previous = parent.and_then(|p| p.find_by_address(account.address()));
                if let Some(previous) = previous {
                    if let Err(e) = variant.check_transition(previous.variable(), account.variable()) {
                        result.add_error(
                            DiagnosticKind::Invariant,
                            format!("contract '{}': {}", account.address(), e),
                        );
                    }
                }
            }
            None => result.add_warning(
                DiagnosticKind::Invariant,
                format!(
                    "contract '{}' uses code '{}' with no registered logic; state not checked",
                    account.address(),
                    account.code()
                ),
            ),
        }
    }

    let Some(parent) = parent else {
        return;
    };
    for previous in parent {
        match registry.find_by_address(previous.address()) {
            None => result.add_error(
                DiagnosticKind::Invariant,
                format!("contract '{}' missing from block registry", previous.address()),
            ),
            Some(current) if !current.same_identity(previous) => result.add_error(
                DiagnosticKind::Invariant,
                format!("contract '{}' changed identity", previous.address()),
            ),
            Some(_) => {}
        }
    }
}

// ── Tests ─────────────────────────────────────────────────
