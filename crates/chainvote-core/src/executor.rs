//! Execution pipeline — applies a block's call transactions deterministically
//!
//! One pipeline runs per block under assembly or validation. It starts from
//! the parent block's registry, walks the transactions in the order given,
//! and stages each successful call into a working registry that becomes the
//! new block's snapshot on commit.
//!
//! # Stages
//!
//! `Idle → Executing → Committed`. Committing consumes the pipeline, so a
//! committed registry can never be touched again.
//!
//! # Failure policy
//!
//! Every per-transaction failure (unknown address, unknown code, malformed
//! payload, duplicate voter, unknown candidate) is caught here. The call is
//! recorded as rejected on its receipt, leaves the working registry as it
//! was, and the next transaction runs normally.
//!
//! # Determinism
//!
//! The pipeline is a pure function of (parent registry, ordered transactions,
//! logic table). It holds no process-wide state, reads no clock and does no
//! I/O, so mining and later validation on another node reach the same
//! registry byte-for-byte.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::account::ContractAccount;
use crate::contract::LogicRegistry;
use crate::registry::AccountRegistry;
use crate::transaction::Transaction;
use crate::{Error, Result};

// ── Receipts ──────────────────────────────────────────────

/// What happened to one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallReceipt {
    /// Position in the input list (0-indexed)
    pub sequence: u64,
    pub transaction_id: String,
    pub from_address: String,
    pub contract_address: String,
    /// `None` if the call was applied
    pub error: Option<Error>,
}

impl CallReceipt {
    pub fn applied(&self) -> bool {
        self.error.is_none()
    }

    /// Reporting view of the receipt.
    pub fn to_json(&self) -> serde_json::Value {
        let mut json = serde_json::json!({
            "sequence": self.sequence,
            "transactionId": self.transaction_id,
            "fromAddress": self.from_address,
            "contractAddress": self.contract_address,
            "applied": self.applied(),
        });
        if let Some(error) = &self.error {
            json["error"] = serde_json::json!({
                "kind": error.kind(),
                "message": error.to_string(),
            });
        }
        json
    }
}

/// Pipeline lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Executing,
    Committed,
}

/// Output of a committed pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockExecution {
    /// Registry to attach to the new block
    pub registry: AccountRegistry,
    /// One receipt per input transaction, in input order
    pub receipts: Vec<CallReceipt>,
}

impl BlockExecution {
    /// Ids of the transactions that were applied.
    pub fn applied_ids(&self) -> BTreeSet<String> {
        self.receipts
            .iter()
            .filter(|r| r.applied())
            .map(|r| r.transaction_id.clone())
            .collect()
    }

    /// Receipts of the transactions that were dropped.
    pub fn rejected(&self) -> impl Iterator<Item = &CallReceipt> {
        self.receipts.iter().filter(|r| !r.applied())
    }

    pub fn all_applied(&self) -> bool {
        self.receipts.iter().all(CallReceipt::applied)
    }

    /// The subset of `transactions` to persist in the block, in input order.
    /// `transactions` must be the list the pipeline ran over.
    pub fn included(&self, transactions: &[Transaction]) -> Vec<Transaction> {
        transactions
            .iter()
            .zip(&self.receipts)
            .filter(|(_, receipt)| receipt.applied())
            .map(|(tx, _)| tx.clone())
            .collect()
    }
}

// ── Pipeline ──────────────────────────────────────────────

/// Sequential executor for one block's call transactions.
#[derive(Debug)]
pub struct ExecutionPipeline<'a> {
    logic: &'a LogicRegistry,
    working: AccountRegistry,
    receipts: Vec<CallReceipt>,
    stage: PipelineStage,
}

impl<'a> ExecutionPipeline<'a> {
    /// Start from the parent block's registry. The parent is copied, never
    /// borrowed mutably.
    pub fn new(logic: &'a LogicRegistry, parent: &AccountRegistry) -> Self {
        ExecutionPipeline {
            logic,
            working: parent.clone(),
            receipts: Vec::new(),
            stage: PipelineStage::Idle,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Registry with every call applied so far.
    pub fn working(&self) -> &AccountRegistry {
        &self.working
    }

    /// Run one transaction against the working registry and record its
    /// receipt. Later transactions observe the effect of earlier ones.
    pub fn execute(&mut self, tx: &Transaction) -> &CallReceipt {
        self.stage = PipelineStage::Executing;
        let sequence = self.receipts.len() as u64;

        let error = match self.apply_call(tx) {
            Ok(updated) => {
                debug!(sequence, id = %tx.id, contract = %tx.contract_address, "call applied");
                self.working = self.working.with_updated(updated);
                None
            }
            Err(e) => {
                warn!(
                    sequence,
                    id = %tx.id,
                    contract = %tx.contract_address,
                    kind = e.kind(),
                    "call dropped: {}",
                    e
                );
                Some(e)
            }
        };

        self.receipts.push(CallReceipt {
            sequence,
            transaction_id: tx.id.clone(),
            from_address: tx.from_address.clone(),
            contract_address: tx.contract_address.clone(),
            error,
        });
        &self.receipts[self.receipts.len() - 1]
    }

    /// Resolve → dispatch → apply. Returns the replacement account.
    fn apply_call(&self, tx: &Transaction) -> Result<ContractAccount> {
        tx.validate()?;

        let account = self
            .working
            .find_by_address(&tx.contract_address)
            .ok_or_else(|| Error::ContractNotFound {
                address: tx.contract_address.clone(),
            })?;

        let logic = self
            .logic
            .get(account.code())
            .ok_or_else(|| Error::UnknownCode {
                address: account.address().to_string(),
                code: account.code().to_string(),
            })?;

        let variable = logic.apply(account.variable(), &tx.from_address, &tx.data)?;
        Ok(account.with_variable(variable))
    }

    /// Freeze the working registry as the block's snapshot.
    pub fn commit(mut self) -> BlockExecution {
        self.stage = PipelineStage::Committed;
        debug!(
            calls = self.receipts.len(),
            applied = self.receipts.iter().filter(|r| r.applied()).count(),
            "pipeline committed"
        );
        BlockExecution {
            registry: self.working,
            receipts: self.receipts,
        }
    }
}

/// Run every transaction in order from `parent` and commit.
pub fn execute_block(
    logic: &LogicRegistry,
    parent: &AccountRegistry,
    transactions: &[Transaction],
) -> BlockExecution {
    let mut pipeline = ExecutionPipeline::new(logic, parent);
    for tx in transactions {
        pipeline.execute(tx);
    }
    pipeline.commit()
}

// ── Tests ─────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::VotingState;

    fn election(address: &str) -> ContractAccount {
        let state = VotingState::new(["Dung", "Tuan", "Thanh", "Cuong"]).unwrap();
        ContractAccount::new(
            format!("id-{}", address),
            address,
            "election",
            "voting",
            serde_json::to_value(state).unwrap(),
        )
        .unwrap()
    }

    fn parent() -> AccountRegistry {
        AccountRegistry::from_accounts(vec![election("c1"), election("c2")]).unwrap()
    }

    fn votes(registry: &AccountRegistry, address: &str) -> Vec<u64> {
        let state: VotingState =
            serde_json::from_value(registry.find_by_address(address).unwrap().variable().clone())
                .unwrap();
        state.candidates.iter().map(|c| c.vote_count).collect()
    }

    fn vote(from: &str, contract: &str, candidate: &str) -> Transaction {
        Transaction::vote(from, contract, candidate).unwrap()
    }

    #[test]
    fn test_pipeline_stages() {
        let logic = LogicRegistry::builtin();
        let parent = parent();
        let mut pipeline = ExecutionPipeline::new(&logic, &parent);
        assert_eq!(pipeline.stage(), PipelineStage::Idle);
        pipeline.execute(&vote("addrA", "c1", "Tuan"));
        assert_eq!(pipeline.stage(), PipelineStage::Executing);
        let result = pipeline.commit();
        assert_eq!(result.receipts.len(), 1);
    }

    #[test]
    fn test_applies_in_order_and_sees_prior_effects() {
        let logic = LogicRegistry::builtin();
        let txs = vec![
            vote("addrA", "c1", "Tuan"),
            vote("addrB", "c1", "Tuan"),
            vote("addrA", "c1", "Dung"),
        ];
        let result = execute_block(&logic, &parent(), &txs);

        assert_eq!(votes(&result.registry, "c1"), vec![0, 2, 0, 0]);
        assert!(result.receipts[0].applied());
        assert!(result.receipts[1].applied());
        assert!(matches!(
            result.receipts[2].error,
            Some(Error::DuplicateVoter { .. })
        ));
    }

    #[test]
    fn test_parent_registry_untouched() {
        let logic = LogicRegistry::builtin();
        let parent = parent();
        let before = parent.state_hash();
        let result = execute_block(&logic, &parent, &[vote("addrA", "c1", "Thanh")]);
        assert_eq!(parent.state_hash(), before);
        assert_ne!(result.registry.state_hash(), before);
    }

    #[test]
    fn test_unknown_contract_dropped_and_pipeline_continues() {
        let logic = LogicRegistry::builtin();
        let txs = vec![vote("addrA", "nowhere", "Tuan"), vote("addrB", "c1", "Cuong")];
        let result = execute_block(&logic, &parent(), &txs);

        assert!(matches!(
            result.receipts[0].error,
            Some(Error::ContractNotFound { .. })
        ));
        assert!(result.receipts[1].applied());
        assert_eq!(votes(&result.registry, "c1"), vec![0, 0, 0, 1]);
    }

    #[test]
    fn test_unknown_code_dropped() {
        let logic = LogicRegistry::builtin();
        let lottery = ContractAccount::new("id-l", "l1", "lottery", "lottery", serde_json::json!({}))
            .unwrap();
        let parent = parent().with_updated(lottery);
        let result = execute_block(&logic, &parent, &[vote("addrA", "l1", "Tuan")]);
        let error = result.receipts[0].error.as_ref().unwrap();
        assert!(error.is_contract_not_found());
        assert_eq!(result.registry, parent);
    }

    #[test]
    fn test_unknown_candidate_leaves_registry_identical() {
        let logic = LogicRegistry::builtin();
        let parent = parent();
        let result = execute_block(&logic, &parent, &[vote("addrA", "c1", "Zorro")]);
        assert!(matches!(
            result.receipts[0].error,
            Some(Error::UnknownCandidate { .. })
        ));
        assert_eq!(result.registry.state_hash(), parent.state_hash());
    }

    #[test]
    fn test_malformed_payload_is_validation_error() {
        let logic = LogicRegistry::builtin();
        let tx = Transaction::call("addrA", "c1", serde_json::json!({"pick": "Tuan"})).unwrap();
        let result = execute_block(&logic, &parent(), &[tx]);
        assert!(matches!(result.receipts[0].error, Some(Error::Validation(_))));
    }

    #[test]
    fn test_tampered_transaction_is_dropped() {
        let logic = LogicRegistry::builtin();
        let mut tx = vote("addrA", "c1", "Tuan");
        tx.from_address = "addrZ".into();
        let result = execute_block(&logic, &parent(), &[tx]);
        assert!(matches!(result.receipts[0].error, Some(Error::Validation(_))));
    }

    #[test]
    fn test_contracts_are_independent() {
        let logic = LogicRegistry::builtin();
        let txs = vec![vote("addrA", "c1", "Tuan"), vote("addrA", "c2", "Dung")];
        let result = execute_block(&logic, &parent(), &txs);
        assert!(result.all_applied());
        assert_eq!(votes(&result.registry, "c1"), vec![0, 1, 0, 0]);
        assert_eq!(votes(&result.registry, "c2"), vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_included_filters_rejected() {
        let logic = LogicRegistry::builtin();
        let txs = vec![
            vote("addrA", "c1", "Tuan"),
            vote("addrA", "c1", "Tuan"),
            vote("addrB", "c1", "Zorro"),
            vote("addrC", "c1", "Dung"),
        ];
        let result = execute_block(&logic, &parent(), &txs);
        let included = result.included(&txs);
        assert_eq!(included, vec![txs[0].clone(), txs[3].clone()]);
        assert_eq!(result.applied_ids().len(), 2);
        assert_eq!(result.rejected().count(), 2);
    }

    #[test]
    fn test_receipt_json() {
        let logic = LogicRegistry::builtin();
        let result = execute_block(&logic, &parent(), &[vote("addrA", "c1", "Zorro")]);
        let json = result.receipts[0].to_json();
        assert_eq!(json["applied"], false);
        assert_eq!(json["error"]["kind"], "unknown_candidate");
    }

    #[test]
    fn test_determinism_100_iterations() {
        let logic = LogicRegistry::builtin();
        let parent = parent();
        let txs: Vec<Transaction> = (0..20)
            .map(|i| {
                let candidate = ["Dung", "Tuan", "Zorro", "Cuong"][i % 4];
                vote(&format!("addr{}", i % 7), if i % 3 == 0 { "c2" } else { "c1" }, candidate)
            })
            .collect();
        let first = execute_block(&logic, &parent, &txs);
        for i in 0..100 {
            let again = execute_block(&logic, &parent, &txs);
            assert_eq!(first, again, "Non-determinism at iteration {}", i);
            assert_eq!(first.registry.state_hash(), again.registry.state_hash());
        }
    }

    #[test]
    fn test_replay_from_committed_matches() {
        // Mining then validation on a second node
        let logic = LogicRegistry::builtin();
        let parent = parent();
        let txs = vec![vote("addrA", "c1", "Tuan"), vote("addrB", "c1", "Zorro")];
        let mined = execute_block(&logic, &parent, &txs);
        let included = mined.included(&txs);
        let validated = execute_block(&LogicRegistry::builtin(), &parent, &included);
        assert!(validated.all_applied());
        assert_eq!(mined.registry, validated.registry);
    }
}
