//! Call transactions and the pending transaction pool
//!
//! Sender authentication happens upstream: by the time a transaction reaches
//! this crate its `from_address` is trusted and `signature` is carried as an
//! opaque value for the block record.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contract::VotePayload;
use crate::normalizer;
use crate::{Error, Result};

/// A ledger transaction invoking the contract at `contract_address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub from_address: String,
    pub contract_address: String,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Transaction {
    /// Build a call transaction and derive its id.
    pub fn call(
        from_address: impl Into<String>,
        contract_address: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<Self> {
        let mut tx = Transaction {
            id: String::new(),
            from_address: from_address.into(),
            contract_address: contract_address.into(),
            data,
            signature: None,
        };
        tx.id = tx.compute_id();
        tx.validate()?;
        Ok(tx)
    }

    /// Build a vote call for `candidate_name`.
    pub fn vote(
        from_address: impl Into<String>,
        contract_address: impl Into<String>,
        candidate_name: impl Into<String>,
    ) -> Result<Self> {
        let payload = VotePayload::new(candidate_name);
        Self::call(from_address, contract_address, payload.to_json())
    }

    /// Attach an upstream-produced signature. The id does not cover it.
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// SHA-256 over the canonical encoding of sender, target and payload.
    pub fn compute_id(&self) -> String {
        let body = serde_json::json!({
            "fromAddress": self.from_address,
            "contractAddress": self.contract_address,
            "data": self.data,
        });
        normalizer::sha256_hex(normalizer::canonical_json(&body).as_bytes())
    }

    /// Structural checks: non-empty addresses, object payload, matching id.
    pub fn validate(&self) -> Result<()> {
        if self.from_address.is_empty() {
            return Err(Error::Validation("fromAddress must not be empty".into()));
        }
        if self.contract_address.is_empty() {
            return Err(Error::Validation("contractAddress must not be empty".into()));
        }
        if !self.data.is_object() {
            return Err(Error::Validation("call data must be a JSON object".into()));
        }
        let expected = self.compute_id();
        if self.id != expected {
            return Err(Error::Validation(format!(
                "transaction id '{}' does not match its content (expected '{}')",
                self.id, expected
            )));
        }
        Ok(())
    }
}

/// Pending call transactions in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPool {
    transactions: Vec<Transaction>,
}

impl TransactionPool {
    pub fn new() -> Self {
        TransactionPool {
            transactions: Vec::new(),
        }
    }

    /// Queue a transaction after structural validation. Re-submitting an id
    /// already pending fails with `DuplicateTransaction`.
    pub fn add(&mut self, tx: Transaction) -> Result<()> {
        tx.validate()?;
        if self.contains(&tx.id) {
            return Err(Error::DuplicateTransaction(tx.id));
        }
        debug!(id = %tx.id, contract = %tx.contract_address, "transaction queued");
        self.transactions.push(tx);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.transactions.iter().any(|tx| tx.id == id)
    }

    /// The first `limit` pending transactions, in arrival order.
    pub fn peek(&self, limit: usize) -> &[Transaction] {
        &self.transactions[..limit.min(self.transactions.len())]
    }

    /// Drop every transaction whose id is in `ids`.
    pub fn remove_ids(&mut self, ids: &BTreeSet<String>) {
        self.transactions.retain(|tx| !ids.contains(&tx.id));
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_transaction_shape() {
        let tx = Transaction::vote("addrA", "c0ffee", "Tuan").unwrap();
        assert_eq!(tx.data, serde_json::json!({"candidateName": "Tuan"}));
        assert_eq!(tx.id.len(), 64);
        assert!(tx.signature.is_none());
    }

    #[test]
    fn test_id_is_deterministic_and_content_bound() {
        let a = Transaction::vote("addrA", "c0ffee", "Tuan").unwrap();
        let b = Transaction::vote("addrA", "c0ffee", "Tuan").unwrap();
        let c = Transaction::vote("addrB", "c0ffee", "Tuan").unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_signature_not_covered_by_id() {
        let tx = Transaction::vote("addrA", "c0ffee", "Tuan").unwrap();
        let signed = tx.clone().with_signature("sig");
        assert_eq!(tx.id, signed.id);
        assert!(signed.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_tampered_id() {
        let mut tx = Transaction::vote("addrA", "c0ffee", "Tuan").unwrap();
        tx.data = serde_json::json!({"candidateName": "Dung"});
        assert!(matches!(tx.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_call_rejects_empty_addresses() {
        assert!(Transaction::vote("", "c0ffee", "Tuan").is_err());
        assert!(Transaction::vote("addrA", "", "Tuan").is_err());
    }

    #[test]
    fn test_call_rejects_non_object_data() {
        let result = Transaction::call("addrA", "c0ffee", serde_json::json!("Tuan"));
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_wire_roundtrip() {
        let tx = Transaction::vote("addrA", "c0ffee", "Tuan")
            .unwrap()
            .with_signature("sig");
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["fromAddress"], "addrA");
        assert_eq!(json["contractAddress"], "c0ffee");
        let back: Transaction = serde_json::from_value(json).unwrap();
        assert_eq!(tx, back);
    }

    #[test]
    fn test_pool_rejects_duplicate_id() {
        let mut pool = TransactionPool::new();
        let tx = Transaction::vote("addrA", "c0ffee", "Tuan").unwrap();
        pool.add(tx.clone()).unwrap();
        assert_eq!(
            pool.add(tx.clone()),
            Err(Error::DuplicateTransaction(tx.id.clone()))
        );
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_pool_preserves_order_and_removes() {
        let mut pool = TransactionPool::new();
        let txs: Vec<Transaction> = ["a", "b", "c"]
            .iter()
            .map(|from| Transaction::vote(*from, "c0ffee", "Tuan").unwrap())
            .collect();
        for tx in &txs {
            pool.add(tx.clone()).unwrap();
        }
        assert_eq!(pool.peek(2), &txs[..2]);
        assert_eq!(pool.peek(10).len(), 3);

        let ids: BTreeSet<String> = [txs[1].id.clone()].into_iter().collect();
        pool.remove_ids(&ids);
        let remaining: Vec<&str> = pool.transactions().iter().map(|t| t.from_address.as_str()).collect();
        assert_eq!(remaining, vec!["a", "c"]);
    }
}
