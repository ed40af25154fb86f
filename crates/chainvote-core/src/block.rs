//! Blocks and the per-block contract-state index
//!
//! Every block carries a full registry snapshot: each deployed contract's
//! account as of that block. Contracts the block's transactions did not touch
//! are carried forward from the parent when the block is built, so a lookup
//! never has to walk back through ancestors.

use serde::{Deserialize, Serialize};

use crate::account::ContractAccount;
use crate::normalizer::{self, ZERO_HASH};
use crate::registry::AccountRegistry;
use crate::transaction::Transaction;
use crate::{Error, Result};

/// One block of the ledger as seen by contract execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "BlockWire")]
pub struct Block {
    index: u64,
    previous_hash: String,
    hash: String,
    transactions: Vec<Transaction>,
    contract_accounts: AccountRegistry,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockWire {
    index: u64,
    previous_hash: String,
    hash: String,
    #[serde(default)]
    transactions: Vec<Transaction>,
    #[serde(default)]
    contract_accounts: Vec<serde_json::Value>,
}

impl TryFrom<BlockWire> for Block {
    type Error = String;

    fn try_from(wire: BlockWire) -> std::result::Result<Self, Self::Error> {
        let contract_accounts =
            AccountRegistry::decode(&wire.contract_accounts).map_err(|e| e.to_string())?;
        Ok(Block {
            index: wire.index,
            previous_hash: wire.previous_hash,
            hash: wire.hash,
            transactions: wire.transactions,
            contract_accounts,
        })
    }
}

impl Block {
    /// Block 0: no transactions, the deployed contracts as its registry.
    pub fn genesis(registry: AccountRegistry) -> Block {
        Block::new(0, ZERO_HASH.to_string(), Vec::new(), registry)
    }

    /// Assemble a block and seal it with its hash.
    pub fn new(
        index: u64,
        previous_hash: String,
        transactions: Vec<Transaction>,
        contract_accounts: AccountRegistry,
    ) -> Block {
        let mut block = Block {
            index,
            previous_hash,
            hash: String::new(),
            transactions,
            contract_accounts,
        };
        block.hash = block.compute_hash();
        block
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn contract_accounts(&self) -> &AccountRegistry {
        &self.contract_accounts
    }

    /// SHA-256 over index, parent hash, transaction ids and registry hash.
    pub fn compute_hash(&self) -> String {
        let ids: Vec<&str> = self.transactions.iter().map(|tx| tx.id.as_str()).collect();
        let header = serde_json::json!({
            "index": self.index,
            "previousHash": self.previous_hash,
            "transactionIds": ids,
            "stateHash": self.contract_accounts.state_hash(),
        });
        normalizer::sha256_hex(normalizer::canonical_json(&header).as_bytes())
    }

    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// State of the contract at `address` as of this block.
    ///
    /// Only this block's own registry is consulted.
    pub fn contract_state(&self, address: &str) -> Result<&ContractAccount> {
        self.contract_accounts
            .find_by_address(address)
            .ok_or_else(|| Error::ContractNotFound {
                address: address.to_string(),
            })
    }

    /// Decode a received block. A malformed contract account anywhere in
    /// `contractAccounts` fails the whole block with `Decode`.
    pub fn decode(wire: &serde_json::Value) -> Result<Block> {
        serde_json::from_value(wire.clone())
            .map_err(|e| Error::Decode(format!("invalid block: {}", e)))
    }

    pub fn encode(&self) -> serde_json::Value {
        serde_json::json!({
            "index": self.index,
            "previousHash": self.previous_hash,
            "hash": self.hash,
            "transactions": self.transactions,
            "contractAccounts": self.contract_accounts.encode(),
        })
    }
}
