//! In-memory ledger — genesis, submission, block assembly and acceptance
//!
//! The ledger owns the committed blocks, the pending transaction pool and
//! the contract directory. It is the seam the outer layers (CLI, HTTP
//! handlers, peer sync) talk to:
//!
//! - `submit` / `submit_vote` queue call transactions
//! - `mine_block` assembles the next block from the pool
//! - `accept_block` validates and appends a block built elsewhere
//! - `contract_state` / `candidate_tally` answer read queries

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::account::ContractAccount;
use crate::block::Block;
use crate::config::ChainConfig;
use crate::contract::{Candidate, LogicRegistry, VotingState, VOTING_CODE};
use crate::deploy::{self, ContractDirectory};
use crate::executor::{self, CallReceipt};
use crate::registry::AccountRegistry;
use crate::transaction::{Transaction, TransactionPool};
use crate::verifier;
use crate::{Error, Result};

/// A freshly assembled block and the fate of every transaction considered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinedBlock {
    pub block: Block,
    pub receipts: Vec<CallReceipt>,
}

/// Persisted form of a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub config: ChainConfig,
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub pending: Vec<Transaction>,
}

#[derive(Debug)]
pub struct Ledger {
    config: ChainConfig,
    logic: LogicRegistry,
    blocks: Vec<Block>,
    pool: TransactionPool,
    directory: ContractDirectory,
}

/// Deploy every configured contract into an empty registry.
pub fn build_genesis(config: &ChainConfig, logic: &LogicRegistry) -> Result<Block> {
    config.validate()?;
    let mut registry = AccountRegistry::new();
    for deployment in &config.deployments {
        let request = deployment.to_request()?;
        let (next, _) = deploy::deploy(logic, &registry, &request)?;
        registry = next;
    }
    Ok(Block::genesis(registry))
}

impl Ledger {
    /// New chain with the built-in contract variants.
    pub fn from_config(config: ChainConfig) -> Result<Self> {
        Self::with_logic(config, LogicRegistry::builtin())
    }

    pub fn with_logic(config: ChainConfig, logic: LogicRegistry) -> Result<Self> {
        let genesis = build_genesis(&config, &logic)?;
        let directory = ContractDirectory::from_registry(genesis.contract_accounts());
        info!(
            contracts = directory.len(),
            hash = %genesis.hash(),
            "genesis block created"
        );
        Ok(Ledger {
            config,
            logic,
            blocks: vec![genesis],
            pool: TransactionPool::new(),
            directory,
        })
    }

    /// Restore a ledger, re-validating every block from genesis.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self> {
        let mut ledger = Self::from_config(snapshot.config)?;
        let mut blocks = snapshot.blocks.into_iter();
        match blocks.next() {
            Some(genesis) if genesis == ledger.blocks[0] => {}
            Some(_) => {
                return Err(Error::BlockRejected(
                    "genesis block does not match configuration".into(),
                ))
            }
            None => return Err(Error::Decode("snapshot contains no blocks".into())),
        }
        for block in blocks {
            ledger.accept_block(block)?;
        }
        for tx in snapshot.pending {
            ledger.submit(tx)?;
        }
        Ok(ledger)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            config: self.config.clone(),
            blocks: self.blocks.clone(),
            pending: self.pool.transactions().to_vec(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let snapshot: LedgerSnapshot = serde_json::from_str(text)?;
        Self::from_snapshot(snapshot)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| Error::Decode(format!("cannot encode ledger: {}", e)))
    }

    // ── Accessors ─────────────────────────────────────────

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn logic(&self) -> &LogicRegistry {
        &self.logic
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn latest(&self) -> &Block {
        // `blocks` always holds at least the genesis block
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn block(&self, index: u64) -> Result<&Block> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.blocks.get(i))
            .ok_or(Error::BlockNotFound(index))
    }

    /// Committed block whose hash is `hash`.
    pub fn block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.blocks.iter().find(|block| block.hash() == hash)
    }

    pub fn pool(&self) -> &TransactionPool {
        &self.pool
    }

    /// Transactions waiting for a block, in submission order.
    pub fn pending(&self) -> &[Transaction] {
        self.pool.transactions()
    }

    pub fn directory(&self) -> &ContractDirectory {
        &self.directory
    }

    /// Committed block holding transaction `id`, with the transaction.
    pub fn find_transaction(&self, id: &str) -> Option<(&Block, &Transaction)> {
        self.blocks.iter().find_map(|block| {
            block
                .transactions()
                .iter()
                .find(|tx| tx.id == id)
                .map(|tx| (block, tx))
        })
    }

    // ── Submission ────────────────────────────────────────

    /// Queue a call transaction. Rejects ids already pending or committed.
    pub fn submit(&mut self, tx: Transaction) -> Result<()> {
        if self.find_transaction(&tx.id).is_some() {
            return Err(Error::DuplicateTransaction(tx.id));
        }
        self.pool.add(tx)
    }

    /// Build and queue a vote from an already-authenticated `sender` on the
    /// contract deployed as `contract_name`.
    pub fn submit_vote(
        &mut self,
        contract_name: &str,
        sender: &str,
        candidate: &str,
    ) -> Result<Transaction> {
        let address = self.directory.resolve(contract_name)?.to_string();
        let tx = Transaction::vote(sender, address, candidate)?;
        self.submit(tx.clone())?;
        Ok(tx)
    }

    // ── Blocks ────────────────────────────────────────────

    /// Assemble the next block from the head of the pool.
    ///
    /// Up to `maxBlockTransactions` pending transactions run through the
    /// pipeline; only the applied ones are recorded in the block. Every
    /// transaction considered leaves the pool either way, and its receipt
    /// says why if it was dropped.
    pub fn mine_block(&mut self) -> MinedBlock {
        let candidates = self
            .pool
            .peek(self.config.limits.max_block_transactions)
            .to_vec();
        let parent = self.latest();
        let execution =
            executor::execute_block(&self.logic, parent.contract_accounts(), &candidates);
        let block = Block::new(
            parent.index() + 1,
            parent.hash().to_string(),
            execution.included(&candidates),
            execution.registry.clone(),
        );

        let considered: BTreeSet<String> = candidates.iter().map(|tx| tx.id.clone()).collect();
        self.pool.remove_ids(&considered);
        info!(
            index = block.index(),
            included = block.transactions().len(),
            dropped = execution.rejected().count(),
            hash = %block.hash(),
            "block assembled"
        );
        self.blocks.push(block.clone());

        MinedBlock {
            block,
            receipts: execution.receipts,
        }
    }

    /// Validate `block` against the current tip and append it.
    pub fn accept_block(&mut self, block: Block) -> Result<()> {
        for tx in block.transactions() {
            if self.find_transaction(&tx.id).is_some() {
                return Err(Error::BlockRejected(format!(
                    "transaction '{}' is already committed",
                    tx.id
                )));
            }
        }
        verifier::verify_block(&self.logic, self.latest(), &block).into_result()?;

        let included: BTreeSet<String> =
            block.transactions().iter().map(|tx| tx.id.clone()).collect();
        self.pool.remove_ids(&included);
        info!(index = block.index(), hash = %block.hash(), "block accepted");
        self.blocks.push(block);
        Ok(())
    }

    /// Decode a block received over the wire and accept it.
    pub fn accept_block_json(&mut self, wire: &serde_json::Value) -> Result<()> {
        let block = Block::decode(wire)?;
        self.accept_block(block)
    }

    /// Re-validate the whole chain from genesis.
    pub fn verify_chain(&self) -> Result<()> {
        let expected = build_genesis(&self.config, &self.logic)?;
        if self.blocks[0] != expected {
            return Err(Error::BlockRejected(
                "genesis block does not match configuration".into(),
            ));
        }
        verifier::verify_genesis(&self.logic, &self.blocks[0]).into_result()?;
        for pair in self.blocks.windows(2) {
            verifier::verify_block(&self.logic, &pair[0], &pair[1]).into_result()?;
        }
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────

    /// Contract state at `address` as of block `at`, or the latest block.
    pub fn contract_state(&self, address: &str, at: Option<u64>) -> Result<&ContractAccount> {
        let block = match at {
            Some(index) => self.block(index)?,
            None => self.latest(),
        };
        block.contract_state(address)
    }

    /// Same as [`Ledger::contract_state`], addressing the contract by its
    /// deployed name.
    pub fn contract_state_by_name(&self, name: &str, at: Option<u64>) -> Result<&ContractAccount> {
        let address = self.directory.resolve(name)?;
        self.contract_state(address, at)
    }

    /// Current candidate list of the voting contract deployed as `name`.
    pub fn candidate_tally(&self, name: &str) -> Result<Vec<Candidate>> {
        let account = self.contract_state_by_name(name, None)?;
        if account.code() != VOTING_CODE {
            return Err(Error::Validation(format!(
                "contract '{}' is not a voting contract (code '{}')",
                name,
                account.code()
            )));
        }
        let state: VotingState = serde_json::from_value(account.variable().clone())
            .map_err(|e| Error::Decode(format!("contract '{}' state: {}", name, e)))?;
        Ok(state.candidates)
    }
}
