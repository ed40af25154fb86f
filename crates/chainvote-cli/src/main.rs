use chainvote_core::config::DEFAULT_CONTRACT_NAME;
use chainvote_core::{ChainConfig, Error, Ledger, LedgerSnapshot};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// chainvote — deterministic voting contracts on a block ledger
///
/// Create a chain, queue votes, assemble blocks and query contract state.
/// The chain file is a JSON ledger snapshot.
#[derive(Parser)]
#[command(name = "chainvote", version, about, long_about = None)]
struct Cli {
    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log progress to stderr (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default chain configuration
    Init {
        /// Output path (stdout if omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Create a chain from a configuration file
    Genesis {
        /// Path to configuration JSON
        config: PathBuf,
        /// Chain file to create
        #[arg(long)]
        out: PathBuf,
    },

    /// Queue a vote transaction
    Vote {
        /// Path to chain file
        chain: PathBuf,
        /// Sender address
        #[arg(long)]
        from: String,
        /// Candidate name (case-insensitive)
        #[arg(long)]
        candidate: String,
        /// Deployed contract name
        #[arg(long, default_value = DEFAULT_CONTRACT_NAME)]
        contract: String,
    },

    /// Assemble the next block from pending transactions
    Mine {
        /// Path to chain file
        chain: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a contract's state
    State {
        /// Path to chain file
        chain: PathBuf,
        /// Contract address
        address: String,
        /// Block index (latest if omitted)
        #[arg(long)]
        block: Option<u64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the current vote counts of a voting contract
    Tally {
        /// Path to chain file
        chain: PathBuf,
        /// Deployed contract name
        #[arg(long, default_value = DEFAULT_CONTRACT_NAME)]
        contract: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-validate every block from genesis
    Verify {
        /// Path to chain file
        chain: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List transactions waiting for a block
    Pending {
        /// Path to chain file
        chain: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a committed block by its hash
    Block {
        /// Path to chain file
        chain: PathBuf,
        /// Block hash
        hash: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the state hash of the latest block
    Hash {
        /// Path to chain file
        chain: PathBuf,
    },

    /// Show version information
    Version,
}

/// Why a command failed. Rejections exit 1, everything else exits 2.
enum Failure {
    Rejected(String),
    Fatal(String),
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        match err {
            Error::DuplicateTransaction(_)
            | Error::BlockNotFound(_)
            | Error::BlockRejected(_) => Failure::Rejected(err.to_string()),
            e if e.is_per_transaction() => Failure::Rejected(e.to_string()),
            e => Failure::Fatal(e.to_string()),
        }
    }
}

type CmdResult = std::result::Result<(), Failure>;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let quiet = cli.quiet;

    let result = match cli.command {
        Commands::Init { out } => cmd_init(out.as_deref(), quiet),
        Commands::Genesis { config, out } => cmd_genesis(&config, &out, quiet),
        Commands::Vote {
            chain,
            from,
            candidate,
            contract,
        } => cmd_vote(&chain, &contract, &from, &candidate, quiet),
        Commands::Mine { chain, json } => cmd_mine(&chain, json, quiet),
        Commands::State {
            chain,
            address,
            block,
            json,
        } => cmd_state(&chain, &address, block, json, quiet),
        Commands::Tally {
            chain,
            contract,
            json,
        } => cmd_tally(&chain, &contract, json, quiet),
        Commands::Verify { chain, json } => cmd_verify(&chain, json, quiet),
        Commands::Pending { chain, json } => cmd_pending(&chain, json, quiet),
        Commands::Block { chain, hash, json } => cmd_block(&chain, &hash, json, quiet),
        Commands::Hash { chain } => cmd_hash(&chain, quiet),
        Commands::Version => {
            println!(
                "chainvote {} (chainvote-core {})",
                env!("CARGO_PKG_VERSION"),
                env!("CARGO_PKG_VERSION")
            );
            Ok(())
        }
    };

    let exit_code = match result {
        Ok(()) => 0,
        Err(Failure::Rejected(message)) => {
            eprintln!("{} {}", "error:".red().bold(), message);
            1
        }
        Err(Failure::Fatal(message)) => {
            eprintln!("{} {}", "error:".red().bold(), message);
            2
        }
    };
    process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ── Chain file ────────────────────────────────────────────

fn read_file(path: &Path) -> std::result::Result<String, Failure> {
    std::fs::read_to_string(path)
        .map_err(|e| Failure::Fatal(format!("cannot read {}: {}", path.display(), e)))
}

fn write_file(path: &Path, contents: &str) -> CmdResult {
    std::fs::write(path, contents)
        .map_err(|e| Failure::Fatal(format!("cannot write {}: {}", path.display(), e)))
}

fn load_ledger(path: &Path) -> std::result::Result<Ledger, Failure> {
    let text = read_file(path)?;
    let ledger = Ledger::from_json(&text)?;
    debug!(
        path = %path.display(),
        height = ledger.blocks().len(),
        pending = ledger.pool().len(),
        "chain loaded"
    );
    Ok(ledger)
}

fn save_ledger(path: &Path, ledger: &Ledger) -> CmdResult {
    let text = ledger.to_json()?;
    write_file(path, &text)?;
    info!(
        path = %path.display(),
        height = ledger.blocks().len(),
        pending = ledger.pool().len(),
        "chain saved"
    );
    Ok(())
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("{} {}", "error:".red().bold(), e),
    }
}

// ── Commands ──────────────────────────────────────────────

fn cmd_init(out: Option<&Path>, quiet: bool) -> CmdResult {
    let text = ChainConfig::default().to_json()?;
    match out {
        Some(path) => {
            write_file(path, &text)?;
            if !quiet {
                println!("{} wrote {}", "✓".green(), path.display());
            }
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn cmd_genesis(config: &Path, out: &Path, quiet: bool) -> CmdResult {
    let config = ChainConfig::load(config)?;
    let ledger = Ledger::from_config(config)?;
    save_ledger(out, &ledger)?;
    if !quiet {
        println!("{} genesis {}", "✓".green(), ledger.latest().hash());
        for (name, address) in ledger.directory().iter() {
            println!("  {} {}", name.bold(), address);
        }
    }
    Ok(())
}

fn cmd_vote(chain: &Path, contract: &str, from: &str, candidate: &str, quiet: bool) -> CmdResult {
    let mut ledger = load_ledger(chain)?;
    let tx = ledger.submit_vote(contract, from, candidate)?;
    save_ledger(chain, &ledger)?;
    if !quiet {
        println!("{} queued {}", "✓".green(), tx.id);
    }
    Ok(())
}

fn cmd_mine(chain: &Path, json: bool, quiet: bool) -> CmdResult {
    let mut ledger = load_ledger(chain)?;
    let mined = ledger.mine_block();
    save_ledger(chain, &ledger)?;
    if quiet {
        return Ok(());
    }

    if json {
        let receipts: Vec<serde_json::Value> =
            mined.receipts.iter().map(|r| r.to_json()).collect();
        print_json(&serde_json::json!({
            "index": mined.block.index(),
            "hash": mined.block.hash(),
            "included": mined.block.transactions().len(),
            "receipts": receipts,
        }));
        return Ok(());
    }

    println!(
        "{} block {} {}",
        "✓".green(),
        mined.block.index(),
        mined.block.hash()
    );
    for receipt in &mined.receipts {
        match &receipt.error {
            None => println!("  {} {}", "applied".green(), receipt.transaction_id),
            Some(err) => println!(
                "  {} {} ({})",
                "dropped".yellow(),
                receipt.transaction_id,
                err
            ),
        }
    }
    Ok(())
}

fn cmd_state(
    chain: &Path,
    address: &str,
    block: Option<u64>,
    json: bool,
    quiet: bool,
) -> CmdResult {
    let ledger = load_ledger(chain)?;
    let account = ledger.contract_state(address, block)?;
    if quiet {
        return Ok(());
    }
    if json {
        print_json(&account.encode());
    } else {
        println!("{} {}", account.name().bold(), account.address());
        println!("  code: {}", account.code());
        println!("  id:   {}", account.id());
        print_json(account.variable());
    }
    Ok(())
}

fn cmd_tally(chain: &Path, contract: &str, json: bool, quiet: bool) -> CmdResult {
    let ledger = load_ledger(chain)?;
    let candidates = ledger.candidate_tally(contract)?;
    if quiet {
        return Ok(());
    }
    if json {
        let value = serde_json::to_value(&candidates).map_err(Error::from)?;
        print_json(&value);
    } else {
        for candidate in &candidates {
            println!("{:<20} {}", candidate.name, candidate.vote_count);
        }
    }
    Ok(())
}

fn cmd_verify(chain: &Path, json: bool, quiet: bool) -> CmdResult {
    let text = read_file(chain)?;
    let snapshot: LedgerSnapshot = serde_json::from_str(&text).map_err(Error::from)?;
    let blocks = snapshot.blocks.len();
    let outcome = Ledger::from_snapshot(snapshot).and_then(|ledger| ledger.verify_chain());

    let error = match outcome {
        Ok(()) => None,
        Err(Error::BlockRejected(message)) => Some(message),
        Err(e) => return Err(e.into()),
    };

    if json {
        print_json(&serde_json::json!({
            "verified": error.is_none(),
            "blocks": blocks,
            "error": error,
        }));
    } else if !quiet && error.is_none() {
        println!("{} {} blocks verified", "✓".green(), blocks);
    }

    match error {
        None => Ok(()),
        Some(message) => Err(Failure::Rejected(message)),
    }
}

fn cmd_pending(chain: &Path, json: bool, quiet: bool) -> CmdResult {
    let ledger = load_ledger(chain)?;
    if quiet {
        return Ok(());
    }
    if json {
        let value = serde_json::to_value(ledger.pending()).map_err(Error::from)?;
        print_json(&value);
        return Ok(());
    }
    if ledger.pending().is_empty() {
        println!("no pending transactions");
    }
    for tx in ledger.pending() {
        println!("{} {} → {}", tx.id, tx.from_address, tx.contract_address);
    }
    Ok(())
}

fn cmd_block(chain: &Path, hash: &str, json: bool, quiet: bool) -> CmdResult {
    let ledger = load_ledger(chain)?;
    let block = ledger
        .block_by_hash(hash)
        .ok_or_else(|| Failure::Rejected(format!("no block with hash '{}'", hash)))?;
    if quiet {
        return Ok(());
    }
    if json {
        print_json(&block.encode());
    } else {
        println!("{} {}", format!("block {}", block.index()).bold(), block.hash());
        println!("  previous: {}", block.previous_hash());
        println!("  transactions: {}", block.transactions().len());
        println!("  state hash: {}", block.contract_accounts().state_hash());
    }
    Ok(())
}

fn cmd_hash(chain: &Path, quiet: bool) -> CmdResult {
    let ledger = load_ledger(chain)?;
    if !quiet {
        println!("{}", ledger.latest().contract_accounts().state_hash());
    }
    Ok(())
}
