use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crypto::FieldElement;
use ledger_node::config::LedgerConfig;
use ledger_node::driver::{self, FilterBatch, MintBatch, WithdrawBatch};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ledger-node", version, about = "Range ledger batch driver")]
struct Cli {
    #[command(flatten)]
    overrides: ConfigArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// JSON config file; flags below take precedence over it.
    #[arg(long, global = true, env = "LEDGER_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    ledger_depth: Option<usize>,
    #[arg(long, global = true)]
    queue_depth: Option<usize>,
    #[arg(long, global = true)]
    history_depth: Option<usize>,
    #[arg(long, global = true)]
    snapshot_depth: Option<usize>,
    #[arg(long, global = true)]
    filtered_depth: Option<usize>,
    /// Empty-leaf value as a decimal string.
    #[arg(long, global = true)]
    zero: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Move queued mint requests into the ledger and emit the mint chain.
    Mint {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Apply signed withdrawals and emit the withdraw chain.
    Withdraw {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Filter claims against a snapshot history and emit the filter chain.
    Filter {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replay a mint or withdraw chain and print its final state.
    Verify {
        #[arg(long)]
        input: PathBuf,
    },
    /// Derive a secp256k1 key pair and its ledger address from a seed.
    Keygen {
        #[arg(long)]
        seed: String,
    },
    /// Sign a withdrawal request for the range at `leaf_index`.
    Sign {
        #[arg(long)]
        secret_key: String,
        #[arg(long)]
        leaf_index: usize,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long, default_value = "0")]
        receiver: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let config = resolve_config(&cli.overrides)?;
    match cli.command {
        Commands::Mint { input, out } => {
            let batch: MintBatch = read_json(&input)?;
            let chain = driver::run_mint(&config, &batch).context("mint batch failed")?;
            emit(&chain, out.as_deref())
        }
        Commands::Withdraw { input, out } => {
            let batch: WithdrawBatch = read_json(&input)?;
            let chain = driver::run_withdraw(&config, &batch).context("withdraw batch failed")?;
            emit(&chain, out.as_deref())
        }
        Commands::Filter { input, out } => {
            let batch: FilterBatch = read_json(&input)?;
            let chain = driver::run_filter(&config, &batch).context("claim filter failed")?;
            emit(&chain, out.as_deref())
        }
        Commands::Verify { input } => {
            let chain = read_json(&input)?;
            let state = driver::verify_chain(&config, &chain).context("chain rejected")?;
            info!(steps = ?state.len(), "chain accepted");
            emit(&state, None)
        }
        Commands::Keygen { seed } => emit(&driver::keygen(seed.as_bytes()), None),
        Commands::Sign {
            secret_key,
            leaf_index,
            start,
            end,
            receiver,
        } => {
            let secret = driver::parse_secret_key(&secret_key).context("invalid secret key")?;
            let request = driver::sign_withdrawal(
                &secret,
                leaf_index,
                parse_field(&start, "start")?,
                parse_field(&end, "end")?,
                parse_field(&receiver, "receiver")?,
            )?;
            emit(&request, None)
        }
    }
}

fn resolve_config(args: &ConfigArgs) -> Result<LedgerConfig> {
    let mut config = match &args.config {
        Some(path) => LedgerConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => LedgerConfig::default(),
    };
    if let Some(depth) = args.ledger_depth {
        config.ledger_depth = depth;
    }
    if let Some(depth) = args.queue_depth {
        config.queue_depth = depth;
    }
    if let Some(depth) = args.history_depth {
        config.history_depth = depth;
    }
    if let Some(depth) = args.snapshot_depth {
        config.snapshot_depth = depth;
    }
    if let Some(depth) = args.filtered_depth {
        config.filtered_depth = depth;
    }
    if let Some(zero) = &args.zero {
        config.zero = parse_field(zero, "zero")?;
    }
    Ok(config)
}

fn parse_field(text: &str, what: &str) -> Result<FieldElement> {
    FieldElement::from_decimal(text).with_context(|| format!("{what} must be a decimal integer"))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("malformed JSON in {}", path.display()))
}

fn emit<T: Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "wrote chain input");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
