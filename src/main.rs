//! Bitcoin network simulator CLI
//!
//! A command-line interface for driving the simulated network.

use bitcoin_sim::cli::{self, AppState};
use bitcoin_sim::config::SimulatorConfig;
use bitcoin_sim::wallet::WalletId;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bitcoin-sim")]
#[command(version = "0.1.0")]
#[command(about = "A UTXO ledger and proof-of-work mining simulator", long_about = None)]
struct Cli {
    /// Data directory for network state
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show network statistics
    Status,

    /// Send coins between wallets
    Send {
        /// Sender wallet (wallet1, wallet2, wallet3)
        #[arg(short, long)]
        from: WalletId,

        /// Recipient wallet
        #[arg(short, long)]
        to: WalletId,

        /// Amount in BTC, e.g. 30 or 0.5
        #[arg(short, long)]
        amount: String,
    },

    /// Mine pending transactions into new blocks
    Mine {
        /// Number of blocks to mine
        #[arg(short, long, default_value = "1")]
        count: u32,
    },

    /// Reset the network to genesis
    Reset,

    /// Run automatic mining
    Auto {
        /// How long to run, in seconds
        #[arg(short, long, default_value = "30")]
        seconds: u64,
    },

    /// List recent blocks
    Chain {
        /// Number of blocks to show
        #[arg(short, long, default_value = "10")]
        count: usize,
    },

    /// Show pending transactions
    Mempool,

    /// Show wallet balances
    Wallets,

    /// Show validator statistics
    Validators,

    /// Show recent network history
    History {
        /// Number of data points to show
        #[arg(short, long, default_value = "10")]
        count: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimulatorConfig::load(path)?,
        None => SimulatorConfig::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let state = AppState::new(config)?;

        match cli.command {
            Commands::Status => cli::cmd_status(&state).await,
            Commands::Send { from, to, amount } => cli::cmd_send(&state, from, to, &amount).await,
            Commands::Mine { count } => cli::cmd_mine(&state, count).await,
            Commands::Reset => cli::cmd_reset(&state).await,
            Commands::Auto { seconds } => cli::cmd_auto(&state, seconds).await,
            Commands::Chain { count } => cli::cmd_chain(&state, count).await,
            Commands::Mempool => cli::cmd_mempool(&state).await,
            Commands::Wallets => cli::cmd_wallets(&state).await,
            Commands::Validators => cli::cmd_validators(&state).await,
            Commands::History { count } => cli::cmd_history(&state, count).await,
        }
    })
}
