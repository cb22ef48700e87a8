//! CLI commands for the simulator
//!
//! Every handler works on an [`AppState`] loaded from the data directory
//! and saves it back once the command has changed something.

use crate::config::SimulatorConfig;
use crate::core::amount::Amount;
use crate::mining::pow::format_hash_rate;
use crate::simulator::Simulator;
use crate::storage::{Storage, StorageConfig};
use crate::wallet::WalletId;
use std::time::Duration;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
pub struct AppState {
    pub simulator: Simulator,
    pub storage: Storage,
}

impl AppState {
    /// Load the network from the data directory, or start at genesis
    pub fn new(config: SimulatorConfig) -> CliResult<Self> {
        let storage = Storage::new(StorageConfig {
            data_dir: config.data_dir.clone(),
        })?;

        let simulator = if storage.exists() {
            println!("📂 Loading network state...");
            Simulator::from_snapshot(storage.load()?, config)?
        } else {
            println!("🆕 Starting a new network at genesis...");
            Simulator::new(config)?
        };

        Ok(Self { simulator, storage })
    }

    /// Save the current state
    pub async fn save(&self) -> CliResult<()> {
        self.storage.save(&self.simulator.snapshot().await)?;
        Ok(())
    }
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(16)]
}

/// Network overview
pub async fn cmd_status(state: &AppState) -> CliResult<()> {
    let stats = state.simulator.stats().await;

    println!("⛓️  Network Status");
    println!("   ├─ Blocks: {}", stats.total_blocks);
    println!("   ├─ Transactions: {}", stats.total_transactions);
    println!("   ├─ Total supply: {}", stats.total_supply);
    match stats.average_block_time_seconds {
        Some(t) => println!("   ├─ Average block time: {:.2}s", t),
        None => println!("   ├─ Average block time: -"),
    }
    println!(
        "   ├─ Network hash rate: {}",
        format_hash_rate(stats.network_hash_rate)
    );
    match stats.average_fee {
        Some(fee) => println!("   ├─ Average fee: {}", fee),
        None => println!("   ├─ Average fee: -"),
    }
    match stats.seconds_since_last_block {
        Some(s) => println!("   ├─ Last block: {}s ago", s),
        None => println!("   ├─ Last block: never"),
    }
    println!("   ├─ Active validators: {}", stats.active_validators);
    println!(
        "   └─ Next difficulty: {} (target {}...)",
        stats.next_difficulty,
        short(&stats.next_target)
    );

    if let Some(point) = state.simulator.latest_data_point().await {
        println!(
            "\n📈 Last data point: block {}, {:.2}s block time, {}",
            point.block_height,
            point.block_time_seconds,
            format_hash_rate(point.hash_rate)
        );
    }

    println!("\n📥 Mempool");
    println!("   ├─ Pending: {}", stats.mempool.count);
    println!("   ├─ Value: {}", stats.mempool.total_value);
    println!("   └─ Fees: {}", stats.mempool.total_fees);

    let storage = state.storage.stats()?;
    println!(
        "\n📁 {:?}: {} keys, {} bytes",
        storage.data_dir, storage.keys_present, storage.total_size
    );

    Ok(())
}

/// Queue a transfer between two wallets
pub async fn cmd_send(state: &AppState, from: WalletId, to: WalletId, amount: &str) -> CliResult<()> {
    match state.simulator.submit_transfer(from, to, amount).await {
        Ok(tx) => {
            println!("📤 Transaction created:");
            println!("   ID: {}", tx.id);
            println!("   From: {}", from);
            println!("   To: {}", to);
            println!(
                "   Amount: {}",
                tx.outputs.first().map(|o| o.amount).unwrap_or(Amount::ZERO)
            );
            println!("   Fee: {}", tx.fee);
            if let Some(change) = tx.outputs.get(1) {
                println!("   Change: {}", change.amount);
            }
            println!("\n✅ Transaction added to mempool");
            state.save().await?;
        }
        Err(e) => println!("❌ Transfer rejected: {}", e),
    }
    Ok(())
}

/// Mine up to `count` blocks
pub async fn cmd_mine(state: &AppState, count: u32) -> CliResult<()> {
    for _ in 0..count {
        let block = match state.simulator.mine_next_block().await {
            Ok(Some(block)) => block,
            Ok(None) => {
                println!("📭 Mempool is empty, nothing to mine");
                break;
            }
            Err(e) => {
                println!("❌ {}", e);
                break;
            }
        };

        println!("\n   Block {} mined!", block.height);
        println!("   ├─ Hash: {}", short(&block.hash));
        println!("   ├─ Transactions: {}", block.tx_count());
        println!("   ├─ Reward: {}", block.reward);
        println!("   ├─ Fees: {}", block.total_fees());
        println!("   ├─ Difficulty: {}", block.difficulty);
        println!("   ├─ Time: {}ms", block.mining_duration_ms.unwrap_or(0));
        println!("   ├─ Attempts: {}", block.attempts.unwrap_or(0));
        println!(
            "   └─ Hash rate: {}",
            format_hash_rate(block.hash_rate.unwrap_or(0.0))
        );
        state.save().await?;
    }
    Ok(())
}

/// Return the network to genesis
pub async fn cmd_reset(state: &AppState) -> CliResult<()> {
    state.simulator.reset_network().await?;
    state.storage.clear()?;
    state.save().await?;
    println!("🔄 Network reset to genesis");
    Ok(())
}

/// Run automatic mining for a while
pub async fn cmd_auto(state: &AppState, seconds: u64) -> CliResult<()> {
    println!("🤖 Automatic mining for {}s (Ctrl-C to stop early)", seconds);
    state.simulator.set_automatic_mining(true);

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
        _ = tokio::signal::ctrl_c() => println!("\n⏹️  Interrupted"),
    }

    state.simulator.shutdown().await;
    state.save().await?;

    let progress = state.simulator.progress();
    if progress.height() > 0 {
        println!(
            "⛏️  Last search: block {}, {} attempts",
            progress.height(),
            progress.attempts()
        );
    }
    let chain = state.simulator.chain().await;
    println!("✅ Chain height is now {}", chain.len());
    Ok(())
}

/// List recent blocks, newest first
pub async fn cmd_chain(state: &AppState, count: usize) -> CliResult<()> {
    let chain = state.simulator.chain().await;
    if chain.is_empty() {
        println!("🧱 No blocks yet");
        return Ok(());
    }

    println!("🧱 Recent blocks:");
    for block in chain.iter().rev().take(count) {
        println!(
            "   #{} | {} | {} tx | d={} | nonce {} | {}",
            block.height,
            short(&block.hash),
            block.tx_count(),
            block.difficulty,
            block.nonce,
            block.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// Show pending transactions, newest first
pub async fn cmd_mempool(state: &AppState) -> CliResult<()> {
    let pending = state.simulator.mempool().await;

    println!("📥 Mempool: {} pending transaction(s)", pending.len());
    for tx in pending.iter().rev() {
        println!(
            "   #{} | {} | to {} | fee {} | {}",
            tx.id,
            tx.outputs.first().map(|o| o.amount).unwrap_or(Amount::ZERO),
            tx.recipient().unwrap_or("-"),
            tx.fee,
            tx.timestamp.format("%H:%M:%S")
        );
    }
    Ok(())
}

/// Show wallet balances
pub async fn cmd_wallets(state: &AppState) -> CliResult<()> {
    let snapshot = state.simulator.snapshot().await;

    println!("👛 Wallets:");
    for (id, wallet) in &snapshot.wallets {
        let utxos = wallet.utxos(&snapshot.utxos);
        let balance: Amount = utxos.iter().map(|u| u.amount).sum();
        println!("   {} {} - {}", id, wallet.address, balance);
        for utxo in &utxos {
            println!("   └─ {} = {}", utxo.outpoint(), utxo.amount);
        }
    }
    Ok(())
}

/// Show validator statistics
pub async fn cmd_validators(state: &AppState) -> CliResult<()> {
    println!("🖥️  Validators:");
    for v in state.simulator.validators().await {
        let earned = state.simulator.balance_of_address(&v.address).await;
        println!(
            "   {} ({:?}) - {} blocks won, {} earned, {}",
            v.name,
            v.status,
            v.blocks_won,
            earned,
            format_hash_rate(v.simulated_hash_rate)
        );
    }
    Ok(())
}

/// Show recent network data points
pub async fn cmd_history(state: &AppState, count: usize) -> CliResult<()> {
    let history = state.simulator.history().await;
    if history.is_empty() {
        println!("📈 No network history yet");
        return Ok(());
    }

    println!("📈 Network history:");
    let skip = history.len().saturating_sub(count);
    for point in history.iter().skip(skip) {
        println!(
            "   #{} | d={} | {} | block time {:.2}s | mempool {} | {} tx | avg fee {:.8}",
            point.block_height,
            point.difficulty,
            format_hash_rate(point.hash_rate),
            point.block_time_seconds,
            point.mempool_size,
            point.total_transactions,
            point.average_fee
        );
    }
    Ok(())
}
