use analytics::{AnalyticsEngine, PerformanceReport};
use anyhow::Context;
use api_client::{BybitClient, GeminiClient, MarketData, SentimentAnalyzer};
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use configuration::{Config, init_tracing, load_config};
use core_types::PolicyId;
use engine::{CycleScheduler, EngineError};
use ledger::{LedgerState, PositionLedger};
use persistence::StateStore;
use risk::SimpleRiskManager;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use strategies::create_policy;
use tokio::sync::watch;
use tokio::task::JoinError;

/// The main entry point for the virtual futures trading agent.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Secrets such as GEMINI_API_KEY may live in a .env file; it is optional.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    let _log_guard = init_tracing(&config.logging).context("failed to initialise logging")?;

    match cli.command {
        Commands::Run => handle_run(config).await,
        Commands::Evaluate => handle_evaluate(config),
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A paper-trading agent for perpetual futures driven by live public market data.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the decision loop until Ctrl-C, then close everything and save.
    Run,
    /// Print performance statistics computed from the trade log.
    Evaluate,
}

// ==============================================================================
// Run Command Logic
// ==============================================================================

async fn handle_run(config: Config) -> anyhow::Result<()> {
    // --- 1. Market data and the optional reasoning model ---
    let market: Arc<dyn MarketData> =
        Arc::new(BybitClient::new(&config.api).context("failed to build the market data client")?);
    let sentiment: Option<Arc<dyn SentimentAnalyzer>> = match &config.api.gemini_api_key {
        Some(key) if config.strategy.policy == PolicyId::AiConfirmed => {
            let client = GeminiClient::new(&config.api, key.clone()).context("failed to build the Gemini client")?;
            Some(Arc::new(client) as Arc<dyn SentimentAnalyzer>)
        }
        _ => None,
    };

    // --- 2. Policy, risk and the ledger restored from disk ---
    let policy = create_policy(&config.strategy, Arc::clone(&market), sentiment)
        .context("invalid strategy configuration")?;
    let risk = SimpleRiskManager::new(config.risk_management.clone(), config.trading.leverage)
        .context("invalid risk configuration")?;
    let store = Arc::new(StateStore::new(&config.persistence));
    let snapshot = store
        .load(config.trading.initial_balance)
        .context("failed to restore the persisted ledger state")?;
    let ledger = Arc::new(PositionLedger::new(
        LedgerState::from_snapshot(snapshot),
        Arc::new(risk),
        config.trading.taker_fee_rate,
    ));

    // --- 3. The decision loop on its own task ---
    let mut scheduler = CycleScheduler::new(
        config.scheduler.clone(),
        config.universe.clone(),
        market,
        policy,
        ledger,
        store,
    )?;
    let shutdown = scheduler.shutdown_handle();
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut loop_task = tokio::spawn(async move { scheduler.run(stop_rx).await });

    tracing::info!(
        policy = %config.strategy.policy,
        leverage = %config.trading.leverage,
        "Agent started, press Ctrl-C to stop"
    );

    // --- 4. Wait for Ctrl-C or for the loop to die on its own ---
    let outcome = tokio::select! {
        result = &mut loop_task => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, stopping after the current cycle");
            // The receiver only disappears if the loop already ended.
            let _ = stop_tx.send(true);
            loop_task.await
        }
    };
    let loop_failure = describe_loop_outcome(outcome);

    // --- 5. Close-all and final save, whatever ended the loop ---
    let closed = shutdown.close_all_and_persist().await?;
    tracing::info!(closed = closed.len(), "Shutdown complete");

    match loop_failure {
        Some(reason) => Err(anyhow::anyhow!(reason)),
        None => Ok(()),
    }
}

fn describe_loop_outcome(outcome: Result<Result<(), EngineError>, JoinError>) -> Option<String> {
    match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Decision loop failed");
            Some(format!("decision loop failed: {e}"))
        }
        Err(e) => {
            tracing::error!(error = %e, "Decision loop panicked");
            Some(format!("decision loop panicked: {e}"))
        }
    }
}

// ==============================================================================
// Evaluate Command Logic
// ==============================================================================

fn handle_evaluate(config: Config) -> anyhow::Result<()> {
    let store = StateStore::new(&config.persistence);
    let entries = store.read_trade_log().context("failed to read the trade log")?;
    let report = AnalyticsEngine::new().calculate(&entries, config.trading.initial_balance)?;

    println!("Trade log: {}", store.trade_log_path().display());
    println!("{}", render_report(&report));
    println!("\nRecommendation: {}", report.recommendation);
    Ok(())
}

fn render_report(report: &PerformanceReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Metric", "Value"]);

    let win_rate = report
        .win_rate_pct
        .map(|pct| format!("{:.2}%", pct))
        .unwrap_or_else(|| "n/a".to_string());
    let holding = report
        .average_holding_secs
        .map(format_duration)
        .unwrap_or_else(|| "n/a".to_string());

    let rows = [
        ("Closed trades", report.total_trades.to_string()),
        ("Winning / losing", format!("{} / {}", report.winning_trades, report.losing_trades)),
        ("Win rate", win_rate),
        ("Total net PnL", money(report.total_net_pnl)),
        ("Average PnL per trade", money(report.average_pnl)),
        ("Average win", money(report.average_win)),
        ("Average loss", money(report.average_loss)),
        ("Largest win", money(report.max_win)),
        ("Largest loss", money(report.max_loss)),
        ("Profit factor", format!("{:.2}", report.profit_factor)),
        (
            "Max drawdown",
            format!("{} ({:.2}%)", money(report.max_drawdown), report.max_drawdown_pct),
        ),
        ("Average holding time", holding),
    ];
    for (metric, value) in rows {
        table.add_row(vec![metric.to_string(), value]);
    }
    table
}

fn money(value: Decimal) -> String {
    format!("${}", value.round_dp(4))
}

fn format_duration(secs: i64) -> String {
    let (hours, rest) = (secs / 3600, secs % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
