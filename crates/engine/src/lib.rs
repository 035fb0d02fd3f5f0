//! # Engine Crate
//!
//! The long-running driver of the virtual trading agent. `CycleScheduler`
//! runs one decision cycle after another:
//!
//! 1. Force-close positions whose stop-loss, trailing stop or take-profit was hit.
//! 2. Build the candidate set: the filtered exchange universe (when the balance
//!    allows one more entry) united with every symbol that holds a position.
//! 3. Evaluate the signal policy for all candidates on a bounded worker pool.
//! 4. Apply the non-HOLD decisions one by one against the ledger.
//! 5. Persist the snapshot and the new trade log entries.
//!
//! Only step 4 and the risk pass mutate the ledger, and both run on the
//! scheduler's own task, so concurrent policy evaluations never race for
//! balance.

pub mod cooldown;
pub mod error;
pub mod universe;

pub use cooldown::Cooldowns;
pub use error::EngineError;
pub use universe::filter_universe;

use api_client::MarketData;
use chrono::Utc;
use configuration::{Scheduler, Universe};
use core_types::{CloseReason, Decision, TradeLogEntry};
use futures::stream::{self, StreamExt};
use ledger::PositionLedger;
use persistence::{PersistenceError, StateStore};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use strategies::{PolicyOutcome, SignalPolicy};
use tokio::sync::watch;

/// What a single cycle did, used for logging and for picking the next sleep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Positions force-closed by the risk pass.
    pub triggered: usize,
    /// Universe plus held symbols, before cooldowns are applied.
    pub candidates: usize,
    /// Symbols outside their cooldown that had a price and reached the policy.
    pub evaluated: usize,
    pub opened: usize,
    pub closed: usize,
    pub monitor_only: bool,
}

/// The central orchestrator of the agent.
pub struct CycleScheduler {
    // --- Configuration ---
    scheduler: Scheduler,
    universe: Universe,

    // --- Shared, Thread-Safe Components ---
    market: Arc<dyn MarketData>,
    policy: Arc<dyn SignalPolicy>,
    ledger: Arc<PositionLedger>,
    store: Arc<StateStore>,

    cooldowns: Cooldowns,
}

impl CycleScheduler {
    pub fn new(
        scheduler: Scheduler,
        universe: Universe,
        market: Arc<dyn MarketData>,
        policy: Arc<dyn SignalPolicy>,
        ledger: Arc<PositionLedger>,
        store: Arc<StateStore>,
    ) -> Result<Self, EngineError> {
        if scheduler.worker_pool_size == 0 {
            return Err(EngineError::Configuration("worker_pool_size must be at least 1".to_string()));
        }
        let cooldown = i64::try_from(scheduler.cooldown_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| EngineError::Configuration("cooldown_secs is too large".to_string()))?;

        Ok(Self {
            cooldowns: Cooldowns::new(cooldown),
            scheduler,
            universe,
            market,
            policy,
            ledger,
            store,
        })
    }

    /// A handle that can close everything and persist even after this
    /// scheduler has been moved into, or lost with, a panicking task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            market: Arc::clone(&self.market),
            ledger: Arc::clone(&self.ledger),
            store: Arc::clone(&self.store),
            worker_pool_size: self.scheduler.worker_pool_size,
        }
    }

    /// Runs cycles until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// A cycle in progress always runs to completion; the signal is only
    /// observed between cycles and while sleeping.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), EngineError> {
        let balance = self.ledger.balance().await;
        let open_positions = self.ledger.open_count().await;
        tracing::info!(policy = %self.policy.id(), %balance, open_positions, "Starting decision loop");

        while !*shutdown.borrow() {
            let summary = self.run_cycle().await?;
            let pause = if summary.candidates == 0 {
                Duration::from_secs(self.scheduler.idle_interval_secs)
            } else {
                Duration::from_secs(self.scheduler.cycle_interval_secs)
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        tracing::warn!("Shutdown sender dropped, leaving the decision loop");
                        break;
                    }
                }
            }
        }

        tracing::info!("Decision loop stopped");
        Ok(())
    }

    /// Executes one full cycle. Data failures skip the affected symbol and
    /// persistence failures are retried on the next cycle, so the only error
    /// returned is a crashed background task.
    pub async fn run_cycle(&mut self) -> Result<CycleSummary, EngineError> {
        let mut summary = CycleSummary::default();
        let pool = self.scheduler.worker_pool_size;

        // 1. Risk pass over every open position, with prices fetched up front.
        let held = self.ledger.snapshot().await.symbols();
        if !held.is_empty() {
            let prices = fetch_prices(Arc::clone(&self.market), held, pool).await;
            let triggered = self.ledger.evaluate_risk_triggers(&prices).await;
            summary.triggered = triggered.len();
        }

        // 2-4. Candidate selection.
        let snapshot = self.ledger.snapshot().await;
        let mut candidates: BTreeSet<String> = snapshot.positions.keys().cloned().collect();
        summary.monitor_only = self.at_capacity(snapshot.positions.len());

        if summary.monitor_only {
            tracing::info!(open_positions = snapshot.positions.len(), "At capacity, monitoring open positions only");
        } else if self.ledger.can_afford_entry().await {
            match self.market.all_tickers().await {
                Ok(tickers) => candidates.extend(filter_universe(&tickers, &self.universe)),
                Err(e) => tracing::warn!(error = %e, "Failed to fetch tickers, skipping new entries this cycle"),
            }
        } else {
            tracing::debug!(balance = %snapshot.balance, "Balance below margin per trade, no new entries");
        }
        summary.candidates = candidates.len();

        // 5. Cooldowns.
        let now = Utc::now();
        self.cooldowns.prune(now);
        candidates.retain(|symbol| !self.cooldowns.is_cooling(symbol, now));

        // 6. Fan-out of read-only evaluations, then sequential application.
        // Every task owns its inputs so the cycle future stays `Send`.
        let positions = Arc::new(snapshot.positions);
        let (market, policy) = (Arc::clone(&self.market), Arc::clone(&self.policy));
        let mut decisions: Vec<(String, Decimal, PolicyOutcome)> = stream::iter(candidates)
            .map(move |symbol| {
                let market = Arc::clone(&market);
                let policy = Arc::clone(&policy);
                let positions = Arc::clone(&positions);
                async move {
                    let price = match market.latest_price(&symbol).await {
                        Ok(price) => price,
                        Err(e) => {
                            tracing::debug!(%symbol, error = %e, "No price, skipping symbol this cycle");
                            return None;
                        }
                    };
                    let outcome = policy.decide(&symbol, &positions, price).await;
                    Some((symbol, price, outcome))
                }
            })
            .buffer_unordered(pool)
            .filter_map(|decision| async move { decision })
            .collect()
            .await;
        summary.evaluated = decisions.len();

        // Closes first so released margin is available to this cycle's entries.
        decisions.sort_by(|a, b| {
            let rank = |d: Decision| if d == Decision::Close { 0 } else { 1 };
            rank(a.2.decision).cmp(&rank(b.2.decision)).then_with(|| a.0.cmp(&b.0))
        });
        self.apply(decisions, &mut summary).await;

        // 7. Persist.
        persist(Arc::clone(&self.ledger), Arc::clone(&self.store)).await?;

        let balance = self.ledger.balance().await;
        tracing::info!(
            triggered = summary.triggered,
            candidates = summary.candidates,
            evaluated = summary.evaluated,
            opened = summary.opened,
            closed = summary.closed,
            %balance,
            "Cycle complete"
        );
        Ok(summary)
    }

    async fn apply(&mut self, decisions: Vec<(String, Decimal, PolicyOutcome)>, summary: &mut CycleSummary) {
        for (symbol, price, outcome) in decisions {
            match outcome.decision {
                Decision::Hold => {
                    tracing::debug!(%symbol, rationale = %outcome.rationale, "HOLD");
                }
                Decision::Close => {
                    tracing::info!(%symbol, %price, rationale = %outcome.rationale, "Close signal");
                    if self.ledger.close(&symbol, price, CloseReason::Signal).await.is_some() {
                        summary.closed += 1;
                        self.cooldowns.mark(&symbol, Utc::now());
                    }
                }
                Decision::EnterLong | Decision::EnterShort => {
                    let Some(side) = outcome.decision.entry_side() else { continue };
                    if self.at_capacity(self.ledger.open_count().await) {
                        tracing::debug!(%symbol, "Entry skipped, maximum open positions reached");
                        continue;
                    }
                    tracing::info!(%symbol, %side, %price, rationale = %outcome.rationale, "Entry signal");
                    if self.ledger.open(&symbol, side, price, outcome.atr).await {
                        summary.opened += 1;
                        self.cooldowns.mark(&symbol, Utc::now());
                    }
                }
            }
        }
    }

    fn at_capacity(&self, open_positions: usize) -> bool {
        self.scheduler.max_open_positions.is_some_and(|max| open_positions >= max)
    }
}

/// Closes every open position at market and persists the final state.
#[derive(Clone)]
pub struct ShutdownHandle {
    market: Arc<dyn MarketData>,
    ledger: Arc<PositionLedger>,
    store: Arc<StateStore>,
    worker_pool_size: usize,
}

impl ShutdownHandle {
    /// Best effort: positions whose price cannot be fetched stay open and are
    /// persisted as such, to be picked up again on the next start.
    pub async fn close_all_and_persist(&self) -> Result<Vec<(String, Decimal)>, EngineError> {
        let held = self.ledger.snapshot().await.symbols();
        tracing::info!(open_positions = held.len(), "Closing all positions");

        let prices = fetch_prices(Arc::clone(&self.market), held.clone(), self.worker_pool_size.max(1)).await;
        let closed = self.ledger.close_all(&prices, CloseReason::Shutdown).await;
        persist(Arc::clone(&self.ledger), Arc::clone(&self.store)).await?;

        let balance = self.ledger.balance().await;
        tracing::info!(
            closed = closed.len(),
            left_open = held.len().saturating_sub(closed.len()),
            %balance,
            "Final state saved"
        );
        Ok(closed)
    }
}

/// Latest prices for `symbols`; symbols whose fetch failed are absent.
async fn fetch_prices(market: Arc<dyn MarketData>, symbols: Vec<String>, pool: usize) -> HashMap<String, Decimal> {
    stream::iter(symbols)
        .map(move |symbol| {
            let market = Arc::clone(&market);
            async move {
                match market.latest_price(&symbol).await {
                    Ok(price) => Some((symbol, price)),
                    Err(e) => {
                        tracing::warn!(%symbol, error = %e, "Failed to fetch price");
                        None
                    }
                }
            }
        })
        .buffer_unordered(pool)
        .filter_map(|price| async move { price })
        .collect()
        .await
}

/// Writes the snapshot and the pending trade log entries on the blocking pool.
///
/// I/O failures are logged and the batch goes back to the front of the
/// ledger's queue. A failed append writes nothing, so the retry cannot
/// duplicate rows. Memory stays authoritative either way.
async fn persist(ledger: Arc<PositionLedger>, store: Arc<StateStore>) -> Result<(), EngineError> {
    let snapshot = ledger.snapshot().await;
    let entries = ledger.take_pending_log().await;

    let (saved, unwritten) = tokio::task::spawn_blocking(move || {
        let saved = store.save_snapshot(&snapshot);
        let unwritten: Option<(PersistenceError, Vec<TradeLogEntry>)> = if entries.is_empty() {
            None
        } else {
            store.append_trade_log(&entries).err().map(|e| (e, entries))
        };
        (saved, unwritten)
    })
    .await?;

    if let Err(e) = saved {
        tracing::error!(error = %e, "Failed to save ledger snapshot, retrying next cycle");
    }
    if let Some((e, entries)) = unwritten {
        tracing::error!(error = %e, entries = entries.len(), "Failed to append trade log, requeueing");
        ledger.requeue_log(entries).await;
    }
    Ok(())
}
