//! Integration tests for the decision cycle, driven by in-memory market data
//! and a scripted policy.

use api_client::{ApiError, MarketData};
use async_trait::async_trait;
use configuration::{MarginPolicy, PersistenceConfig, RiskManagement, Scheduler, StopPolicy, Universe};
use core_types::{CloseReason, Decision, Kline, PolicyId, Position, Side, Ticker, TradeAction};
use engine::{CycleScheduler, EngineError};
use ledger::{LedgerState, PositionLedger};
use persistence::StateStore;
use risk::SimpleRiskManager;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strategies::{PolicyOutcome, SignalPolicy};
use tempfile::TempDir;

// ── Fakes ────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeMarket {
    prices: Mutex<HashMap<String, Decimal>>,
    tickers: Vec<Ticker>,
    ticker_calls: AtomicUsize,
}

impl FakeMarket {
    fn with_tickers(symbols: &[&str]) -> Self {
        let tickers = symbols
            .iter()
            .map(|s| Ticker {
                symbol: s.to_string(),
                last_price: dec!(100),
                turnover_24h: dec!(1000000),
                price_24h_pcnt: dec!(0.01),
            })
            .collect();
        Self { tickers, ..Self::default() }
    }

    fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }
}

#[async_trait]
impl MarketData for FakeMarket {
    async fn latest_price(&self, symbol: &str) -> Result<Decimal, ApiError> {
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| ApiError::Empty(symbol.to_string()))
    }

    async fn historical_bars(&self, _symbol: &str, _interval: &str, _limit: usize) -> Result<Vec<Kline>, ApiError> {
        Ok(Vec::new())
    }

    async fn all_tickers(&self) -> Result<Vec<Ticker>, ApiError> {
        self.ticker_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tickers.clone())
    }
}

/// Returns a fixed decision per symbol and HOLD for everything else.
#[derive(Default)]
struct ScriptedPolicy {
    script: HashMap<String, Decision>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedPolicy {
    fn new(script: &[(&str, Decision)]) -> Self {
        Self {
            script: script.iter().map(|(s, d)| (s.to_string(), *d)).collect(),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<String> {
        let mut seen = self.seen.lock().unwrap().clone();
        seen.sort();
        seen
    }
}

#[async_trait]
impl SignalPolicy for ScriptedPolicy {
    fn id(&self) -> PolicyId {
        PolicyId::MeanReversion
    }

    async fn decide(&self, symbol: &str, _open: &BTreeMap<String, Position>, _price: Decimal) -> PolicyOutcome {
        self.seen.lock().unwrap().push(symbol.to_string());
        let decision = self.script.get(symbol).copied().unwrap_or(Decision::Hold);
        PolicyOutcome::new(decision, "scripted")
    }
}

// ── Harness ──────────────────────────────────────────────────────────

struct Harness {
    _dir: TempDir,
    market: Arc<FakeMarket>,
    policy: Arc<ScriptedPolicy>,
    ledger: Arc<PositionLedger>,
    store: Arc<StateStore>,
    scheduler: CycleScheduler,
}

fn ledger(balance: Decimal) -> Arc<PositionLedger> {
    let risk = SimpleRiskManager::new(
        RiskManagement {
            margin: MarginPolicy::Fixed { amount: dec!(1) },
            stops: StopPolicy::FixedPct { stop_loss_pct: dec!(0.1), take_profit_pct: dec!(0.1) },
        },
        dec!(5),
    )
    .unwrap();
    Arc::new(PositionLedger::new(LedgerState::new(balance), Arc::new(risk), dec!(0.00055)))
}

fn harness(balance: Decimal, settings: Scheduler, market: FakeMarket, policy: ScriptedPolicy) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(StateStore::new(&PersistenceConfig {
        data_dir: dir.path().to_path_buf(),
        ..PersistenceConfig::default()
    }));
    let ledger = ledger(balance);
    let market = Arc::new(market);
    let policy = Arc::new(policy);

    let scheduler = CycleScheduler::new(
        settings,
        Universe::default(),
        market.clone(),
        policy.clone(),
        ledger.clone(),
        store.clone(),
    )
    .unwrap();

    Harness { _dir: dir, market, policy, ledger, store, scheduler }
}

fn settings() -> Scheduler {
    Scheduler {
        cycle_interval_secs: 3600,
        idle_interval_secs: 3600,
        worker_pool_size: 3,
        max_open_positions: Some(8),
        cooldown_secs: 120,
    }
}

// ── Risk pass ────────────────────────────────────────────────────────

#[tokio::test]
async fn stop_loss_is_closed_before_candidates_and_persisted() {
    let mut h = harness(dec!(10), settings(), FakeMarket::default(), ScriptedPolicy::default());
    assert!(h.ledger.open("BTCUSDT", Side::Long, dec!(100), None).await);
    h.market.set_price("BTCUSDT", dec!(89));

    let summary = h.scheduler.run_cycle().await.unwrap();

    assert_eq!(summary.triggered, 1);
    assert_eq!(h.ledger.open_count().await, 0);

    let restored = h.store.load(dec!(10)).unwrap();
    assert_eq!(restored, h.ledger.snapshot().await);

    let log = h.store.read_trade_log().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].action, TradeAction::Close);
    assert_eq!(log[1].reason, Some(CloseReason::StopLoss));
}

// ── Candidate selection ──────────────────────────────────────────────

#[tokio::test]
async fn entry_signal_opens_and_symbol_then_cools_down() {
    let market = FakeMarket::with_tickers(&["BTCUSDT", "ETHUSDT"]);
    market.set_price("BTCUSDT", dec!(100));
    market.set_price("ETHUSDT", dec!(50));
    let policy = ScriptedPolicy::new(&[("ETHUSDT", Decision::EnterShort)]);
    let mut h = harness(dec!(10), settings(), market, policy);

    let first = h.scheduler.run_cycle().await.unwrap();
    assert_eq!(first.candidates, 2);
    assert_eq!(first.evaluated, 2);
    assert_eq!(first.opened, 1);

    let snapshot = h.ledger.snapshot().await;
    assert_eq!(snapshot.positions["ETHUSDT"].side, Side::Short);
    assert_eq!(snapshot.balance, dec!(9));

    let second = h.scheduler.run_cycle().await.unwrap();
    assert_eq!(second.evaluated, 1);
    assert_eq!(h.policy.seen(), vec!["BTCUSDT", "BTCUSDT", "ETHUSDT"]);
}

#[tokio::test]
async fn at_capacity_only_open_positions_are_monitored() {
    let market = FakeMarket::with_tickers(&["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
    for symbol in ["BTCUSDT", "ETHUSDT", "SOLUSDT"] {
        market.set_price(symbol, dec!(100));
    }
    let settings = Scheduler { max_open_positions: Some(1), cooldown_secs: 0, ..settings() };
    let mut h = harness(dec!(10), settings, market, ScriptedPolicy::new(&[("ETHUSDT", Decision::EnterLong)]));
    assert!(h.ledger.open("BTCUSDT", Side::Long, dec!(100), None).await);

    let summary = h.scheduler.run_cycle().await.unwrap();

    assert!(summary.monitor_only);
    assert_eq!(summary.opened, 0);
    assert_eq!(h.market.ticker_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.policy.seen(), vec!["BTCUSDT"]);
}

#[tokio::test]
async fn entries_in_one_cycle_stop_at_capacity() {
    let symbols = ["AAAUSDT", "BBBUSDT", "DDDUSDT", "EEEUSDT"];
    let market = FakeMarket::with_tickers(&symbols);
    let mut script = Vec::new();
    for symbol in symbols {
        market.set_price(symbol, dec!(10));
        script.push((symbol, Decision::EnterLong));
    }
    let settings = Scheduler { max_open_positions: Some(2), ..settings() };
    let mut h = harness(dec!(10), settings, market, ScriptedPolicy::new(&script));

    let summary = h.scheduler.run_cycle().await.unwrap();

    assert_eq!(summary.opened, 2);
    assert_eq!(h.ledger.snapshot().await.symbols(), vec!["AAAUSDT".to_string(), "BBBUSDT".to_string()]);
}

#[tokio::test]
async fn low_balance_skips_universe_but_still_monitors() {
    let market = FakeMarket::with_tickers(&["ETHUSDT"]);
    market.set_price("BTCUSDT", dec!(100));
    market.set_price("ETHUSDT", dec!(100));
    let mut h = harness(dec!(1.5), settings(), market, ScriptedPolicy::default());
    assert!(h.ledger.open("BTCUSDT", Side::Long, dec!(100), None).await);

    let summary = h.scheduler.run_cycle().await.unwrap();

    assert_eq!(summary.candidates, 1);
    assert_eq!(h.market.ticker_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.policy.seen(), vec!["BTCUSDT"]);
}

#[tokio::test]
async fn symbols_without_price_are_skipped() {
    let market = FakeMarket::with_tickers(&["BTCUSDT", "ETHUSDT"]);
    market.set_price("BTCUSDT", dec!(100));
    let mut h = harness(dec!(10), settings(), market, ScriptedPolicy::new(&[("ETHUSDT", Decision::EnterLong)]));

    let summary = h.scheduler.run_cycle().await.unwrap();

    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.evaluated, 1);
    assert_eq!(summary.opened, 0);
}

// ── Decision application ─────────────────────────────────────────────

#[tokio::test]
async fn close_signal_is_logged_with_signal_reason() {
    let market = FakeMarket::default();
    market.set_price("BTCUSDT", dec!(104));
    let mut h = harness(dec!(10), settings(), market, ScriptedPolicy::new(&[("BTCUSDT", Decision::Close)]));
    assert!(h.ledger.open("BTCUSDT", Side::Long, dec!(100), None).await);

    let summary = h.scheduler.run_cycle().await.unwrap();

    assert_eq!(summary.closed, 1);
    let log = h.store.read_trade_log().unwrap();
    assert_eq!(log.last().unwrap().reason, Some(CloseReason::Signal));
    assert_eq!(log[0].position_id, log[1].position_id);
    assert!(h.ledger.balance().await > dec!(10));
}

// ── Persistence failures ─────────────────────────────────────────────

#[tokio::test]
async fn trade_log_failure_is_retried_on_the_next_cycle() {
    let market = FakeMarket::with_tickers(&["ETHUSDT"]);
    market.set_price("ETHUSDT", dec!(50));
    let mut h = harness(dec!(10), settings(), market, ScriptedPolicy::new(&[("ETHUSDT", Decision::EnterLong)]));
    let log_path = h.store.trade_log_path().to_path_buf();
    std::fs::create_dir(&log_path).unwrap();

    let first = h.scheduler.run_cycle().await.unwrap();
    assert_eq!(first.opened, 1);
    assert_eq!(h.ledger.balance().await, dec!(9));
    assert_eq!(h.store.load(dec!(10)).unwrap(), h.ledger.snapshot().await);

    std::fs::remove_dir(&log_path).unwrap();
    let second = h.scheduler.run_cycle().await.unwrap();
    assert_eq!(second.opened, 0);

    let log = h.store.read_trade_log().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].action, TradeAction::Open);
    assert_eq!(log[0].symbol, "ETHUSDT");
}

#[tokio::test]
async fn snapshot_failure_keeps_memory_authoritative_until_it_recovers() {
    let market = FakeMarket::default();
    market.set_price("BTCUSDT", dec!(104));
    let mut h = harness(dec!(10), settings(), market, ScriptedPolicy::new(&[("BTCUSDT", Decision::Close)]));
    assert!(h.ledger.open("BTCUSDT", Side::Long, dec!(100), None).await);
    let blocker = h.store.trade_log_path().with_file_name("status.json.tmp");
    std::fs::create_dir(&blocker).unwrap();

    let first = h.scheduler.run_cycle().await.unwrap();
    assert_eq!(first.closed, 1);
    assert_eq!(h.ledger.open_count().await, 0);
    assert_eq!(h.store.load(dec!(10)).unwrap().balance, dec!(10));

    std::fs::remove_dir(&blocker).unwrap();
    h.scheduler.run_cycle().await.unwrap();
    assert_eq!(h.store.load(dec!(10)).unwrap(), h.ledger.snapshot().await);
    assert_eq!(h.store.read_trade_log().unwrap().len(), 2);
}

// ── Construction ─────────────────────────────────────────────────────

#[test]
fn cooldown_beyond_the_clock_range_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(StateStore::new(&PersistenceConfig {
        data_dir: dir.path().to_path_buf(),
        ..PersistenceConfig::default()
    }));

    for cooldown_secs in [i64::MAX as u64, u64::MAX] {
        let result = CycleScheduler::new(
            Scheduler { cooldown_secs, ..settings() },
            Universe::default(),
            Arc::new(FakeMarket::default()),
            Arc::new(ScriptedPolicy::default()),
            ledger(dec!(10)),
            store.clone(),
        );
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }
}

// ── Shutdown ─────────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_closes_priced_positions_and_keeps_the_rest() {
    let market = FakeMarket::default();
    market.set_price("BTCUSDT", dec!(100));
    let h = harness(dec!(10), settings(), market, ScriptedPolicy::default());
    assert!(h.ledger.open("BTCUSDT", Side::Long, dec!(100), None).await);
    assert!(h.ledger.open("ETHUSDT", Side::Short, dec!(50), None).await);

    let closed = h.scheduler.shutdown_handle().close_all_and_persist().await.unwrap();

    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].0, "BTCUSDT");
    let restored = h.store.load(dec!(10)).unwrap();
    assert_eq!(restored.symbols(), vec!["ETHUSDT".to_string()]);
    let log = h.store.read_trade_log().unwrap();
    assert_eq!(log.last().unwrap().reason, Some(CloseReason::Shutdown));
}

#[tokio::test]
async fn run_returns_when_shutdown_is_signalled() {
    let h = harness(dec!(10), settings(), FakeMarket::default(), ScriptedPolicy::default());
    let mut scheduler = h.scheduler;
    let (tx, rx) = tokio::sync::watch::channel(false);

    let task = tokio::spawn(async move { scheduler.run(rx).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), task).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
}
