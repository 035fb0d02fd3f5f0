//! # Signal Policy Library
//!
//! This crate turns market history into trading decisions. It defines the
//! universal `SignalPolicy` trait the scheduler drives, the `IndicatorEngine`
//! every technical policy shares, and four concrete policies.
//!
//! ## Architectural Principles
//!
//! - **Fail-safe decisions:** `decide` never returns an error. Missing data, a
//!   short history, or an unavailable reasoning service all collapse to `HOLD`
//!   with a rationale explaining why.
//! - **Pure rules, thin shells:** each technical policy is an `IndicatorRule`, a
//!   pure function of the latest indicators and the symbol's open position. The
//!   generic `TechnicalPolicy` shell fetches history and computes indicators, so
//!   rules can be composed (see `RegimeSwitch`) and tested without I/O.
//! - **Extensibility:** adding a policy means implementing `IndicatorRule` (or
//!   `SignalPolicy` directly), adding a `PolicyId` variant and wiring the `factory`.

pub mod ai_confirmed;
pub mod error;
pub mod factory;
pub mod indicators;
pub mod mean_reversion;
pub mod regime_switch;
pub mod trend_following;

pub use ai_confirmed::AiConfirmed;
pub use error::StrategyError;
pub use factory::create_policy;
pub use indicators::{Indicator, IndicatorEngine, IndicatorSet};
pub use mean_reversion::MeanReversion;
pub use regime_switch::RegimeSwitch;
pub use trend_following::TrendFollowing;

use api_client::MarketData;
use async_trait::async_trait;
use core_types::{Decision, PolicyId, Position};
use rust_decimal::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The result of one policy evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyOutcome {
    pub decision: Decision,
    /// Human-readable explanation, logged with every decision.
    pub rationale: String,
    /// The latest ATR, when it could be computed. Volatility-scaled stops need it.
    pub atr: Option<Decimal>,
}

impl PolicyOutcome {
    pub fn new(decision: Decision, rationale: impl Into<String>) -> Self {
        Self { decision, rationale: rationale.into(), atr: None }
    }

    pub fn hold(rationale: impl Into<String>) -> Self {
        Self::new(Decision::Hold, rationale)
    }

    pub fn with_atr(mut self, atr: Option<f64>) -> Self {
        self.atr = atr.and_then(Decimal::from_f64);
        self
    }
}

/// The core trait every decision policy implements.
///
/// `open_positions` is a snapshot of the ledger; a policy only ever looks at
/// the entry for `symbol`. Implementations must be fail-safe: any failure to
/// gather evidence yields `Decision::Hold`.
#[async_trait]
pub trait SignalPolicy: Send + Sync {
    fn id(&self) -> PolicyId;

    async fn decide(
        &self,
        symbol: &str,
        open_positions: &BTreeMap<String, Position>,
        current_price: Decimal,
    ) -> PolicyOutcome;
}

/// A pure decision rule over the latest indicator values.
pub trait IndicatorRule: Send + Sync {
    /// The minimum number of bars below which the rule always holds.
    fn min_bars(&self) -> usize;

    fn evaluate(&self, position: Option<&Position>, price: f64, indicators: &IndicatorSet) -> PolicyOutcome;
}

/// Shared access to history and indicators for every policy.
#[derive(Clone)]
pub struct MarketContext {
    market: Arc<dyn MarketData>,
    engine: IndicatorEngine,
    interval: String,
    history_limit: usize,
}

impl MarketContext {
    pub fn new(market: Arc<dyn MarketData>, engine: IndicatorEngine, interval: String, history_limit: usize) -> Self {
        Self { market, engine, interval, history_limit }
    }

    /// Fetches recent history and computes indicators on it.
    ///
    /// `Err` carries the HOLD rationale when history is unavailable or shorter than `min_bars`.
    pub async fn indicators(&self, symbol: &str, min_bars: usize) -> Result<IndicatorSet, String> {
        let bars = match self.market.historical_bars(symbol, &self.interval, self.history_limit).await {
            Ok(bars) => bars,
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Failed to fetch history");
                return Err(format!("history unavailable: {}", e));
            }
        };
        if bars.len() < min_bars {
            return Err(format!("insufficient history: {} of {} bars", bars.len(), min_bars));
        }
        let indicators = self.engine.compute(&bars);
        tracing::debug!(symbol, ?indicators, "Computed indicators");
        Ok(indicators)
    }
}

/// Adapts a pure `IndicatorRule` into an async `SignalPolicy`.
pub struct TechnicalPolicy<R> {
    id: PolicyId,
    context: MarketContext,
    rule: R,
}

impl<R: IndicatorRule> TechnicalPolicy<R> {
    pub fn new(id: PolicyId, context: MarketContext, rule: R) -> Self {
        Self { id, context, rule }
    }
}

#[async_trait]
impl<R: IndicatorRule> SignalPolicy for TechnicalPolicy<R> {
    fn id(&self) -> PolicyId {
        self.id
    }

    async fn decide(
        &self,
        symbol: &str,
        open_positions: &BTreeMap<String, Position>,
        current_price: Decimal,
    ) -> PolicyOutcome {
        let indicators = match self.context.indicators(symbol, self.rule.min_bars()).await {
            Ok(indicators) => indicators,
            Err(rationale) => return PolicyOutcome::hold(rationale),
        };
        let Some(price) = current_price.to_f64() else {
            return PolicyOutcome::hold("price not representable");
        };
        self.rule
            .evaluate(open_positions.get(symbol), price, &indicators)
            .with_atr(indicators.get(Indicator::Atr))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use api_client::ApiError;
    use chrono::Utc;
    use core_types::{Kline, Side, Ticker};

    /// A `MarketData` that serves one fixed history for every symbol.
    pub struct FixedHistory {
        pub bars: Vec<Kline>,
        pub fail: bool,
    }

    #[async_trait]
    impl MarketData for FixedHistory {
        async fn latest_price(&self, _symbol: &str) -> Result<Decimal, ApiError> {
            self.bars.last().map(|b| b.close).ok_or_else(|| ApiError::Empty("bars".into()))
        }

        async fn historical_bars(&self, _symbol: &str, _interval: &str, _limit: usize) -> Result<Vec<Kline>, ApiError> {
            if self.fail {
                return Err(ApiError::InvalidData("offline".into()));
            }
            Ok(self.bars.clone())
        }

        async fn all_tickers(&self) -> Result<Vec<Ticker>, ApiError> {
            Ok(Vec::new())
        }
    }

    pub fn context(bars: Vec<Kline>, fail: bool) -> MarketContext {
        MarketContext::new(
            Arc::new(FixedHistory { bars, fail }),
            IndicatorEngine::new(Default::default()).unwrap(),
            "1".to_string(),
            100,
        )
    }

    /// An open position entered at 100 with a 90/110 bracket.
    pub fn position(side: Side) -> Position {
        Position {
            position_id: Default::default(),
            symbol: "BTCUSDT".into(),
            side,
            entry_price: Decimal::from(100),
            size: Decimal::ONE,
            margin: Decimal::from(20),
            stop_loss_price: Decimal::from(90),
            take_profit_price: Decimal::from(110),
            trailing_stop_price: None,
            trail_pct: None,
            opened_at: Utc::now(),
        }
    }

    pub fn set(values: &[(Indicator, f64)]) -> IndicatorSet {
        let mut set = IndicatorSet::default();
        for (k, v) in values {
            set.insert(*k, *v);
        }
        set
    }
}
