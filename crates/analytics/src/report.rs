use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The verdict drawn from a `PerformanceReport`, checked in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// No closed trades yet.
    NoData,
    /// Win rate below 45%.
    NotViable,
    /// Wins happen often enough but losers outweigh them on average.
    WidenRewardRatio,
    /// Profitable but with a profit factor below 1.2.
    CollectMoreData,
    Promising,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Recommendation::NoData => "No closed trades yet. Let the agent run longer.",
            Recommendation::NotViable => "Win rate is too low. This configuration is not viable.",
            Recommendation::WidenRewardRatio => {
                "Average trade loses money. Widen the take-profit to stop-loss ratio."
            }
            Recommendation::CollectMoreData => "Marginal edge. Collect more data before trusting it.",
            Recommendation::Promising => "Promising results. Keep collecting data to confirm.",
        };
        f.write_str(text)
    }
}

/// Performance of the agent computed from its closed trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    // I. Core Profitability Metrics
    pub total_net_pnl: Decimal,
    pub average_pnl: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    /// Gross profit over gross loss, with the loss floored at 0.001.
    pub profit_factor: Decimal,

    // II. Risk and Drawdown
    /// Largest peak-to-trough fall of the realized balance curve.
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: Decimal,

    // III. Trade-Level Statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate_pct: Option<Decimal>, // None with 0 trades
    pub average_win: Decimal,
    pub average_loss: Decimal,
    pub max_win: Decimal,
    pub max_loss: Decimal,

    // IV. Time-Based Metrics
    /// Mean OPEN-to-CLOSE time in seconds over trades whose OPEN entry was found.
    pub average_holding_secs: Option<i64>,

    pub recommendation: Recommendation,
}

impl PerformanceReport {
    /// Creates a new, zeroed-out PerformanceReport.
    pub fn new() -> Self {
        Self {
            total_net_pnl: Decimal::ZERO,
            average_pnl: Decimal::ZERO,
            gross_profit: Decimal::ZERO,
            gross_loss: Decimal::ZERO,
            profit_factor: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
            max_drawdown_pct: Decimal::ZERO,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate_pct: None,
            average_win: Decimal::ZERO,
            average_loss: Decimal::ZERO,
            max_win: Decimal::ZERO,
            max_loss: Decimal::ZERO,
            average_holding_secs: None,
            recommendation: Recommendation::NoData,
        }
    }
}

impl Default for PerformanceReport {
    fn default() -> Self {
        Self::new()
    }
}
