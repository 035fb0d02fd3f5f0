use crate::error::AnalyticsError;
use crate::report::{PerformanceReport, Recommendation};
use chrono::{DateTime, Utc};
use core_types::{TradeAction, TradeLogEntry};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use uuid::Uuid;

/// Gross loss is floored at this value so the profit factor stays finite.
const GROSS_LOSS_FLOOR: Decimal = dec!(0.001);
const MIN_VIABLE_WIN_RATE_PCT: Decimal = dec!(45);
const MIN_PROFIT_FACTOR: Decimal = dec!(1.2);

/// A stateless calculator for deriving performance metrics from the trade log.
#[derive(Debug, Default)]
pub struct AnalyticsEngine {}

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The main entry point for calculating performance metrics.
    ///
    /// # Arguments
    ///
    /// * `entries` - Every OPEN and CLOSE record of the trade log, in any order.
    /// * `initial_balance` - The balance the realized curve starts from.
    pub fn calculate(
        &self,
        entries: &[TradeLogEntry],
        initial_balance: Decimal,
    ) -> Result<PerformanceReport, AnalyticsError> {
        let mut report = PerformanceReport::new();

        let mut closes: Vec<&TradeLogEntry> =
            entries.iter().filter(|e| e.action == TradeAction::Close).collect();
        if closes.is_empty() {
            return Ok(report);
        }
        closes.sort_by_key(|e| e.timestamp);

        self.calculate_profitability(&closes, &mut report)?;
        self.calculate_drawdown(&closes, initial_balance, &mut report);
        self.calculate_time_metrics(entries, &closes, &mut report);
        report.recommendation = Self::recommend(&report);

        Ok(report)
    }

    fn calculate_profitability(
        &self,
        closes: &[&TradeLogEntry],
        report: &mut PerformanceReport,
    ) -> Result<(), AnalyticsError> {
        report.total_trades = closes.len();
        report.max_win = closes.iter().map(|e| e.pnl).max().unwrap_or_default();
        report.max_loss = closes.iter().map(|e| e.pnl).min().unwrap_or_default();

        for entry in closes {
            report.total_net_pnl += entry.pnl;
            if entry.pnl > Decimal::ZERO {
                report.gross_profit += entry.pnl;
                report.winning_trades += 1;
            } else {
                report.gross_loss += entry.pnl.abs();
                report.losing_trades += 1;
            }
        }

        let total = Decimal::from(report.total_trades);
        if total.is_zero() {
            return Err(AnalyticsError::NotEnoughData("no closed trades".to_string()));
        }
        report.average_pnl = report.total_net_pnl / total;
        report.win_rate_pct = Some(Decimal::from(report.winning_trades) / total * dec!(100));
        report.profit_factor = report.gross_profit / report.gross_loss.max(GROSS_LOSS_FLOOR);

        if report.winning_trades > 0 {
            report.average_win = report.gross_profit / Decimal::from(report.winning_trades);
        }
        if report.losing_trades > 0 {
            report.average_loss = report.gross_loss / Decimal::from(report.losing_trades);
        }
        Ok(())
    }

    /// Maximum drawdown of the realized balance: initial balance plus cumulative net PnL.
    fn calculate_drawdown(&self, closes: &[&TradeLogEntry], initial_balance: Decimal, report: &mut PerformanceReport) {
        let mut balance = initial_balance;
        let mut peak = initial_balance;
        let mut max_drawdown = Decimal::ZERO;
        let mut peak_at_max = initial_balance;

        for entry in closes {
            balance += entry.pnl;
            if balance > peak {
                peak = balance;
            }
            let drawdown = peak - balance;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
                peak_at_max = peak;
            }
        }

        report.max_drawdown = max_drawdown;
        if peak_at_max > Decimal::ZERO {
            report.max_drawdown_pct = max_drawdown / peak_at_max * dec!(100);
        }
    }

    /// Pairs each CLOSE with its OPEN through `position_id`.
    fn calculate_time_metrics(&self, entries: &[TradeLogEntry], closes: &[&TradeLogEntry], report: &mut PerformanceReport) {
        let opens: HashMap<Uuid, DateTime<Utc>> = entries
            .iter()
            .filter(|e| e.action == TradeAction::Open)
            .map(|e| (e.position_id, e.timestamp))
            .collect();

        let durations: Vec<i64> = closes
            .iter()
            .filter_map(|close| opens.get(&close.position_id).map(|open| (close.timestamp - *open).num_seconds()))
            .collect();

        if !durations.is_empty() {
            report.average_holding_secs = Some(durations.iter().sum::<i64>() / durations.len() as i64);
        } else {
            tracing::debug!("No CLOSE entry could be paired with its OPEN entry");
        }
    }

    fn recommend(report: &PerformanceReport) -> Recommendation {
        let Some(win_rate) = report.win_rate_pct else {
            return Recommendation::NoData;
        };
        if win_rate < MIN_VIABLE_WIN_RATE_PCT {
            Recommendation::NotViable
        } else if report.average_pnl < Decimal::ZERO {
            Recommendation::WidenRewardRatio
        } else if report.profit_factor < MIN_PROFIT_FACTOR {
            Recommendation::CollectMoreData
        } else {
            Recommendation::Promising
        }
    }
}
