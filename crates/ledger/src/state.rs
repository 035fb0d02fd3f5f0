use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use core_types::{CloseReason, LedgerSnapshot, Position, Side, TradeLogEntry};
use risk::{RiskManager, check_triggers, ratchet_trailing_stop};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// The outcome of closing one position.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub gross_pnl: Decimal,
    pub fee: Decimal,
    /// `gross_pnl - fee`, credited to the balance together with the margin.
    pub net_pnl: Decimal,
    pub log_entry: TradeLogEntry,
}

/// The balance and open-position map as one consistency unit.
///
/// This is a plain state machine with no locking. Each symbol moves
/// `ABSENT -> OPEN -> ABSENT`; an open while OPEN is rejected and a close while
/// ABSENT is a no-op. `PositionLedger` wraps it in the lock.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerState {
    pub balance: Decimal,
    pub positions: BTreeMap<String, Position>,
}

impl LedgerState {
    pub fn new(initial_balance: Decimal) -> Self {
        Self { balance: initial_balance, positions: BTreeMap::new() }
    }

    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self { balance: snapshot.balance, positions: snapshot.positions }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot { balance: self.balance, positions: self.positions.clone() }
    }

    /// Opens a position sized and bracketed by `risk`, debiting its margin.
    ///
    /// State is unchanged on any error.
    pub fn open(
        &mut self,
        risk: &dyn RiskManager,
        symbol: &str,
        side: Side,
        price: Decimal,
        atr: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<TradeLogEntry, LedgerError> {
        if self.positions.contains_key(symbol) {
            return Err(LedgerError::PositionExists(symbol.to_string()));
        }
        if price <= Decimal::ZERO {
            return Err(LedgerError::InvalidPrice { symbol: symbol.to_string(), price });
        }

        let plan = risk.plan_entry(side, price, self.balance, atr)?;

        let position = Position {
            position_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            entry_price: price,
            size: plan.size,
            margin: plan.margin,
            stop_loss_price: plan.stop_loss_price,
            take_profit_price: plan.take_profit_price,
            trailing_stop_price: plan.trailing_stop_price,
            trail_pct: plan.trail_pct,
            opened_at: now,
        };

        self.balance -= plan.margin;
        let entry = TradeLogEntry::opened(&position);
        self.positions.insert(symbol.to_string(), position);
        Ok(entry)
    }

    /// Closes the position on `symbol` at `price`, crediting margin plus net PnL.
    ///
    /// Returns `Ok(None)` when no position is open, so repeated closes never double-credit.
    pub fn close(
        &mut self,
        symbol: &str,
        price: Decimal,
        reason: CloseReason,
        taker_fee_rate: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<ClosedTrade>, LedgerError> {
        if !self.positions.contains_key(symbol) {
            return Ok(None);
        }
        if price <= Decimal::ZERO {
            return Err(LedgerError::InvalidPrice { symbol: symbol.to_string(), price });
        }
        let Some(position) = self.positions.remove(symbol) else {
            return Ok(None);
        };

        let gross_pnl = position.gross_pnl(price);
        let fee = position.round_trip_notional(price) * taker_fee_rate;
        let net_pnl = gross_pnl - fee;

        self.balance += position.margin + net_pnl;

        Ok(Some(ClosedTrade {
            gross_pnl,
            fee,
            net_pnl,
            log_entry: TradeLogEntry::closed(&position, price, net_pnl, reason, now),
        }))
    }

    /// Ratchets trailing stops, then closes every position whose stop-loss,
    /// trailing stop or take-profit is hit at the supplied price.
    ///
    /// Symbols missing from `prices` are skipped this pass.
    pub fn evaluate_triggers(
        &mut self,
        prices: &HashMap<String, Decimal>,
        taker_fee_rate: Decimal,
        now: DateTime<Utc>,
    ) -> Vec<(String, CloseReason, ClosedTrade)> {
        let mut fired = Vec::new();
        for (symbol, position) in self.positions.iter_mut() {
            let Some(price) = prices.get(symbol).copied() else { continue };
            if price <= Decimal::ZERO {
                continue;
            }
            ratchet_trailing_stop(position, price);
            if let Some(reason) = check_triggers(position, price) {
                fired.push((symbol.clone(), reason, price));
            }
        }

        let mut closed = Vec::with_capacity(fired.len());
        for (symbol, reason, price) in fired {
            if let Ok(Some(trade)) = self.close(&symbol, price, reason, taker_fee_rate, now) {
                closed.push((symbol, reason, trade));
            }
        }
        closed
    }
}
