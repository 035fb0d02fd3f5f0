use crate::enums::{CloseReason, Side, TradeAction};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A single OHLCV bar. Histories are always ordered oldest to newest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// One row of the exchange-wide 24h ticker listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last_price: Decimal,
    pub turnover_24h: Decimal,
    /// Fractional 24h change, e.g. `0.05` for +5%.
    pub price_24h_pcnt: Decimal,
}

/// An open virtual futures position. At most one exists per symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub position_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    /// Quantity in the base asset.
    pub size: Decimal,
    /// Capital taken from the balance when the position was opened.
    pub margin: Decimal,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    /// Only set when the position was opened under a trailing stop policy.
    pub trailing_stop_price: Option<Decimal>,
    pub trail_pct: Option<Decimal>,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Price-move profit or loss if the position were closed at `exit_price`, before fees.
    pub fn gross_pnl(&self, exit_price: Decimal) -> Decimal {
        match self.side {
            Side::Long => (exit_price - self.entry_price) * self.size,
            Side::Short => (self.entry_price - exit_price) * self.size,
        }
    }

    /// Entry plus exit notional, the base the taker fee is charged on.
    pub fn round_trip_notional(&self, exit_price: Decimal) -> Decimal {
        self.entry_price * self.size + exit_price * self.size
    }
}

/// An immutable record appended for every open and close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub position_id: Uuid,
    pub symbol: String,
    pub action: TradeAction,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub margin: Decimal,
    /// Net realized PnL. Always zero for OPEN entries.
    pub pnl: Decimal,
    pub reason: Option<CloseReason>,
}

impl TradeLogEntry {
    pub fn opened(position: &Position) -> Self {
        Self {
            timestamp: position.opened_at,
            position_id: position.position_id,
            symbol: position.symbol.clone(),
            action: TradeAction::Open,
            side: position.side,
            price: position.entry_price,
            size: position.size,
            margin: position.margin,
            pnl: Decimal::ZERO,
            reason: None,
        }
    }

    pub fn closed(
        position: &Position,
        exit_price: Decimal,
        net_pnl: Decimal,
        reason: CloseReason,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            position_id: position.position_id,
            symbol: position.symbol.clone(),
            action: TradeAction::Close,
            side: position.side,
            price: exit_price,
            size: position.size,
            margin: position.margin,
            pnl: net_pnl,
            reason: Some(reason),
        }
    }
}

/// A consistent, point-in-time copy of the ledger: free balance plus every open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub balance: Decimal,
    pub positions: BTreeMap<String, Position>,
}

impl LedgerSnapshot {
    /// Total margin currently locked in open positions.
    pub fn committed_margin(&self) -> Decimal {
        self.positions.values().map(|p| p.margin).sum()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }
}
