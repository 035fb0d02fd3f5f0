use crate::state::{ClosedTrade, LedgerState};
use chrono::Utc;
use core_types::{CloseReason, LedgerSnapshot, Side, TradeLogEntry};
use risk::RiskManager;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

struct Inner {
    state: LedgerState,
    /// Trade log entries not yet handed to persistence.
    pending_log: Vec<TradeLogEntry>,
}

/// The authoritative, shareable ledger of virtual balance and open positions.
///
/// Every mutation runs under one exclusive lock that is held only for the
/// in-memory mutation itself. Callers fetch prices before calling in; nothing
/// here awaits I/O while the lock is held.
pub struct PositionLedger {
    inner: Mutex<Inner>,
    risk: Arc<dyn RiskManager>,
    taker_fee_rate: Decimal,
}

impl PositionLedger {
    pub fn new(state: LedgerState, risk: Arc<dyn RiskManager>, taker_fee_rate: Decimal) -> Self {
        Self {
            inner: Mutex::new(Inner { state, pending_log: Vec::new() }),
            risk,
            taker_fee_rate,
        }
    }

    /// Opens a position on `symbol`. Returns `false`, leaving state untouched,
    /// when a position already exists or the risk rules reject the entry.
    pub async fn open(&self, symbol: &str, side: Side, price: Decimal, atr: Option<Decimal>) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.state.open(self.risk.as_ref(), symbol, side, price, atr, Utc::now()) {
            Ok(entry) => {
                tracing::info!(
                    symbol,
                    %side,
                    price = %entry.price,
                    size = %entry.size,
                    margin = %entry.margin,
                    balance = %inner.state.balance,
                    "Opened position"
                );
                inner.pending_log.push(entry);
                true
            }
            Err(e) => {
                tracing::info!(symbol, %side, %price, reason = %e, "Open rejected");
                false
            }
        }
    }

    /// Closes the position on `symbol` and returns its net PnL, or `None` when
    /// nothing was open.
    pub async fn close(&self, symbol: &str, price: Decimal, reason: CloseReason) -> Option<Decimal> {
        let mut inner = self.inner.lock().await;
        let closed = inner.state.close(symbol, price, reason, self.taker_fee_rate, Utc::now());
        match closed {
            Ok(Some(trade)) => {
                let net = trade.net_pnl;
                Self::record_close(&mut inner, symbol, reason, trade);
                Some(net)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Close rejected");
                None
            }
        }
    }

    /// Runs one full risk pass over all open positions with pre-fetched prices.
    ///
    /// The whole pass happens under a single lock acquisition, so no open or
    /// close can interleave with a symbol's check-then-close.
    pub async fn evaluate_risk_triggers(&self, prices: &HashMap<String, Decimal>) -> Vec<(String, CloseReason)> {
        let mut inner = self.inner.lock().await;
        let closed = inner.state.evaluate_triggers(prices, self.taker_fee_rate, Utc::now());
        closed
            .into_iter()
            .map(|(symbol, reason, trade)| {
                Self::record_close(&mut inner, &symbol, reason, trade);
                (symbol, reason)
            })
            .collect()
    }

    /// Closes every open position that has a price in `prices`. Positions
    /// without a price stay open and are persisted as such.
    pub async fn close_all(&self, prices: &HashMap<String, Decimal>, reason: CloseReason) -> Vec<(String, Decimal)> {
        let mut inner = self.inner.lock().await;
        let symbols: Vec<String> = inner.state.positions.keys().cloned().collect();
        let mut closed = Vec::new();
        for symbol in symbols {
            let Some(price) = prices.get(&symbol).copied() else {
                tracing::warn!(%symbol, "No price available, position left open");
                continue;
            };
            if let Ok(Some(trade)) = inner.state.close(&symbol, price, reason, self.taker_fee_rate, Utc::now()) {
                let net = trade.net_pnl;
                Self::record_close(&mut inner, &symbol, reason, trade);
                closed.push((symbol, net));
            }
        }
        closed
    }

    fn record_close(inner: &mut Inner, symbol: &str, reason: CloseReason, trade: ClosedTrade) {
        tracing::info!(
            symbol,
            %reason,
            exit = %trade.log_entry.price,
            gross = %trade.gross_pnl,
            fee = %trade.fee,
            net = %trade.net_pnl,
            balance = %inner.state.balance,
            "Closed position"
        );
        inner.pending_log.push(trade.log_entry);
    }

    /// A consistent point-in-time copy of balance and positions.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.inner.lock().await.state.snapshot()
    }

    pub async fn balance(&self) -> Decimal {
        self.inner.lock().await.state.balance
    }

    /// Whether the free balance covers the margin of one more position.
    pub async fn can_afford_entry(&self) -> bool {
        let balance = self.inner.lock().await.state.balance;
        balance >= self.risk.margin_for(balance)
    }

    pub async fn open_count(&self) -> usize {
        self.inner.lock().await.state.positions.len()
    }

    /// Drains trade log entries recorded since the last call.
    pub async fn take_pending_log(&self) -> Vec<TradeLogEntry> {
        std::mem::take(&mut self.inner.lock().await.pending_log)
    }

    /// Puts entries that failed to persist back in front of the queue.
    pub async fn requeue_log(&self, mut entries: Vec<TradeLogEntry>) {
        let mut inner = self.inner.lock().await;
        entries.append(&mut inner.pending_log);
        inner.pending_log = entries;
    }
}
