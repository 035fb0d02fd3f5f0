//! # Risk
//!
//! Trade-level risk rules: how much margin a new position commits, where its
//! protective levels sit, and when an open position must be force-closed.
//!
//! Everything here is a pure calculation. The ledger calls into this crate
//! while holding its lock, so nothing in it may block or perform I/O.

pub mod error;
pub mod simple_manager;
pub mod triggers;

pub use error::RiskError;
pub use simple_manager::SimpleRiskManager;
pub use triggers::{check_triggers, ratchet_trailing_stop};

use core_types::Side;
use rust_decimal::Decimal;

/// Everything the ledger needs to open a position.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPlan {
    pub margin: Decimal,
    /// Base-asset quantity: `margin * leverage / price`.
    pub size: Decimal,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    pub trailing_stop_price: Option<Decimal>,
    pub trail_pct: Option<Decimal>,
}

/// Sizes new positions and places their protective levels.
pub trait RiskManager: Send + Sync {
    /// The margin a new position would commit at the given free balance.
    fn margin_for(&self, balance: Decimal) -> Decimal;

    /// Plans an entry at `price` given the currently available `balance`.
    ///
    /// `atr` is the latest Average True Range of the symbol, when known. Returns
    /// an error when the entry must not be taken (insufficient balance, invalid
    /// price, or missing volatility for ATR-based stops).
    fn plan_entry(
        &self,
        side: Side,
        price: Decimal,
        balance: Decimal,
        atr: Option<Decimal>,
    ) -> Result<EntryPlan, RiskError>;
}
