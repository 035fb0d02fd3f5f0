pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{CloseReason, Decision, PolicyId, Side, TradeAction};
pub use error::CoreError;
pub use structs::{Kline, LedgerSnapshot, Position, Ticker, TradeLogEntry};
