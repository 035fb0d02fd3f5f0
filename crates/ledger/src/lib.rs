//! # Ledger Crate
//!
//! The authoritative in-memory account of the virtual trading agent: free
//! margin balance plus the map of open positions.
//!
//! ## Architectural Principles
//!
//! - **State vs. Locking Decoupling:** `LedgerState` is a plain, synchronous
//!   state machine that is trivial to test and property-check. `PositionLedger`
//!   wraps it in one exclusive async lock and adds logging and the pending
//!   trade-log queue.
//! - **Benign Preconditions:** opening an already-open symbol, or opening
//!   without enough balance, returns `false`; closing an absent symbol is a
//!   no-op. Neither is an error for the caller.
//!
//! ## Public API
//!
//! - `PositionLedger`: the shared, locked ledger.
//! - `LedgerState`: the pure state machine behind it.
//! - `LedgerError`: the specific error types that can be returned from this crate.

pub mod error;
pub mod ledger;
pub mod state;

pub use error::LedgerError;
pub use ledger::PositionLedger;
pub use state::{ClosedTrade, LedgerState};
