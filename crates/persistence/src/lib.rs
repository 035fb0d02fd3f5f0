//! # Persistence Crate
//!
//! The durable archive of the virtual trading agent. The in-memory ledger is
//! always authoritative; this crate only snapshots it and reconstructs it at
//! startup.
//!
//! ## Files
//!
//! - `status.json`: `{"margin_balance": ...}`.
//! - `positions.csv`: one row per open position, removed when none are open.
//! - `trade_log.csv`: append-only OPEN/CLOSE history, never read back into the
//!   ledger, only by the `evaluate` report.
//!
//! ## Public API
//!
//! - `StateStore`: load, snapshot and trade-log operations.
//! - `PersistenceError`: the specific error types that can be returned from this crate.

pub mod error;
pub mod store;

pub use error::PersistenceError;
pub use store::StateStore;
