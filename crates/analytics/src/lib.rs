//! # Analytics Engine
//!
//! This crate judges how the virtual agent has actually performed, using the
//! append-only trade log as its only input.
//!
//! ## Architectural Principles
//!
//! - **Pure logic:** It depends only on `core-types`. Reading the log from disk
//!   and printing the result are left to the caller.
//! - **Stateless Calculation:** The `AnalyticsEngine` takes trade log entries
//!   and produces a `PerformanceReport`, including a plain-language
//!   `Recommendation` on whether the configuration is worth pursuing.
//!
//! ## Public API
//!
//! - `AnalyticsEngine`: The main struct that contains the calculation logic.
//! - `PerformanceReport`: The standardized struct that holds all performance metrics.
//! - `Recommendation`: The verdict derived from the report.
//! - `AnalyticsError`: The specific error types that can be returned from this crate.

pub mod engine;
pub mod error;
pub mod report;

pub use engine::AnalyticsEngine;
pub use error::AnalyticsError;
pub use report::{PerformanceReport, Recommendation};
