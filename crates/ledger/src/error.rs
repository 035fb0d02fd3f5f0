use risk::RiskError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum LedgerError {
    #[error("A position is already open for symbol: {0}")]
    PositionExists(String),

    #[error("Position not found for symbol: {0}")]
    PositionNotFound(String),

    #[error("Price {price} for {symbol} is zero or negative")]
    InvalidPrice { symbol: String, price: Decimal },

    #[error("Entry rejected by risk rules: {0}")]
    Risk(#[from] RiskError),
}
