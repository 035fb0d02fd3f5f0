use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RiskError {
    #[error("Risk parameters from configuration are invalid: {0}")]
    InvalidParameters(String),

    #[error("Insufficient balance ({balance}) to commit the required margin ({required}).")]
    InsufficientBalance { balance: Decimal, required: Decimal },

    #[error("Calculated stop-loss price is invalid: {0}")]
    InvalidStopLoss(String),

    #[error("The provided entry price ({0}) is zero or negative.")]
    InvalidEntryPrice(Decimal),

    #[error("ATR-based stops need a positive ATR, got {0:?}")]
    MissingAtr(Option<Decimal>),

    #[error("A calculation error occurred: {0}")]
    Calculation(String),
}
