use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// The trade log holds nothing the requested metric can be computed from.
    #[error("Not enough trade log data: {0}")]
    NotEnoughData(String),
}
