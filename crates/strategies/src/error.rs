use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Policy received invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("An error occurred during indicator calculation: {0}")]
    IndicatorError(String),

    #[error("Policy '{0}' requires a collaborator that was not provided: {1}")]
    MissingDependency(String, String),
}
