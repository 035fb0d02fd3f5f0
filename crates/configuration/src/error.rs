use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from file: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),

    #[error("Required secret '{0}' is not set in the environment")]
    MissingSecret(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}
