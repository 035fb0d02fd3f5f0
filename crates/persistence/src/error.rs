use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("File I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("An error occurred during JSON serialization/deserialization: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Malformed record in {path} line {line}: {reason}")]
    Malformed { path: String, line: u64, reason: String },
}
