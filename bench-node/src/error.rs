use thiserror::Error;

/// Errors that can occur in the benchmark harness library
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend construction or run setup error
    #[error("Setup error: {0}")]
    Setup(String),

    /// A create failed while converging the collection population
    #[error("Population error: {0}")]
    Population(String),

    /// A timed operation failed mid-measurement
    #[error("Measurement error: {0}")]
    Measurement(String),

    /// The collection already holds more objects than the requested target
    #[error("Collection already holds {found} objects, want {want}")]
    Consistency { want: usize, found: usize },

    /// The target API answered with a non-success status
    #[error("API error: status {status}: {body}")]
    Api { status: u16, body: String },

    /// HTTP transport error
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Network I/O error
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A concurrent worker task failed to complete
    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Result type alias using HarnessError
pub type Result<T> = std::result::Result<T, HarnessError>;

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        HarnessError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for HarnessError {
    fn from(err: serde_yaml::Error) -> Self {
        HarnessError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for HarnessError {
    fn from(err: tokio::task::JoinError) -> Self {
        HarnessError::Worker(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for HarnessError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        HarnessError::Timeout("deadline elapsed".to_string())
    }
}
