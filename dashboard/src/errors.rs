use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Broker replied {status} (rsc {rsc}) for {address}")]
    Status {
        address: String,
        status: u16,
        rsc: String,
    },

    #[error("Request to {address} timed out after {timeout:?}")]
    Timeout { address: String, timeout: Duration },

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The broker already holds a resource with the requested name.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Status { status: 409, .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
