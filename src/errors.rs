//! Errors for the vessel monitor
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Backend returned status {status} for {url}")]
    BackendStatus { status: u16, url: String },

    #[error("Backend rejected request: {0}")]
    BackendRejected(String),

    #[error("Serialization error")]
    SerdeError(#[from] serde_json::Error),

    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Password hash error")]
    HashError(#[from] bcrypt::BcryptError),
}
