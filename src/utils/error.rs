use std::time::Duration;

use thiserror::Error;

/// Failure raised by a provider while obtaining raw content.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to spawn command '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command exited with {code:?}: {stderr}")]
    ProcessExit { code: Option<i32>, stderr: String },

    #[error("Invalid fetch target: {0}")]
    InvalidTarget(String),
}

impl ProviderError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Network(_) | ProviderError::Timeout(_) | ProviderError::HttpStatus { .. }
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Network(err.to_string())
    }
}

/// Content was fetched but no price could be read from it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("Invalid CSS selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Element not found: {selector}")]
    NoMatch { selector: String },

    #[error("Attribute '{attr}' missing on element matched by {selector}")]
    MissingAttribute { selector: String, attr: String },

    #[error("Invalid cleanup pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("No parseable number in '{text}'")]
    NoNumber { text: String },

    #[error("Price must be positive, got {0}")]
    NonPositive(f64),

    #[error("Malformed command output: {0}")]
    MalformedOutput(String),

    #[error("Command output has no numeric price field")]
    MissingPrice,

    #[error("Currency mismatch: item tracks {expected}, source reported {found}")]
    CurrencyMismatch { expected: String, found: String },
}

/// Outcome of the resilience layer when a sample could not be produced.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Fetch failed: {0}")]
    Provider(#[source] ProviderError),

    #[error("Extraction failed: {0}")]
    PermanentExtraction(#[from] ExtractionError),

    #[error("Fetch exhausted after {attempts} attempts: {last_cause}")]
    Exhausted {
        attempts: u32,
        #[source]
        last_cause: ProviderError,
    },

    #[error("Fetch cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid sample: {0}")]
    InvalidSample(String),
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{channel} returned status {status}")]
    Status { channel: String, status: u16 },

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("Channel misconfigured: {0}")]
    Misconfigured(String),
}

/// Item-level failure reported by the tracker.
#[derive(Error, Debug)]
pub enum TrackError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Not found: {resource}")]
    NotFound { resource: String },
}

pub type Result<T> = std::result::Result<T, AppError>;
