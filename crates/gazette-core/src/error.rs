//! Gazette error taxonomy.
//!
//! The pipeline distinguishes failures by what the engine may do next:
//! absorbed (per-category fetch), retryable (delivery, transient HTTP),
//! and fatal (generation, missing configuration). `is_retryable` encodes
//! that split for the scheduler's retry policy.

use thiserror::Error;

/// All Gazette errors.
#[derive(Debug, Error)]
pub enum GazetteError {
    /// Configuration file or value error.
    #[error("Config error: {0}")]
    Config(String),

    /// Required configuration is absent. Fatal and operator-visible;
    /// never retried — must be fixed externally.
    #[error("Missing configuration: {0}")]
    ConfigMissing(String),

    /// A single category fetch failed. Absorbed by the aggregator,
    /// never fatal to a cycle.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// The generation service produced no usable text. Fatal to the
    /// cycle: no delivery, no reschedule.
    #[error("Content generation failed: {0}")]
    Generation(String),

    /// The delivery transport failed. Retried by the engine until
    /// attempts are exhausted.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// The preferences store could not be read. Treated as inactive
    /// (fail-safe skip), not surfaced to the user.
    #[error("Preferences read failed: {0}")]
    Preferences(String),

    /// Local store error.
    #[error("Database error: {0}")]
    Database(String),

    /// Generic HTTP failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GazetteError {
    /// Whether the engine's retry policy applies to this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GazetteError::Delivery(_) | GazetteError::Fetch(_) | GazetteError::Http(_)
        )
    }
}

/// Result type used throughout Gazette.
pub type Result<T> = std::result::Result<T, GazetteError>;
