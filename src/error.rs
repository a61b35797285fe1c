//! Error types for chaos-harness
//!
//! Expected experiment outcomes (abort, failed post-check, fail-closed
//! evaluation) are not errors. They are reported through
//! [`ExperimentLog`](crate::experiment::ExperimentLog). The variants below
//! cover configuration, collaborator and storage failures.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// chaos-harness error types
#[derive(Error, Debug)]
pub enum Error {
    /// Experiment configuration rejected at construction time
    #[error("Invalid experiment configuration: {0}")]
    InvalidConfig(String),

    /// Metrics collaborator failed to answer a query
    #[error("Metric query failed for '{query}': {reason}")]
    MetricQuery {
        /// Query string sent to the metrics backend
        query: String,
        /// Backend-reported failure
        reason: String,
    },

    /// Injection backend failed to inject or stop a fault
    #[error("Fault backend '{kind}' failed: {reason}")]
    Injection {
        /// Fault kind served by the backend
        kind: String,
        /// Backend-reported failure
        reason: String,
    },

    /// Circuit state store could not be read or written
    #[error("Circuit state store error: {0}")]
    StoreError(String),

    /// Blast-radius guard refused admission
    #[error("Experiment rejected by blast-radius guard: {0}")]
    AdmissionDenied(String),

    /// Illegal experiment state transition
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state
        from: String,
        /// Requested state
        to: String,
    },

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Opaque error raised by an external collaborator adapter
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
