//! Crate-wide error taxonomy.
//!
//! Hard failures only: every variant here is detected before any external
//! command has been queued for execution. Anomalies that can only be observed
//! after execution (patch conflicts, truncated transcripts, unrecognized
//! runner output) are represented as report data in [`crate::log_parser`],
//! never as errors, so partial results stay inspectable.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No spec is registered for the (repository, version) pair.
    #[error("no spec registered for {repo}@{version}")]
    SpecNotFound { repo: String, version: String },

    /// The test patch could not be parsed as a sequence of file headers.
    #[error("malformed diff: {0}")]
    MalformedDiff(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn malformed_diff(msg: impl Into<String>) -> Self {
        Self::MalformedDiff(msg.into())
    }

    pub fn spec_not_found(repo: impl Into<String>, version: impl Into<String>) -> Self {
        Self::SpecNotFound {
            repo: repo.into(),
            version: version.into(),
        }
    }
}
