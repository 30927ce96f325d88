//! Ingestion and subscription errors.

use hive_core::ReadingError;
use thiserror::Error;

/// Why a submitted reading was not accepted.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The payload is not a usable JSON object.
    #[error("{0}")]
    Malformed(ReadingError),
    /// Configured required fields are absent or null.
    #[error("Missing required sensor data: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    /// Server-side fault while publishing.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Whether the producer is at fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }

    /// Label for the `readings_rejected_total` counter.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::MissingFields(_) => "missing_fields",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<ReadingError> for IngestError {
    fn from(err: ReadingError) -> Self {
        Self::Malformed(err)
    }
}

/// Why a new subscriber could not join.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscribeError {
    /// The registry already holds the configured maximum.
    #[error("subscriber limit reached ({limit})")]
    AtCapacity {
        /// Configured maximum.
        limit: usize,
    },
}
