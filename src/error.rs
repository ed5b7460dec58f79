use serde::Serialize;
use thiserror::Error;

/// Faults surfaced to callers of the ingestion operations.
///
/// Every failure that crosses the service boundary is classified into one of
/// these two kinds; transport failures never reach the core.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Fault {
    /// Protocol or session-usage error. Nothing is written to any sink.
    #[error("{0}")]
    DataFormat(String),

    /// The sample is semantically invalid. It has been recorded as a reject.
    #[error("{0}")]
    Validation(String),
}

impl Fault {
    pub fn data_format(message: impl Into<String>) -> Self {
        Fault::DataFormat(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Fault::Validation(message.into())
    }

    pub fn message(&self) -> &str {
        match self {
            Fault::DataFormat(m) | Fault::Validation(m) => m,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Fault::Validation(_))
    }
}

