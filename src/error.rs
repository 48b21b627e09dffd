use thiserror::Error;

use crate::data::types::ReportKey;

/// Errors surfaced by the observation pipeline.
#[derive(Debug, Error)]
pub enum CobaltError {
    /// The metric/report pairing is not supported. Raised before any
    /// aggregate row is read or mutated.
    #[error("invalid report {report}: {reason}")]
    Validation { report: ReportKey, reason: String },

    /// Unknown report, metric or time zone.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Fatal to the cycle, nothing is committed.
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    /// Wire types could not be sized or encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl CobaltError {
    pub fn validation(report: ReportKey, reason: impl Into<String>) -> Self {
        Self::Validation {
            report,
            reason: reason.into(),
        }
    }

    /// Whether the cycle treats this error as an upload failure rather than
    /// aborting.
    pub fn is_upload_failure(&self) -> bool {
        matches!(self, Self::Encryption(_) | Self::Upload(_))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("failed to encrypt observation: {0}")]
    Observation(String),

    #[error("failed to encrypt envelope: {0}")]
    Envelope(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("upload failed: {0}")]
    Failed(String),

    #[error("upload timed out after {0:?}")]
    TimedOut(std::time::Duration),
}
