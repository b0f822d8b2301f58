use thiserror::Error;

use tatsahay_shared::ValidationError;

/// Failures of the media store. Transient from the pipeline's point of
/// view: the user may resubmit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Empty media payload")]
    Empty,

    #[error("Unsupported content type: {0}")]
    UnsupportedType(String),

    #[error("Media too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Media upload timed out")]
    Timeout,

    #[error("Media not found: {0}")]
    NotFound(String),

    #[error("Media storage error: {0}")]
    Storage(String),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Session is still loading")]
    SessionLoading,
}

/// Why a submission attempt ended in `Failed`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Media upload failed: {0}")]
    MediaUpload(#[from] MediaError),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl FailureReason {
    /// Stable machine-readable code for the presentation layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::MediaUpload(_) => "media_upload",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Store(_) => "store",
        }
    }

    /// Whether resubmitting the same input can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation(_))
    }
}
