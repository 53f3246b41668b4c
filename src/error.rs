use thiserror::Error;

/// Upload size ceiling (10 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Everything that can end a detection cycle early.
///
/// All variants carry owned strings so the error can sit in UI state and
/// travel back from the prediction worker.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectError {
    #[error("please select a valid image file (got {media_type})")]
    InvalidFileType { media_type: String },

    #[error("file size must be less than 10MB ({size} bytes given)")]
    FileTooLarge { size: u64 },

    #[error("camera is not available: {0}. Make sure a camera is connected and accessible")]
    CameraUnavailable(String),

    #[error("failed to capture photo: {0}")]
    CaptureFailed(String),

    #[error("cannot connect to backend at {url}. Make sure the prediction server is running")]
    BackendUnreachable { url: String },

    #[error("{0}")]
    PredictionFailed(String),

    #[error("malformed response")]
    MalformedResponse,

    #[error("cannot read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: &'static str,
    },
}

impl DetectError {
    /// True for failures raised before anything was sent to the backend.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DetectError::InvalidFileType { .. } | DetectError::FileTooLarge { .. }
        )
    }
}
