use serde::Serialize;
use thiserror::Error;

/// Failure taxonomy for the capture/translate loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslateError {
    #[error("camera access denied: {0}")]
    Permission(String),
    #[error("frame could not be encoded: {0}")]
    Encode(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("analyze request rejected ({status}): {body}")]
    RemoteRejected { status: u16, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Permission,
    Encode,
    Network,
    RemoteRejected,
}

/// Error as exposed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl TranslateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranslateError::Permission(_) => ErrorKind::Permission,
            TranslateError::Encode(_) => ErrorKind::Encode,
            TranslateError::Network(_) => ErrorKind::Network,
            TranslateError::RemoteRejected { .. } => ErrorKind::RemoteRejected,
        }
    }

    /// Encode failures skip a cycle; everything else is shown to the user.
    pub fn is_transient(&self) -> bool {
        matches!(self, TranslateError::Encode(_))
    }

    pub fn info(&self) -> ErrorInfo {
        ErrorInfo {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}
