use std::time::Duration;

use shared::{
    domain::FailureKind,
    protocol::{GENERIC_FAILURE_MESSAGE, TIMEOUT_FAILURE_MESSAGE},
};
use thiserror::Error;

/// Rejected workflow actions. The state is never changed when one of these is
/// returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("no image selected")]
    NoImageSelected,
    #[error("a background removal request is already in flight")]
    AlreadyProcessing,
    #[error("no processed image available to download")]
    NothingToDownload,
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Outcome of a failed round trip to the remote processor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("processor rejected image ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("processor returned an empty image")]
    EmptyResponse,
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl ProcessError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport(_) => FailureKind::Upload,
            Self::Rejected { .. } | Self::EmptyResponse => FailureKind::Processing,
            Self::Timeout(_) => FailureKind::Timeout,
        }
    }

    /// Text shown in the error panel.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } => message.clone(),
            Self::Timeout(_) => TIMEOUT_FAILURE_MESSAGE.to_string(),
            Self::Transport(_) | Self::EmptyResponse => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid login credentials")]
    InvalidCredentials,
    #[error("not signed in")]
    NotSignedIn,
    #[error("auth provider unreachable: {0}")]
    Transport(String),
    #[error("auth provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("session storage failure: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}
