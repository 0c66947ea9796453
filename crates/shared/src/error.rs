use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::GENERIC_FAILURE_MESSAGE;

/// Body of every non-2xx response from the remove-background service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}

impl ErrorPayload {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    /// Parses a response body, yielding `None` for anything that is not a
    /// payload with a non-blank `error` string.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        serde_json::from_slice::<Self>(body)
            .ok()
            .filter(|payload| !payload.error.trim().is_empty())
    }

    /// Message to show the user for a failed response body.
    pub fn message_or_generic(body: &[u8]) -> String {
        Self::from_body(body)
            .map(|payload| payload.error)
            .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string())
    }
}

#[derive(Debug, Error)]
#[error("{status}: {message}")]
pub struct ServiceException {
    pub status: u16,
    pub message: String,
}

impl ServiceException {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ServiceException> for ErrorPayload {
    fn from(value: ServiceException) -> Self {
        Self {
            error: value.message,
        }
    }
}
