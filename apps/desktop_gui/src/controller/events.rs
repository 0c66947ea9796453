//! UI/backend events and error modeling for desktop GUI controller.

use std::path::PathBuf;

use client_core::{AuthError, ProcessError, ProcessedImage, SelectedImage, WorkflowError};
use shared::{domain::Session, protocol::HealthResponse};

use crate::controller::selection::LoadToken;

pub enum UiEvent {
    Error(UiError),
    SessionFetched(Result<Option<Session>, AuthError>),
    SignInFinished(Result<(), AuthError>),
    SignOutFinished(Result<(), AuthError>),
    ImageLoaded {
        token: LoadToken,
        result: Result<SelectedImage, WorkflowError>,
    },
    ProcessingFinished {
        generation: u64,
        outcome: Result<ProcessedImage, ProcessError>,
    },
    ResultSaved(PathBuf),
    HealthChecked(Result<HealthResponse, ProcessError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Auth,
    Transport,
    Validation,
    Storage,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    SignIn,
    SignOut,
    LoadImage,
    SaveResult,
}

/// Text shown under the sign-in form for a failed attempt.
pub fn classify_sign_in_failure(err: &AuthError) -> String {
    match err {
        AuthError::InvalidCredentials => "Invalid email or password.".to_string(),
        AuthError::Transport(_) => {
            "Auth service unreachable; check URL/network and retry sign-in.".to_string()
        }
        AuthError::Storage(detail) => format!("Signed in, but the session could not be saved: {detail}"),
        AuthError::Rejected { message, .. } => format!("Sign-in rejected: {message}"),
        AuthError::NotSignedIn => "Sign-in did not produce a session; retry.".to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("401")
            || message_lower.contains("403")
            || message_lower.contains("unauthorized")
            || message_lower.contains("session expired")
            || message_lower.contains("invalid login")
        {
            UiErrorCategory::Auth
        } else if message_lower.contains("invalid image")
            || message_lower.contains("not an image")
            || message_lower.contains("is empty")
            || message_lower.contains("the limit is")
        {
            UiErrorCategory::Validation
        } else if message_lower.contains("permission denied")
            || message_lower.contains("read-only")
            || message_lower.contains("no space")
            || message_lower.contains("storage")
        {
            UiErrorCategory::Storage
        } else if message_lower.contains("timed out")
            || message_lower.contains("connection")
            || message_lower.contains("unreachable")
            || message_lower.contains("transport")
            || message_lower.contains("disconnected")
        {
            UiErrorCategory::Transport
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    pub fn from_auth(context: UiErrorContext, err: &AuthError) -> Self {
        let category = match err {
            AuthError::InvalidCredentials | AuthError::NotSignedIn | AuthError::Rejected { .. } => {
                UiErrorCategory::Auth
            }
            AuthError::Transport(_) => UiErrorCategory::Transport,
            AuthError::Storage(_) => UiErrorCategory::Storage,
        };
        Self {
            category,
            context,
            message: err.to_string(),
        }
    }

    pub fn requires_reauth(&self) -> bool {
        self.category == UiErrorCategory::Auth
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
#[path = "tests/events_tests.rs"]
mod tests;
