use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use shared::domain::{Session, UserId};
use tracing::info;
use uuid::Uuid;

use super::{AuthProvider, SessionCell, SessionChangeKind, SessionSubscription};
use crate::error::AuthError;

const SESSION_TTL_SECONDS: i64 = 3600;

/// Process-local provider for development and tests.
///
/// With no registered users any non-empty email/password pair signs in.
pub struct InMemoryAuthProvider {
    users: HashMap<String, String>,
    cell: SessionCell,
    fail_session_fetch: AtomicBool,
}

impl Default for InMemoryAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuthProvider {
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
            cell: SessionCell::new(None),
            fail_session_fetch: AtomicBool::new(false),
        }
    }

    pub fn with_user(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.users
            .insert(email.into().trim().to_ascii_lowercase(), password.into());
        self
    }

    /// Starts with an existing session, as if restored from an earlier run.
    pub fn with_session(self, session: Session) -> Self {
        Self {
            cell: SessionCell::new(Some(session)),
            ..self
        }
    }

    /// Makes `current_session` fail until cleared.
    pub fn set_fail_session_fetch(&self, fail: bool) {
        self.fail_session_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self) -> usize {
        self.cell.subscriber_count()
    }

    /// Rotates the tokens of the current session, if any.
    pub async fn refresh(&self) -> Result<Session, AuthError> {
        let current = self.cell.get().await.ok_or(AuthError::NotSignedIn)?;
        let refreshed = issue_session(current.user_id, current.email);
        self.cell
            .replace(SessionChangeKind::TokenRefreshed, Some(refreshed.clone()))
            .await;
        Ok(refreshed)
    }

    fn accepts(&self, email: &str, password: &str) -> bool {
        if email.is_empty() || password.is_empty() {
            return false;
        }
        if self.users.is_empty() {
            return true;
        }
        self.users
            .get(email)
            .is_some_and(|expected| expected == password)
    }
}

fn issue_session(user_id: UserId, email: Option<String>) -> Session {
    Session {
        access_token: Uuid::new_v4().to_string(),
        refresh_token: Uuid::new_v4().to_string(),
        user_id,
        email,
        expires_at: Some(Utc::now() + Duration::seconds(SESSION_TTL_SECONDS)),
    }
}

#[async_trait]
impl AuthProvider for InMemoryAuthProvider {
    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        if self.fail_session_fetch.load(Ordering::SeqCst) {
            return Err(AuthError::Transport(
                "in-memory provider configured to fail".to_string(),
            ));
        }
        Ok(self.cell.get().await)
    }

    fn subscribe(&self) -> SessionSubscription {
        self.cell.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let email = email.trim().to_ascii_lowercase();
        if !self.accepts(&email, password) {
            return Err(AuthError::InvalidCredentials);
        }

        let user_id = UserId(Uuid::new_v5(&Uuid::NAMESPACE_OID, email.as_bytes()).to_string());
        let session = issue_session(user_id, Some(email.clone()));
        self.cell
            .replace(SessionChangeKind::SignedIn, Some(session.clone()))
            .await;
        info!(%email, "signed in");
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if self.cell.get().await.is_none() {
            return Ok(());
        }
        self.cell.replace(SessionChangeKind::SignedOut, None).await;
        info!("signed out");
        Ok(())
    }
}
