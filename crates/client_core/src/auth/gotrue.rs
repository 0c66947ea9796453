use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use shared::domain::{Session, UserId};
use tracing::{info, warn};
use url::Url;

use super::{AuthProvider, SessionCell, SessionChangeKind, SessionFileStore, SessionSubscription};
use crate::error::AuthError;

const AUTH_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(20);
/// Sessions this close to expiry are refreshed before being handed out.
const EXPIRY_MARGIN_SECONDS: i64 = 30;

#[derive(Debug, Serialize)]
struct PasswordGrantRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshGrantRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GoTrueErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl GoTrueErrorBody {
    fn is_invalid_credentials(&self) -> bool {
        self.error_code.as_deref() == Some("invalid_credentials")
            || self.error.as_deref() == Some("invalid_grant")
    }

    fn message(self, status: StatusCode) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .unwrap_or_else(|| status.to_string())
    }
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + Duration::seconds(secs))
            });
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user_id: UserId(self.user.id),
            email: self.user.email,
            expires_at,
        }
    }
}

/// Supabase/GoTrue-compatible password auth over REST.
pub struct GoTrueAuthProvider {
    http: Client,
    auth_url: Url,
    anon_key: String,
    cell: SessionCell,
    store: Option<SessionFileStore>,
}

impl GoTrueAuthProvider {
    pub fn new(project_url: &str, anon_key: impl Into<String>) -> Result<Self> {
        let mut base = Url::parse(project_url.trim())
            .with_context(|| format!("invalid auth url '{project_url}'"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let auth_url = base.join("auth/v1/").context("failed to build auth url")?;
        let http = Client::builder()
            .timeout(AUTH_REQUEST_TIMEOUT)
            .build()
            .context("failed to build auth http client")?;
        Ok(Self {
            http,
            auth_url,
            anon_key: anon_key.into(),
            cell: SessionCell::new(None),
            store: None,
        })
    }

    /// Persists sessions in `store` and restores the one saved there.
    pub fn with_store(self, store: SessionFileStore) -> Self {
        let restored = match store.load() {
            Ok(session) => session,
            Err(err) => {
                warn!(path = %store.path().display(), error = %err, "ignoring unreadable session file");
                None
            }
        };
        Self {
            cell: SessionCell::new(restored),
            store: Some(store),
            ..self
        }
    }

    /// Exchanges the refresh token for a new session and notifies subscribers.
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let current = self.cell.get().await.ok_or(AuthError::NotSignedIn)?;
        let response = self
            .http
            .post(self.endpoint("token")?)
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.anon_key)
            .json(&RefreshGrantRequest {
                refresh_token: &current.refresh_token,
            })
            .send()
            .await?;
        let session = Self::parse_token_response(response).await?;
        self.persist(Some(&session));
        self.cell
            .replace(SessionChangeKind::TokenRefreshed, Some(session.clone()))
            .await;
        info!(user_id = %session.user_id, "session refreshed");
        Ok(session)
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        self.auth_url
            .join(path)
            .map_err(|err| AuthError::Transport(err.to_string()))
    }

    async fn parse_token_response(response: Response) -> Result<Session, AuthError> {
        let status = response.status();
        if status.is_success() {
            let body: TokenResponse = response.json().await?;
            return Ok(body.into_session());
        }

        let body = response.bytes().await.unwrap_or_default();
        let error: GoTrueErrorBody = serde_json::from_slice(&body).unwrap_or_default();
        if status == StatusCode::BAD_REQUEST && error.is_invalid_credentials() {
            return Err(AuthError::InvalidCredentials);
        }
        Err(AuthError::Rejected {
            status: status.as_u16(),
            message: error.message(status),
        })
    }

    fn persist(&self, session: Option<&Session>) {
        let Some(store) = &self.store else {
            return;
        };
        let result = match session {
            Some(session) => store.save(session),
            None => store.clear(),
        };
        if let Err(err) = result {
            warn!(error = %err, "failed to persist session");
        }
    }

    async fn drop_session(&self) {
        self.persist(None);
        self.cell.replace(SessionChangeKind::SignedOut, None).await;
    }

    fn needs_refresh(session: &Session, now: DateTime<Utc>) -> bool {
        session.is_expired_at(now + Duration::seconds(EXPIRY_MARGIN_SECONDS))
    }
}

#[async_trait]
impl AuthProvider for GoTrueAuthProvider {
    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        let Some(session) = self.cell.get().await else {
            return Ok(None);
        };
        if !Self::needs_refresh(&session, Utc::now()) {
            return Ok(Some(session));
        }

        match self.refresh_session().await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(AuthError::Transport(reason)) => Err(AuthError::Transport(reason)),
            Err(err) => {
                warn!(error = %err, "stored session could not be refreshed; signing out");
                self.drop_session().await;
                Ok(None)
            }
        }
    }

    fn subscribe(&self) -> SessionSubscription {
        self.cell.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let response = self
            .http
            .post(self.endpoint("token")?)
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&PasswordGrantRequest {
                email: email.trim(),
                password,
            })
            .send()
            .await?;
        let session = Self::parse_token_response(response).await?;
        self.persist(Some(&session));
        self.cell
            .replace(SessionChangeKind::SignedIn, Some(session.clone()))
            .await;
        info!(user_id = %session.user_id, "signed in");
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let Some(session) = self.cell.get().await else {
            return Ok(());
        };

        // The local session is dropped even when the remote revoke fails.
        let revoke = self
            .http
            .post(self.endpoint("logout")?)
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await
            .and_then(Response::error_for_status);
        if let Err(err) = revoke {
            warn!(error = %err, "remote sign-out failed; clearing local session anyway");
        }

        self.drop_session().await;
        info!(user_id = %session.user_id, "signed out");
        Ok(())
    }
}
