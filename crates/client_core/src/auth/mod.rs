//! Identity providers and session-change notifications.
//!
//! Providers own the [`Session`]; clients read it through
//! [`AuthProvider::current_session`] and learn about sign-in, refresh and
//! sign-out through a [`SessionSubscription`]. Dropping the subscription
//! unregisters it.

use async_trait::async_trait;
use shared::domain::Session;
use tokio::sync::{
    broadcast::{self, error::RecvError, error::TryRecvError},
    RwLock,
};
use tracing::{debug, warn};

use crate::error::AuthError;

mod gotrue;
mod memory;
mod store;

pub use gotrue::GoTrueAuthProvider;
pub use memory::InMemoryAuthProvider;
pub use store::SessionFileStore;

const SESSION_EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChangeKind {
    SignedIn,
    TokenRefreshed,
    SignedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionChange {
    pub kind: SessionChangeKind,
    pub session: Option<Session>,
}

pub struct SessionSubscription {
    rx: broadcast::Receiver<SessionChange>,
}

impl SessionSubscription {
    /// Waits for the next change. Returns `None` once the provider is gone.
    pub async fn recv(&mut self) -> Option<SessionChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) => return Some(change),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session subscriber lagged; continuing with newest change");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<SessionChange> {
        loop {
            match self.rx.try_recv() {
                Ok(change) => return Some(change),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "session subscriber lagged; continuing with newest change");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_session(&self) -> Result<Option<Session>, AuthError>;
    fn subscribe(&self) -> SessionSubscription;
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, AuthError>;
    /// Invalidates the session. Subscribers observe the sign-out through a
    /// change notification.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Current session plus the broadcast channel that announces its changes.
struct SessionCell {
    current: RwLock<Option<Session>>,
    events: broadcast::Sender<SessionChange>,
}

impl SessionCell {
    fn new(initial: Option<Session>) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            current: RwLock::new(initial),
            events,
        }
    }

    async fn get(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    async fn replace(&self, kind: SessionChangeKind, session: Option<Session>) {
        {
            let mut guard = self.current.write().await;
            *guard = session.clone();
        }
        debug!(?kind, subscribers = self.events.receiver_count(), "session changed");
        let _ = self.events.send(SessionChange { kind, session });
    }

    fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            rx: self.events.subscribe(),
        }
    }

    fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

#[cfg(test)]
#[path = "../tests/auth_tests.rs"]
mod tests;
