//! Chooses between the sign-in view and the image workflow based on the
//! provider's session.

use std::sync::Arc;

use shared::domain::Session;
use tracing::{debug, info, warn};

use crate::{
    auth::{AuthProvider, SessionChange, SessionChangeKind, SessionSubscription},
    error::AuthError,
    workflow::ImageWorkflow,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateView {
    /// Mounted, initial session fetch not resolved yet.
    Loading,
    SignIn,
    Workflow,
}

pub struct SessionGate {
    provider: Arc<dyn AuthProvider>,
    subscription: Option<SessionSubscription>,
    session: Option<Session>,
    workflow: Option<ImageWorkflow>,
    view: GateView,
    changes_applied: u64,
    workflow_epoch: u64,
}

impl SessionGate {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self {
            provider,
            subscription: None,
            session: None,
            workflow: None,
            view: GateView::Loading,
            changes_applied: 0,
            workflow_epoch: 0,
        }
    }

    pub fn provider(&self) -> Arc<dyn AuthProvider> {
        Arc::clone(&self.provider)
    }

    pub fn view(&self) -> GateView {
        self.view
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn workflow(&self) -> Option<&ImageWorkflow> {
        self.workflow.as_ref()
    }

    pub fn workflow_mut(&mut self) -> Option<&mut ImageWorkflow> {
        self.workflow.as_mut()
    }

    /// Changes whenever the workflow is created, replaced or discarded. Work
    /// started against one epoch must not be applied in another.
    pub fn workflow_epoch(&self) -> u64 {
        self.workflow_epoch
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription.is_some()
    }

    /// Registers for session changes and resolves the current session.
    pub async fn mount(&mut self) -> GateView {
        self.begin_mount();
        let initial = self.provider.current_session().await;
        self.apply_initial(initial)
    }

    /// Synchronous half of [`Self::mount`]: registers the subscription so no
    /// change can be missed while the initial fetch runs elsewhere.
    pub fn begin_mount(&mut self) {
        if self.subscription.is_none() {
            self.subscription = Some(self.provider.subscribe());
        }
        self.view = GateView::Loading;
    }

    /// Applies the initial session fetch. A failed fetch counts as signed out.
    /// Ignored when a change notification already arrived, since that is
    /// newer information.
    pub fn apply_initial(&mut self, initial: Result<Option<Session>, AuthError>) -> GateView {
        if self.changes_applied > 0 {
            debug!("initial session fetch superseded by a change notification");
            return self.view;
        }

        let session = match initial {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "initial session fetch failed; treating as signed out");
                None
            }
        };
        self.set_session(session);
        self.view
    }

    pub fn apply_change(&mut self, change: SessionChange) -> GateView {
        self.changes_applied += 1;
        debug!(kind = ?change.kind, "applying session change");
        if change.kind == SessionChangeKind::SignedOut {
            self.set_session(None);
        } else {
            self.set_session(change.session);
        }
        self.view
    }

    /// Applies every change already queued on the subscription.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Some(change) = self
            .subscription
            .as_mut()
            .and_then(SessionSubscription::try_recv)
        {
            self.apply_change(change);
            applied += 1;
        }
        applied
    }

    /// Waits for the next change notification and applies it.
    pub async fn next_change(&mut self) -> Option<GateView> {
        let change = self.subscription.as_mut()?.recv().await?;
        Some(self.apply_change(change))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.provider
            .sign_in_with_password(email, password)
            .await
            .map(|_| ())
    }

    /// Asks the provider to end the session. The view only changes once the
    /// resulting notification is applied.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.provider.sign_out().await
    }

    /// Drops the subscription and all workflow state.
    pub fn unmount(&mut self) {
        self.subscription = None;
        if self.workflow.take().is_some() {
            self.workflow_epoch += 1;
        }
        self.session = None;
        self.view = GateView::Loading;
    }

    fn set_session(&mut self, session: Option<Session>) {
        match session {
            None => {
                if self.workflow.take().is_some() {
                    self.workflow_epoch += 1;
                    info!("session ended; discarding image workflow");
                }
                self.session = None;
                self.view = GateView::SignIn;
            }
            Some(session) => {
                let same_user = self
                    .session
                    .as_ref()
                    .is_some_and(|current| current.user_id == session.user_id);
                if !same_user || self.workflow.is_none() {
                    self.workflow = Some(ImageWorkflow::new());
                    self.workflow_epoch += 1;
                }
                self.session = Some(session);
                self.view = GateView::Workflow;
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/gate_tests.rs"]
mod tests;
