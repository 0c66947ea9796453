//! Bookkeeping for image loads running on the backend worker.
//!
//! Loads run as independent tasks and can finish in any order. Only the most
//! recent request is applied, and only while the workflow it was issued
//! against is still the gate's current one.

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadToken {
    pub id: u64,
    /// Gate workflow epoch at the time of the request.
    pub epoch: u64,
}

#[derive(Debug, Default)]
pub struct LoadTracker {
    next_id: u64,
    pending: Option<LoadToken>,
}

impl LoadTracker {
    /// Starts a load, superseding any load still in flight.
    pub fn begin(&mut self, epoch: u64) -> LoadToken {
        self.next_id += 1;
        let token = LoadToken {
            id: self.next_id,
            epoch,
        };
        if let Some(previous) = self.pending.replace(token) {
            debug!(superseded = previous.id, id = token.id, "image load superseded");
        }
        token
    }

    /// Returns whether a finished load should be applied.
    pub fn finish(&mut self, token: LoadToken, current_epoch: u64) -> bool {
        if self.pending != Some(token) {
            debug!(id = token.id, "ignoring superseded image load");
            return false;
        }
        self.pending = None;
        if token.epoch != current_epoch {
            debug!(
                id = token.id,
                epoch = token.epoch,
                current_epoch,
                "ignoring image load from a replaced workflow"
            );
            return false;
        }
        true
    }

    pub fn cancel(&mut self) {
        if let Some(token) = self.pending.take() {
            debug!(id = token.id, "image load cancelled");
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
#[path = "tests/selection_tests.rs"]
mod tests;
