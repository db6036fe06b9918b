//! Session state shared by every controller component.
//!
//! All mutation goes through the setters below so the invariants hold:
//! a split is only marked applied while `1 <= train < total`, model and run
//! ids change together, and every reset advances the epoch.

use serde::Serialize;
use tracing::debug;

use crate::api::types::{FileId, ModelId, RunId, User};
use crate::error::DashError;
use crate::transform::{validate_split, SplitSizes};

/// Identity of the state an async request was dispatched against.
///
/// A completion may only be applied while its ticket is still current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    epoch: u64,
    file_id: Option<FileId>,
}

impl Ticket {
    pub fn file_id(&self) -> Option<FileId> {
        self.file_id
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Session {
    file_id: Option<FileId>,
    model_id: Option<ModelId>,
    run_id: Option<RunId>,
    total_observations: Option<usize>,
    split: Option<SplitSizes>,
    user: Option<User>,
    #[serde(skip)]
    epoch: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_id(&self) -> Option<FileId> {
        self.file_id
    }

    pub fn model_id(&self) -> Option<ModelId> {
        self.model_id
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.run_id
    }

    pub fn total_observations(&self) -> Option<usize> {
        self.total_observations
    }

    pub fn split_applied(&self) -> bool {
        self.split.is_some()
    }

    pub fn split(&self) -> Option<SplitSizes> {
        self.split
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn require_user(&self) -> Result<&User, DashError> {
        self.user.as_ref().ok_or(DashError::NotAuthenticated)
    }

    pub fn require_file(&self) -> Result<FileId, DashError> {
        self.file_id.ok_or(DashError::NoActiveFile)
    }

    pub fn set_user(&mut self, user: Option<User>) {
        self.user = user;
    }

    /// Switch to a freshly uploaded or reopened file. The user stays logged in.
    pub fn reset_for_file(&mut self, file_id: FileId, total_observations: Option<usize>) {
        debug!("Session reset for file {}", file_id);
        self.file_id = Some(file_id);
        self.model_id = None;
        self.run_id = None;
        self.total_observations = total_observations.filter(|n| *n > 0);
        self.split = None;
        self.advance();
    }

    /// Forget everything, including the user.
    pub fn reset_all(&mut self) {
        let epoch = self.epoch;
        *self = Self::default();
        self.epoch = epoch;
        self.advance();
    }

    /// Record the observation count after a transform. An applied split that
    /// no longer fits the new count is dropped.
    pub fn set_total_observations(&mut self, total: usize) -> Result<(), DashError> {
        if total == 0 {
            return Err(DashError::validation("the series has no observations left"));
        }
        self.total_observations = Some(total);
        if let Some(split) = self.split {
            if split.train >= total {
                debug!(
                    "Dropping split {}/{} after count changed to {}",
                    split.train, split.test, total
                );
                self.split = None;
            } else {
                self.split = Some(SplitSizes {
                    train: split.train,
                    test: total - split.train,
                });
            }
        }
        Ok(())
    }

    pub fn mark_split_applied(&mut self, train: usize) -> Result<SplitSizes, DashError> {
        let total = self
            .total_observations
            .ok_or_else(|| DashError::validation("total number of observations is not available"))?;
        let sizes = validate_split(train, total)?;
        self.split = Some(sizes);
        Ok(sizes)
    }

    pub fn clear_split(&mut self) {
        self.split = None;
    }

    pub fn set_model(&mut self, model_id: ModelId, run_id: Option<RunId>) {
        self.model_id = Some(model_id);
        self.run_id = run_id;
    }

    pub fn set_run_id(&mut self, run_id: RunId) {
        self.run_id = Some(run_id);
    }

    pub fn clear_model(&mut self) {
        self.model_id = None;
        self.run_id = None;
    }

    /// Capture the current epoch without advancing it (read-only requests).
    pub fn ticket(&self) -> Ticket {
        Ticket {
            epoch: self.epoch,
            file_id: self.file_id,
        }
    }

    /// Advance the epoch and capture it (mutating requests). Any request
    /// dispatched earlier becomes stale.
    pub fn begin(&mut self) -> Ticket {
        self.advance();
        self.ticket()
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.epoch == ticket.epoch && self.file_id == ticket.file_id
    }

    fn advance(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }
}
