use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    mutation::{Mutation, MutationOverrides},
    persist::{LocalStore, MutationQuery, PersistError, memory::MemoryLocalStore},
    types::{MutationId, SyncStatus},
};

/// Rejections raised before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("required field `{0}` is empty")]
    MissingField(&'static str),
    #[error("mutation already persisted with id {0}")]
    AlreadyPersisted(MutationId),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("mutation {0} not found")]
    MissingMutation(MutationId),
    #[error("mutation {id}: {from} -> {to} is not a valid transition")]
    InvalidTransition {
        id: MutationId,
        from: SyncStatus,
        to: SyncStatus,
    },
    #[error("mutation {0} is not failed")]
    NotFailed(MutationId),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Authoritative mutation queue over a [`LocalStore`].
///
/// Callers that share a store across tasks go through
/// [`crate::runtime::handle::MutationStoreHandle`], which serializes writes.
pub struct MutationStore {
    local: Box<dyn LocalStore>,
}

impl MutationStore {
    /// Wraps `local` and returns any IN_PROGRESS rows left by a previous
    /// process to PENDING.
    pub fn open(local: Box<dyn LocalStore>) -> Result<Self, StoreError> {
        let interrupted = local.in_progress_ids()?;
        let mut store = Self { local };
        let released = store.release_ids(interrupted)?;
        if released > 0 {
            info!(released, "reset interrupted mutations to pending");
        }
        Ok(store)
    }

    /// Store backed by [`MemoryLocalStore`].
    pub fn in_memory() -> Self {
        Self {
            local: Box::new(MemoryLocalStore::new()),
        }
    }

    /// Validates and persists a new mutation with status PENDING.
    pub fn create(&mut self, mutation: Mutation) -> Result<MutationId, StoreError> {
        validate_new(&mutation)?;

        let pending = mutation.with_fields(&MutationOverrides {
            sync_status: Some(SyncStatus::Pending),
            retry_count: Some(0),
            last_error: Some(String::new()),
            needs_manual_retry: Some(false),
            ..MutationOverrides::default()
        });
        let id = self.local.insert(&pending)?;
        debug!(
            id,
            kind = pending.kind(),
            survey_id = pending.survey_id(),
            "mutation enqueued"
        );
        Ok(id)
    }

    pub fn get(&self, id: MutationId) -> Result<Option<Mutation>, StoreError> {
        Ok(self.local.get(id)?)
    }

    /// The sync worker's queue: PENDING and FAILED mutations of a survey,
    /// oldest first.
    pub fn list_pending(&self, survey_id: &str) -> Result<Vec<Mutation>, StoreError> {
        let query = MutationQuery::survey(survey_id)
            .with_statuses(&[SyncStatus::Pending, SyncStatus::Failed]);
        Ok(self.local.query(&query)?)
    }

    /// All mutations of a survey regardless of status, oldest first.
    pub fn list_all(&self, survey_id: &str) -> Result<Vec<Mutation>, StoreError> {
        Ok(self.local.query(&MutationQuery::survey(survey_id))?)
    }

    pub fn pending_count(&self, survey_id: &str) -> Result<usize, StoreError> {
        let query = MutationQuery::survey(survey_id)
            .with_statuses(&[SyncStatus::Pending, SyncStatus::Failed]);
        Ok(self.local.count(&query)?)
    }

    pub fn mark_in_progress(&mut self, id: MutationId) -> Result<Mutation, StoreError> {
        self.transition(id, SyncStatus::InProgress, MutationOverrides::default())
    }

    pub fn mark_completed(&mut self, id: MutationId) -> Result<Mutation, StoreError> {
        self.transition(id, SyncStatus::Completed, MutationOverrides::default())
    }

    /// Records a failed attempt. A non-retryable failure is parked until
    /// [`MutationStore::request_retry`].
    pub fn mark_failed(
        &mut self,
        id: MutationId,
        error: &str,
        retryable: bool,
    ) -> Result<Mutation, StoreError> {
        let current = self.require(id)?;
        let overrides = MutationOverrides {
            retry_count: Some(current.meta().retry_count.saturating_add(1)),
            last_error: Some(error.to_string()),
            needs_manual_retry: Some(!retryable),
            ..MutationOverrides::default()
        };
        let failed = self.transition_from(current, SyncStatus::Failed, overrides)?;
        warn!(
            id,
            retry_count = failed.meta().retry_count,
            retryable,
            error,
            "mutation sync failed"
        );
        Ok(failed)
    }

    /// User-initiated retry of a parked FAILED mutation.
    pub fn request_retry(&mut self, id: MutationId) -> Result<Mutation, StoreError> {
        let current = self.require(id)?;
        if current.sync_status() != SyncStatus::Failed {
            return Err(StoreError::NotFailed(id));
        }
        let next = current.with_fields(&MutationOverrides {
            needs_manual_retry: Some(false),
            ..MutationOverrides::default()
        });
        self.local.update(&next)?;
        Ok(next)
    }

    /// Deletes COMPLETED mutations of a survey. Safe to repeat.
    pub fn purge_completed(&mut self, survey_id: &str) -> Result<usize, StoreError> {
        let removed = self.local.delete(survey_id, SyncStatus::Completed)?;
        if removed > 0 {
            debug!(survey_id, removed, "purged completed mutations");
        }
        Ok(removed)
    }

    /// Returns a survey's IN_PROGRESS mutations to PENDING.
    ///
    /// Only valid while no sync worker is running for the survey.
    pub fn release_interrupted(&mut self, survey_id: &str) -> Result<usize, StoreError> {
        let query = MutationQuery::survey(survey_id).with_statuses(&[SyncStatus::InProgress]);
        let ids = self
            .local
            .query(&query)?
            .iter()
            .filter_map(Mutation::id)
            .collect();
        self.release_ids(ids)
    }

    fn release_ids(&mut self, ids: Vec<MutationId>) -> Result<usize, StoreError> {
        let mut released = 0;
        for id in ids {
            let current = self.require(id)?;
            if current.sync_status() != SyncStatus::InProgress {
                continue;
            }
            let next = current.with_fields(&MutationOverrides {
                sync_status: Some(SyncStatus::Pending),
                ..MutationOverrides::default()
            });
            self.local.update(&next)?;
            released += 1;
        }
        Ok(released)
    }

    fn transition(
        &mut self,
        id: MutationId,
        to: SyncStatus,
        overrides: MutationOverrides,
    ) -> Result<Mutation, StoreError> {
        let current = self.require(id)?;
        self.transition_from(current, to, overrides)
    }

    fn transition_from(
        &mut self,
        current: Mutation,
        to: SyncStatus,
        overrides: MutationOverrides,
    ) -> Result<Mutation, StoreError> {
        let from = current.sync_status();
        let id = current.id().unwrap_or_default();
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition { id, from, to });
        }

        let next = current.with_fields(&MutationOverrides {
            sync_status: Some(to),
            ..overrides
        });
        self.local.update(&next)?;
        Ok(next)
    }

    fn require(&self, id: MutationId) -> Result<Mutation, StoreError> {
        self.local.get(id)?.ok_or(StoreError::MissingMutation(id))
    }
}

fn validate_new(mutation: &Mutation) -> Result<(), ValidationError> {
    let meta = mutation.meta();
    if let Some(id) = meta.id {
        return Err(ValidationError::AlreadyPersisted(id));
    }
    if meta.survey_id.trim().is_empty() {
        return Err(ValidationError::MissingField("survey_id"));
    }
    if meta.location_of_interest_id.trim().is_empty() {
        return Err(ValidationError::MissingField("location_of_interest_id"));
    }
    if meta.user_id.trim().is_empty() {
        return Err(ValidationError::MissingField("user_id"));
    }
    if let Mutation::Submission(s) = mutation {
        if s.submission_id.trim().is_empty() {
            return Err(ValidationError::MissingField("submission_id"));
        }
    }
    Ok(())
}
