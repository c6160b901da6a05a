//! Background drain of a survey's pending mutations.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
    model::User,
    mutation::Mutation,
    runtime::handle::{MutationStoreHandle, RuntimeError},
    types::{MutationId, SyncStatus},
};

use super::{
    remote::{RemoteError, RemoteStore},
    translator::{TranslateError, to_remote_write},
};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound on one remote write.
    pub remote_write_timeout_ms: u64,
    /// Upper bound on loading a remote collection.
    pub remote_load_timeout_ms: u64,
    /// Attempts before a mutation needs a manual retry.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Pause between passes in [`SyncWorker::run`].
    pub poll_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_write_timeout_ms: 10_000,
            remote_load_timeout_ms: 5_000,
            max_attempts: 5,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
            poll_interval_ms: 30_000,
        }
    }
}

/// Delay before the next automatic attempt after `retry_count` failures.
pub fn backoff_delay(config: &SyncConfig, retry_count: u32) -> Duration {
    let exp = retry_count.saturating_sub(1).min(20);
    let ms = config
        .backoff_base_ms
        .saturating_mul(1u64 << exp)
        .min(config.backoff_max_ms);
    Duration::from_millis(ms)
}

/// Outcome counts of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub completed: usize,
    pub failed: usize,
    /// Not due yet, parked for manual retry, or behind a failed edit of the
    /// same entity.
    pub skipped: usize,
    pub purged: usize,
    pub cancelled: bool,
}

enum Attempt {
    Written,
    /// Translation failed; retrying cannot succeed.
    Rejected(TranslateError),
    Failed(RemoteError),
    Cancelled,
}

/// Drains one survey's queue at a time, in client-timestamp order.
///
/// Run at most one worker per survey.
pub struct SyncWorker {
    store: MutationStoreHandle,
    remote: Arc<dyn RemoteStore>,
    user: User,
    config: SyncConfig,
    retry_after: HashMap<MutationId, Instant>,
}

impl SyncWorker {
    pub fn new(
        store: MutationStoreHandle,
        remote: Arc<dyn RemoteStore>,
        user: User,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            remote,
            user,
            config,
            retry_after: HashMap::new(),
        }
    }

    /// One pass over the survey's pending mutations.
    ///
    /// When `cancel` turns `true` the pass stops; a write in flight is
    /// abandoned and its mutation keeps its current status.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn run_pass(
        &mut self,
        survey_id: &str,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        if *cancel.borrow() {
            report.cancelled = true;
            return Ok(report);
        }

        let released = self.store.release_interrupted(survey_id).await?;
        if released > 0 {
            debug!(released, "released interrupted mutations");
        }

        let queue = self.store.list_pending(survey_id).await?;
        let mut blocked: HashSet<(&'static str, String)> = HashSet::new();

        for mutation in queue {
            if *cancel.borrow() {
                report.cancelled = true;
                break;
            }
            let Some(id) = mutation.id() else {
                continue;
            };
            let entity = (mutation.kind(), mutation.entity_id().to_string());
            if blocked.contains(&entity) || !self.is_due(id, &mutation) {
                blocked.insert(entity);
                report.skipped += 1;
                continue;
            }

            let claimed = self.store.mark_in_progress(id).await?;
            match self.attempt(&claimed, cancel).await {
                Attempt::Written => {
                    self.store.mark_completed(id).await?;
                    self.retry_after.remove(&id);
                    report.completed += 1;
                }
                Attempt::Rejected(err) => {
                    error!(id, %err, "mutation cannot be translated; manual retry required");
                    self.store.mark_failed(id, err.to_string(), false).await?;
                    self.retry_after.remove(&id);
                    blocked.insert(entity);
                    report.failed += 1;
                }
                Attempt::Failed(err) => {
                    let attempts = claimed.meta().retry_count.saturating_add(1);
                    let retryable = attempts < self.config.max_attempts;
                    self.store.mark_failed(id, err.to_string(), retryable).await?;
                    if retryable {
                        let delay = backoff_delay(&self.config, attempts);
                        self.retry_after.insert(id, Instant::now() + delay);
                        debug!(id, attempts, ?delay, "retry scheduled");
                    } else {
                        self.retry_after.remove(&id);
                        warn!(id, attempts, "retry budget exhausted");
                    }
                    blocked.insert(entity);
                    report.failed += 1;
                }
                Attempt::Cancelled => {
                    report.cancelled = true;
                    break;
                }
            }
        }

        if !report.cancelled && report.failed == 0 {
            report.purged = self.store.purge_completed(survey_id).await?;
        }

        info!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            purged = report.purged,
            cancelled = report.cancelled,
            "sync pass finished"
        );
        Ok(report)
    }

    /// Repeats [`SyncWorker::run_pass`] every `poll_interval_ms` until
    /// cancelled.
    pub async fn run(
        mut self,
        survey_id: String,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<(), SyncError> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            let report = self.run_pass(&survey_id, &mut cancel).await?;
            if report.cancelled {
                return Ok(());
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = wait_cancelled(&mut cancel) => return Ok(()),
            }
        }
    }

    fn is_due(&self, id: MutationId, mutation: &Mutation) -> bool {
        let meta = mutation.meta();
        match meta.sync_status {
            SyncStatus::Pending => true,
            SyncStatus::Failed => {
                !meta.needs_manual_retry
                    && self
                        .retry_after
                        .get(&id)
                        .is_none_or(|at| Instant::now() >= *at)
            }
            SyncStatus::InProgress | SyncStatus::Completed | SyncStatus::Unknown => false,
        }
    }

    async fn attempt(&self, mutation: &Mutation, cancel: &mut watch::Receiver<bool>) -> Attempt {
        let (path, write) = match to_remote_write(mutation, &self.user) {
            Ok(w) => w,
            Err(err) => return Attempt::Rejected(err),
        };

        let limit = Duration::from_millis(self.config.remote_write_timeout_ms);
        tokio::select! {
            res = tokio::time::timeout(limit, self.remote.write(&path, write)) => match res {
                Ok(Ok(())) => {
                    debug!(%path, "remote write acknowledged");
                    Attempt::Written
                }
                Ok(Err(err)) => Attempt::Failed(err),
                Err(_) => Attempt::Failed(RemoteError::Timeout(limit)),
            },
            _ = wait_cancelled(cancel) => Attempt::Cancelled,
        }
    }
}

/// Starts [`SyncWorker::run`] on its own task.
pub fn spawn_sync_worker(
    worker: SyncWorker,
    survey_id: impl Into<String>,
    cancel: watch::Receiver<bool>,
) -> JoinHandle<Result<(), SyncError>> {
    let survey_id = survey_id.into();
    tokio::spawn(worker.run(survey_id, cancel))
}

async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    let cancelled = cancel.wait_for(|c| *c).await.is_ok();
    if !cancelled {
        // Sender dropped without cancelling.
        std::future::pending::<()>().await;
    }
}
