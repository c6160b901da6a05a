use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::{
    core::store::{MutationStore, StoreError},
    mutation::Mutation,
    types::{MutationId, SurveyId},
};

use super::events::MutationEvent;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("mutation store task is gone")]
    ChannelClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub command_queue_bound: usize,
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_queue_bound: 256,
            event_capacity: 1024,
        }
    }
}

/// Cloneable handle to the task that owns the [`MutationStore`].
#[derive(Clone)]
pub struct MutationStoreHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<MutationEvent>,
}

type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

enum Command {
    Create {
        mutation: Box<Mutation>,
        resp: Reply<MutationId>,
    },
    Get {
        id: MutationId,
        resp: Reply<Option<Mutation>>,
    },
    ListPending {
        survey_id: SurveyId,
        resp: Reply<Vec<Mutation>>,
    },
    ListAll {
        survey_id: SurveyId,
        resp: Reply<Vec<Mutation>>,
    },
    PendingCount {
        survey_id: SurveyId,
        resp: Reply<usize>,
    },
    MarkInProgress {
        id: MutationId,
        resp: Reply<Mutation>,
    },
    MarkCompleted {
        id: MutationId,
        resp: Reply<Mutation>,
    },
    MarkFailed {
        id: MutationId,
        error: String,
        retryable: bool,
        resp: Reply<Mutation>,
    },
    RequestRetry {
        id: MutationId,
        resp: Reply<Mutation>,
    },
    PurgeCompleted {
        survey_id: SurveyId,
        resp: Reply<usize>,
    },
    ReleaseInterrupted {
        survey_id: SurveyId,
        resp: Reply<usize>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Moves `store` onto its own task and returns the handle that feeds it.
pub fn spawn_mutation_store(store: MutationStore, config: RuntimeConfig) -> MutationStoreHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<MutationEvent>(config.event_capacity.max(1));

    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        let mut store = store;
        while let Some(cmd) = cmd_rx.recv().await {
            if handle_command(cmd, &mut store, &events_tx_loop) {
                break;
            }
        }
        debug!("mutation store task stopped");
    });

    MutationStoreHandle { cmd_tx, events_tx }
}

impl MutationStoreHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<MutationEvent> {
        self.events_tx.subscribe()
    }

    pub async fn create(&self, mutation: Mutation) -> Result<MutationId, RuntimeError> {
        self.request(|resp| Command::Create {
            mutation: Box::new(mutation),
            resp,
        })
        .await
    }

    pub async fn get(&self, id: MutationId) -> Result<Option<Mutation>, RuntimeError> {
        self.request(|resp| Command::Get { id, resp }).await
    }

    pub async fn list_pending(
        &self,
        survey_id: impl Into<SurveyId>,
    ) -> Result<Vec<Mutation>, RuntimeError> {
        let survey_id = survey_id.into();
        self.request(|resp| Command::ListPending { survey_id, resp })
            .await
    }

    pub async fn list_all(
        &self,
        survey_id: impl Into<SurveyId>,
    ) -> Result<Vec<Mutation>, RuntimeError> {
        let survey_id = survey_id.into();
        self.request(|resp| Command::ListAll { survey_id, resp }).await
    }

    pub async fn pending_count(&self, survey_id: impl Into<SurveyId>) -> Result<usize, RuntimeError> {
        let survey_id = survey_id.into();
        self.request(|resp| Command::PendingCount { survey_id, resp })
            .await
    }

    pub async fn mark_in_progress(&self, id: MutationId) -> Result<Mutation, RuntimeError> {
        self.request(|resp| Command::MarkInProgress { id, resp }).await
    }

    pub async fn mark_completed(&self, id: MutationId) -> Result<Mutation, RuntimeError> {
        self.request(|resp| Command::MarkCompleted { id, resp }).await
    }

    pub async fn mark_failed(
        &self,
        id: MutationId,
        error: impl Into<String>,
        retryable: bool,
    ) -> Result<Mutation, RuntimeError> {
        let error = error.into();
        self.request(|resp| Command::MarkFailed {
            id,
            error,
            retryable,
            resp,
        })
        .await
    }

    pub async fn request_retry(&self, id: MutationId) -> Result<Mutation, RuntimeError> {
        self.request(|resp| Command::RequestRetry { id, resp }).await
    }

    pub async fn purge_completed(
        &self,
        survey_id: impl Into<SurveyId>,
    ) -> Result<usize, RuntimeError> {
        let survey_id = survey_id.into();
        self.request(|resp| Command::PurgeCompleted { survey_id, resp })
            .await
    }

    pub async fn release_interrupted(
        &self,
        survey_id: impl Into<SurveyId>,
    ) -> Result<usize, RuntimeError> {
        let survey_id = survey_id.into();
        self.request(|resp| Command::ReleaseInterrupted { survey_id, resp })
            .await
    }

    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        let res = rx.await.map_err(|_| RuntimeError::ChannelClosed)?;
        Ok(res?)
    }
}

fn handle_command(
    cmd: Command,
    store: &mut MutationStore,
    events_tx: &broadcast::Sender<MutationEvent>,
) -> bool {
    match cmd {
        Command::Create { mutation, resp } => {
            let survey_id = mutation.survey_id().to_string();
            let res = store.create(*mutation);
            if let Ok(id) = &res {
                let _ = events_tx.send(MutationEvent::Created {
                    id: *id,
                    survey_id: survey_id.clone(),
                });
                publish_pending_count(store, events_tx, &survey_id);
            }
            let _ = resp.send(res);
        }
        Command::Get { id, resp } => {
            let _ = resp.send(store.get(id));
        }
        Command::ListPending { survey_id, resp } => {
            let _ = resp.send(store.list_pending(&survey_id));
        }
        Command::ListAll { survey_id, resp } => {
            let _ = resp.send(store.list_all(&survey_id));
        }
        Command::PendingCount { survey_id, resp } => {
            let _ = resp.send(store.pending_count(&survey_id));
        }
        Command::MarkInProgress { id, resp } => {
            let res = store.mark_in_progress(id);
            publish_status(store, events_tx, &res);
            let _ = resp.send(res);
        }
        Command::MarkCompleted { id, resp } => {
            let res = store.mark_completed(id);
            publish_status(store, events_tx, &res);
            let _ = resp.send(res);
        }
        Command::MarkFailed {
            id,
            error,
            retryable,
            resp,
        } => {
            let res = store.mark_failed(id, &error, retryable);
            publish_status(store, events_tx, &res);
            let _ = resp.send(res);
        }
        Command::RequestRetry { id, resp } => {
            let res = store.request_retry(id);
            publish_status(store, events_tx, &res);
            let _ = resp.send(res);
        }
        Command::PurgeCompleted { survey_id, resp } => {
            let res = store.purge_completed(&survey_id);
            if let Ok(removed) = res {
                let _ = events_tx.send(MutationEvent::Purged {
                    survey_id: survey_id.clone(),
                    removed,
                });
            }
            let _ = resp.send(res);
        }
        Command::ReleaseInterrupted { survey_id, resp } => {
            let res = store.release_interrupted(&survey_id);
            if let Ok(count) = res {
                if count > 0 {
                    let _ = events_tx.send(MutationEvent::Released {
                        survey_id: survey_id.clone(),
                        count,
                    });
                    publish_pending_count(store, events_tx, &survey_id);
                }
            }
            let _ = resp.send(res);
        }
        Command::Shutdown { resp } => {
            let _ = resp.send(());
            return true;
        }
    }

    false
}

fn publish_status(
    store: &MutationStore,
    events_tx: &broadcast::Sender<MutationEvent>,
    res: &Result<Mutation, StoreError>,
) {
    let Ok(mutation) = res else {
        return;
    };
    if let Some(id) = mutation.id() {
        let _ = events_tx.send(MutationEvent::StatusChanged {
            id,
            status: mutation.sync_status(),
        });
    }
    publish_pending_count(store, events_tx, mutation.survey_id());
}

fn publish_pending_count(
    store: &MutationStore,
    events_tx: &broadcast::Sender<MutationEvent>,
    survey_id: &str,
) {
    match store.pending_count(survey_id) {
        Ok(count) => {
            let _ = events_tx.send(MutationEvent::PendingCount {
                survey_id: survey_id.to_string(),
                count,
            });
        }
        Err(err) => warn!(survey_id, %err, "pending count unavailable"),
    }
}
