//! Entry points used by data-collection screens: enqueue edits locally and
//! read the survey's remote collections.

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    geometry::Geometry,
    model::{Job, LocationOfInterest, Submission, User, ValueDelta},
    mutation::{LocationOfInterestMutation, Mutation, MutationMeta, SubmissionMutation},
    runtime::handle::{MutationStoreHandle, RuntimeError},
    sync::{
        remote::{RemoteError, RemoteStore},
        translator::{loi_from_document, submission_from_document},
        wire::{Collection, LoiDocument, SubmissionDocument},
    },
    types::{LoiId, MutationId, MutationType, SurveyId},
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Enqueues edits for one active survey on behalf of the signed-in user.
#[derive(Clone)]
pub struct MutationRepository {
    store: MutationStoreHandle,
    survey_id: SurveyId,
    user: User,
}

impl MutationRepository {
    pub fn new(store: MutationStoreHandle, survey_id: impl Into<SurveyId>, user: User) -> Self {
        Self {
            store,
            survey_id: survey_id.into(),
            user,
        }
    }

    pub fn survey_id(&self) -> &str {
        &self.survey_id
    }

    /// Fresh id for a submission started offline.
    pub fn new_submission_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Queues the answers changed since the last save. A new submission is
    /// created remotely; an existing one gets only the changed fields.
    pub async fn add_submission_mutation(
        &self,
        job: &Job,
        loi_id: &str,
        submission_id: &str,
        deltas: Vec<ValueDelta>,
        is_new: bool,
    ) -> Result<MutationId, RepositoryError> {
        let mutation_type = if is_new {
            MutationType::Create
        } else {
            MutationType::Update
        };
        self.enqueue_submission(mutation_type, job, loi_id, submission_id, deltas)
            .await
    }

    pub async fn delete_submission(
        &self,
        job: &Job,
        loi_id: &str,
        submission_id: &str,
    ) -> Result<MutationId, RepositoryError> {
        self.enqueue_submission(MutationType::Delete, job, loi_id, submission_id, Vec::new())
            .await
    }

    /// Queues a new LOI and returns its generated id with the mutation id.
    pub async fn create_loi(
        &self,
        job_id: &str,
        geometry: Geometry,
        caption: Option<String>,
    ) -> Result<(LoiId, MutationId), RepositoryError> {
        let loi_id = Uuid::new_v4().to_string();
        let id = self
            .enqueue_loi(MutationType::Create, &loi_id, job_id, Some(geometry), caption)
            .await?;
        Ok((loi_id, id))
    }

    pub async fn update_loi_geometry(
        &self,
        loi_id: &str,
        job_id: &str,
        geometry: Geometry,
    ) -> Result<MutationId, RepositoryError> {
        self.enqueue_loi(MutationType::Update, loi_id, job_id, Some(geometry), None)
            .await
    }

    pub async fn delete_loi(&self, loi_id: &str, job_id: &str) -> Result<MutationId, RepositoryError> {
        self.enqueue_loi(MutationType::Delete, loi_id, job_id, None, None)
            .await
    }

    /// Mutations of this survey still waiting for upload.
    pub async fn pending_count(&self) -> Result<usize, RepositoryError> {
        Ok(self.store.pending_count(self.survey_id.as_str()).await?)
    }

    fn meta(&self, mutation_type: MutationType, loi_id: &str) -> MutationMeta {
        MutationMeta::new(
            mutation_type,
            self.survey_id.as_str(),
            loi_id,
            self.user.id.as_str(),
            Utc::now(),
        )
    }

    async fn enqueue_submission(
        &self,
        mutation_type: MutationType,
        job: &Job,
        loi_id: &str,
        submission_id: &str,
        response_deltas: Vec<ValueDelta>,
    ) -> Result<MutationId, RepositoryError> {
        let mutation = Mutation::Submission(SubmissionMutation {
            meta: self.meta(mutation_type, loi_id),
            job: job.clone(),
            submission_id: submission_id.to_string(),
            response_deltas,
        });
        let id = self.store.create(mutation).await?;
        debug!(id, submission_id, ?mutation_type, "submission edit queued");
        Ok(id)
    }

    async fn enqueue_loi(
        &self,
        mutation_type: MutationType,
        loi_id: &str,
        job_id: &str,
        geometry: Option<Geometry>,
        caption: Option<String>,
    ) -> Result<MutationId, RepositoryError> {
        let mutation = Mutation::LocationOfInterest(LocationOfInterestMutation {
            meta: self.meta(mutation_type, loi_id),
            job_id: job_id.to_string(),
            custom_id: None,
            caption,
            geometry,
        });
        let id = self.store.create(mutation).await?;
        debug!(id, loi_id, ?mutation_type, "loi edit queued");
        Ok(id)
    }
}

/// Loads every LOI of the survey. Documents that fail to decode are skipped.
pub async fn load_lois(
    remote: &dyn RemoteStore,
    survey_id: &str,
    limit: Duration,
) -> Result<Vec<LocationOfInterest>, RepositoryError> {
    let docs = list_with_timeout(remote, survey_id, Collection::Lois, limit).await?;
    let mut lois = Vec::with_capacity(docs.len());
    for (loi_id, value) in docs {
        let decoded = serde_json::from_value::<LoiDocument>(value)
            .map_err(|e| e.to_string())
            .and_then(|doc| loi_from_document(survey_id, &loi_id, &doc).map_err(|e| e.to_string()));
        match decoded {
            Ok(loi) => lois.push(loi),
            Err(reason) => warn!(survey_id, %loi_id, %reason, "skipping undecodable loi"),
        }
    }
    Ok(lois)
}

/// Loads the submissions of `job` for one LOI. Documents that fail to decode
/// are skipped.
pub async fn load_submissions(
    remote: &dyn RemoteStore,
    survey_id: &str,
    job: &Job,
    loi_id: &str,
    limit: Duration,
) -> Result<Vec<Submission>, RepositoryError> {
    let docs = list_with_timeout(remote, survey_id, Collection::Submissions, limit).await?;
    let mut submissions = Vec::new();
    for (submission_id, value) in docs {
        if !belongs_to(&value, loi_id, &job.id) {
            continue;
        }
        let decoded = serde_json::from_value::<SubmissionDocument>(value)
            .map_err(|e| e.to_string())
            .and_then(|doc| {
                submission_from_document(survey_id, &submission_id, job, &doc)
                    .map_err(|e| e.to_string())
            });
        match decoded {
            Ok(submission) => submissions.push(submission),
            Err(reason) => {
                warn!(survey_id, %submission_id, %reason, "skipping undecodable submission")
            }
        }
    }
    Ok(submissions)
}

fn belongs_to(doc: &Value, loi_id: &str, job_id: &str) -> bool {
    doc.get("loiId").and_then(Value::as_str) == Some(loi_id)
        && doc.get("jobId").and_then(Value::as_str) == Some(job_id)
}

async fn list_with_timeout(
    remote: &dyn RemoteStore,
    survey_id: &str,
    collection: Collection,
    limit: Duration,
) -> Result<Vec<(String, Value)>, RemoteError> {
    match tokio::time::timeout(limit, remote.list(survey_id, collection)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(survey_id, collection = collection.as_str(), ?limit, "remote load timed out");
            Err(RemoteError::Timeout(limit))
        }
    }
}
