//! Pending local edits and their persistence envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    geometry::Geometry,
    model::{Job, ValueDelta},
    types::{LoiId, MutationId, MutationType, SurveyId, SyncStatus, UserId},
};

/// Version number for serialized [`MutationEnvelope`] payloads.
pub const MUTATION_FORMAT_VERSION: u16 = 1;

/// Fields shared by every mutation variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationMeta {
    /// Local id, assigned on first persist.
    pub id: Option<MutationId>,
    /// Kind of change.
    pub mutation_type: MutationType,
    /// Propagation stage.
    pub sync_status: SyncStatus,
    /// Owning survey.
    pub survey_id: SurveyId,
    /// LOI the change applies to, directly or through a submission.
    pub location_of_interest_id: LoiId,
    /// Author of the change.
    pub user_id: UserId,
    /// Device time the change was made.
    pub client_timestamp: DateTime<Utc>,
    /// Failed sync attempts so far.
    pub retry_count: u32,
    /// Diagnostic from the last failed attempt.
    pub last_error: String,
    /// Set when automatic retries stopped and the user has to retry.
    #[serde(default)]
    pub needs_manual_retry: bool,
}

impl MutationMeta {
    /// Metadata for a new, unpersisted mutation.
    pub fn new(
        mutation_type: MutationType,
        survey_id: impl Into<SurveyId>,
        location_of_interest_id: impl Into<LoiId>,
        user_id: impl Into<UserId>,
        client_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            mutation_type,
            sync_status: SyncStatus::Unknown,
            survey_id: survey_id.into(),
            location_of_interest_id: location_of_interest_id.into(),
            user_id: user_id.into(),
            client_timestamp,
            retry_count: 0,
            last_error: String::new(),
            needs_manual_retry: false,
        }
    }
}

/// Change to an LOI's fields or geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationOfInterestMutation {
    /// Shared metadata.
    pub meta: MutationMeta,
    /// Job the LOI belongs to.
    pub job_id: String,
    /// Replacement user-facing id.
    pub custom_id: Option<String>,
    /// Replacement caption.
    pub caption: Option<String>,
    /// Replacement geometry; absent for deletes.
    pub geometry: Option<Geometry>,
}

/// Change to a submission's answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionMutation {
    /// Shared metadata.
    pub meta: MutationMeta,
    /// Schema the answers refer to.
    pub job: Job,
    /// Submission being changed.
    pub submission_id: String,
    /// Per-task changes in edit order.
    pub response_deltas: Vec<ValueDelta>,
}

/// Pending local edit awaiting synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    /// Edit of an LOI.
    LocationOfInterest(LocationOfInterestMutation),
    /// Edit of a submission.
    Submission(SubmissionMutation),
}

/// Sparse override set; each `Some` replaces the base value.
///
/// Only lifecycle fields are overridable. Identity, type, references and
/// the client timestamp are carried forward from the base unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MutationOverrides {
    /// Id to assign; ignored when the base already has one.
    pub id: Option<MutationId>,
    /// Replacement status.
    pub sync_status: Option<SyncStatus>,
    /// Replacement retry count.
    pub retry_count: Option<u32>,
    /// Replacement error text.
    pub last_error: Option<String>,
    /// Replacement manual-retry flag.
    pub needs_manual_retry: Option<bool>,
}

impl MutationOverrides {
    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    fn apply_to(&self, meta: &mut MutationMeta) {
        if meta.id.is_none() {
            meta.id = self.id;
        }
        if let Some(v) = self.sync_status {
            meta.sync_status = v;
        }
        if let Some(v) = self.retry_count {
            meta.retry_count = v;
        }
        if let Some(v) = &self.last_error {
            meta.last_error = v.clone();
        }
        if let Some(v) = self.needs_manual_retry {
            meta.needs_manual_retry = v;
        }
    }
}

impl Mutation {
    /// Shared metadata.
    pub fn meta(&self) -> &MutationMeta {
        match self {
            Self::LocationOfInterest(m) => &m.meta,
            Self::Submission(m) => &m.meta,
        }
    }

    /// Local id, if persisted.
    pub fn id(&self) -> Option<MutationId> {
        self.meta().id
    }

    /// Current propagation stage.
    pub fn sync_status(&self) -> SyncStatus {
        self.meta().sync_status
    }

    /// Owning survey.
    pub fn survey_id(&self) -> &str {
        &self.meta().survey_id
    }

    /// Variant label used in logs and storage.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LocationOfInterest(_) => "loi",
            Self::Submission(_) => "submission",
        }
    }

    /// Remote entity id the mutation writes to.
    pub fn entity_id(&self) -> &str {
        match self {
            Self::LocationOfInterest(m) => &m.meta.location_of_interest_id,
            Self::Submission(m) => &m.submission_id,
        }
    }

    /// Returns a copy with `overrides` applied. `self` is left untouched.
    pub fn with_fields(&self, overrides: &MutationOverrides) -> Self {
        let mut next = self.clone();
        overrides.apply_to(next.meta_mut());
        next
    }

    /// Keeps only submission mutations, in input order.
    pub fn filter_submissions(mutations: &[Mutation]) -> Vec<SubmissionMutation> {
        mutations
            .iter()
            .filter_map(|m| match m {
                Self::Submission(s) => Some(s.clone()),
                Self::LocationOfInterest(_) => None,
            })
            .collect()
    }

    /// Keeps only LOI mutations, in input order.
    pub fn filter_location_of_interests(mutations: &[Mutation]) -> Vec<LocationOfInterestMutation> {
        mutations
            .iter()
            .filter_map(|m| match m {
                Self::LocationOfInterest(l) => Some(l.clone()),
                Self::Submission(_) => None,
            })
            .collect()
    }

    fn meta_mut(&mut self) -> &mut MutationMeta {
        match self {
            Self::LocationOfInterest(m) => &mut m.meta,
            Self::Submission(m) => &mut m.meta,
        }
    }
}

impl From<LocationOfInterestMutation> for Mutation {
    fn from(value: LocationOfInterestMutation) -> Self {
        Self::LocationOfInterest(value)
    }
}

impl From<SubmissionMutation> for Mutation {
    fn from(value: SubmissionMutation) -> Self {
        Self::Submission(value)
    }
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped mutation.
    pub mutation: Mutation,
}

impl MutationEnvelope {
    /// Constructs an envelope using [`MUTATION_FORMAT_VERSION`].
    pub fn new(mutation: Mutation) -> Self {
        Self {
            format_version: MUTATION_FORMAT_VERSION,
            mutation,
        }
    }
}
