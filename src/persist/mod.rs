pub mod memory;
pub mod sqlite;

use thiserror::Error;

use crate::{
    mutation::Mutation,
    types::{MutationId, SyncStatus},
};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("payload encoding: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("mutation {0} not found in local store")]
    MissingRow(MutationId),
    #[error("{0}")]
    Message(String),
}

pub type PersistResult<T> = Result<T, PersistError>;

/// Row filter for [`LocalStore::query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationQuery {
    pub survey_id: String,
    pub location_of_interest_id: Option<String>,
    /// Empty matches every status.
    pub statuses: Vec<SyncStatus>,
}

impl MutationQuery {
    pub fn survey(survey_id: impl Into<String>) -> Self {
        Self {
            survey_id: survey_id.into(),
            location_of_interest_id: None,
            statuses: Vec::new(),
        }
    }

    pub fn with_statuses(mut self, statuses: &[SyncStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn for_loi(mut self, loi_id: impl Into<String>) -> Self {
        self.location_of_interest_id = Some(loi_id.into());
        self
    }

    pub fn matches(&self, mutation: &Mutation) -> bool {
        let meta = mutation.meta();
        meta.survey_id == self.survey_id
            && self
                .location_of_interest_id
                .as_ref()
                .is_none_or(|loi| &meta.location_of_interest_id == loi)
            && (self.statuses.is_empty() || self.statuses.contains(&meta.sync_status))
    }
}

/// Row store holding mutation records keyed by (survey, entity, id).
///
/// Every method is a single atomic write or read.
pub trait LocalStore: Send {
    /// Persists a new row and returns its assigned id.
    fn insert(&mut self, mutation: &Mutation) -> PersistResult<MutationId>;
    /// Overwrites the row with the mutation's id.
    fn update(&mut self, mutation: &Mutation) -> PersistResult<()>;
    fn get(&self, id: MutationId) -> PersistResult<Option<Mutation>>;
    /// Rows matching `query`, ordered by client timestamp then id.
    fn query(&self, query: &MutationQuery) -> PersistResult<Vec<Mutation>>;
    /// Number of rows matching `query`, without decoding them.
    fn count(&self, query: &MutationQuery) -> PersistResult<usize>;
    /// Deletes a survey's rows in `status`; returns the number removed.
    fn delete(&mut self, survey_id: &str, status: SyncStatus) -> PersistResult<usize>;
    /// Ids of IN_PROGRESS rows across all surveys.
    fn in_progress_ids(&self) -> PersistResult<Vec<MutationId>>;
}
