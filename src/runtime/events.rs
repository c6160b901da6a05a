//! Runtime event stream payloads.

use crate::types::{MutationId, SurveyId, SyncStatus};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationEvent {
    /// A mutation was persisted with status PENDING.
    Created {
        /// Assigned id.
        id: MutationId,
        /// Owning survey.
        survey_id: SurveyId,
    },
    /// A mutation moved to a new status.
    StatusChanged {
        /// Mutation id.
        id: MutationId,
        /// New status.
        status: SyncStatus,
    },
    /// Interrupted IN_PROGRESS mutations went back to PENDING.
    Released {
        /// Owning survey.
        survey_id: SurveyId,
        /// Number of mutations released.
        count: usize,
    },
    /// Completed mutations were deleted.
    Purged {
        /// Owning survey.
        survey_id: SurveyId,
        /// Number of mutations deleted.
        removed: usize,
    },
    /// Number of PENDING and FAILED mutations after a write.
    PendingCount {
        /// Owning survey.
        survey_id: SurveyId,
        /// Mutations still waiting to sync.
        count: usize,
    },
}
