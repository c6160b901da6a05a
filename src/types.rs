//! Shared primitive IDs and mutation lifecycle enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Local mutation identifier assigned by the store.
pub type MutationId = i64;
/// Survey identifier.
pub type SurveyId = String;
/// Location-of-interest identifier.
pub type LoiId = String;
/// User identifier.
pub type UserId = String;

/// Kind of change a mutation describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationType {
    /// A new entity.
    Create,
    /// Changes to an existing entity.
    Update,
    /// Removal of an existing entity.
    Delete,
}

/// Lifecycle stage of a mutation's propagation to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Waiting for the sync worker.
    Pending,
    /// Claimed by the sync worker.
    InProgress,
    /// Written to the remote store.
    Completed,
    /// Last attempt failed.
    Failed,
    /// Not yet persisted locally.
    Unknown,
}

impl SyncStatus {
    /// Stable column label used by the local store.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parses a column label written by [`SyncStatus::as_str`].
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "PENDING" => Some(Self::Pending),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// True for statuses the sync worker picks up.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }

    /// Returns whether the regular lifecycle allows moving to `next`.
    ///
    /// `Pending -> InProgress -> {Completed | Failed}` and
    /// `Failed -> InProgress`. The crash-recovery sweep back to `Pending` is
    /// not a regular transition.
    pub fn can_transition_to(self, next: SyncStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::Failed, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
