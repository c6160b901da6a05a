//! Survey domain records: users, jobs, tasks, responses and entities.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    geometry::Geometry,
    types::{LoiId, SurveyId, UserId},
};

/// Signed-in user as recorded in audit info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable user id.
    pub id: UserId,
    /// Name shown next to edits.
    pub display_name: String,
    /// Avatar location.
    pub photo_url: String,
}

/// Who changed an entity and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInfo {
    /// User that made the change.
    pub user: User,
    /// Device time of the change.
    pub client_timestamp: DateTime<Utc>,
    /// Time the remote store acknowledged the change, once known.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl AuditInfo {
    /// Audit info for a change made locally and not yet acknowledged.
    pub fn local(user: User, client_timestamp: DateTime<Utc>) -> Self {
        Self {
            user,
            client_timestamp,
            server_timestamp: None,
        }
    }
}

/// Answer type of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Free text.
    Text,
    /// One or more option ids.
    MultipleChoice,
    /// Numeric value.
    Number,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Photo reference.
    Photo,
    /// Polygon drawn on the map.
    DrawArea,
    /// Point dropped on the map.
    DropPin,
    /// Device location.
    CaptureLocation,
}

/// One question within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task id, unique within its job.
    pub id: String,
    /// Display position.
    pub index: u32,
    /// Expected answer type.
    pub task_type: TaskType,
    /// Question label.
    pub label: String,
    /// Whether an answer is mandatory.
    pub is_required: bool,
}

/// Schema of the tasks answered for an LOI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Job id.
    pub id: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Tasks in display order.
    pub tasks: Vec<Task>,
}

impl Job {
    /// Looks up a task by id.
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }
}

/// Answer to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum TaskValue {
    /// Free text.
    Text(String),
    /// Selected option ids.
    MultipleChoice(Vec<String>),
    /// Numeric value.
    Number(f64),
    /// Calendar date.
    Date(DateTime<Utc>),
    /// Time of day.
    Time(DateTime<Utc>),
    /// Remote path of an uploaded photo.
    Photo(String),
    /// Geometry answer for draw-area, drop-pin and capture-location tasks.
    Geometry(Geometry),
}

impl TaskValue {
    /// Returns whether this value can answer a task of `task_type`.
    pub fn matches(&self, task_type: TaskType) -> bool {
        matches!(
            (self, task_type),
            (Self::Text(_), TaskType::Text)
                | (Self::MultipleChoice(_), TaskType::MultipleChoice)
                | (Self::Number(_), TaskType::Number)
                | (Self::Date(_), TaskType::Date)
                | (Self::Time(_), TaskType::Time)
                | (Self::Photo(_), TaskType::Photo)
                | (
                    Self::Geometry(_),
                    TaskType::DrawArea | TaskType::DropPin | TaskType::CaptureLocation
                )
        )
    }
}

/// Change to one task's answer. `new_value: None` clears the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueDelta {
    /// Task being answered.
    pub task_id: String,
    /// Type of the task at edit time.
    pub task_type: TaskType,
    /// Replacement answer, or `None` when cleared.
    pub new_value: Option<TaskValue>,
}

/// Site under survey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationOfInterest {
    /// LOI id.
    pub id: LoiId,
    /// Owning survey.
    pub survey_id: SurveyId,
    /// Job whose tasks apply to this LOI.
    pub job_id: Option<String>,
    /// User-facing identifier.
    pub custom_id: Option<String>,
    /// Short description.
    pub caption: Option<String>,
    /// Location or area.
    pub geometry: Geometry,
    /// Creation audit.
    pub created: AuditInfo,
    /// Last modification audit.
    pub last_modified: AuditInfo,
}

/// Answers collected for one LOI against one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Submission id.
    pub id: String,
    /// Owning survey.
    pub survey_id: SurveyId,
    /// LOI the answers describe.
    pub loi_id: LoiId,
    /// Job that defines the tasks.
    pub job_id: String,
    /// Creation audit, absent on documents written by partial merges.
    pub created: Option<AuditInfo>,
    /// Last modification audit.
    pub last_modified: AuditInfo,
    /// Answers keyed by task id.
    pub responses: BTreeMap<String, TaskValue>,
}
