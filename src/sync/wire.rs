//! Remote document schema.
//!
//! Field names follow the remote store's camelCase convention. Optional
//! fields are omitted when absent rather than written as `null`, except in
//! field-path updates where `null` deletes the field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Second-resolution timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditInfoWire {
    pub user_id: String,
    pub photo_url: String,
    pub display_name: String,
    pub client_timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_timestamp: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinatesWire {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointWire {
    pub coordinates: CoordinatesWire,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRingWire {
    pub coordinates: Vec<CoordinatesWire>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonWire {
    pub shell: LinearRingWire,
    #[serde(default)]
    pub holes: Vec<LinearRingWire>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiPolygonWire {
    pub polygons: Vec<PolygonWire>,
}

/// Tagged geometry union; exactly one key is present on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GeometryWire {
    Point(PointWire),
    Polygon(PolygonWire),
    MultiPolygon(MultiPolygonWire),
}

/// Legacy point location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPointWire {
    pub latitude: f64,
    pub longitude: f64,
}

/// LOI entity stored remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoiDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPointWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_json: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<GeometryWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<AuditInfoWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<AuditInfoWire>,
}

/// Submission entity stored remotely. `data` maps task ids to encoded
/// answers; decoding needs the job to know each task's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDocument {
    pub loi_id: String,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<AuditInfoWire>,
    pub last_modified: AuditInfoWire,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
}

/// Collections under `surveys/{surveyId}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    Lois,
    Submissions,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lois => "lois",
            Self::Submissions => "submissions",
        }
    }
}

/// Location of one remote document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    pub survey_id: String,
    pub collection: Collection,
    pub document_id: String,
}

impl DocumentPath {
    pub fn new(
        survey_id: impl Into<String>,
        collection: Collection,
        document_id: impl Into<String>,
    ) -> Self {
        Self {
            survey_id: survey_id.into(),
            collection,
            document_id: document_id.into(),
        }
    }
}

impl std::fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "surveys/{}/{}/{}",
            self.survey_id,
            self.collection.as_str(),
            self.document_id
        )
    }
}

/// One remote document write.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteWrite {
    /// Replace the document.
    Set(Value),
    /// Replace individual fields. Keys are dot-separated field paths
    /// (`data.task1`); a `null` value deletes the field.
    Update(Map<String, Value>),
    /// Remove the document.
    Delete,
}
