//! Mapping between local entities/mutations and the remote document schema.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::warn;

use crate::{
    geometry::{Coordinates, Geometry, GeometryError, LinearRing, MultiPolygon, Point, Polygon},
    model::{AuditInfo, Job, LocationOfInterest, Submission, Task, TaskType, TaskValue, User},
    mutation::{LocationOfInterestMutation, Mutation, SubmissionMutation},
    types::MutationType,
};

use super::wire::{
    AuditInfoWire, Collection, CoordinatesWire, DocumentPath, GeometryWire, LinearRingWire,
    LoiDocument, MultiPolygonWire, PointWire, PolygonWire, RemoteWrite, SubmissionDocument,
    Timestamp,
};

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("{0} has no remote representation")]
    UnsupportedVariant(&'static str),
    #[error("task `{0}` is not part of the job")]
    UnknownTask(String),
    #[error("value for task `{task_id}` does not match task type {expected:?}")]
    TypeMismatch { task_id: String, expected: TaskType },
    #[error("malformed value for task `{task_id}`: {reason}")]
    MalformedValue { task_id: String, reason: String },
    #[error("document is missing `{0}`")]
    MissingField(&'static str),
    #[error("timestamp {0}s is out of range")]
    InvalidTimestamp(i64),
    #[error("document belongs to job `{found}`, expected `{expected}`")]
    JobMismatch { expected: String, found: String },
    #[error("invalid geometry: {0}")]
    InvalidGeometry(#[from] GeometryError),
    #[error("coordinates ({lat}, {lng}) are not finite")]
    NonFiniteCoordinates { lat: f64, lng: f64 },
    #[error("invalid geoJson: {0}")]
    InvalidGeoJson(String),
    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type TranslateResult<T> = Result<T, TranslateError>;

// Timestamps

/// Truncates to whole seconds.
pub fn to_wire_timestamp(time: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: time.timestamp(),
    }
}

pub fn from_wire_timestamp(ts: Timestamp) -> TranslateResult<DateTime<Utc>> {
    DateTime::from_timestamp(ts.seconds, 0).ok_or(TranslateError::InvalidTimestamp(ts.seconds))
}

// Audit info

pub fn to_remote_audit_info(
    user: &User,
    client_timestamp: DateTime<Utc>,
    server_timestamp: Option<DateTime<Utc>>,
) -> AuditInfoWire {
    AuditInfoWire {
        user_id: user.id.clone(),
        photo_url: user.photo_url.clone(),
        display_name: user.display_name.clone(),
        client_timestamp: to_wire_timestamp(client_timestamp),
        server_timestamp: server_timestamp.map(to_wire_timestamp),
    }
}

pub fn audit_info_from_remote(wire: &AuditInfoWire) -> TranslateResult<AuditInfo> {
    Ok(AuditInfo {
        user: User {
            id: wire.user_id.clone(),
            display_name: wire.display_name.clone(),
            photo_url: wire.photo_url.clone(),
        },
        client_timestamp: from_wire_timestamp(wire.client_timestamp)?,
        server_timestamp: wire.server_timestamp.map(from_wire_timestamp).transpose()?,
    })
}

// Geometry

fn to_remote_coordinates(c: &Coordinates) -> TranslateResult<CoordinatesWire> {
    if !c.lat.is_finite() || !c.lng.is_finite() {
        return Err(TranslateError::NonFiniteCoordinates {
            lat: c.lat,
            lng: c.lng,
        });
    }
    Ok(CoordinatesWire {
        latitude: c.lat,
        longitude: c.lng,
    })
}

fn coordinates_from_remote(c: &CoordinatesWire) -> Coordinates {
    Coordinates::new(c.latitude, c.longitude)
}

fn to_remote_ring(ring: &LinearRing) -> TranslateResult<LinearRingWire> {
    let coordinates = ring
        .coordinates()
        .iter()
        .map(to_remote_coordinates)
        .collect::<TranslateResult<Vec<_>>>()?;
    Ok(LinearRingWire { coordinates })
}

fn ring_from_remote(wire: &LinearRingWire) -> TranslateResult<LinearRing> {
    let coords = wire.coordinates.iter().map(coordinates_from_remote).collect();
    Ok(LinearRing::new(coords)?)
}

fn to_remote_polygon(polygon: &Polygon) -> TranslateResult<PolygonWire> {
    Ok(PolygonWire {
        shell: to_remote_ring(&polygon.shell)?,
        holes: polygon
            .holes
            .iter()
            .map(to_remote_ring)
            .collect::<TranslateResult<Vec<_>>>()?,
    })
}

fn polygon_from_remote(wire: &PolygonWire) -> TranslateResult<Polygon> {
    let shell = ring_from_remote(&wire.shell)?;
    let holes = wire
        .holes
        .iter()
        .map(ring_from_remote)
        .collect::<TranslateResult<Vec<_>>>()?;
    Ok(Polygon::with_holes(shell, holes))
}

/// Encodes the wire-representable geometry variants. Non-finite
/// coordinates are rejected; JSON would carry them as `null`.
pub fn to_remote_geometry(geometry: &Geometry) -> TranslateResult<GeometryWire> {
    match geometry {
        Geometry::Point(p) => Ok(GeometryWire::Point(PointWire {
            coordinates: to_remote_coordinates(&p.coordinates)?,
        })),
        Geometry::Polygon(p) => Ok(GeometryWire::Polygon(to_remote_polygon(p)?)),
        Geometry::MultiPolygon(mp) => Ok(GeometryWire::MultiPolygon(MultiPolygonWire {
            polygons: mp
                .polygons()
                .iter()
                .map(to_remote_polygon)
                .collect::<TranslateResult<Vec<_>>>()?,
        })),
        Geometry::LineString(_) | Geometry::LinearRing(_) => {
            Err(TranslateError::UnsupportedVariant(geometry.variant_name()))
        }
    }
}

pub fn geometry_from_remote(wire: &GeometryWire) -> TranslateResult<Geometry> {
    match wire {
        GeometryWire::Point(p) => Ok(Geometry::Point(Point::new(coordinates_from_remote(
            &p.coordinates,
        )))),
        GeometryWire::Polygon(p) => Ok(Geometry::Polygon(polygon_from_remote(p)?)),
        GeometryWire::MultiPolygon(mp) => {
            let polygons = mp
                .polygons
                .iter()
                .map(polygon_from_remote)
                .collect::<TranslateResult<Vec<_>>>()?;
            Ok(Geometry::MultiPolygon(MultiPolygon::new(polygons)?))
        }
    }
}

// Task values

pub fn to_remote_value(task_id: &str, value: &TaskValue) -> TranslateResult<Value> {
    let encoded = match value {
        TaskValue::Text(s) | TaskValue::Photo(s) => Value::String(s.clone()),
        TaskValue::MultipleChoice(ids) => {
            Value::Array(ids.iter().cloned().map(Value::String).collect())
        }
        TaskValue::Number(n) => Number::from_f64(*n).map(Value::Number).ok_or_else(|| {
            TranslateError::MalformedValue {
                task_id: task_id.to_string(),
                reason: format!("{n} is not a finite number"),
            }
        })?,
        TaskValue::Date(t) | TaskValue::Time(t) => serde_json::to_value(to_wire_timestamp(*t))?,
        TaskValue::Geometry(g) => serde_json::to_value(to_remote_geometry(g)?)?,
    };
    Ok(encoded)
}

pub fn value_from_remote(task: &Task, value: &Value) -> TranslateResult<TaskValue> {
    let malformed = |reason: &str| TranslateError::MalformedValue {
        task_id: task.id.clone(),
        reason: reason.to_string(),
    };

    match task.task_type {
        TaskType::Text => value
            .as_str()
            .map(|s| TaskValue::Text(s.to_string()))
            .ok_or_else(|| malformed("expected a string")),
        TaskType::Photo => value
            .as_str()
            .map(|s| TaskValue::Photo(s.to_string()))
            .ok_or_else(|| malformed("expected a string")),
        TaskType::MultipleChoice => {
            let items = value.as_array().ok_or_else(|| malformed("expected an array"))?;
            let ids = items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| malformed("expected option ids"))?;
            Ok(TaskValue::MultipleChoice(ids))
        }
        TaskType::Number => value
            .as_f64()
            .map(TaskValue::Number)
            .ok_or_else(|| malformed("expected a number")),
        TaskType::Date => {
            let ts: Timestamp = serde_json::from_value(value.clone())?;
            Ok(TaskValue::Date(from_wire_timestamp(ts)?))
        }
        TaskType::Time => {
            let ts: Timestamp = serde_json::from_value(value.clone())?;
            Ok(TaskValue::Time(from_wire_timestamp(ts)?))
        }
        TaskType::DrawArea | TaskType::DropPin | TaskType::CaptureLocation => {
            let wire: GeometryWire = serde_json::from_value(value.clone())?;
            Ok(TaskValue::Geometry(geometry_from_remote(&wire)?))
        }
    }
}

// Mutations

/// Builds the remote write for `mutation`, attributed to `user`.
pub fn to_remote_write(
    mutation: &Mutation,
    user: &User,
) -> TranslateResult<(DocumentPath, RemoteWrite)> {
    match mutation {
        Mutation::LocationOfInterest(m) => loi_write(m, user),
        Mutation::Submission(m) => submission_write(m, user),
    }
}

fn loi_write(m: &LocationOfInterestMutation, user: &User) -> TranslateResult<(DocumentPath, RemoteWrite)> {
    let meta = &m.meta;
    let path = DocumentPath::new(&meta.survey_id, Collection::Lois, &meta.location_of_interest_id);
    let audit = to_remote_audit_info(user, meta.client_timestamp, None);

    let write = match meta.mutation_type {
        MutationType::Create => {
            let geometry = m
                .geometry
                .as_ref()
                .ok_or(TranslateError::MissingField("geometry"))?;
            let doc = LoiDocument {
                job_id: Some(m.job_id.clone()),
                custom_id: m.custom_id.clone(),
                caption: m.caption.clone(),
                location: None,
                geo_json: None,
                geometry: Some(to_remote_geometry(geometry)?),
                created: Some(audit.clone()),
                last_modified: Some(audit),
            };
            RemoteWrite::Set(serde_json::to_value(doc)?)
        }
        MutationType::Update => {
            let mut fields = Map::new();
            fields.insert("lastModified".to_string(), serde_json::to_value(audit)?);
            if let Some(geometry) = &m.geometry {
                fields.insert(
                    "geometry".to_string(),
                    serde_json::to_value(to_remote_geometry(geometry)?)?,
                );
            }
            if let Some(caption) = &m.caption {
                fields.insert("caption".to_string(), Value::String(caption.clone()));
            }
            if let Some(custom_id) = &m.custom_id {
                fields.insert("customId".to_string(), Value::String(custom_id.clone()));
            }
            RemoteWrite::Update(fields)
        }
        MutationType::Delete => RemoteWrite::Delete,
    };
    Ok((path, write))
}

fn submission_write(m: &SubmissionMutation, user: &User) -> TranslateResult<(DocumentPath, RemoteWrite)> {
    let meta = &m.meta;
    let path = DocumentPath::new(&meta.survey_id, Collection::Submissions, &m.submission_id);
    let audit = to_remote_audit_info(user, meta.client_timestamp, None);

    let write = match meta.mutation_type {
        MutationType::Create => {
            let mut data = BTreeMap::new();
            for (task_id, value) in encode_deltas(m)? {
                if let Some(value) = value {
                    data.insert(task_id, value);
                } else {
                    data.remove(&task_id);
                }
            }
            let doc = SubmissionDocument {
                loi_id: meta.location_of_interest_id.clone(),
                job_id: m.job.id.clone(),
                created: Some(audit.clone()),
                last_modified: audit,
                data,
            };
            RemoteWrite::Set(serde_json::to_value(doc)?)
        }
        MutationType::Update => {
            let mut fields = Map::new();
            fields.insert("lastModified".to_string(), serde_json::to_value(audit)?);
            for (task_id, value) in encode_deltas(m)? {
                fields.insert(format!("data.{task_id}"), value.unwrap_or(Value::Null));
            }
            RemoteWrite::Update(fields)
        }
        MutationType::Delete => RemoteWrite::Delete,
    };
    Ok((path, write))
}

/// Checks each delta against the job and encodes it; `None` means cleared.
fn encode_deltas(m: &SubmissionMutation) -> TranslateResult<Vec<(String, Option<Value>)>> {
    let mut out = Vec::with_capacity(m.response_deltas.len());
    for delta in &m.response_deltas {
        let task = m
            .job
            .task(&delta.task_id)
            .ok_or_else(|| TranslateError::UnknownTask(delta.task_id.clone()))?;
        let mismatch = || TranslateError::TypeMismatch {
            task_id: task.id.clone(),
            expected: task.task_type,
        };
        if delta.task_type != task.task_type {
            return Err(mismatch());
        }
        let encoded = match &delta.new_value {
            Some(value) if !value.matches(task.task_type) => return Err(mismatch()),
            Some(value) => Some(to_remote_value(&task.id, value)?),
            None => None,
        };
        out.push((delta.task_id.clone(), encoded));
    }
    Ok(out)
}

// Documents

pub fn loi_from_document(
    survey_id: &str,
    loi_id: &str,
    doc: &LoiDocument,
) -> TranslateResult<LocationOfInterest> {
    let geometry = if let Some(wire) = &doc.geometry {
        geometry_from_remote(wire)?
    } else if let Some(location) = &doc.location {
        Geometry::Point(Point::new(Coordinates::new(location.latitude, location.longitude)))
    } else if let Some(geo_json) = &doc.geo_json {
        geometry_from_geo_json(geo_json)?
    } else {
        return Err(TranslateError::MissingField("geometry"));
    };

    let created = doc
        .created
        .as_ref()
        .ok_or(TranslateError::MissingField("created"))?;
    let last_modified = doc.last_modified.as_ref().unwrap_or(created);

    Ok(LocationOfInterest {
        id: loi_id.to_string(),
        survey_id: survey_id.to_string(),
        job_id: doc.job_id.clone(),
        custom_id: doc.custom_id.clone(),
        caption: doc.caption.clone(),
        geometry,
        created: audit_info_from_remote(created)?,
        last_modified: audit_info_from_remote(last_modified)?,
    })
}

/// Decodes a submission against its job. Answers for tasks the job no
/// longer has are dropped.
pub fn submission_from_document(
    survey_id: &str,
    submission_id: &str,
    job: &Job,
    doc: &SubmissionDocument,
) -> TranslateResult<Submission> {
    if doc.job_id != job.id {
        return Err(TranslateError::JobMismatch {
            expected: job.id.clone(),
            found: doc.job_id.clone(),
        });
    }

    let mut responses = BTreeMap::new();
    for (task_id, value) in &doc.data {
        let Some(task) = job.task(task_id) else {
            warn!(submission_id, task_id, "dropping answer for unknown task");
            continue;
        };
        if value.is_null() {
            continue;
        }
        responses.insert(task_id.clone(), value_from_remote(task, value)?);
    }

    Ok(Submission {
        id: submission_id.to_string(),
        survey_id: survey_id.to_string(),
        loi_id: doc.loi_id.clone(),
        job_id: doc.job_id.clone(),
        created: doc.created.as_ref().map(audit_info_from_remote).transpose()?,
        last_modified: audit_info_from_remote(&doc.last_modified)?,
        responses,
    })
}

/// Parses a legacy GeoJSON Point, Polygon or MultiPolygon. Positions are
/// `[longitude, latitude]`.
pub fn geometry_from_geo_json(text: &str) -> TranslateResult<Geometry> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| TranslateError::InvalidGeoJson(e.to_string()))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| TranslateError::InvalidGeoJson("missing type".to_string()))?;
    let coords = value
        .get("coordinates")
        .ok_or_else(|| TranslateError::InvalidGeoJson("missing coordinates".to_string()))?;

    match kind {
        "Point" => Ok(Geometry::Point(Point::new(geo_json_position(coords)?))),
        "Polygon" => Ok(Geometry::Polygon(geo_json_polygon(coords)?)),
        "MultiPolygon" => {
            let polygons = geo_json_array(coords)?
                .iter()
                .map(geo_json_polygon)
                .collect::<TranslateResult<Vec<_>>>()?;
            Ok(Geometry::MultiPolygon(MultiPolygon::new(polygons)?))
        }
        other => Err(TranslateError::InvalidGeoJson(format!(
            "unsupported type {other}"
        ))),
    }
}

fn geo_json_array(value: &Value) -> TranslateResult<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| TranslateError::InvalidGeoJson("expected an array".to_string()))
}

fn geo_json_position(value: &Value) -> TranslateResult<Coordinates> {
    let pair = geo_json_array(value)?;
    match (
        pair.first().and_then(Value::as_f64),
        pair.get(1).and_then(Value::as_f64),
    ) {
        (Some(lng), Some(lat)) => Ok(Coordinates::new(lat, lng)),
        _ => Err(TranslateError::InvalidGeoJson("bad position".to_string())),
    }
}

fn geo_json_polygon(value: &Value) -> TranslateResult<Polygon> {
    let mut rings = geo_json_array(value)?.iter().map(|ring| -> TranslateResult<LinearRing> {
        let coords = geo_json_array(ring)?
            .iter()
            .map(geo_json_position)
            .collect::<TranslateResult<Vec<_>>>()?;
        Ok(LinearRing::new(coords)?)
    });
    let shell = rings
        .next()
        .ok_or_else(|| TranslateError::InvalidGeoJson("polygon without rings".to_string()))??;
    let holes = rings.collect::<TranslateResult<Vec<_>>>()?;
    Ok(Polygon::with_holes(shell, holes))
}
