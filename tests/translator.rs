use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::json;

use fieldsync::{
    geometry::{Coordinates, Geometry, LineString, LinearRing, MultiPolygon, Point, Polygon},
    model::{Job, Task, TaskType, TaskValue, User, ValueDelta},
    mutation::{LocationOfInterestMutation, Mutation, MutationMeta, SubmissionMutation},
    sync::{
        translator::{
            TranslateError, audit_info_from_remote, from_wire_timestamp, geometry_from_remote,
            loi_from_document, submission_from_document, to_remote_audit_info, to_remote_geometry,
            to_remote_write, to_wire_timestamp,
        },
        wire::{Collection, GeometryWire, LoiDocument, RemoteWrite, SubmissionDocument},
    },
    types::MutationType,
};

fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).expect("timestamp")
}

fn user() -> User {
    User {
        id: "u1".to_string(),
        display_name: "Ada".to_string(),
        photo_url: "https://example.com/ada.png".to_string(),
    }
}

fn ring(points: &[(f64, f64)]) -> LinearRing {
    LinearRing::new(points.iter().map(|(lat, lng)| Coordinates::new(*lat, *lng)).collect())
        .expect("ring")
}

fn job() -> Job {
    let task = |id: &str, index: u32, task_type: TaskType| Task {
        id: id.to_string(),
        index,
        task_type,
        label: id.to_string(),
        is_required: false,
    };
    Job {
        id: "job-1".to_string(),
        name: Some("Trees".to_string()),
        tasks: vec![
            task("species", 0, TaskType::Text),
            task("count", 1, TaskType::Number),
            task("kinds", 2, TaskType::MultipleChoice),
            task("seen", 3, TaskType::Date),
            task("area", 4, TaskType::DrawArea),
        ],
    }
}

fn submission_mutation(mutation_type: MutationType, deltas: Vec<ValueDelta>) -> Mutation {
    Mutation::Submission(SubmissionMutation {
        meta: MutationMeta::new(mutation_type, "s1", "loi-1", "u1", at(1_700_000_000)),
        job: job(),
        submission_id: "sub-1".to_string(),
        response_deltas: deltas,
    })
}

fn delta(task_id: &str, task_type: TaskType, value: Option<TaskValue>) -> ValueDelta {
    ValueDelta {
        task_id: task_id.to_string(),
        task_type,
        new_value: value,
    }
}

#[test]
fn timestamps_truncate_to_seconds() {
    let precise = DateTime::from_timestamp(1_700_000_123, 999_000_000).expect("timestamp");
    let wire = to_wire_timestamp(precise);
    assert_eq!(wire.seconds, 1_700_000_123);
    assert_eq!(from_wire_timestamp(wire).expect("decode"), at(1_700_000_123));
}

#[test]
fn audit_info_wire_shape_omits_missing_server_timestamp() {
    let wire = to_remote_audit_info(&user(), at(42), None);
    assert_eq!(
        serde_json::to_value(&wire).expect("encode"),
        json!({
            "userId": "u1",
            "photoUrl": "https://example.com/ada.png",
            "displayName": "Ada",
            "clientTimestamp": { "seconds": 42 },
        })
    );

    let with_server = to_remote_audit_info(&user(), at(42), Some(at(50)));
    let decoded = audit_info_from_remote(&with_server).expect("decode");
    assert_eq!(decoded.user, user());
    assert_eq!(decoded.client_timestamp, at(42));
    assert_eq!(decoded.server_timestamp, Some(at(50)));
}

#[test]
fn polygon_with_hole_wire_shape() {
    let polygon = Polygon::with_holes(
        ring(&[(0.0, 0.0), (0.0, 4.0), (4.0, 4.0), (0.0, 0.0)]),
        vec![ring(&[(1.0, 1.0), (1.0, 2.0), (2.0, 2.0), (1.0, 1.0)])],
    );
    let wire = to_remote_geometry(&Geometry::Polygon(polygon.clone())).expect("encode");
    let value = serde_json::to_value(&wire).expect("json");
    assert_eq!(
        value["polygon"]["shell"]["coordinates"][1],
        json!({ "latitude": 0.0, "longitude": 4.0 })
    );
    assert_eq!(value["polygon"]["holes"].as_array().map(Vec::len), Some(1));
    assert_eq!(
        geometry_from_remote(&wire).expect("decode"),
        Geometry::Polygon(polygon)
    );
}

#[test]
fn multipolygon_round_trips() {
    let geometry = Geometry::MultiPolygon(
        MultiPolygon::new(vec![
            Polygon::new(ring(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (0.0, 0.0)])),
            Polygon::new(ring(&[(5.0, 5.0), (5.0, 6.0), (6.0, 6.0), (5.0, 5.0)])),
        ])
        .expect("multipolygon"),
    );
    let wire = to_remote_geometry(&geometry).expect("encode");
    assert!(matches!(wire, GeometryWire::MultiPolygon(_)));
    assert_eq!(geometry_from_remote(&wire).expect("decode"), geometry);
}

#[test]
fn open_line_and_ring_have_no_remote_form() {
    let ring = ring(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (0.0, 0.0)]);
    assert!(matches!(
        to_remote_geometry(&Geometry::LinearRing(ring)),
        Err(TranslateError::UnsupportedVariant("LinearRing"))
    ));
}

#[test]
fn loi_update_writes_only_changed_fields() {
    let mutation = Mutation::LocationOfInterest(LocationOfInterestMutation {
        meta: MutationMeta::new(MutationType::Update, "s1", "loi-1", "u1", at(7)),
        job_id: "job-1".to_string(),
        custom_id: None,
        caption: None,
        geometry: Some(Geometry::Point(Point::new(Coordinates::new(1.0, 2.0)))),
    });
    let (path, write) = to_remote_write(&mutation, &user()).expect("translate");
    assert_eq!(path.collection, Collection::Lois);
    let RemoteWrite::Update(fields) = write else {
        panic!("expected field update");
    };
    let mut keys: Vec<_> = fields.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, vec!["geometry", "lastModified"]);
    assert_eq!(fields["lastModified"]["clientTimestamp"], json!({ "seconds": 7 }));
}

#[test]
fn loi_delete_removes_document() {
    let mutation = Mutation::LocationOfInterest(LocationOfInterestMutation {
        meta: MutationMeta::new(MutationType::Delete, "s1", "loi-9", "u1", at(7)),
        job_id: "job-1".to_string(),
        custom_id: None,
        caption: None,
        geometry: None,
    });
    let (path, write) = to_remote_write(&mutation, &user()).expect("translate");
    assert_eq!(path.to_string(), "surveys/s1/lois/loi-9");
    assert_eq!(write, RemoteWrite::Delete);
}

#[test]
fn submission_create_encodes_each_answer_type() {
    let area = Geometry::Polygon(Polygon::new(ring(&[
        (0.0, 0.0),
        (0.0, 1.0),
        (1.0, 1.0),
        (0.0, 0.0),
    ])));
    let mutation = submission_mutation(
        MutationType::Create,
        vec![
            delta("species", TaskType::Text, Some(TaskValue::Text("oak".to_string()))),
            delta("count", TaskType::Number, Some(TaskValue::Number(12.0))),
            delta(
                "kinds",
                TaskType::MultipleChoice,
                Some(TaskValue::MultipleChoice(vec!["a".to_string(), "b".to_string()])),
            ),
            delta("seen", TaskType::Date, Some(TaskValue::Date(at(1_600_000_000)))),
            delta("area", TaskType::DrawArea, Some(TaskValue::Geometry(area))),
        ],
    );

    let (path, write) = to_remote_write(&mutation, &user()).expect("translate");
    assert_eq!(path.to_string(), "surveys/s1/submissions/sub-1");
    let RemoteWrite::Set(doc) = write else {
        panic!("expected document set");
    };
    assert_eq!(doc["loiId"], json!("loi-1"));
    assert_eq!(doc["jobId"], json!("job-1"));
    assert_eq!(doc["data"]["species"], json!("oak"));
    assert_eq!(doc["data"]["count"], json!(12.0));
    assert_eq!(doc["data"]["kinds"], json!(["a", "b"]));
    assert_eq!(doc["data"]["seen"], json!({ "seconds": 1_600_000_000 }));
    assert!(doc["data"]["area"]["polygon"].is_object());
    assert_eq!(doc["created"], doc["lastModified"]);
}

#[test]
fn submission_update_uses_field_paths_and_null_for_cleared_answers() {
    let mutation = submission_mutation(
        MutationType::Update,
        vec![
            delta("species", TaskType::Text, None),
            delta("count", TaskType::Number, Some(TaskValue::Number(3.0))),
        ],
    );
    let (_, write) = to_remote_write(&mutation, &user()).expect("translate");
    let RemoteWrite::Update(fields) = write else {
        panic!("expected field update");
    };
    assert_eq!(fields["data.species"], serde_json::Value::Null);
    assert_eq!(fields["data.count"], json!(3.0));
    assert!(fields.contains_key("lastModified"));
}

#[test]
fn submission_deltas_are_checked_against_the_job() {
    let unknown = submission_mutation(
        MutationType::Update,
        vec![delta("missing", TaskType::Text, Some(TaskValue::Text("x".to_string())))],
    );
    assert!(matches!(
        to_remote_write(&unknown, &user()),
        Err(TranslateError::UnknownTask(id)) if id == "missing"
    ));

    let mismatched = submission_mutation(
        MutationType::Update,
        vec![delta("count", TaskType::Number, Some(TaskValue::Text("many".to_string())))],
    );
    assert!(matches!(
        to_remote_write(&mismatched, &user()),
        Err(TranslateError::TypeMismatch { .. })
    ));

    let not_finite = submission_mutation(
        MutationType::Update,
        vec![delta("count", TaskType::Number, Some(TaskValue::Number(f64::NAN)))],
    );
    assert!(matches!(
        to_remote_write(&not_finite, &user()),
        Err(TranslateError::MalformedValue { .. })
    ));
}

#[test]
fn loi_document_prefers_tagged_geometry() {
    let doc: LoiDocument = serde_json::from_value(json!({
        "jobId": "job-1",
        "customId": "P-7",
        "location": { "latitude": 9.0, "longitude": 9.0 },
        "geometry": { "point": { "coordinates": { "latitude": 1.0, "longitude": 2.0 } } },
        "created": { "userId": "u1", "photoUrl": "", "displayName": "Ada", "clientTimestamp": { "seconds": 5 } },
    }))
    .expect("document");

    let loi = loi_from_document("s1", "loi-1", &doc).expect("decode");
    assert_eq!(loi.geometry, Geometry::Point(Point::new(Coordinates::new(1.0, 2.0))));
    assert_eq!(loi.custom_id.as_deref(), Some("P-7"));
    assert_eq!(loi.last_modified, loi.created);
}

#[test]
fn loi_document_falls_back_to_legacy_location_and_geo_json() {
    let created = json!({ "userId": "u1", "photoUrl": "", "displayName": "Ada", "clientTimestamp": { "seconds": 5 } });

    let legacy_point: LoiDocument = serde_json::from_value(json!({
        "location": { "latitude": 3.0, "longitude": 4.0 },
        "created": created.clone(),
    }))
    .expect("document");
    assert_eq!(
        loi_from_document("s1", "a", &legacy_point).expect("decode").geometry,
        Geometry::Point(Point::new(Coordinates::new(3.0, 4.0)))
    );

    let geo_json = r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}"#;
    let legacy_area: LoiDocument = serde_json::from_value(json!({
        "geoJson": geo_json,
        "created": created.clone(),
    }))
    .expect("document");
    let Geometry::Polygon(polygon) = loi_from_document("s1", "b", &legacy_area)
        .expect("decode")
        .geometry
    else {
        panic!("expected polygon");
    };
    // GeoJSON positions are [longitude, latitude].
    assert_eq!(polygon.shell.coordinates()[1], Coordinates::new(0.0, 1.0));

    let no_geometry: LoiDocument =
        serde_json::from_value(json!({ "created": created })).expect("document");
    assert!(matches!(
        loi_from_document("s1", "c", &no_geometry),
        Err(TranslateError::MissingField("geometry"))
    ));
}

#[test]
fn submission_document_decodes_known_tasks_only() {
    let doc: SubmissionDocument = serde_json::from_value(json!({
        "loiId": "loi-1",
        "jobId": "job-1",
        "lastModified": { "userId": "u1", "photoUrl": "", "displayName": "Ada", "clientTimestamp": { "seconds": 9 } },
        "data": {
            "species": "elm",
            "count": 4,
            "retired-task": "ignored",
        },
    }))
    .expect("document");

    let submission = submission_from_document("s1", "sub-1", &job(), &doc).expect("decode");
    let mut expected = BTreeMap::new();
    expected.insert("count".to_string(), TaskValue::Number(4.0));
    expected.insert("species".to_string(), TaskValue::Text("elm".to_string()));
    assert_eq!(submission.responses, expected);
    assert!(submission.created.is_none());

    let mut other_job = job();
    other_job.id = "job-2".to_string();
    assert!(matches!(
        submission_from_document("s1", "sub-1", &other_job, &doc),
        Err(TranslateError::JobMismatch { .. })
    ));
}

#[test]
fn non_finite_coordinates_have_no_remote_form() {
    let nan_point = Geometry::Point(Point::new(Coordinates::new(f64::NAN, 1.0)));
    assert!(matches!(
        to_remote_geometry(&nan_point),
        Err(TranslateError::NonFiniteCoordinates { .. })
    ));

    let infinite_shell = Polygon::new(ring(&[
        (0.0, 0.0),
        (0.0, f64::INFINITY),
        (1.0, 1.0),
        (0.0, 0.0),
    ]));
    assert!(matches!(
        to_remote_geometry(&Geometry::Polygon(infinite_shell)),
        Err(TranslateError::NonFiniteCoordinates { .. })
    ));

    let create = Mutation::LocationOfInterest(LocationOfInterestMutation {
        meta: MutationMeta::new(MutationType::Create, "s1", "loi-1", "u1", at(1)),
        job_id: "job-1".to_string(),
        custom_id: None,
        caption: None,
        geometry: Some(nan_point),
    });
    let err = to_remote_write(&create, &user()).expect_err("nan latitude");
    assert!(err.to_string().contains("not finite"));
}

#[test]
fn decoding_local_geometry_enforces_constructor_rules() {
    let open_ring = json!([
        { "lat": 0.0, "lng": 0.0 },
        { "lat": 0.0, "lng": 1.0 },
        { "lat": 1.0, "lng": 1.0 },
        { "lat": 2.0, "lng": 2.0 },
    ]);
    assert!(serde_json::from_value::<LinearRing>(open_ring).is_err());

    let short_line = json!([{ "lat": 0.0, "lng": 0.0 }]);
    assert!(serde_json::from_value::<LineString>(short_line).is_err());
    assert!(serde_json::from_value::<MultiPolygon>(json!([])).is_err());

    let closed = ring(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (0.0, 0.0)]);
    let encoded = serde_json::to_value(&closed).expect("encode");
    assert_eq!(serde_json::from_value::<LinearRing>(encoded).expect("decode"), closed);
}
