use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::DateTime;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::watch;

use fieldsync::{
    config::{ConfigError, FieldSyncConfig},
    core::store::MutationStore,
    geometry::{Coordinates, Geometry, Point},
    logging::init_logging,
    model::{AuditInfo, Job, Task, TaskType, TaskValue, User, ValueDelta},
    mutation::Mutation,
    repository::{MutationRepository, RepositoryError, load_lois, load_submissions},
    runtime::handle::{RuntimeConfig, spawn_mutation_store},
    sync::{
        remote::{MemoryRemoteStore, RemoteError, RemoteStore},
        wire::{Collection, DocumentPath, RemoteWrite},
        worker::{SyncConfig, SyncWorker},
    },
    types::{MutationType, SyncStatus},
};

fn user() -> User {
    User {
        id: "user-1".to_string(),
        display_name: "Field Worker".to_string(),
        photo_url: String::new(),
    }
}

fn job() -> Job {
    Job {
        id: "job-1".to_string(),
        name: None,
        tasks: vec![Task {
            id: "notes".to_string(),
            index: 0,
            task_type: TaskType::Text,
            label: "Notes".to_string(),
            is_required: false,
        }],
    }
}

fn notes(text: Option<&str>) -> Vec<ValueDelta> {
    vec![ValueDelta {
        task_id: "notes".to_string(),
        task_type: TaskType::Text,
        new_value: text.map(|t| TaskValue::Text(t.to_string())),
    }]
}

fn audit(seconds: i64) -> Value {
    json!({ "userId": "u", "photoUrl": "", "displayName": "U", "clientTimestamp": { "seconds": seconds } })
}

/// Remote whose listing never finishes.
struct StalledRemote;

#[async_trait]
impl RemoteStore for StalledRemote {
    async fn write(&self, _path: &DocumentPath, _write: RemoteWrite) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn read(&self, _path: &DocumentPath) -> Result<Option<Value>, RemoteError> {
        Ok(None)
    }

    async fn list(
        &self,
        _survey_id: &str,
        _collection: Collection,
    ) -> Result<Vec<(String, Value)>, RemoteError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn repository_enqueues_typed_mutations() {
    let handle = spawn_mutation_store(MutationStore::in_memory(), RuntimeConfig::default());
    let repo = MutationRepository::new(handle.clone(), "survey-1", user());

    let point = Geometry::Point(Point::new(Coordinates::new(1.0, 1.0)));
    let (loi_id, create_id) = repo
        .create_loi("job-1", point.clone(), Some("gate".to_string()))
        .await
        .expect("create loi");
    assert_eq!(loi_id.len(), 36);

    let submission_id = repo.new_submission_id();
    assert_ne!(submission_id, repo.new_submission_id());
    repo.add_submission_mutation(&job(), &loi_id, &submission_id, notes(Some("first")), true)
        .await
        .expect("new submission");
    repo.add_submission_mutation(&job(), &loi_id, &submission_id, notes(None), false)
        .await
        .expect("edit submission");
    repo.delete_submission(&job(), &loi_id, &submission_id)
        .await
        .expect("delete submission");
    repo.update_loi_geometry(&loi_id, "job-1", point)
        .await
        .expect("move loi");
    repo.delete_loi(&loi_id, "job-1").await.expect("delete loi");

    assert_eq!(repo.pending_count().await.expect("count"), 6);

    let all = handle.list_all("survey-1").await.expect("list");
    let types: Vec<_> = all
        .iter()
        .map(|m| (m.kind(), m.meta().mutation_type))
        .collect();
    assert_eq!(
        types,
        vec![
            ("loi", MutationType::Create),
            ("submission", MutationType::Create),
            ("submission", MutationType::Update),
            ("submission", MutationType::Delete),
            ("loi", MutationType::Update),
            ("loi", MutationType::Delete),
        ]
    );
    assert!(all.iter().all(|m| m.sync_status() == SyncStatus::Pending));
    assert!(all.iter().all(|m| m.meta().user_id == "user-1"));
    assert_eq!(all[0].id(), Some(create_id));

    let Mutation::Submission(deleted) = &all[3] else {
        panic!("expected submission");
    };
    assert!(deleted.response_deltas.is_empty());
    assert_eq!(deleted.meta.location_of_interest_id, loi_id);
}

#[tokio::test]
async fn queued_edits_reach_remote_and_load_back() {
    let handle = spawn_mutation_store(MutationStore::in_memory(), RuntimeConfig::default());
    let remote = Arc::new(MemoryRemoteStore::new());
    let repo = MutationRepository::new(handle.clone(), "survey-1", user());

    let (loi_id, _) = repo
        .create_loi("job-1", Geometry::Point(Point::new(Coordinates::new(4.0, 5.0))), None)
        .await
        .expect("create loi");
    let submission_id = repo.new_submission_id();
    repo.add_submission_mutation(&job(), &loi_id, &submission_id, notes(Some("draft")), true)
        .await
        .expect("create");
    repo.add_submission_mutation(&job(), &loi_id, &submission_id, notes(Some("final")), false)
        .await
        .expect("update");

    let created_at = handle.list_all("survey-1").await.expect("list")[0]
        .meta()
        .client_timestamp;

    let mut worker = SyncWorker::new(handle.clone(), remote.clone(), user(), SyncConfig::default());
    let (_tx, mut rx) = watch::channel(false);
    let report = worker.run_pass("survey-1", &mut rx).await.expect("pass");
    assert_eq!(report.completed, 3);

    let doc = remote
        .read(&DocumentPath::new("survey-1", Collection::Submissions, &submission_id))
        .await
        .expect("read")
        .expect("uploaded submission");
    assert_eq!(doc["data"]["notes"], json!("final"));
    assert!(
        remote
            .read(&DocumentPath::new("survey-1", Collection::Submissions, "missing"))
            .await
            .expect("read")
            .is_none()
    );

    let limit = Duration::from_secs(1);
    let lois = load_lois(remote.as_ref(), "survey-1", limit).await.expect("lois");
    assert_eq!(lois.len(), 1);
    assert_eq!(lois[0].id, loi_id);
    let whole_seconds = DateTime::from_timestamp(created_at.timestamp(), 0).expect("timestamp");
    assert_eq!(lois[0].created, AuditInfo::local(user(), whole_seconds));

    let submissions = load_submissions(remote.as_ref(), "survey-1", &job(), &loi_id, limit)
        .await
        .expect("submissions");
    assert_eq!(submissions.len(), 1);
    assert_eq!(
        submissions[0].responses.get("notes"),
        Some(&TaskValue::Text("final".to_string()))
    );
    assert!(submissions[0].created.is_some());
}

#[tokio::test]
async fn loading_skips_undecodable_documents() {
    init_logging("warn");
    let remote = MemoryRemoteStore::new();
    remote.seed(
        DocumentPath::new("s1", Collection::Lois, "good"),
        json!({
            "geometry": { "point": { "coordinates": { "latitude": 1.0, "longitude": 1.0 } } },
            "created": audit(1),
        }),
    );
    remote.seed(
        DocumentPath::new("s1", Collection::Lois, "no-geometry"),
        json!({ "created": audit(1) }),
    );
    remote.seed(
        DocumentPath::new("s1", Collection::Lois, "not-an-object"),
        json!("garbage"),
    );
    remote.seed(
        DocumentPath::new("s1", Collection::Submissions, "mine"),
        json!({ "loiId": "good", "jobId": "job-1", "lastModified": audit(2), "data": { "notes": "ok" } }),
    );
    remote.seed(
        DocumentPath::new("s1", Collection::Submissions, "broken"),
        json!({ "loiId": "good", "jobId": "job-1", "lastModified": audit(2), "data": { "notes": 12 } }),
    );
    remote.seed(
        DocumentPath::new("s1", Collection::Submissions, "elsewhere"),
        json!({ "loiId": "other", "jobId": "job-1", "lastModified": audit(2), "data": {} }),
    );

    let limit = Duration::from_secs(1);
    let lois = load_lois(&remote, "s1", limit).await.expect("lois");
    assert_eq!(lois.iter().map(|l| l.id.as_str()).collect::<Vec<_>>(), vec!["good"]);

    let submissions = load_submissions(&remote, "s1", &job(), "good", limit)
        .await
        .expect("submissions");
    assert_eq!(
        submissions.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        vec!["mine"]
    );
}

#[tokio::test]
async fn loading_times_out() {
    let err = load_lois(&StalledRemote, "s1", Duration::from_millis(20))
        .await
        .expect_err("timeout");
    assert!(matches!(err, RepositoryError::Remote(RemoteError::Timeout(_))));
}

#[test]
fn config_defaults_fill_missing_keys() {
    let cfg = FieldSyncConfig::from_json_str(r#"{ "sync": { "max_attempts": 9 } }"#).expect("parse");
    assert_eq!(cfg.sync.max_attempts, 9);
    assert_eq!(cfg.sync.remote_load_timeout_ms, 5_000);
    assert_eq!(cfg.runtime, RuntimeConfig::default());
    assert_eq!(cfg.log_filter, "info");

    assert_eq!(
        FieldSyncConfig::from_json_str("{}").expect("empty"),
        FieldSyncConfig::default()
    );
    assert!(FieldSyncConfig::from_json_str("{ not json").is_err());
}

#[test]
fn config_loads_from_file() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("fieldsync.json");
    std::fs::write(
        &path,
        r#"{ "log_filter": "fieldsync=debug", "sync": { "poll_interval_ms": 250 } }"#,
    )
    .expect("write config");

    let cfg = FieldSyncConfig::from_file(&path).expect("load");
    assert_eq!(cfg.log_filter, "fieldsync=debug");
    assert_eq!(cfg.sync.poll_interval_ms, 250);
    assert_eq!(cfg.sync.max_attempts, SyncConfig::default().max_attempts);

    assert!(matches!(
        FieldSyncConfig::from_file(tmp.path().join("absent.json")),
        Err(ConfigError::Io(_))
    ));
}
