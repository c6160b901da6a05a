//! Remote document store seam and an in-memory implementation.

use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use hashbrown::HashMap;
use serde_json::{Map, Value};
use thiserror::Error;

use super::wire::{Collection, DocumentPath, RemoteWrite};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
    #[error("remote write timed out after {0:?}")]
    Timeout(Duration),
    #[error("document {0} does not exist")]
    NotFound(String),
    #[error("remote store rejected the write: {0}")]
    Rejected(String),
}

/// Document store the sync worker writes to.
///
/// Each write is independent; no multi-document transaction is assumed.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn write(&self, path: &DocumentPath, write: RemoteWrite) -> Result<(), RemoteError>;

    async fn read(&self, path: &DocumentPath) -> Result<Option<Value>, RemoteError>;

    /// All documents of a collection as `(document_id, document)`, sorted by id.
    async fn list(
        &self,
        survey_id: &str,
        collection: Collection,
    ) -> Result<Vec<(String, Value)>, RemoteError>;
}

/// Process-local [`RemoteStore`] for tests and offline demos.
///
/// Failures and latency can be injected to exercise retry and timeout
/// handling.
#[derive(Default)]
pub struct MemoryRemoteStore {
    docs: Mutex<HashMap<DocumentPath, Value>>,
    writes: Mutex<Vec<(DocumentPath, RemoteWrite)>>,
    fail_next: AtomicUsize,
    latency: Mutex<Option<Duration>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` writes fail with [`RemoteError::Unavailable`].
    pub fn fail_next_writes(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Delays every write by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut guard) = self.latency.lock() {
            *guard = latency;
        }
    }

    /// Stores a document directly, bypassing the write log.
    pub fn seed(&self, path: DocumentPath, doc: Value) {
        if let Ok(mut docs) = self.docs.lock() {
            docs.insert(path, doc);
        }
    }

    pub fn document(&self, path: &DocumentPath) -> Option<Value> {
        self.docs.lock().ok().and_then(|docs| docs.get(path).cloned())
    }

    /// Successful writes in the order they were applied.
    pub fn write_log(&self) -> Vec<(DocumentPath, RemoteWrite)> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn apply(&self, path: &DocumentPath, write: &RemoteWrite) -> Result<(), RemoteError> {
        let mut docs = self
            .docs
            .lock()
            .map_err(|_| RemoteError::Unavailable("document map poisoned".to_string()))?;
        match write {
            RemoteWrite::Set(doc) => {
                docs.insert(path.clone(), doc.clone());
            }
            RemoteWrite::Update(fields) => {
                let doc = docs
                    .get_mut(path)
                    .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
                let Value::Object(root) = doc else {
                    return Err(RemoteError::Rejected(format!("{path} is not an object")));
                };
                for (field_path, value) in fields {
                    apply_field(root, field_path, value.clone());
                }
            }
            RemoteWrite::Delete => {
                docs.remove(path);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn write(&self, path: &DocumentPath, write: RemoteWrite) -> Result<(), RemoteError> {
        let latency = self.latency.lock().ok().and_then(|l| *l);
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if self.take_failure() {
            return Err(RemoteError::Unavailable("injected failure".to_string()));
        }

        self.apply(path, &write)?;
        if let Ok(mut log) = self.writes.lock() {
            log.push((path.clone(), write));
        }
        Ok(())
    }

    async fn read(&self, path: &DocumentPath) -> Result<Option<Value>, RemoteError> {
        Ok(self.document(path))
    }

    async fn list(
        &self,
        survey_id: &str,
        collection: Collection,
    ) -> Result<Vec<(String, Value)>, RemoteError> {
        let docs = self
            .docs
            .lock()
            .map_err(|_| RemoteError::Unavailable("document map poisoned".to_string()))?;
        let mut out: Vec<(String, Value)> = docs
            .iter()
            .filter(|(p, _)| p.survey_id == survey_id && p.collection == collection)
            .map(|(p, doc)| (p.document_id.clone(), doc.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

/// Sets or (for `null`) deletes the field at a dot-separated path,
/// creating intermediate objects as needed.
fn apply_field(root: &mut Map<String, Value>, field_path: &str, value: Value) {
    let mut segments: Vec<&str> = field_path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut node = root;
    for segment in segments {
        let entry = node
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        node = next;
    }

    if value.is_null() {
        node.remove(leaf);
    } else {
        node.insert(leaf.to_string(), value);
    }
}
