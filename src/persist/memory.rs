//! Volatile [`LocalStore`] used for tests and for surveys opened without
//! a database file.

use hashbrown::HashMap;

use crate::{
    mutation::{Mutation, MutationOverrides},
    types::{MutationId, SyncStatus},
};

use super::{LocalStore, MutationQuery, PersistError, PersistResult};

#[derive(Debug)]
pub struct MemoryLocalStore {
    rows: HashMap<MutationId, Mutation>,
    next_id: MutationId,
}

impl Default for MemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self {
            rows: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl LocalStore for MemoryLocalStore {
    fn insert(&mut self, mutation: &Mutation) -> PersistResult<MutationId> {
        let id = self.next_id;
        self.next_id += 1;
        let stored = mutation.with_fields(&MutationOverrides {
            id: Some(id),
            ..MutationOverrides::default()
        });
        self.rows.insert(id, stored);
        Ok(id)
    }

    fn update(&mut self, mutation: &Mutation) -> PersistResult<()> {
        let id = mutation
            .id()
            .ok_or_else(|| PersistError::Message("update of unpersisted mutation".to_string()))?;
        let row = self.rows.get_mut(&id).ok_or(PersistError::MissingRow(id))?;
        *row = mutation.clone();
        Ok(())
    }

    fn get(&self, id: MutationId) -> PersistResult<Option<Mutation>> {
        Ok(self.rows.get(&id).cloned())
    }

    fn query(&self, query: &MutationQuery) -> PersistResult<Vec<Mutation>> {
        let mut out: Vec<Mutation> = self
            .rows
            .values()
            .filter(|m| query.matches(m))
            .cloned()
            .collect();
        out.sort_by_key(|m| (m.meta().client_timestamp, m.id()));
        Ok(out)
    }

    fn count(&self, query: &MutationQuery) -> PersistResult<usize> {
        Ok(self.rows.values().filter(|m| query.matches(m)).count())
    }

    fn delete(&mut self, survey_id: &str, status: SyncStatus) -> PersistResult<usize> {
        let before = self.rows.len();
        self.rows
            .retain(|_, m| !(m.survey_id() == survey_id && m.sync_status() == status));
        Ok(before - self.rows.len())
    }

    fn in_progress_ids(&self) -> PersistResult<Vec<MutationId>> {
        let mut ids: Vec<MutationId> = self
            .rows
            .iter()
            .filter(|(_, m)| m.sync_status() == SyncStatus::InProgress)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
