//! SQLite-backed mutation row store.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::{
    mutation::{MUTATION_FORMAT_VERSION, Mutation, MutationEnvelope, MutationOverrides},
    types::{MutationId, SyncStatus},
};

use super::{LocalStore, MutationQuery, PersistError, PersistResult};

const SELECT_COLUMNS: &str = "SELECT id, payload FROM mutations";

/// SQLite implementation of [`crate::persist::LocalStore`].
pub struct SqliteLocalStore {
    conn: Connection,
}

impl SqliteLocalStore {
    /// Opens or creates a SQLite-backed store at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory SQLite store.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    /// Number of rows across all surveys.
    pub fn row_count(&self) -> PersistResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM mutations", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn collect_rows(&self, sql: &str, args: Vec<String>) -> PersistResult<Vec<Mutation>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), row_to_mutation)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl LocalStore for SqliteLocalStore {
    fn insert(&mut self, mutation: &Mutation) -> PersistResult<MutationId> {
        let payload = serde_json::to_vec(&MutationEnvelope::new(mutation.clone()))?;
        let meta = mutation.meta();
        self.conn.execute(
            "INSERT INTO mutations(survey_id, loi_id, entity_id, kind, sync_status, client_ts_s, client_ts_ns, retry_count, last_error, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                meta.survey_id,
                meta.location_of_interest_id,
                mutation.entity_id(),
                mutation.kind(),
                meta.sync_status.as_str(),
                meta.client_timestamp.timestamp(),
                i64::from(meta.client_timestamp.timestamp_subsec_nanos()),
                i64::from(meta.retry_count),
                meta.last_error,
                payload,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update(&mut self, mutation: &Mutation) -> PersistResult<()> {
        let id = mutation
            .id()
            .ok_or_else(|| PersistError::Message("update of unpersisted mutation".to_string()))?;
        let payload = serde_json::to_vec(&MutationEnvelope::new(mutation.clone()))?;
        let meta = mutation.meta();
        let changed = self.conn.execute(
            "UPDATE mutations SET sync_status = ?1, retry_count = ?2, last_error = ?3, payload = ?4 WHERE id = ?5",
            params![
                meta.sync_status.as_str(),
                i64::from(meta.retry_count),
                meta.last_error,
                payload,
                id,
            ],
        )?;
        if changed == 0 {
            return Err(PersistError::MissingRow(id));
        }
        Ok(())
    }

    fn get(&self, id: MutationId) -> PersistResult<Option<Mutation>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![id], row_to_mutation)
            .optional()?;
        Ok(row)
    }

    fn query(&self, query: &MutationQuery) -> PersistResult<Vec<Mutation>> {
        let (filter, args) = where_clause(query);
        let sql = format!("{SELECT_COLUMNS} {filter} ORDER BY client_ts_s ASC, client_ts_ns ASC, id ASC");
        self.collect_rows(&sql, args)
    }

    fn count(&self, query: &MutationQuery) -> PersistResult<usize> {
        let (filter, args) = where_clause(query);
        let sql = format!("SELECT COUNT(*) FROM mutations {filter}");
        let n: i64 = self
            .conn
            .query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))?;
        Ok(n as usize)
    }

    fn delete(&mut self, survey_id: &str, status: SyncStatus) -> PersistResult<usize> {
        let count = self.conn.execute(
            "DELETE FROM mutations WHERE survey_id = ?1 AND sync_status = ?2",
            params![survey_id, status.as_str()],
        )?;
        Ok(count)
    }

    fn in_progress_ids(&self) -> PersistResult<Vec<MutationId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM mutations WHERE sync_status = ?1 ORDER BY id ASC")?;
        let rows = stmt.query_map(params![SyncStatus::InProgress.as_str()], |row| row.get(0))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// `WHERE` clause and positional arguments for `query`.
fn where_clause(query: &MutationQuery) -> (String, Vec<String>) {
    let mut sql = "WHERE survey_id = ?1".to_string();
    let mut args = vec![query.survey_id.clone()];

    if let Some(loi) = &query.location_of_interest_id {
        args.push(loi.clone());
        sql.push_str(&format!(" AND loi_id = ?{}", args.len()));
    }

    if !query.statuses.is_empty() {
        let mut placeholders = Vec::with_capacity(query.statuses.len());
        for status in &query.statuses {
            args.push(status.as_str().to_string());
            placeholders.push(format!("?{}", args.len()));
        }
        sql.push_str(&format!(" AND sync_status IN ({})", placeholders.join(", ")));
    }

    (sql, args)
}

fn row_to_mutation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Mutation> {
    let id: MutationId = row.get(0)?;
    let payload: Vec<u8> = row.get(1)?;
    let mutation = decode_mutation_payload(&payload).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            payload.len(),
            rusqlite::types::Type::Blob,
            Box::new(std::io::Error::other(err)),
        )
    })?;
    // Rows inserted before their id existed carry `id: None` in the payload.
    Ok(mutation.with_fields(&MutationOverrides {
        id: Some(id),
        ..MutationOverrides::default()
    }))
}

fn decode_mutation_payload(payload: &[u8]) -> Result<Mutation, String> {
    let envelope = serde_json::from_slice::<MutationEnvelope>(payload)
        .map_err(|e| format!("mutation payload decode failed: {e}"))?;
    if envelope.format_version != MUTATION_FORMAT_VERSION {
        return Err(format!(
            "unsupported mutation format version: {}",
            envelope.format_version
        ));
    }
    Ok(envelope.mutation)
}
