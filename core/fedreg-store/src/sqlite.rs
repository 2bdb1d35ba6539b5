//! SQLite-backed record store.
//!
//! Each record is stored as its JSON body next to the columns lookups key on.
//! Filtering and sorting run over the decoded entries.

use async_trait::async_trait;
use fedreg_model::RegistryEntry;
use fedreg_types::EntryId;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::filter::{Query, QueryResponse};
use crate::ingest::{EntryUpdate, IdField};
use crate::store::RecordStore;

/// Persistent record store backed by SQLite.
pub struct SqliteRecordStore {
    id: String,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(id: impl Into<String>, path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            StoreError::Unavailable(format!(
                "failed to open record store at {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::with_connection(id.into(), conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory(id: impl Into<String>) -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StoreError::Unavailable(format!("failed to open in-memory record store: {e}"))
        })?;
        Self::with_connection(id.into(), conn)
    }

    fn with_connection(id: String, conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                registry_id TEXT,
                created TEXT NOT NULL,
                body TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS records_registry_id ON records(registry_id);
            ",
        )
        .map_err(|e| StoreError::Unavailable(format!("failed to init record schema: {e}")))?;
        Ok(Self {
            id,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("record store lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("record store task failed: {e}")))?
    }
}

fn decode(body: &str) -> StoreResult<RegistryEntry> {
    Ok(serde_json::from_str(body)?)
}

fn encode(entry: &RegistryEntry) -> StoreResult<String> {
    let mut stored = entry.clone();
    stored.source_id = None;
    Ok(serde_json::to_string(&stored)?)
}

fn load_all(conn: &Connection) -> StoreResult<Vec<RegistryEntry>> {
    let mut stmt = conn.prepare("SELECT body FROM records ORDER BY created, id")?;
    let bodies = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    bodies.iter().map(|b| decode(b)).collect()
}

fn find_by(conn: &Connection, id_field: IdField, key: &str) -> StoreResult<Vec<RegistryEntry>> {
    let sql = match id_field {
        IdField::Id => "SELECT body FROM records WHERE id = ?1",
        IdField::RegistryId => "SELECT body FROM records WHERE registry_id = ?1",
    };
    let mut stmt = conn.prepare(sql)?;
    let bodies = stmt
        .query_map(params![key], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    bodies.iter().map(|b| decode(b)).collect()
}

fn insert_all(conn: &mut Connection, entries: Vec<RegistryEntry>) -> StoreResult<Vec<RegistryEntry>> {
    let tx = conn.transaction()?;
    let mut created = Vec::with_capacity(entries.len());
    for mut entry in entries {
        let id = *entry.id.get_or_insert_with(EntryId::new);
        let taken = tx
            .query_row(
                "SELECT 1 FROM records WHERE id = ?1",
                params![id.to_string()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if taken {
            return Err(StoreError::Duplicate(format!("record {id} already exists")));
        }
        tx.execute(
            "INSERT INTO records (id, registry_id, created, body) VALUES (?1, ?2, ?3, ?4)",
            params![
                id.to_string(),
                entry.registry_id.as_ref().map(|r| r.to_string()),
                entry.created.to_rfc3339(),
                encode(&entry)?,
            ],
        )?;
        created.push(entry);
    }
    tx.commit()?;
    Ok(created)
}

fn replace_all(
    conn: &mut Connection,
    id_field: IdField,
    updates: Vec<(String, RegistryEntry)>,
) -> StoreResult<Vec<EntryUpdate>> {
    let tx = conn.transaction()?;
    let mut applied = Vec::with_capacity(updates.len());
    for (key, mut entry) in updates {
        let mut matches = find_by(&tx, id_field, &key)?;
        let old = match matches.len() {
            0 => return Err(StoreError::Ingest(format!("no record found for {key}"))),
            1 => matches.remove(0),
            n => {
                return Err(StoreError::Conflict(format!(
                    "{n} records found for {key}, expected one"
                )));
            }
        };
        let Some(id) = old.id else {
            return Err(StoreError::Ingest(format!("stored record for {key} has no id")));
        };
        entry.id = Some(id);
        entry.source_id = None;
        tx.execute(
            "UPDATE records SET registry_id = ?2, created = ?3, body = ?4 WHERE id = ?1",
            params![
                id.to_string(),
                entry.registry_id.as_ref().map(|r| r.to_string()),
                entry.created.to_rfc3339(),
                encode(&entry)?,
            ],
        )?;
        applied.push(EntryUpdate { new: entry, old });
    }
    tx.commit()?;
    Ok(applied)
}

fn remove_all(conn: &mut Connection, id_field: IdField, ids: Vec<String>) -> StoreResult<Vec<RegistryEntry>> {
    let tx = conn.transaction()?;
    let mut deleted = Vec::with_capacity(ids.len());
    for key in ids {
        let matches = find_by(&tx, id_field, &key)?;
        if matches.is_empty() {
            return Err(StoreError::Ingest(format!("no record found for {key}")));
        }
        for entry in matches {
            if let Some(id) = entry.id {
                tx.execute("DELETE FROM records WHERE id = ?1", params![id.to_string()])?;
            }
            deleted.push(entry);
        }
    }
    tx.commit()?;
    Ok(deleted)
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn create(&self, entries: Vec<RegistryEntry>) -> StoreResult<Vec<RegistryEntry>> {
        debug!("[{}] create {} record(s)", self.id, entries.len());
        self.run(move |conn| insert_all(conn, entries)).await
    }

    async fn update(
        &self,
        id_field: IdField,
        updates: Vec<(String, RegistryEntry)>,
    ) -> StoreResult<Vec<EntryUpdate>> {
        debug!("[{}] update {} record(s)", self.id, updates.len());
        self.run(move |conn| replace_all(conn, id_field, updates)).await
    }

    async fn delete(&self, id_field: IdField, ids: Vec<String>) -> StoreResult<Vec<RegistryEntry>> {
        debug!("[{}] delete {} record(s)", self.id, ids.len());
        self.run(move |conn| remove_all(conn, id_field, ids)).await
    }

    async fn query(&self, query: Query) -> StoreResult<QueryResponse> {
        let source = self.id.clone();
        let mut response = self
            .run(move |conn| Ok(query.evaluate(load_all(conn)?)))
            .await?;
        for entry in &mut response.results {
            entry.source_id = Some(source.clone());
        }
        Ok(response)
    }
}
