// src/store/sqlite.rs
//
// =============================================================================
// LABLOG: SQLITE DOCUMENT STORE (v 0.1 )
// =============================================================================
//
// The Persistence Layer.
//
// Architecture:
// - One `documents` table shared by all collections ("Hybrid Relational").
// - Routing fields (collection, id, seq, rev) are columns, the body is JSON text.
// - `rev` is bumped on every write; ordering ties go to the latest write
//   in the requested direction, the same rule the entry cache applies.
// - `seq` is the row's insertion order and settles anything left.
// - Connections are opened per call on the blocking pool.
// - Schema creation runs once per handle, however many callers race for it.

use super::{DocumentStore, Order};
use crate::error::StoreError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use uuid::Uuid;

pub struct SqliteStore {
    path: PathBuf,
    ready: OnceCell<()>,
}

impl SqliteStore {
    /// Cheap: no I/O happens until the first operation.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ready: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the schema on first use. Safe to call any number of times.
    pub async fn initialize_once(&self) -> Result<(), StoreError> {
        self.ready
            .get_or_try_init(|| async {
                let path = self.path.clone();
                log::debug!("Initializing document store at {:?}", path);
                blocking(path, init_schema).await
            })
            .await
            .map(|_| ())
    }

    /// Waits for the schema, then runs `f` against a fresh connection.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        self.initialize_once().await?;
        blocking(self.path.clone(), f).await
    }
}

async fn blocking<T, F>(path: PathBuf, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let conn = open(&path)?;
        f(&conn)
    })
    .await
    .map_err(StoreError::backend)?
    .map_err(StoreError::from)
}

fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open document store {:?}", path))?;
    // Readers (e.g. a second CLI invocation) may hold the file briefly.
    conn.busy_timeout(std::time::Duration::from_secs(10))?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA synchronous=NORMAL;",
    )?;

    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS documents (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            rev INTEGER NOT NULL DEFAULT 0,
            body TEXT NOT NULL,
            UNIQUE(collection, id)
        );

        CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
        COMMIT;",
    )
    .context("Failed to create document schema")?;

    Ok(())
}

const NEXT_REV: &str = "(SELECT COALESCE(MAX(rev), 0) + 1 FROM documents)";

fn parse_body(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).context("Stored document is not valid JSON")
}

/// Field names are spliced into a JSON path, so keep them to identifiers.
fn json_path(field: &str) -> Result<String> {
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(anyhow!("Invalid order-by field: {:?}", field));
    }
    Ok(format!("$.{}", field))
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert(&self, collection: &str, body: Value) -> Result<String, StoreError> {
        let collection = collection.to_string();
        let id = Uuid::new_v4().to_string();
        let json = serde_json::to_string(&body).map_err(StoreError::backend)?;

        let new_id = id.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO documents (collection, id, rev, body) VALUES (?1, ?2, {}, ?3)",
                    NEXT_REV
                ),
                params![collection, new_id, json],
            )
            .context("Failed to insert document")?;
            Ok(())
        })
        .await?;

        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let (collection, id) = (collection.to_string(), id.to_string());
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |r| r.get(0),
                )
                .optional()?;
            raw.as_deref().map(parse_body).transpose()
        })
        .await
    }

    async fn put(&self, collection: &str, id: &str, body: Value) -> Result<(), StoreError> {
        let (collection, id) = (collection.to_string(), id.to_string());
        let json = serde_json::to_string(&body).map_err(StoreError::backend)?;
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO documents (collection, id, rev, body) VALUES (?1, ?2, {}, ?3)
                     ON CONFLICT(collection, id) DO UPDATE SET body=excluded.body, rev=excluded.rev",
                    NEXT_REV
                ),
                params![collection, id, json],
            )
            .context("Failed to write document")?;
            Ok(())
        })
        .await
    }

    async fn update(&self, collection: &str, id: &str, body: Value) -> Result<(), StoreError> {
        let json = serde_json::to_string(&body).map_err(StoreError::backend)?;
        let (c, i) = (collection.to_string(), id.to_string());
        let changed = self
            .with_conn(move |conn| {
                let n = conn
                    .execute(
                        &format!(
                            "UPDATE documents SET body = ?3, rev = {} WHERE collection = ?1 AND id = ?2",
                            NEXT_REV
                        ),
                        params![c, i, json],
                    )
                    .context("Failed to update document")?;
                Ok(n)
            })
            .await?;

        if changed == 0 {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let (collection, id) = (collection.to_string(), id.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )
            .context("Failed to delete document")?;
            Ok(())
        })
        .await
    }

    async fn list_ordered(
        &self,
        collection: &str,
        field: &str,
        order: Order,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let path = json_path(field)?;
        let direction = match order {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        };
        let sql = format!(
            "SELECT id, body FROM documents
             WHERE collection = ?1
             ORDER BY json_extract(body, ?2) {dir}, rev {dir}, seq {dir}",
            dir = direction
        );
        let collection = collection.to_string();

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![collection, path], |row| {
                let id: String = row.get(0)?;
                let body: String = row.get(1)?;
                Ok((id, body))
            })?;

            let mut out = Vec::new();
            for r in rows {
                let (id, raw) = r?;
                out.push((id, parse_body(&raw)?));
            }
            Ok(out)
        })
        .await
    }
}
