//! Sqlite-backed document corpus and flat key-value preference store.
//!
//! The bulk load returns metadata only; bodies are fetched per document so a
//! large corpus can be skimmed without pulling every body into memory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::{ConfigPaths, StorageOptions};

mod schema;

/// One raw document as the bulk load sees it. Immutable once loaded; the body
/// fields live behind [`StorageHandle::load_body`].
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub name: String,
    pub title: String,
    pub imported_at: i64,
}

/// Body representations for a single document.
#[derive(Debug, Clone, Default)]
pub struct DocumentBody {
    pub plain_text: String,
    pub rich_text: String,
}

/// Flat key-value persistence port. Reads fall back to the default silently
/// so an unavailable or corrupt store never aborts startup.
pub trait PreferenceStore {
    fn read_list(&self, key: &str) -> Vec<String>;
    fn write_list(&self, key: &str, values: &[String]) -> Result<()>;
}

#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    /// Bulk corpus load, metadata only, in stable name order.
    pub fn load_all(&self) -> Result<Vec<DocumentMeta>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, title, imported_at FROM documents ORDER BY name",
            )?;
            let docs = stmt
                .query_map([], |row| {
                    Ok(DocumentMeta {
                        name: row.get(0)?,
                        title: row.get(1)?,
                        imported_at: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(docs)
        })
    }

    /// Fetch one document's body fields.
    pub fn load_body(&self, name: &str) -> Result<DocumentBody> {
        self.with_connection(|conn| {
            let body = conn
                .query_row(
                    "SELECT plain_text, rich_text FROM documents WHERE name = ?1",
                    params![name],
                    |row| {
                        Ok(DocumentBody {
                            plain_text: row.get(0)?,
                            rich_text: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            match body {
                Some(body) => Ok(body),
                None => bail!("document '{name}' not found"),
            }
        })
    }

    /// Insert or replace a document. `name` is the stable identity key.
    pub fn upsert_document(
        &self,
        name: &str,
        title: &str,
        plain_text: &str,
        rich_text: &str,
        imported_at: i64,
    ) -> Result<()> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            bail!("document name cannot be empty");
        }
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO documents (name, title, plain_text, rich_text, imported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(name) DO UPDATE SET
                     title = excluded.title,
                     plain_text = excluded.plain_text,
                     rich_text = excluded.rich_text,
                     imported_at = excluded.imported_at",
                params![trimmed, title, plain_text, rich_text, imported_at],
            )
            .context("upserting document")?;
            Ok(())
        })
    }

    pub fn document_count(&self) -> Result<usize> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }
}

impl PreferenceStore for StorageHandle {
    fn read_list(&self, key: &str) -> Vec<String> {
        let raw = self.with_connection(|conn| {
            let value: Option<String> = conn
                .query_row(
                    "SELECT value FROM prefs WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        });
        match raw {
            Ok(Some(value)) => serde_json::from_str(&value).unwrap_or_else(|error| {
                tracing::warn!(key, %error, "corrupt preference value, using default");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(error) => {
                tracing::warn!(key, %error, "preference read failed, using default");
                Vec::new()
            }
        }
    }

    fn write_list(&self, key: &str, values: &[String]) -> Result<()> {
        let encoded = serde_json::to_string(values).context("encoding preference list")?;
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO prefs (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, encoded],
            )
            .context("writing preference")?;
            Ok(())
        })
    }
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = &paths.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    migrate_legacy(&conn)?;
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

/// One-time migration from the pre-rewrite document table. Rows claimed by
/// another feature keep living in the legacy store and are skipped here.
fn migrate_legacy(conn: &Connection) -> Result<()> {
    let legacy_exists: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'documents_legacy'",
            [],
            |row| row.get(0),
        )
        .optional()
        .context("checking for legacy document table")?;
    if legacy_exists.is_none() {
        return Ok(());
    }

    let migrated = conn
        .execute(
            "INSERT OR IGNORE INTO documents (name, title, plain_text, rich_text, imported_at)
             SELECT name, title, plain_text, rich_text, imported_at
             FROM documents_legacy
             WHERE COALESCE(claimed_by, '') = ''",
            [],
        )
        .context("migrating legacy documents")?;
    conn.execute(
        "DELETE FROM documents_legacy WHERE COALESCE(claimed_by, '') = ''",
        [],
    )
    .context("clearing migrated legacy rows")?;
    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM documents_legacy", [], |row| row.get(0))
        .context("counting claimed legacy rows")?;
    if remaining == 0 {
        conn.execute("DROP TABLE documents_legacy", [])
            .context("dropping legacy document table")?;
    }
    tracing::info!(migrated, remaining, "migrated legacy document store");
    Ok(())
}
