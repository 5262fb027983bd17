use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            name TEXT PRIMARY KEY,
            title TEXT NOT NULL DEFAULT '',
            plain_text TEXT NOT NULL DEFAULT '',
            rich_text TEXT NOT NULL DEFAULT '',
            imported_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS prefs (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )
    .context("applying schema migrations")?;
    Ok(())
}
