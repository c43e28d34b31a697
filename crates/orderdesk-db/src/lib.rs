// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use orderdesk_app::DraftStorage;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const SESSION_TABLE: &str = "session_storage";
const REQUIRED_COLUMNS: [&str; 4] = ["key", "value", "checksum", "updated_at"];

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS session_storage (
      key TEXT PRIMARY KEY,
      value TEXT NOT NULL,
      checksum TEXT NOT NULL,
      updated_at TEXT NOT NULL
    );
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: String,
    pub value: String,
    pub checksum: String,
    pub updated_at: OffsetDateTime,
}

/// Session-scoped key/value storage on SQLite. Values carry a SHA-256
/// checksum; writing an identical value leaves the row untouched.
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Opens a file-backed store for a new session. Entries left by an
    /// earlier process are discarded, so the file only mirrors the live
    /// draft for inspection and never carries it across restarts.
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let existed = path.exists();
        let conn = Connection::open(path)
            .with_context(|| format!("open session database at {}", path.display()))?;
        configure_connection(&conn)?;
        if !existed {
            set_private_permissions(path)?;
        }
        let store = Self { conn };
        store.bootstrap()?;
        let discarded = store
            .conn
            .execute("DELETE FROM session_storage", [])
            .context("discard entries from an earlier session")?;
        if discarded > 0 {
            tracing::debug!(discarded, path = %path.display(), "previous session entries discarded");
        }
        Ok(store)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory session database")?;
        configure_connection(&conn)?;
        let store = Self { conn };
        store.bootstrap()?;
        Ok(store)
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("create session storage schema")?;

        let columns = table_columns(&self.conn, SESSION_TABLE)?;
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();
        if !missing.is_empty() {
            bail!(
                "table `{SESSION_TABLE}` is missing required columns: {}; delete the session database and start again",
                missing.join(", ")
            );
        }
        Ok(())
    }

    pub fn entry(&self, key: &str) -> Result<Option<StoredEntry>> {
        let row = self
            .conn
            .query_row(
                "SELECT key, value, checksum, updated_at FROM session_storage WHERE key = ?",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .with_context(|| format!("read session key {key}"))?;

        let Some((key, value, checksum, updated_at)) = row else {
            return Ok(None);
        };
        let actual = checksum_sha256(value.as_bytes());
        if actual != checksum {
            bail!(
                "session key {key} failed its checksum (stored {checksum}, computed {actual}); delete the session database to start fresh"
            );
        }
        let updated_at = OffsetDateTime::parse(&updated_at, &Rfc3339)
            .with_context(|| format!("parse updated_at {updated_at:?} for session key {key}"))?;
        Ok(Some(StoredEntry {
            key,
            value,
            checksum,
            updated_at,
        }))
    }

    pub fn checksum(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT checksum FROM session_storage WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("read checksum for session key {key}"))
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let mut statement = self
            .conn
            .prepare("SELECT key FROM session_storage ORDER BY key")
            .context("prepare session key listing")?;
        let rows = statement
            .query_map([], |row| row.get(0))
            .context("list session keys")?;
        rows.collect::<rusqlite::Result<Vec<String>>>()
            .context("collect session keys")
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM session_storage WHERE key = ?", params![key])
            .with_context(|| format!("remove session key {key}"))?;
        Ok(removed > 0)
    }

    /// Returns whether the stored value changed.
    pub fn put(&self, key: &str, value: &str) -> Result<bool> {
        let checksum = checksum_sha256(value.as_bytes());
        if self.checksum(key)?.as_deref() == Some(checksum.as_str()) {
            tracing::trace!(key, "session value unchanged");
            return Ok(false);
        }
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO session_storage (key, value, checksum, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                  value = excluded.value,
                  checksum = excluded.checksum,
                  updated_at = excluded.updated_at
                ",
                params![key, value, checksum, now],
            )
            .with_context(|| format!("write session key {key}"))?;
        Ok(true)
    }
}

impl DraftStorage for SessionStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entry(key)?.map(|entry| entry.value))
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.put(key, value).map(|_| ())
    }
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("session database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "session database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("session database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "session database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut statement = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect table {table}"))?;
    let rows = statement
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("list columns of {table}"))?;
    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns of {table}"))
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}

pub fn checksum_sha256(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut output = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

fn set_private_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut permissions = fs::metadata(path)
            .with_context(|| format!("stat {}", path.display()))?
            .permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(path, permissions)
            .with_context(|| format!("set permissions on {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{SessionStore, checksum_sha256};
    use anyhow::Result;

    #[test]
    fn checksum_is_lowercase_hex_sha256() {
        assert_eq!(
            checksum_sha256(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn identical_write_is_skipped() -> Result<()> {
        let store = SessionStore::open_memory()?;
        assert!(store.put("order_draft_v4", "{}")?);
        let first = store.entry("order_draft_v4")?.expect("entry stored");
        assert!(!store.put("order_draft_v4", "{}")?);
        let second = store.entry("order_draft_v4")?.expect("entry stored");
        assert_eq!(first, second);
        assert!(store.put("order_draft_v4", r#"{"rows":[]}"#)?);
        Ok(())
    }
}
