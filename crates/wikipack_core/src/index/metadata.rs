//! SQLite-backed metadata index.

use crate::error::{CoreError, CoreResult};
use crate::index::entry::IndexEntry;
use crate::payload::Compression;
use crate::types::{Location, SegmentId};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Current on-disk format version, written at finalize.
pub const FORMAT_VERSION: u32 = 1;

const SCHEMA: &str = r#"
CREATE TABLE android_metadata (locale TEXT);
INSERT INTO android_metadata VALUES ('en_US');
CREATE TABLE wiki (
    _id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    redirect TEXT,
    segment_id INTEGER,
    position INTEGER,
    length INTEGER
);
CREATE VIRTUAL TABLE titles USING fts5(title);
CREATE TABLE meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const SELECT_ENTRY: &str = "SELECT _id, title, redirect, segment_id, position, length FROM wiki";

/// Facts persisted in the `meta` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSettings {
    /// Whether payloads are gzip-compressed.
    pub compression: Compression,
    /// Format version, present once finalized.
    pub format_version: Option<u32>,
    /// Number of segment files, when recorded by the build.
    pub segment_count: Option<u64>,
    /// Number of index rows, present once finalized.
    pub entry_count: Option<u64>,
    /// Segment size cap used by the build.
    pub max_segment_size: Option<u64>,
}

struct Inner {
    conn: Connection,
    finalized: bool,
    read_only: bool,
}

/// Metadata index over a SQLite database.
///
/// While building, any number of threads may call [`upsert`](Self::upsert);
/// each batch is applied in one transaction. Lookups fail with
/// [`CoreError::IndexNotFinalized`] until [`finalize`](Self::finalize) has
/// run, and writes fail with [`CoreError::IndexFinalized`] afterwards.
pub struct MetadataIndex {
    path: Option<PathBuf>,
    compression: Compression,
    inner: Mutex<Inner>,
}

impl MetadataIndex {
    /// Creates a new index database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` already exists or the schema cannot be
    /// created.
    pub fn create(path: &Path, compression: Compression) -> CoreResult<Self> {
        if path.exists() {
            return Err(CoreError::OutputNotEmpty {
                path: path.display().to_string(),
            });
        }
        let conn = Connection::open(path)?;
        let index = Self::initialize(conn, Some(path.to_path_buf()), compression)?;
        debug!(path = %path.display(), "created metadata index");
        Ok(index)
    }

    /// Creates an index that lives only in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory(compression: Compression) -> CoreResult<Self> {
        Self::initialize(Connection::open_in_memory()?, None, compression)
    }

    fn initialize(conn: Connection, path: Option<PathBuf>, compression: Compression) -> CoreResult<Self> {
        // Build output is rebuilt from scratch after a crash.
        conn.pragma_update(None, "synchronous", "OFF")?;
        conn.pragma_update_and_check(None, "journal_mode", "MEMORY", |row| {
            row.get::<_, String>(0)
        })?;
        conn.execute_batch(SCHEMA)?;
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('compressed_values', ?1)",
            params![compression.is_compressed().to_string()],
        )?;

        Ok(Self {
            path,
            compression,
            inner: Mutex::new(Inner {
                conn,
                finalized: false,
                read_only: false,
            }),
        })
    }

    /// Opens a finished index for lookups.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if there is no database at `path`,
    /// and [`CoreError::IndexNotFinalized`] if the build that wrote it never
    /// finalized.
    pub fn open_read_only(path: &Path) -> CoreResult<Self> {
        if !path.is_file() {
            return Err(CoreError::not_found(path.display().to_string()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let settings = read_settings(&conn)?;
        if settings.format_version.is_none() {
            return Err(CoreError::IndexNotFinalized);
        }

        Ok(Self {
            path: Some(path.to_path_buf()),
            compression: settings.compression,
            inner: Mutex::new(Inner {
                conn,
                finalized: true,
                read_only: true,
            }),
        })
    }

    /// Returns the database path, or `None` for an in-memory index.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns how payloads referenced by this index are stored.
    #[must_use]
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Returns true once the index accepts lookups.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.inner.lock().finalized
    }

    /// Inserts or replaces a batch of rows in one transaction.
    ///
    /// Every row is validated before anything is written; one invalid row
    /// rejects the whole batch. A repeated id replaces the earlier row.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIndexEntry`] for an invalid row,
    /// [`CoreError::IndexFinalized`] after finalize, or the store error.
    pub fn upsert(&self, entries: &[IndexEntry]) -> CoreResult<()> {
        for entry in entries {
            entry.validate()?;
        }
        if entries.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        if inner.finalized {
            return Err(CoreError::IndexFinalized);
        }

        let tx = inner.conn.transaction()?;
        {
            let mut insert_row = tx.prepare_cached(
                "INSERT OR REPLACE INTO wiki (_id, title, redirect, segment_id, position, length)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            let mut delete_title = tx.prepare_cached("DELETE FROM titles WHERE rowid = ?1")?;
            let mut insert_title =
                tx.prepare_cached("INSERT INTO titles (rowid, title) VALUES (?1, ?2)")?;

            for entry in entries {
                let (segment_id, position, length) = match entry.location {
                    Some(loc) => (
                        Some(loc.segment_id.as_u32()),
                        Some(loc.offset),
                        Some(loc.length),
                    ),
                    None => (None, None, None),
                };
                insert_row.execute(params![
                    entry.id,
                    entry.title,
                    entry.redirect,
                    segment_id,
                    position,
                    length
                ])?;
                delete_title.execute(params![entry.id])?;
                insert_title.execute(params![entry.id, entry.title])?;
            }
        }
        tx.commit()?;

        debug!(rows = entries.len(), "upserted index batch");
        Ok(())
    }

    /// Records a build fact in the `meta` table.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexFinalized`] after finalize.
    pub fn put_setting(&self, key: &str, value: &str) -> CoreResult<()> {
        let inner = self.inner.lock();
        if inner.finalized {
            return Err(CoreError::IndexFinalized);
        }
        inner.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Builds the title lookup structures and compacts the database.
    ///
    /// Must only run after every writer has finished.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexFinalized`] if called twice, or the store
    /// error.
    pub fn finalize(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.finalized {
            return Err(CoreError::IndexFinalized);
        }

        inner.conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS title_index ON wiki (title);
             INSERT INTO titles (titles) VALUES ('optimize');",
        )?;

        let entry_count: u64 = inner
            .conn
            .query_row("SELECT COUNT(*) FROM wiki", [], |row| row.get(0))?;
        inner.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES
                ('entry_count', ?1), ('format_version', ?2)",
            params![entry_count.to_string(), FORMAT_VERSION.to_string()],
        )?;
        inner.conn.execute_batch("VACUUM")?;
        inner.finalized = true;

        info!(entries = entry_count, "metadata index finalized");
        Ok(())
    }

    /// Reads the `meta` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be read.
    pub fn settings(&self) -> CoreResult<IndexSettings> {
        read_settings(&self.inner.lock().conn)
    }

    /// Looks up a row by id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexNotFinalized`] before finalize.
    pub fn entry_by_id(&self, id: u64) -> CoreResult<Option<IndexEntry>> {
        let inner = self.readable()?;
        let mut stmt = inner
            .conn
            .prepare_cached(&format!("{SELECT_ENTRY} WHERE _id = ?1"))?;
        Ok(stmt.query_row(params![id], entry_from_row).optional()?)
    }

    /// Looks up the row with exactly `title`, lowest id first on duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexNotFinalized`] before finalize.
    pub fn entry_by_title(&self, title: &str) -> CoreResult<Option<IndexEntry>> {
        let inner = self.readable()?;
        let mut stmt = inner
            .conn
            .prepare_cached(&format!("{SELECT_ENTRY} WHERE title = ?1 ORDER BY _id LIMIT 1"))?;
        Ok(stmt.query_row(params![title], entry_from_row).optional()?)
    }

    /// Returns ids whose title is exactly `title`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexNotFinalized`] before finalize.
    pub fn ids_by_title(&self, title: &str) -> CoreResult<Vec<u64>> {
        let inner = self.readable()?;
        let mut stmt = inner
            .conn
            .prepare_cached("SELECT _id FROM wiki WHERE title = ?1 ORDER BY _id")?;
        let ids = stmt
            .query_map(params![title], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<u64>>>()?;
        Ok(ids)
    }

    /// Returns up to `limit` ids whose title starts with `prefix`, in title
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexNotFinalized`] before finalize.
    pub fn ids_with_title_prefix(&self, prefix: &str, limit: usize) -> CoreResult<Vec<u64>> {
        let inner = self.readable()?;
        // U+10FFFF sorts after every other code point in binary collation.
        let upper = format!("{prefix}\u{10FFFF}");
        let mut stmt = inner.conn.prepare_cached(
            "SELECT _id FROM wiki WHERE title >= ?1 AND title < ?2
             ORDER BY title, _id LIMIT ?3",
        )?;
        let ids = stmt
            .query_map(params![prefix, upper, limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<u64>>>()?;
        Ok(ids)
    }

    /// Full-text search over titles, best matches first.
    ///
    /// Each whitespace-separated word of `query` must appear in the title.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexNotFinalized`] before finalize.
    pub fn search_titles(&self, query: &str, limit: usize) -> CoreResult<Vec<(u64, String)>> {
        let inner = self.readable()?;
        let Some(expression) = fts_expression(query) else {
            return Ok(Vec::new());
        };
        let mut stmt = inner.conn.prepare_cached(
            "SELECT rowid, title FROM titles WHERE titles MATCH ?1 ORDER BY rank LIMIT ?2",
        )?;
        let hits = stmt
            .query_map(params![expression, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<(u64, String)>>>()?;
        Ok(hits)
    }

    /// Returns the number of rows.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexNotFinalized`] before finalize.
    pub fn entry_count(&self) -> CoreResult<u64> {
        let inner = self.readable()?;
        Ok(inner
            .conn
            .query_row("SELECT COUNT(*) FROM wiki", [], |row| row.get(0))?)
    }

    /// Returns every row in id order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexNotFinalized`] before finalize.
    pub fn entries(&self) -> CoreResult<Vec<IndexEntry>> {
        let inner = self.readable()?;
        let mut stmt = inner
            .conn
            .prepare(&format!("{SELECT_ENTRY} ORDER BY _id"))?;
        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn readable(&self) -> CoreResult<parking_lot::MutexGuard<'_, Inner>> {
        let inner = self.inner.lock();
        if !inner.finalized {
            return Err(CoreError::IndexNotFinalized);
        }
        Ok(inner)
    }
}

impl std::fmt::Debug for MetadataIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MetadataIndex")
            .field("path", &self.path)
            .field("compression", &self.compression)
            .field("finalized", &inner.finalized)
            .field("read_only", &inner.read_only)
            .finish()
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<IndexEntry> {
    let segment_id: Option<u32> = row.get(3)?;
    let position: Option<u64> = row.get(4)?;
    let length: Option<u64> = row.get(5)?;
    let location = match (segment_id, position, length) {
        (Some(segment_id), Some(offset), Some(length)) => {
            Some(Location::new(SegmentId::new(segment_id), offset, length))
        }
        _ => None,
    };
    Ok(IndexEntry {
        id: row.get(0)?,
        title: row.get(1)?,
        redirect: row.get(2)?,
        location,
    })
}

fn read_settings(conn: &Connection) -> CoreResult<IndexSettings> {
    let setting = |key: &str| -> CoreResult<Option<String>> {
        Ok(conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    };
    let number = |key: &str| -> CoreResult<Option<u64>> {
        setting(key)?
            .map(|value| {
                value
                    .parse::<u64>()
                    .map_err(|_| CoreError::malformed_field("meta", format!("{key}={value}")))
            })
            .transpose()
    };

    let compressed = setting("compressed_values")?
        .ok_or_else(|| CoreError::malformed_field("meta", "compressed_values missing"))?;
    let compression = match compressed.as_str() {
        "true" | "1" => Compression::Gzip,
        "false" | "0" => Compression::None,
        other => {
            return Err(CoreError::malformed_field(
                "meta",
                format!("compressed_values={other}"),
            ))
        }
    };

    Ok(IndexSettings {
        compression,
        format_version: number("format_version")?.map(|v| v as u32),
        segment_count: number("segment_count")?,
        entry_count: number("entry_count")?,
        max_segment_size: number("max_segment_size")?,
    })
}

/// Quotes every word so user input is never parsed as FTS5 syntax.
fn fts_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|word| format!("\"{}\"", word.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}
