use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Header of the column that records when a row was last checked.
pub const CHECKED_HEADER: &str = "Checked";

/// Metadata columns carried alongside each seed URL.
pub const METADATA_COLUMNS: usize = 4;

/// One row of a seed sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRow {
    /// Zero-based position among the sheet's data rows.
    pub row_index: usize,
    pub url: String,
    pub metadata: [String; METADATA_COLUMNS],
}

impl SeedRow {
    pub fn new(row_index: usize, url: impl Into<String>) -> Self {
        Self {
            row_index,
            url: url.into(),
            metadata: Default::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: [String; METADATA_COLUMNS]) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Source of seed rows and sink for "last checked" annotations.
pub trait RecordStore {
    fn load_seed_rows(&self, source_id: &str, sheet_index: usize) -> Result<Vec<SeedRow>>;

    fn mark_rows_checked(
        &self,
        source_id: &str,
        sheet_index: usize,
        rows: &[usize],
        date: &str,
    ) -> Result<()>;
}

/// SQLite-backed seed book: sources hold numbered sheets, sheets hold rows
/// plus a header row that later columns (like [`CHECKED_HEADER`]) extend.
pub struct SeedBook {
    conn: Connection,
}

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

impl SeedBook {
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let book = SeedBook { conn };
        book.init_schema()?;
        Ok(book)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
CREATE TABLE IF NOT EXISTS sheets (
    source_id TEXT NOT NULL,
    sheet_index INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY(source_id, sheet_index)
);

-- Header row; position is 1-based like a spreadsheet column
CREATE TABLE IF NOT EXISTS sheet_columns (
    source_id TEXT NOT NULL,
    sheet_index INTEGER NOT NULL,
    position INTEGER NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    PRIMARY KEY(source_id, sheet_index, position),
    FOREIGN KEY(source_id, sheet_index) REFERENCES sheets(source_id, sheet_index) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS seed_rows (
    source_id TEXT NOT NULL,
    sheet_index INTEGER NOT NULL,
    row_index INTEGER NOT NULL,
    url TEXT NOT NULL,
    meta_1 TEXT NOT NULL DEFAULT '',
    meta_2 TEXT NOT NULL DEFAULT '',
    meta_3 TEXT NOT NULL DEFAULT '',
    meta_4 TEXT NOT NULL DEFAULT '',
    PRIMARY KEY(source_id, sheet_index, row_index),
    FOREIGN KEY(source_id, sheet_index) REFERENCES sheets(source_id, sheet_index) ON DELETE CASCADE
);

-- Values written into extra columns, such as the checked date
CREATE TABLE IF NOT EXISTS row_marks (
    source_id TEXT NOT NULL,
    sheet_index INTEGER NOT NULL,
    row_index INTEGER NOT NULL,
    position INTEGER NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY(source_id, sheet_index, row_index, position),
    FOREIGN KEY(source_id, sheet_index) REFERENCES sheets(source_id, sheet_index) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_seed_rows_sheet ON seed_rows(source_id, sheet_index);
            ",
        )?;
        Ok(())
    }

    /// Replace a sheet's headers and rows.
    pub fn import_sheet(
        &self,
        source_id: &str,
        sheet_index: usize,
        headers: &[String],
        rows: &[SeedRow],
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "DELETE FROM sheets WHERE source_id = ?1 AND sheet_index = ?2",
            params![source_id, sheet_index as i64],
        )?;
        tx.execute(
            "INSERT INTO sheets (source_id, sheet_index, created_at) VALUES (?1, ?2, ?3)",
            params![source_id, sheet_index as i64, current_timestamp()],
        )?;

        for (i, name) in headers.iter().enumerate() {
            tx.execute(
                "INSERT INTO sheet_columns (source_id, sheet_index, position, name) VALUES (?1, ?2, ?3, ?4)",
                params![source_id, sheet_index as i64, i as i64 + 1, name],
            )?;
        }

        for row in rows {
            tx.execute(
                "INSERT INTO seed_rows (source_id, sheet_index, row_index, url, meta_1, meta_2, meta_3, meta_4)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    source_id,
                    sheet_index as i64,
                    row.row_index as i64,
                    &row.url,
                    &row.metadata[0],
                    &row.metadata[1],
                    &row.metadata[2],
                    &row.metadata[3],
                ],
            )?;
        }

        tx.commit()?;
        info!(
            "Imported {} rows into {} sheet {}",
            rows.len(),
            source_id,
            sheet_index
        );
        Ok(())
    }

    pub fn headers(&self, source_id: &str, sheet_index: usize) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sheet_columns
             WHERE source_id = ?1 AND sheet_index = ?2
             ORDER BY position",
        )?;

        let headers = stmt
            .query_map(params![source_id, sheet_index as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(headers)
    }

    /// Position of the checked column: the column already named `Checked`,
    /// else the first blank header, else a new column after the last one.
    /// The chosen column is always labelled, so repeated runs reuse it.
    fn find_or_create_checked_column(&self, source_id: &str, sheet_index: usize) -> Result<i64> {
        let headers = self.headers(source_id, sheet_index)?;

        let position = match headers.iter().position(|h| h == CHECKED_HEADER) {
            Some(i) => return Ok(i as i64 + 1),
            None => headers
                .iter()
                .position(|h| h.is_empty())
                .map(|i| i as i64 + 1)
                .unwrap_or(headers.len() as i64 + 1),
        };

        self.conn.execute(
            "INSERT INTO sheet_columns (source_id, sheet_index, position, name) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(source_id, sheet_index, position) DO UPDATE SET name = excluded.name",
            params![source_id, sheet_index as i64, position, CHECKED_HEADER],
        )?;
        debug!(
            "Labelled column {} of {} sheet {} as {}",
            position, source_id, sheet_index, CHECKED_HEADER
        );

        Ok(position)
    }

    pub fn checked_date(
        &self,
        source_id: &str,
        sheet_index: usize,
        row_index: usize,
    ) -> Result<Option<String>> {
        let date = self
            .conn
            .query_row(
                "SELECT m.value FROM row_marks m
                 JOIN sheet_columns c
                   ON c.source_id = m.source_id AND c.sheet_index = m.sheet_index AND c.position = m.position
                 WHERE m.source_id = ?1 AND m.sheet_index = ?2 AND m.row_index = ?3 AND c.name = ?4",
                params![source_id, sheet_index as i64, row_index as i64, CHECKED_HEADER],
                |row| row.get(0),
            )
            .optional()?;

        Ok(date)
    }

    pub fn sheet_indices(&self, source_id: &str) -> Result<Vec<usize>> {
        let mut stmt = self
            .conn
            .prepare("SELECT sheet_index FROM sheets WHERE source_id = ?1 ORDER BY sheet_index")?;

        let indices = stmt
            .query_map(params![source_id], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(indices.into_iter().map(|i| i as usize).collect())
    }
}

impl RecordStore for SeedBook {
    fn load_seed_rows(&self, source_id: &str, sheet_index: usize) -> Result<Vec<SeedRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT row_index, url, meta_1, meta_2, meta_3, meta_4 FROM seed_rows
             WHERE source_id = ?1 AND sheet_index = ?2
             ORDER BY row_index",
        )?;

        let rows = stmt
            .query_map(params![source_id, sheet_index as i64], |row| {
                let meta: [String; METADATA_COLUMNS] =
                    [row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?];
                Ok(SeedRow {
                    row_index: row.get::<_, i64>(0)? as usize,
                    url: row.get(1)?,
                    metadata: meta.map(|m| m.replace('\n', " ")),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    fn mark_rows_checked(
        &self,
        source_id: &str,
        sheet_index: usize,
        rows: &[usize],
        date: &str,
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let tx = self.conn.unchecked_transaction()?;
        let position = self.find_or_create_checked_column(source_id, sheet_index)?;

        for row in rows {
            tx.execute(
                "INSERT INTO row_marks (source_id, sheet_index, row_index, position, value)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(source_id, sheet_index, row_index, position) DO UPDATE SET value = excluded.value",
                params![source_id, sheet_index as i64, *row as i64, position, date],
            )?;
        }

        tx.commit()?;
        debug!(
            "Marked {} rows of {} sheet {} checked on {}",
            rows.len(),
            source_id,
            sheet_index,
            date
        );
        Ok(())
    }
}
