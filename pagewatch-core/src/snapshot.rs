// Snapshot store: the last known fingerprint per URL, backed by an
// append-only log.

use crate::error::{Result, WatchError};
use csv::{ReaderBuilder, Writer, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub url: String,
    pub value: String,
}

impl SnapshotRecord {
    pub fn new(url: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            value: value.into(),
        }
    }
}

/// Durable backing for a [`SnapshotStore`].
pub trait SnapshotLog: Send {
    /// Every record in the log, oldest first.
    fn load(&mut self) -> Result<Vec<SnapshotRecord>>;

    fn append(&mut self, record: &SnapshotRecord) -> Result<()>;
}

/// Two-column CSV file, one `url,value` record per line, no header.
pub struct CsvSnapshotLog {
    path: PathBuf,
    writer: Option<Writer<File>>,
}

impl CsvSnapshotLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    fn writer(&mut self) -> Result<&mut Writer<File>> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?;
                WriterBuilder::new().has_headers(false).from_writer(file)
            }
        };
        Ok(self.writer.insert(writer))
    }
}

impl SnapshotLog for CsvSnapshotLog {
    fn load(&mut self) -> Result<Vec<SnapshotRecord>> {
        if !self.path.exists() {
            debug!("No snapshot log at {}", self.path.display());
            return Ok(Vec::new());
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;

        let mut records = Vec::new();
        for (index, row) in reader.byte_records().enumerate() {
            let row = row?;
            if row.len() < 2 {
                return Err(WatchError::MalformedLog {
                    record: index as u64 + 1,
                    fields: row.len(),
                });
            }
            // Invalid UTF-8 is replaced rather than rejected.
            records.push(SnapshotRecord::new(
                String::from_utf8_lossy(&row[0]),
                String::from_utf8_lossy(&row[1]),
            ));
        }

        Ok(records)
    }

    fn append(&mut self, record: &SnapshotRecord) -> Result<()> {
        let writer = self.writer()?;
        writer.write_record([record.url.as_str(), record.value.as_str()])?;
        writer.flush()?;
        Ok(())
    }
}

/// In-memory log, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotLog {
    records: Vec<SnapshotRecord>,
}

impl MemorySnapshotLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<SnapshotRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[SnapshotRecord] {
        &self.records
    }
}

impl SnapshotLog for MemorySnapshotLog {
    fn load(&mut self) -> Result<Vec<SnapshotRecord>> {
        Ok(self.records.clone())
    }

    fn append(&mut self, record: &SnapshotRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// URL -> last known value, reconstructed from a [`SnapshotLog`] once and
/// then mutated in memory for the rest of the run.
///
/// Appends go to the log only; they never rewrite earlier entries.
pub struct SnapshotStore<L> {
    latest: HashMap<String, String>,
    log: L,
}

impl<L: SnapshotLog> SnapshotStore<L> {
    /// Later records win. An unreadable or malformed log is treated as empty.
    pub fn load(mut log: L) -> Self {
        let mut latest = HashMap::new();

        match log.load() {
            Ok(records) => {
                let total = records.len();
                for record in records {
                    latest.insert(record.url, record.value);
                }
                info!(
                    "Loaded {} snapshot records ({} distinct URLs)",
                    total,
                    latest.len()
                );
            }
            Err(e) => {
                warn!("Snapshot log unreadable, starting without prior data: {}", e);
            }
        }

        Self { latest, log }
    }

    pub fn has(&self, url: &str) -> bool {
        self.latest.contains_key(url)
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.latest.get(url).map(String::as_str)
    }

    /// Returns true only when `url` was already known with a different value.
    /// An unknown URL is inserted as a baseline and reports no change.
    pub fn compare_and_set(&mut self, url: &str, value: &str) -> bool {
        match self.latest.get_mut(url) {
            Some(stored) if stored.as_str() != value => {
                *stored = value.to_string();
                true
            }
            Some(_) => false,
            None => {
                self.latest.insert(url.to_string(), value.to_string());
                false
            }
        }
    }

    /// Writes a log entry regardless of change status.
    pub fn append(&mut self, url: &str, value: &str) -> Result<()> {
        self.log.append(&SnapshotRecord::new(url, value))
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    pub fn log(&self) -> &L {
        &self.log
    }
}
