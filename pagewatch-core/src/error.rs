use pagewatch_scanner::ScanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Scan failed: {0}")]
    Scan(#[from] ScanError),

    #[error("Snapshot log error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed snapshot log record {record}: expected 2 fields, found {fields}")]
    MalformedLog { record: u64, fields: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Seed book error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("Invalid sheet range {start}..{end}")]
    InvalidRange { start: usize, end: usize },
}

pub type Result<T> = std::result::Result<T, WatchError>;
