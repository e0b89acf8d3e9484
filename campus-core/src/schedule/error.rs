use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("schedule store path not configured")]
    MissingStore,
    #[error("failed to open database at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timetable export is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event {index}: description has no line {line}")]
    MissingLine { index: usize, line: usize },
    #[error("event {index}: invalid start date {value}")]
    InvalidDate { index: usize, value: String },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
