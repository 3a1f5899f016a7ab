use rusqlite::types::Value;
use serde::Serialize;

/// Record identifier exactly as SQLite stores it (integer or text).
pub type RecordId = Value;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub id: RecordId,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub published: usize,
    pub statements: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DriverState {
    Running,
    Done,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub iterations: usize,
    pub located: usize,
    pub embedded: usize,
    pub written: usize,
    pub published: usize,
    pub backfilled: usize,
    pub pending_before: usize,
    pub pending_after: usize,
    pub stopped_early: bool,
}
