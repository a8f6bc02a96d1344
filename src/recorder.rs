use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::controller::SessionSummary;
use crate::error::{PersistFailure, Result};
use crate::kind::TestKind;
use crate::response::Score;
use crate::store::{DocumentStore, ATTEMPTS};

/// Immutable result of a completed session (scored tests) or of one
/// completed stimulus (TAT stories).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub user_id: String,
    pub test_type: TestKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stimulus_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    pub time_taken_seconds: u32,
    pub completed_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    Idle,
    Saving,
    Saved { ids: Vec<String> },
    Failed(PersistFailure),
}

/// Writes attempt records to the store. A failed write is kept for a manual
/// retry; there is no idempotency key, so a retry after a write that actually
/// landed produces a duplicate.
pub struct AttemptRecorder<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    pending: Vec<AttemptRecord>,
    saved: Vec<String>,
    failures: u32,
    status: SaveStatus,
}

impl<'a, S: DocumentStore + ?Sized> AttemptRecorder<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            pending: Vec::new(),
            saved: Vec::new(),
            failures: 0,
            status: SaveStatus::Idle,
        }
    }

    pub fn status(&self) -> &SaveStatus {
        &self.status
    }

    pub fn pending(&self) -> &[AttemptRecord] {
        &self.pending
    }

    pub fn saved_ids(&self) -> &[String] {
        &self.saved
    }

    /// Queue `record` behind any earlier failures and try to write the queue
    pub fn persist(&mut self, record: AttemptRecord) -> std::result::Result<Vec<String>, PersistFailure> {
        self.pending.push(record);
        self.flush()
    }

    /// Write everything still pending. Safe to call with nothing pending.
    pub fn retry(&mut self) -> std::result::Result<Vec<String>, PersistFailure> {
        self.flush()
    }

    fn flush(&mut self) -> std::result::Result<Vec<String>, PersistFailure> {
        self.status = SaveStatus::Saving;
        let mut written = Vec::new();

        while let Some(record) = self.pending.first() {
            match self.write(record) {
                Ok(id) => {
                    tracing::info!(
                        id = %id,
                        test = %record.test_type,
                        stimulus = ?record.stimulus_id,
                        "attempt saved"
                    );
                    self.pending.remove(0);
                    self.saved.push(id.clone());
                    written.push(id);
                }
                Err(e) => {
                    self.failures += 1;
                    let failure = PersistFailure {
                        attempts: self.failures,
                        reason: e.to_string(),
                    };
                    tracing::warn!(
                        error = %e,
                        pending = self.pending.len(),
                        attempts = self.failures,
                        "attempt save failed"
                    );
                    self.status = SaveStatus::Failed(failure.clone());
                    return Err(failure);
                }
            }
        }

        self.failures = 0;
        self.status = SaveStatus::Saved { ids: written.clone() };
        Ok(written)
    }

    fn write(&self, record: &AttemptRecord) -> Result<String> {
        let fields = serde_json::to_value(record)?;
        self.store.create(ATTEMPTS, fields)
    }
}

/// Attempts stored for one user, newest first
pub fn load_attempts<S: DocumentStore + ?Sized>(store: &S, user_id: &str) -> Result<Vec<AttemptRecord>> {
    let mut records = Vec::new();
    for doc in store.query(ATTEMPTS, Some("completedAt"))? {
        match serde_json::from_value::<AttemptRecord>(doc.fields) {
            Ok(r) if r.user_id == user_id => records.push(r),
            Ok(_) => {}
            Err(e) => tracing::warn!(id = %doc.id, error = %e, "unreadable attempt record"),
        }
    }
    records.reverse();
    Ok(records)
}

/// One line of the local completion log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRow {
    pub completed_at: String,
    pub test_type: TestKind,
    pub stimuli: usize,
    pub elapsed_secs: u32,
    pub score: Option<u32>,
}

impl From<&SessionSummary> for CompletionRow {
    fn from(summary: &SessionSummary) -> Self {
        Self {
            completed_at: summary.completed_at.to_rfc3339(),
            test_type: summary.kind,
            stimuli: summary.stimuli,
            elapsed_secs: summary.elapsed_secs,
            score: summary.score.as_ref().map(|s| s.percentage),
        }
    }
}

/// CSV log of completed sessions kept on this machine, including the test
/// kinds whose answers are written on paper and never reach the store.
#[derive(Debug, Clone)]
pub struct CompletionLog {
    path: PathBuf,
}

impl CompletionLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, summary: &SessionSummary) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // If the log doesn't exist yet we need to emit a header
        let needs_header = !self.path.exists();

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(CompletionRow::from(summary))?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<CompletionRow>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row?);
        }
        Ok(rows)
    }
}
