//! Audit collaborator and the in-memory activity log.
//!
//! Every accepted mutation emits one [`AuditEntry`]. Recording is
//! fire-and-forget from the mutation path's point of view: failures are logged
//! and never undo or delay the mutation.

use std::collections::VecDeque;

use parking_lot::Mutex;
use taskboard_proto::activity::{ActivityFilter, AuditEntry};

/// Default maximum number of retained entries before FIFO eviction.
pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;

/// Errors an audit sink may report.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The sink could not accept the entry.
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Append-only sink for audit entries.
pub trait AuditSink: Send + Sync {
    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] if the entry could not be recorded.
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// Returns up to `limit` of the most recent entries passing `filter`,
    /// newest first.
    fn recent(&self, limit: usize, filter: &ActivityFilter) -> Vec<AuditEntry>;
}

/// Records `entry`, logging instead of propagating any failure.
pub fn record_best_effort(sink: &dyn AuditSink, entry: AuditEntry) {
    let task_id = entry.task_id;
    let verb = entry.verb;
    if let Err(e) = sink.record(entry) {
        tracing::warn!(task_id = %task_id, verb = %verb, error = %e, "failed to record audit entry");
    }
}

/// Bounded in-memory activity log.
///
/// Holds at most `capacity` entries; when full, the oldest entry is dropped.
pub struct InMemoryAuditLog {
    entries: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuditLog {
    /// Creates an empty log with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }

    /// Creates an empty log with a custom capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing has been recorded (or everything was evicted).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl AuditSink for InMemoryAuditLog {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        if self.capacity == 0 {
            return Ok(());
        }
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        if entries.len() > self.capacity {
            entries.pop_front();
        }
        drop(entries);
        Ok(())
    }

    fn recent(&self, limit: usize, filter: &ActivityFilter) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }
}
