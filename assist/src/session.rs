//! Per-invocation bookkeeping of everything the pipeline did.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::types::{
    ExecutionRecord, FileOutcome, FileStatus, PlaceholderKind, SessionStats, SkipReason,
};

/// Something the tracker should account for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A command was passed to the shell (or handled in-process, like `cd`).
    Command(ExecutionRecord),
    /// A command was gated, deduplicated or declined.
    CommandSkipped { command: String, reason: SkipReason },
    File(FileOutcome),
    /// A failing command started a remediation chain.
    ErrorDetected,
    ErrorResolved,
    ErrorUnresolved,
    PlaceholderBound(PlaceholderKind),
}

/// Additive event log and counters for one pipeline invocation.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    stats: SessionStats,
    records: Vec<ExecutionRecord>,
    files: Vec<FileOutcome>,
    skipped: Vec<(String, SkipReason)>,
}

impl SessionTracker {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            stats: SessionStats::new(started_at),
            records: Vec::new(),
            files: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn start() -> Self {
        Self::new(Utc::now())
    }

    pub fn record(&mut self, event: SessionEvent) {
        debug!(?event, "session event");
        let stats = &mut self.stats;
        match event {
            SessionEvent::Command(record) => {
                if record.success {
                    stats.commands.succeeded += 1;
                } else {
                    stats.commands.failed += 1;
                }
                self.records.push(record);
            }
            SessionEvent::CommandSkipped { command, reason } => {
                stats.commands.skipped += 1;
                self.skipped.push((command, reason));
            }
            SessionEvent::File(outcome) => {
                match outcome.status {
                    FileStatus::Created => stats.files.created += 1,
                    FileStatus::Updated => stats.files.updated += 1,
                    FileStatus::Failed => stats.files.failed += 1,
                }
                self.files.push(outcome);
            }
            SessionEvent::ErrorDetected => stats.errors.detected += 1,
            SessionEvent::ErrorResolved => stats.errors.resolved += 1,
            SessionEvent::ErrorUnresolved => stats.errors.unresolved += 1,
            SessionEvent::PlaceholderBound(_) => stats.placeholders_bound += 1,
        }
    }

    /// Snapshot of the counters. Calling it changes nothing.
    pub fn summarize(&self) -> SessionStats {
        self.stats.clone()
    }

    /// Stamp `ended_at` and return the final counters.
    pub fn finish(&mut self) -> SessionStats {
        self.finish_at(Utc::now())
    }

    pub fn finish_at(&mut self, ended_at: DateTime<Utc>) -> SessionStats {
        self.stats.ended_at = Some(ended_at);
        self.summarize()
    }

    /// Attempted commands in execution order.
    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    /// Attempted file writes in order.
    pub fn files(&self) -> &[FileOutcome] {
        &self.files
    }

    pub fn skipped(&self) -> &[(String, SkipReason)] {
        &self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(command: &str, success: bool) -> ExecutionRecord {
        ExecutionRecord {
            command: command.to_string(),
            success,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(if success { 0 } else { 1 }),
        }
    }

    #[test]
    fn counts_every_event_kind() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut tracker = SessionTracker::new(start);
        tracker.record(SessionEvent::Command(record("npm install", false)));
        tracker.record(SessionEvent::Command(record("npm install left-pad --save", true)));
        tracker.record(SessionEvent::CommandSkipped {
            command: "sudo rm -rf /".to_string(),
            reason: SkipReason::Elevation,
        });
        tracker.record(SessionEvent::File(FileOutcome {
            path: ".env".to_string(),
            status: FileStatus::Created,
            error: None,
        }));
        tracker.record(SessionEvent::ErrorDetected);
        tracker.record(SessionEvent::ErrorResolved);
        tracker.record(SessionEvent::PlaceholderBound(PlaceholderKind::PrivateKey));

        let stats = tracker.finish_at(start + chrono::Duration::milliseconds(1500));
        assert_eq!(stats.commands.succeeded, 1);
        assert_eq!(stats.commands.failed, 1);
        assert_eq!(stats.commands.skipped, 1);
        assert_eq!(stats.files.created, 1);
        assert_eq!(stats.errors.detected, 1);
        assert_eq!(stats.errors.resolved, 1);
        assert_eq!(stats.placeholders_bound, 1);
        assert_eq!(stats.duration_ms(), Some(1500));
        assert_eq!(tracker.records().len(), 2);
        assert_eq!(tracker.skipped().len(), 1);
    }

    #[test]
    fn summarize_is_idempotent() {
        let mut tracker = SessionTracker::start();
        tracker.record(SessionEvent::ErrorDetected);
        assert_eq!(tracker.summarize(), tracker.summarize());
        assert_eq!(tracker.summarize().ended_at, None);
    }
}
