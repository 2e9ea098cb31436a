// src/services/event_sink.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing;
use uuid::Uuid;

use crate::services::clock::Clock;

/// Audit/notification trail for requests and vehicles.
///
/// `subject` is the ID of the record the event is posted on (a request or an
/// ambulance). Sinks never fail the operation that posts to them.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn info(&self, subject: &str, message: &str);
    async fn warn(&self, subject: &str, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub subject: String,
    pub level: EventLevel,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

/// Forwards audit events to the process log only.
#[derive(Debug, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn info(&self, subject: &str, message: &str) {
        tracing::info!(subject, "{}", message);
    }

    async fn warn(&self, subject: &str, message: &str) {
        tracing::warn!(subject, "{}", message);
    }
}

pub const DEFAULT_ENTRIES_PER_SUBJECT: usize = 128;
pub const DEFAULT_MAX_SUBJECTS: usize = 4_096;

#[derive(Default)]
struct Trail {
    by_subject: HashMap<String, VecDeque<AuditEntry>>,
    // First-seen order, oldest subject evicted first
    subjects: VecDeque<String>,
}

/// Keeps a bounded trail in memory so it can be read back per record.
///
/// Each subject keeps its newest `per_subject` entries, and once
/// `max_subjects` subjects are tracked the oldest one is forgotten.
pub struct AuditLog {
    clock: Arc<dyn Clock>,
    per_subject: usize,
    max_subjects: usize,
    trail: RwLock<Trail>,
}

impl AuditLog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(clock, DEFAULT_ENTRIES_PER_SUBJECT, DEFAULT_MAX_SUBJECTS)
    }

    pub fn with_capacity(clock: Arc<dyn Clock>, per_subject: usize, max_subjects: usize) -> Self {
        Self {
            clock,
            per_subject: per_subject.max(1),
            max_subjects: max_subjects.max(1),
            trail: RwLock::new(Trail::default()),
        }
    }

    async fn record(&self, subject: &str, level: EventLevel, message: &str) {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            subject: subject.to_string(),
            level,
            message: message.to_string(),
            recorded_at: self.clock.now(),
        };

        let mut trail = self.trail.write().await;
        if !trail.by_subject.contains_key(subject) {
            while trail.subjects.len() >= self.max_subjects {
                let Some(oldest) = trail.subjects.pop_front() else {
                    break;
                };
                trail.by_subject.remove(&oldest);
                tracing::debug!("Audit trail for {} evicted", oldest);
            }
            trail.subjects.push_back(subject.to_string());
        }

        let entries = trail.by_subject.entry(subject.to_string()).or_default();
        if entries.len() >= self.per_subject {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub async fn entries_for(&self, subject: &str) -> Vec<AuditEntry> {
        self.trail
            .read()
            .await
            .by_subject
            .get(subject)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn messages_for(&self, subject: &str) -> Vec<String> {
        self.entries_for(subject)
            .await
            .into_iter()
            .map(|entry| entry.message)
            .collect()
    }

    /// Retained warnings across all subjects, oldest first.
    pub async fn warnings(&self) -> Vec<AuditEntry> {
        let trail = self.trail.read().await;
        let mut warnings: Vec<AuditEntry> = trail
            .subjects
            .iter()
            .filter_map(|subject| trail.by_subject.get(subject))
            .flatten()
            .filter(|entry| entry.level == EventLevel::Warning)
            .cloned()
            .collect();
        warnings.sort_by_key(|entry| entry.recorded_at);
        warnings
    }
}

#[async_trait]
impl EventSink for AuditLog {
    async fn info(&self, subject: &str, message: &str) {
        tracing::info!(subject, "{}", message);
        self.record(subject, EventLevel::Info, message).await;
    }

    async fn warn(&self, subject: &str, message: &str) {
        tracing::warn!(subject, "{}", message);
        self.record(subject, EventLevel::Warning, message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_audit_log_filters_by_subject() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let log = AuditLog::new(Arc::new(ManualClock::new(start)));

        log.info("amr-1", "Request created").await;
        log.warn("amr-2", "No ambulance available").await;
        log.info("amr-1", "Status changed to 'canceled'.").await;

        let entries = log.entries_for("amr-1").await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].recorded_at, start);
        assert_eq!(
            log.messages_for("amr-1").await,
            vec!["Request created".to_string(), "Status changed to 'canceled'.".to_string()]
        );

        let warnings = log.warnings().await;
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].subject, "amr-2");
    }

    #[tokio::test]
    async fn test_audit_log_keeps_newest_entries_per_subject() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let log = AuditLog::with_capacity(Arc::new(ManualClock::new(start)), 3, 2);

        for n in 0..5 {
            log.info("amr-1", &format!("update {}", n)).await;
        }
        assert_eq!(
            log.messages_for("amr-1").await,
            vec!["update 2".to_string(), "update 3".to_string(), "update 4".to_string()]
        );

        log.warn("amr-2", "No ambulance available").await;
        log.warn("amr-3", "No ambulance available").await;
        assert!(log.entries_for("amr-1").await.is_empty());
        assert_eq!(log.entries_for("amr-2").await.len(), 1);

        let subjects: Vec<String> = log.warnings().await.into_iter().map(|entry| entry.subject).collect();
        assert_eq!(subjects, vec!["amr-2".to_string(), "amr-3".to_string()]);
    }
}
