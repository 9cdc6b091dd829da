//! Usage analytics with pluggable storage backends.
//!
//! Supports:
//! - `memory`: in-process counters (non-persistent, for tests and local runs)
//! - `file`: a single `analytics.json` document
//! - `sqlite`: a `global` metrics document plus an event table
//!
//! Handlers talk to [`Analytics`], which never fails: storage errors are
//! logged and the request carries on.

mod file;
mod memory;
mod sqlite;

pub use file::FileAnalyticsStore;
pub use memory::InMemoryAnalyticsStore;
pub use sqlite::SqliteAnalyticsStore;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Most recent goals kept in the metrics document, newest first.
pub const MAX_RECENT_TASKS: usize = 50;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("analytics I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("analytics document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("analytics database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("analytics task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsMetrics {
    #[serde(default)]
    pub task_breakdowns_generated: u64,
    #[serde(default)]
    pub downloads_completed: u64,
    #[serde(default)]
    pub visits_count: u64,
    #[serde(default = "now_string")]
    pub last_updated: String,
    #[serde(default)]
    pub recent_tasks: Vec<String>,
}

impl Default for AnalyticsMetrics {
    fn default() -> Self {
        Self {
            task_breakdowns_generated: 0,
            downloads_completed: 0,
            visits_count: 0,
            last_updated: now_string(),
            recent_tasks: Vec::new(),
        }
    }
}

impl AnalyticsMetrics {
    /// Fold one event into the counters.
    pub fn apply(&mut self, event: &AnalyticsEvent) {
        match event.event_type {
            EventType::TaskBreakdown => {
                self.task_breakdowns_generated += 1;
                if let Some(task) = &event.data.task_description {
                    self.recent_tasks.insert(0, task.clone());
                    self.recent_tasks.truncate(MAX_RECENT_TASKS);
                }
            }
            EventType::Download => self.downloads_completed += 1,
            EventType::Visit => self.visits_count += 1,
        }
        self.last_updated = event.timestamp.clone();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TaskBreakdown,
    Download,
    Visit,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::TaskBreakdown => "task_breakdown",
            EventType::Download => "download",
            EventType::Visit => "visit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "task_breakdown" => Some(EventType::TaskBreakdown),
            "download" => Some(EventType::Download),
            "visit" => Some(EventType::Visit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadType {
    Pdf,
    Text,
    Json,
}

impl DownloadType {
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadType::Pdf => "pdf",
            DownloadType::Text => "text",
            DownloadType::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: String,
    #[serde(default)]
    pub data: EventData,
}

impl AnalyticsEvent {
    fn new(event_type: EventType, data: EventData) -> Self {
        Self {
            event_type,
            timestamp: now_string(),
            data,
        }
    }

    pub fn task_breakdown(goal: &str) -> Self {
        Self::new(
            EventType::TaskBreakdown,
            EventData {
                task_description: Some(goal.to_string()),
                ..EventData::default()
            },
        )
    }

    pub fn download(download_type: DownloadType) -> Self {
        Self::new(
            EventType::Download,
            EventData {
                download_type: Some(download_type.as_str().to_string()),
                ..EventData::default()
            },
        )
    }

    pub fn visit() -> Self {
        Self::new(EventType::Visit, EventData::default())
    }
}

#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Apply the event to the counters and persist both.
    async fn record_event(&self, event: AnalyticsEvent) -> Result<AnalyticsMetrics, AnalyticsError>;

    async fn metrics(&self) -> Result<AnalyticsMetrics, AnalyticsError>;

    /// Newest first. Backends without an event log return nothing.
    async fn recent_events(&self, _limit: usize) -> Result<Vec<AnalyticsEvent>, AnalyticsError> {
        Ok(Vec::new())
    }

    /// Human-readable storage location.
    fn describe(&self) -> String;

    fn is_persistent(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreType {
    Memory,
    #[default]
    File,
    Sqlite,
}

impl StoreType {
    /// Parse from environment variable value.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "memory" => Self::Memory,
            "file" | "json" => Self::File,
            "sqlite" | "db" => Self::Sqlite,
            _ => Self::default(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StoreType::Memory => "memory",
            StoreType::File => "file",
            StoreType::Sqlite => "sqlite",
        }
    }
}

/// Create an analytics store based on type and directory.
pub async fn create_analytics_store(
    store_type: StoreType,
    base_dir: PathBuf,
) -> Result<Arc<dyn AnalyticsStore>, AnalyticsError> {
    match store_type {
        StoreType::Memory => Ok(Arc::new(InMemoryAnalyticsStore::new())),
        StoreType::File => Ok(Arc::new(FileAnalyticsStore::new(base_dir).await?)),
        StoreType::Sqlite => Ok(Arc::new(SqliteAnalyticsStore::new(base_dir).await?)),
    }
}

/// Error-swallowing front end over an [`AnalyticsStore`].
#[derive(Clone)]
pub struct Analytics {
    store: Arc<dyn AnalyticsStore>,
}

impl Analytics {
    pub fn new(store: Arc<dyn AnalyticsStore>) -> Self {
        Self { store }
    }

    async fn track(&self, event: AnalyticsEvent) {
        let event_type = event.event_type;
        match self.store.record_event(event).await {
            Ok(metrics) => tracing::debug!(
                "Analytics: {} recorded ({} breakdowns, {} downloads, {} visits)",
                event_type.as_str(),
                metrics.task_breakdowns_generated,
                metrics.downloads_completed,
                metrics.visits_count
            ),
            Err(e) => tracing::warn!("Failed to record {} event: {}", event_type.as_str(), e),
        }
    }

    pub async fn track_breakdown(&self, goal: &str) {
        self.track(AnalyticsEvent::task_breakdown(goal)).await;
    }

    pub async fn track_download(&self, download_type: DownloadType) {
        self.track(AnalyticsEvent::download(download_type)).await;
    }

    pub async fn track_visit(&self) {
        self.track(AnalyticsEvent::visit()).await;
    }

    /// Current counters, or zeroed counters when the store is unreadable.
    pub async fn metrics(&self) -> AnalyticsMetrics {
        self.store.metrics().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to read analytics: {}", e);
            AnalyticsMetrics::default()
        })
    }

    pub async fn recent_events(&self, limit: usize) -> Vec<AnalyticsEvent> {
        self.store.recent_events(limit).await.unwrap_or_else(|e| {
            tracing::warn!("Failed to read analytics events: {}", e);
            Vec::new()
        })
    }

    pub fn storage_description(&self) -> String {
        self.store.describe()
    }

    /// Whether counters survive a restart.
    pub fn is_persistent(&self) -> bool {
        self.store.is_persistent()
    }
}

/// The first `count` recent goals, each cut to `max_chars` characters plus
/// `...` when longer.
pub fn recent_task_sample(metrics: &AnalyticsMetrics, count: usize, max_chars: usize) -> Vec<String> {
    metrics
        .recent_tasks
        .iter()
        .take(count)
        .map(|task| {
            if task.chars().count() > max_chars {
                let cut: String = task.chars().take(max_chars).collect();
                format!("{cut}...")
            } else {
                task.clone()
            }
        })
        .collect()
}

pub(crate) fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_updates_counters_and_recent_tasks() {
        let mut metrics = AnalyticsMetrics::default();
        for i in 0..(MAX_RECENT_TASKS + 5) {
            metrics.apply(&AnalyticsEvent::task_breakdown(&format!("goal {i}")));
        }
        metrics.apply(&AnalyticsEvent::download(DownloadType::Text));
        metrics.apply(&AnalyticsEvent::visit());

        assert_eq!(metrics.task_breakdowns_generated, 55);
        assert_eq!(metrics.downloads_completed, 1);
        assert_eq!(metrics.visits_count, 1);
        assert_eq!(metrics.recent_tasks.len(), MAX_RECENT_TASKS);
        assert_eq!(metrics.recent_tasks[0], "goal 54");
    }

    #[test]
    fn test_recent_task_sample_truncates() {
        let metrics = AnalyticsMetrics {
            recent_tasks: vec!["a".repeat(60), "short".to_string()],
            ..AnalyticsMetrics::default()
        };
        let sample = recent_task_sample(&metrics, 10, 50);
        assert_eq!(sample[0], format!("{}...", "a".repeat(50)));
        assert_eq!(sample[1], "short");
    }

    #[test]
    fn test_event_wire_format() {
        let event = AnalyticsEvent::download(DownloadType::Pdf);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "download");
        assert_eq!(json["data"]["downloadType"], "pdf");
        assert!(json["data"].get("taskDescription").is_none());
    }

    #[test]
    fn test_legacy_document_without_visits_or_tasks() {
        let json = r#"{"taskBreakdownsGenerated": 3, "downloadsCompleted": 1, "lastUpdated": "2024-01-01T00:00:00.000Z"}"#;
        let metrics: AnalyticsMetrics = serde_json::from_str(json).unwrap();
        assert_eq!(metrics.visits_count, 0);
        assert!(metrics.recent_tasks.is_empty());
    }

    #[test]
    fn test_store_type_from_str() {
        assert_eq!(StoreType::from_str("SQLite"), StoreType::Sqlite);
        assert_eq!(StoreType::from_str("memory"), StoreType::Memory);
        assert_eq!(StoreType::from_str("mongo"), StoreType::File);
    }

    #[tokio::test]
    async fn test_facade_tracks_through_store() {
        let analytics = Analytics::new(Arc::new(InMemoryAnalyticsStore::new()));
        analytics.track_breakdown("Learn Rust").await;
        analytics.track_visit().await;

        let metrics = analytics.metrics().await;
        assert_eq!(metrics.task_breakdowns_generated, 1);
        assert_eq!(metrics.visits_count, 1);
        assert_eq!(analytics.recent_events(10).await.len(), 2);
    }
}
