//! SQLite analytics store: a `global` metrics document plus an event log.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::{AnalyticsError, AnalyticsEvent, AnalyticsMetrics, AnalyticsStore, EventData, EventType};

pub const DATABASE_FILE: &str = "analytics.db";

const METRICS_DOCUMENT_ID: &str = "global";

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS analytics (
    id TEXT PRIMARY KEY NOT NULL,
    document TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_attempts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    data TEXT
);

CREATE INDEX IF NOT EXISTS idx_user_attempts_timestamp ON user_attempts(timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_user_attempts_type ON user_attempts(type);
"#;

pub struct SqliteAnalyticsStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqliteAnalyticsStore {
    pub async fn new(base_dir: PathBuf) -> Result<Self, AnalyticsError> {
        tokio::fs::create_dir_all(&base_dir).await?;
        let db_path = base_dir.join(DATABASE_FILE);

        let open_path = db_path.clone();
        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&open_path)?;
            conn.execute_batch(SCHEMA)?;
            Ok::<_, rusqlite::Error>(conn)
        })
        .await
        .map_err(|e| AnalyticsError::Task(e.to_string()))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    fn read_metrics(conn: &Connection) -> Result<AnalyticsMetrics, AnalyticsError> {
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM analytics WHERE id = ?1",
                params![METRICS_DOCUMENT_ID],
                |row| row.get(0),
            )
            .optional()?;

        match document {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(AnalyticsMetrics::default()),
        }
    }

    fn write_metrics(conn: &Connection, metrics: &AnalyticsMetrics) -> Result<(), AnalyticsError> {
        conn.execute(
            "INSERT INTO analytics (id, document) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET document = excluded.document",
            params![METRICS_DOCUMENT_ID, serde_json::to_string(metrics)?],
        )?;
        Ok(())
    }
}

#[async_trait]
impl AnalyticsStore for SqliteAnalyticsStore {
    async fn record_event(&self, event: AnalyticsEvent) -> Result<AnalyticsMetrics, AnalyticsError> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            let tx = conn.transaction()?;

            let mut metrics = Self::read_metrics(&tx)?;
            metrics.apply(&event);
            Self::write_metrics(&tx, &metrics)?;

            tx.execute(
                "INSERT INTO user_attempts (type, timestamp, data) VALUES (?1, ?2, ?3)",
                params![
                    event.event_type.as_str(),
                    event.timestamp,
                    serde_json::to_string(&event.data)?
                ],
            )?;
            tx.commit()?;

            Ok::<_, AnalyticsError>(metrics)
        })
        .await
        .map_err(|e| AnalyticsError::Task(e.to_string()))?
    }

    async fn metrics(&self) -> Result<AnalyticsMetrics, AnalyticsError> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            Self::read_metrics(&conn)
        })
        .await
        .map_err(|e| AnalyticsError::Task(e.to_string()))?
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<AnalyticsEvent>, AnalyticsError> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(
                "SELECT type, timestamp, data FROM user_attempts
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?1",
            )?;

            let rows = stmt.query_map(params![limit as i64], |row| {
                let event_type: String = row.get(0)?;
                let timestamp: String = row.get(1)?;
                let data: Option<String> = row.get(2)?;
                Ok((event_type, timestamp, data))
            })?;

            let mut events = Vec::new();
            for row in rows {
                let (event_type, timestamp, data) = row?;
                let Some(event_type) = EventType::parse(&event_type) else {
                    tracing::warn!("Skipping analytics event of unknown type {}", event_type);
                    continue;
                };
                let data: EventData = data
                    .and_then(|d| serde_json::from_str(&d).ok())
                    .unwrap_or_default();
                events.push(AnalyticsEvent {
                    event_type,
                    timestamp,
                    data,
                });
            }
            Ok::<_, AnalyticsError>(events)
        })
        .await
        .map_err(|e| AnalyticsError::Task(e.to_string()))?
    }

    fn describe(&self) -> String {
        format!("SQLite - {}", self.db_path.display())
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::DownloadType;

    #[tokio::test]
    async fn test_records_metrics_and_events() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteAnalyticsStore::new(dir.path().to_path_buf()).await.unwrap();

        store
            .record_event(AnalyticsEvent::task_breakdown("Learn Rust"))
            .await
            .unwrap();
        store
            .record_event(AnalyticsEvent::download(DownloadType::Pdf))
            .await
            .unwrap();
        let metrics = store.record_event(AnalyticsEvent::visit()).await.unwrap();

        assert_eq!(metrics.task_breakdowns_generated, 1);
        assert_eq!(metrics.downloads_completed, 1);
        assert_eq!(metrics.visits_count, 1);

        let events = store.recent_events(10).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, EventType::Visit);
        assert_eq!(events[1].data.download_type.as_deref(), Some("pdf"));
        assert_eq!(events[2].data.task_description.as_deref(), Some("Learn Rust"));
    }

    #[tokio::test]
    async fn test_metrics_persist_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SqliteAnalyticsStore::new(dir.path().to_path_buf()).await.unwrap();
            store
                .record_event(AnalyticsEvent::task_breakdown("Write a novel"))
                .await
                .unwrap();
        }

        let store = SqliteAnalyticsStore::new(dir.path().to_path_buf()).await.unwrap();
        let metrics = store.metrics().await.unwrap();
        assert_eq!(metrics.recent_tasks, vec!["Write a novel"]);
        assert!(store.describe().ends_with(DATABASE_FILE));
    }
}
