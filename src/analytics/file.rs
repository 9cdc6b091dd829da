//! JSON file-based analytics store. Keeps counters only, no event log.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

use super::{AnalyticsError, AnalyticsEvent, AnalyticsMetrics, AnalyticsStore};

pub const ANALYTICS_FILE: &str = "analytics.json";

#[derive(Clone)]
pub struct FileAnalyticsStore {
    path: PathBuf,
    metrics: Arc<RwLock<AnalyticsMetrics>>,
    persist_lock: Arc<Mutex<()>>,
}

impl FileAnalyticsStore {
    pub async fn new(base_dir: PathBuf) -> Result<Self, AnalyticsError> {
        fs::create_dir_all(&base_dir).await?;
        let path = base_dir.join(ANALYTICS_FILE);

        let metrics = match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<AnalyticsMetrics>(&bytes) {
                Ok(metrics) => metrics,
                Err(e) => {
                    tracing::warn!("Failed to parse analytics file {}: {}", path.display(), e);
                    AnalyticsMetrics::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => AnalyticsMetrics::default(),
            Err(err) => {
                tracing::warn!("Failed to read analytics file {}: {}", path.display(), err);
                AnalyticsMetrics::default()
            }
        };

        let store = Self {
            path,
            metrics: Arc::new(RwLock::new(metrics)),
            persist_lock: Arc::new(Mutex::new(())),
        };
        store.persist().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<(), AnalyticsError> {
        let _guard = self.persist_lock.lock().await;
        let data = serde_json::to_vec_pretty(&*self.metrics.read().await)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, data).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl AnalyticsStore for FileAnalyticsStore {
    async fn record_event(&self, event: AnalyticsEvent) -> Result<AnalyticsMetrics, AnalyticsError> {
        let snapshot = {
            let mut metrics = self.metrics.write().await;
            metrics.apply(&event);
            metrics.clone()
        };
        self.persist().await?;
        Ok(snapshot)
    }

    async fn metrics(&self) -> Result<AnalyticsMetrics, AnalyticsError> {
        Ok(self.metrics.read().await.clone())
    }

    fn describe(&self) -> String {
        format!("Local file - {}", self.path.display())
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counters_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let store = FileAnalyticsStore::new(dir.path().to_path_buf()).await.unwrap();
        store
            .record_event(AnalyticsEvent::task_breakdown("Learn Rust"))
            .await
            .unwrap();
        store.record_event(AnalyticsEvent::visit()).await.unwrap();
        drop(store);

        let reopened = FileAnalyticsStore::new(dir.path().to_path_buf()).await.unwrap();
        let metrics = reopened.metrics().await.unwrap();
        assert_eq!(metrics.task_breakdowns_generated, 1);
        assert_eq!(metrics.visits_count, 1);
        assert_eq!(metrics.recent_tasks, vec!["Learn Rust"]);
        assert!(reopened.recent_events(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ANALYTICS_FILE), "not json").unwrap();

        let store = FileAnalyticsStore::new(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(store.metrics().await.unwrap().task_breakdowns_generated, 0);

        let written = std::fs::read_to_string(store.path()).unwrap();
        assert!(written.contains("\"taskBreakdownsGenerated\": 0"));
    }
}
