//! In-memory analytics store (non-persistent).

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{AnalyticsError, AnalyticsEvent, AnalyticsMetrics, AnalyticsStore};

/// Events kept before the oldest are dropped.
const MAX_EVENTS: usize = 1000;

#[derive(Clone, Default)]
pub struct InMemoryAnalyticsStore {
    metrics: Arc<RwLock<AnalyticsMetrics>>,
    events: Arc<RwLock<VecDeque<AnalyticsEvent>>>,
}

impl InMemoryAnalyticsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnalyticsStore for InMemoryAnalyticsStore {
    async fn record_event(&self, event: AnalyticsEvent) -> Result<AnalyticsMetrics, AnalyticsError> {
        let snapshot = {
            let mut metrics = self.metrics.write().await;
            metrics.apply(&event);
            metrics.clone()
        };

        let mut events = self.events.write().await;
        events.push_front(event);
        events.truncate(MAX_EVENTS);

        Ok(snapshot)
    }

    async fn metrics(&self) -> Result<AnalyticsMetrics, AnalyticsError> {
        Ok(self.metrics.read().await.clone())
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<AnalyticsEvent>, AnalyticsError> {
        Ok(self.events.read().await.iter().take(limit).cloned().collect())
    }

    fn describe(&self) -> String {
        "In-memory (non-persistent)".to_string()
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{DownloadType, EventType};

    #[tokio::test]
    async fn test_events_are_newest_first() {
        let store = InMemoryAnalyticsStore::new();
        store.record_event(AnalyticsEvent::visit()).await.unwrap();
        store
            .record_event(AnalyticsEvent::download(DownloadType::Text))
            .await
            .unwrap();

        let events = store.recent_events(1).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Download);
        assert!(!store.is_persistent());
    }
}
