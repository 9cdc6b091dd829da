use std::sync::Arc;

use anyhow::{Context, Result};
use task_breakdown::activity_log::{ActivityLog, DEFAULT_DAYS_TO_KEEP};
use task_breakdown::analytics::{
    create_analytics_store, Analytics, AnalyticsStore, InMemoryAnalyticsStore,
};
use task_breakdown::api::{router, AppState};
use task_breakdown::config::Config;
use task_breakdown::generator::Generator;
use task_breakdown::llm::OpenAiClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "task_breakdown=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let activity = Arc::new(ActivityLog::new(config.log_path.clone()));
    match activity.cleanup_old_logs(DEFAULT_DAYS_TO_KEEP).await {
        Ok(0) => {}
        Ok(n) => tracing::info!("Removed {} expired activity log file(s)", n),
        Err(e) => tracing::warn!("Activity log cleanup failed: {}", e),
    }

    let backend = config.analytics_backend;
    let store: Arc<dyn AnalyticsStore> =
        match create_analytics_store(backend, config.log_path.clone()).await {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(
                    "{} analytics storage unavailable ({}), counting in memory",
                    backend.as_str(),
                    e
                );
                Arc::new(InMemoryAnalyticsStore::new())
            }
        };
    let analytics = Analytics::new(store);
    tracing::info!("Analytics storage: {}", analytics.storage_description());
    if !analytics.is_persistent() {
        tracing::warn!("Analytics counters reset on restart");
    }

    let client = OpenAiClient::new(
        config.base_url.clone(),
        config.api_key.clone(),
        config.model.clone(),
        config.response_mode,
    );
    tracing::info!("Using model {} at {}", client.model(), client.endpoint());
    tracing::info!("Structured output mode: {:?}", config.response_mode);
    let generator = Generator::new(Arc::new(client), config.generation.clone())
        .with_activity_log(Arc::clone(&activity));

    let state = Arc::new(AppState {
        generator,
        analytics,
        activity,
    });
    let app = router(Arc::clone(&state));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Task breakdown server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
