use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::api::BreakdownResponse;
use crate::export::ExportFormat;
use crate::generator::Summary;
use crate::plan::{Breakdown, BreakdownForm};

/// HTTP client for a running breakdown server.
pub struct BreakdownClient {
    http: reqwest::Client,
    base_url: String,
}

impl BreakdownClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn health(&self) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}/api/health", self.base_url))
            .send()
            .await
            .map_err(|e| anyhow!("Failed to reach server at {}: {e}", self.base_url))?;
        read_json(response).await
    }

    pub async fn generate(&self, form: &BreakdownForm) -> Result<BreakdownResponse> {
        self.post("/api/breakdown", form).await
    }

    pub async fn generate_with_timeout(
        &self,
        form: &BreakdownForm,
        timeout: Duration,
    ) -> Result<BreakdownResponse> {
        tokio::time::timeout(timeout, self.generate(form))
            .await
            .map_err(|_| anyhow!("Request timed out after {:?}", timeout))?
    }

    pub async fn summarize(&self, breakdown: &Breakdown) -> Result<Summary> {
        self.post("/api/summary", breakdown).await
    }

    /// Rendered file contents for `format`.
    pub async fn export(&self, format: ExportFormat, breakdown: &Breakdown) -> Result<Vec<u8>> {
        let response = self
            .http
            .post(format!("{}/api/export", self.base_url))
            .json(&json!({"format": format, "breakdown": breakdown.units}))
            .send()
            .await
            .map_err(|e| anyhow!("Export request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(server_error(response).await);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| anyhow!("Failed to read export: {e}"))?;
        Ok(bytes.to_vec())
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow!("Request to {path} failed: {e}"))?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(server_error(response).await);
    }
    response
        .json()
        .await
        .map_err(|e| anyhow!("Failed to decode response: {e}"))
}

async fn server_error(response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    anyhow!("Server returned {}: {}", status, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{GenerationMode, GenerationStatus};
    use crate::plan::{EffortUnit, Granularity};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn form() -> BreakdownForm {
        BreakdownForm {
            goal: "Learn basic cooking".to_string(),
            total_effort: 10,
            effort_unit: EffortUnit::Hours,
            daily_hours_commitment: 2,
            granularity: Granularity::Daily,
        }
    }

    #[tokio::test]
    async fn test_generate_decodes_breakdown_and_meta() {
        let router = Router::new().route(
            "/api/breakdown",
            post(|| async {
                Json(json!({
                    "breakdown": [{"unit": "Day 1", "tasks": ["Knife skills"]}],
                    "meta": {
                        "status": "partial_success",
                        "mode": "single_shot",
                        "expectedUnits": 5,
                        "fallbackUnits": 0
                    }
                }))
            }),
        );
        let client = BreakdownClient::new(serve(router).await + "/");

        let response = client.generate(&form()).await.unwrap();
        assert_eq!(response.breakdown.len(), 1);
        assert_eq!(response.breakdown.units[0].subtasks, vec!["Knife skills"]);
        assert_eq!(response.meta.status, GenerationStatus::PartialSuccess);
        assert_eq!(response.meta.mode, GenerationMode::SingleShot);
        assert_eq!(response.meta.expected_units, 5);
    }

    #[tokio::test]
    async fn test_error_message_is_surfaced() {
        let router = Router::new().route(
            "/api/breakdown",
            post(|| async {
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({"success": false, "error": "Plan too long"})),
                )
            }),
        );
        let client = BreakdownClient::new(serve(router).await);

        let err = client.generate(&form()).await.unwrap_err().to_string();
        assert!(err.contains("422"));
        assert!(err.ends_with("Plan too long"));
    }

    #[tokio::test]
    async fn test_generate_times_out() {
        let router = Router::new().route(
            "/api/breakdown",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        );
        let client = BreakdownClient::new(serve(router).await);

        let err = client
            .generate_with_timeout(&form(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
