use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    tools: Option<Value>,
}

#[derive(Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

struct AppState {
    attempt_count: AtomicUsize,
    fail_attempts: usize,
}

fn batch_regex() -> &'static Regex {
    static BATCH_RE: OnceLock<Regex> = OnceLock::new();
    BATCH_RE.get_or_init(|| {
        Regex::new(r"Produce ONLY (Week|Day) (\d+) through (?:Week|Day) (\d+)")
            .expect("batch regex must compile")
    })
}

fn single_shot_regex() -> &'static Regex {
    static SINGLE_RE: OnceLock<Regex> = OnceLock::new();
    SINGLE_RE.get_or_init(|| {
        Regex::new(r"Produce exactly (\d+) units, one per (day|week)")
            .expect("single shot regex must compile")
    })
}

/// Period name and inclusive 1-based range requested by the prompt.
fn requested_range(prompt: &str) -> (String, usize, usize) {
    if let Some(caps) = batch_regex().captures(prompt) {
        let start = caps[2].parse().unwrap_or(1);
        let end = caps[3].parse().unwrap_or(start);
        return (caps[1].to_string(), start, end);
    }
    if let Some(caps) = single_shot_regex().captures(prompt) {
        let count = caps[1].parse().unwrap_or(1);
        let period = if &caps[2] == "day" { "Day" } else { "Week" };
        return (period.to_string(), 1, count);
    }
    ("Week".to_string(), 1, 4)
}

fn breakdown_json(period: &str, start: usize, end: usize) -> String {
    let units: Vec<Value> = (start..=end)
        .map(|i| {
            json!({
                "unit": format!("{period} {i}"),
                "tasks": [
                    format!("Review the material planned for {} {}", period.to_lowercase(), i),
                    format!("Practice exercise set {i}"),
                ]
            })
        })
        .collect();
    json!({ "breakdown": units }).to_string()
}

async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Json<Value> {
    let attempt = state.attempt_count.fetch_add(1, Ordering::SeqCst) + 1;
    let prompt = req
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or("");

    tracing::info!("Mock LLM: Received request (attempt {})", attempt);
    tracing::debug!("Prompt preview: {}...", prompt.chars().take(200).collect::<String>());

    if prompt.starts_with("Summarize") {
        return Json(completion(
            "Work through the plan one period at a time, practicing as you go.".to_string(),
            false,
        ));
    }

    let (period, start, end) = requested_range(prompt);
    let mut output = breakdown_json(&period, start, end);

    // Fail first N attempts to exercise the repair chain
    if attempt <= state.fail_attempts {
        tracing::info!("Mock LLM: Returning truncated JSON");
        output.truncate(output.len() * 2 / 3);
    } else {
        tracing::info!("Mock LLM: Returning {} {} unit(s)", end + 1 - start, period);
    }

    Json(completion(output, req.tools.is_some()))
}

fn completion(text: String, as_tool_call: bool) -> Value {
    let message = if as_tool_call {
        json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_mock",
                "type": "function",
                "function": {"name": "create_breakdown", "arguments": text}
            }]
        })
    } else {
        json!({"role": "assistant", "content": text})
    };

    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "choices": [{"index": 0, "message": message, "finish_reason": "stop"}]
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mock_llm_server=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port = std::env::var("MOCK_LLM_PORT")
        .unwrap_or_else(|_| "8081".to_string())
        .parse::<u16>()
        .unwrap_or(8081);

    let fail_attempts = std::env::var("MOCK_LLM_FAIL_ATTEMPTS")
        .unwrap_or_else(|_| "1".to_string())
        .parse::<usize>()
        .unwrap_or(1);

    let state = Arc::new(AppState {
        attempt_count: AtomicUsize::new(0),
        fail_attempts,
    });

    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/chat/completions", post(chat_completions))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Mock LLM server listening on http://{}", addr);
    tracing::info!("Will truncate the first {} response(s)", fail_attempts);
    tracing::info!("Point OPENAI_BASE_URL at http://{}/v1", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
