//! Chat-completion client used for plan generation and summaries.
//!
//! The [`ModelClient`] trait is the seam the generator depends on; the
//! OpenAI-compatible HTTP client is the production implementation.

use std::str::FromStr;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Name of the function the model is asked to call in function-call mode.
pub const BREAKDOWN_FUNCTION: &str = "create_breakdown";

/// Error from a model call.
#[derive(Debug, Error)]
#[error("{kind}{}: {message}", .status_code.map(|c| format!(" (HTTP {c})")).unwrap_or_default())]
pub struct LlmError {
    pub kind: LlmErrorKind,
    /// HTTP status code, if the server answered at all
    pub status_code: Option<u16>,
    pub message: String,
}

impl LlmError {
    pub fn http(status_code: u16, message: String) -> Self {
        Self {
            kind: classify_http_status(status_code),
            status_code: Some(status_code),
            message,
        }
    }

    pub fn network_error(message: String) -> Self {
        Self {
            kind: LlmErrorKind::NetworkError,
            status_code: None,
            message,
        }
    }

    pub fn parse_error(message: String) -> Self {
        Self {
            kind: LlmErrorKind::ParseError,
            status_code: None,
            message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// 429
    RateLimited,
    /// 5xx
    ServerError,
    /// Other 4xx: bad key, bad request, unknown model
    ClientError,
    /// Connection refused, timeout, reset
    NetworkError,
    /// The response envelope was not a chat completion
    ParseError,
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmErrorKind::RateLimited => write!(f, "Rate limited"),
            LlmErrorKind::ServerError => write!(f, "Server error"),
            LlmErrorKind::ClientError => write!(f, "Client error"),
            LlmErrorKind::NetworkError => write!(f, "Network error"),
            LlmErrorKind::ParseError => write!(f, "Parse error"),
        }
    }
}

pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        429 => LlmErrorKind::RateLimited,
        400..=499 => LlmErrorKind::ClientError,
        _ => LlmErrorKind::ServerError,
    }
}

/// How the model is asked to return structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// `response_format: {"type": "json_object"}`
    #[default]
    JsonObject,
    /// A single forced function tool whose arguments carry the breakdown.
    FunctionCall,
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" | "json_object" => Ok(ResponseMode::JsonObject),
            "function" | "function_call" | "tools" => Ok(ResponseMode::FunctionCall),
            other => Err(format!("unknown response mode '{other}'")),
        }
    }
}

/// One prompt pair sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Plain prose responses (summaries) skip structured-output settings.
    pub structured: bool,
}

impl CompletionRequest {
    pub fn structured(system: String, user: String, max_tokens: u32) -> Self {
        Self {
            system,
            user,
            max_tokens,
            temperature: 0.7,
            structured: true,
        }
    }

    pub fn prose(system: String, user: String, max_tokens: u32) -> Self {
        Self {
            system,
            user,
            max_tokens,
            temperature: 0.5,
            structured: false,
        }
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send the prompt and return the raw text of the first choice.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    mode: ResponseMode,
}

impl OpenAiClient {
    pub fn new(base_url: String, api_key: String, model: String, mode: ResponseMode) -> Self {
        Self {
            http: Client::new(),
            base_url,
            api_key,
            model,
            mode,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        if request.structured {
            match self.mode {
                ResponseMode::JsonObject => {
                    body["response_format"] = json!({"type": "json_object"});
                }
                ResponseMode::FunctionCall => {
                    body["tools"] = json!([breakdown_tool()]);
                    body["tool_choice"] = json!({
                        "type": "function",
                        "function": {"name": BREAKDOWN_FUNCTION}
                    });
                }
            }
        }

        body
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Deserialize)]
struct FunctionCall {
    arguments: String,
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let url = self.endpoint();
        tracing::debug!("Calling model {} at {}", self.model, url);

        let response = match self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(LlmError::network_error(format!("Request timeout: {e}")))
            }
            Err(e) if e.is_connect() => {
                return Err(LlmError::network_error(format!("Connection failed: {e}")))
            }
            Err(e) => return Err(LlmError::network_error(format!("Request failed: {e}"))),
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(LlmError::http(status.as_u16(), body));
        }

        let text = extract_completion_text(&body)?;
        Ok(clean_model_output(&text))
    }
}

/// Pull the model's text out of a chat-completion body, preferring tool-call
/// arguments over message content.
pub fn extract_completion_text(body: &str) -> Result<String, LlmError> {
    let parsed: ChatCompletion = serde_json::from_str(body)
        .map_err(|e| LlmError::parse_error(format!("Failed to parse response: {e}")))?;

    let message = parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| LlmError::parse_error("No choices in response".to_string()))?;

    if let Some(call) = message.tool_calls.into_iter().flatten().next() {
        return Ok(call.function.arguments);
    }

    message
        .content
        .ok_or_else(|| LlmError::parse_error("Response has neither content nor tool call".to_string()))
}

/// Strip a surrounding markdown code fence, if any.
pub fn clean_model_output(response: &str) -> String {
    let mut cleaned = response.trim();

    if cleaned.starts_with("```") {
        cleaned = match cleaned.find('\n') {
            Some(idx) => &cleaned[idx + 1..],
            None => &cleaned[3..],
        };
        cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned);
    }

    cleaned.trim().to_string()
}

/// Function tool whose parameters describe the breakdown object.
fn breakdown_tool() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": BREAKDOWN_FUNCTION,
            "description": "Return the task breakdown as structured data",
            "parameters": {
                "type": "object",
                "properties": {
                    "breakdown": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "unit": {"type": "string"},
                                "tasks": {"type": "array", "items": {"type": "string"}}
                            },
                            "required": ["unit", "tasks"]
                        }
                    }
                },
                "required": ["breakdown"]
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};

    #[test]
    fn test_http_status_classification() {
        assert_eq!(classify_http_status(429), LlmErrorKind::RateLimited);
        assert_eq!(classify_http_status(500), LlmErrorKind::ServerError);
        assert_eq!(classify_http_status(503), LlmErrorKind::ServerError);
        assert_eq!(classify_http_status(401), LlmErrorKind::ClientError);
        assert_eq!(classify_http_status(404), LlmErrorKind::ClientError);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            LlmError::http(429, "slow down".to_string()).to_string(),
            "Rate limited (HTTP 429): slow down"
        );
        assert_eq!(
            LlmError::network_error("refused".to_string()).to_string(),
            "Network error: refused"
        );
    }

    #[test]
    fn test_clean_model_output_strips_fences() {
        assert_eq!(clean_model_output("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(clean_model_output("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_extracts_content_and_tool_arguments() {
        let content = r#"{"choices": [{"message": {"content": "hello"}}]}"#;
        assert_eq!(extract_completion_text(content).unwrap(), "hello");

        let tool = r#"{"choices": [{"message": {"content": null, "tool_calls": [
            {"id": "1", "type": "function", "function": {"name": "create_breakdown", "arguments": "{\"breakdown\": []}"}}
        ]}}]}"#;
        assert_eq!(extract_completion_text(tool).unwrap(), r#"{"breakdown": []}"#);

        let err = extract_completion_text(r#"{"choices": []}"#).unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::ParseError);
    }

    #[test]
    fn test_request_body_follows_mode() {
        let req = CompletionRequest::structured("sys".into(), "user".into(), 100);

        let json_mode = OpenAiClient::new("http://x".into(), "k".into(), "m".into(), ResponseMode::JsonObject);
        assert_eq!(json_mode.model(), "m");
        assert_eq!(json_mode.endpoint(), "http://x/chat/completions");
        let body = json_mode.request_body(&req);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert!(body.get("tools").is_none());

        let fn_mode = OpenAiClient::new("http://x".into(), "k".into(), "m".into(), ResponseMode::FunctionCall);
        let body = fn_mode.request_body(&req);
        assert_eq!(body["tools"][0]["function"]["name"], BREAKDOWN_FUNCTION);

        let prose = CompletionRequest::prose("sys".into(), "user".into(), 50);
        assert!(fn_mode.request_body(&prose).get("tools").is_none());
    }

    #[test]
    fn test_response_mode_from_str() {
        assert_eq!("json".parse::<ResponseMode>().unwrap(), ResponseMode::JsonObject);
        assert_eq!("FUNCTION".parse::<ResponseMode>().unwrap(), ResponseMode::FunctionCall);
        assert!("xml".parse::<ResponseMode>().is_err());
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn test_complete_against_local_server() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                Json(json!({"choices": [{"message": {"content": "```json\n{\"breakdown\": []}\n```"}}]}))
            }),
        );
        let base = serve(router).await;

        let client = OpenAiClient::new(base, "key".into(), "m".into(), ResponseMode::JsonObject);
        let req = CompletionRequest::structured("s".into(), "u".into(), 10);
        assert_eq!(client.complete(&req).await.unwrap(), r#"{"breakdown": []}"#);
    }

    #[tokio::test]
    async fn test_rate_limit_is_classified() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base = serve(router).await;

        let client = OpenAiClient::new(base, "key".into(), "m".into(), ResponseMode::JsonObject);
        let req = CompletionRequest::structured("s".into(), "u".into(), 10);
        let err = client.complete(&req).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::RateLimited);
        assert_eq!(err.status_code, Some(429));
    }
}
