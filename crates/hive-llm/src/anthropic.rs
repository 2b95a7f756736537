use async_trait::async_trait;
use serde_json::json;

use crate::{FinishReason, ProviderAdapter, Request, Response, Role, TransportConfig, Usage};
use hive_types::HiveError;

const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

// ---------------------------------------------------------------------------
// AnthropicAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AnthropicAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    default_model: String,
    timeout_ms: u64,
}

impl AnthropicAdapter {
    pub fn new(api_key: String, transport: &TransportConfig) -> Result<Self, HiveError> {
        Ok(Self {
            client: transport.build_client()?,
            api_key,
            base_url: transport.base_url.trim_end_matches('/').to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            timeout_ms: transport.timeout.as_millis() as u64,
        })
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Read the API key from `key_var` (usually `ANTHROPIC_API_KEY`).
    pub fn from_env(key_var: &str, transport: &TransportConfig) -> Result<Self, HiveError> {
        let key = std::env::var(key_var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| HiveError::AuthError {
                provider: "anthropic".into(),
            })?;
        Self::new(key, transport)
    }
}

// ---------------------------------------------------------------------------
// Request translation (Unified → Anthropic JSON)
// ---------------------------------------------------------------------------

fn build_request_body(request: &Request) -> serde_json::Value {
    // 1. System messages become the top-level system field
    let system: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    // 2. Remaining turns
    let messages: Vec<serde_json::Value> = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = match m.role {
                Role::Assistant => "assistant",
                _ => "user",
            };
            json!({ "role": role, "content": [{ "type": "text", "text": m.content }] })
        })
        .collect();

    // 3. Build body
    let mut body = json!({
        "model": request.model,
        "max_tokens": request.max_tokens.unwrap_or(4096),
        "messages": messages,
    });

    if !system.is_empty() {
        body["system"] = json!(system.join("\n\n"));
    }

    if !request.stop_sequences.is_empty() {
        body["stop_sequences"] = json!(request.stop_sequences);
    }

    if let Some(temp) = request.temperature {
        body["temperature"] = json!(temp);
    }

    body
}

// ---------------------------------------------------------------------------
// Response translation (Anthropic JSON → Unified Response)
// ---------------------------------------------------------------------------

fn parse_response(body: &serde_json::Value) -> Result<Response, HiveError> {
    let id = body["id"].as_str().unwrap_or("").to_string();
    let model = body["model"].as_str().unwrap_or("").to_string();

    let finish_reason = match body["stop_reason"].as_str() {
        Some("end_turn") => FinishReason::EndTurn,
        Some("max_tokens") => FinishReason::MaxTokens,
        Some("stop_sequence") => FinishReason::StopSequence,
        _ => FinishReason::Other,
    };

    let text: String = body["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b["type"] == "text")
                .filter_map(|b| b["text"].as_str())
                .collect()
        })
        .unwrap_or_default();

    let input_tokens = body["usage"]["input_tokens"].as_u64().unwrap_or(0);
    let output_tokens = body["usage"]["output_tokens"].as_u64().unwrap_or(0);

    Ok(Response {
        id,
        text,
        usage: Usage {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        },
        model,
        finish_reason,
    })
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(status: reqwest::StatusCode, body: &str) -> HiveError {
    let status_u16 = status.as_u16();
    match status_u16 {
        429 => {
            let retry_ms = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v["error"]["retry_after"].as_f64())
                .map(|s| (s * 1000.0) as u64)
                .unwrap_or(1000);
            HiveError::RateLimited {
                provider: "anthropic".into(),
                retry_after_ms: retry_ms,
            }
        }
        401 | 403 => HiveError::AuthError {
            provider: "anthropic".into(),
        },
        500 | 502 | 503 | 529 => HiveError::ProviderError {
            provider: "anthropic".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => HiveError::ProviderError {
            provider: "anthropic".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: false,
        },
    }
}

fn map_send_error(e: reqwest::Error, timeout_ms: u64) -> HiveError {
    if e.is_timeout() {
        HiveError::RequestTimeout {
            provider: "anthropic".into(),
            timeout_ms,
        }
    } else {
        HiveError::ProviderError {
            provider: "anthropic".into(),
            status: 0,
            message: e.to_string(),
            retryable: true,
        }
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| hive_types::truncate_chars(body, 500))
}

// ---------------------------------------------------------------------------
// ProviderAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    async fn complete(&self, request: &Request) -> Result<Response, HiveError> {
        let body = build_request_body(request);
        let timeout_ms = self.timeout_ms;

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout_ms))?;

        let status = resp.status();
        let response_body = resp
            .text()
            .await
            .map_err(|e| map_send_error(e, timeout_ms))?;

        if !status.is_success() {
            return Err(map_error(status, &response_body));
        }

        let json: serde_json::Value =
            serde_json::from_str(&response_body).map_err(|e| HiveError::ProviderError {
                provider: "anthropic".into(),
                status: status.as_u16(),
                message: format!("Failed to parse response JSON: {e}"),
                retryable: false,
            })?;

        parse_response(&json)
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
