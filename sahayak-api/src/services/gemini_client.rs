//! Generative model client
//!
//! `PlaybookModel` is the seam between playbook generation and the hosted
//! model. `GeminiClient` implements it over the Gemini `generateContent`
//! REST endpoint; tests substitute their own implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("sahayak-api/", env!("CARGO_PKG_VERSION"));

/// Model client errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Client configuration error: {0}")]
    Config(String),
}

/// Text produced by the model plus token accounting
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub prompt_tokens: Option<i64>,
    pub response_tokens: Option<i64>,
}

#[async_trait]
pub trait PlaybookModel: Send + Sync {
    /// Model identifier recorded on generated playbooks
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<ModelReply, ModelError>;
}

/// Sampling parameters sent with every request
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 2048,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i64>,
    candidates_token_count: Option<i64>,
}

/// Gemini REST client
pub struct GeminiClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    generation: GenerationConfig,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        if api_key.trim().is_empty() {
            return Err(ModelError::Config("API key is empty".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::Config(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            generation: GenerationConfig::default(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl PlaybookModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<ModelReply, ModelError> {
        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: self.generation,
        };

        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Calling Gemini");

        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout
                } else {
                    ModelError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(status.as_u16(), error_text));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }

        let usage = parsed.usage_metadata;
        tracing::info!(chars = text.len(), "Gemini response received");

        Ok(ModelReply {
            text,
            prompt_tokens: usage.as_ref().and_then(|u| u.prompt_token_count),
            response_tokens: usage.as_ref().and_then(|u| u.candidates_token_count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base_url: String) -> GeminiClient {
        GeminiClient::new(
            "test-key".to_string(),
            "gemini-2.5-flash".to_string(),
            base_url,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = GeminiClient::new(
            " ".to_string(),
            "m".to_string(),
            "http://localhost".to_string(),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(ModelError::Config(_))));
    }

    #[tokio::test]
    async fn test_generate_parses_candidates_and_usage() {
        let app = Router::new().route(
            "/v1beta/models/:model",
            post(|Path(model): Path<String>, headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(model, "gemini-2.5-flash:generateContent");
                assert_eq!(headers["x-goog-api-key"], "test-key");
                assert_eq!(body["generationConfig"]["topK"], 40);
                assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
                assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
                Json(json!({
                    "candidates": [{"content": {"parts": [{"text": "### Title\n"}, {"text": "Fraction Rescue"}]}}],
                    "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 34}
                }))
            }),
        );
        let base = spawn_server(app).await;

        let reply = client(base).generate("hello").await.unwrap();
        assert_eq!(reply.text, "### Title\nFraction Rescue");
        assert_eq!(reply.prompt_tokens, Some(12));
        assert_eq!(reply.response_tokens, Some(34));
    }

    #[tokio::test]
    async fn test_generate_maps_http_errors() {
        let app = Router::new().route(
            "/v1beta/models/:model",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "quota exceeded") }),
        );
        let base = spawn_server(app).await;

        match client(base).generate("hello").await {
            Err(ModelError::Api(code, body)) => {
                assert_eq!(code, 429);
                assert!(body.contains("quota"));
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_empty_candidates() {
        let app = Router::new().route(
            "/v1beta/models/:model",
            post(|| async { Json(json!({"candidates": []})) }),
        );
        let base = spawn_server(app).await;

        assert!(matches!(
            client(base).generate("hello").await,
            Err(ModelError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn test_generate_unreachable_host() {
        // Port 9 (discard) is closed on test machines
        let result = client("http://127.0.0.1:9".to_string()).generate("hello").await;
        assert!(matches!(
            result,
            Err(ModelError::Network(_)) | Err(ModelError::Timeout)
        ));
    }
}
