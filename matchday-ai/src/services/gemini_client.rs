//! Gemini client
//!
//! Speaks the Gemini `generateContent` REST API. The API is stateless, so a
//! [`GeminiSession`] keeps the conversation history client-side and sends
//! the whole history with every turn.
//!
//! # API Reference
//! - Endpoint: `{base_url}/v1beta/models/{model}:generateContent`
//! - Auth: `x-goog-api-key` header
//! - Structured output: `generationConfig.responseMimeType` +
//!   `generationConfig.responseSchema`

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::AnalysisError;
use crate::models::GenerationOptions;

/// Gemini REST base URL
pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

/// Default timeout for one Gemini turn
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const USER_AGENT: &str = concat!("matchday-ai/", env!("CARGO_PKG_VERSION"));

/// Structured output directive sent with the final turn
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationDirective {
    /// Schema the JSON reply must conform to
    pub response_schema: Value,
    pub options: GenerationOptions,
}

/// Raw result of one turn, before classification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnResponse {
    /// Concatenated text of the primary candidate
    pub text: Option<String>,
    /// Completion reason name reported for the primary candidate
    pub finish_reason: Option<String>,
    /// Prompt-level block reason, if the prompt was rejected
    pub block_reason: Option<String>,
}

/// One conversation with isolated history
#[async_trait]
pub trait AiSession: Send {
    async fn send(
        &mut self,
        message: &str,
        directive: Option<&GenerationDirective>,
    ) -> Result<TurnResponse, AnalysisError>;
}

/// Factory for conversations
pub trait AiService: Send + Sync {
    /// Open a fresh session with empty history
    fn create_session(&self, model_id: &str) -> Box<dyn AiSession>;
}

/// Prefix a bare model name with `models/`
pub fn normalize_model_id(model_id: &str) -> String {
    let model_id = model_id.trim();
    if model_id.starts_with("models/") {
        model_id.to_string()
    } else {
        format!("models/{}", model_id)
    }
}

/// Gemini REST client
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl GeminiClient {
    /// Create a client; `base_url` defaults to the public endpoint
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));

        let http_client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| AnalysisError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = base_url
            .unwrap_or_else(|| GEMINI_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            http_client,
            base_url,
            api_key,
            timeout,
        })
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest<'_>,
    ) -> Result<GenerateContentResponse, AnalysisError> {
        let url = format!("{}/v1beta/{}:generateContent", self.base_url, model);
        debug!(url = %url, turns = request.contents.len(), "Sending Gemini request");

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AnalysisError::from_reqwest(e, self.timeout.as_secs()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(AnalysisError::Transport {
                    detail: format!("429 Too Many Requests: {}", body),
                    rate_limited: true,
                });
            }
            return Err(AnalysisError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| AnalysisError::Decode(format!("Failed to parse Gemini response: {}", e)))
    }
}

impl AiService for GeminiClient {
    fn create_session(&self, model_id: &str) -> Box<dyn AiSession> {
        Box::new(GeminiSession {
            client: self.clone(),
            model: normalize_model_id(model_id),
            history: Vec::new(),
        })
    }
}

/// Conversation against one Gemini model
pub struct GeminiSession {
    client: GeminiClient,
    model: String,
    history: Vec<Content>,
}

impl GeminiSession {
    /// Number of committed turns (user and model)
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[async_trait]
impl AiSession for GeminiSession {
    async fn send(
        &mut self,
        message: &str,
        directive: Option<&GenerationDirective>,
    ) -> Result<TurnResponse, AnalysisError> {
        let mut contents = self.history.clone();
        contents.push(Content::text("user", message));

        let response = {
            let request = GenerateContentRequest {
                contents: &contents,
                generation_config: directive.map(GenerationConfig::from_directive),
            };
            self.client.generate(&self.model, &request).await?
        };

        let block_reason = response
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason);
        let candidate = response.candidates.into_iter().next();

        // An unblocked reply without a candidate would silently drop this turn
        if candidate.is_none() && block_reason.is_none() {
            return Err(AnalysisError::Decode(
                "Gemini response contained no candidate".to_string(),
            ));
        }

        let mut turn = TurnResponse {
            block_reason,
            ..Default::default()
        };

        if let Some(candidate) = candidate {
            turn.finish_reason = candidate.finish_reason;
            let text = candidate
                .content
                .map(|content| content.joined_text())
                .unwrap_or_default();

            // Only a turn that produced a reply becomes part of the history
            self.history = contents;
            self.history.push(Content::text("model", &text));
            turn.text = Some(text);
        }

        Ok(turn)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }

    fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

impl GenerationConfig {
    fn from_directive(directive: &GenerationDirective) -> Self {
        Self {
            response_mime_type: "application/json",
            response_schema: directive.response_schema.clone(),
            max_output_tokens: directive.options.max_output_tokens,
            temperature: directive.options.temperature,
            top_p: directive.options.top_p,
            top_k: directive.options.top_k,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}
