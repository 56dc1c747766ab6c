//! Vision model client for Vigil
//!
//! Provides a `VisionModel` trait with one production implementation:
//! - **OpenAI-compatible** — a single `chat/completions` call carrying the
//!   image as a data URL, returning the assistant's raw text.
//!
//! There is deliberately no retry: one request in, one model call out. The
//! only bound on the call is the client timeout.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::VisionConfig;

/// Output contract handed to the model as the system message.
pub const SYSTEM_PROMPT: &str = r#"You are an expert industrial safety and logistics AI system.
Analyze warehouse and workshop images to identify:
1. Industrial components (bolts, screws, tools, parts) with specifications
2. Safety hazards (spills, obstacles, unsafe conditions)

For each detected item, provide:
- Category: "component" or "hazard"
- Name: Specific identification (e.g., "M8 Hex Bolt", "Oil Spill")
- Description: Detailed observation
- Confidence: "high", "medium", or "low"
- Priority: "high" (immediate action), "medium" (monitor), "low" (routine)
- Action: Specific recommended action
- Location: If visible, describe location in image

Also provide an overall safety score (Safe/Caution/Danger) and summary.

Return response in this EXACT JSON format:
{
  "detected_items": [
    {
      "category": "component" or "hazard",
      "name": "Item name",
      "description": "Description",
      "confidence": "high/medium/low",
      "priority": "high/medium/low",
      "action": "Recommended action",
      "location": "Location in image"
    }
  ],
  "overall_safety_score": "Safe/Caution/Danger",
  "summary": "Overall analysis summary"
}"#;

pub const USER_PROMPT: &str = "Analyze this warehouse/workshop image. Identify all industrial components and safety hazards. Return structured JSON as specified.";

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

// ============================================================================
// VisionModel trait
// ============================================================================

/// Abstraction over vision-capable language model providers.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Send the image with the fixed prompts and return the model's raw text.
    async fn analyze_image(&self, image_base64: &str) -> Result<String, VisionError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Missing API key for vision model (set vision.api_key, VIGIL_LLM_KEY or OPENAI_API_KEY)")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Model response contained no message content")]
    EmptyResponse,

    #[error("Vision model call timed out after {0:?}")]
    Timeout(Duration),
}

impl VisionError {
    /// Configuration problems are surfaced to the caller instead of being
    /// folded into a fallback analysis.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::MissingApiKey)
    }
}

// ============================================================================
// Config
// ============================================================================

/// Runtime settings for [`OpenAiVisionClient`].
#[derive(Debug, Clone)]
pub struct VisionClientConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_tokens: u32,
}

impl From<&VisionConfig> for VisionClientConfig {
    fn from(c: &VisionConfig) -> Self {
        Self {
            api_key: c.api_key.clone(),
            model: c.model.clone(),
            base_url: c.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(c.timeout_seconds),
            max_tokens: c.max_tokens,
        }
    }
}

// ============================================================================
// Chat completions API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Wrap a bare base64 payload in a data URL; pass existing data URLs through.
pub fn image_data_url(image_base64: &str) -> String {
    let trimmed = image_base64.trim();
    if trimmed.starts_with("data:") {
        trimmed.to_string()
    } else {
        format!("data:{};base64,{}", DEFAULT_IMAGE_MIME, trimmed)
    }
}

// ============================================================================
// OpenAiVisionClient
// ============================================================================

/// Calls an OpenAI-compatible `chat/completions` endpoint with one image.
#[derive(Debug, Clone)]
pub struct OpenAiVisionClient {
    client: Client,
    config: VisionClientConfig,
}

impl OpenAiVisionClient {
    /// Build the client. A missing API key is not an error here; it is
    /// reported on each call so the server can still start and serve reads.
    pub fn new(config: VisionClientConfig) -> Result<Self, VisionError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn map_transport_error(&self, e: reqwest::Error) -> VisionError {
        if e.is_timeout() {
            VisionError::Timeout(self.config.timeout)
        } else {
            VisionError::Http(e)
        }
    }
}

#[async_trait]
impl VisionModel for OpenAiVisionClient {
    async fn analyze_image(&self, image_base64: &str) -> Result<String, VisionError> {
        if self.config.api_key.trim().is_empty() {
            return Err(VisionError::MissingApiKey);
        }

        let url = format!("{}/chat/completions", self.config.base_url);
        let request = ChatRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(SYSTEM_PROMPT),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        ContentPart::Text { text: USER_PROMPT },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: image_data_url(image_base64),
                            },
                        },
                    ]),
                },
            ],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);

            tracing::error!(code = status.as_u16(), message = %message, "Vision API error");

            return Err(VisionError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(VisionError::EmptyResponse)?;

        tracing::info!(model = %self.config.model, chars = text.len(), "Vision API response received");
        tracing::debug!(response = %text, "Vision API raw response");

        Ok(text)
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_key: &str, base_url: String) -> VisionClientConfig {
        VisionClientConfig {
            api_key: api_key.to_string(),
            model: "gpt-4o".to_string(),
            base_url,
            timeout: Duration::from_secs(5),
            max_tokens: 512,
        }
    }

    fn mock_chat_response(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        })
    }

    #[tokio::test]
    async fn test_analyze_image_sends_prompts_and_image() {
        let mock_server = MockServer::start().await;
        let client = OpenAiVisionClient::new(test_config("test-api-key", mock_server.uri()))
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-api-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "max_tokens": 512,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": [
                        { "type": "text", "text": USER_PROMPT },
                        { "type": "image_url", "image_url": { "url": "data:image/jpeg;base64,aGVsbG8=" } }
                    ]}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_chat_response("{\"ok\":true}")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = client.analyze_image("aGVsbG8=").await;

        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result.err());
        assert_eq!(result.unwrap(), "{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_network() {
        let mock_server = MockServer::start().await;
        let client = OpenAiVisionClient::new(test_config("", mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_chat_response("{}")))
            .expect(0)
            .mount(&mock_server)
            .await;

        let result = client.analyze_image("aGVsbG8=").await;
        match result {
            Err(e @ VisionError::MissingApiKey) => assert!(e.is_config()),
            other => panic!("Expected MissingApiKey, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_api_error_message_is_extracted() {
        let mock_server = MockServer::start().await;
        let client = OpenAiVisionClient::new(test_config("test-api-key", mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "message": "Rate limit exceeded", "type": "rate_limit" }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        match client.analyze_image("aGVsbG8=").await {
            Err(VisionError::Api { code, message }) => {
                assert_eq!(code, 429);
                assert_eq!(message, "Rate limit exceeded");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_api_error_with_plain_body() {
        let mock_server = MockServer::start().await;
        let client = OpenAiVisionClient::new(test_config("test-api-key", mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&mock_server)
            .await;

        match client.analyze_image("aGVsbG8=").await {
            Err(VisionError::Api { code, message }) => {
                assert_eq!(code, 502);
                assert_eq!(message, "bad gateway");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_error() {
        let mock_server = MockServer::start().await;
        let client = OpenAiVisionClient::new(test_config("test-api-key", mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .mount(&mock_server)
            .await;

        assert!(matches!(
            client.analyze_image("aGVsbG8=").await,
            Err(VisionError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn test_slow_model_hits_deadline() {
        let mock_server = MockServer::start().await;
        let mut config = test_config("test-api-key", mock_server.uri());
        config.timeout = Duration::from_millis(200);
        let client = OpenAiVisionClient::new(config).unwrap();

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(mock_chat_response("{}"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        match client.analyze_image("aGVsbG8=").await {
            Err(VisionError::Timeout(d)) => assert_eq!(d, Duration::from_millis(200)),
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_image_data_url() {
        assert_eq!(image_data_url("aGVsbG8="), "data:image/jpeg;base64,aGVsbG8=");
        assert_eq!(
            image_data_url("data:image/png;base64,aGVsbG8="),
            "data:image/png;base64,aGVsbG8="
        );
        assert_eq!(image_data_url("  aGVsbG8=\n"), "data:image/jpeg;base64,aGVsbG8=");
    }

    #[test]
    fn test_client_config_from_file_config() {
        let file = VisionConfig {
            base_url: "http://localhost:9999/v1/".to_string(),
            timeout_seconds: 7,
            ..VisionConfig::default()
        };
        let c = VisionClientConfig::from(&file);
        assert_eq!(c.base_url, "http://localhost:9999/v1");
        assert_eq!(c.timeout, Duration::from_secs(7));
    }
}
