//! Minimal OpenAI client for our use-cases.
//!
//! We call `embeddings` and `chat.completions` (plain text and single-image vision).
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to avoid PII leaks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{Completion, Embedder};
use crate::error::ProviderError;

const UA: &str = "mathsnap-backend/0.1";

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub chat_model: String,
  pub vision_model: String,
  pub embedding_model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let chat_model =
      std::env::var("OPENAI_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let vision_model =
      std::env::var("OPENAI_VISION_MODEL").unwrap_or_else(|_| "gpt-4o".into());
    let embedding_model =
      std::env::var("OPENAI_EMBEDDING_MODEL").unwrap_or_else(|_| "text-embedding-3-small".into());

    Self::new(api_key, base_url, chat_model, vision_model, embedding_model).ok()
  }

  pub fn new(
    api_key: String,
    base_url: String,
    chat_model: String,
    vision_model: String,
    embedding_model: String,
  ) -> Result<Self, ProviderError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()?;
    Ok(Self { client, api_key, base_url, chat_model, vision_model, embedding_model })
  }

  async fn post_json<B: Serialize, T: for<'a> Deserialize<'a>>(&self, path: &str, body: &B) -> Result<T, ProviderError> {
    let url = format!("{}{}", self.base_url, path);
    let res = self.client.post(&url)
      .header(USER_AGENT, UA)
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(body).send().await?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      return Err(ProviderError::Api { status, message });
    }

    res.json::<T>().await.map_err(|e| ProviderError::Malformed(e.to_string()))
  }

  /// Shared chat call; returns trimmed content or `EmptyResponse`.
  #[instrument(level = "info", skip(self, messages), fields(model = %model, n_messages = messages.len()))]
  async fn chat(
    &self,
    model: &str,
    messages: Vec<ChatMessageReq>,
    temperature: Option<f32>,
    max_tokens: u32,
  ) -> Result<String, ProviderError> {
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages,
      temperature,
      max_tokens: Some(max_tokens),
    };

    let start = Instant::now();
    let body: ChatCompletionResponse = self.post_json("/chat/completions", &req).await?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, elapsed = ?start.elapsed(), "OpenAI usage");
    }
    let text = body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .map(|t| t.trim().to_string())
      .unwrap_or_default();

    if text.is_empty() {
      return Err(ProviderError::EmptyResponse);
    }
    debug!(response_len = text.len(), "Chat completion received");
    Ok(text)
  }
}

#[async_trait]
impl Embedder for OpenAI {
  #[instrument(level = "info", skip(self, text), fields(model = %self.embedding_model, text_len = text.len()))]
  async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
    let req = EmbeddingRequest {
      model: &self.embedding_model,
      input: text,
      encoding_format: "float",
    };
    let body: EmbeddingResponse = self.post_json("/embeddings", &req).await?;
    let vector = body.data.into_iter().next().map(|d| d.embedding).unwrap_or_default();
    if vector.is_empty() {
      return Err(ProviderError::EmptyResponse);
    }
    debug!(dims = vector.len(), "Embedding created");
    Ok(vector)
  }
}

#[async_trait]
impl Completion for OpenAI {
  async fn complete(
    &self,
    system: &str,
    user: &str,
    temperature: f32,
    max_tokens: u32,
  ) -> Result<String, ProviderError> {
    let messages = vec![
      ChatMessageReq { role: "system".into(), content: MessageContent::Text(system.into()) },
      ChatMessageReq { role: "user".into(), content: MessageContent::Text(user.into()) },
    ];
    self.chat(&self.chat_model, messages, Some(temperature), max_tokens).await
  }

  async fn complete_with_image(
    &self,
    prompt: &str,
    image_url: &str,
    detail: &str,
    max_tokens: u32,
  ) -> Result<String, ProviderError> {
    let messages = vec![ChatMessageReq {
      role: "user".into(),
      content: MessageContent::Parts(vec![
        ContentPart::Text { text: prompt.into() },
        ContentPart::ImageUrl { image_url: ImageUrl { url: image_url.into(), detail: detail.into() } },
      ]),
    }];
    self.chat(&self.vision_model, messages, None, max_tokens).await
  }
}

// --- Embedding DTOs ---

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: &'a str,
  encoding_format: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse { data: Vec<EmbeddingData> }
#[derive(Deserialize)]
struct EmbeddingData { embedding: Vec<f32> }

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  #[serde(skip_serializing_if = "Option::is_none")]
  temperature: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: MessageContent }

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
  Text(String),
  Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
  Text { text: String },
  ImageUrl { image_url: ImageUrl },
}
#[derive(Serialize)]
struct ImageUrl { url: String, detail: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use wiremock::matchers::{body_partial_json, header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn client(server: &MockServer) -> OpenAI {
    OpenAI::new(
      "test-key".into(),
      server.uri(),
      "chat-model".into(),
      "vision-model".into(),
      "embed-model".into(),
    )
    .unwrap()
  }

  #[tokio::test]
  async fn embed_returns_first_vector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/embeddings"))
      .and(header("authorization", "Bearer test-key"))
      .and(body_partial_json(json!({ "model": "embed-model", "input": "slope", "encoding_format": "float" })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "data": [{ "embedding": [0.1, 0.2, 0.3] }]
      })))
      .mount(&server)
      .await;

    let v = client(&server).embed("slope").await.unwrap();
    assert_eq!(v, vec![0.1, 0.2, 0.3]);
  }

  #[tokio::test]
  async fn api_errors_carry_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/embeddings"))
      .respond_with(ResponseTemplate::new(429).set_body_json(json!({
        "error": { "message": "Rate limit reached" }
      })))
      .mount(&server)
      .await;

    match client(&server).embed("slope").await {
      Err(ProviderError::Api { status, message }) => {
        assert_eq!(status, 429);
        assert_eq!(message, "Rate limit reached");
      }
      other => panic!("unexpected: {:?}", other),
    }
  }

  #[tokio::test]
  async fn complete_sends_budget_and_trims_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .and(body_partial_json(json!({
        "model": "chat-model",
        "temperature": 0.5,
        "max_tokens": 1000,
        "messages": [
          { "role": "system", "content": "sys" },
          { "role": "user", "content": "what is a slope?" }
        ]
      })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "content": "  Slope is rise over run.  " } }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
      })))
      .mount(&server)
      .await;

    let out = client(&server).complete("sys", "what is a slope?", 0.5, 1000).await.unwrap();
    assert_eq!(out, "Slope is rise over run.");
  }

  #[tokio::test]
  async fn missing_content_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "content": null } }]
      })))
      .mount(&server)
      .await;

    let err = client(&server).complete("sys", "q", 0.7, 1000).await.unwrap_err();
    assert!(matches!(err, ProviderError::EmptyResponse));
  }

  #[tokio::test]
  async fn vision_request_uses_content_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .and(body_partial_json(json!({
        "model": "vision-model",
        "messages": [{
          "role": "user",
          "content": [
            { "type": "text", "text": "read this" },
            { "type": "image_url", "image_url": { "url": "https://img.example/p.png", "detail": "high" } }
          ]
        }]
      })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "content": "{\"extractedText\": \"2x+3=7\"}" } }]
      })))
      .mount(&server)
      .await;

    let out = client(&server)
      .complete_with_image("read this", "https://img.example/p.png", "high", 800)
      .await
      .unwrap();
    assert!(out.contains("2x+3=7"));
  }
}
