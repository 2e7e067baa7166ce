//! reqwest client for an OpenAI-compatible chat completion + embeddings API.

use crate::config::ApiSettings;
use crate::services::{ChatRequest, EmbeddingRequest, GenerationError, GenerationService};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub struct OpenAiClient {
    http: reqwest::Client,
    settings: ApiSettings,
}

impl OpenAiClient {
    pub fn new(settings: ApiSettings) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { http, settings })
    }

    async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<Value, GenerationError> {
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.settings.api_key)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<Value>().await?)
    }
}

#[async_trait]
impl GenerationService for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GenerationError> {
        let json = self.post_json(&self.settings.chat_endpoint, request).await?;
        content_of(&json)
    }

    async fn embed(&self, request: &EmbeddingRequest) -> Result<Vec<f32>, GenerationError> {
        let json = self
            .post_json(&self.settings.embedding_endpoint, request)
            .await?;
        embedding_of(&json)
    }
}

/// `choices[0].message.content`; absence is a hard failure.
fn content_of(json: &Value) -> Result<String, GenerationError> {
    json.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or(GenerationError::MissingContent)
}

fn embedding_of(json: &Value) -> Result<Vec<f32>, GenerationError> {
    let values = json
        .pointer("/data/0/embedding")
        .and_then(Value::as_array)
        .ok_or(GenerationError::MissingEmbedding)?;
    values
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect::<Option<Vec<f32>>>()
        .ok_or(GenerationError::MissingEmbedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_requires_first_choice_message() {
        let ok = serde_json::json!({"choices": [{"message": {"content": "{\"a\":1}"}}]});
        assert_eq!(content_of(&ok).unwrap(), "{\"a\":1}");

        let missing = serde_json::json!({"error": {"message": "rate limited"}});
        assert!(matches!(content_of(&missing), Err(GenerationError::MissingContent)));
    }

    #[test]
    fn embedding_must_be_numeric() {
        let ok = serde_json::json!({"data": [{"embedding": [0.5, -1.0]}]});
        assert_eq!(embedding_of(&ok).unwrap(), vec![0.5, -1.0]);

        let bad = serde_json::json!({"data": [{"embedding": ["x"]}]});
        assert!(matches!(embedding_of(&bad), Err(GenerationError::MissingEmbedding)));
    }
}
