//! External collaborators: the generation service (chat + embeddings), retry
//! confirmation, and the narrator that speaks commentary.

mod openai;
mod retry;

pub use openai::OpenAiClient;
pub use retry::{PendingRetryPrompt, RetryQuestion};

use crate::models::OutcomeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Failures of a generation call. Every variant is retryable.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Request to the generation service failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Generation service answered with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Generation service response has no message content")]
    MissingContent,
    #[error("Generation service response has no embedding")]
    MissingEmbedding,
    #[error("Generated content is not usable: {0}")]
    Malformed(String),
    #[error("Generated battle is not usable: {0}")]
    InvalidOutcome(#[from] OutcomeError),
}

/// Message content: plain text, or text + image parts for the summon request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    /// User message carrying a prompt and an image (low detail).
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                        detail: "low".to_string(),
                    },
                },
            ]),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Chat completion request asking for a JSON object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub response_format: ResponseFormat,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn json_object(model: impl Into<String>, messages: Vec<ChatMessage>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages,
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
            max_tokens,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: String,
    pub encoding_format: String,
}

impl EmbeddingRequest {
    pub fn new(model: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            input: input.into(),
            encoding_format: "float".to_string(),
        }
    }
}

/// The AI provider.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Run a chat completion and return `choices[0].message.content`.
    async fn complete(&self, request: &ChatRequest) -> Result<String, GenerationError>;

    /// Embedding vector for a text.
    async fn embed(&self, request: &EmbeddingRequest) -> Result<Vec<f32>, GenerationError>;
}

/// Asked between failed attempts whether to keep trying.
#[async_trait]
pub trait RetryPrompt: Send + Sync {
    /// `attempt` failed out of `max_attempts`; `true` retries.
    async fn confirm_retry(&self, attempt: u32, max_attempts: u32, error: &GenerationError) -> bool;

    /// All attempts failed.
    fn report_failure(&self, attempts: u32, error: &GenerationError);
}

/// Speech output for commentary. `speak` never blocks.
#[async_trait]
pub trait Narrator: Send + Sync {
    fn speak(&self, text: &str);

    fn is_speaking(&self) -> bool;

    /// Resolve once nothing is being spoken.
    async fn wait_idle(&self);
}

/// Narrator that only logs; the client side does the speaking.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentNarrator;

#[async_trait]
impl Narrator for SilentNarrator {
    fn speak(&self, text: &str) {
        log::debug!("narration: {}", text);
    }

    fn is_speaking(&self) -> bool {
        false
    }

    async fn wait_idle(&self) {}
}
