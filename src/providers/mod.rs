//! Remote AI capabilities
//!
//! The session only depends on the two traits defined here. The chat
//! capability streams cumulative text snapshots; the speech capability turns
//! text into an encoded audio payload.

mod gemini;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::config::Config;
use crate::conversation::{Citation, Message};

pub use gemini::{
    GeminiConfig, GeminiProvider, DEFAULT_CHAT_MODEL, DEFAULT_SPEECH_MODEL, DEFAULT_VOICE,
};

/// Sampling temperature for every chat request
pub const CHAT_TEMPERATURE: f32 = 0.8;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A single logical request to the chat capability
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Bounded context window, oldest first
    pub messages: Vec<Message>,

    pub system_directive: String,

    /// Allow the model to ground answers with real-time web search
    pub web_search: bool,

    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>, system_directive: String) -> Self {
        Self {
            messages,
            system_directive,
            web_search: true,
            temperature: CHAT_TEMPERATURE,
        }
    }
}

/// Incremental delivery from the chat capability
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Full text received so far; replaces any earlier snapshot
    Snapshot(String),

    /// End of the response
    Completed { citations: Vec<Citation> },
}

/// Lazily consumed sequence of chat events
pub type SnapshotStream = BoxStream<'static, Result<ChatEvent, ProviderError>>;

#[async_trait]
pub trait ChatCapability: Send + Sync {
    async fn stream_chat(&self, request: ChatRequest) -> Result<SnapshotStream, ProviderError>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Base64 PCM16 speech for `text`, or `None` when nothing was produced
    async fn synthesize(&self, text: &str) -> Result<Option<String>, ProviderError>;
}

/// Build the Gemini provider from application configuration
pub fn gemini_from_config(config: &Config) -> Result<GeminiProvider, ProviderError> {
    let api_key = config
        .gemini_api_key
        .clone()
        .ok_or_else(|| ProviderError::NotConfigured("GEMINI_API_KEY is not set".into()))?;

    let mut gemini = GeminiConfig::new(api_key);
    if let Some(ref url) = config.gemini_base_url {
        gemini.base_url = url.trim_end_matches('/').to_string();
    }
    config.client.llm.apply_to(&mut gemini);

    Ok(GeminiProvider::new(gemini))
}
