//! Gemini provider
//!
//! Chat goes through `streamGenerateContent` with server-sent events so the
//! reply can be previewed while it is generated. Speech goes through the TTS
//! model with an audio response modality.
//!
//! # Configuration
//!
//! ```toml
//! [llm]
//! chat_model = "gemini-3-flash-preview"
//! speech_model = "gemini-2.5-flash-preview-tts"
//! voice = "Kore"
//! ```

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::conversation::{Citation, Message, Role};

use super::{
    ChatCapability, ChatEvent, ChatRequest, ProviderError, SnapshotStream, SpeechSynthesizer,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_VOICE: &str = "Kore";

/// Title used for grounding sources that come without one
const UNTITLED_SOURCE: &str = "Search Result";

/// Gemini API configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub api_key: String,
    pub chat_model: String,
    pub speech_model: String,
    /// Prebuilt voice name for speech synthesis
    pub voice: String,
    /// Instruction placed ahead of the text to be spoken
    pub speech_style: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            speech_model: DEFAULT_SPEECH_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            speech_style: "Respond as Lexy (sophisticated/sarcastic)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: Option<String>,
    data: String,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

impl From<&Message> for Content {
    fn from(msg: &Message) -> Self {
        Self {
            role: Some(
                match msg.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                }
                .to_string(),
            ),
            parts: vec![Part::text(msg.content.clone())],
        }
    }
}

/// Request body for `generateContent` / `streamGenerateContent`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    generation_config: Value,
}

impl From<&ChatRequest> for GenerateRequest {
    fn from(request: &ChatRequest) -> Self {
        let tools = if request.web_search {
            vec![json!({ "googleSearch": {} })]
        } else {
            Vec::new()
        };

        Self {
            contents: request.messages.iter().map(Content::from).collect(),
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::text(request.system_directive.clone())],
            }),
            tools,
            generation_config: json!({ "temperature": request.temperature }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uri: Option<String>,
}

impl GenerateResponse {
    fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    /// Concatenated text of the first candidate
    fn text(&self) -> Option<String> {
        let content = self.first_candidate()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        Some(text)
    }

    fn audio(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .find_map(|p| p.inline_data)
            .map(|d| d.data)
            .filter(|d| !d.is_empty())
    }
}

impl GroundingMetadata {
    fn citations(&self) -> Vec<Citation> {
        self.grounding_chunks
            .iter()
            .filter_map(|chunk| {
                let web = chunk.web.as_ref()?;
                let uri = web.uri.clone().filter(|u| !u.is_empty())?;
                Some(Citation {
                    title: web
                        .title
                        .clone()
                        .unwrap_or_else(|| UNTITLED_SOURCE.to_string()),
                    uri,
                })
            })
            .collect()
    }
}

/// Error response from API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Folds streamed response chunks into cumulative snapshots
#[derive(Debug, Default)]
struct SnapshotAccumulator {
    text: String,
    citations: Vec<Citation>,
}

impl SnapshotAccumulator {
    /// Handle one SSE line, returning a snapshot if the text grew
    fn feed_line(&mut self, line: &str) -> Result<Option<ChatEvent>, ProviderError> {
        let Some(payload) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == "[DONE]" {
            return Ok(None);
        }

        let chunk: GenerateResponse = serde_json::from_str(payload).map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse stream chunk: {}", e))
        })?;

        if let Some(meta) = chunk
            .first_candidate()
            .and_then(|c| c.grounding_metadata.as_ref())
        {
            self.citations = meta.citations();
        }

        match chunk.text() {
            Some(text) if !text.is_empty() => {
                self.text.push_str(&text);
                Ok(Some(ChatEvent::Snapshot(self.text.clone())))
            }
            _ => Ok(None),
        }
    }

    fn finish(self) -> ChatEvent {
        ChatEvent::Completed {
            citations: self.citations,
        }
    }
}

/// Turn a raw SSE byte stream into chat events
fn sse_events<S>(mut bytes: S) -> impl Stream<Item = Result<ChatEvent, ProviderError>> + Send
where
    S: Stream<Item = Result<Vec<u8>, ProviderError>> + Send + Unpin + 'static,
{
    async_stream::stream! {
        let mut pending: Vec<u8> = Vec::new();
        let mut acc = SnapshotAccumulator::default();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            pending.extend_from_slice(&chunk);

            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                match acc.feed_line(line.trim_end()) {
                    Ok(Some(event)) => yield Ok(event),
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }

        if !pending.is_empty() {
            let line = String::from_utf8_lossy(&pending).into_owned();
            match acc.feed_line(line.trim_end()) {
                Ok(Some(event)) => yield Ok(event),
                Ok(None) => {}
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        yield Ok(acc.finish());
    }
}

/// Gemini API provider
pub struct GeminiProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    async fn post(&self, url: String, body: &impl Serialize) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if let Ok(error_resp) = serde_json::from_str::<ErrorResponse>(&body) {
            return Err(ProviderError::InvalidResponse(format!(
                "API error: {}",
                error_resp.error.message
            )));
        }
        Err(ProviderError::InvalidResponse(format!("HTTP {}: {}", status, body)))
    }
}

#[async_trait]
impl ChatCapability for GeminiProvider {
    async fn stream_chat(&self, request: ChatRequest) -> Result<SnapshotStream, ProviderError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url, self.config.chat_model
        );
        let body = GenerateRequest::from(&request);

        tracing::debug!(
            model = %self.config.chat_model,
            messages = request.messages.len(),
            "streaming chat request"
        );

        let response = self.post(url, &body).await?;
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(ProviderError::from));

        Ok(Box::pin(sse_events(Box::pin(bytes))))
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiProvider {
    async fn synthesize(&self, text: &str) -> Result<Option<String>, ProviderError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.speech_model
        );
        let body = json!({
            "contents": [{
                "parts": [{ "text": format!("{}: {}", self.config.speech_style, text) }]
            }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.config.voice }
                    }
                }
            }
        });

        let response = self.post(url, &body).await?;
        let body = response.text().await?;
        let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse speech response: {}", e))
        })?;

        Ok(parsed.audio())
    }
}
