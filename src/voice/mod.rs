//! Voice capture
//!
//! Speech recognition is provided by the host, if at all. Whether it exists
//! is decided once at startup by injecting an optional recognizer; asking
//! for capture without one fails immediately with a user-facing notice.
//! Capture is one-shot: it yields a single final transcript or ends without
//! a result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::conversation::Message;
use crate::core::Session;

/// Notice shown when the host has no speech recognition
pub const CAPTURE_UNAVAILABLE_NOTICE: &str = "System Vocal Capture Unavailable.";

/// Outcome of one capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Transcript(String),
    EndedWithoutResult,
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Begin a one-shot capture; the receiver resolves when it ends
    async fn start(&self) -> Result<oneshot::Receiver<RecognitionEvent>, VoiceError>;

    /// End the current capture early
    async fn stop(&self);
}

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("{0}")]
    CapabilityUnavailable(&'static str),

    #[error("Speech recognition failed: {0}")]
    Recognition(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    Idle,
    Listening,
}

#[derive(Debug)]
pub enum ToggleOutcome {
    /// Capture began; the handle resolves to the reply of the submitted
    /// transcript, if there was one
    Started(JoinHandle<Option<Message>>),
    Stopped,
}

pub struct VoiceCapture {
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    listening: Arc<AtomicBool>,
}

impl VoiceCapture {
    pub fn new(recognizer: Option<Arc<dyn SpeechRecognizer>>) -> Self {
        Self {
            recognizer,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_available(&self) -> bool {
        self.recognizer.is_some()
    }

    pub fn state(&self) -> CaptureState {
        if self.listening.load(Ordering::Acquire) {
            CaptureState::Listening
        } else {
            CaptureState::Idle
        }
    }

    /// Stop capture when listening, otherwise start it
    ///
    /// A final transcript is submitted to `session` as a normal turn.
    pub async fn toggle(&self, session: Arc<Session>) -> Result<ToggleOutcome, VoiceError> {
        let recognizer = self
            .recognizer
            .as_ref()
            .ok_or(VoiceError::CapabilityUnavailable(CAPTURE_UNAVAILABLE_NOTICE))?;

        if self.listening.load(Ordering::Acquire) {
            recognizer.stop().await;
            self.listening.store(false, Ordering::Release);
            tracing::debug!("voice capture stopped");
            return Ok(ToggleOutcome::Stopped);
        }

        let events = recognizer.start().await?;
        self.listening.store(true, Ordering::Release);
        tracing::debug!("🎙️ voice capture started");

        let listening = self.listening.clone();
        let handle = tokio::spawn(async move {
            let event = events.await.unwrap_or(RecognitionEvent::EndedWithoutResult);
            listening.store(false, Ordering::Release);

            match event {
                RecognitionEvent::Transcript(transcript) => {
                    match session.submit(&transcript).await {
                        Ok(reply) => Some(reply),
                        Err(e) => {
                            tracing::warn!("voice transcript not submitted: {}", e);
                            None
                        }
                    }
                }
                RecognitionEvent::EndedWithoutResult => {
                    tracing::debug!("voice capture ended without a result");
                    None
                }
            }
        });

        Ok(ToggleOutcome::Started(handle))
    }
}
