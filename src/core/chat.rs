//! Session and response pipeline
//!
//! The Session owns everything one conversation needs: the message log, the
//! settings (including memory nodes), the live preview of the reply being
//! streamed and the capabilities used to produce it. Each user submission
//! runs one turn:
//! 1. Append the user message
//! 2. Stream the reply from the chat capability, updating the preview
//! 3. Optionally synthesize speech for the final text
//! 4. Append the assistant message and update the rolling memory
//!
//! Only one turn runs at a time. A submission made while a turn is in
//! flight is rejected, not queued. Once accepted, a turn runs on its own
//! task and always finishes, even if the submitter stops waiting for it.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};

use crate::audio::AudioPlayer;
use crate::config::PersonaTemplate;
use crate::conversation::{
    Citation, ConversationLog, Message, MessageIdGenerator, CONTEXT_WINDOW,
};
use crate::providers::{ChatCapability, ChatEvent, ChatRequest, ProviderError, SpeechSynthesizer};
use crate::settings::{Settings, SettingsChange, SettingsError, SettingsPatch, SettingsStore};

use super::memory;

/// Id of the assistant message appended when a turn fails
pub const FALLBACK_MESSAGE_ID: &str = "err";

/// Text of the assistant message appended when a turn fails
pub const FALLBACK_MESSAGE_TEXT: &str = "Neural link severed. Attempting reconnect.";

/// Where the current turn is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    #[default]
    Idle,
    Sending,
    StreamingText,
    SynthesizingAudio,
    Appended,
    Errored,
}

impl TurnPhase {
    /// Whether a turn is in flight and new input must be refused
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            TurnPhase::Sending | TurnPhase::StreamingText | TurnPhase::SynthesizingAudio
        )
    }
}

/// Live view of the turn in progress
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Preview {
    pub phase: TurnPhase,
    /// Latest cumulative snapshot of the reply; empty outside streaming
    pub text: String,
}

/// Errors returned to the submitter of a turn
///
/// Remote failures never surface here; they become the fallback message.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Message is empty")]
    EmptyInput,

    #[error("A reply is already in progress")]
    Busy,

    #[error("Turn aborted: {0}")]
    Aborted(#[from] tokio::task::JoinError),
}

/// Final output of a successful exchange with the remote capabilities
struct Reply {
    text: String,
    citations: Vec<Citation>,
    audio: Option<String>,
}

/// One conversation with Lexy
pub struct Session {
    chat: Arc<dyn ChatCapability>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    player: Arc<AudioPlayer>,
    persona: PersonaTemplate,
    store: Option<Arc<SettingsStore>>,
    ids: MessageIdGenerator,
    log: RwLock<ConversationLog>,
    settings: RwLock<Settings>,
    preview: watch::Sender<Preview>,
    turn: Arc<Mutex<()>>,
}

impl Session {
    /// Create a session around a chat capability and loaded settings
    pub fn new(chat: Arc<dyn ChatCapability>, settings: Settings) -> Self {
        let (preview, _) = watch::channel(Preview::default());
        Self {
            chat,
            speech: None,
            player: Arc::new(AudioPlayer::silent()),
            persona: PersonaTemplate::builtin(),
            store: None,
            ids: MessageIdGenerator::new(),
            log: RwLock::new(ConversationLog::new()),
            settings: RwLock::new(settings),
            preview,
            turn: Arc::new(Mutex::new(())),
        }
    }

    /// Enable speech synthesis when voice is switched on
    pub fn with_speech(mut self, speech: Arc<dyn SpeechSynthesizer>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn with_player(mut self, player: Arc<AudioPlayer>) -> Self {
        self.player = player;
        self
    }

    pub fn with_persona(mut self, persona: PersonaTemplate) -> Self {
        self.persona = persona;
        self
    }

    /// Persist every settings change to `store`
    pub fn with_store(mut self, store: Arc<SettingsStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Run one turn for `text`
    ///
    /// Returns the assistant message that was appended, which is the
    /// fallback message when the remote capabilities failed. Dropping the
    /// returned future does not cancel the turn.
    pub async fn submit(self: &Arc<Self>, text: &str) -> Result<Message, TurnError> {
        if text.trim().is_empty() {
            return Err(TurnError::EmptyInput);
        }
        let turn = self.turn.clone().try_lock_owned().map_err(|_| TurnError::Busy)?;

        let session = Arc::clone(self);
        let text = text.to_string();
        let task = tokio::spawn(async move {
            let _turn = turn;
            session.run_turn(&text).await
        });
        Ok(task.await?)
    }

    async fn run_turn(&self, text: &str) -> Message {
        self.set_phase(TurnPhase::Sending);
        let user = Message::user(self.ids.next_id(), text);
        let (window, turn) = {
            let mut log = self.log.write().await;
            log.append(user);
            (log.context_window(CONTEXT_WINDOW).to_vec(), log.user_turns())
        };
        let settings = self.settings.read().await.clone();

        tracing::info!(turn, context = window.len(), "💬 turn started");

        let reply = match self.exchange(window, &settings).await {
            Ok(reply) => {
                let audio = reply.audio.clone();
                let message = Message::assistant(self.ids.next_id(), reply.text)
                    .with_citations(reply.citations)
                    .with_audio(reply.audio);
                self.log.write().await.append(message.clone());
                self.set_phase(TurnPhase::Appended);

                self.update_memory(turn, text).await;
                if let Some(audio) = audio {
                    let player = self.player.clone();
                    tokio::spawn(async move {
                        player.play(&audio).await;
                    });
                }
                message
            }
            Err(e) => {
                tracing::error!("turn {} failed: {}", turn, e);
                self.set_phase(TurnPhase::Errored);
                let fallback =
                    Message::assistant(FALLBACK_MESSAGE_ID.to_string(), FALLBACK_MESSAGE_TEXT);
                self.log.write().await.append(fallback.clone());
                fallback
            }
        };

        self.preview.send_replace(Preview::default());
        reply
    }

    /// Steps 2 and 3 of a turn: stream the reply, then synthesize speech
    async fn exchange(
        &self,
        window: Vec<Message>,
        settings: &Settings,
    ) -> Result<Reply, ProviderError> {
        self.set_phase(TurnPhase::StreamingText);

        let directive = self
            .persona
            .system_directive(&settings.user_name, &settings.memory_nodes);
        let mut stream = self
            .chat
            .stream_chat(ChatRequest::new(window, directive))
            .await?;

        let mut text = String::new();
        let mut citations = None;
        while let Some(event) = stream.next().await {
            match event? {
                ChatEvent::Snapshot(snapshot) => {
                    text = snapshot;
                    self.preview.send_modify(|p| p.text.clone_from(&text));
                }
                ChatEvent::Completed { citations: sources } => {
                    citations = Some(sources);
                    break;
                }
            }
        }
        let citations = citations.ok_or_else(|| {
            ProviderError::InvalidResponse("stream ended before the reply completed".into())
        })?;

        let audio = if settings.voice_enabled {
            self.synthesize(&text).await
        } else {
            None
        };

        Ok(Reply {
            text,
            citations,
            audio,
        })
    }

    /// Speech for the final text; failures only cost the audio
    async fn synthesize(&self, text: &str) -> Option<String> {
        let speech = self.speech.as_ref()?;
        self.set_phase(TurnPhase::SynthesizingAudio);

        match speech.synthesize(text).await {
            Ok(Some(audio)) if !audio.is_empty() => Some(audio),
            Ok(_) => {
                tracing::warn!("speech synthesis returned no audio");
                None
            }
            Err(e) => {
                tracing::warn!("speech synthesis failed: {}", e);
                None
            }
        }
    }

    async fn update_memory(&self, turn: usize, user_message: &str) {
        let snapshot = {
            let mut settings = self.settings.write().await;
            if memory::record_turn(&mut settings.memory_nodes, turn, user_message).is_none() {
                return;
            }
            settings.clone()
        };
        self.persist(&snapshot).await;
    }

    async fn persist(&self, settings: &Settings) {
        if let Some(ref store) = self.store {
            if let Err(e) = store.save(settings).await {
                tracing::warn!("failed to persist settings: {}", e);
            }
        }
    }

    fn set_phase(&self, phase: TurnPhase) {
        tracing::debug!(?phase, "turn phase");
        self.preview.send_modify(|p| p.phase = phase);
    }

    /// Snapshot of the full message log
    pub async fn messages(&self) -> Vec<Message> {
        self.log.read().await.messages().to_vec()
    }

    pub fn preview(&self) -> Preview {
        self.preview.borrow().clone()
    }

    /// Receive every preview change
    pub fn subscribe(&self) -> watch::Receiver<Preview> {
        self.preview.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.preview.borrow().phase.is_busy()
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Apply a settings patch and persist the result
    ///
    /// The change only takes effect once it has been written.
    pub async fn update_settings(
        &self,
        patch: SettingsPatch,
    ) -> Result<(Settings, SettingsChange), SettingsError> {
        let mut settings = self.settings.write().await;
        let mut next = settings.clone();
        let change = next.apply(patch)?;
        if let Some(ref store) = self.store {
            store.save(&next).await?;
        }
        *settings = next.clone();
        Ok((next, change))
    }
}
