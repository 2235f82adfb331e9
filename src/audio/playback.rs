//! Shared audio output
//!
//! The output context is acquired lazily on first playback and kept for the
//! lifetime of the process. It is never released explicitly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::{decode_speech, AudioBuffer, AudioError, SAMPLE_RATE};

/// An audio sink that can schedule decoded buffers for immediate playback
#[async_trait]
pub trait OutputContext: Send + Sync {
    /// Whether the sink is paused and must be resumed before use
    fn is_suspended(&self) -> bool;

    async fn resume(&self) -> Result<(), AudioError>;

    /// Schedule `buffer` to start playing now
    fn play(&self, buffer: AudioBuffer) -> Result<(), AudioError>;
}

type ContextFactory =
    Box<dyn Fn(u32) -> Result<Arc<dyn OutputContext>, AudioError> + Send + Sync>;

/// Plays speech payloads through a single shared output context
pub struct AudioPlayer {
    sample_rate: u32,
    factory: ContextFactory,
    context: OnceCell<Arc<dyn OutputContext>>,
}

impl AudioPlayer {
    /// Create a player whose context is built by `factory` on first use
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(u32) -> Result<Arc<dyn OutputContext>, AudioError> + Send + Sync + 'static,
    {
        Self {
            sample_rate: SAMPLE_RATE,
            factory: Box::new(factory),
            context: OnceCell::new(),
        }
    }

    /// A player that decodes and logs but produces no sound
    pub fn silent() -> Self {
        Self::new(|rate| Ok(Arc::new(SilentOutput::new(rate)) as Arc<dyn OutputContext>))
    }

    /// A player bound to the default output device
    #[cfg(feature = "playback")]
    pub fn device() -> Self {
        Self::new(|rate| {
            super::DeviceOutput::open(rate).map(|out| Arc::new(out) as Arc<dyn OutputContext>)
        })
    }

    async fn context(&self) -> Result<&Arc<dyn OutputContext>, AudioError> {
        self.context
            .get_or_try_init(|| async {
                tracing::info!(sample_rate = self.sample_rate, "acquiring audio output");
                (self.factory)(self.sample_rate)
            })
            .await
    }

    /// Decode and play a base64 PCM16 payload
    ///
    /// Failures are logged and the playback skipped. Returns whether the
    /// buffer was scheduled.
    pub async fn play(&self, payload: &str) -> bool {
        match self.try_play(payload).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("skipping speech playback: {}", e);
                false
            }
        }
    }

    async fn try_play(&self, payload: &str) -> Result<(), AudioError> {
        let buffer = decode_speech(payload)?;

        let context = self.context().await?;
        if context.is_suspended() {
            context.resume().await?;
        }

        tracing::debug!(
            frames = buffer.frames(),
            secs = buffer.duration_secs(),
            "scheduling speech playback"
        );
        context.play(buffer)
    }
}

/// Output context without a device
///
/// Starts suspended, like a freshly created browser audio context, and only
/// logs what it would play.
#[derive(Debug)]
pub struct SilentOutput {
    sample_rate: u32,
    suspended: AtomicBool,
}

impl SilentOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            suspended: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl OutputContext for SilentOutput {
    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    async fn resume(&self) -> Result<(), AudioError> {
        self.suspended.store(false, Ordering::Release);
        Ok(())
    }

    fn play(&self, buffer: AudioBuffer) -> Result<(), AudioError> {
        if buffer.sample_rate != self.sample_rate {
            tracing::debug!(
                expected = self.sample_rate,
                actual = buffer.sample_rate,
                "sample rate mismatch"
            );
        }
        tracing::info!("🔊 speech ready ({:.2}s)", buffer.duration_secs());
        Ok(())
    }
}
