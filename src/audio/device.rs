//! Output context backed by the default audio device

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, unbounded, Sender};

use super::playback::OutputContext;
use super::{AudioBuffer, AudioError};

enum Command {
    Resume,
}

/// Mono output stream on the default device
///
/// `cpal::Stream` is not `Send` on every platform, so the stream lives on a
/// dedicated thread for the rest of the process and is driven through a
/// command channel. Scheduled samples go through a shared queue that the
/// device callback drains.
pub struct DeviceOutput {
    queue: Arc<Mutex<VecDeque<f32>>>,
    suspended: AtomicBool,
    commands: Sender<Command>,
}

impl DeviceOutput {
    pub fn open(sample_rate: u32) -> Result<Self, AudioError> {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let (commands, command_rx) = unbounded::<Command>();
        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);

        let shared = queue.clone();
        thread::Builder::new()
            .name("lexy-audio".into())
            .spawn(move || {
                let stream = match build_stream(sample_rate, shared) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                for command in command_rx.iter() {
                    match command {
                        Command::Resume => {
                            if let Err(e) = stream.play() {
                                tracing::warn!("failed to resume audio stream: {}", e);
                            }
                        }
                    }
                }
            })
            .map_err(|e| AudioError::Output(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|e| AudioError::Output(e.to_string()))?
            .map_err(AudioError::Output)?;

        Ok(Self {
            queue,
            suspended: AtomicBool::new(true),
            commands,
        })
    }
}

fn build_stream(
    sample_rate: u32,
    queue: Arc<Mutex<VecDeque<f32>>>,
) -> Result<cpal::Stream, String> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| "no default output device".to_string())?;

    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut queue = match queue.lock() {
                    Ok(q) => q,
                    Err(poisoned) => poisoned.into_inner(),
                };
                for sample in data.iter_mut() {
                    *sample = queue.pop_front().unwrap_or(0.0);
                }
            },
            |err| tracing::warn!("audio stream error: {}", err),
            None,
        )
        .map_err(|e| e.to_string())?;

    // Start paused; the first playback resumes it
    stream.pause().map_err(|e| e.to_string())?;
    Ok(stream)
}

#[async_trait]
impl OutputContext for DeviceOutput {
    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    async fn resume(&self) -> Result<(), AudioError> {
        self.commands
            .send(Command::Resume)
            .map_err(|_| AudioError::Output("audio thread has exited".into()))?;
        self.suspended.store(false, Ordering::Release);
        Ok(())
    }

    fn play(&self, buffer: AudioBuffer) -> Result<(), AudioError> {
        let Some(samples) = buffer.channels.into_iter().next() else {
            return Ok(());
        };
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| AudioError::Output("audio queue poisoned".into()))?;
        queue.extend(samples);
        Ok(())
    }
}
