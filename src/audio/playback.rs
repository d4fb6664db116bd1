//! Audio playback to system speakers using cpal.
//!
//! The output callback pulls fixed-size chunks from the buffer it owns
//! and reports completion through the handoff queue; it never touches
//! scheduler-owned state directly.

use crate::audio::handoff;
use crate::config::AudioConfig;
use crate::error::{PipelineError, Result};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Audio playback to the system output device.
pub struct AudioPlayback {
    device: cpal::Device,
}

impl AudioPlayback {
    /// Resolve the output device.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Device`] if no usable output device exists.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.output_device {
            host.output_devices()
                .map_err(|e| PipelineError::Device(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    PipelineError::Device(format!("output device '{name}' not found"))
                })?
        } else {
            host.default_output_device()
                .ok_or_else(|| PipelineError::Device("no default output device".into()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using output device: {device_name}");

        Ok(Self { device })
    }

    /// Play a mono sample buffer to completion.
    ///
    /// Completes when the buffer is exhausted or `cancel` fires; the
    /// stream (and with it the device handle) is released on every exit
    /// path.
    ///
    /// # Errors
    ///
    /// Returns an error if the output stream cannot be created or fails
    /// mid-playback.
    pub async fn play(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let stream_config = StreamConfig {
            channels: 1,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        // Completion marker travels the same handoff discipline as capture
        // blocks; the callback never calls back into scheduler state.
        let (tx, mut rx) = handoff::bounded::<()>(2);
        let err_tx_shared = std::sync::Arc::new(std::sync::Mutex::new(None::<String>));
        let err_slot = std::sync::Arc::clone(&err_tx_shared);

        // Callback-owned state: the buffer, read position, and whether the
        // completion marker has been pushed.
        let mut position = 0usize;
        let mut signalled = false;

        let stream = self
            .device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    for out in data.iter_mut() {
                        if position < samples.len() {
                            *out = samples[position];
                            position += 1;
                        } else {
                            *out = 0.0;
                        }
                    }
                    if position >= samples.len() && !signalled {
                        signalled = true;
                        tx.push(());
                    }
                },
                move |err| {
                    let mut slot = err_slot
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    if slot.is_none() {
                        *slot = Some(err.to_string());
                    }
                },
                None,
            )
            .map_err(|e| PipelineError::Device(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| PipelineError::Device(format!("failed to start output stream: {e}")))?;

        let mut health = tokio::time::interval(std::time::Duration::from_millis(100));
        let outcome = loop {
            tokio::select! {
                _ = rx.recv() => break Ok(()),
                _ = cancel.cancelled() => {
                    debug!("playback cancelled");
                    break Ok(());
                }
                _ = health.tick() => {
                    let failed = err_tx_shared
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .take();
                    if let Some(message) = failed {
                        break Err(PipelineError::Device(message));
                    }
                }
            }
        };

        drop(stream);
        outcome
    }
}

/// List available output devices.
///
/// # Errors
///
/// Returns an error if devices cannot be enumerated.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| PipelineError::Device(format!("cannot enumerate devices: {e}")))?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(desc) = device.description() {
            names.push(desc.name().to_owned());
        }
    }
    Ok(names)
}
