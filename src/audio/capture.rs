//! Microphone capture using cpal.
//!
//! Captures at the device's native sample rate, downsamples to the
//! configured pipeline rate, and slices the callback output into
//! fixed-size sequence-numbered blocks handed to the scheduler through
//! the drop-oldest handoff queue.

use crate::audio::handoff::{self, HandoffReceiver};
use crate::config::AudioConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::messages::{AudioBlock, Utterance};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Audio capture from the system microphone.
pub struct AudioCapture {
    device: cpal::Device,
    stream_config: StreamConfig,
    /// Target sample rate for the pipeline (e.g. 16 kHz).
    target_sample_rate: u32,
    /// Samples per emitted block.
    block_size: usize,
    handoff_depth: usize,
}

impl AudioCapture {
    /// Resolve the input device and its native stream configuration.
    ///
    /// Uses the device's default configuration for maximum compatibility
    /// and downsamples to the target rate in software.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Device`] if no usable input device exists.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.input_device {
            host.input_devices()
                .map_err(|e| PipelineError::Device(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| PipelineError::Device(format!("input device '{name}' not found")))?
        } else {
            host.default_input_device()
                .ok_or_else(|| PipelineError::Device("no default input device".into()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using input device: {device_name}");

        let default_config = device
            .default_input_config()
            .map_err(|e| PipelineError::Device(format!("no default input config: {e}")))?;

        let native_rate = default_config.sample_rate();
        let native_channels = default_config.channels();

        let stream_config = StreamConfig {
            channels: native_channels,
            sample_rate: native_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        if native_rate != config.input_sample_rate {
            info!(
                "will downsample from {}Hz to {}Hz",
                native_rate, config.input_sample_rate
            );
        }

        Ok(Self {
            device,
            stream_config,
            target_sample_rate: config.input_sample_rate,
            block_size: (config.block_size as usize).max(1),
            handoff_depth: config.handoff_depth,
        })
    }

    /// Record one utterance.
    ///
    /// The recording window ends when `window` elapses or `cancel` fires;
    /// either way the blocks produced so far are returned in capture order.
    /// A hardware stream error ends the window with
    /// [`PipelineError::Device`] instead.
    ///
    /// The hardware callback only ever pushes into the handoff queue; it
    /// never waits on the scheduler. The device is released on every exit
    /// path when the stream is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the input stream cannot be created or fails
    /// mid-capture.
    pub async fn record(
        &self,
        window: Duration,
        cancel: &CancellationToken,
    ) -> Result<Utterance> {
        let native_rate = self.stream_config.sample_rate;
        let native_channels = self.stream_config.channels;
        let target_rate = self.target_sample_rate;
        let block_size = self.block_size;

        let (tx, mut rx) = handoff::bounded::<AudioBlock>(self.handoff_depth);
        let error_slot: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let error_slot_cb = Arc::clone(&error_slot);

        // State owned by the data callback: pending samples not yet sliced
        // into a full block, and the next sequence number.
        let mut pending: Vec<f32> = Vec::with_capacity(block_size * 2);
        let mut next_seq: u64 = 0;

        let stream = self
            .device
            .build_input_stream(
                &self.stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = if native_channels > 1 {
                        to_mono(data, native_channels)
                    } else {
                        data.to_vec()
                    };
                    let samples = if native_rate != target_rate {
                        downsample(&mono, native_rate, target_rate)
                    } else {
                        mono
                    };

                    pending.extend_from_slice(&samples);
                    while pending.len() >= block_size {
                        let rest = pending.split_off(block_size);
                        let block_samples = std::mem::replace(&mut pending, rest);
                        let evicted = tx.push(AudioBlock {
                            samples: block_samples,
                            sample_rate: target_rate,
                            channels: 1,
                            seq: next_seq,
                        });
                        next_seq += 1;
                        if evicted {
                            debug!("capture handoff full, dropped oldest block");
                        }
                    }
                },
                move |err| {
                    let mut slot = error_slot_cb
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    if slot.is_none() {
                        *slot = Some(err.to_string());
                    }
                },
                None,
            )
            .map_err(|e| PipelineError::Device(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| PipelineError::Device(format!("failed to start input stream: {e}")))?;

        debug!(
            "capture started: native {}Hz -> target {}Hz, {} samples/block",
            native_rate, target_rate, block_size
        );

        let utterance =
            collect_utterance(&mut rx, target_rate, window, cancel, &error_slot).await;

        drop(stream);
        if let Ok(ref u) = utterance {
            info!(
                "capture finished: {} blocks, {:.1}s, {} dropped",
                u.blocks.len(),
                u.duration_secs(),
                u.dropped_blocks
            );
        }
        utterance
    }
}

/// Assemble blocks from the handoff queue into an utterance.
///
/// Ends when the window elapses, the sender closes, or `cancel` fires;
/// blocks already produced are drained so cancellation yields exactly the
/// capture so far. A hardware error reported through `error_slot` is
/// terminal.
pub(crate) async fn collect_utterance(
    rx: &mut HandoffReceiver<AudioBlock>,
    sample_rate: u32,
    window: Duration,
    cancel: &CancellationToken,
    error_slot: &Arc<Mutex<Option<String>>>,
) -> Result<Utterance> {
    let started_at = Instant::now();
    let deadline = tokio::time::Instant::now() + window;
    let mut health = tokio::time::interval(Duration::from_millis(100));
    let mut blocks = Vec::new();

    loop {
        tokio::select! {
            block = rx.recv() => match block {
                Some(block) => blocks.push(block),
                None => break,
            },
            _ = tokio::time::sleep_until(deadline) => break,
            _ = cancel.cancelled() => {
                debug!("capture cancelled after {} blocks", blocks.len());
                break;
            }
            _ = health.tick() => {
                let failed = error_slot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(message) = failed {
                    warn!("input stream error: {message}");
                    return Err(PipelineError::Device(message));
                }
            }
        }
    }

    // Drain blocks that were produced before the window closed.
    while let Some(block) = rx.try_recv() {
        blocks.push(block);
    }

    Ok(Utterance {
        blocks,
        sample_rate,
        started_at,
        dropped_blocks: rx.dropped(),
    })
}

/// List available input devices.
///
/// # Errors
///
/// Returns an error if devices cannot be enumerated.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| PipelineError::Device(format!("cannot enumerate devices: {e}")))?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(desc) = device.description() {
            names.push(desc.name().to_owned());
        }
    }
    Ok(names)
}

/// Write an utterance to `dir` as a 16-bit WAV file, named by its start
/// time. Debugging aid; failures are logged, never propagated.
pub fn dump_wav(utterance: &Utterance, dir: &std::path::Path) {
    if let Err(e) = try_dump_wav(utterance, dir) {
        warn!("failed to dump utterance WAV: {e}");
    }
}

fn try_dump_wav(utterance: &Utterance, dir: &std::path::Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let name = format!(
        "utterance-{}.wav",
        chrono::Utc::now().format("%Y%m%d-%H%M%S%.3f")
    );
    let path = dir.join(name);

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: utterance.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)
        .map_err(|e| PipelineError::Device(format!("cannot create {}: {e}", path.display())))?;
    for sample in utterance.samples() {
        let clamped = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer
            .write_sample(clamped)
            .map_err(|e| PipelineError::Device(format!("WAV write failed: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| PipelineError::Device(format!("WAV finalize failed: {e}")))?;
    debug!("dumped utterance to {}", path.display());
    Ok(())
}

/// Average interleaved multi-channel audio down to mono.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation downsampler.
///
/// Sufficient for speech (energy below 8 kHz), so no anti-alias filter.
fn downsample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(src_rate) / f64::from(dst_rate);
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            f64::from(samples[idx]) * (1.0 - frac) + f64::from(samples[idx + 1]) * frac
        } else {
            f64::from(samples[idx.min(samples.len() - 1)])
        };

        output.push(sample as f32);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::handoff;

    fn block(seq: u64, len: usize) -> AudioBlock {
        AudioBlock {
            samples: vec![0.01; len],
            sample_rate: 16_000,
            channels: 1,
            seq,
        }
    }

    fn fresh_error_slot() -> Arc<Mutex<Option<String>>> {
        Arc::new(Mutex::new(None))
    }

    #[tokio::test]
    async fn collects_all_blocks_in_sequence_order() {
        let (tx, mut rx) = handoff::bounded(64);
        let producer = std::thread::spawn(move || {
            for seq in 0..50u64 {
                tx.push(block(seq, 160));
                std::thread::sleep(Duration::from_millis(1));
            }
        });

        let cancel = CancellationToken::new();
        let utterance = collect_utterance(
            &mut rx,
            16_000,
            Duration::from_millis(500),
            &cancel,
            &fresh_error_slot(),
        )
        .await
        .expect("collect");
        producer.join().expect("producer thread");

        assert_eq!(utterance.blocks.len(), 50);
        let seqs: Vec<u64> = utterance.blocks.iter().map(|b| b.seq).collect();
        assert_eq!(seqs, (0..50).collect::<Vec<_>>());
        assert_eq!(utterance.dropped_blocks, 0);
    }

    #[tokio::test]
    async fn cancellation_yields_blocks_produced_so_far() {
        let (tx, mut rx) = handoff::bounded(64);
        for seq in 0..7u64 {
            tx.push(block(seq, 160));
        }

        let cancel = CancellationToken::new();
        cancel.cancel();
        let utterance = collect_utterance(
            &mut rx,
            16_000,
            Duration::from_secs(30),
            &cancel,
            &fresh_error_slot(),
        )
        .await
        .expect("collect");

        assert_eq!(utterance.blocks.len(), 7);
        let seqs: Vec<u64> = utterance.blocks.iter().map(|b| b.seq).collect();
        assert_eq!(seqs, (0..7).collect::<Vec<_>>());
        drop(tx);
    }

    #[tokio::test]
    async fn drops_show_up_as_sequence_gap_with_matching_count() {
        let (tx, mut rx) = handoff::bounded(4);
        for seq in 0..10u64 {
            tx.push(block(seq, 160));
        }
        drop(tx);

        let cancel = CancellationToken::new();
        let utterance = collect_utterance(
            &mut rx,
            16_000,
            Duration::from_millis(200),
            &cancel,
            &fresh_error_slot(),
        )
        .await
        .expect("collect");

        // Queue depth 4, 10 pushed: the oldest 6 were evicted.
        assert_eq!(utterance.dropped_blocks, 6);
        let seqs: Vec<u64> = utterance.blocks.iter().map(|b| b.seq).collect();
        assert_eq!(seqs, vec![6, 7, 8, 9]);
        let gap = seqs[0];
        assert_eq!(gap, utterance.dropped_blocks);
    }

    #[tokio::test]
    async fn hardware_error_is_terminal() {
        let (tx, mut rx) = handoff::bounded::<AudioBlock>(8);
        let slot = fresh_error_slot();
        *slot.lock().expect("slot") = Some("device unplugged".to_owned());

        let cancel = CancellationToken::new();
        let result = collect_utterance(
            &mut rx,
            16_000,
            Duration::from_secs(5),
            &cancel,
            &slot,
        )
        .await;

        match result {
            Err(PipelineError::Device(message)) => assert!(message.contains("unplugged")),
            other => panic!("expected device error, got {other:?}"),
        }
        drop(tx);
    }

    #[test]
    fn to_mono_averages_channels() {
        let stereo = [1.0, 0.0, 0.5, 0.5];
        assert_eq!(to_mono(&stereo, 2), vec![0.5, 0.5]);
    }

    #[test]
    fn downsample_halves_length_for_double_rate() {
        let samples = vec![0.0f32; 480];
        let out = downsample(&samples, 48_000, 16_000);
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn downsample_identity_at_same_rate() {
        let samples = vec![0.1f32, 0.2, 0.3];
        assert_eq!(downsample(&samples, 16_000, 16_000), samples);
    }
}
