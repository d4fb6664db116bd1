//! Audio capture and playback, bridging hardware callback threads into
//! the cooperative scheduler.
//!
//! The hardware side of each stream runs on its own real-time thread and
//! communicates with the scheduler exclusively through the bounded
//! drop-oldest [`handoff`] queue. Each direction holds its device
//! exclusively for the duration of one call; a second concurrent capture
//! or playback is rejected rather than queued.

pub mod capture;
pub mod handoff;
pub mod playback;

pub use capture::{AudioCapture, list_input_devices};
pub use playback::{AudioPlayback, list_output_devices};

use crate::config::AudioConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::messages::Utterance;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Facade over capture and playback with exclusive device ownership.
pub struct AudioBridge {
    config: AudioConfig,
    capture_busy: Arc<AtomicBool>,
    playback_busy: Arc<AtomicBool>,
}

impl AudioBridge {
    /// Create a bridge for the configured devices. Devices are resolved
    /// per call, so a bridge can outlive device hot-plugs.
    pub fn new(config: AudioConfig) -> Self {
        Self {
            config,
            capture_busy: Arc::new(AtomicBool::new(false)),
            playback_busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Record one utterance using the configured window.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Device`] when the input device is
    /// unavailable, fails mid-capture, or a capture is already active.
    pub async fn capture(&self, cancel: &CancellationToken) -> Result<Utterance> {
        let _guard = DeviceGuard::acquire(&self.capture_busy, "capture")?;
        let capture = AudioCapture::new(&self.config)?;
        let window = Duration::from_secs_f32(self.config.record_window_secs.max(0.1));
        let utterance = capture.record(window, cancel).await?;
        if let Some(ref dir) = self.config.dump_dir {
            capture::dump_wav(&utterance, dir);
        }
        Ok(utterance)
    }

    /// Play a mono sample buffer to completion or cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Device`] when the output device is
    /// unavailable, fails mid-playback, or a playback is already active.
    pub async fn play(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _guard = DeviceGuard::acquire(&self.playback_busy, "playback")?;
        let playback = AudioPlayback::new(&self.config)?;
        playback.play(samples, sample_rate, cancel).await
    }
}

/// RAII claim on one direction of the audio device. Released on drop, so
/// every exit path (success, cancellation, error) frees the device.
struct DeviceGuard {
    flag: Arc<AtomicBool>,
}

impl DeviceGuard {
    fn acquire(flag: &Arc<AtomicBool>, what: &str) -> Result<Self> {
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PipelineError::Device(format!("{what} already active")));
        }
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_until_release() {
        let flag = Arc::new(AtomicBool::new(false));
        let guard = DeviceGuard::acquire(&flag, "capture").expect("first acquire");
        assert!(DeviceGuard::acquire(&flag, "capture").is_err());
        drop(guard);
        assert!(DeviceGuard::acquire(&flag, "capture").is_ok());
    }
}
