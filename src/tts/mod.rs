//! Text-to-speech synthesis.
//!
//! The [`TextToSpeech`] trait is the seam between the pipeline and any
//! synthesis engine; [`KokoroTts`] is the shipped implementation
//! (Kokoro-82M ONNX with misaki G2P phonemization).

use crate::error::Result;

mod kokoro;

pub use kokoro::KokoroTts;

/// A synchronous text-to-audio engine with no scheduler awareness.
///
/// Implementations are CPU/accelerator-bound and must be driven from a
/// dedicated worker thread (see [`crate::worker::InferenceWorker`]).
pub trait TextToSpeech: Send {
    /// Synthesize text to mono f32 samples at [`Self::sample_rate`].
    ///
    /// # Errors
    ///
    /// Returns an error if synthesis fails.
    fn synthesize(&mut self, text: &str) -> Result<Vec<f32>>;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;
}
