//! Speech-to-text transcription.
//!
//! The [`SpeechToText`] trait is the seam between the pipeline and any
//! transcription engine; [`ParakeetStt`] is the shipped implementation
//! using NVIDIA Parakeet TDT via `parakeet-rs`.

use crate::config::{ModelConfig, SttConfig};
use crate::error::{PipelineError, Result};
use crate::models::ModelManager;
use crate::pipeline::messages::{Transcript, Utterance};
use parakeet_rs::{ParakeetTDT, TimestampMode, Transcriber};
use std::time::Instant;
use tracing::info;

/// A synchronous audio-to-text engine with no scheduler awareness.
///
/// Implementations are CPU/accelerator-bound and must be driven from a
/// dedicated worker thread (see [`crate::worker::InferenceWorker`]).
pub trait SpeechToText: Send {
    /// Convert one utterance to text.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine itself fails; callers translate
    /// this into a failed [`Transcript`] rather than aborting the session.
    fn transcribe(&mut self, utterance: &Utterance) -> Result<Transcript>;
}

/// Speech-to-text engine using Parakeet TDT (multilingual).
pub struct ParakeetStt {
    model: Option<ParakeetTDT>,
    model_id: String,
    model_manager: ModelManager,
}

impl ParakeetStt {
    /// Create a new STT engine instance.
    ///
    /// The model is loaded lazily on first use via [`ModelManager`].
    ///
    /// # Errors
    ///
    /// Returns an error if the model cache cannot be initialised.
    pub fn new(config: &SttConfig, model_config: &ModelConfig) -> Result<Self> {
        let model_manager = ModelManager::new(model_config)?;
        info!("STT configured with model: {}", config.model_id);

        Ok(Self {
            model: None,
            model_id: config.model_id.clone(),
            model_manager,
        })
    }

    /// Eagerly load the model so the first turn does not pay the load cost.
    ///
    /// # Errors
    ///
    /// Returns an error if model download or loading fails.
    pub fn ensure_loaded(&mut self) -> Result<()> {
        if self.model.is_none() {
            self.initialize()?;
        }
        Ok(())
    }

    fn initialize(&mut self) -> Result<()> {
        info!("loading STT model: {}", self.model_id);

        // ParakeetTDT::from_pretrained expects a directory with all files.
        let repo_dir = self.model_manager.get_repo_dir(&self.model_id)?;

        let model = ParakeetTDT::from_pretrained(&repo_dir, None)
            .map_err(|e| PipelineError::Transcription(format!("failed to load Parakeet TDT: {e}")))?;

        info!("STT model loaded");
        self.model = Some(model);
        Ok(())
    }
}

impl SpeechToText for ParakeetStt {
    fn transcribe(&mut self, utterance: &Utterance) -> Result<Transcript> {
        if self.model.is_none() {
            self.initialize()?;
        }

        let started = Instant::now();
        let samples = utterance.samples();
        info!(
            "transcribing {:.1}s audio ({} blocks, {} dropped)",
            utterance.duration_secs(),
            utterance.blocks.len(),
            utterance.dropped_blocks
        );

        let model = self
            .model
            .as_mut()
            .ok_or_else(|| PipelineError::Transcription("model not initialized".into()))?;

        let result = model
            .transcribe_samples(
                samples,
                utterance.sample_rate,
                1, // mono
                Some(TimestampMode::Sentences),
            )
            .map_err(|e| PipelineError::Transcription(format!("transcription failed: {e}")))?;

        info!(
            "transcribed in {:.0}ms: \"{}\"",
            started.elapsed().as_millis(),
            result.text
        );

        Ok(Transcript::from_text(result.text))
    }
}
