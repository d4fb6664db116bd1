//! Kokoro-82M ONNX inference engine.

use super::phonemize::Phonemizer;
use crate::config::TtsConfig;
use crate::error::{PipelineError, Result};
use crate::models::ModelManager;
use crate::tts::TextToSpeech;
use ort::session::Session;
use ort::value::Tensor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// HuggingFace repo holding the Kokoro-82M ONNX export.
const KOKORO_REPO_ID: &str = "onnx-community/Kokoro-82M-v1.0-ONNX";

/// Maximum context length for Kokoro (including pad tokens).
const MAX_CONTEXT: usize = 512;

/// Output sample rate in Hz.
const SAMPLE_RATE: u32 = 24_000;

/// Kokoro TTS engine.
///
/// Wraps a single ONNX session, the tokenizer, phonemizer, and a voice
/// style embedding.
pub struct KokoroTts {
    session: Session,
    tokenizer: tokenizers::Tokenizer,
    phonemizer: Phonemizer,
    /// Raw voice style tensor, shape `(N, 1, 256)` stored flat; indexed
    /// by token count to select the context-appropriate 256-dim slice.
    voice_styles: Vec<f32>,
    speed: f32,
}

impl KokoroTts {
    /// Load the Kokoro engine, downloading assets on first use (cached
    /// via hf-hub under the configured model cache).
    ///
    /// # Errors
    ///
    /// Returns an error if download, model loading, or phonemizer init
    /// fails.
    pub fn new(config: &TtsConfig, models: &ModelManager) -> Result<Self> {
        let model_file = model_filename(&config.model_variant);
        let model_onnx = models.get_model_path(KOKORO_REPO_ID, model_file)?;
        let tokenizer_json = models.get_model_path(KOKORO_REPO_ID, "tokenizer.json")?;
        let voice_bin = resolve_voice_path(&config.voice, models)?;

        info!("loading Kokoro ONNX model");
        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(4))
            .and_then(|b| b.commit_from_file(&model_onnx))
            .map_err(|e| PipelineError::Synthesis(format!("failed to load Kokoro model: {e}")))?;

        let tokenizer = load_tokenizer(&tokenizer_json)?;

        let british = config.voice.starts_with("bf_") || config.voice.starts_with("bm_");
        let phonemizer = Phonemizer::new(british);

        let voice_styles = load_voice_styles(&voice_bin)?;
        let speed = config.speed.clamp(0.5, 2.0);

        info!(
            "Kokoro TTS ready (voice={}, variant={})",
            config.voice, config.model_variant
        );

        Ok(Self {
            session,
            tokenizer,
            phonemizer,
            voice_styles,
            speed,
        })
    }

    fn run_inference(&mut self, token_ids: &[i64], style: &[f32], speed: f32) -> Result<Vec<f32>> {
        use ort::session::{SessionInputValue, SessionInputs};

        let seq_len = token_ids.len();

        let input_ids = Tensor::from_array(([1_usize, seq_len], token_ids.to_vec()))
            .map_err(|e| PipelineError::Synthesis(format!("failed to create input_ids: {e}")))?;
        let style_tensor = Tensor::from_array(([1_usize, 256], style.to_vec()))
            .map_err(|e| PipelineError::Synthesis(format!("failed to create style: {e}")))?;
        let speed_tensor = Tensor::from_array(([1_usize], vec![speed]))
            .map_err(|e| PipelineError::Synthesis(format!("failed to create speed: {e}")))?;

        let mut feed: HashMap<String, SessionInputValue> = HashMap::new();
        feed.insert("input_ids".to_string(), input_ids.into());
        feed.insert("style".to_string(), style_tensor.into());
        feed.insert("speed".to_string(), speed_tensor.into());

        let outputs = self
            .session
            .run(SessionInputs::from(feed))
            .map_err(|e| PipelineError::Synthesis(format!("ONNX inference failed: {e}")))?;

        // Output: shape [1, num_samples]
        let output_value = &outputs[0_usize];
        let (_shape, data) = output_value
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Synthesis(format!("failed to extract output: {e}")))?;

        Ok(data.to_vec())
    }
}

impl TextToSpeech for KokoroTts {
    fn synthesize(&mut self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let start = std::time::Instant::now();

        let ipa = self.phonemizer.phonemize(text)?;
        if ipa.is_empty() {
            return Ok(Vec::new());
        }

        // The post-processor was stripped from the tokenizer (v0.22
        // compat), so pad tokens (id 0) are wrapped manually.
        let encoding = self
            .tokenizer
            .encode(ipa.as_str(), false)
            .map_err(|e| PipelineError::Synthesis(format!("tokenization failed: {e}")))?;

        let raw_ids = encoding.get_ids();
        let mut token_ids: Vec<i64> = Vec::with_capacity(raw_ids.len() + 2);
        token_ids.push(0);
        token_ids.extend(raw_ids.iter().map(|&id| i64::from(id)));
        token_ids.push(0);

        if token_ids.len() > MAX_CONTEXT {
            return Err(PipelineError::Synthesis(format!(
                "input too long: {} tokens (max {})",
                token_ids.len(),
                MAX_CONTEXT,
            )));
        }

        // Voice style vector is selected by content token count.
        let content_len = token_ids.len().saturating_sub(2).max(1);
        let num_entries = self.voice_styles.len() / 256;
        let style_index = content_len.min(num_entries.saturating_sub(1));
        let style_offset = style_index * 256;
        let style_vec: Vec<f32> = self.voice_styles[style_offset..style_offset + 256].to_vec();

        let speed = self.speed;
        let samples = self.run_inference(&token_ids, &style_vec, speed)?;

        debug!(
            "synthesized {} samples ({:.1}s audio) in {:.0}ms",
            samples.len(),
            samples.len() as f32 / SAMPLE_RATE as f32,
            start.elapsed().as_millis(),
        );

        Ok(samples)
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}

/// Map a variant name to the ONNX filename inside the `onnx/` subfolder.
fn model_filename(variant: &str) -> &'static str {
    match variant {
        "fp32" => "onnx/model.onnx",
        "fp16" => "onnx/model_fp16.onnx",
        "q8" | "quantized" => "onnx/model_quantized.onnx",
        "q8f16" => "onnx/model_q8f16.onnx",
        "q4" => "onnx/model_q4.onnx",
        "q4f16" => "onnx/model_q4f16.onnx",
        _ => {
            info!("unknown model variant '{variant}', falling back to q8");
            "onnx/model_quantized.onnx"
        }
    }
}

/// Resolve a voice name to a style file, downloading built-in voices
/// from the `voices/` subfolder; absolute `.bin` paths are used as-is.
fn resolve_voice_path(voice: &str, models: &ModelManager) -> Result<PathBuf> {
    let path = Path::new(voice);
    if path.is_absolute() && path.extension().is_some_and(|ext| ext == "bin") {
        return Ok(path.to_path_buf());
    }
    models.get_model_path(KOKORO_REPO_ID, &format!("voices/{voice}.bin"))
}

/// Load and patch the Kokoro tokenizer.
///
/// The `tokenizers` crate v0.22 cannot deserialize the
/// `TemplateProcessing` post-processor in Kokoro's `tokenizer.json`; it
/// is stripped and pad-token insertion handled in `synthesize`.
fn load_tokenizer(path: &Path) -> Result<tokenizers::Tokenizer> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::Synthesis(format!("failed to read tokenizer {}: {e}", path.display()))
    })?;

    let mut json: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| PipelineError::Synthesis(format!("failed to parse tokenizer JSON: {e}")))?;

    if let Some(obj) = json.as_object_mut() {
        obj.remove("post_processor");

        if let Some(model) = obj.get_mut("model").and_then(|m| m.as_object_mut()) {
            if !model.contains_key("type") {
                model.insert(
                    "type".to_string(),
                    serde_json::Value::String("WordLevel".to_string()),
                );
            }
            // WordLevel requires an unk_token field.
            if !model.contains_key("unk_token") {
                model.insert(
                    "unk_token".to_string(),
                    serde_json::Value::String("$".to_string()),
                );
            }
        }
    }

    let patched = serde_json::to_string(&json)
        .map_err(|e| PipelineError::Synthesis(format!("failed to re-serialize tokenizer: {e}")))?;

    tokenizers::Tokenizer::from_bytes(patched)
        .map_err(|e| PipelineError::Synthesis(format!("failed to load tokenizer: {e}")))
}

/// Load a voice style `.bin` file as a flat f32 vector.
///
/// The file holds raw little-endian f32 values with shape `(N, 1, 256)`.
fn load_voice_styles(path: &Path) -> Result<Vec<f32>> {
    let bytes = std::fs::read(path).map_err(|e| {
        PipelineError::Synthesis(format!("failed to read voice file {}: {e}", path.display()))
    })?;

    if bytes.len() % 4 != 0 {
        return Err(PipelineError::Synthesis(format!(
            "voice file size {} is not a multiple of 4 (expected f32 array)",
            bytes.len()
        )));
    }

    let float_count = bytes.len() / 4;
    if float_count % 256 != 0 {
        return Err(PipelineError::Synthesis(format!(
            "voice file has {float_count} floats, not a multiple of 256"
        )));
    }

    let mut floats = vec![0.0f32; float_count];
    for (i, chunk) in bytes.chunks_exact(4).enumerate() {
        floats[i] = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    debug!("loaded voice style: {} entries of 256 dims", float_count / 256);

    Ok(floats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_variants_map_to_onnx_files() {
        assert_eq!(model_filename("fp32"), "onnx/model.onnx");
        assert_eq!(model_filename("q8"), "onnx/model_quantized.onnx");
        assert_eq!(model_filename("q4f16"), "onnx/model_q4f16.onnx");
    }

    #[test]
    fn unknown_variant_falls_back_to_quantized() {
        assert_eq!(model_filename("bogus"), "onnx/model_quantized.onnx");
    }
}
