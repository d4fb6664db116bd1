//! Configuration types for the conversation pipeline.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Audio capture/playback settings.
    pub audio: AudioConfig,
    /// Speech-to-text settings.
    pub stt: SttConfig,
    /// Text-to-speech settings.
    pub tts: TtsConfig,
    /// Language model endpoint settings.
    pub llm: LlmConfig,
    /// Remote memory store settings.
    pub memory: MemoryConfig,
    /// Character library settings.
    pub characters: CharacterConfig,
    /// Model asset management settings.
    pub models: ModelConfig,
    /// Turn coordination settings.
    pub turn: TurnConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist. Environment variables `SELKIE_LLM_URL` and
    /// `SELKIE_MEMORY_URL` override the endpoint URLs either way.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)
                .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Default config file location: `<config_dir>/selkie/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("selkie")
            .join("config.toml")
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SELKIE_LLM_URL")
            && !url.is_empty()
        {
            self.llm.url = url;
        }
        if let Ok(url) = std::env::var("SELKIE_MEMORY_URL")
            && !url.is_empty()
        {
            self.memory.url = url;
        }
    }
}

/// Audio I/O configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz.
    pub input_sample_rate: u32,
    /// Playback sample rate in Hz.
    pub output_sample_rate: u32,
    /// Number of capture channels (1 = mono).
    pub input_channels: u16,
    /// Samples per capture block handed across the thread boundary.
    pub block_size: u32,
    /// Depth of the capture handoff queue in blocks. Overflow drops the
    /// oldest unconsumed block rather than blocking the audio thread.
    pub handoff_depth: usize,
    /// Recording window in seconds when no explicit stop is given.
    pub record_window_secs: f32,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
    /// When set, each captured utterance is also written as a WAV file
    /// into this directory.
    pub dump_dir: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            input_channels: 1,
            block_size: 1024,
            handoff_depth: 32,
            record_window_secs: 5.0,
            input_device: None,
            output_device: None,
            dump_dir: None,
        }
    }
}

/// Speech-to-text configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// HuggingFace model ID for the STT model.
    pub model_id: String,
    /// Timeout for a single transcription in seconds.
    pub timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            // The ONNX-converted repo — the original NVIDIA repo only has .nemo format.
            model_id: "istupakov/parakeet-tdt-0.6b-v3-onnx".to_owned(),
            timeout_secs: 30,
        }
    }
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Whether replies are spoken back after a turn completes.
    pub speak_replies: bool,
    /// Kokoro voice name (or absolute path to a custom `.bin` style file).
    pub voice: String,
    /// Kokoro model variant: fp32, fp16, q8, q8f16, q4, q4f16.
    pub model_variant: String,
    /// Speech speed multiplier (0.5–2.0).
    pub speed: f32,
    /// Timeout for a single synthesis call in seconds.
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            speak_replies: false,
            voice: "af_heart".to_owned(),
            model_variant: "q8".to_owned(),
            speed: 1.0,
            timeout_secs: 30,
        }
    }
}

/// Language model endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the generation endpoint.
    pub url: String,
    /// Model name to request.
    pub model: String,
    /// Maximum tokens to generate per reply.
    pub max_tokens: usize,
    /// Default sampling temperature when the character does not set one.
    pub temperature: f32,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Number of recent turns included in each prompt.
    pub history_window: usize,
    /// Global preamble prepended to every character's system prompt.
    pub global_system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            // Ollama default endpoint.
            url: "http://localhost:11434".to_owned(),
            model: "llama3.2:3b".to_owned(),
            max_tokens: 512,
            temperature: 0.7,
            connect_timeout_secs: 10,
            history_window: 5,
            global_system_prompt: "You are engaging in a conversation as a character \
with a distinct personality. While you can be helpful, you are meant to approximate \
talking with a real person with your own perspectives and manner of speaking. Never \
break character by saying you are an AI or language model."
                .to_owned(),
        }
    }
}

/// Remote memory store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Base URL of the memory service.
    pub url: String,
    /// Optional API key sent as a bearer token.
    pub api_key: Option<String>,
    /// Maximum records retrieved per recall.
    pub recall_limit: usize,
    /// Number of recalled excerpts included in the prompt context block.
    pub context_limit: usize,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_owned(),
            api_key: None,
            recall_limit: 5,
            context_limit: 3,
            request_timeout_secs: 10,
        }
    }
}

/// Character library configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    /// Directory containing character JSON files.
    pub dir: PathBuf,
    /// Character id selected at startup.
    pub default_character: String,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("selkie")
            .join("characters");
        Self {
            dir,
            default_character: "default".to_owned(),
        }
    }
}

/// Model asset management configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Cache directory for downloaded model files.
    pub cache_dir: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("selkie")
            .join("models");
        Self { cache_dir }
    }
}

/// Turn coordination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Upper bound on one generation stream in seconds. Expiry behaves
    /// like cancellation for the generating stage.
    pub generation_timeout_secs: u64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            generation_timeout_secs: 120,
        }
    }
}
