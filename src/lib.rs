//! Selkie: voice and text conversational AI pipeline.
//!
//! One conversational turn flows through a cascade of stages:
//! Microphone → STT → memory recall → streamed LLM generation → memory
//! store → TTS → Speaker, with the text path joining at the recall
//! stage.
//!
//! # Architecture
//!
//! - **Audio bridge**: records and plays via `cpal`, handing blocks
//!   between the hardware threads and the scheduler through a bounded
//!   drop-oldest queue
//! - **STT**: transcribes utterances using NVIDIA Parakeet on a worker
//!   thread
//! - **Memory**: recalls and stores records against a remote service,
//!   scoped to the active character's namespace
//! - **LLM**: streams replies fragment-by-fragment from an
//!   Ollama-compatible endpoint
//! - **TTS**: synthesizes replies using Kokoro-82M (ONNX)
//! - **Coordinator**: the cancellable state machine sequencing one turn
//!   and reporting progress to the presentation layer

pub mod audio;
pub mod character;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod memory;
pub mod models;
pub mod pipeline;
pub mod stt;
pub mod tts;
pub mod worker;

pub use character::{Character, CharacterLibrary};
pub use config::AppConfig;
pub use error::{PipelineError, Result};
pub use pipeline::coordinator::{
    InteractionCoordinator, TurnController, TurnEvent, TurnOutcome, TurnPhase,
};
