//! Kokoro-82M TTS backend.
//!
//! Single ONNX model: phonemize → tokenize → inference → 24 kHz audio.
//! Voice selection via pre-trained style tensors (`.bin` files).

mod engine;
mod phonemize;

pub use engine::KokoroTts;
