//! Misaki G2P (grapheme-to-phoneme) wrapper for Kokoro.
//!
//! Converts English text to phoneme strings for Kokoro's character-level
//! tokenizer, after a normalization pass that fixes smart punctuation
//! and strips markdown artifacts the LLM tends to emit.

use crate::error::{PipelineError, Result};

/// Thin wrapper around `misaki-rs` G2P.
pub struct Phonemizer {
    g2p: misaki_rs::G2P,
}

impl Phonemizer {
    /// Create a new phonemizer. `british` selects British English
    /// pronunciation, American otherwise.
    pub fn new(british: bool) -> Self {
        let lang = if british {
            misaki_rs::Language::EnglishGB
        } else {
            misaki_rs::Language::EnglishUS
        };
        Self {
            g2p: misaki_rs::G2P::new(lang),
        }
    }

    /// Convert text to a phoneme string suitable for Kokoro's tokenizer.
    ///
    /// # Errors
    ///
    /// Returns an error if phonemization fails or produces no output.
    pub fn phonemize(&self, text: &str) -> Result<String> {
        let normalized = normalize_text(text);
        let (phonemes, _tokens) = self
            .g2p
            .g2p(&normalized)
            .map_err(|e| PipelineError::Synthesis(format!("phonemization failed: {e}")))?;
        if phonemes.is_empty() {
            return Err(PipelineError::Synthesis(
                "phonemization produced empty output".into(),
            ));
        }
        Ok(phonemes)
    }
}

/// Normalize text for pronunciation: smart quotes/dashes to ASCII, then
/// strip markdown emphasis and heading markers.
pub(crate) fn normalize_text(text: &str) -> String {
    let text = text
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2014}', '\u{2013}'], " - ");
    strip_markdown(&text)
}

fn strip_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim_start();
        let line_content = if trimmed.starts_with('#') {
            trimmed.trim_start_matches('#').trim_start()
        } else {
            line
        };
        for ch in line_content.chars() {
            if ch != '*' && ch != '`' {
                result.push(ch);
            }
        }
        result.push('\n');
    }
    if result.ends_with('\n') {
        result.pop();
    }
    result
}
