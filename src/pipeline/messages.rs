//! Message types passed between pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// A block of audio samples captured by one hardware callback invocation.
///
/// Blocks are owned by whichever stage currently holds them; ownership
/// transfers on hand-off and a block is never shared or mutated after
/// capture.
#[derive(Debug, Clone)]
pub struct AudioBlock {
    /// Mono f32 samples at `sample_rate`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count after conversion (always 1 for capture).
    pub channels: u16,
    /// Monotonically increasing sequence number assigned at capture time.
    /// Gaps indicate dropped blocks.
    pub seq: u64,
}

/// All audio captured during one recording window.
///
/// Finalized when recording stops; consumed exactly once by transcription.
#[derive(Debug)]
pub struct Utterance {
    /// Blocks in capture order.
    pub blocks: Vec<AudioBlock>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// When the recording window opened.
    pub started_at: Instant,
    /// Number of blocks evicted from the handoff queue before consumption.
    pub dropped_blocks: u64,
}

impl Utterance {
    /// Concatenate all blocks into a single sample buffer.
    pub fn samples(&self) -> Vec<f32> {
        let total: usize = self.blocks.iter().map(|b| b.samples.len()).sum();
        let mut out = Vec::with_capacity(total);
        for block in &self.blocks {
            out.extend_from_slice(&block.samples);
        }
        out
    }

    /// Captured audio duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        let total: usize = self.blocks.iter().map(|b| b.samples.len()).sum();
        total as f32 / self.sample_rate as f32
    }

    /// Whether no audio was captured at all.
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| b.samples.is_empty())
    }
}

/// Outcome status of a transcription attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptStatus {
    /// Usable text was produced.
    Ok,
    /// The engine ran but heard nothing intelligible.
    Empty,
    /// The engine failed; `text` is empty.
    Failed,
}

/// A transcription result. Produced once per utterance; immutable.
#[derive(Debug, Clone)]
pub struct Transcript {
    /// The transcribed text (empty unless status is `Ok`).
    pub text: String,
    /// Whether the transcription succeeded.
    pub status: TranscriptStatus,
}

impl Transcript {
    /// A transcript representing an engine failure.
    pub fn failed() -> Self {
        Self {
            text: String::new(),
            status: TranscriptStatus::Failed,
        }
    }

    /// Build a transcript from raw engine output, classifying blank
    /// output as `Empty`.
    pub fn from_text(text: String) -> Self {
        if text.trim().is_empty() {
            Self {
                text: String::new(),
                status: TranscriptStatus::Empty,
            }
        } else {
            Self {
                text,
                status: TranscriptStatus::Ok,
            }
        }
    }
}

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Display label used in prompts and transcripts.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

/// One role-tagged message in a conversation. The atomic unit persisted
/// to memory and displayed in the interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Unique turn id.
    pub id: Uuid,
    /// Who produced the turn.
    pub role: Role,
    /// Message text.
    pub text: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Free-form tags (carried into memory records).
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ConversationTurn {
    /// Create a turn stamped with the current time.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
            tags: Vec::new(),
        }
    }

    /// Create a turn with tags attached.
    pub fn with_tags(role: Role, text: impl Into<String>, tags: Vec<String>) -> Self {
        let mut turn = Self::new(role, text);
        turn.tags = tags;
        turn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(seq: u64, samples: Vec<f32>) -> AudioBlock {
        AudioBlock {
            samples,
            sample_rate: 16_000,
            channels: 1,
            seq,
        }
    }

    #[test]
    fn utterance_concatenates_in_block_order() {
        let utterance = Utterance {
            blocks: vec![block(0, vec![0.1, 0.2]), block(1, vec![0.3])],
            sample_rate: 16_000,
            started_at: Instant::now(),
            dropped_blocks: 0,
        };
        assert_eq!(utterance.samples(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn utterance_duration_from_sample_count() {
        let utterance = Utterance {
            blocks: vec![block(0, vec![0.0; 8_000])],
            sample_rate: 16_000,
            started_at: Instant::now(),
            dropped_blocks: 0,
        };
        assert!((utterance.duration_secs() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn blank_transcription_is_empty_status() {
        let transcript = Transcript::from_text("   \n".to_owned());
        assert_eq!(transcript.status, TranscriptStatus::Empty);
        assert!(transcript.text.is_empty());
    }

    #[test]
    fn turn_serde_round_trip() {
        let turn = ConversationTurn::with_tags(
            Role::User,
            "explain TCP",
            vec!["conversation".to_owned()],
        );
        let json = serde_json::to_string(&turn).expect("serialize turn");
        let back: ConversationTurn = serde_json::from_str(&json).expect("deserialize turn");
        assert_eq!(back.role, Role::User);
        assert_eq!(back.text, "explain TCP");
        assert_eq!(back.tags, vec!["conversation".to_owned()]);
    }
}
