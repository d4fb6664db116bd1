//! Session transcript: the ordered record of conversation turns.
//!
//! Kept in memory for prompt context and exportable as JSON Lines (one
//! `{role, text, timestamp, tags}` object per line) for replay.

use crate::error::{PipelineError, Result};
use crate::pipeline::messages::ConversationTurn;
use std::path::Path;
use tracing::info;

/// Ordered log of the session's turns.
#[derive(Debug, Default)]
pub struct SessionLog {
    turns: Vec<ConversationTurn>,
}

impl SessionLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn.
    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// The last `n` turns, oldest first.
    pub fn tail(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// All turns, oldest first.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Number of turns recorded.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Export the session as JSON Lines.
    ///
    /// Written to a temp file first and renamed into place so a failed
    /// export never leaves a truncated transcript.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn export_jsonl(&self, path: &Path) -> Result<()> {
        let mut out = String::new();
        for turn in &self.turns {
            let line = serde_json::to_string(turn)
                .map_err(|e| PipelineError::Pipeline(format!("cannot serialize turn: {e}")))?;
            out.push_str(&line);
            out.push('\n');
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("jsonl.tmp");
        std::fs::write(&tmp, out)?;
        std::fs::rename(&tmp, path)?;

        info!("exported {} turns to {}", self.turns.len(), path.display());
        Ok(())
    }

    /// Load a session from a JSON Lines transcript.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a line fails to
    /// parse.
    pub fn import_jsonl(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut turns = Vec::new();
        for (number, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let turn: ConversationTurn = serde_json::from_str(line).map_err(|e| {
                PipelineError::Pipeline(format!(
                    "bad transcript line {}: {e}",
                    number + 1
                ))
            })?;
            turns.push(turn);
        }
        Ok(Self { turns })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::messages::Role;

    #[test]
    fn tail_returns_most_recent_turns() {
        let mut log = SessionLog::new();
        for text in ["a", "b", "c"] {
            log.append(ConversationTurn::new(Role::User, text));
        }
        let tail = log.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].text, "b");
        assert_eq!(tail[1].text, "c");
    }

    #[test]
    fn tail_larger_than_log_returns_everything() {
        let mut log = SessionLog::new();
        log.append(ConversationTurn::new(Role::User, "only"));
        assert_eq!(log.tail(10).len(), 1);
    }

    #[test]
    fn export_import_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("session.jsonl");

        let mut log = SessionLog::new();
        log.append(ConversationTurn::new(Role::User, "explain TCP"));
        log.append(ConversationTurn::with_tags(
            Role::Assistant,
            "TCP is a transport protocol.",
            vec!["incomplete".to_owned()],
        ));
        log.export_jsonl(&path).expect("export");

        let loaded = SessionLog::import_jsonl(&path).expect("import");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.turns()[0].text, "explain TCP");
        assert_eq!(loaded.turns()[1].tags, vec!["incomplete".to_owned()]);
    }

    #[test]
    fn import_rejects_malformed_lines() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{broken\n").expect("write file");
        assert!(SessionLog::import_jsonl(&path).is_err());
    }
}
