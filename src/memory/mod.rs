//! Long-term memory, scoped to the active character.
//!
//! Every read and write goes through [`MemoryOrchestrator`], which
//! threads the character identity into each call as the namespace key.
//! Records written under one character are never returned to another.
//! Failures propagate as errors; the coordinator decides how each one
//! degrades (no context for a failed recall, a surfaced notice for a
//! failed store) so a missing service never fails a turn.

mod client;
mod types;

pub use client::MemoryClient;
pub use types::MemoryRecord;

use crate::character::Character;
use crate::config::MemoryConfig;
use crate::error::Result;
use crate::pipeline::messages::{ConversationTurn, Role};
use tracing::debug;

/// Orchestrates namespace-scoped recall and storage for the pipeline.
pub struct MemoryOrchestrator {
    client: MemoryClient,
    recall_limit: usize,
}

impl MemoryOrchestrator {
    /// Create an orchestrator over the configured remote store.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &MemoryConfig) -> Result<Self> {
        Ok(Self {
            client: MemoryClient::new(config)?,
            recall_limit: config.recall_limit,
        })
    }

    /// Whether the memory service is reachable.
    pub async fn check_connection(&self) -> bool {
        self.client.check_connection().await
    }

    /// Retrieve records relevant to `text` from the character's
    /// namespace, most relevant first.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable or rejects the
    /// query. The coordinator treats that as "no context", never as a
    /// failed turn.
    pub async fn recall(&self, text: &str, character: &Character) -> Result<Vec<MemoryRecord>> {
        let records = self
            .client
            .search(text, &character.id, self.recall_limit)
            .await?;
        debug!(
            "recalled {} records for character '{}'",
            records.len(),
            character.id
        );
        Ok(records)
    }

    /// Persist one conversation turn to the character's namespace.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable or rejects the
    /// write. Callers surface the failure as a notice; it is never fatal
    /// to the turn.
    pub async fn store_turn(
        &self,
        turn: &ConversationTurn,
        character: &Character,
    ) -> Result<String> {
        let content = match turn.role {
            Role::User => format!("User said: {}", turn.text),
            Role::Assistant => format!("Assistant replied: {}", turn.text),
            Role::System => turn.text.clone(),
        };

        let mut tags = vec!["conversation".to_owned(), role_tag(turn.role).to_owned()];
        tags.extend(turn.tags.iter().cloned());

        self.client.store(&content, &character.id, &tags).await
    }

    /// Persist both sides of an exchange concurrently.
    ///
    /// The two stores are independent: neither waits for nor is gated on
    /// the other, and each outcome is returned separately.
    pub async fn store_exchange(
        &self,
        user: &ConversationTurn,
        assistant: &ConversationTurn,
        character: &Character,
    ) -> (Result<String>, Result<String>) {
        tokio::join!(
            self.store_turn(user, character),
            self.store_turn(assistant, character)
        )
    }
}

fn role_tag(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}
