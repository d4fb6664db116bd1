//! Generation request assembly.
//!
//! A request is built fresh for every turn from the character's system
//! prompt, the recalled memory excerpts, and the recent conversation
//! window; nothing is cached across turns.

use crate::character::Character;
use crate::config::LlmConfig;
use crate::memory::MemoryRecord;
use crate::pipeline::messages::ConversationTurn;

/// One complete request to the generation endpoint.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Model name to request.
    pub model: String,
    /// Assembled system prompt (global preamble + character prompt).
    pub system_prompt: String,
    /// Assembled prompt body (context blocks + user text).
    pub prompt: String,
    /// Sampling temperature, from the character.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: usize,
}

/// Build the request for one turn.
///
/// `context_limit` bounds how many memory excerpts enter the context
/// block; the history window comes from `llm.history_window`.
pub fn build_request(
    character: &Character,
    memories: &[MemoryRecord],
    history: &[ConversationTurn],
    user_text: &str,
    llm: &LlmConfig,
    context_limit: usize,
) -> GenerationRequest {
    let mut parts: Vec<String> = Vec::new();

    let memory_block = memory_context(memories, context_limit);
    if !memory_block.is_empty() {
        parts.push(memory_block);
    }

    let history_block = conversation_context(history, llm.history_window);
    if !history_block.is_empty() {
        parts.push(history_block);
    }

    parts.push(format!("User: {user_text}"));

    GenerationRequest {
        model: llm.model.clone(),
        system_prompt: system_prompt(&llm.global_system_prompt, character),
        prompt: parts.join("\n\n"),
        temperature: character.temperature,
        max_tokens: llm.max_tokens,
    }
}

/// Global preamble followed by the character's own prompt; empty layers
/// are skipped so the result never contains double blank lines.
fn system_prompt(global: &str, character: &Character) -> String {
    let mut sections: Vec<&str> = Vec::new();
    if !global.trim().is_empty() {
        sections.push(global.trim());
    }
    if !character.system_prompt.trim().is_empty() {
        sections.push(character.system_prompt.trim());
    }
    sections.join("\n\n")
}

fn memory_context(memories: &[MemoryRecord], limit: usize) -> String {
    if memories.is_empty() || limit == 0 {
        return String::new();
    }
    let lines: Vec<String> = memories
        .iter()
        .take(limit)
        .map(|record| format!("- {}", record.content))
        .collect();
    format!("Relevant context:\n{}", lines.join("\n"))
}

fn conversation_context(history: &[ConversationTurn], window: usize) -> String {
    if history.is_empty() || window == 0 {
        return String::new();
    }
    let start = history.len().saturating_sub(window);
    let lines: Vec<String> = history[start..]
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.text))
        .collect();
    format!("Recent conversation:\n{}", lines.join("\n"))
}
