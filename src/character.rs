//! Character definitions and the on-disk character library.
//!
//! A character is both a conversational persona (system prompt and
//! temperature) and the memory namespace key: every memory read and
//! write for a turn is scoped to the active character's `id`.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A conversational identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    /// Unique identifier; doubles as the memory namespace.
    pub id: String,
    /// Display name.
    pub name: String,
    /// System prompt defining the character's behaviour.
    pub system_prompt: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Sampling temperature for this character.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Personality traits.
    #[serde(default)]
    pub traits: Vec<String>,
}

fn default_temperature() -> f32 {
    0.7
}

impl Character {
    /// The built-in character used when no library files exist.
    pub fn builtin_default() -> Self {
        Self {
            id: "default".to_owned(),
            name: "Default".to_owned(),
            system_prompt: "You are a thoughtful conversation partner. Keep replies \
concise and natural."
                .to_owned(),
            description: "Built-in default character".to_owned(),
            temperature: default_temperature(),
            traits: Vec::new(),
        }
    }
}

/// Characters loaded from a directory of JSON files.
pub struct CharacterLibrary {
    dir: PathBuf,
    characters: Vec<Character>,
    active_index: usize,
}

impl CharacterLibrary {
    /// Load all character files from `dir`, skipping unreadable or
    /// invalid ones with a warning. The built-in default is always
    /// present and is active initially unless `default_id` names
    /// another character.
    pub fn load(dir: &Path, default_id: &str) -> Self {
        let mut characters = vec![Character::builtin_default()];

        match std::fs::read_dir(dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    match load_character_file(&path) {
                        Ok(character) => {
                            // A file with the reserved id replaces the built-in.
                            if let Some(existing) =
                                characters.iter_mut().find(|c| c.id == character.id)
                            {
                                *existing = character;
                            } else {
                                characters.push(character);
                            }
                        }
                        Err(e) => warn!("skipping character file {}: {e}", path.display()),
                    }
                }
            }
            Err(e) => info!("no character directory at {}: {e}", dir.display()),
        }

        let active_index = characters
            .iter()
            .position(|c| c.id == default_id)
            .unwrap_or(0);

        info!(
            "loaded {} characters, active '{}'",
            characters.len(),
            characters[active_index].id
        );

        Self {
            dir: dir.to_path_buf(),
            characters,
            active_index,
        }
    }

    /// The currently active character.
    pub fn active(&self) -> &Character {
        &self.characters[self.active_index]
    }

    /// Switch the active character by id.
    ///
    /// # Errors
    ///
    /// Returns an error if no character has that id.
    pub fn set_active(&mut self, id: &str) -> Result<&Character> {
        match self.characters.iter().position(|c| c.id == id) {
            Some(index) => {
                self.active_index = index;
                Ok(&self.characters[index])
            }
            None => Err(PipelineError::Config(format!("unknown character '{id}'"))),
        }
    }

    /// All loaded characters.
    pub fn all(&self) -> &[Character] {
        &self.characters
    }

    /// Look up a character by id.
    pub fn get(&self, id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    /// Persist a character as `<dir>/<id>.json` and add it to the
    /// library (replacing any character with the same id).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&mut self, character: Character) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.json", character.id));
        let json = serde_json::to_string_pretty(&character)
            .map_err(|e| PipelineError::Config(format!("cannot serialize character: {e}")))?;
        std::fs::write(&path, json)?;

        if let Some(existing) = self
            .characters
            .iter_mut()
            .find(|c| c.id == character.id)
        {
            *existing = character;
        } else {
            self.characters.push(character);
        }
        Ok(())
    }
}

fn load_character_file(path: &Path) -> Result<Character> {
    let raw = std::fs::read_to_string(path)?;
    let character: Character = serde_json::from_str(&raw)
        .map_err(|e| PipelineError::Config(format!("invalid character JSON: {e}")))?;
    if character.id.trim().is_empty() {
        return Err(PipelineError::Config("character id must not be empty".into()));
    }
    Ok(character)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "selkie-characters-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn missing_directory_still_provides_default() {
        let dir = std::env::temp_dir().join("selkie-characters-does-not-exist");
        let library = CharacterLibrary::load(&dir, "default");
        assert_eq!(library.active().id, "default");
    }

    #[test]
    fn loads_characters_and_selects_default_id() {
        let dir = temp_dir("load");
        std::fs::write(
            dir.join("tech.json"),
            r#"{"id":"tech","name":"Tech","system_prompt":"You are precise.","temperature":0.3}"#,
        )
        .expect("write character");

        let library = CharacterLibrary::load(&dir, "tech");
        assert_eq!(library.active().id, "tech");
        assert!((library.active().temperature - 0.3).abs() < f32::EPSILON);
        assert!(library.get("default").is_some());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn invalid_files_are_skipped() {
        let dir = temp_dir("invalid");
        std::fs::write(dir.join("broken.json"), "{not json").expect("write file");

        let library = CharacterLibrary::load(&dir, "default");
        assert_eq!(library.all().len(), 1);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn set_active_rejects_unknown_id() {
        let dir = temp_dir("unknown");
        let mut library = CharacterLibrary::load(&dir, "default");
        assert!(library.set_active("nobody").is_err());
        assert_eq!(library.active().id, "default");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn save_round_trips_through_load() {
        let dir = temp_dir("save");
        let mut library = CharacterLibrary::load(&dir, "default");
        library
            .save(Character {
                id: "creative".to_owned(),
                name: "Creative".to_owned(),
                system_prompt: "You are imaginative.".to_owned(),
                description: String::new(),
                temperature: 1.1,
                traits: vec!["playful".to_owned()],
            })
            .expect("save character");

        let reloaded = CharacterLibrary::load(&dir, "creative");
        let creative = reloaded.get("creative").expect("saved character");
        assert_eq!(creative.traits, vec!["playful".to_owned()]);
        assert_eq!(reloaded.active().id, "creative");

        let _ = std::fs::remove_dir_all(dir);
    }
}
