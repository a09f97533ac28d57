use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::Stage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectBrief {
    pub name: String,
    /// Broad themes the bot may allude to without naming the project.
    pub themes: Vec<String>,
    /// Concrete facts, revealed one at a time once a conversation has matured.
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterConfig {
    pub name: String,
    /// System preamble handed to the generation backend.
    pub prompt: String,
    pub project: ProjectBrief,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        CharacterConfig {
            name: "default".to_string(),
            prompt: "You are a friendly developer who enjoys helping people learn new \
                     technologies. You write short, plain-spoken posts without hashtags."
                .to_string(),
            project: ProjectBrief {
                name: "the project".to_string(),
                themes: vec![
                    "learning by building small things".to_string(),
                    "tools that make new languages less intimidating".to_string(),
                ],
                details: vec![
                    "it ships a guided set of beginner exercises".to_string(),
                    "it runs entirely in the browser".to_string(),
                ],
            },
        }
    }
}

/// Loads `characters/<name>/config.json` under `root`, or the built-in
/// persona when no name is given.
pub fn load_character_config(root: &Path, name: Option<&str>) -> Result<CharacterConfig> {
    let Some(name) = name else {
        info!("no character configured, using built-in persona");
        return Ok(CharacterConfig::default());
    };

    let mut config_path = PathBuf::from(root);
    config_path.push(name);
    config_path.push("config.json");

    if !config_path.exists() {
        return Err(anyhow::anyhow!(
            "Character config not found for '{}' at {:?}",
            name,
            config_path
        ));
    }

    let config_str = fs::read_to_string(&config_path)?;
    let config: CharacterConfig = serde_json::from_str(&config_str)?;
    info!(character = %config.name, "loaded character profile");
    Ok(config)
}

impl CharacterConfig {
    /// Prompt for a reply in an ongoing conversation. The more replies a
    /// thread has had, the more the reply may say about the project.
    pub fn reply_prompt(&self, stage: Stage, mention_text: &str) -> String {
        let guidance = match stage {
            Stage::Warm => "- Be warm and brief\n\
                            - Do not mention any project or product\n"
                .to_string(),
            Stage::Hinting => format!(
                "- Be warm and brief\n\
                 - Subtly hint at this theme without naming anything: {}\n",
                pick(&self.project.themes, mention_text).unwrap_or("building things")
            ),
            Stage::Disclosure => format!(
                "- Be warm and brief\n\
                 - Mention {} and exactly this one detail about it: {}\n\
                 - Do not list any other features\n",
                self.project.name,
                pick(&self.project.details, mention_text).unwrap_or("it is open to everyone")
            ),
        };
        format!(
            "Task: Reply to this message someone sent you.\n\
             Message: '{mention_text}'\n\
             Requirements:\n\
             {guidance}\
             - Stay under 280 characters\n\
             - No hashtags\n\
             Write only the reply text, nothing else:"
        )
    }

    /// Prompt for an unsolicited reply to a question found through search.
    pub fn proactive_prompt(&self, post_text: &str) -> String {
        format!(
            "Task: Someone asked this publicly. Write a genuinely helpful reply.\n\
             Post: '{post_text}'\n\
             Requirements:\n\
             - Answer or engage with the question directly\n\
             - Do not promote anything\n\
             - Stay under 280 characters\n\
             - No hashtags\n\
             Write only the reply text, nothing else:"
        )
    }

    pub fn original_post_prompt(&self, theme: &str) -> String {
        format!(
            "Write a short motivational post about {theme}. Your response should be the \
             EXACT text of the post only, with no introductions or commentary.\n\
             Requirements:\n\
             - Stay under 280 characters\n\
             - No emojis\n\
             - No hashtags"
        )
    }
}

/// Deterministically picks one entry, keyed by the text being replied to.
fn pick<'a>(options: &'a [String], key: &str) -> Option<&'a str> {
    if options.is_empty() {
        return None;
    }
    let sum = key
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    Some(options[sum % options.len()].as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn stage_one_keeps_the_project_out() {
        let character = CharacterConfig::default();
        let prompt = character.reply_prompt(Stage::Warm, "thanks for the tip!");
        assert!(prompt.contains("thanks for the tip!"));
        assert!(prompt.contains("Do not mention any project"));
        assert!(!prompt.contains(&character.project.name));
        for detail in &character.project.details {
            assert!(!prompt.contains(detail.as_str()));
        }
    }

    #[test]
    fn stage_two_hints_without_details() {
        let character = CharacterConfig::default();
        let prompt = character.reply_prompt(Stage::Hinting, "what are you working on?");
        assert!(character
            .project
            .themes
            .iter()
            .any(|t| prompt.contains(t.as_str())));
        for detail in &character.project.details {
            assert!(!prompt.contains(detail.as_str()));
        }
    }

    #[test]
    fn stage_three_discloses_exactly_one_detail() {
        let character = CharacterConfig::default();
        let prompt = character.reply_prompt(Stage::Disclosure, "tell me more");
        let disclosed = character
            .project
            .details
            .iter()
            .filter(|d| prompt.contains(d.as_str()))
            .count();
        assert_eq!(disclosed, 1);
        assert_eq!(
            prompt,
            character.reply_prompt(Stage::Disclosure, "tell me more"),
            "prompt construction must be deterministic"
        );
    }

    #[test]
    fn loads_named_character_from_disk() {
        let dir = tempdir().unwrap();
        let char_dir = dir.path().join("helper");
        fs::create_dir_all(&char_dir).unwrap();
        let config = CharacterConfig {
            name: "helper".to_string(),
            ..CharacterConfig::default()
        };
        fs::write(
            char_dir.join("config.json"),
            serde_json::to_string(&config).unwrap(),
        )
        .unwrap();

        let loaded = load_character_config(dir.path(), Some("helper")).unwrap();
        assert_eq!(loaded.name, "helper");
        assert!(load_character_config(dir.path(), Some("missing")).is_err());
        assert_eq!(load_character_config(dir.path(), None).unwrap().name, "default");
    }
}
