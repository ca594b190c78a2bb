//! Configuration types for the assistant session.

use crate::voice::VoiceGender;
use serde::{Deserialize, Serialize};

/// Top-level configuration for an assistant session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Language model settings.
    pub llm: LlmConfig,
    /// Voice capture/playback settings.
    pub voice: VoiceConfig,
    /// Embedded game settings.
    pub game: GameConfig,
}

/// Language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat completions server.
    pub api_url: String,
    /// Model identifier sent in requests.
    pub api_model: String,
    /// Bearer token (empty = no auth header).
    pub api_key: String,
    /// System prompt pinned at the start of the conversation history.
    pub system_prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens per reply.
    pub max_tokens: usize,
    /// Maximum history messages kept after the system prompt (0 = unbounded).
    pub max_history_messages: usize,
    /// Assistant greeting appended when the session starts (empty = none).
    pub greeting: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434".to_owned(),
            api_model: "llama3.2".to_owned(),
            api_key: String::new(),
            system_prompt: "You are a friendly, concise assistant. Keep answers short enough \
                            to be spoken aloud."
                .to_owned(),
            temperature: 0.7,
            max_tokens: 1024,
            max_history_messages: 32,
            greeting: "Hi! Ask me anything, or start a game whenever you like.".to_owned(),
        }
    }
}

/// Voice I/O configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Whether finalized assistant messages are spoken aloud.
    pub output_enabled: bool,
    /// Preferred voice gender for playback.
    pub gender: VoiceGender,
    /// Capture locale tag (single configured language).
    pub locale: String,
    /// Voice names tried, in order, when no gender match exists.
    pub preferred_voices: Vec<String>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            output_enabled: true,
            gender: VoiceGender::Feminine,
            locale: "en-US".to_owned(),
            preferred_voices: vec![
                "Samantha".to_owned(),
                "Karen".to_owned(),
                "Daniel".to_owned(),
                "Google US English".to_owned(),
            ],
        }
    }
}

/// Embedded game configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Pacing delay before the AI replies with its ply, in milliseconds.
    ///
    /// The delay is deliberate: the opponent's move should read as a
    /// discrete turn, not an instantaneous reaction.
    pub ai_ply_delay_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            ai_ply_delay_ms: 600,
        }
    }
}

impl AssistantConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::AssistantError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AssistantError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
