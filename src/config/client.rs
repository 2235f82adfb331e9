//! Deployment configuration loaded from TOML files
//!
//! Selects the remote models, the synthesized voice and, optionally, a
//! persona file that replaces the built-in Lexy persona.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::providers::{GeminiConfig, DEFAULT_CHAT_MODEL, DEFAULT_SPEECH_MODEL, DEFAULT_VOICE};

/// Root client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Model provider settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Persona settings
    #[serde(default)]
    pub persona: PersonaConfig,
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("llm.chat_model", &self.llm.chat_model),
            ("llm.speech_model", &self.llm.speech_model),
            ("llm.voice", &self.llm.voice),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Streaming chat model
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Text-to-speech model
    #[serde(default = "default_speech_model")]
    pub speech_model: String,

    /// Prebuilt voice used for speech
    #[serde(default = "default_voice")]
    pub voice: String,
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_speech_model() -> String {
    DEFAULT_SPEECH_MODEL.to_string()
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            chat_model: default_chat_model(),
            speech_model: default_speech_model(),
            voice: default_voice(),
        }
    }
}

impl LlmConfig {
    /// Apply these model choices on top of a provider config
    pub fn apply_to(&self, gemini: &mut GeminiConfig) {
        gemini.chat_model = self.chat_model.clone();
        gemini.speech_model = self.speech_model.clone();
        gemini.voice = self.voice.clone();
    }
}

/// Persona configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Persona TOML file; the built-in persona is used when absent
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CONFIG: &str = r#"
[llm]
chat_model = "gemini-2.5-flash"
voice = "Puck"

[persona]
file = "configs/persona/lexy.toml"
"#;

    #[test]
    fn test_parse_config() {
        let config = ClientConfig::from_str(SAMPLE_CONFIG).unwrap();

        assert_eq!(config.llm.chat_model, "gemini-2.5-flash");
        assert_eq!(config.llm.speech_model, DEFAULT_SPEECH_MODEL);
        assert_eq!(config.llm.voice, "Puck");
        assert_eq!(
            config.persona.file,
            Some(PathBuf::from("configs/persona/lexy.toml"))
        );
    }

    #[test]
    fn test_minimal_config() {
        let config = ClientConfig::from_str("").unwrap();
        assert_eq!(config.llm.chat_model, DEFAULT_CHAT_MODEL);
        assert_eq!(config.llm.voice, DEFAULT_VOICE);
        assert!(config.persona.file.is_none());
    }

    #[test]
    fn test_empty_model_is_rejected() {
        let err = ClientConfig::from_str("[llm]\nchat_model = \"  \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_apply_to_provider_config() {
        let config = ClientConfig::from_str(SAMPLE_CONFIG).unwrap();
        let mut gemini = GeminiConfig::new("key");
        config.llm.apply_to(&mut gemini);
        assert_eq!(gemini.chat_model, "gemini-2.5-flash");
        assert_eq!(gemini.voice, "Puck");
    }
}
