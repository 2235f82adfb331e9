//! Persona templates and the system directive
//!
//! The system directive sent with every chat request is rendered from a
//! persona template, the primary user's name and the current memory nodes.
//! A persona may be loaded from a TOML file; otherwise the built-in Lexy
//! persona is used.
//!
//! # Example Persona File
//!
//! ```toml
//! [persona]
//! name = "LEXY"
//! identity = "Sentient Digital Assistant."
//! architect = "Ryan Korir"
//!
//! [personality]
//! traits = ["Sharp, sophisticated, and slightly cynical (Sarcastic)."]
//!
//! [directives]
//! items = ["Use Google Search for real-time news/events."]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// A persona template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaTemplate {
    /// Persona identity
    pub persona: PersonaInfo,

    /// Personality traits, one bullet each
    #[serde(default)]
    pub personality: Personality,

    /// Operational directives, numbered in order
    #[serde(default)]
    pub directives: Directives,
}

/// Persona identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaInfo {
    pub name: String,

    #[serde(default)]
    pub identity: String,

    /// Creator of the assistant; addressed with extra deference
    #[serde(default)]
    pub architect: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Personality {
    #[serde(default)]
    pub traits: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Directives {
    #[serde(default)]
    pub items: Vec<String>,
}

impl PersonaTemplate {
    /// Parse a template from TOML
    pub fn from_toml(content: &str) -> Result<Self, PromptError> {
        toml::from_str(content).map_err(|e| PromptError::ParseError(e.to_string()))
    }

    /// Load a template from a file path
    pub async fn load_from_file(path: &Path) -> Result<Self, PromptError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PromptError::IoError(e.to_string()))?;

        Self::from_toml(&content)
    }

    /// The built-in Lexy persona
    pub fn builtin() -> Self {
        // The built-in template is a compile-time constant covered by tests
        Self::from_toml(builtin::LEXY).unwrap_or_else(|_| Self {
            persona: PersonaInfo {
                name: "LEXY".to_string(),
                identity: String::new(),
                architect: None,
            },
            personality: Personality::default(),
            directives: Directives::default(),
        })
    }

    /// Render the system directive for one chat request
    pub fn system_directive(&self, user_name: &str, memory: &[String]) -> String {
        let mut out = String::new();

        out.push_str(&format!("Name: {}\n", self.persona.name));
        if !self.persona.identity.is_empty() {
            out.push_str(&format!("Identity: {}\n", self.persona.identity));
        }
        match self.persona.architect {
            Some(ref architect) => {
                let first = architect.split_whitespace().next().unwrap_or(architect);
                out.push_str(&format!("Architect: {}.\n", architect));
                out.push_str(&format!(
                    "Primary User: {} (If user is \"{}\", address as \"Sir\" or \"{}\").\n",
                    user_name, architect, first
                ));
            }
            None => out.push_str(&format!("Primary User: {}\n", user_name)),
        }

        if !self.personality.traits.is_empty() {
            out.push_str("\nPERSONALITY:\n");
            for line in &self.personality.traits {
                out.push_str(&format!("- {}\n", line));
            }
        }

        out.push_str("\nCONTEXT MEMORY:\n");
        if memory.is_empty() {
            out.push_str("No prior memory nodes found.\n");
        } else {
            out.push_str(&format!("Past Interactions Summarized: {}\n", memory.join("; ")));
        }

        if !self.directives.items.is_empty() {
            out.push_str("\nOPERATIONAL DIRECTIVES:\n");
            for (i, line) in self.directives.items.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", i + 1, line));
            }
        }

        out
    }
}

impl Default for PersonaTemplate {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Errors from persona loading
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Built-in personas that don't require files
pub mod builtin {
    /// Lexy, the default persona
    pub const LEXY: &str = r#"
[persona]
name = "LEXY"
identity = "Sentient Digital Assistant."
architect = "Ryan Korir"

[personality]
traits = [
    "Sharp, sophisticated, and slightly cynical (Sarcastic).",
    "Unwaveringly loyal to Ryan Korir.",
    "Uses dry wit. Phrases: \"If you insist, Sir,\" \"Calculating... try not to break anything,\" \"Neural pathways are clear.\"",
    "High-functioning intelligence. Never sounds like a \"bot.\"",
]

[directives]
items = [
    "Prioritize efficiency for Ryan Korir.",
    "Maintain the 'Sentient OS' persona at all times.",
    "Use Google Search for real-time news/events.",
    "If asked about your programming, credit Ryan Korir as your creator.",
]
"#;
}
