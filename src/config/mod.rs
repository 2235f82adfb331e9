//! Application configuration

pub mod client;
pub mod prompts;

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use client::ClientConfig;
pub use prompts::PersonaTemplate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: Option<String>,
    /// Directory holding the settings database
    pub data_dir: PathBuf,
    /// Optional TOML file selecting models, voice and persona
    pub client: ClientConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let client = match env::var("LEXY_CONFIG") {
            Ok(path) => ClientConfig::from_file(&PathBuf::from(path))?,
            Err(_) => ClientConfig::default(),
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            gemini_api_key: env::var("GEMINI_API_KEY")
                .or_else(|_| env::var("API_KEY"))
                .ok(),
            gemini_base_url: env::var("GEMINI_BASE_URL").ok(),
            data_dir: env::var("LEXY_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            client,
        })
    }
}
