use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result, anyhow};

use crate::state::{Persona, ResponseLength, SessionConfig};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

const API_KEY_VARS: [&str; 2] = ["COMPANION_API_KEY", "OPENROUTER_API_KEY"];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub persona: Persona,
    #[serde(default)]
    pub response_length: ResponseLength,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            persona: Persona::default(),
            response_length: ResponseLength::default(),
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("invalid config file {}", config_path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    /// Remember the last persona and length so the next run starts with them
    pub fn save_session_config(session: SessionConfig) -> Result<()> {
        Self::save_session_config_at(&Self::get_config_path()?, session)
    }

    /// Fails without touching the file when the existing config cannot be read
    pub fn save_session_config_at(config_path: &Path, session: SessionConfig) -> Result<()> {
        let mut config = Self::load_from(config_path)?;
        config.persona = session.persona;
        config.response_length = session.response_length;
        config.save_to(config_path)
    }

    /// API key from the environment first, then the config file
    pub fn resolve_api_key(&self) -> Option<String> {
        API_KEY_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .or_else(|| self.api_key.clone())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            persona: self.persona,
            response_length: self.response_length,
        }
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("companion-chat").join("config.json"))
    }
}
