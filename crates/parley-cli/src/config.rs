//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Configuration for parley
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the chat backend
    pub backend_url: Option<String>,
    /// Default model name
    pub model: Option<String>,
    /// Default model type (local, cloud)
    pub model_type: Option<String>,
    /// Stream responses chunk by chunk
    pub streaming: Option<bool>,
    /// Preferred cloud model when the local one fails
    pub cloud_fallback_model: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parley")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        // Check for PARLEY_CONFIG_PATH env var first
        if let Ok(path) = std::env::var("PARLEY_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        let dir = path.parent().unwrap();
        fs::create_dir_all(dir)?;

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            backend_url: Some("http://localhost:5000".to_string()),
            model: None,
            model_type: None,
            streaming: Some(true),
            cloud_fallback_model: Some("gemini".to_string()),
        };

        default_config.save()?;
        Ok(path)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# parley configuration file
# Place at ~/.config/parley/config.toml (Linux/Mac) or %APPDATA%\parley\config.toml (Windows)

# Base URL of the chat backend
backend_url = "http://localhost:5000"

# Default model (optional - first advertised model is used otherwise)
# model = "llama3"
# model_type = "local"

# Stream responses chunk by chunk (true by default)
streaming = true

# Preferred cloud model when the local one fails
cloud_fallback_model = "gemini"
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Config = toml::from_str("backend_url = \"http://host:9000\"").unwrap();
        assert_eq!(config.backend_url.as_deref(), Some("http://host:9000"));
        assert!(config.model.is_none());
        assert!(config.streaming.is_none());
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config.streaming, Some(true));
        assert_eq!(config.cloud_fallback_model.as_deref(), Some("gemini"));
    }
}
