//! Configuration management for deepbuddy
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.deepbuddy/config.toml

use crate::errors::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete configuration for deepbuddy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub tools: ToolsConfig,
    pub permissions: PermissionsConfig,
    pub conversation: ConversationConfig,
}

/// Model endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    pub request_timeout_secs: u64,

    /// Stream responses token by token
    pub stream: bool,
}

/// Tool execution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub timeout_secs: u64,
    pub max_output_bytes: usize,
}

/// Permission persistence configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    pub store_path: String,

    /// Keep "always"/"never" decisions across sessions
    pub persist: bool,
}

/// Conversation history configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub max_messages: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            request_timeout_secs: 120,
            stream: true,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_output_bytes: 200_000,
        }
    }
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            store_path: "~/.deepbuddy/permissions.json".to_string(),
            persist: true,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_messages: 200,
            system_prompt: None,
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(config_path) => Self::load_from_file(config_path),
            None => Self::load_default(),
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AgentError::ConfigError(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| AgentError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(config_path) if config_path.exists() => Self::load_from_file(&config_path),
            _ => Ok(Config::default()),
        }
    }

    /// `~/.deepbuddy/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".deepbuddy").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.model.base_url.trim().is_empty() {
            return Err(AgentError::ConfigError("model.base_url must not be empty".to_string()));
        }

        if self.model.model.trim().is_empty() {
            return Err(AgentError::ConfigError("model.model must not be empty".to_string()));
        }

        if self.model.request_timeout_secs == 0 {
            return Err(AgentError::ConfigError(
                "model.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.tools.timeout_secs == 0 {
            return Err(AgentError::ConfigError(
                "tools.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.tools.max_output_bytes == 0 {
            return Err(AgentError::ConfigError(
                "tools.max_output_bytes must be greater than 0".to_string(),
            ));
        }

        if self.conversation.max_messages == 0 {
            return Err(AgentError::ConfigError(
                "conversation.max_messages must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render as TOML for display
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AgentError::ConfigError(format!("Failed to serialize config: {}", e)))
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Permission store file path
    pub fn permissions_path(&self) -> PathBuf {
        Self::expand_path(&self.permissions.store_path)
    }

    /// Per-call tool timeout
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.base_url, "https://api.deepseek.com");
        assert_eq!(config.model.api_key_env, "DEEPSEEK_API_KEY");
        assert_eq!(config.tools.timeout_secs, 30);
        assert_eq!(config.tool_timeout(), Duration::from_secs(30));
        assert!(config.permissions.persist);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [model]
            model = "deepseek-coder"

            [tools]
            timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.model.model, "deepseek-coder");
        assert_eq!(config.model.base_url, "https://api.deepseek.com");
        assert_eq!(config.tools.timeout_secs, 5);
        assert_eq!(config.tools.max_output_bytes, 200_000);
        assert_eq!(config.conversation.max_messages, 200);
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.tools.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_output_cap() {
        let mut config = Config::default();
        config.tools.max_output_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_empty_model() {
        let mut config = Config::default();
        config.model.model = "  ".to_string();
        assert!(matches!(config.validate(), Err(AgentError::ConfigError(_))));
    }

    #[test]
    fn test_rendered_toml_loads_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.model.model = "deepseek-reasoner".to_string();
        config.permissions.persist = false;
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[tools]\ntimeout_secs = 0\n").unwrap();

        assert!(Config::load_from_file(&path).is_err());
        assert!(Config::load_from_file(&temp.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = Config::expand_path("~/.deepbuddy");
        assert!(!expanded.to_string_lossy().contains('~'));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = "/absolute/path";
        assert_eq!(Config::expand_path(path).to_string_lossy(), path);
    }
}
