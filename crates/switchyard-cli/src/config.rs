use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use switchyard_core::ProviderEntry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// File backing the configuration store
    #[serde(default = "default_store_path")]
    pub store_path: String,

    #[serde(default = "default_switch_path")]
    pub switch_path: String,

    /// The proxy's own listening URL
    #[serde(default = "default_proxy_endpoint")]
    pub proxy_endpoint: String,

    /// Upstream providers targets may route to
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            switch_path: default_switch_path(),
            proxy_endpoint: default_proxy_endpoint(),
            providers: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        let settings = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)?
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents)?
        };

        Ok(settings)
    }

    /// Load from `path`, or from the default location when it exists
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(expand(&path.to_string_lossy()))?,
            None => {
                let default = expand(DEFAULT_SETTINGS_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        settings.merge_env();
        Ok(settings)
    }

    /// Merge environment variables into settings (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("SWITCHYARD_STORE") {
            self.store_path = val;
        }

        if let Ok(val) = std::env::var("SWITCHYARD_SWITCH_PATH") {
            if val.trim().is_empty() {
                eprintln!("Warning: Empty SWITCHYARD_SWITCH_PATH ignored");
            } else {
                self.switch_path = val.trim().to_string();
            }
        }

        if let Ok(val) = std::env::var("SWITCHYARD_PROXY_ENDPOINT") {
            self.proxy_endpoint = val;
        }

        if let Ok(val) = std::env::var("SWITCHYARD_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Store path with `~` expanded
    pub fn store_path(&self) -> PathBuf {
        expand(&self.store_path)
    }
}

const DEFAULT_SETTINGS_PATH: &str = "~/.switchyard/config.yaml";

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

fn default_store_path() -> String {
    "~/.switchyard/store.yaml".to_string()
}

fn default_switch_path() -> String {
    switchyard_routing::RESERVED_GROUP_NAME.to_string()
}

fn default_proxy_endpoint() -> String {
    switchyard_routing::DEFAULT_PROXY_ENDPOINT.to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.switch_path, "switch");
        assert_eq!(settings.proxy_endpoint, "http://127.0.0.1:11434");
        assert!(settings.providers.is_empty());
        assert!(!settings.store_path().starts_with("~"));
    }

    #[test]
    fn test_yaml_settings() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(
            file,
            r#"
store_path: /tmp/store.json
providers:
  - id: ollama
    base_url: http://localhost:11434
    models:
      - id: qwen3
        supports_tools: false
"#
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.store_path(), PathBuf::from("/tmp/store.json"));
        assert_eq!(settings.switch_path, "switch");
        assert_eq!(settings.providers[0].models[0].id, "qwen3");
        assert!(settings.providers[0].enabled);
        assert!(!settings.providers[0].models[0].supports_tools);
    }

    #[test]
    fn test_toml_settings() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(
            file,
            r#"
switch_path = "active"
proxy_endpoint = "http://127.0.0.1:9000"

[logging]
level = "debug"

[[providers]]
id = "openai"
base_url = "https://api.openai.com/v1"

[[providers.models]]
id = "gpt-4o"
"#
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.switch_path, "active");
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.providers[0].models.len(), 1);
    }
}
