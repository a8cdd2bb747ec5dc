use super::ContainerConfig;
use crate::errors::ConfigError;
use crate::logging::LogFormat;
use std::{collections::HashMap, env, fs, path::Path, path::PathBuf};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "container.toml";
pub const LOG_LEVEL_ENV: &str = "KEYED_CONTAINER_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "KEYED_CONTAINER_LOG_FORMAT";

/// Configuration loader responsible for loading config from files and environment
pub struct ConfigLoader {
    base_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader using the current directory
    pub fn new() -> Self {
        Self { base_path: None }
    }

    /// Create a config loader with custom base path (for testing)
    pub fn with_base_path(base_path: PathBuf) -> Self {
        Self {
            base_path: Some(base_path),
        }
    }

    /// Load `container.toml` from the base path, falling back to defaults
    /// when the file does not exist, then apply environment overrides.
    pub fn load_config(&self) -> Result<ContainerConfig, ConfigError> {
        let config_path = self.config_path();
        let config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            debug!(path = %config_path.display(), "config file not found, using defaults");
            ContainerConfig::default()
        };

        Self::apply_env(config, self.collect_env_vars())
    }

    pub fn config_path(&self) -> PathBuf {
        match &self.base_path {
            Some(base) => base.join(CONFIG_FILE_NAME),
            None => PathBuf::from(CONFIG_FILE_NAME),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<ContainerConfig, ConfigError> {
        let origin = path.to_string_lossy().to_string();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::FileRead(origin.clone(), e))?;
        Self::load_from_str(&content, &origin)
    }

    pub fn load_from_str(content: &str, origin: &str) -> Result<ContainerConfig, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlParse(origin.to_string(), e))
    }

    /// Apply environment overrides on top of a loaded configuration
    pub fn apply_env(
        mut config: ContainerConfig,
        env_map: HashMap<String, String>,
    ) -> Result<ContainerConfig, ConfigError> {
        if let Some(level) = env_map.get(LOG_LEVEL_ENV) {
            config.logging.level = Some(level.clone());
        }
        if let Some(format) = env_map.get(LOG_FORMAT_ENV) {
            config.logging.format = Some(parse_format(format)?);
        }
        Ok(config)
    }

    /// Collect relevant environment variables
    fn collect_env_vars(&self) -> HashMap<String, String> {
        [LOG_LEVEL_ENV, LOG_FORMAT_ENV]
            .iter()
            .filter_map(|key| env::var(key).ok().map(|value| (key.to_string(), value)))
            .collect()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_format(value: &str) -> Result<LogFormat, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "pretty" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        "compact" => Ok(LogFormat::Compact),
        other => Err(ConfigError::InvalidValue(
            LOG_FORMAT_ENV.to_string(),
            format!("unknown log format '{}'", other),
        )),
    }
}
