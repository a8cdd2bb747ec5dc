pub mod loader;

use crate::errors::ConfigError;
use crate::logging::{LogFormat, LoggingConfig, LoggingEnvironment};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::Level;

// Re-export commonly used types
pub use loader::{ConfigLoader, CONFIG_FILE_NAME, LOG_FORMAT_ENV, LOG_LEVEL_ENV};

/// 容器配置
///
/// ```toml
/// [parameters]
/// "db.host" = "localhost"
/// "db.port" = 5432
///
/// [logging]
/// environment = "production"
/// level = "debug"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// 启动时绑定为字面值的参数
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[logging]` 配置段，未设置的字段取环境预设的默认值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    pub environment: Option<LoggingEnvironment>,
    pub level: Option<String>,
    pub format: Option<LogFormat>,
    pub show_target: Option<bool>,
    pub show_thread_ids: Option<bool>,
}

impl LoggingSection {
    /// 转换为日志系统配置
    pub fn to_logging_config(&self) -> Result<LoggingConfig, ConfigError> {
        let mut config = match self.environment.unwrap_or(LoggingEnvironment::Development) {
            LoggingEnvironment::Development => LoggingConfig::development(),
            LoggingEnvironment::Testing => LoggingConfig::testing(),
            LoggingEnvironment::Production => LoggingConfig::production(),
        };

        if let Some(level) = &self.level {
            config.level = Level::from_str(level)
                .map_err(|e| ConfigError::InvalidValue("logging.level".to_string(), e.to_string()))?;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(show_target) = self.show_target {
            config.show_target = show_target;
        }
        if let Some(show_thread_ids) = self.show_thread_ids {
            config.show_thread_ids = show_thread_ids;
        }
        Ok(config)
    }
}
