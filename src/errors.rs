use crate::infrastructure::container::ServiceId;
use thiserror::Error;

/// 用户提供的工厂、装饰器和服务提供者返回的错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 容器对调用方公开的错误
///
/// 存储层的错误在每个操作边界统一映射到这里，调用方可以按种类分支，
/// 例如把 `NotFound` 当作可选服务缺失，把 `Container` 当作服务构造失败。
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Identifier {0} is not a string or integer")]
    InvalidIdentifier(String),
    #[error("Identifier \"{0}\" is not defined")]
    NotFound(ServiceId),
    #[error("Cannot override frozen service \"{0}\"")]
    FrozenService(ServiceId),
    #[error("Expected invokable: {0}")]
    ExpectedInvokable(String),
    /// 工厂或装饰器内部失败，以及其它意外错误；总是携带原始原因
    #[error("Container error: {0}")]
    Container(#[source] BoxError),
}

impl ContainerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::NotFound(_))
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self, ContainerError::FrozenService(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file '{0}': {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("Failed to parse TOML from '{0}': {1}")]
    TomlParse(String, #[source] toml::de::Error),
    #[error("Invalid configuration value for '{0}': {1}")]
    InvalidValue(String, String),
    #[error("Failed to bind configuration: {0}")]
    Container(#[from] ContainerError),
}
