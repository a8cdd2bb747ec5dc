//! 服务提供者
//!
//! 把一组相关的绑定打包注册到容器中

use super::container::{Binding, ServiceContainer};
use crate::config::ContainerConfig;
use crate::errors::ContainerError;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// 服务提供者
pub trait ServiceProvider {
    /// 在容器上定义服务
    fn register(&self, container: &ServiceContainer) -> Result<(), ContainerError>;
}

impl<F> ServiceProvider for F
where
    F: Fn(&ServiceContainer) -> Result<(), ContainerError>,
{
    fn register(&self, container: &ServiceContainer) -> Result<(), ContainerError> {
        self(container)
    }
}

/// 参数提供者，把每个参数绑定为 `serde_json::Value` 字面值
#[derive(Debug, Clone, Default)]
pub struct ParameterProvider {
    parameters: BTreeMap<String, Value>,
}

impl ParameterProvider {
    pub fn new(parameters: BTreeMap<String, Value>) -> Self {
        Self { parameters }
    }

    pub fn from_config(config: &ContainerConfig) -> Self {
        Self::new(config.parameters.clone())
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

impl ServiceProvider for ParameterProvider {
    fn register(&self, container: &ServiceContainer) -> Result<(), ContainerError> {
        for (key, value) in &self.parameters {
            container.set(key.as_str(), Binding::value(value.clone()))?;
        }
        debug!(parameters = self.parameters.len(), "parameters bound");
        Ok(())
    }
}
