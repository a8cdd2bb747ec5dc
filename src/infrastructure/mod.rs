//! 基础设施层
//!
//! - 键控依赖注入容器
//! - 服务提供者

// 容器实现
pub mod container;
pub mod provider;

// 重新导出API
pub use container::{Binding, Decorator, Factory, ServiceContainer, ServiceId};
pub use provider::ServiceProvider;
