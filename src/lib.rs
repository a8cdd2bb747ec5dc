pub mod config;
pub mod errors;
pub mod infrastructure;
pub mod logging;

// Re-export commonly used items for convenience
pub use config::ContainerConfig;
pub use errors::{BoxError, ContainerError};
pub use infrastructure::container::{
    Binding, ContainerStats, Decorator, Factory, IntoServiceId, Service, ServiceContainer, ServiceId,
};
pub use infrastructure::provider::{ParameterProvider, ServiceProvider};
