//! Container module (v2 as default)

pub mod binding;
pub mod identifier;
mod store;
pub mod v2;

// Re-export primary types from v2
pub use binding::{Binding, Decorator, Factory, Service};
pub use identifier::{IntoServiceId, ServiceId};
pub use v2::{ContainerStats, ServiceContainer};
