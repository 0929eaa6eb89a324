//! Herald Runtime - application wiring for the Herald notification dispatcher.
//!
//! This crate provides:
//! - Configuration loading and validation (`config`)
//! - Logging initialisation for dispatch diagnostics (`logging`)
//! - A scoped service container with handler lifetimes (`services`)
//!
//! ```ignore
//! use herald_runtime::prelude::*;
//!
//! let config = load_config()?;
//! init_from_config(&config.logging);
//!
//! let provider = ServiceCollection::new()
//!     .with_settings(config.dispatch)
//!     .register_transient::<CountHandler>()
//!     .build();
//!
//! let scope = provider.create_scope();
//! scope.dispatcher().dispatch(Count);
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod services;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, DispatchSettings, HeraldConfig, LoggingConfig,
    load_config, load_config_from_file,
};
pub use error::{ServiceError, ServiceResult};
pub use logging::{DISPATCH_TARGET, LoggingBuilder, init_from_config};
pub use services::{HandlerLifetime, ServiceCollection, ServiceProvider, ServiceScope};

pub use tracing;
pub use tracing_subscriber;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::config::{HeraldConfig, LogLevel, load_config};
    pub use crate::logging::{LoggingBuilder, init_from_config};
    pub use crate::services::{HandlerLifetime, ServiceCollection, ServiceProvider, ServiceScope};
}
