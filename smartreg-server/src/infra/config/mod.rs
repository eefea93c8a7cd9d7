//! Layered configuration: `.env`, TOML file, environment, then CLI flags.

pub mod loader;
pub mod models;
pub mod sources;

pub use loader::{
    ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions,
    DEFAULT_PORT, DEFAULT_TEMPLATE,
};
pub use models::{
    Config, ConfigMetadata, ConfigWarning, ConfigWarnings, LoggingConfig,
    PathsConfig, RegistrationConfig, ServerConfig, SshConfig,
};
pub use sources::{EnvConfig, FileConfig};
