//! agentpack configuration
//!
//! Provides the configuration surface of the agent artifact assembler:
//! - Assembly configuration (agentpack.toml)
//! - Module list files handed over by the module provider (modules.toml)
//! - Built-in defaults (isolation prefix, relocation table, merge paths)
//! - Environment variable overrides
//!
//! # Configuration Precedence
//!
//! Later sources override earlier ones:
//! 1. Built-in defaults
//! 2. Assembly config (./agentpack.toml, searched upwards)
//! 3. Environment variables (AGENTPACK_*)
//! 4. CLI flags (handled by the caller)
//!
//! # Example
//!
//! ```no_run
//! use agentpack_config::ConfigLoader;
//! use std::path::Path;
//!
//! let loader = ConfigLoader::new();
//! let loaded = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("{}", loaded.config.package.name);
//! ```

pub mod defaults;
pub mod loader;
pub mod manifest;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Invalid relocation rule '{from}': {reason}")]
    InvalidRelocation { from: String, reason: String },

    #[error("Invalid pattern '{pattern}' in {field}: {reason}")]
    InvalidPattern {
        field: String,
        pattern: String,
        reason: String,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use loader::{ConfigLoader, LoadedConfig};
pub use manifest::{ExternalLibrary, ModuleEntry, ModuleManifest};
pub use project::{
    AssemblyConfig, BootstrapConfig, DuplicatePolicy, IsolationConfig, LicenseConfig,
    OutputConfig, PackageConfig, RelocationConfig,
};

/// Read a file, mapping a missing file to [`ConfigError::NotFound`].
pub(crate) fn read_config_file(path: &std::path::Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound(path.to_path_buf())
        } else {
            ConfigError::IoError(e)
        }
    })
}
