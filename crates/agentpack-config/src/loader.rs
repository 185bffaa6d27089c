//! Configuration Loader
//!
//! Finds agentpack.toml, loads it and applies environment overrides.

use crate::defaults::{CONFIG_FILE_NAME, MODULES_FILE_NAME};
use crate::project::AssemblyConfig;
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader
///
/// Loads configuration with the following precedence:
/// 1. Built-in defaults - lowest priority
/// 2. Assembly config (agentpack.toml) - overrides defaults
/// 3. Environment variables (AGENTPACK_*) - overrides the file
/// 4. CLI flags - highest priority (handled by caller)
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Skip environment overrides (used by tests and embedders)
    ignore_env: bool,
}

/// A loaded configuration and where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Effective configuration
    pub config: AssemblyConfig,

    /// Directory containing the config file; relative paths resolve against it
    pub root: PathBuf,

    /// The config file itself
    pub path: PathBuf,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { ignore_env: false }
    }

    /// Disable environment variable overrides
    pub fn without_env(mut self) -> Self {
        self.ignore_env = true;
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find agentpack.toml.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<LoadedConfig> {
        let path = find_config_file(start_dir)
            .ok_or_else(|| ConfigError::NotFound(start_dir.join(CONFIG_FILE_NAME)))?;
        self.load_from_file(&path)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<LoadedConfig> {
        let config = AssemblyConfig::load_from_file(config_path)?;
        let config = if self.ignore_env {
            config
        } else {
            apply_env_overrides(config)?
        };

        let root = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(LoadedConfig {
            config,
            root,
            path: config_path.to_path_buf(),
        })
    }
}

impl LoadedConfig {
    /// Resolve a configured path against the config directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Default module list location (modules.toml next to the config)
    pub fn default_modules_file(&self) -> PathBuf {
        self.root.join(MODULES_FILE_NAME)
    }

    /// Effective output directory, resolved
    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.config.output_dir())
    }

    /// Effective intermediate directory, resolved
    pub fn work_dir(&self) -> PathBuf {
        self.resolve(&self.config.work_dir())
    }
}

/// Walk up from `start_dir` looking for agentpack.toml
fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut current = Some(start_dir);
    while let Some(dir) = current {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}

/// Apply environment variable overrides
///
/// Recognised: AGENTPACK_ISOLATION_PREFIX, AGENTPACK_OUTPUT_DIR,
/// AGENTPACK_REMOVE_VERSION, AGENTPACK_VERSION
fn apply_env_overrides(mut config: AssemblyConfig) -> ConfigResult<AssemblyConfig> {
    if let Ok(prefix) = env::var("AGENTPACK_ISOLATION_PREFIX") {
        config.isolation.prefix = Some(prefix);
    }

    if let Ok(dir) = env::var("AGENTPACK_OUTPUT_DIR") {
        config.output.dir = Some(PathBuf::from(dir));
    }

    if let Ok(remove) = env::var("AGENTPACK_REMOVE_VERSION") {
        config.output.remove_version =
            matches!(remove.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Ok(version) = env::var("AGENTPACK_VERSION") {
        config.package.version = version;
    }

    // overrides must satisfy the same rules as the file
    config.validate()?;
    Ok(config)
}
