pub mod build;
pub mod inspect;
pub mod licenses;
pub mod plan;

use agentpack_build::ManifestModuleProvider;
use agentpack_config::{ConfigLoader, LoadedConfig};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Where to find the assembly config and the module list
#[derive(Debug, Default)]
pub struct ProjectArgs {
    pub config: Option<PathBuf>,
    pub modules: Option<PathBuf>,
}

impl ProjectArgs {
    /// Load agentpack.toml, from the given path or searched upwards from the current directory
    pub fn load_config(&self) -> Result<LoadedConfig> {
        let loader = ConfigLoader::new();
        match &self.config {
            Some(path) => loader
                .load_from_file(path)
                .with_context(|| format!("Failed to load {}", path.display())),
            None => {
                let cwd = std::env::current_dir().context("Failed to read current directory")?;
                loader
                    .load_from_directory(&cwd)
                    .context("Failed to load agentpack.toml")
            }
        }
    }

    /// Load the module list, defaulting to modules.toml next to the config
    pub fn load_modules(&self, loaded: &LoadedConfig) -> Result<ManifestModuleProvider> {
        let path = self
            .modules
            .clone()
            .unwrap_or_else(|| loaded.default_modules_file());
        ManifestModuleProvider::from_file(&path)
            .with_context(|| format!("Failed to load module list {}", path.display()))
    }
}
