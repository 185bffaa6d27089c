//! Class isolation for the agent class loader
//!
//! Every entry moves under the isolation prefix and compiled classes get a
//! suffix no class loader will pick up by path convention, so only the
//! agent's own loader can find them. Layout of an isolated entry:
//!
//! ```text
//! io/opentelemetry/javaagent/tooling/AgentInstaller.class
//!   -> inst/io/opentelemetry/javaagent/tooling/AgentInstaller.classdata
//! ```

use crate::aggregator::IntermediateArchive;
use crate::archive::{Archive, ArchiveEntry};
use crate::classifier::Bucket;
use crate::error::{BuildError, BuildResult};
use agentpack_config::AssemblyConfig;
use tracing::info;

const LICENSE: &str = "LICENSE";
const LICENSE_RENAMED: &str = "LICENSE.renamed";

/// An intermediate archive moved under the isolation prefix
#[derive(Debug, Clone)]
pub struct IsolatedArchive {
    pub bucket: Bucket,
    pub prefix: String,
    pub archive: Archive,
}

/// Rewrites archive layout for the isolated class loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Isolator {
    prefix: String,
    class_suffix: String,
    preserve: Vec<String>,
}

impl Isolator {
    pub fn new(prefix: impl Into<String>, class_suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
            class_suffix: class_suffix.into(),
            preserve: Vec::new(),
        }
    }

    /// Root-level paths that stay outside the prefix
    pub fn with_preserve(mut self, preserve: Vec<String>) -> Self {
        self.preserve = preserve;
        self
    }

    pub fn from_config(config: &AssemblyConfig) -> Self {
        Self::new(config.isolation_prefix(), config.class_suffix())
            .with_preserve(config.isolation.preserve.clone())
    }

    /// Path an entry takes inside the isolated layer
    pub fn isolated_path(&self, path: &str) -> String {
        if self.preserve.iter().any(|p| p == path) {
            return path.to_string();
        }

        // avoids clashing with a license/ directory on case-insensitive filesystems
        let renamed = if path == LICENSE {
            LICENSE_RENAMED.to_string()
        } else if let Some(stem) = path.strip_suffix(".class") {
            format!("{}.{}", stem, self.class_suffix)
        } else {
            path.to_string()
        };

        format!("{}/{}", self.prefix, renamed)
    }

    /// Move every entry of an intermediate archive under the prefix
    pub fn isolate(&self, intermediate: &IntermediateArchive) -> BuildResult<IsolatedArchive> {
        let mut archive = Archive::new();
        for entry in intermediate.archive.entries() {
            let isolated = ArchiveEntry::new(
                self.isolated_path(&entry.path),
                entry.data.clone(),
                entry.origin.clone(),
            );
            if let Err(rejected) = archive.push(isolated) {
                let first = archive
                    .get(&rejected.path)
                    .map(|e| e.origin.clone())
                    .unwrap_or_default();
                return Err(BuildError::duplicate(rejected.path, first, rejected.origin));
            }
        }

        self.verify(&archive)?;
        info!(
            "Isolated {} under {}/ ({} entries)",
            intermediate.bucket,
            self.prefix,
            archive.len()
        );

        Ok(IsolatedArchive {
            bucket: intermediate.bucket,
            prefix: self.prefix.clone(),
            archive,
        })
    }

    /// Check that no entry escaped the prefix and no class stayed loadable
    pub fn verify(&self, archive: &Archive) -> BuildResult<()> {
        let root = format!("{}/", self.prefix);
        for path in archive.paths() {
            if self.preserve.iter().any(|p| p == path) {
                continue;
            }
            if !path.starts_with(&root) || path.ends_with(".class") {
                return Err(BuildError::IsolationIntegrity {
                    path: path.to_string(),
                    prefix: self.prefix.clone(),
                });
            }
        }
        Ok(())
    }
}
