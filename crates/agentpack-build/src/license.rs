//! Third-party attribution inventory
//!
//! Covers the libraries that end up in the bootstrap and base-agent
//! layers plus explicitly configured extras.

use crate::error::{BuildError, BuildResult};
use agentpack_config::{ExternalLibrary, LicenseConfig};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

const UNKNOWN_LICENSE: &str = "Unknown";

/// Filters and collects external libraries for attribution
#[derive(Debug, Clone)]
pub struct LicenseRecorder {
    exclude_groups: Vec<Regex>,
    extra: Vec<ExternalLibrary>,
}

impl LicenseRecorder {
    /// Group patterns must match the whole group name
    pub fn new(exclude_groups: &[String], extra: Vec<ExternalLibrary>) -> BuildResult<Self> {
        let exclude_groups = exclude_groups
            .iter()
            .map(|pattern| {
                Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| BuildError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<BuildResult<Vec<_>>>()?;

        Ok(Self {
            exclude_groups,
            extra,
        })
    }

    pub fn from_config(config: &LicenseConfig) -> BuildResult<Self> {
        Self::new(&config.exclude_groups, config.extra.clone())
    }

    pub fn is_excluded(&self, group: &str) -> bool {
        self.exclude_groups.iter().any(|re| re.is_match(group))
    }

    /// Deduplicated, sorted inventory of the given libraries plus the extras
    pub fn record(&self, libraries: impl IntoIterator<Item = ExternalLibrary>) -> LicenseReport {
        let libraries: BTreeSet<ExternalLibrary> = libraries
            .into_iter()
            .chain(self.extra.iter().cloned())
            .filter(|lib| !self.is_excluded(&lib.group))
            .collect();

        LicenseReport {
            libraries: libraries.into_iter().collect(),
        }
    }
}

/// Attribution inventory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseReport {
    pub libraries: Vec<ExternalLibrary>,
}

impl LicenseReport {
    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Markdown listing grouped by license
    pub fn render_markdown(&self) -> String {
        let mut by_license: BTreeMap<&str, Vec<&ExternalLibrary>> = BTreeMap::new();
        for lib in &self.libraries {
            by_license
                .entry(lib.license.as_deref().unwrap_or(UNKNOWN_LICENSE))
                .or_default()
                .push(lib);
        }

        let mut out = String::from("# Third-party libraries\n");
        let _ = writeln!(out, "\n{} libraries in total.", self.libraries.len());
        for (license, libs) in by_license {
            let _ = writeln!(out, "\n## {}\n", license);
            for lib in libs {
                let _ = writeln!(out, "- `{}`", lib.coordinate());
            }
        }
        out
    }

    pub fn to_json(&self) -> BuildResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BuildError::BuildFailed(format!("cannot serialize license report: {}", e)))
    }

    /// Write the report; `.json` files get JSON, anything else markdown
    pub fn write_to(&self, path: &Path) -> BuildResult<()> {
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => self.to_json()?,
            _ => self.render_markdown(),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        fs::write(path, content).map_err(|e| BuildError::io(path, e))
    }
}
