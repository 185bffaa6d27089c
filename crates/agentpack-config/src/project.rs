//! Assembly configuration (agentpack.toml)
//!
//! Describes how the agent distribution is put together: manifest
//! metadata, output locations, isolation layout, relocation rules and
//! duplicate-entry policy.

use crate::{defaults, read_config_file, ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Assembly configuration from agentpack.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AssemblyConfig {
    /// Manifest metadata
    pub package: PackageConfig,

    /// Output locations
    #[serde(default)]
    pub output: OutputConfig,

    /// Isolated layer layout
    #[serde(default)]
    pub isolation: IsolationConfig,

    /// Bootstrap routing
    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    /// Relocation rules; replaces the default table when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relocation: Option<Vec<RelocationConfig>>,

    /// Per-path duplicate policy; replaces the default overrides when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicates: Option<BTreeMap<String, DuplicatePolicy>>,

    /// Attribution report settings
    #[serde(default)]
    pub license: LicenseConfig,
}

/// Manifest metadata of the produced artifacts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    /// Implementation-Title and artifact base name
    pub name: String,

    /// Implementation-Version
    pub version: String,

    /// Implementation-Vendor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    /// Bootstrap entry class for Premain-Class, Agent-Class and Main-Class
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
}

/// Output locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Final artifact directory (default: "build/libs")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Intermediate archive directory (default: "build/tmp/agentpack")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,

    /// Leave the version out of artifact file names
    #[serde(default)]
    pub remove_version: bool,

    /// Directory copied to META-INF/licenses/ in the bootstrap layer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub licenses_dir: Option<PathBuf>,
}

/// Isolated layer layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct IsolationConfig {
    /// Isolation directory (default: "inst")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Renamed class extension (default: "classdata")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_suffix: Option<String>,

    /// Root-level paths allowed to stay outside the isolation prefix
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub preserve: Vec<String>,
}

/// Bootstrap routing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BootstrapConfig {
    /// Package prefixes of agent-bound modules routed to the bootstrap layer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<Vec<String>>,
}

/// A package relocation rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RelocationConfig {
    /// Source package (or class) prefix
    pub from: String,

    /// Target package (or class) prefix
    pub to: String,

    /// Sub-prefixes of `from` left untouched
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

/// What to do when two modules contribute the same path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Concatenate line-wise, dropping repeated lines
    Merge,
    /// Abort the aggregation
    Fail,
    /// Leave the entry out entirely
    Drop,
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Fail => write!(f, "fail"),
            Self::Drop => write!(f, "drop"),
        }
    }
}

/// Attribution report settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LicenseConfig {
    /// Group regexes left out of the report (full match)
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_groups: Vec<String>,

    /// Report file written after a successful build
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PathBuf>,

    /// Libraries copied into modules that need explicit attribution
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<crate::manifest::ExternalLibrary>,
}

impl RelocationConfig {
    /// Create a rule without exclusions
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            exclude: Vec::new(),
        }
    }

    /// Set exclusion sub-prefixes
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Validate names and the sub-prefix invariant of exclusions
    pub fn validate(&self) -> ConfigResult<()> {
        if !is_valid_class_prefix(&self.from) {
            return Err(ConfigError::InvalidRelocation {
                from: self.from.clone(),
                reason: "source is not a dotted package or class name".to_string(),
            });
        }
        if !is_valid_class_prefix(&self.to) {
            return Err(ConfigError::InvalidRelocation {
                from: self.from.clone(),
                reason: format!("target '{}' is not a dotted package or class name", self.to),
            });
        }
        for exclude in &self.exclude {
            let is_sub_prefix = exclude.len() > self.from.len()
                && exclude.starts_with(&self.from)
                && exclude[self.from.len()..].starts_with(['.', '$']);
            if !is_sub_prefix {
                return Err(ConfigError::InvalidRelocation {
                    from: self.from.clone(),
                    reason: format!("exclusion '{}' is not a sub-prefix of the source", exclude),
                });
            }
        }
        Ok(())
    }
}

impl AssemblyConfig {
    /// Create a config with defaults for everything but the package metadata
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package: PackageConfig {
                name: name.into(),
                version: version.into(),
                vendor: None,
                entry_point: None,
            },
            output: OutputConfig::default(),
            isolation: IsolationConfig::default(),
            bootstrap: BootstrapConfig::default(),
            relocation: None,
            duplicates: None,
            license: LicenseConfig::default(),
        }
    }

    /// Load assembly configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = read_config_file(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the assembly configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.package.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "package.name".to_string(),
                reason: "name cannot be empty".to_string(),
            });
        }

        if !is_valid_version(&self.package.version) {
            return Err(ConfigError::InvalidVersion(self.package.version.clone()));
        }

        // these end up as manifest header values
        let headers = [
            ("package.name", Some(&self.package.name)),
            ("package.version", Some(&self.package.version)),
            ("package.vendor", self.package.vendor.as_ref()),
        ];
        for (field, value) in headers {
            if value.is_some_and(|v| v.contains(['\r', '\n', '\0'])) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "line breaks are not allowed in manifest attributes".to_string(),
                });
            }
        }

        if let Some(entry_point) = &self.package.entry_point {
            if !is_valid_class_prefix(entry_point) {
                return Err(ConfigError::InvalidValue {
                    field: "package.entry_point".to_string(),
                    reason: format!("'{}' is not a class name", entry_point),
                });
            }
        }

        let prefix = self.isolation_prefix();
        if !is_valid_relative_dir(prefix) {
            return Err(ConfigError::InvalidValue {
                field: "isolation.prefix".to_string(),
                reason: format!("'{}' must be a non-empty relative path", prefix),
            });
        }

        let suffix = self.class_suffix();
        if suffix.is_empty() || suffix == "class" || suffix.contains(['/', '.']) {
            return Err(ConfigError::InvalidValue {
                field: "isolation.class_suffix".to_string(),
                reason: format!("'{}' cannot be used as a class extension", suffix),
            });
        }

        for visible in self.bootstrap_visible() {
            if !is_valid_class_prefix(&visible) {
                return Err(ConfigError::InvalidValue {
                    field: "bootstrap.visible".to_string(),
                    reason: format!("'{}' is not a package prefix", visible),
                });
            }
        }

        for rule in self.relocations() {
            rule.validate()?;
        }

        for pattern in self.duplicate_overrides().keys() {
            glob::Pattern::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                field: "duplicates".to_string(),
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        }

        for group in &self.license.exclude_groups {
            regex::Regex::new(group).map_err(|e| ConfigError::InvalidPattern {
                field: "license.exclude_groups".to_string(),
                pattern: group.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    /// Effective isolation prefix
    pub fn isolation_prefix(&self) -> &str {
        self.isolation
            .prefix
            .as_deref()
            .unwrap_or(defaults::ISOLATION_PREFIX)
    }

    /// Effective renamed class extension
    pub fn class_suffix(&self) -> &str {
        self.isolation
            .class_suffix
            .as_deref()
            .unwrap_or(defaults::CLASS_SUFFIX)
    }

    /// Effective bootstrap entry class
    pub fn entry_point(&self) -> &str {
        self.package
            .entry_point
            .as_deref()
            .unwrap_or(defaults::ENTRY_POINT)
    }

    /// Effective relocation rules
    pub fn relocations(&self) -> Vec<RelocationConfig> {
        self.relocation
            .clone()
            .unwrap_or_else(defaults::relocations)
    }

    /// Effective bootstrap-visible package prefixes
    pub fn bootstrap_visible(&self) -> Vec<String> {
        self.bootstrap
            .visible
            .clone()
            .unwrap_or_else(defaults::bootstrap_visible)
    }

    /// Effective duplicate-policy overrides
    pub fn duplicate_overrides(&self) -> BTreeMap<String, DuplicatePolicy> {
        self.duplicates
            .clone()
            .unwrap_or_else(defaults::duplicate_overrides)
    }

    /// Effective output directory
    pub fn output_dir(&self) -> PathBuf {
        self.output
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(defaults::OUTPUT_DIR))
    }

    /// Effective intermediate archive directory
    pub fn work_dir(&self) -> PathBuf {
        self.output
            .work_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(defaults::WORK_DIR))
    }
}

/// Check for a dotted Java name such as `a.b.C` or `a.b.C$Inner`
pub(crate) fn is_valid_class_prefix(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        })
}

fn is_valid_relative_dir(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

/// Basic version validation: dotted numeric core with optional qualifier
fn is_valid_version(version: &str) -> bool {
    let core = version.split(['-', '+']).next().unwrap_or("");
    let parts: Vec<&str> = core.split('.').collect();
    !core.is_empty()
        && parts.len() <= 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}
