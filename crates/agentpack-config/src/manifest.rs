//! Module list (modules.toml)
//!
//! The hand-over format of the module provider: every compiled module
//! with its role tag, compiled output, resources and declared
//! dependencies.

use crate::{read_config_file, ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// List of modules taking part in an assembly
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ModuleManifest {
    /// Modules in declaration order
    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleEntry>,
}

/// A single compiled module
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModuleEntry {
    /// Module identifier (e.g. ":javaagent-tooling")
    pub name: String,

    /// Raw role tag; interpreted by the classifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Jar file or directory of compiled classes
    pub archive: PathBuf,

    /// Resource directory overlaid on the archive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<PathBuf>,

    /// Identifiers of modules this module depends on
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// External libraries bundled through this module
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external: Vec<ExternalLibrary>,
}

/// A third-party library, as reported by the dependency resolver
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(deny_unknown_fields)]
pub struct ExternalLibrary {
    pub group: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

impl ExternalLibrary {
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version: version.into(),
            license: None,
        }
    }

    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        self.license = Some(license.into());
        self
    }

    /// Maven-style coordinate `group:name:version`
    pub fn coordinate(&self) -> String {
        format!("{}:{}:{}", self.group, self.name, self.version)
    }
}

impl ModuleManifest {
    /// Load a module list from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = read_config_file(path)?;
        let manifest: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate names and uniqueness.
    ///
    /// Role tags are deliberately not checked here: an unknown tag is a
    /// classification error reported against the module.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for module in &self.modules {
            if module.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "module.name".to_string(),
                    reason: "name cannot be empty".to_string(),
                });
            }
            if !seen.insert(module.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "module.name".to_string(),
                    reason: format!("module '{}' is declared twice", module.name),
                });
            }
            if module.archive.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("module '{}' archive", module.name),
                    reason: "archive path cannot be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Number of declared modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_module_list() {
        let manifest: ModuleManifest = toml::from_str(
            r#"
[[module]]
name = ":javaagent-tooling"
role = "base-agent"
archive = "tooling.jar"
dependencies = [":javaagent-extension-api"]

[[module.external]]
group = "net.bytebuddy"
name = "byte-buddy-dep"
version = "1.14.8"
license = "Apache-2.0"

[[module]]
name = ":javaagent-extension-api"
role = "base-agent"
archive = "extension-api/classes"
resources = "extension-api/resources"
"#,
        )
        .unwrap();

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.modules[0].external.len(), 1);
        assert_eq!(
            manifest.modules[0].external[0].coordinate(),
            "net.bytebuddy:byte-buddy-dep:1.14.8"
        );
        assert_eq!(
            manifest.modules[1].resources,
            Some(PathBuf::from("extension-api/resources"))
        );
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_duplicate_module_name_rejected() {
        let manifest: ModuleManifest = toml::from_str(
            r#"
[[module]]
name = "a"
archive = "a.jar"

[[module]]
name = "a"
archive = "b.jar"
"#,
        )
        .unwrap();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_missing_role_is_not_a_parse_error() {
        let manifest: ModuleManifest = toml::from_str(
            r#"
[[module]]
name = "untagged"
archive = "untagged.jar"
"#,
        )
        .unwrap();
        assert!(manifest.modules[0].role.is_none());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_external_library_ordering() {
        let mut libs = vec![
            ExternalLibrary::new("org.b", "x", "1"),
            ExternalLibrary::new("org.a", "y", "2"),
            ExternalLibrary::new("org.a", "x", "3"),
        ];
        libs.sort();
        assert_eq!(libs[0].coordinate(), "org.a:x:3");
        assert_eq!(libs[2].coordinate(), "org.b:x:1");
    }
}
