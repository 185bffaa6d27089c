//! Compiled modules and the provider interfaces that hand them over
use crate::error::{BuildError, BuildResult};
use agentpack_config::{ExternalLibrary, ModuleManifest};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Role a module plays in the agent distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoleTag {
    /// Loaded by the bootstrap class loader, visible to application code
    Bootstrap,
    /// Agent machinery and required instrumentations
    BaseAgent,
    /// Optional instrumentation, only in the full agent
    FullAgentInstrumentation,
}

impl RoleTag {
    /// Parse a role tag as written in a module declaration
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "bootstrap" => Some(Self::Bootstrap),
            "base-agent" | "base" | "agent" => Some(Self::BaseAgent),
            "instrumentation" | "full-agent" | "full-agent-instrumentation" | "sdk-extension" => {
                Some(Self::FullAgentInstrumentation)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for RoleTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bootstrap => write!(f, "bootstrap"),
            Self::BaseAgent => write!(f, "base-agent"),
            Self::FullAgentInstrumentation => write!(f, "instrumentation"),
        }
    }
}

/// A named compiled-code unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Module identifier
    pub id: String,
    /// Role tag as declared; `None` when the declaration has none
    pub tag: Option<String>,
    /// Jar file or directory of compiled classes
    pub archive: PathBuf,
    /// Resource directory overlaid on the archive
    pub resources: Option<PathBuf>,
    /// Identifiers of modules this module depends on
    pub dependencies: Vec<String>,
    /// External libraries bundled through this module
    pub external: Vec<ExternalLibrary>,
}

impl Module {
    /// Create an untagged module
    pub fn new(id: impl Into<String>, archive: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            tag: None,
            archive: archive.into(),
            resources: None,
            dependencies: Vec::new(),
            external: Vec::new(),
        }
    }

    /// Set the raw role tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Set the role tag from a parsed role
    pub fn with_role(self, role: RoleTag) -> Self {
        self.with_tag(role.to_string())
    }

    /// Set the resource directory
    pub fn with_resources(mut self, resources: impl Into<PathBuf>) -> Self {
        self.resources = Some(resources.into());
        self
    }

    /// Set dependencies
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Set bundled external libraries
    pub fn with_external(mut self, external: Vec<ExternalLibrary>) -> Self {
        self.external = external;
        self
    }

    /// Parsed role, if the tag is recognized
    pub fn role(&self) -> Option<RoleTag> {
        self.tag.as_deref().and_then(RoleTag::parse)
    }
}

/// Supplies the modules of one build invocation
pub trait ModuleProvider {
    /// Modules in declaration order
    fn modules(&self) -> BuildResult<Vec<Module>>;
}

/// Supplies the external libraries used for attribution
pub trait DependencyResolver {
    /// Transitive external libraries of the given modules
    fn external_libraries(&self, modules: &[Module]) -> BuildResult<Vec<ExternalLibrary>>;
}

impl ModuleProvider for Vec<Module> {
    fn modules(&self) -> BuildResult<Vec<Module>> {
        Ok(self.clone())
    }
}

/// Resolver that reports the libraries each module declares
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredDependencies;

impl DependencyResolver for DeclaredDependencies {
    fn external_libraries(&self, modules: &[Module]) -> BuildResult<Vec<ExternalLibrary>> {
        Ok(modules
            .iter()
            .flat_map(|m| m.external.iter().cloned())
            .collect())
    }
}

/// Module provider backed by a modules.toml file
#[derive(Debug, Clone)]
pub struct ManifestModuleProvider {
    manifest: ModuleManifest,
    base_dir: PathBuf,
}

impl ManifestModuleProvider {
    /// Wrap an already parsed module list; paths resolve against `base_dir`
    pub fn new(manifest: ModuleManifest, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            base_dir: base_dir.into(),
        }
    }

    /// Load a module list file
    pub fn from_file(path: &Path) -> BuildResult<Self> {
        let manifest = ModuleManifest::load_from_file(path)?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self::new(manifest, base_dir))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl ModuleProvider for ManifestModuleProvider {
    fn modules(&self) -> BuildResult<Vec<Module>> {
        let mut modules = Vec::with_capacity(self.manifest.len());
        for entry in &self.manifest.modules {
            if modules.iter().any(|m: &Module| m.id == entry.name) {
                return Err(BuildError::DuplicateModule {
                    module: entry.name.clone(),
                });
            }
            modules.push(Module {
                id: entry.name.clone(),
                tag: entry.role.clone(),
                archive: self.resolve(&entry.archive),
                resources: entry.resources.as_deref().map(|r| self.resolve(r)),
                dependencies: entry.dependencies.clone(),
                external: entry.external.clone(),
            });
        }
        Ok(modules)
    }
}

impl DependencyResolver for ManifestModuleProvider {
    fn external_libraries(&self, modules: &[Module]) -> BuildResult<Vec<ExternalLibrary>> {
        DeclaredDependencies.external_libraries(modules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentpack_config::ModuleEntry;

    #[test]
    fn test_role_tag_parse() {
        assert_eq!(RoleTag::parse("bootstrap"), Some(RoleTag::Bootstrap));
        assert_eq!(RoleTag::parse("Base-Agent"), Some(RoleTag::BaseAgent));
        assert_eq!(
            RoleTag::parse("instrumentation"),
            Some(RoleTag::FullAgentInstrumentation)
        );
        assert_eq!(
            RoleTag::parse("sdk-extension"),
            Some(RoleTag::FullAgentInstrumentation)
        );
        assert_eq!(RoleTag::parse("library"), None);
        assert_eq!(RoleTag::parse(""), None);
    }

    #[test]
    fn test_role_display_round_trips() {
        for role in [
            RoleTag::Bootstrap,
            RoleTag::BaseAgent,
            RoleTag::FullAgentInstrumentation,
        ] {
            assert_eq!(RoleTag::parse(&role.to_string()), Some(role));
        }
    }

    #[test]
    fn test_module_role() {
        let module = Module::new("a", "a.jar").with_role(RoleTag::BaseAgent);
        assert_eq!(module.role(), Some(RoleTag::BaseAgent));
        assert!(Module::new("b", "b.jar").role().is_none());
        assert!(Module::new("c", "c.jar").with_tag("weird").role().is_none());
    }

    #[test]
    fn test_manifest_provider_resolves_paths() {
        let manifest = ModuleManifest {
            modules: vec![ModuleEntry {
                name: ":tooling".to_string(),
                role: Some("base-agent".to_string()),
                archive: PathBuf::from("tooling.jar"),
                resources: Some(PathBuf::from("res")),
                dependencies: vec![],
                external: vec![ExternalLibrary::new("net.bytebuddy", "byte-buddy", "1.14.8")],
            }],
        };
        let provider = ManifestModuleProvider::new(manifest, "/work");
        let modules = provider.modules().unwrap();

        assert_eq!(modules[0].archive, PathBuf::from("/work/tooling.jar"));
        assert_eq!(modules[0].resources, Some(PathBuf::from("/work/res")));

        let libs = provider.external_libraries(&modules).unwrap();
        assert_eq!(libs.len(), 1);
    }
}
