/// Final artifact assembly and manifest handling
use crate::aggregator::IntermediateArchive;
use crate::archive::{Archive, ArchiveEntry};
use crate::error::{BuildError, BuildResult};
use crate::isolator::IsolatedArchive;
use agentpack_config::AssemblyConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Path of the jar manifest
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Maximum manifest line length in bytes, excluding the line break
const MANIFEST_LINE_WIDTH: usize = 72;

/// Kind of final artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Bootstrap layer plus every instrumentation
    Full,
    /// Bootstrap layer plus the base agent only
    Base,
}

impl ArtifactKind {
    /// Artifact file name for a package name and version
    pub fn file_name(&self, name: &str, version: &str, remove_version: bool) -> String {
        let mut file_name = name.to_string();
        if !remove_version {
            file_name.push('-');
            file_name.push_str(version);
        }
        if *self == Self::Base {
            file_name.push_str("-base");
        }
        file_name.push_str(".jar");
        file_name
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Base => write!(f, "base"),
        }
    }
}

/// Main section of a jar manifest, in attribute order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JarManifest {
    attributes: Vec<(String, String)>,
}

impl Default for JarManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl JarManifest {
    /// Manifest with only `Manifest-Version`
    pub fn new() -> Self {
        Self {
            attributes: vec![("Manifest-Version".to_string(), "1.0".to_string())],
        }
    }

    /// Manifest of a runnable agent jar
    pub fn for_agent(config: &AssemblyConfig) -> Self {
        let mut manifest = Self::new();
        manifest.insert("Implementation-Title", &config.package.name);
        manifest.insert("Implementation-Version", &config.package.version);
        if let Some(vendor) = &config.package.vendor {
            manifest.insert("Implementation-Vendor", vendor);
        }

        let entry_point = config.entry_point();
        manifest.insert("Main-Class", entry_point);
        manifest.insert("Agent-Class", entry_point);
        manifest.insert("Premain-Class", entry_point);
        manifest.insert("Can-Redefine-Classes", "true");
        manifest.insert("Can-Retransform-Classes", "true");
        manifest
    }

    /// Set an attribute, replacing an existing value in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Render with CRLF line breaks and 72-byte continuation wrapping
    pub fn render(&self) -> Vec<u8> {
        let mut out = String::new();
        for (key, value) in &self.attributes {
            let line = format!("{}: {}", key, value);
            let mut rest = line.as_str();
            let mut width = MANIFEST_LINE_WIDTH;
            loop {
                let cut = floor_char_boundary(rest, width);
                out.push_str(&rest[..cut]);
                out.push_str("\r\n");
                rest = &rest[cut..];
                if rest.is_empty() {
                    break;
                }
                out.push(' ');
                width = MANIFEST_LINE_WIDTH - 1;
            }
        }
        out.push_str("\r\n");
        out.into_bytes()
    }

    /// Parse the main section of a manifest
    pub fn parse(bytes: &[u8]) -> BuildResult<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| BuildError::BuildFailed(format!("manifest is not UTF-8: {}", e)))?;

        let mut lines: Vec<String> = Vec::new();
        for raw in text.split('\n') {
            let raw = raw.strip_suffix('\r').unwrap_or(raw);
            if raw.is_empty() {
                // main section ends at the first blank line
                break;
            }
            match (raw.strip_prefix(' '), lines.last_mut()) {
                (Some(continuation), Some(last)) => last.push_str(continuation),
                _ => lines.push(raw.to_string()),
            }
        }

        let attributes = lines
            .into_iter()
            .map(|line| {
                line.split_once(": ")
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .ok_or_else(|| {
                        BuildError::BuildFailed(format!("malformed manifest line '{}'", line))
                    })
            })
            .collect::<BuildResult<Vec<_>>>()?;

        Ok(Self { attributes })
    }
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    (0..=index)
        .rev()
        .find(|i| s.is_char_boundary(*i))
        .unwrap_or(0)
}

/// A composed, publishable archive
#[derive(Debug, Clone)]
pub struct FinalArtifact {
    pub kind: ArtifactKind,
    pub archive: Archive,
}

impl FinalArtifact {
    pub fn to_jar_bytes(&self) -> BuildResult<Vec<u8>> {
        self.archive.to_jar_bytes()
    }

    /// Manifest of the artifact, if present
    pub fn manifest(&self) -> Option<BuildResult<JarManifest>> {
        self.archive
            .get(MANIFEST_PATH)
            .map(|entry| JarManifest::parse(&entry.data))
    }
}

/// Metadata about a written artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    /// Lowercase hex SHA-256 of the jar bytes
    pub sha256: String,
    pub entry_count: usize,
    /// Jar size in bytes
    pub size: u64,
}

impl ArtifactMetadata {
    /// Describe serialized artifact bytes destined for `path`
    pub fn compute(kind: ArtifactKind, path: &Path, bytes: &[u8], entry_count: usize) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            kind,
            path: path.to_path_buf(),
            sha256: format!("{:x}", hasher.finalize()),
            entry_count,
            size: bytes.len() as u64,
        }
    }

    /// Path of the checksum sidecar file
    pub fn sidecar_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".sha256");
        PathBuf::from(name)
    }

    /// Write the artifact bytes and the checksum sidecar
    pub fn write(&self, bytes: &[u8]) -> BuildResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        fs::write(&self.path, bytes).map_err(|e| BuildError::io(&self.path, e))?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sidecar = self.sidecar_path();
        fs::write(&sidecar, format!("{}  {}\n", self.sha256, file_name))
            .map_err(|e| BuildError::io(&sidecar, e))
    }

    /// Remove the artifact and its sidecar, ignoring files that are already gone
    pub fn remove(&self) {
        let _ = fs::remove_file(&self.path);
        let _ = fs::remove_file(self.sidecar_path());
    }
}

/// Composes the bootstrap layer with isolated layers
#[derive(Debug, Clone)]
pub struct Assembler {
    manifest: JarManifest,
}

impl Assembler {
    pub fn new(manifest: JarManifest) -> Self {
        Self { manifest }
    }

    pub fn manifest(&self) -> &JarManifest {
        &self.manifest
    }

    /// Build one final artifact: manifest first, then the flat bootstrap
    /// layer, then each isolated layer in the given order
    pub fn assemble(
        &self,
        kind: ArtifactKind,
        bootstrap: &IntermediateArchive,
        isolated: &[&IsolatedArchive],
    ) -> BuildResult<FinalArtifact> {
        let mut archive = Archive::new();
        archive
            .push(ArchiveEntry::new(
                MANIFEST_PATH,
                self.manifest.render(),
                "manifest",
            ))
            .map_err(|e| BuildError::AssemblyCollision {
                path: e.path,
                layer: "manifest".to_string(),
            })?;

        let layers = std::iter::once((bootstrap.bucket, &bootstrap.archive))
            .chain(isolated.iter().map(|layer| (layer.bucket, &layer.archive)));

        for (bucket, layer) in layers {
            for entry in layer.entries() {
                archive
                    .push(entry.clone())
                    .map_err(|e| BuildError::AssemblyCollision {
                        path: e.path,
                        layer: bucket.to_string(),
                    })?;
            }
        }

        info!("Assembled {} artifact ({} entries)", kind, archive.len());
        Ok(FinalArtifact { kind, archive })
    }
}
