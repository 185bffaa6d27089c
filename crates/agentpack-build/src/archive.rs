//! In-memory archives and deterministic jar I/O
//!
//! An [`Archive`] keeps entries in insertion order. Writing one always
//! produces the same bytes for the same entries: fixed 1980-01-01
//! timestamps, `0o644` permissions, Deflate, no directory entries.

use crate::error::{BuildError, BuildResult};
use crate::module::Module;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::Path;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// A single file entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Slash-separated path inside the archive
    pub path: String,
    /// File contents
    pub data: Vec<u8>,
    /// Module (or layer) that contributed the entry
    pub origin: String,
}

impl ArchiveEntry {
    pub fn new(path: impl Into<String>, data: Vec<u8>, origin: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            data,
            origin: origin.into(),
        }
    }

    /// Whether the entry is a compiled class
    pub fn is_class(&self) -> bool {
        self.path.ends_with(".class")
    }
}

/// Ordered set of entries with unique paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    entries: Vec<ArchiveEntry>,
    index: HashMap<String, usize>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; hands it back if the path is already taken
    pub fn push(&mut self, entry: ArchiveEntry) -> Result<(), ArchiveEntry> {
        if self.index.contains_key(&entry.path) {
            return Err(entry);
        }
        self.index.insert(entry.path.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&ArchiveEntry> {
        self.index.get(path).map(|i| &self.entries[*i])
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut ArchiveEntry> {
        self.index.get(path).map(|i| &mut self.entries[*i])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Entry paths in insertion order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    /// Read a jar from disk, keeping its entry order
    pub fn open(path: &Path) -> BuildResult<Self> {
        let origin = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut archive = Self::new();
        for (name, data) in read_jar(path)? {
            // jars written by other tools may repeat names; first one wins like the JVM
            let _ = archive.push(ArchiveEntry::new(name, data, origin.clone()));
        }
        Ok(archive)
    }

    /// Serialize to jar bytes
    pub fn to_jar_bytes(&self) -> BuildResult<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = entry_options();

        for entry in &self.entries {
            writer
                .start_file(entry.path.as_str(), options)
                .map_err(|e| BuildError::archive(&entry.path, e))?;
            writer.write_all(&entry.data)?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| BuildError::archive("<jar>", e))?;
        Ok(cursor.into_inner())
    }

    /// Write the archive as a jar file, creating parent directories
    pub fn write_to(&self, path: &Path) -> BuildResult<()> {
        let bytes = self.to_jar_bytes()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        fs::write(path, bytes).map_err(|e| BuildError::io(path, e))
    }
}

/// Largest buffer reserved from a zip header's declared size
const MAX_PREALLOCATION: u64 = 1 << 20;

fn entry_options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644)
}

/// Read every file entry of a jar, in archive order
fn read_jar(path: &Path) -> BuildResult<Vec<(String, Vec<u8>)>> {
    let file = File::open(path).map_err(|e| BuildError::io(path, e))?;
    let mut zip = ZipArchive::new(file).map_err(|e| BuildError::archive(path, e))?;

    let mut entries = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let mut file = zip.by_index(i).map_err(|e| BuildError::archive(path, e))?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().trim_start_matches('/').to_string();
        // the declared size is untrusted, cap the up-front allocation
        let mut data = Vec::with_capacity(file.size().min(MAX_PREALLOCATION) as usize);
        file.read_to_end(&mut data)
            .map_err(|e| BuildError::io(path, e))?;
        entries.push((name, data));
    }
    Ok(entries)
}

/// Read every file under a directory, keyed by slash-separated relative path
fn read_dir_tree(root: &Path, into: &mut BTreeMap<String, Vec<u8>>) -> BuildResult<()> {
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            BuildError::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| BuildError::BuildFailed(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let data = fs::read(entry.path()).map_err(|e| BuildError::io(entry.path(), e))?;
        into.insert(name, data);
    }
    Ok(())
}

/// Read a directory tree as entries under `prefix`, in path order
pub fn read_directory(root: &Path, prefix: &str, origin: &str) -> BuildResult<Vec<ArchiveEntry>> {
    let mut files = BTreeMap::new();
    read_dir_tree(root, &mut files)?;
    Ok(files
        .into_iter()
        .map(|(path, data)| ArchiveEntry::new(format!("{}{}", prefix, path), data, origin))
        .collect())
}

/// Load a module's entries: archive first, resource directory overlaid, in path order
pub fn read_module(module: &Module) -> BuildResult<Vec<ArchiveEntry>> {
    let mut files = BTreeMap::new();

    if module.archive.is_dir() {
        read_dir_tree(&module.archive, &mut files)?;
    } else {
        for (name, data) in read_jar(&module.archive)? {
            // first of repeated names wins, as in `Archive::open`
            files.entry(name).or_insert(data);
        }
    }

    if let Some(resources) = &module.resources {
        if resources.is_dir() {
            read_dir_tree(resources, &mut files)?;
        }
    }

    Ok(files
        .into_iter()
        .map(|(path, data)| ArchiveEntry::new(path, data, module.id.clone()))
        .collect())
}
