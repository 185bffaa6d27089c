//! Shared fixtures: jar writers, minimal class files and scratch projects
#![allow(dead_code)]

use agentpack_build::{
    Archive, ArchiveEntry, AssemblyConfig, Module, Pipeline, PipelineConfig, RoleTag,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Build a minimal valid class file.
///
/// `this` and `super_class` are internal names; `extra` are additional
/// `CONSTANT_Utf8` values (descriptors, string literal payloads, ...).
pub fn class_file(this: &str, super_class: &str, extra: &[&str]) -> Vec<u8> {
    fn utf8(value: &str) -> Vec<u8> {
        let mut entry = vec![1u8];
        entry.extend_from_slice(&(value.len() as u16).to_be_bytes());
        entry.extend_from_slice(value.as_bytes());
        entry
    }

    let mut pool = vec![
        utf8(this),
        vec![7, 0, 1],
        utf8(super_class),
        vec![7, 0, 3],
    ];
    pool.extend(extra.iter().map(|s| utf8(s)));

    let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52];
    bytes.extend_from_slice(&(pool.len() as u16 + 1).to_be_bytes());
    for entry in pool {
        bytes.extend_from_slice(&entry);
    }
    // access flags, this_class, super_class, no interfaces/fields/methods/attributes
    bytes.extend_from_slice(&[0x00, 0x21, 0, 2, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0]);
    bytes
}

/// Class file for a dotted class name extending java.lang.Object
pub fn simple_class(name: &str) -> Vec<u8> {
    class_file(&name.replace('.', "/"), "java/lang/Object", &[])
}

/// Write a jar with the given entries, in order
pub fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let mut archive = Archive::new();
    for (name, data) in entries {
        archive
            .push(ArchiveEntry::new(*name, data.clone(), "fixture"))
            .unwrap();
    }
    archive.write_to(path).unwrap();
}

/// Scratch project holding module jars and build outputs
pub struct Project {
    pub temp: TempDir,
    pub modules: Vec<Module>,
}

impl Project {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
            modules: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Add a module backed by a jar with the given entries
    pub fn module(&mut self, id: &str, role: RoleTag, entries: &[(&str, Vec<u8>)]) -> &mut Self {
        let jar = self.root().join("modules").join(format!("{}.jar", id));
        write_jar(&jar, entries);
        self.modules.push(Module::new(id, jar).with_role(role));
        self
    }

    /// Write a file below the project root
    pub fn file(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn config(&self) -> AssemblyConfig {
        AssemblyConfig::new("agent", "1.0.0")
    }

    pub fn pipeline(&self, config: AssemblyConfig) -> Pipeline {
        Pipeline::new(PipelineConfig::new(config, self.root())).unwrap()
    }

    pub fn full_jar(&self) -> PathBuf {
        self.root().join("build/libs/agent-1.0.0.jar")
    }

    pub fn base_jar(&self) -> PathBuf {
        self.root().join("build/libs/agent-1.0.0-base.jar")
    }
}

/// Read a jar as an in-memory archive
pub fn open(path: &Path) -> Archive {
    Archive::open(path).unwrap()
}

/// Entry paths of a jar, in archive order
pub fn paths(path: &Path) -> Vec<String> {
    open(path).paths().map(str::to_string).collect()
}
