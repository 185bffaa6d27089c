/// Assembly pipeline error types
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Module '{module}' has no recognized role tag (found {})", .tag.as_deref().unwrap_or("none"))]
    Classification { module: String, tag: Option<String> },

    #[error("Class '{class}' matches more than one relocation rule: {}", .rules.join(", "))]
    RelocationAmbiguity { class: String, rules: Vec<String> },

    #[error("Duplicate entry '{path}' contributed by '{first}' and '{second}'")]
    DuplicatePathConflict {
        path: String,
        first: String,
        second: String,
    },

    #[error("Isolated entry '{path}' violates isolation prefix '{prefix}'")]
    IsolationIntegrity { path: String, prefix: String },

    #[error("Entry '{path}' from {layer} collides with an earlier layer; a module was classified into the wrong bucket")]
    AssemblyCollision { path: String, layer: String },

    #[error("Invalid class file '{path}': {reason}")]
    InvalidClassFile { path: String, reason: String },

    #[error("Module not found: {module}")]
    ModuleNotFound { module: String },

    #[error("Module declared twice: {module}")]
    DuplicateModule { module: String },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Archive error at {path}: {error}")]
    Archive {
        path: PathBuf,
        error: zip::result::ZipError,
    },

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] agentpack_config::ConfigError),

    #[error("Build failed: {0}")]
    BuildFailed(String),
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create an archive error with path context
    pub fn archive(path: impl Into<PathBuf>, error: zip::result::ZipError) -> Self {
        Self::Archive {
            path: path.into(),
            error,
        }
    }

    /// Create an invalid class file error
    pub fn invalid_class(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidClassFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a duplicate path error
    pub fn duplicate(
        path: impl Into<String>,
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        Self::DuplicatePathConflict {
            path: path.into(),
            first: first.into(),
            second: second.into(),
        }
    }
}
