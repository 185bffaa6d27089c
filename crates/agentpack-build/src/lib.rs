//! Java agent artifact composition
//!
//! Turns a set of compiled modules into the two distributable agent jars:
//! - Module classification into bootstrap, base-agent and full-agent buckets
//! - Package relocation of class files, service files and resources
//! - Deterministic bucket aggregation with duplicate-path policy
//! - Class isolation under a prefix for the agent class loader
//! - Final assembly with the agent manifest
//! - Third-party attribution inventory

pub mod aggregator;
pub mod archive;
pub mod assembler;
pub mod build_order;
pub mod classfile;
pub mod classifier;
pub mod error;
pub mod isolator;
pub mod license;
pub mod module;
pub mod pipeline;
pub mod relocation;

// Re-export main types
pub use aggregator::{
    merge_lines, AggregationStats, Aggregator, DuplicateRules, IntermediateArchive, LoadedModule,
};
pub use archive::{Archive, ArchiveEntry};
pub use assembler::{
    ArtifactKind, ArtifactMetadata, Assembler, FinalArtifact, JarManifest, MANIFEST_PATH,
};
pub use build_order::{ModuleGraph, ModuleNode};
pub use classfile::{remap_class, ConstantPool};
pub use classifier::{classify, Bucket, BucketAssignment, BucketPlan};
pub use error::{BuildError, BuildResult};
pub use isolator::{IsolatedArchive, Isolator};
pub use license::{LicenseRecorder, LicenseReport};
pub use module::{
    DeclaredDependencies, DependencyResolver, ManifestModuleProvider, Module, ModuleProvider,
    RoleTag,
};
pub use pipeline::{
    Artifacts, BuildOutcome, BuildPlan, BuildStats, Intermediates, Pipeline, PipelineConfig,
    PlanSummary,
};
pub use relocation::{RelocationRule, RelocationRuleSet};

// Re-export configuration types for convenience
pub use agentpack_config::{AssemblyConfig, ExternalLibrary};
