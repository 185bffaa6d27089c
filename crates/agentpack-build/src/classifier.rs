//! Module classification into aggregation buckets
//!
//! A module's role tag decides which buckets its archive is copied into:
//!
//! | role                      | bootstrap | base-agent | full-agent |
//! |---------------------------|-----------|------------|------------|
//! | `Bootstrap`               | yes       |            |            |
//! | `BaseAgent`               |           | yes        | yes        |
//! | `FullAgentInstrumentation`|           |            | yes        |
//!
//! `full-agent` is therefore always a superset of `base-agent`.

use crate::error::{BuildError, BuildResult};
use crate::module::{Module, RoleTag};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Aggregation bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Bucket {
    /// Flat layer loaded by the bootstrap class loader
    Bootstrap,
    /// Agent machinery plus required instrumentations
    BaseAgent,
    /// Base agent plus every instrumentation module
    FullAgent,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Bootstrap, Bucket::BaseAgent, Bucket::FullAgent];

    /// Bucket name used in logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::BaseAgent => "base-agent",
            Self::FullAgent => "full-agent",
        }
    }

    /// File name of the intermediate archive
    pub fn archive_file_name(&self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrapLibs.jar",
            Self::BaseAgent => "baseJavaagentLibs-relocated.jar",
            Self::FullAgent => "javaagentLibs-relocated.jar",
        }
    }

    /// Whether the bucket ends up in the isolated agent class loader
    pub fn is_isolated(&self) -> bool {
        !matches!(self, Self::Bootstrap)
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Buckets a single module is copied into
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketAssignment {
    pub module: String,
    pub role: RoleTag,
    pub buckets: Vec<Bucket>,
}

/// Assign a module to its buckets
pub fn classify(module: &Module) -> BuildResult<BucketAssignment> {
    let role = module.role().ok_or_else(|| BuildError::Classification {
        module: module.id.clone(),
        tag: module.tag.clone(),
    })?;

    let buckets = match role {
        RoleTag::Bootstrap => vec![Bucket::Bootstrap],
        RoleTag::BaseAgent => vec![Bucket::BaseAgent, Bucket::FullAgent],
        RoleTag::FullAgentInstrumentation => vec![Bucket::FullAgent],
    };

    Ok(BucketAssignment {
        module: module.id.clone(),
        role,
        buckets,
    })
}

/// Bucket membership of every module of a build
#[derive(Debug, Clone, Default)]
pub struct BucketPlan {
    assignments: Vec<BucketAssignment>,
    bootstrap: Vec<Module>,
    base_agent: Vec<Module>,
    full_agent: Vec<Module>,
}

impl BucketPlan {
    /// Classify every module; declaration order is kept inside each bucket
    pub fn from_modules(modules: &[Module]) -> BuildResult<Self> {
        let mut plan = Self::default();
        let mut seen = HashSet::new();

        for module in modules {
            if !seen.insert(module.id.as_str()) {
                return Err(BuildError::DuplicateModule {
                    module: module.id.clone(),
                });
            }

            let assignment = classify(module)?;
            for bucket in &assignment.buckets {
                plan.bucket_mut(*bucket).push(module.clone());
            }
            plan.assignments.push(assignment);
        }

        Ok(plan)
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<Module> {
        match bucket {
            Bucket::Bootstrap => &mut self.bootstrap,
            Bucket::BaseAgent => &mut self.base_agent,
            Bucket::FullAgent => &mut self.full_agent,
        }
    }

    /// Modules of one bucket, in declaration order
    pub fn modules(&self, bucket: Bucket) -> &[Module] {
        match bucket {
            Bucket::Bootstrap => &self.bootstrap,
            Bucket::BaseAgent => &self.base_agent,
            Bucket::FullAgent => &self.full_agent,
        }
    }

    /// Per-module assignments, in declaration order
    pub fn assignments(&self) -> &[BucketAssignment] {
        &self.assignments
    }

    /// Total number of classified modules
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}
