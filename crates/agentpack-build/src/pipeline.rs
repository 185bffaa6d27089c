//! Artifact composition pipeline
//!
//! Stages, each consuming the previous stage's immutable output:
//! load modules, validate the module graph, classify, aggregate the three
//! buckets, isolate the agent buckets, assemble the full and base
//! artifacts, record licenses. Any failure aborts the run before a final
//! artifact is published.
use crate::aggregator::{
    AggregationStats, Aggregator, DuplicateRules, IntermediateArchive, LoadedModule,
};
use crate::archive::read_directory;
use crate::assembler::{ArtifactKind, ArtifactMetadata, Assembler, FinalArtifact, JarManifest};
use crate::build_order::ModuleGraph;
use crate::classifier::{Bucket, BucketAssignment, BucketPlan};
use crate::error::{BuildError, BuildResult};
use crate::isolator::{IsolatedArchive, Isolator};
use crate::license::{LicenseRecorder, LicenseReport};
use crate::module::{DependencyResolver, Module, ModuleProvider};
use crate::relocation::RelocationRuleSet;
use agentpack_config::{AssemblyConfig, LoadedConfig};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Where bundled license texts land in the bootstrap layer
pub const LICENSES_PREFIX: &str = "META-INF/licenses/";

/// Pipeline configuration with every path resolved
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Assembly settings
    pub config: AssemblyConfig,
    /// Final artifact directory
    pub output_dir: PathBuf,
    /// Intermediate archive directory
    pub work_dir: PathBuf,
    /// License texts copied into the bootstrap layer
    pub licenses_dir: Option<PathBuf>,
    /// Attribution report destination
    pub license_report: Option<PathBuf>,
    /// Aggregate and isolate independent buckets in parallel
    pub parallel: bool,
    /// Keep intermediate archives in `work_dir`
    pub write_intermediates: bool,
}

impl PipelineConfig {
    /// Resolve relative paths of `config` against `root`
    pub fn new(config: AssemblyConfig, root: &Path) -> Self {
        let resolve = |path: PathBuf| {
            if path.is_absolute() {
                path
            } else {
                root.join(path)
            }
        };

        Self {
            output_dir: resolve(config.output_dir()),
            work_dir: resolve(config.work_dir()),
            licenses_dir: config.output.licenses_dir.clone().map(resolve),
            license_report: config.license.report.clone().map(resolve),
            parallel: true,
            write_intermediates: true,
            config,
        }
    }

    pub fn from_loaded(loaded: &LoadedConfig) -> Self {
        Self::new(loaded.config.clone(), &loaded.root)
    }

    pub fn with_output_dir(mut self, output_dir: PathBuf) -> Self {
        self.output_dir = output_dir;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_intermediates(mut self, write_intermediates: bool) -> Self {
        self.write_intermediates = write_intermediates;
        self
    }

    /// Destination of one final artifact
    pub fn artifact_path(&self, kind: ArtifactKind) -> PathBuf {
        let package = &self.config.package;
        self.output_dir.join(kind.file_name(
            &package.name,
            &package.version,
            self.config.output.remove_version,
        ))
    }
}

/// Classified, validated module set
#[derive(Debug, Clone)]
pub struct BuildPlan {
    /// Modules in declaration order
    pub modules: Vec<Module>,
    /// Dependency-first module order
    pub build_order: Vec<String>,
    pub buckets: BucketPlan,
}

impl BuildPlan {
    /// Serializable view of the plan
    pub fn summary(&self) -> PlanSummary {
        let buckets = Bucket::ALL
            .iter()
            .map(|bucket| {
                (
                    bucket.name().to_string(),
                    self.buckets
                        .modules(*bucket)
                        .iter()
                        .map(|m| m.id.clone())
                        .collect(),
                )
            })
            .collect();

        PlanSummary {
            assignments: self.buckets.assignments().to_vec(),
            buckets,
            build_order: self.build_order.clone(),
        }
    }
}

/// Bucket membership as printed by the CLI
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub assignments: Vec<BucketAssignment>,
    pub buckets: BTreeMap<String, Vec<String>>,
    pub build_order: Vec<String>,
}

/// Build statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildStats {
    /// Total number of modules
    pub total_modules: usize,
    /// Aggregation counters per bucket
    pub buckets: BTreeMap<String, AggregationStats>,
    /// Time spent reading modules and aggregating
    pub aggregation_time: Duration,
    /// Time spent isolating and assembling
    pub assembly_time: Duration,
    /// Total build time
    pub total_time: Duration,
}

/// Result of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    /// Full artifact first, then base
    pub artifacts: Vec<ArtifactMetadata>,
    /// Intermediate archives written to the work directory
    pub intermediates: Vec<PathBuf>,
    pub licenses: LicenseReport,
    pub stats: BuildStats,
}

/// The three aggregated buckets
#[derive(Debug, Clone)]
pub struct Intermediates {
    pub bootstrap: IntermediateArchive,
    pub base_agent: IntermediateArchive,
    pub full_agent: IntermediateArchive,
}

impl Intermediates {
    pub fn get(&self, bucket: Bucket) -> &IntermediateArchive {
        match bucket {
            Bucket::Bootstrap => &self.bootstrap,
            Bucket::BaseAgent => &self.base_agent,
            Bucket::FullAgent => &self.full_agent,
        }
    }
}

/// Both final artifacts, composed but not yet written
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub full: FinalArtifact,
    pub base: FinalArtifact,
}

fn join<A, B, RA, RB>(parallel: bool, a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    if parallel {
        rayon::join(a, b)
    } else {
        (a(), b())
    }
}

/// Drives one assembly
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    rules: RelocationRuleSet,
    duplicates: DuplicateRules,
    bootstrap_visible: Vec<String>,
    isolator: Isolator,
    assembler: Assembler,
    licenses: LicenseRecorder,
}

impl Pipeline {
    /// Validate the configuration and prepare every stage
    pub fn new(config: PipelineConfig) -> BuildResult<Self> {
        let settings = &config.config;
        settings.validate()?;

        let rules = RelocationRuleSet::from_config(&settings.relocations())?;
        let duplicates = DuplicateRules::new(&settings.duplicate_overrides())?;
        let isolator = Isolator::from_config(settings);
        let assembler = Assembler::new(JarManifest::for_agent(settings));
        let licenses = LicenseRecorder::from_config(&settings.license)?;
        let bootstrap_visible = settings.bootstrap_visible();

        Ok(Self {
            config,
            rules,
            duplicates,
            bootstrap_visible,
            isolator,
            assembler,
            licenses,
        })
    }

    /// Load, validate and classify modules without touching any archive
    pub fn plan(&self, provider: &dyn ModuleProvider) -> BuildResult<BuildPlan> {
        let modules = provider.modules()?;

        let graph = ModuleGraph::from_modules(&modules)?;
        graph.validate()?;
        let build_order = graph.compute_build_order()?;

        let buckets = BucketPlan::from_modules(&modules)?;
        debug!(
            "Classified {} modules: {} bootstrap, {} base-agent, {} full-agent",
            buckets.len(),
            buckets.modules(Bucket::Bootstrap).len(),
            buckets.modules(Bucket::BaseAgent).len(),
            buckets.modules(Bucket::FullAgent).len()
        );

        Ok(BuildPlan {
            modules,
            build_order,
            buckets,
        })
    }

    /// Attribution inventory of the bootstrap and base-agent layers
    pub fn record_licenses(
        &self,
        plan: &BuildPlan,
        resolver: &dyn DependencyResolver,
    ) -> BuildResult<LicenseReport> {
        let covered: Vec<Module> = plan
            .buckets
            .modules(Bucket::Bootstrap)
            .iter()
            .chain(plan.buckets.modules(Bucket::BaseAgent))
            .cloned()
            .collect();
        let libraries = resolver.external_libraries(&covered)?;
        Ok(self.licenses.record(libraries))
    }

    /// Read every module and aggregate the three buckets
    pub fn aggregate(&self, plan: &BuildPlan) -> BuildResult<Intermediates> {
        let loaded: Vec<LoadedModule> = if self.config.parallel {
            plan.modules
                .par_iter()
                .map(LoadedModule::load)
                .collect::<BuildResult<_>>()?
        } else {
            plan.modules
                .iter()
                .map(LoadedModule::load)
                .collect::<BuildResult<_>>()?
        };
        let by_id: HashMap<&str, &LoadedModule> =
            loaded.iter().map(|m| (m.id.as_str(), m)).collect();

        let select = |bucket: Bucket| -> Vec<&LoadedModule> {
            plan.buckets
                .modules(bucket)
                .iter()
                .filter_map(|m| by_id.get(m.id.as_str()).copied())
                .collect()
        };
        let bootstrap_modules = select(Bucket::Bootstrap);
        let base_modules = select(Bucket::BaseAgent);
        let full_modules = select(Bucket::FullAgent);

        let aggregator = Aggregator::new(&self.rules, &self.duplicates, &self.bootstrap_visible);
        let parallel = self.config.parallel;

        let (bootstrap, (base_agent, full_agent)) = join(
            parallel,
            || aggregator.aggregate(Bucket::Bootstrap, &bootstrap_modules, &full_modules),
            || {
                join(
                    parallel,
                    || aggregator.aggregate(Bucket::BaseAgent, &base_modules, &[]),
                    || aggregator.aggregate(Bucket::FullAgent, &full_modules, &[]),
                )
            },
        );

        let mut bootstrap = bootstrap?;
        let base_agent = base_agent?;
        let full_agent = full_agent?;

        if let Some(dir) = &self.config.licenses_dir {
            self.add_license_texts(&mut bootstrap, dir)?;
        }

        Ok(Intermediates {
            bootstrap,
            base_agent,
            full_agent,
        })
    }

    fn add_license_texts(&self, bootstrap: &mut IntermediateArchive, dir: &Path) -> BuildResult<()> {
        if !dir.is_dir() {
            return Err(BuildError::io(
                dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "licenses directory not found"),
            ));
        }

        for entry in read_directory(dir, LICENSES_PREFIX, "licenses")? {
            if let Err(rejected) = bootstrap.archive.push(entry) {
                let first = bootstrap
                    .archive
                    .get(&rejected.path)
                    .map(|e| e.origin.clone())
                    .unwrap_or_default();
                return Err(BuildError::duplicate(rejected.path, first, rejected.origin));
            }
        }
        bootstrap.stats.entries = bootstrap.archive.len();
        Ok(())
    }

    /// Isolate the agent buckets and compose both final artifacts
    pub fn assemble(&self, intermediates: &Intermediates) -> BuildResult<Artifacts> {
        let (base, full) = join(
            self.config.parallel,
            || self.isolator.isolate(&intermediates.base_agent),
            || self.isolator.isolate(&intermediates.full_agent),
        );
        let base: IsolatedArchive = base?;
        let full: IsolatedArchive = full?;

        let full = self
            .assembler
            .assemble(ArtifactKind::Full, &intermediates.bootstrap, &[&full])?;
        let base = self
            .assembler
            .assemble(ArtifactKind::Base, &intermediates.bootstrap, &[&base])?;

        Ok(Artifacts { full, base })
    }

    fn write_intermediates(&self, intermediates: &Intermediates) -> BuildResult<Vec<PathBuf>> {
        Bucket::ALL
            .iter()
            .map(|bucket| {
                let path = self.config.work_dir.join(bucket.archive_file_name());
                intermediates.get(*bucket).archive.write_to(&path)?;
                debug!("Wrote {}", path.display());
                Ok(path)
            })
            .collect()
    }

    /// Serialize both artifacts, then publish them together
    fn publish(&self, artifacts: &Artifacts) -> BuildResult<Vec<ArtifactMetadata>> {
        let (full_bytes, base_bytes) = join(
            self.config.parallel,
            || artifacts.full.to_jar_bytes(),
            || artifacts.base.to_jar_bytes(),
        );
        let full_bytes = full_bytes?;
        let base_bytes = base_bytes?;

        let full = ArtifactMetadata::compute(
            ArtifactKind::Full,
            &self.config.artifact_path(ArtifactKind::Full),
            &full_bytes,
            artifacts.full.archive.len(),
        );
        let base = ArtifactMetadata::compute(
            ArtifactKind::Base,
            &self.config.artifact_path(ArtifactKind::Base),
            &base_bytes,
            artifacts.base.archive.len(),
        );

        if let Err(e) = full.write(&full_bytes) {
            full.remove();
            return Err(e);
        }
        if let Err(e) = base.write(&base_bytes) {
            full.remove();
            base.remove();
            return Err(e);
        }

        Ok(vec![full, base])
    }

    /// Execute the whole pipeline
    pub fn run(
        &self,
        provider: &dyn ModuleProvider,
        resolver: &dyn DependencyResolver,
    ) -> BuildResult<BuildOutcome> {
        let build_start = Instant::now();
        let package = &self.config.config.package;
        info!("Assembling {} {}", package.name, package.version);

        let plan = self.plan(provider)?;
        let licenses = self.record_licenses(&plan, resolver)?;

        let aggregation_start = Instant::now();
        let intermediates = self.aggregate(&plan)?;
        let aggregation_time = aggregation_start.elapsed();

        let intermediate_paths = if self.config.write_intermediates {
            self.write_intermediates(&intermediates)?
        } else {
            Vec::new()
        };

        let assembly_start = Instant::now();
        let artifacts = self.assemble(&intermediates)?;
        let published = self.publish(&artifacts)?;
        let assembly_time = assembly_start.elapsed();

        if let Some(report) = &self.config.license_report {
            if let Err(e) = licenses.write_to(report) {
                for artifact in &published {
                    artifact.remove();
                }
                return Err(e);
            }
            debug!("Wrote license report {}", report.display());
        }

        let stats = BuildStats {
            total_modules: plan.modules.len(),
            buckets: Bucket::ALL
                .iter()
                .map(|b| (b.name().to_string(), intermediates.get(*b).stats))
                .collect(),
            aggregation_time,
            assembly_time,
            total_time: build_start.elapsed(),
        };

        for artifact in &published {
            info!(
                "Wrote {} ({} entries, {} bytes)",
                artifact.path.display(),
                artifact.entry_count,
                artifact.size
            );
        }
        info!("Build completed in {:.2}s", stats.total_time.as_secs_f64());

        Ok(BuildOutcome {
            artifacts: published,
            intermediates: intermediate_paths,
            licenses,
            stats,
        })
    }
}
