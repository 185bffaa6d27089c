//! Build command - assemble the full and base agent artifacts

use super::ProjectArgs;
use agentpack_build::{Pipeline, PipelineConfig};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Build command arguments
#[derive(Default)]
pub struct BuildArgs {
    /// Path to agentpack.toml
    pub config: Option<PathBuf>,
    /// Path to the module list
    pub modules: Option<PathBuf>,
    /// Final artifact directory (overrides output.dir)
    pub output_dir: Option<PathBuf>,
    /// Isolation directory (overrides isolation.prefix)
    pub isolation_prefix: Option<String>,
    /// Leave the version out of artifact file names
    pub remove_version: bool,
    /// Skip intermediate bucket archives
    pub no_intermediates: bool,
    /// Disable parallel stages
    pub sequential: bool,
    /// JSON output
    pub json: bool,
    /// Quiet output (errors only)
    pub quiet: bool,
}

/// Run the build command
pub fn run(args: BuildArgs) -> Result<()> {
    let project = ProjectArgs {
        config: args.config.clone(),
        modules: args.modules.clone(),
    };
    let mut loaded = project.load_config()?;

    // CLI flags override the file and the environment
    if let Some(prefix) = args.isolation_prefix.clone() {
        loaded.config.isolation.prefix = Some(prefix);
    }
    if args.remove_version {
        loaded.config.output.remove_version = true;
    }

    let provider = project.load_modules(&loaded)?;

    let mut pipeline_config = PipelineConfig::from_loaded(&loaded)
        .with_parallel(!args.sequential)
        .with_intermediates(!args.no_intermediates);
    if let Some(dir) = args.output_dir.clone() {
        pipeline_config = pipeline_config.with_output_dir(dir);
    }

    let pipeline = Pipeline::new(pipeline_config).context("Invalid assembly configuration")?;
    let outcome = pipeline.run(&provider, &provider).context("Build failed")?;

    if args.json {
        let artifacts: Vec<_> = outcome
            .artifacts
            .iter()
            .map(|artifact| {
                serde_json::json!({
                    "kind": artifact.kind,
                    "path": artifact.path,
                    "sha256": artifact.sha256,
                    "entries": artifact.entry_count,
                    "size": artifact.size,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "success": true,
                "artifacts": artifacts,
                "intermediates": outcome.intermediates,
                "modules": outcome.stats.total_modules,
                "buckets": outcome.stats.buckets,
                "licenses": outcome.licenses.len(),
                "total_time": outcome.stats.total_time.as_secs_f64(),
                "aggregation_time": outcome.stats.aggregation_time.as_secs_f64(),
                "assembly_time": outcome.stats.assembly_time.as_secs_f64(),
            })
        );
    } else if !args.quiet {
        println!("\n{}", "=".repeat(60));
        println!(
            "Build succeeded in {:.2}s",
            outcome.stats.total_time.as_secs_f64()
        );
        println!("{}", "=".repeat(60));
        println!("  Modules: {}", outcome.stats.total_modules);
        for (bucket, stats) in &outcome.stats.buckets {
            println!(
                "  {}: {} entries ({} relocated, {} merged, {} dropped)",
                bucket, stats.entries, stats.relocated, stats.merged, stats.dropped
            );
        }
        for artifact in &outcome.artifacts {
            println!("  {} artifact: {}", artifact.kind, artifact.path.display());
            println!("    sha256 {}", artifact.sha256);
        }
        println!("  Licensed libraries: {}", outcome.licenses.len());
        println!("{}", "=".repeat(60));
    }

    Ok(())
}
