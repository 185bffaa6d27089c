//! Plan command - show bucket membership without touching any archive

use super::ProjectArgs;
use agentpack_build::{Pipeline, PipelineConfig};
use anyhow::{Context, Result};

pub fn run(project: ProjectArgs, json: bool) -> Result<()> {
    let loaded = project.load_config()?;
    let provider = project.load_modules(&loaded)?;

    let pipeline = Pipeline::new(PipelineConfig::from_loaded(&loaded))
        .context("Invalid assembly configuration")?;
    let summary = pipeline
        .plan(&provider)
        .context("Failed to classify modules")?
        .summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    for (bucket, modules) in &summary.buckets {
        println!("{} ({} modules)", bucket, modules.len());
        for module in modules {
            println!("  {}", module);
        }
    }
    println!("\nBuild order: {}", summary.build_order.join(", "));

    Ok(())
}
