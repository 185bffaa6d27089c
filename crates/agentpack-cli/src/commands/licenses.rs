//! Licenses command - print the attribution inventory

use super::ProjectArgs;
use agentpack_build::{Pipeline, PipelineConfig};
use anyhow::{Context, Result};

pub fn run(project: ProjectArgs, json: bool) -> Result<()> {
    let loaded = project.load_config()?;
    let provider = project.load_modules(&loaded)?;

    let pipeline = Pipeline::new(PipelineConfig::from_loaded(&loaded))
        .context("Invalid assembly configuration")?;
    let plan = pipeline
        .plan(&provider)
        .context("Failed to classify modules")?;
    let report = pipeline
        .record_licenses(&plan, &provider)
        .context("Failed to resolve external libraries")?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render_markdown());
    }

    Ok(())
}
