//! Inspect command - list the entries and manifest of an agent jar

use agentpack_build::{Archive, JarManifest, MANIFEST_PATH};
use anyhow::{Context, Result};
use std::path::Path;

pub fn run(jar: &Path, json: bool) -> Result<()> {
    let archive =
        Archive::open(jar).with_context(|| format!("Failed to read {}", jar.display()))?;

    let manifest = match archive.get(MANIFEST_PATH) {
        Some(entry) => Some(
            JarManifest::parse(&entry.data)
                .with_context(|| format!("Invalid manifest in {}", jar.display()))?,
        ),
        None => None,
    };
    let manifest_first = archive.paths().next() == Some(MANIFEST_PATH);

    if json {
        let entries: Vec<_> = archive
            .entries()
            .iter()
            .map(|e| serde_json::json!({ "path": e.path, "size": e.data.len() }))
            .collect();
        let attributes: serde_json::Map<String, serde_json::Value> = manifest
            .iter()
            .flat_map(|m| m.attributes().iter())
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "jar": jar,
                "entries": entries,
                "manifest": attributes,
                "manifest_first": manifest_first,
            })
        );
        return Ok(());
    }

    println!("{} ({} entries)", jar.display(), archive.len());
    match &manifest {
        Some(manifest) => {
            println!("\nManifest:");
            for (key, value) in manifest.attributes() {
                println!("  {}: {}", key, value);
            }
            if !manifest_first {
                println!("  (not the first entry)");
            }
        }
        None => println!("\nNo manifest"),
    }

    println!("\nEntries:");
    for entry in archive.entries() {
        println!("  {:>10}  {}", entry.data.len(), entry.path);
    }

    Ok(())
}
