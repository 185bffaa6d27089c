use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

/// Java agent artifact assembler.
///
/// Composes compiled modules into the full and base agent jars: classifies
/// modules into bootstrap, base-agent and full-agent buckets, relocates
/// shaded packages, isolates agent classes and writes the final artifacts.
///
/// EXAMPLES:
///     agentpack build                       Assemble both agent jars
///     agentpack build --remove-version      Drop the version from file names
///     agentpack plan                        Show bucket membership
///     agentpack licenses --json             Print the attribution inventory
///     agentpack inspect build/libs/agent.jar
///
/// ENVIRONMENT VARIABLES:
///     AGENTPACK_JSON               Set to '1' for JSON output by default
///     AGENTPACK_ISOLATION_PREFIX   Override isolation.prefix
///     AGENTPACK_OUTPUT_DIR         Override output.dir
///     AGENTPACK_REMOVE_VERSION     Override output.remove_version
///     AGENTPACK_VERSION            Override package.version
///     RUST_LOG                     Log filter (overrides -v/-q)
#[derive(Parser)]
#[command(name = "agentpack")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output (debug logging)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
    /// Quiet output (warnings and errors only)
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the full and base agent artifacts
    ///
    /// Reads agentpack.toml (searched upwards from the current directory)
    /// and the module list, then writes both jars with their .sha256
    /// sidecars. Nothing is published if any stage fails.
    ///
    /// EXAMPLES:
    ///     agentpack build
    ///     agentpack build --config agent/agentpack.toml --modules agent/modules.toml
    ///     agentpack build --output-dir dist --json
    #[command(visible_alias = "b")]
    Build {
        /// Path to agentpack.toml
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        /// Path to the module list (default: modules.toml next to the config)
        #[arg(long, short = 'm')]
        modules: Option<PathBuf>,
        /// Final artifact directory
        #[arg(long, short = 'o')]
        output_dir: Option<PathBuf>,
        /// Isolation directory inside the agent jars
        #[arg(long)]
        isolation_prefix: Option<String>,
        /// Leave the version out of artifact file names
        #[arg(long)]
        remove_version: bool,
        /// Skip writing intermediate bucket archives
        #[arg(long)]
        no_intermediates: bool,
        /// Run every stage on the current thread
        #[arg(long)]
        sequential: bool,
        /// JSON output
        #[arg(long, env = "AGENTPACK_JSON")]
        json: bool,
    },

    /// Show how modules are classified into buckets
    ///
    /// EXAMPLES:
    ///     agentpack plan
    ///     agentpack plan --json
    #[command(visible_alias = "p")]
    Plan {
        /// Path to agentpack.toml
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        /// Path to the module list
        #[arg(long, short = 'm')]
        modules: Option<PathBuf>,
        /// JSON output
        #[arg(long, env = "AGENTPACK_JSON")]
        json: bool,
    },

    /// Print the third-party attribution inventory
    ///
    /// Covers libraries bundled into the bootstrap and base-agent layers.
    ///
    /// EXAMPLES:
    ///     agentpack licenses
    ///     agentpack licenses --json > licenses.json
    Licenses {
        /// Path to agentpack.toml
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        /// Path to the module list
        #[arg(long, short = 'm')]
        modules: Option<PathBuf>,
        /// JSON output
        #[arg(long, env = "AGENTPACK_JSON")]
        json: bool,
    },

    /// List the entries and manifest of an agent jar
    ///
    /// EXAMPLES:
    ///     agentpack inspect build/libs/opentelemetry-javaagent-1.31.0.jar
    ///     agentpack inspect agent.jar --json
    #[command(visible_alias = "i")]
    Inspect {
        /// Jar to inspect
        jar: PathBuf,
        /// JSON output
        #[arg(long, env = "AGENTPACK_JSON")]
        json: bool,
    },
}

/// Initialize tracing; RUST_LOG wins over the verbosity flags
fn init_logging(verbose: bool, quiet: bool) -> Result<()> {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    // stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet)?;

    match cli.command {
        Commands::Build {
            config,
            modules,
            output_dir,
            isolation_prefix,
            remove_version,
            no_intermediates,
            sequential,
            json,
        } => {
            let args = commands::build::BuildArgs {
                config,
                modules,
                output_dir,
                isolation_prefix,
                remove_version,
                no_intermediates,
                sequential,
                json,
                quiet: cli.quiet,
            };
            commands::build::run(args)?;
        }
        Commands::Plan {
            config,
            modules,
            json,
        } => {
            commands::plan::run(commands::ProjectArgs { config, modules }, json)?;
        }
        Commands::Licenses {
            config,
            modules,
            json,
        } => {
            commands::licenses::run(commands::ProjectArgs { config, modules }, json)?;
        }
        Commands::Inspect { jar, json } => {
            commands::inspect::run(&jar, json)?;
        }
    }

    Ok(())
}
