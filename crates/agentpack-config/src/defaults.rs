//! Built-in defaults
//!
//! The values an assembly falls back to when agentpack.toml leaves a
//! setting out.

use crate::project::{DuplicatePolicy, RelocationConfig};
use std::collections::BTreeMap;

/// Default config file name searched for by the loader
pub const CONFIG_FILE_NAME: &str = "agentpack.toml";

/// Default module list file name, resolved next to the config file
pub const MODULES_FILE_NAME: &str = "modules.toml";

/// Isolation directory inside the final jar.
///
/// Kept short: the agent class loader prepends it to every class name it
/// looks up.
pub const ISOLATION_PREFIX: &str = "inst";

/// Extension given to compiled classes under the isolation prefix
pub const CLASS_SUFFIX: &str = "classdata";

/// Bootstrap entry class used for Premain-Class, Agent-Class and Main-Class
pub const ENTRY_POINT: &str = "io.opentelemetry.javaagent.OpenTelemetryAgent";

/// Final artifact directory
pub const OUTPUT_DIR: &str = "build/libs";

/// Intermediate archive directory
pub const WORK_DIR: &str = "build/tmp/agentpack";

/// Packages that are never relocated.
///
/// These hold the bridge classes through which isolated agent code calls
/// into application-visible APIs, and classes that are already shaded.
pub const PASS_THROUGH_PACKAGES: [&str; 2] = [
    "io.opentelemetry.javaagent.bootstrap",
    "io.opentelemetry.javaagent.shaded",
];

/// Package prefixes of agent-bound modules that belong on the bootstrap class path
pub fn bootstrap_visible() -> Vec<String> {
    vec!["io.opentelemetry.javaagent.bootstrap".to_string()]
}

/// Extra merge paths applied on top of the always-merged service files
pub fn duplicate_overrides() -> BTreeMap<String, DuplicatePolicy> {
    let mut overrides = BTreeMap::new();
    // AWS SDK handler registrations use their own service-loader directory
    overrides.insert(
        "software/amazon/awssdk/global/handlers/*".to_string(),
        DuplicatePolicy::Merge,
    );
    overrides
}

const SHADED_PREFIX: &str = "io.opentelemetry.javaagent.shaded";

/// The default relocation table
pub fn relocations() -> Vec<RelocationConfig> {
    let mut rules = vec![
        // rewrite dependencies calling Logger.getLogger
        RelocationConfig::new(
            "java.util.logging.Logger",
            "io.opentelemetry.javaagent.bootstrap.PatchLogger",
        ),
        RelocationConfig::new(
            "io.opentelemetry.instrumentation",
            format!("{}.instrumentation", SHADED_PREFIX),
        )
        .with_exclude(vec![
            // resource providers live in the agent class loader
            "io.opentelemetry.instrumentation.resources".to_string(),
            "io.opentelemetry.instrumentation.spring.resources".to_string(),
        ]),
    ];

    for package in [
        "io.opentelemetry.api",
        "io.opentelemetry.semconv",
        "io.opentelemetry.context",
        "io.opentelemetry.extension.incubator",
        "io.opentelemetry.extension.aws",
        "io.opentelemetry.extension.kotlin",
    ] {
        rules.push(RelocationConfig::new(
            package,
            format!("{}.{}", SHADED_PREFIX, package),
        ));
    }

    // instrumentation of the application's own copies of the API
    rules.push(RelocationConfig::new(
        "application.io.opentelemetry",
        "io.opentelemetry",
    ));
    rules.push(RelocationConfig::new(
        "application.java.util.logging",
        "java.util.logging",
    ));

    rules
}
