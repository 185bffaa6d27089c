//! CLI integration tests
//!
//! Runs the `agentpack` binary against scratch projects:
//! - Help messages and examples
//! - build, plan, licenses and inspect output
//! - Flag overrides and error exit codes

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn agentpack_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("agentpack").unwrap();
    cmd.current_dir(dir)
        .env_remove("AGENTPACK_JSON")
        .env_remove("AGENTPACK_OUTPUT_DIR")
        .env_remove("AGENTPACK_ISOLATION_PREFIX")
        .env_remove("AGENTPACK_REMOVE_VERSION")
        .env_remove("AGENTPACK_VERSION")
        .env_remove("RUST_LOG");
    cmd
}

/// Minimal class file: `this` extends java/lang/Object, no members
fn class_file(this: &str) -> Vec<u8> {
    let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52, 0, 5];
    for name in [this, "java/lang/Object"] {
        bytes.push(1);
        bytes.extend_from_slice(&(name.len() as u16).to_be_bytes());
        bytes.extend_from_slice(name.as_bytes());
    }
    bytes.extend_from_slice(&[7, 0, 1, 7, 0, 2]);
    bytes.extend_from_slice(&[0x00, 0x21, 0, 3, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0]);
    bytes
}

fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut zip = zip::ZipWriter::new(fs::File::create(path).unwrap());
    for (name, data) in entries {
        zip.start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

const CONFIG: &str = r#"
[package]
name = "agent"
version = "1.0.0"
"#;

const MODULES: &str = r#"
[[module]]
name = ":api"
role = "bootstrap"
archive = "modules/api.jar"

[[module.external]]
group = "io.grpc"
name = "grpc-context"
version = "1.58.0"
license = "Apache-2.0"

[[module]]
name = ":tooling"
role = "base-agent"
archive = "modules/tooling.jar"
dependencies = [":api"]

[[module]]
name = ":jdbc"
role = "instrumentation"
archive = "modules/jdbc.jar"
dependencies = [":tooling"]

[[module.external]]
group = "com.zaxxer"
name = "HikariCP"
version = "5.0.1"
"#;

fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::write(root.join("agentpack.toml"), CONFIG).unwrap();
    fs::write(root.join("modules.toml"), MODULES).unwrap();
    write_jar(
        &root.join("modules/api.jar"),
        &[("com/example/api/Api.class", class_file("com/example/api/Api"))],
    );
    write_jar(
        &root.join("modules/tooling.jar"),
        &[(
            "com/example/tooling/Installer.class",
            class_file("com/example/tooling/Installer"),
        )],
    );
    write_jar(
        &root.join("modules/jdbc.jar"),
        &[(
            "com/example/jdbc/Jdbc.class",
            class_file("com/example/jdbc/Jdbc"),
        )],
    );
    temp
}

fn full_jar(root: &Path) -> PathBuf {
    root.join("build/libs/agent-1.0.0.jar")
}

// ══════════════════════════════════════════════════════════════════════════════
// HELP MESSAGE TESTS
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_help_lists_commands_and_examples() {
    let temp = TempDir::new().unwrap();
    agentpack_cmd(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("licenses"))
        .stdout(predicate::str::contains("inspect"))
        .stdout(predicate::str::contains("EXAMPLES"))
        .stdout(predicate::str::contains("AGENTPACK_ISOLATION_PREFIX"));
}

#[test]
fn test_build_help_shows_flags() {
    let temp = TempDir::new().unwrap();
    agentpack_cmd(temp.path())
        .args(["build", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-dir"))
        .stdout(predicate::str::contains("--isolation-prefix"))
        .stdout(predicate::str::contains("--remove-version"));
}

// ══════════════════════════════════════════════════════════════════════════════
// BUILD TESTS
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_build_writes_both_artifacts() {
    let temp = project();
    agentpack_cmd(temp.path())
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("Build succeeded"));

    let root = temp.path();
    assert!(full_jar(root).is_file());
    assert!(root.join("build/libs/agent-1.0.0-base.jar").is_file());
    assert!(root.join("build/libs/agent-1.0.0.jar.sha256").is_file());
    assert!(root
        .join("build/tmp/agentpack/javaagentLibs-relocated.jar")
        .is_file());
}

#[test]
fn test_build_json_output() {
    let temp = project();
    let output = agentpack_cmd(temp.path())
        .args(["build", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["modules"], 3);
    let artifacts = json["artifacts"].as_array().unwrap();
    assert_eq!(artifacts.len(), 2);
    assert_eq!(artifacts[0]["kind"], "full");
    assert_eq!(artifacts[0]["sha256"].as_str().unwrap().len(), 64);
    assert_eq!(json["licenses"], 1);
}

#[test]
fn test_build_flag_overrides() {
    let temp = project();
    agentpack_cmd(temp.path())
        .args([
            "build",
            "--remove-version",
            "--output-dir",
            "dist",
            "--isolation-prefix",
            "agent",
            "--no-intermediates",
            "-q",
        ])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let root = temp.path();
    assert!(root.join("dist/agent.jar").is_file());
    assert!(root.join("dist/agent-base.jar").is_file());
    assert!(!root.join("build/tmp/agentpack").exists());

    agentpack_cmd(root)
        .args(["inspect", "dist/agent.jar"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "agent/com/example/jdbc/Jdbc.classdata",
        ));
}

#[test]
fn test_build_fails_on_duplicate_class() {
    let temp = project();
    write_jar(
        &temp.path().join("modules/jdbc.jar"),
        &[(
            "com/example/tooling/Installer.class",
            class_file("com/example/tooling/Installer"),
        )],
    );

    agentpack_cmd(temp.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "com/example/tooling/Installer.class",
        ));
    assert!(!full_jar(temp.path()).exists());
}

#[test]
fn test_build_without_config_fails() {
    let temp = TempDir::new().unwrap();
    agentpack_cmd(temp.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("agentpack.toml"));
}

#[test]
fn test_build_with_explicit_paths() {
    let temp = project();
    let nested = temp.path().join("elsewhere");
    fs::create_dir_all(&nested).unwrap();

    agentpack_cmd(&nested)
        .args(["build", "--config", "../agentpack.toml", "--modules", "../modules.toml", "-q"])
        .assert()
        .success();
    assert!(full_jar(temp.path()).is_file());
}

// ══════════════════════════════════════════════════════════════════════════════
// PLAN / LICENSES / INSPECT TESTS
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_plan_json_lists_buckets() {
    let temp = project();
    let output = agentpack_cmd(temp.path())
        .args(["plan", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["buckets"]["bootstrap"], serde_json::json!([":api"]));
    assert_eq!(json["buckets"]["base-agent"], serde_json::json!([":tooling"]));
    assert_eq!(
        json["buckets"]["full-agent"],
        serde_json::json!([":tooling", ":jdbc"])
    );
    assert_eq!(
        json["build_order"],
        serde_json::json!([":api", ":tooling", ":jdbc"])
    );
    assert!(!temp.path().join("build").exists());
}

#[test]
fn test_plan_rejects_unknown_role() {
    let temp = project();
    fs::write(
        temp.path().join("modules.toml"),
        "[[module]]\nname = \":odd\"\nrole = \"library\"\narchive = \"modules/api.jar\"\n",
    )
    .unwrap();

    agentpack_cmd(temp.path())
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains(":odd"));
}

#[test]
fn test_licenses_markdown() {
    let temp = project();
    agentpack_cmd(temp.path())
        .arg("licenses")
        .assert()
        .success()
        .stdout(predicate::str::contains("# Third-party libraries"))
        .stdout(predicate::str::contains("io.grpc:grpc-context:1.58.0"))
        .stdout(predicate::str::contains("HikariCP").not());
}

#[test]
fn test_inspect_shows_manifest() {
    let temp = project();
    agentpack_cmd(temp.path())
        .args(["build", "-q"])
        .assert()
        .success();

    let output = agentpack_cmd(temp.path())
        .args(["inspect", "build/libs/agent-1.0.0.jar", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["manifest_first"], true);
    assert_eq!(
        json["manifest"]["Premain-Class"],
        "io.opentelemetry.javaagent.OpenTelemetryAgent"
    );
    let paths: Vec<&str> = json["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["path"].as_str().unwrap())
        .collect();
    assert!(paths.contains(&"com/example/api/Api.class"));
    assert!(paths.contains(&"inst/com/example/jdbc/Jdbc.classdata"));
}

#[test]
fn test_inspect_missing_jar_fails() {
    let temp = TempDir::new().unwrap();
    agentpack_cmd(temp.path())
        .args(["inspect", "missing.jar"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.jar"));
}
