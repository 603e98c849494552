//! End-to-end tests of the CLI commands against parameter files on disk.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use clap::Parser;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use transit::cli::{Cli, compose_plan, execute};
use transit::config::TransitConfig;
use transit_core::{RawValue, TransitError, import_canonical};

const PARAMETERS: &str = r#"
[context]
stack-name = "nightly-copy"

[parameters]
source-bucket = "src"
destination-bucket = "dst"
alarm-email = "ops@example.com"
vpc-id = "vpc-0a1b2c3d"
subnet-ids = ["subnet-a", "subnet-b"]
"#;

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("transit.toml");
    std::fs::write(&path, body).unwrap();
    path
}

fn run(config: &Path, args: &[&str]) -> Result<(), TransitError> {
    let mut argv = vec!["transit", "--quiet", "-c", config.to_str().unwrap()];
    argv.extend_from_slice(args);
    execute(Cli::try_parse_from(argv).unwrap())
}

// =============================================================================
// CONFIG LOADING
// =============================================================================

#[test]
fn test_load_parameter_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, PARAMETERS);

    let config = TransitConfig::load(&path).unwrap();
    assert_eq!(config.context.stack_name, "nightly-copy");
    assert_eq!(
        config.values.get("subnet-ids"),
        Some(&RawValue::List(vec!["subnet-a".into(), "subnet-b".into()]))
    );
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let result = TransitConfig::resolve(Some(&dir.path().join("absent.toml")));
    assert!(matches!(result, Err(TransitError::IoError(_))));
}

#[test]
fn test_composed_names_use_stack_name() {
    let dir = TempDir::new().unwrap();
    let config = TransitConfig::load(&write_config(&dir, PARAMETERS)).unwrap();

    let plan = compose_plan(&config).unwrap();
    assert!(plan.outputs.queue_name.starts_with("nightly-copy-"));
    assert!(plan.outputs.fleet_name.is_none());
}

#[test]
fn test_overrides_switch_runtime_mode() {
    let dir = TempDir::new().unwrap();
    let mut config = TransitConfig::load(&write_config(&dir, PARAMETERS)).unwrap();
    config
        .apply_overrides(&["run-type=fleet".to_string()])
        .unwrap();

    let plan = compose_plan(&config).unwrap();
    assert!(plan.outputs.fleet_name.is_some());
}

// =============================================================================
// COMMANDS
// =============================================================================

#[test]
fn test_validate_accepts_complete_file() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, PARAMETERS);
    run(&config, &["validate"]).unwrap();
}

#[test]
fn test_validate_reports_every_violation() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "[parameters]\nalarm-email = \"nope\"\n");

    let Err(TransitError::Validation(errors)) = run(&config, &["validate"]) else {
        panic!("expected validation failure");
    };
    for name in [
        "source-bucket",
        "destination-bucket",
        "alarm-email",
        "vpc-id",
        "subnet-ids",
    ] {
        assert!(errors.mentions(name), "missing violation for {name}");
    }
}

#[test]
fn test_inverted_capacity_fails_in_cluster_mode() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, PARAMETERS);
    let result = run(
        &config,
        &["-p", "min-capacity=5", "-p", "max-capacity=2", "plan"],
    );
    assert!(matches!(result, Err(TransitError::Validation(_))));
}

#[test]
fn test_canonical_plan_roundtrip_and_verify() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, PARAMETERS);
    let output = dir.path().join("plan.bin");
    let output_arg = output.to_str().unwrap();

    run(&config, &["plan", "-t", "canonical", "-o", output_arg]).unwrap();
    let imported = import_canonical(&std::fs::read(&output).unwrap()).unwrap();
    assert_eq!(imported.context.stack_name, "nightly-copy");

    run(&config, &["verify", "-i", output_arg, "--compare"]).unwrap();

    let drifted = run(
        &config,
        &["-p", "run-type=fleet", "verify", "-i", output_arg, "--compare"],
    );
    assert!(matches!(drifted, Err(TransitError::InvariantViolation(_))));
}

#[test]
fn test_canonical_plan_needs_output_file() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, PARAMETERS);
    let result = run(&config, &["plan", "-t", "canonical"]);
    assert!(matches!(result, Err(TransitError::SerializationError(_))));
}

#[test]
fn test_json_plan_written_to_file() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, PARAMETERS);
    let output = dir.path().join("plan.json");

    run(&config, &["plan", "-o", output.to_str().unwrap()]).unwrap();

    let body: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(body["context"]["stack_name"], "nightly-copy");
    assert!(body["conditions"].is_object());
}

#[test]
fn test_env_rejects_unknown_role() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, PARAMETERS);
    run(&config, &["env", "--role", "worker"]).unwrap();
    assert!(run(&config, &["env", "--role", "scheduler"]).is_err());
}

#[test]
fn test_apply_requires_dry_run() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, PARAMETERS);
    assert!(matches!(
        run(&config, &["apply"]),
        Err(TransitError::Provisioning(_))
    ));
    run(&config, &["apply", "--dry-run"]).unwrap();
}

#[test]
fn test_params_listing_needs_no_file() {
    let cli = Cli::try_parse_from(["transit", "--quiet", "--json-mode", "params"]).unwrap();
    execute(cli).unwrap();
}
