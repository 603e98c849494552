//! # CLI Command Implementations
//!
//! Each `cmd_*` function composes (or loads) a plan and renders one view of
//! it, as text or as JSON when `--json-mode` is set.

use crate::config::TransitConfig;
use std::path::{Path, PathBuf};
use transit_core::catalog::ParamValue;
use transit_core::{
    ComputeRole, Compositor, DeploymentPlan, DryRunBackend, ParameterCatalog, ProvisioningBackend,
    TransitError, canonical_checksum, export_canonical, import_canonical, plan_hash,
    verify_canonical,
};

/// Maximum canonical plan file size accepted by `verify` (16 MiB).
const MAX_PLAN_FILE_SIZE: u64 = 16 * 1024 * 1024;

// =============================================================================
// HELPERS
// =============================================================================

fn validate_file_size(path: &Path, max_size: u64) -> Result<(), TransitError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| TransitError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(TransitError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path to an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, TransitError> {
    let canonical = path.canonicalize().map_err(|e| {
        TransitError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(TransitError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path: the parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, TransitError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        TransitError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(TransitError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| TransitError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, TransitError> {
    serde_json::to_string_pretty(value).map_err(|e| TransitError::SerializationError(e.to_string()))
}

fn describe_value(value: &ParamValue) -> String {
    match value {
        ParamValue::Text(s) if s.is_empty() => "\"\"".to_string(),
        ParamValue::Text(s) => s.clone(),
        ParamValue::Number(n) => n.to_string(),
        ParamValue::List(items) => items.join(","),
    }
}

/// Validate the configured values and compose the plan.
pub fn compose_plan(config: &TransitConfig) -> Result<DeploymentPlan, TransitError> {
    let catalog = ParameterCatalog::standard()?;
    Compositor::compose(&catalog, &config.values, &config.context)
}

// =============================================================================
// PARAMS COMMAND
// =============================================================================

/// List the catalog, grouped as presented to operators.
pub fn cmd_params(json_mode: bool) -> Result<(), TransitError> {
    let catalog = ParameterCatalog::standard()?;

    if json_mode {
        let specs: Vec<_> = catalog.parameters().map(|p| p.spec()).collect();
        let output = serde_json::json!({
            "parameters": specs,
            "presentation": catalog.presentation(),
        });
        println!("{}", to_json(&output)?);
        return Ok(());
    }

    for group in &catalog.presentation().groups {
        println!("{}", group.label);
        for name in &group.parameters {
            let Some(parameter) = catalog.get(name) else {
                continue;
            };
            let spec = parameter.spec();
            let default = match &spec.default {
                Some(value) => format!("default {}", describe_value(value)),
                None => "required".to_string(),
            };
            println!("  {:<34} {:<7} {}", spec.name, spec.kind.as_str(), default);
            if let Some(allowed) = &spec.allowed_values {
                println!("  {:<34} one of: {}", "", allowed.join(", "));
            }
        }
        println!();
    }
    Ok(())
}

// =============================================================================
// VALIDATE COMMAND
// =============================================================================

/// Validate the parameter set; every violation is reported at once.
pub fn cmd_validate(config: &TransitConfig, json_mode: bool) -> Result<(), TransitError> {
    let catalog = ParameterCatalog::standard()?;

    match catalog.validate(&config.values) {
        Ok(set) => {
            let supplied = set.iter().filter(|(name, _)| set.is_supplied(name)).count();
            if json_mode {
                let output = serde_json::json!({
                    "valid": true,
                    "parameters": set.iter().count(),
                    "supplied": supplied,
                });
                println!("{}", to_json(&output)?);
            } else {
                println!("Parameters valid ({} supplied, rest defaulted)", supplied);
            }
            Ok(())
        }
        Err(errors) => {
            if json_mode {
                let violations: Vec<_> = errors
                    .iter()
                    .map(|v| {
                        serde_json::json!({
                            "parameter": v.parameter,
                            "rule": v.rule.to_string(),
                        })
                    })
                    .collect();
                let output = serde_json::json!({
                    "valid": false,
                    "violations": violations,
                });
                println!("{}", to_json(&output)?);
            }
            Err(TransitError::Validation(errors))
        }
    }
}

// =============================================================================
// PLAN COMMAND
// =============================================================================

/// Compose the plan and print or write it.
pub fn cmd_plan(
    config: &TransitConfig,
    output: Option<&Path>,
    format: &str,
    json_mode: bool,
) -> Result<(), TransitError> {
    let validated_output = output.map(validate_output_path).transpose()?;
    let plan = compose_plan(config)?;

    let data = match format {
        "json" => to_json(&plan)?.into_bytes(),
        "canonical" => {
            if validated_output.is_none() {
                return Err(TransitError::SerializationError(
                    "Canonical format is binary; use --output".to_string(),
                ));
            }
            export_canonical(&plan)?
        }
        _ => {
            return Err(TransitError::SerializationError(format!(
                "Unknown format: {}. Use: json, canonical",
                format
            )));
        }
    };

    let Some(path) = validated_output else {
        println!("{}", String::from_utf8_lossy(&data));
        return Ok(());
    };

    std::fs::write(&path, &data).map_err(|e| {
        TransitError::IoError(format!("Failed to write '{}': {}", path.display(), e))
    })?;

    let active = plan.active_resources().count();
    if json_mode {
        let output = serde_json::json!({
            "output": path.display().to_string(),
            "format": format,
            "bytes": data.len(),
            "run_type": plan.run_type.to_string(),
            "resources": plan.resources.len(),
            "active_resources": active,
            "grants": plan.grants.len(),
            "event_trigger": plan.event_trigger.is_active(),
        });
        println!("{}", to_json(&output)?);
    } else {
        println!("Plan written to {}", path.display());
        println!("  Run type:      {}", plan.run_type);
        println!("  Resources:     {} ({} active)", plan.resources.len(), active);
        println!("  Grants:        {}", plan.grants.len());
        println!(
            "  Event trigger: {}",
            if plan.event_trigger.is_active() { "active" } else { "inactive" }
        );
    }
    Ok(())
}

// =============================================================================
// ENV COMMAND
// =============================================================================

/// Render the environment contract of a compute role.
pub fn cmd_env(
    config: &TransitConfig,
    role: Option<&str>,
    json_mode: bool,
) -> Result<(), TransitError> {
    let plan = compose_plan(config)?;

    let role = match role {
        Some(name) => ComputeRole::parse(name).ok_or_else(|| {
            TransitError::SerializationError(format!(
                "Unknown role: {}. Use: discovery, worker",
                name
            ))
        })?,
        None => plan.environment.role,
    };

    if role != plan.environment.role {
        tracing::warn!(
            role = role.as_str(),
            selected = plan.environment.role.as_str(),
            "role is not provisioned by this plan"
        );
    }

    let contract = plan.contract_for(role)?;
    if json_mode {
        let output = serde_json::json!({
            "role": role.as_str(),
            "variables": contract.variables,
        });
        println!("{}", to_json(&output)?);
    } else {
        print!("{}", contract.to_dotenv());
    }
    Ok(())
}

// =============================================================================
// OUTPUTS COMMAND
// =============================================================================

/// Show the published outputs of the composed plan.
pub fn cmd_outputs(config: &TransitConfig, json_mode: bool) -> Result<(), TransitError> {
    let plan = compose_plan(config)?;
    let entries = plan.outputs.entries();

    if json_mode {
        let map: serde_json::Map<String, serde_json::Value> = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::from(v)))
            .collect();
        println!("{}", to_json(&map)?);
    } else {
        for (name, value) in entries {
            println!("{:<22} {}", name, value);
        }
    }
    Ok(())
}

// =============================================================================
// HASH COMMAND
// =============================================================================

/// Print the canonical checksum and BLAKE3 hash of the composed plan.
pub fn cmd_hash(config: &TransitConfig, json_mode: bool) -> Result<(), TransitError> {
    let plan = compose_plan(config)?;
    let checksum = canonical_checksum(&plan)?;
    let hash = plan_hash(&plan)?;

    if json_mode {
        let output = serde_json::json!({
            "checksum": checksum,
            "blake3": hash,
            "resources": plan.resources.len(),
            "grants": plan.grants.len(),
        });
        println!("{}", to_json(&output)?);
    } else {
        println!("Checksum: {}", checksum);
        println!("BLAKE3:   {}", hash);
    }
    Ok(())
}

// =============================================================================
// VERIFY COMMAND
// =============================================================================

/// Check a canonical plan file's header and checksum.
///
/// With `compare`, also check it is the plan the current parameters produce.
pub fn cmd_verify(
    config: &TransitConfig,
    input: &Path,
    compare: bool,
    json_mode: bool,
) -> Result<(), TransitError> {
    let validated_input = validate_file_path(input)?;
    validate_file_size(&validated_input, MAX_PLAN_FILE_SIZE)?;

    let data = std::fs::read(&validated_input).map_err(|e| {
        TransitError::IoError(format!(
            "Failed to read '{}': {}",
            validated_input.display(),
            e
        ))
    })?;
    let imported = import_canonical(&data)?;

    let matches = if compare {
        let current = compose_plan(config)?;
        Some(verify_canonical(&current, &data)?)
    } else {
        None
    };

    if json_mode {
        let output = serde_json::json!({
            "input": validated_input.display().to_string(),
            "stack": imported.context.stack_name,
            "run_type": imported.run_type.to_string(),
            "resources": imported.resources.len(),
            "grants": imported.grants.len(),
            "matches_current": matches,
        });
        println!("{}", to_json(&output)?);
    } else {
        println!("Plan file OK: {}", validated_input.display());
        println!("  Stack:     {}", imported.context.stack_name);
        println!("  Run type:  {}", imported.run_type);
        println!("  Resources: {}", imported.resources.len());
        if let Some(matches) = matches {
            println!("  Matches current parameters: {}", if matches { "yes" } else { "no" });
        }
    }

    if matches == Some(false) {
        return Err(TransitError::InvariantViolation(
            "plan file differs from the plan composed from the current parameters".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// APPLY COMMAND
// =============================================================================

/// Hand the plan to a provisioning backend.
///
/// Only the dry-run backend ships with this binary.
pub fn cmd_apply(
    config: &TransitConfig,
    dry_run: bool,
    json_mode: bool,
) -> Result<(), TransitError> {
    if !dry_run {
        return Err(TransitError::Provisioning(
            "no provisioning backend configured; rerun with --dry-run".to_string(),
        ));
    }

    let plan = compose_plan(config)?;
    let stack = DryRunBackend::new().provision(&plan)?;

    tracing::info!(
        stack = %stack.stack_name,
        realized = stack.realized.len(),
        deferred = stack.deferred.len(),
        "dry run complete"
    );

    if json_mode {
        println!("{}", to_json(&stack)?);
    } else {
        println!("Dry run for stack '{}'", stack.stack_name);
        for (id, name) in &stack.realized {
            println!("  + {:<32} {}", id.as_str(), name);
        }
        for id in &stack.deferred {
            println!("  ~ {:<32} (condition false)", id.as_str());
        }
        for (name, value) in &stack.outputs {
            println!("  > {:<32} {}", name, value);
        }
    }
    Ok(())
}
