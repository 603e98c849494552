//! # Parameter Files
//!
//! Loads the operator's parameter file and applies command-line overrides.
//!
//! ```toml
//! [context]
//! stack-name = "transit"
//! region = "us-west-2"
//!
//! [parameters]
//! source-bucket = "src"
//! subnet-ids = ["subnet-a", "subnet-b"]
//! source-in-current-account = true
//! min-capacity = 1
//! ```
//!
//! Values stay raw here; coercion and validation belong to the catalog.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use transit_core::{DeploymentContext, RawValue, TransitError};

/// File read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "transit.toml";

/// Maximum accepted parameter file size (1 MiB).
pub const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ContextSection {
    stack_name: Option<String>,
    partition: Option<String>,
    region: Option<String>,
    account: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    context: ContextSection,
    #[serde(default)]
    parameters: toml::Table,
}

/// Raw parameter values plus the deployment context they are composed in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitConfig {
    pub values: BTreeMap<String, RawValue>,
    pub context: DeploymentContext,
}

impl TransitConfig {
    /// Parse a parameter file body.
    pub fn from_toml_str(body: &str) -> Result<Self, TransitError> {
        let file: ConfigFile = toml::from_str(body).map_err(|e| {
            TransitError::SerializationError(format!("Invalid parameter file: {}", e))
        })?;

        let mut context = DeploymentContext::default();
        let ContextSection {
            stack_name,
            partition,
            region,
            account,
        } = file.context;
        if let Some(stack_name) = stack_name {
            if stack_name.trim().is_empty() {
                return Err(TransitError::SerializationError(
                    "context.stack-name must not be empty".to_string(),
                ));
            }
            context.stack_name = stack_name;
        }
        if let Some(partition) = partition {
            context.partition = partition;
        }
        if let Some(region) = region {
            context.region = region;
        }
        if let Some(account) = account {
            context.account = account;
        }

        let mut values = BTreeMap::new();
        for (name, value) in file.parameters {
            let raw = raw_value(&name, value)?;
            values.insert(name, raw);
        }

        Ok(Self { values, context })
    }

    /// Read and parse a parameter file.
    pub fn load(path: &Path) -> Result<Self, TransitError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            TransitError::IoError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(TransitError::SerializationError(format!(
                "File size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let body = std::fs::read_to_string(path).map_err(|e| {
            TransitError::IoError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&body)?;

        tracing::debug!(
            path = %path.display(),
            parameters = config.values.len(),
            "parameter file loaded"
        );
        Ok(config)
    }

    /// Load an explicitly named file, or the default file when present.
    ///
    /// A missing default file yields an empty parameter set.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, TransitError> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load(path)
                } else {
                    tracing::debug!("no {} found, starting from defaults", DEFAULT_CONFIG_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply `name=value` overrides on top of the file values.
    ///
    /// Later overrides win. Values are passed through as text.
    pub fn apply_overrides(&mut self, overrides: &[String]) -> Result<(), TransitError> {
        for entry in overrides {
            let (name, value) = parse_override(entry)?;
            self.values.insert(name.to_string(), RawValue::Text(value.to_string()));
        }
        Ok(())
    }
}

/// Split a `name=value` override. The value may be empty.
pub fn parse_override(entry: &str) -> Result<(&str, &str), TransitError> {
    let (name, value) = entry.split_once('=').ok_or_else(|| {
        TransitError::SerializationError(format!(
            "Invalid override '{}': expected name=value",
            entry
        ))
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(TransitError::SerializationError(format!(
            "Invalid override '{}': empty parameter name",
            entry
        )));
    }
    Ok((name, value))
}

fn raw_value(name: &str, value: toml::Value) -> Result<RawValue, TransitError> {
    match value {
        toml::Value::String(s) => Ok(RawValue::Text(s)),
        toml::Value::Integer(i) => Ok(RawValue::Integer(i)),
        toml::Value::Boolean(b) => Ok(RawValue::Bool(b)),
        toml::Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                toml::Value::String(s) => Ok(s),
                other => Err(TransitError::SerializationError(format!(
                    "Parameter '{}': list entries must be strings, got {}",
                    name,
                    other.type_str()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(RawValue::List),
        other => Err(TransitError::SerializationError(format!(
            "Parameter '{}': unsupported value type {}",
            name,
            other.type_str()
        ))),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_keep_their_toml_shape() {
        let config = TransitConfig::from_toml_str(
            r#"
            [parameters]
            source-bucket = "src"
            subnet-ids = ["subnet-a", "subnet-b"]
            source-in-current-account = true
            min-capacity = 2
            "#,
        )
        .expect("config");

        assert_eq!(config.values.get("source-bucket"), Some(&RawValue::Text("src".into())));
        assert_eq!(
            config.values.get("subnet-ids"),
            Some(&RawValue::List(vec!["subnet-a".into(), "subnet-b".into()]))
        );
        assert_eq!(
            config.values.get("source-in-current-account"),
            Some(&RawValue::Bool(true))
        );
        assert_eq!(config.values.get("min-capacity"), Some(&RawValue::Integer(2)));
        assert_eq!(config.context, DeploymentContext::default());
    }

    #[test]
    fn context_section_overrides_defaults() {
        let config = TransitConfig::from_toml_str(
            r#"
            [context]
            stack-name = "copy-eu"
            partition = "aws-cn"
            region = "cn-north-1"
            account = "123456789012"
            "#,
        )
        .expect("config");

        assert_eq!(config.context.stack_name, "copy-eu");
        assert_eq!(config.context.partition, "aws-cn");
        assert_eq!(config.context.region, "cn-north-1");
        assert_eq!(config.context.account, "123456789012");
        assert!(config.values.is_empty());
    }

    #[test]
    fn unsupported_values_are_rejected() {
        for body in [
            "[parameters]\nratio = 1.5",
            "[parameters]\nsubnet-ids = [1, 2]",
            "[parameters.nested]\nkey = \"v\"",
            "[context]\nstack-name = \"\"",
            "[unknown]\nkey = 1",
        ] {
            let result = TransitConfig::from_toml_str(body);
            assert!(
                matches!(result, Err(TransitError::SerializationError(_))),
                "accepted: {body}"
            );
        }
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config =
            TransitConfig::from_toml_str("[parameters]\nrun-type = \"cluster\"").expect("config");
        config
            .apply_overrides(&["run-type=fleet".to_string(), "source-prefix=".to_string()])
            .expect("overrides");

        assert_eq!(config.values.get("run-type"), Some(&RawValue::Text("fleet".into())));
        assert_eq!(config.values.get("source-prefix"), Some(&RawValue::Text(String::new())));
    }

    #[test]
    fn override_needs_a_name() {
        assert_eq!(parse_override("a=b=c").expect("split"), ("a", "b=c"));
        assert!(parse_override("no-equals").is_err());
        assert!(parse_override(" =value").is_err());
    }
}
