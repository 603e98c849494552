//! # Parameter Catalog
//!
//! Declaration and validation of every deployment parameter.
//!
//! - Declarations are threaded through a `ParameterCatalogBuilder` value
//! - The finished `ParameterCatalog` is immutable
//! - Validation collects every violation; it never stops at the first one
//! - The presentation grouping (groups + labels) follows declaration order

use crate::params::{
    CapacityParams, CatalogEnum, ObjectAcl, RunType, SourceType, StorageClass, TriggerMode,
};
use crate::primitives::{
    EMAIL_PATTERN, MAX_NUMERIC_PARAMETER, MAX_PARAMETER_VALUE_LENGTH, MIN_SUBNET_COUNT,
    SCHEDULE_PATTERN, VPC_ID_PATTERN,
};
use crate::{TransitError, ValidationErrors, Violation, ViolationRule};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Parameter names, as they appear in parameter files and on the CLI.
pub mod names {
    pub const SOURCE_TYPE: &str = "source-type";
    pub const SOURCE_BUCKET: &str = "source-bucket";
    pub const SOURCE_PREFIX: &str = "source-prefix";
    pub const SOURCE_REGION: &str = "source-region";
    pub const SOURCE_ENDPOINT: &str = "source-endpoint";
    pub const SOURCE_IN_CURRENT_ACCOUNT: &str = "source-in-current-account";
    pub const SOURCE_CREDENTIALS: &str = "source-credentials";

    pub const DESTINATION_BUCKET: &str = "destination-bucket";
    pub const DESTINATION_PREFIX: &str = "destination-prefix";
    pub const DESTINATION_REGION: &str = "destination-region";
    pub const DESTINATION_IN_CURRENT_ACCOUNT: &str = "destination-in-current-account";
    pub const DESTINATION_CREDENTIALS: &str = "destination-credentials";
    pub const DESTINATION_STORAGE_CLASS: &str = "destination-storage-class";
    pub const DESTINATION_ACL: &str = "destination-acl";

    pub const ALARM_EMAIL: &str = "alarm-email";
    pub const EVENT_TRIGGER_MODE: &str = "event-trigger-mode";

    pub const RUN_TYPE: &str = "run-type";
    pub const CLUSTER_NAME: &str = "cluster-name";
    pub const VPC_ID: &str = "vpc-id";
    pub const SUBNET_IDS: &str = "subnet-ids";
    pub const DISCOVERY_SCHEDULE: &str = "discovery-schedule";

    pub const INCLUDE_METADATA: &str = "include-metadata";
    pub const DISCOVERY_DEPTH: &str = "discovery-depth";
    pub const DISCOVERY_PARALLELISM: &str = "discovery-parallelism";
    pub const WORKER_THREADS: &str = "worker-threads";

    pub const MIN_CAPACITY: &str = "min-capacity";
    pub const MAX_CAPACITY: &str = "max-capacity";
    pub const DESIRED_CAPACITY: &str = "desired-capacity";
    pub const WORKER_MEMORY_MIB: &str = "worker-memory-mib";
}

// =============================================================================
// VALUES
// =============================================================================

/// The declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    String,
    Number,
    List,
    Enum,
}

impl ParamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::List => "list",
            ParamKind::Enum => "enum",
        }
    }
}

/// An unvalidated value as supplied by a parameter file or the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Text(String),
    Integer(i64),
    Bool(bool),
    List(Vec<String>),
}

impl RawValue {
    fn describe(&self) -> String {
        match self {
            RawValue::Text(s) => s.clone(),
            RawValue::Integer(i) => i.to_string(),
            RawValue::Bool(b) => b.to_string(),
            RawValue::List(items) => format!("[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

/// A validated, kind-coerced parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamValue {
    Text(String),
    Number(i64),
    List(Vec<String>),
}

// =============================================================================
// DECLARATIONS
// =============================================================================

/// Declaration of a single parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    /// `None` marks the parameter as required.
    pub default: Option<ParamValue>,
    pub allowed_values: Option<Vec<String>>,
    pub pattern: Option<String>,
    /// Lower bound for numbers.
    pub min: Option<i64>,
    /// Minimum entry count for lists.
    pub min_entries: Option<usize>,
    pub label: String,
    pub group: String,
}

impl ParameterSpec {
    fn base(name: &str, kind: ParamKind, label: &str, group: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            default: None,
            allowed_values: None,
            pattern: None,
            min: None,
            min_entries: None,
            label: label.to_string(),
            group: group.to_string(),
        }
    }

    /// A required free-form string.
    #[must_use]
    pub fn string(name: &str, label: &str, group: &str) -> Self {
        Self::base(name, ParamKind::String, label, group)
    }

    /// A required non-negative integer.
    #[must_use]
    pub fn number(name: &str, label: &str, group: &str) -> Self {
        Self::base(name, ParamKind::Number, label, group)
    }

    /// A required list of strings.
    #[must_use]
    pub fn list(name: &str, label: &str, group: &str) -> Self {
        Self::base(name, ParamKind::List, label, group)
    }

    /// An enumeration; the first allowed value is the default.
    #[must_use]
    pub fn enumeration(name: &str, allowed: &[&str], label: &str, group: &str) -> Self {
        let mut spec = Self::base(name, ParamKind::Enum, label, group);
        spec.default = allowed.first().map(|v| ParamValue::Text((*v).to_string()));
        spec.allowed_values = Some(allowed.iter().map(|v| (*v).to_string()).collect());
        spec
    }

    /// A boolean, declared as an enumeration of `true` / `false`.
    #[must_use]
    pub fn flag(name: &str, default: bool, label: &str, group: &str) -> Self {
        Self::enumeration(name, &["true", "false"], label, group)
            .with_default(ParamValue::Text(default.to_string()))
    }

    #[must_use]
    pub fn with_default(mut self, default: ParamValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Shorthand for a string default.
    #[must_use]
    pub fn with_text_default(self, default: &str) -> Self {
        self.with_default(ParamValue::Text(default.to_string()))
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }

    #[must_use]
    pub fn with_min(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    #[must_use]
    pub fn with_min_entries(mut self, min_entries: usize) -> Self {
        self.min_entries = Some(min_entries);
        self
    }

    /// True if the parameter has no default.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// A declared parameter with its compiled validation pattern.
#[derive(Debug, Clone)]
pub struct Parameter {
    spec: ParameterSpec,
    pattern: Option<Regex>,
}

impl Parameter {
    /// The declaration.
    #[must_use]
    pub fn spec(&self) -> &ParameterSpec {
        &self.spec
    }

    /// Coerce and check a single value against this declaration.
    ///
    /// Every violated rule is pushed to `errors`; returns the coerced value
    /// only when no rule was violated.
    fn check(&self, raw: &RawValue, errors: &mut ValidationErrors) -> Option<ParamValue> {
        let name = self.spec.name.as_str();
        let before = errors.len();

        let value = match (self.spec.kind, raw) {
            (ParamKind::String | ParamKind::Enum, RawValue::Text(s)) => ParamValue::Text(s.clone()),
            (ParamKind::String | ParamKind::Enum, RawValue::Integer(i)) => {
                ParamValue::Text(i.to_string())
            }
            (ParamKind::String | ParamKind::Enum, RawValue::Bool(b)) => {
                ParamValue::Text(b.to_string())
            }
            (ParamKind::Number, RawValue::Integer(i)) => ParamValue::Number(*i),
            (ParamKind::Number, RawValue::Text(s)) => match s.trim().parse::<i64>() {
                Ok(i) => ParamValue::Number(i),
                Err(_) => {
                    errors.push(self.type_mismatch(raw));
                    return None;
                }
            },
            (ParamKind::List, RawValue::List(items)) => ParamValue::List(
                items
                    .iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            (ParamKind::List, RawValue::Text(s)) => ParamValue::List(
                s.split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect(),
            ),
            _ => {
                errors.push(self.type_mismatch(raw));
                return None;
            }
        };

        match &value {
            ParamValue::Text(s) => {
                if s.is_empty() && self.spec.is_required() {
                    errors.push(Violation::new(name, ViolationRule::Required));
                }
                if s.len() > MAX_PARAMETER_VALUE_LENGTH {
                    errors.push(Violation::new(
                        name,
                        ViolationRule::TooLong {
                            max: MAX_PARAMETER_VALUE_LENGTH,
                        },
                    ));
                }
                if let Some(allowed) = &self.spec.allowed_values
                    && !allowed.iter().any(|a| a == s)
                {
                    errors.push(Violation::new(
                        name,
                        ViolationRule::NotAllowed {
                            value: s.clone(),
                            allowed: allowed.clone(),
                        },
                    ));
                }
                if let (Some(re), Some(pattern)) = (&self.pattern, &self.spec.pattern)
                    && !s.is_empty()
                    && !re.is_match(s)
                {
                    errors.push(Violation::new(
                        name,
                        ViolationRule::PatternMismatch {
                            value: s.clone(),
                            pattern: pattern.clone(),
                        },
                    ));
                }
            }
            ParamValue::Number(i) => {
                let min = self.spec.min.unwrap_or(0);
                if *i < min || *i > MAX_NUMERIC_PARAMETER {
                    errors.push(Violation::new(
                        name,
                        ViolationRule::OutOfRange {
                            value: *i,
                            min,
                            max: MAX_NUMERIC_PARAMETER,
                        },
                    ));
                }
            }
            ParamValue::List(items) => {
                if items.is_empty() && self.spec.is_required() {
                    errors.push(Violation::new(name, ViolationRule::Required));
                } else if let Some(min) = self.spec.min_entries {
                    let distinct = items.iter().collect::<BTreeSet<_>>().len();
                    if distinct < min {
                        errors.push(Violation::new(
                            name,
                            ViolationRule::TooFewEntries {
                                min,
                                found: distinct,
                            },
                        ));
                    }
                }
            }
        }

        (errors.len() == before).then_some(value)
    }

    fn type_mismatch(&self, raw: &RawValue) -> Violation {
        Violation::new(
            self.spec.name.as_str(),
            ViolationRule::TypeMismatch {
                expected: self.spec.kind.as_str().to_string(),
                found: raw.describe(),
            },
        )
    }
}

// =============================================================================
// PRESENTATION
// =============================================================================

/// A labelled group of parameters, for operator UX.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterGroup {
    pub label: String,
    pub parameters: Vec<String>,
}

/// Grouping and labels of the catalog, in declaration order.
///
/// Functionally inert; produced deterministically so plans are reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Presentation {
    pub groups: Vec<ParameterGroup>,
    pub labels: BTreeMap<String, String>,
}

// =============================================================================
// BUILDER
// =============================================================================

/// Accumulates declarations and their presentation grouping.
#[derive(Debug, Default)]
pub struct ParameterCatalogBuilder {
    parameters: Vec<Parameter>,
    presentation: Presentation,
}

impl ParameterCatalogBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter.
    ///
    /// Declaring the same name twice, or an uncompilable pattern, is a
    /// defect in the declaring code and reported as an invariant violation.
    pub fn declare(mut self, spec: ParameterSpec) -> Result<Self, TransitError> {
        if self.parameters.iter().any(|p| p.spec.name == spec.name) {
            return Err(TransitError::InvariantViolation(format!(
                "parameter '{}' declared twice",
                spec.name
            )));
        }

        let pattern = spec
            .pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| {
                TransitError::InvariantViolation(format!(
                    "parameter '{}' has an invalid pattern: {}",
                    spec.name, e
                ))
            })?;

        match self
            .presentation
            .groups
            .iter_mut()
            .find(|g| g.label == spec.group)
        {
            Some(group) => group.parameters.push(spec.name.clone()),
            None => self.presentation.groups.push(ParameterGroup {
                label: spec.group.clone(),
                parameters: vec![spec.name.clone()],
            }),
        }
        self.presentation
            .labels
            .insert(spec.name.clone(), spec.label.clone());

        self.parameters.push(Parameter { spec, pattern });
        Ok(self)
    }

    /// Freeze the catalog.
    #[must_use]
    pub fn build(self) -> ParameterCatalog {
        ParameterCatalog {
            parameters: self.parameters,
            presentation: self.presentation,
        }
    }
}

// =============================================================================
// CATALOG
// =============================================================================

/// The immutable set of declared parameters.
#[derive(Debug, Clone)]
pub struct ParameterCatalog {
    parameters: Vec<Parameter>,
    presentation: Presentation,
}

impl ParameterCatalog {
    /// The full catalog of a transfer deployment.
    pub fn standard() -> Result<Self, TransitError> {
        use names::*;

        const SOURCE: &str = "Source Information";
        const DESTINATION: &str = "Destination Information";
        const NOTIFICATION: &str = "Notification";
        const EVENTS: &str = "Event Trigger";
        const COMPUTE: &str = "Compute & Network";
        const ADVANCED: &str = "Advanced Options";
        const FLEET: &str = "Worker Fleet (fleet run type only)";

        let builder = ParameterCatalogBuilder::new()
            .declare(ParameterSpec::enumeration(
                SOURCE_TYPE,
                SourceType::VALUES,
                "Source Type",
                SOURCE,
            ))?
            .declare(ParameterSpec::string(SOURCE_BUCKET, "Source Bucket", SOURCE))?
            .declare(
                ParameterSpec::string(SOURCE_PREFIX, "Source Prefix", SOURCE).with_text_default(""),
            )?
            .declare(
                ParameterSpec::string(SOURCE_REGION, "Source Region", SOURCE).with_text_default(""),
            )?
            .declare(
                ParameterSpec::string(SOURCE_ENDPOINT, "Source Endpoint URL", SOURCE)
                    .with_text_default(""),
            )?
            .declare(ParameterSpec::flag(
                SOURCE_IN_CURRENT_ACCOUNT,
                false,
                "Source In Current Account",
                SOURCE,
            ))?
            .declare(
                ParameterSpec::string(SOURCE_CREDENTIALS, "Source Credentials Secret", SOURCE)
                    .with_text_default(""),
            )?
            .declare(ParameterSpec::string(
                DESTINATION_BUCKET,
                "Destination Bucket",
                DESTINATION,
            ))?
            .declare(
                ParameterSpec::string(DESTINATION_PREFIX, "Destination Prefix", DESTINATION)
                    .with_text_default(""),
            )?
            .declare(
                ParameterSpec::string(DESTINATION_REGION, "Destination Region", DESTINATION)
                    .with_text_default(""),
            )?
            .declare(ParameterSpec::flag(
                DESTINATION_IN_CURRENT_ACCOUNT,
                false,
                "Destination In Current Account",
                DESTINATION,
            ))?
            .declare(
                ParameterSpec::string(
                    DESTINATION_CREDENTIALS,
                    "Destination Credentials Secret",
                    DESTINATION,
                )
                .with_text_default(""),
            )?
            .declare(ParameterSpec::enumeration(
                DESTINATION_STORAGE_CLASS,
                StorageClass::VALUES,
                "Destination Storage Class",
                DESTINATION,
            ))?
            .declare(
                ParameterSpec::enumeration(
                    DESTINATION_ACL,
                    ObjectAcl::VALUES,
                    "Destination Object ACL",
                    DESTINATION,
                )
                .with_text_default(ObjectAcl::BucketOwnerFullControl.as_str()),
            )?
            .declare(
                ParameterSpec::string(ALARM_EMAIL, "Alarm Email", NOTIFICATION)
                    .with_pattern(EMAIL_PATTERN),
            )?
            .declare(ParameterSpec::enumeration(
                EVENT_TRIGGER_MODE,
                TriggerMode::VALUES,
                "Event Trigger Mode",
                EVENTS,
            ))?
            .declare(ParameterSpec::enumeration(
                RUN_TYPE,
                RunType::VALUES,
                "Run Type",
                COMPUTE,
            ))?
            .declare(
                ParameterSpec::string(CLUSTER_NAME, "Cluster Name", COMPUTE).with_text_default(""),
            )?
            .declare(ParameterSpec::string(VPC_ID, "VPC Id", COMPUTE).with_pattern(VPC_ID_PATTERN))?
            .declare(
                ParameterSpec::list(SUBNET_IDS, "Subnet Ids", COMPUTE)
                    .with_min_entries(MIN_SUBNET_COUNT),
            )?
            .declare(
                ParameterSpec::string(DISCOVERY_SCHEDULE, "Discovery Schedule", COMPUTE)
                    .with_text_default("rate(60 minutes)")
                    .with_pattern(SCHEDULE_PATTERN),
            )?
            .declare(ParameterSpec::flag(
                INCLUDE_METADATA,
                true,
                "Include Metadata",
                ADVANCED,
            ))?
            .declare(
                ParameterSpec::number(DISCOVERY_DEPTH, "Discovery Depth", ADVANCED)
                    .with_default(ParamValue::Number(0))
                    .with_min(0),
            )?
            .declare(
                ParameterSpec::number(DISCOVERY_PARALLELISM, "Discovery Parallelism", ADVANCED)
                    .with_default(ParamValue::Number(1))
                    .with_min(1),
            )?
            .declare(
                ParameterSpec::number(WORKER_THREADS, "Worker Threads", ADVANCED)
                    .with_default(ParamValue::Number(4))
                    .with_min(1),
            )?
            .declare(
                ParameterSpec::number(MIN_CAPACITY, "Minimum Capacity", FLEET)
                    .with_default(ParamValue::Number(1))
                    .with_min(0),
            )?
            .declare(
                ParameterSpec::number(MAX_CAPACITY, "Maximum Capacity", FLEET)
                    .with_default(ParamValue::Number(20))
                    .with_min(0),
            )?
            .declare(
                ParameterSpec::number(DESIRED_CAPACITY, "Desired Capacity", FLEET)
                    .with_default(ParamValue::Number(1))
                    .with_min(0),
            )?
            .declare(
                ParameterSpec::number(WORKER_MEMORY_MIB, "Worker Memory (MiB)", FLEET)
                    .with_default(ParamValue::Number(2048))
                    .with_min(512),
            )?;

        Ok(builder.build())
    }

    /// Declared parameters, in declaration order.
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    /// Look up a declaration by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.spec.name == name)
    }

    /// Presentation grouping and labels.
    #[must_use]
    pub fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    /// Validate supplied values against the catalog.
    ///
    /// Missing values fall back to declared defaults. Every violation is
    /// collected; the result is either a complete `ParameterSet` or the full
    /// list of violations.
    pub fn validate(
        &self,
        values: &BTreeMap<String, RawValue>,
    ) -> Result<ParameterSet, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut resolved = BTreeMap::new();
        let mut supplied = BTreeSet::new();

        for parameter in &self.parameters {
            let name = parameter.spec.name.as_str();
            match values.get(name) {
                Some(raw) => {
                    supplied.insert(name.to_string());
                    if let Some(value) = parameter.check(raw, &mut errors) {
                        resolved.insert(name.to_string(), value);
                    }
                }
                None => match &parameter.spec.default {
                    Some(default) => {
                        resolved.insert(name.to_string(), default.clone());
                    }
                    None => errors.push(Violation::new(name, ViolationRule::Required)),
                },
            }
        }

        for name in values.keys() {
            if self.get(name).is_none() {
                errors.push(Violation::new(name.as_str(), ViolationRule::Unknown));
            }
        }

        if let Some(capacity) = resolved_capacity(&resolved)
            && let Err(order) = capacity.check_order()
        {
            errors.merge(order);
        }

        if !errors.is_empty() {
            tracing::warn!(violations = errors.len(), "parameter set rejected");
            return Err(errors);
        }

        tracing::debug!(
            parameters = resolved.len(),
            supplied = supplied.len(),
            "parameter set validated"
        );
        Ok(ParameterSet {
            values: resolved,
            supplied,
        })
    }
}

/// Capacity bounds from resolved values, when all three passed their own checks.
fn resolved_capacity(resolved: &BTreeMap<String, ParamValue>) -> Option<CapacityParams> {
    let bound = |name: &str| match resolved.get(name) {
        Some(ParamValue::Number(n)) => u32::try_from(*n).ok(),
        _ => None,
    };
    Some(CapacityParams {
        min: bound(names::MIN_CAPACITY)?,
        max: bound(names::MAX_CAPACITY)?,
        desired: bound(names::DESIRED_CAPACITY)?,
    })
}

// =============================================================================
// PARAMETER SET
// =============================================================================

/// A validated, complete set of parameter values.
///
/// Immutable once composition begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSet {
    values: BTreeMap<String, ParamValue>,
    supplied: BTreeSet<String>,
}

impl ParameterSet {
    /// Raw access to a value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// True if the value came from the caller rather than a default.
    #[must_use]
    pub fn is_supplied(&self, name: &str) -> bool {
        self.supplied.contains(name)
    }

    /// All values, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// A string or enum value.
    pub fn text(&self, name: &str) -> Result<&str, TransitError> {
        match self.values.get(name) {
            Some(ParamValue::Text(s)) => Ok(s),
            _ => Err(missing(name, "string")),
        }
    }

    /// A numeric value.
    pub fn number(&self, name: &str) -> Result<i64, TransitError> {
        match self.values.get(name) {
            Some(ParamValue::Number(i)) => Ok(*i),
            _ => Err(missing(name, "number")),
        }
    }

    /// A list value.
    pub fn list(&self, name: &str) -> Result<&[String], TransitError> {
        match self.values.get(name) {
            Some(ParamValue::List(items)) => Ok(items),
            _ => Err(missing(name, "list")),
        }
    }

    /// A `true` / `false` flag.
    pub fn flag(&self, name: &str) -> Result<bool, TransitError> {
        match self.text(name)? {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(missing(name, "flag")),
        }
    }
}

fn missing(name: &str, kind: &str) -> TransitError {
    TransitError::InvariantViolation(format!(
        "validated parameter set has no {} value for '{}'",
        kind, name
    ))
}

// =============================================================================
// TESTS
// =============================================================================
