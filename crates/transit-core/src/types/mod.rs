//! # Core Type Definitions
//!
//! This module contains the types shared by every composer:
//! - Resource identifiers and typed handles (`ResourceId`, `LedgerHandle`, ...)
//! - The deployment context used for naming and ARN rendering
//! - Error types (`TransitError`, `ValidationErrors`, `Violation`)
//!
//! ## Determinism Guarantees
//!
//! All identifiers implement `Ord` so they can key `BTreeMap`/`BTreeSet`
//! collections and render in a stable order.

use crate::primitives::{ACCOUNT_TOKEN, DEFAULT_PARTITION, DEFAULT_STACK_NAME, REGION_TOKEN};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// RESOURCE IDENTIFIERS
// =============================================================================

/// Logical identifier of a resource in the resource graph.
///
/// Logical ids are stable across compositions; physical names are derived
/// from the deployment context.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    /// Create a new resource id.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// TYPED HANDLES
// =============================================================================

/// Declares a typed, non-forgeable handle to a resource in the graph.
///
/// Handles can only be minted inside this crate, by the composer that owns
/// the resource. Downstream composers receive them by reference.
macro_rules! resource_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name {
            id: ResourceId,
            name: String,
        }

        impl $name {
            pub(crate) fn new(id: ResourceId, name: impl Into<String>) -> Self {
                Self {
                    id,
                    name: name.into(),
                }
            }

            /// Logical id of the resource.
            #[must_use]
            pub fn id(&self) -> &ResourceId {
                &self.id
            }

            /// Physical name of the resource.
            #[must_use]
            pub fn name(&self) -> &str {
                &self.name
            }
        }
    };
}

resource_handle!(
    /// The job ledger (per-object transfer state table).
    LedgerHandle
);
resource_handle!(
    /// The work queue carrying per-object transfer tasks.
    QueueHandle
);
resource_handle!(
    /// The dead-letter queue attached to the work queue.
    DlqHandle
);
resource_handle!(
    /// The notification topic the DLQ alarm publishes to.
    AlarmTopicHandle
);
resource_handle!(
    /// The rotating key encrypting the alarm topic.
    KeyHandle
);
resource_handle!(
    /// The role assumed by the discovery process (CLUSTER mode).
    DiscoveryRoleHandle
);
resource_handle!(
    /// The role assumed by the worker fleet (FLEET mode).
    WorkerRoleHandle
);
resource_handle!(
    /// The autoscaling worker fleet (FLEET mode).
    FleetHandle
);

// =============================================================================
// DEPLOYMENT CONTEXT
// =============================================================================

/// Where the plan is deployed: used for physical names and rendered ARNs.
///
/// Region and account default to placeholder tokens that the provisioning
/// backend resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentContext {
    /// Prefix of every physical name.
    pub stack_name: String,
    /// ARN partition (`aws`, `aws-cn`, ...).
    pub partition: String,
    /// Deployment region.
    pub region: String,
    /// Deployment account id.
    pub account: String,
}

impl Default for DeploymentContext {
    fn default() -> Self {
        Self {
            stack_name: DEFAULT_STACK_NAME.to_string(),
            partition: DEFAULT_PARTITION.to_string(),
            region: REGION_TOKEN.to_string(),
            account: ACCOUNT_TOKEN.to_string(),
        }
    }
}

impl DeploymentContext {
    /// Physical name for a resource: `{stack}-{suffix}`.
    #[must_use]
    pub fn physical_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.stack_name, suffix)
    }

    /// Render a regional ARN for a resource of the given service.
    #[must_use]
    pub fn arn(&self, service: &str, resource: &str) -> String {
        format!(
            "arn:{}:{}:{}:{}:{}",
            self.partition, service, self.region, self.account, resource
        )
    }

    /// Root principal of the deployment account.
    #[must_use]
    pub fn account_root(&self) -> String {
        format!("arn:{}:iam::{}:root", self.partition, self.account)
    }
}

// =============================================================================
// VALIDATION ERRORS
// =============================================================================

/// A constraint a parameter value violated.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ViolationRule {
    /// The parameter has no default and no value was supplied.
    #[error("a value is required")]
    Required,

    /// The supplied value name does not match any declared parameter.
    #[error("unknown parameter")]
    Unknown,

    /// The value cannot be coerced to the declared kind.
    #[error("expected a {expected} value, got {found:?}")]
    TypeMismatch { expected: String, found: String },

    /// The value is not a member of the allowed set.
    #[error("{value:?} is not one of [{}]", .allowed.join(", "))]
    NotAllowed { value: String, allowed: Vec<String> },

    /// The value does not match the validation pattern.
    #[error("{value:?} does not match pattern {pattern}")]
    PatternMismatch { value: String, pattern: String },

    /// A list has fewer distinct entries than required.
    #[error("at least {min} distinct entries required, got {found}")]
    TooFewEntries { min: usize, found: usize },

    /// A numeric value is outside its bounds.
    #[error("{value} is outside the range {min}..={max}")]
    OutOfRange { value: i64, min: i64, max: i64 },

    /// A string value is longer than allowed.
    #[error("value longer than {max} bytes")]
    TooLong { max: usize },

    /// Capacity bounds are inconsistent with each other.
    #[error("min-capacity {min} <= desired-capacity {desired} <= max-capacity {max} does not hold")]
    CapacityOrder { min: u32, desired: u32, max: u32 },
}

/// One violated constraint, naming the parameter and the rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Name of the offending parameter.
    pub parameter: String,
    /// The violated rule.
    pub rule: ViolationRule,
}

impl Violation {
    /// Create a new violation.
    #[must_use]
    pub fn new(parameter: impl Into<String>, rule: ViolationRule) -> Self {
        Self {
            parameter: parameter.into(),
            rule,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.parameter, self.rule)
    }
}

/// Every violation found in a parameter set, in declaration order.
///
/// Validation never short-circuits: all violations are reported together.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationErrors(Vec<Violation>);

impl ValidationErrors {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation.
    pub fn push(&mut self, violation: Violation) {
        self.0.push(violation);
    }

    /// Append every violation of another collection.
    pub fn merge(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }

    /// True if no violation was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the violations.
    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }

    /// True if some violation names the given parameter.
    #[must_use]
    pub fn mentions(&self, parameter: &str) -> bool {
        self.0.iter().any(|v| v.parameter == parameter)
    }

    /// `Ok(())` when empty, otherwise the collected violations.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} parameter violation(s)", self.0.len())?;
        for violation in &self.0 {
            write!(f, "\n  - {}", violation)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while composing or exporting a deployment plan.
///
/// - No silent failures
/// - Any error aborts the whole composition; no partial plan is produced
/// - The composer never panics
#[derive(Debug, Error)]
pub enum TransitError {
    /// One or more parameters are malformed or missing.
    #[error("Invalid parameters: {0}")]
    Validation(ValidationErrors),

    /// Composers were wired together incorrectly. This is a defect.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The provisioning backend rejected the plan.
    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<ValidationErrors> for TransitError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_names_use_stack_prefix() {
        let ctx = DeploymentContext::default();
        assert_eq!(ctx.physical_name("work-queue"), "transit-work-queue");
    }

    #[test]
    fn arn_rendering() {
        let ctx = DeploymentContext {
            region: "eu-west-1".to_string(),
            account: "123456789012".to_string(),
            ..DeploymentContext::default()
        };
        assert_eq!(
            ctx.arn("sqs", "transit-work-queue"),
            "arn:aws:sqs:eu-west-1:123456789012:transit-work-queue"
        );
        assert_eq!(ctx.account_root(), "arn:aws:iam::123456789012:root");
    }

    #[test]
    fn validation_errors_render_every_violation() {
        let mut errors = ValidationErrors::new();
        errors.push(Violation::new("vpc-id", ViolationRule::Required));
        errors.push(Violation::new(
            "subnet-ids",
            ViolationRule::TooFewEntries { min: 2, found: 1 },
        ));

        let rendered = errors.to_string();
        assert!(rendered.starts_with("2 parameter violation(s)"));
        assert!(rendered.contains("vpc-id: a value is required"));
        assert!(rendered.contains("subnet-ids: at least 2 distinct entries required, got 1"));
        assert!(errors.mentions("vpc-id"));
        assert!(!errors.mentions("alarm-email"));
    }

    #[test]
    fn empty_validation_errors_are_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }
}
