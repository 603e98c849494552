//! # Provisioning Backend
//!
//! The seam between a composed plan and live infrastructure.
//!
//! Backends realize active resources in plan order (a topological order)
//! and report realized identifiers. Errors surface as
//! `TransitError::Provisioning` and are never retried here.

use crate::compositor::DeploymentPlan;
use crate::{ResourceId, TransitError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a backend reports after realizing a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealizedStack {
    pub stack_name: String,
    /// Logical id -> realized identifier.
    pub realized: BTreeMap<ResourceId, String>,
    /// Gated resources whose condition evaluated false.
    pub deferred: Vec<ResourceId>,
    /// Published outputs.
    pub outputs: BTreeMap<String, String>,
}

/// Turns a plan into infrastructure.
pub trait ProvisioningBackend {
    /// Realize every active resource of the plan.
    fn provision(&self, plan: &DeploymentPlan) -> Result<RealizedStack, TransitError>;
}

/// Realizes nothing; reports each resource's physical name.
#[derive(Debug, Clone, Default)]
pub struct DryRunBackend {
    reject_kind: Option<String>,
}

impl DryRunBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail provisioning on the first resource of the given kind.
    #[must_use]
    pub fn rejecting(kind: &str) -> Self {
        Self {
            reject_kind: Some(kind.to_string()),
        }
    }
}

impl ProvisioningBackend for DryRunBackend {
    fn provision(&self, plan: &DeploymentPlan) -> Result<RealizedStack, TransitError> {
        let mut stack = RealizedStack {
            stack_name: plan.context.stack_name.clone(),
            ..RealizedStack::default()
        };

        for resource in plan.active_resources() {
            if self.reject_kind.as_deref() == Some(resource.spec.kind()) {
                return Err(TransitError::Provisioning(format!(
                    "{} '{}' rejected",
                    resource.spec.kind(),
                    resource.id
                )));
            }
            tracing::debug!(resource = %resource.id, name = %resource.name, "dry-run realize");
            stack
                .realized
                .insert(resource.id.clone(), resource.name.clone());
        }

        stack.deferred = plan
            .resources
            .resources()
            .filter(|r| !stack.realized.contains_key(&r.id))
            .map(|r| r.id.clone())
            .collect();

        stack.outputs = plan
            .outputs
            .entries()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        tracing::info!(
            realized = stack.realized.len(),
            deferred = stack.deferred.len(),
            "dry run complete"
        );
        Ok(stack)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ParameterCatalog, RawValue, names};
    use crate::compositor::Compositor;
    use crate::outputs::FLEET_NAME;
    use crate::DeploymentContext;

    fn plan(extra: &[(&str, &str)]) -> DeploymentPlan {
        let mut values: BTreeMap<String, RawValue> = BTreeMap::new();
        values.insert(names::SOURCE_BUCKET.to_string(), "src".into());
        values.insert(names::DESTINATION_BUCKET.to_string(), "dst".into());
        values.insert(names::ALARM_EMAIL.to_string(), "ops@example.com".into());
        values.insert(names::VPC_ID.to_string(), "vpc-0a1b2c3d".into());
        values.insert(names::SUBNET_IDS.to_string(), "subnet-a,subnet-b".into());
        for (k, v) in extra {
            values.insert((*k).to_string(), (*v).into());
        }
        let catalog = ParameterCatalog::standard().expect("catalog");
        Compositor::compose(&catalog, &values, &DeploymentContext::default()).expect("plan")
    }

    #[test]
    fn dry_run_defers_inactive_trigger() {
        let plan = plan(&[]);
        let stack = DryRunBackend::new().provision(&plan).expect("dry run");
        assert_eq!(stack.stack_name, "transit");
        assert_eq!(stack.deferred.len(), 2);
        assert_eq!(
            stack.realized.get(&ResourceId::new("WorkQueue")).map(String::as_str),
            Some("transit-work-queue")
        );
        assert!(!stack.outputs.contains_key(FLEET_NAME));
    }

    #[test]
    fn dry_run_publishes_fleet_output() {
        let stack = DryRunBackend::new()
            .provision(&plan(&[(names::RUN_TYPE, "fleet")]))
            .expect("dry run");
        assert_eq!(
            stack.outputs.get(FLEET_NAME).map(String::as_str),
            Some("transit-worker-fleet")
        );
    }

    #[test]
    fn provisioning_errors_propagate() {
        let result = DryRunBackend::rejecting("queue").provision(&plan(&[]));
        assert!(matches!(result, Err(TransitError::Provisioning(_))));
    }
}
