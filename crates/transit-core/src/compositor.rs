//! # Compositor Module
//!
//! Runs one composition pass: parameters in, deployment plan out.
//!
//! Composer calls form an explicit DAG, each consuming the handles the
//! previous ones returned:
//!
//! ```text
//! validate -> typed params -> mode -> shared -> contract -> compute
//!          -> permissions -> dashboard -> event trigger -> outputs
//! ```
//!
//! Any failure aborts the pass. Nothing leaves this module except a
//! complete plan or an error.

use crate::catalog::{ParameterCatalog, ParameterSet, Presentation, RawValue};
use crate::compute::{ComputeTopology, RuntimeMode, select_and_build};
use crate::environment::{ComputeRole, EnvironmentContract};
use crate::graph::{Resource, ResourceGraph};
use crate::observability::build_dashboard;
use crate::outputs::OutputContract;
use crate::params::{DeploymentParams, RunType};
use crate::permissions::{PermissionGraph, PolicyStatement, apply_compute_grants};
use crate::shared::{SharedResources, provision_shared};
use crate::trigger::{GatedTopology, TriggerPredicate, compose_if_enabled};
use crate::{DeploymentContext, ResourceId, TransitError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The complete result of one composition pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub context: DeploymentContext,
    pub run_type: RunType,
    pub parameters: ParameterSet,
    pub presentation: Presentation,
    pub resources: ResourceGraph,
    pub shared: SharedResources,
    pub compute: ComputeTopology,
    pub grants: PermissionGraph,
    pub environment: EnvironmentContract,
    pub dashboard: ResourceId,
    pub event_trigger: GatedTopology,
    /// Condition name -> evaluated value.
    pub conditions: BTreeMap<String, bool>,
    pub outputs: OutputContract,
}

impl DeploymentPlan {
    /// Resources that will be realized, given the evaluated conditions.
    pub fn active_resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.resources().filter(|r| match &r.condition {
            None => true,
            Some(name) => self.conditions.get(name).copied().unwrap_or(false),
        })
    }

    /// Environment contract of either role, derived from this plan's values.
    ///
    /// Only the contract of the selected role is delivered by the plan itself.
    pub fn contract_for(&self, role: ComputeRole) -> Result<EnvironmentContract, TransitError> {
        if role == self.environment.role {
            return Ok(self.environment.clone());
        }
        let params = DeploymentParams::from_set(&self.parameters)?;
        Ok(EnvironmentContract::for_role(
            role,
            &params,
            &self.context,
            &self.shared,
        ))
    }

    /// Rendered policy statements of the compute role.
    #[must_use]
    pub fn statements(&self) -> Vec<PolicyStatement> {
        self.grants.statements(&self.context)
    }
}

/// Drives the composers in dependency order.
pub struct Compositor;

impl Compositor {
    /// Validate raw values and compose the full plan.
    pub fn compose(
        catalog: &ParameterCatalog,
        values: &BTreeMap<String, RawValue>,
        ctx: &DeploymentContext,
    ) -> Result<DeploymentPlan, TransitError> {
        let parameters = catalog.validate(values)?;
        Self::compose_validated(catalog, parameters, ctx)
    }

    /// Compose from an already validated parameter set.
    pub fn compose_validated(
        catalog: &ParameterCatalog,
        parameters: ParameterSet,
        ctx: &DeploymentContext,
    ) -> Result<DeploymentPlan, TransitError> {
        let params = DeploymentParams::from_set(&parameters)?;
        let mode = RuntimeMode::select(&params)?;

        let mut graph = ResourceGraph::new();
        let shared = provision_shared(&mut graph, ctx, &params.alarm_email)?;

        let environment = EnvironmentContract::for_role(mode.role(), &params, ctx, &shared);
        let compute = select_and_build(&mut graph, ctx, &mode, environment.clone(), &shared)?;
        let grants = apply_compute_grants(&compute, &shared, &params)?;
        let dashboard = build_dashboard(&mut graph, ctx, &compute, &shared)?;

        let event_trigger = compose_if_enabled(
            &mut graph,
            ctx,
            TriggerPredicate::from_params(&params),
            &shared.queue,
            &params.source.bucket,
            &params.source.prefix,
        )?;
        let conditions = BTreeMap::from([(
            event_trigger.condition.clone(),
            event_trigger.is_active(),
        )]);

        let outputs = OutputContract::emit(&shared, &compute);

        tracing::info!(
            stack = %ctx.stack_name,
            mode = %mode.run_type(),
            resources = graph.len(),
            grants = grants.len(),
            event_trigger = event_trigger.is_active(),
            "deployment plan composed"
        );

        Ok(DeploymentPlan {
            context: ctx.clone(),
            run_type: mode.run_type(),
            parameters,
            presentation: catalog.presentation().clone(),
            resources: graph,
            shared,
            compute,
            grants,
            environment,
            dashboard,
            event_trigger,
            conditions,
            outputs,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::names;

    fn values(overrides: &[(&str, &str)]) -> BTreeMap<String, RawValue> {
        let mut values: BTreeMap<String, RawValue> = BTreeMap::new();
        values.insert(names::SOURCE_BUCKET.to_string(), "src".into());
        values.insert(names::DESTINATION_BUCKET.to_string(), "dst".into());
        values.insert(names::ALARM_EMAIL.to_string(), "ops@example.com".into());
        values.insert(names::VPC_ID.to_string(), "vpc-0a1b2c3d".into());
        values.insert(names::SUBNET_IDS.to_string(), "subnet-a,subnet-b".into());
        for (k, v) in overrides {
            values.insert((*k).to_string(), (*v).into());
        }
        values
    }

    fn compose(overrides: &[(&str, &str)]) -> Result<DeploymentPlan, TransitError> {
        let catalog = ParameterCatalog::standard()?;
        Compositor::compose(&catalog, &values(overrides), &DeploymentContext::default())
    }

    #[test]
    fn composition_is_deterministic() {
        let a = compose(&[]).expect("plan a");
        let b = compose(&[]).expect("plan b");
        assert_eq!(a, b);
    }

    #[test]
    fn validation_failures_abort_the_pass() {
        let result = compose(&[(names::ALARM_EMAIL, "not-an-email"), (names::SUBNET_IDS, "one")]);
        let Err(TransitError::Validation(errors)) = result else {
            unreachable!("expected validation failure");
        };
        assert!(errors.mentions(names::ALARM_EMAIL));
        assert!(errors.mentions(names::SUBNET_IDS));
    }

    #[test]
    fn inactive_trigger_resources_are_not_realized() {
        let plan = compose(&[]).expect("plan");
        assert_eq!(plan.conditions.values().copied().collect::<Vec<_>>(), vec![false]);
        assert!(plan.resources.len() > plan.active_resources().count());
        assert!(plan.active_resources().all(|r| r.condition.is_none()));
    }

    #[test]
    fn active_trigger_resources_are_realized() {
        let plan = compose(&[
            (names::SOURCE_IN_CURRENT_ACCOUNT, "true"),
            (names::EVENT_TRIGGER_MODE, "creations"),
        ])
        .expect("plan");
        assert!(plan.event_trigger.is_active());
        assert_eq!(plan.resources.len(), plan.active_resources().count());
    }

    #[test]
    fn either_contract_is_derivable() {
        let plan = compose(&[]).expect("plan");
        let discovery = plan.contract_for(ComputeRole::Discovery).expect("discovery");
        assert_eq!(discovery, plan.environment);

        let worker = plan.contract_for(ComputeRole::Worker).expect("worker");
        assert_eq!(worker.get("WORKER_NUMBER"), Some("4"));
        assert_eq!(worker.get("JOB_QUEUE_NAME"), discovery.get("JOB_QUEUE_NAME"));
    }
}
