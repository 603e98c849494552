//! # Compute Topology Selector
//!
//! Chooses exactly one of the two compute shapes and instantiates its
//! resources:
//!
//! - `Cluster`: one scheduled discovery task on a managed cluster
//! - `Fleet`: a worker pool autoscaling against work-queue depth
//!
//! The mode is decided once by [`RuntimeMode::select`]. Every downstream
//! composer matches on the resulting [`ComputeTopology`] instead of looking
//! at raw parameters again.

use crate::environment::{ComputeRole, EnvironmentContract};
use crate::graph::{Principal, ResourceGraph, ResourceSpec};
use crate::observability::{MetricRef, Statistic};
use crate::params::{CapacityParams, DeploymentParams, RunType};
use crate::permissions::RoleRef;
use crate::primitives::{
    INSTANCE_SERVICE_PRINCIPAL, SCALE_OUT_STEPS, SCHEDULER_SERVICE_PRINCIPAL,
    TASK_SERVICE_PRINCIPAL,
};
use crate::shared::SharedResources;
use crate::{
    DeploymentContext, DiscoveryRoleHandle, FleetHandle, ResourceId, TransitError,
    ValidationErrors, WorkerRoleHandle,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// CPU units reserved for the discovery task.
pub const DISCOVERY_TASK_CPU_UNITS: u32 = 1024;

/// Memory reserved for the discovery task.
pub const DISCOVERY_TASK_MEMORY_MIB: u32 = 2048;

/// Cooldown between two scaling activities of the fleet.
pub const SCALING_COOLDOWN_SECS: u32 = 300;

// =============================================================================
// RUNTIME MODE
// =============================================================================

/// Inputs of the cluster branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Existing cluster to run on. `None` creates a dedicated one.
    pub cluster_name: Option<String>,
    pub vpc_id: String,
    pub subnet_ids: Vec<String>,
    /// Schedule expression of the discovery run.
    pub schedule: String,
}

/// Fleet capacity bounds, known to satisfy `min <= desired <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityBounds {
    min: u32,
    desired: u32,
    max: u32,
}

impl CapacityBounds {
    /// Check the ordering of raw capacity values.
    pub fn new(capacity: CapacityParams) -> Result<Self, ValidationErrors> {
        capacity.check_order()?;
        Ok(Self {
            min: capacity.min,
            desired: capacity.desired,
            max: capacity.max,
        })
    }

    #[must_use]
    pub fn min(&self) -> u32 {
        self.min
    }

    #[must_use]
    pub fn desired(&self) -> u32 {
        self.desired
    }

    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }
}

/// Inputs of the fleet branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSpec {
    pub capacity: CapacityBounds,
    pub vpc_id: String,
    pub subnet_ids: Vec<String>,
    pub memory_mib: u32,
}

/// The selected compute shape, decided once per composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeMode {
    Cluster(ClusterSpec),
    Fleet(FleetSpec),
}

impl RuntimeMode {
    /// Select the mode from the run type.
    ///
    /// Capacity bounds are re-checked here, in both modes, for params that
    /// did not come through catalog validation.
    pub fn select(params: &DeploymentParams) -> Result<Self, TransitError> {
        let capacity = CapacityBounds::new(params.capacity)?;

        let mode = match params.run_type {
            RunType::Cluster => RuntimeMode::Cluster(ClusterSpec {
                cluster_name: Some(params.cluster_name.clone()).filter(|n| !n.is_empty()),
                vpc_id: params.vpc_id.clone(),
                subnet_ids: params.subnet_ids.clone(),
                schedule: params.discovery_schedule.clone(),
            }),
            RunType::Fleet => RuntimeMode::Fleet(FleetSpec {
                capacity,
                vpc_id: params.vpc_id.clone(),
                subnet_ids: params.subnet_ids.clone(),
                memory_mib: params.worker_memory_mib,
            }),
        };

        tracing::info!(mode = %mode.run_type(), "runtime mode selected");
        Ok(mode)
    }

    #[must_use]
    pub fn run_type(&self) -> RunType {
        match self {
            RuntimeMode::Cluster(_) => RunType::Cluster,
            RuntimeMode::Fleet(_) => RunType::Fleet,
        }
    }

    /// The compute role the selected branch runs.
    #[must_use]
    pub fn role(&self) -> ComputeRole {
        match self {
            RuntimeMode::Cluster(_) => ComputeRole::Discovery,
            RuntimeMode::Fleet(_) => ComputeRole::Worker,
        }
    }
}

// =============================================================================
// RESOURCE DEFINITIONS
// =============================================================================

/// An assumable role. Its permissions live in the permission graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDef {
    pub assumed_by: Principal,
    pub description: String,
}

/// Network boundary of the compute layer. No inbound rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupDef {
    pub vpc_id: String,
    pub description: String,
    pub allow_all_egress: bool,
}

/// A dedicated managed cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDef {
    pub container_insights: bool,
}

/// The discovery task definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDef {
    pub role: ResourceId,
    pub cpu_units: u32,
    pub memory_mib: u32,
    pub cluster_name: String,
    pub subnet_ids: Vec<String>,
    pub security_group: ResourceId,
    pub environment: BTreeMap<String, String>,
}

/// Periodic launch of the discovery task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDef {
    pub expression: String,
    pub task: ResourceId,
    pub cluster_name: String,
    pub task_count: u32,
    pub invoker: Principal,
}

/// The autoscaling worker fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetDef {
    pub role: ResourceId,
    pub security_group: ResourceId,
    pub subnet_ids: Vec<String>,
    pub min_capacity: u32,
    pub desired_capacity: u32,
    pub max_capacity: u32,
    pub memory_mib: u32,
    /// Queue whose depth drives scaling.
    pub scaling_signal: ResourceId,
    pub environment: BTreeMap<String, String>,
}

/// Capacity change applied when a scaling step matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalingAdjustment {
    /// Add (or remove, when negative) instances.
    ChangeBy(i64),
    /// Set the capacity to an exact value.
    ExactCapacity(u32),
}

/// One step of a step-scaling policy, matching `lower <= value < upper`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingStep {
    pub lower_bound: u64,
    /// `None` is unbounded.
    pub upper_bound: Option<u64>,
    pub adjustment: ScalingAdjustment,
}

/// A step-scaling policy driven by one metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingPolicyDef {
    pub fleet: ResourceId,
    pub metric: MetricRef,
    pub steps: Vec<ScalingStep>,
    pub cooldown_secs: u32,
}

impl ScalingPolicyDef {
    /// Adjustment for an observed number of visible messages, if any step matches.
    #[must_use]
    pub fn adjustment_for(&self, visible: u64) -> Option<ScalingAdjustment> {
        self.steps
            .iter()
            .find(|s| visible >= s.lower_bound && s.upper_bound.is_none_or(|u| visible < u))
            .map(|s| s.adjustment)
    }
}

// =============================================================================
// TOPOLOGY
// =============================================================================

/// Resources of the cluster branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTopology {
    pub role: DiscoveryRoleHandle,
    pub security_group: ResourceId,
    /// Set only when a dedicated cluster was created.
    pub cluster: Option<ResourceId>,
    pub cluster_name: String,
    pub task: ResourceId,
    pub schedule: ResourceId,
}

/// Resources of the fleet branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetTopology {
    pub role: WorkerRoleHandle,
    pub security_group: ResourceId,
    pub fleet: FleetHandle,
    pub scale_out: ResourceId,
    pub scale_in: ResourceId,
}

/// The instantiated compute branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeTopology {
    Cluster(ClusterTopology),
    Fleet(FleetTopology),
}

impl ComputeTopology {
    #[must_use]
    pub fn run_type(&self) -> RunType {
        match self {
            ComputeTopology::Cluster(_) => RunType::Cluster,
            ComputeTopology::Fleet(_) => RunType::Fleet,
        }
    }

    /// The single role of the selected branch.
    #[must_use]
    pub fn role(&self) -> RoleRef {
        match self {
            ComputeTopology::Cluster(c) => RoleRef::Discovery(c.role.clone()),
            ComputeTopology::Fleet(f) => RoleRef::Worker(f.role.clone()),
        }
    }

    /// The fleet handle; absent in cluster mode.
    #[must_use]
    pub fn fleet(&self) -> Option<&FleetHandle> {
        match self {
            ComputeTopology::Cluster(_) => None,
            ComputeTopology::Fleet(f) => Some(&f.fleet),
        }
    }
}

/// Build the selected branch and insert its resources into the graph.
///
/// The contract must be the one for the branch's role.
pub fn select_and_build(
    graph: &mut ResourceGraph,
    ctx: &DeploymentContext,
    mode: &RuntimeMode,
    contract: EnvironmentContract,
    shared: &SharedResources,
) -> Result<ComputeTopology, TransitError> {
    if contract.role != mode.role() {
        return Err(TransitError::InvariantViolation(format!(
            "{} contract handed to the {} branch",
            contract.role.as_str(),
            mode.run_type()
        )));
    }

    let topology = match mode {
        RuntimeMode::Cluster(spec) => {
            ComputeTopology::Cluster(build_cluster(graph, ctx, spec, contract)?)
        }
        RuntimeMode::Fleet(spec) => {
            ComputeTopology::Fleet(build_fleet(graph, ctx, spec, contract, shared)?)
        }
    };

    tracing::debug!(
        mode = %topology.run_type(),
        resources = graph.len(),
        "compute topology built"
    );
    Ok(topology)
}

fn security_group(
    graph: &mut ResourceGraph,
    ctx: &DeploymentContext,
    id: &str,
    vpc_id: &str,
    description: &str,
) -> Result<ResourceId, TransitError> {
    graph.insert(
        id,
        ctx.physical_name(&format!("{}-sg", id.to_lowercase())),
        ResourceSpec::SecurityGroup(SecurityGroupDef {
            vpc_id: vpc_id.to_string(),
            description: description.to_string(),
            allow_all_egress: true,
        }),
        &[],
    )
}

fn build_cluster(
    graph: &mut ResourceGraph,
    ctx: &DeploymentContext,
    spec: &ClusterSpec,
    contract: EnvironmentContract,
) -> Result<ClusterTopology, TransitError> {
    let role_name = ctx.physical_name("discovery-role");
    let role_id = graph.insert(
        "DiscoveryRole",
        role_name.clone(),
        ResourceSpec::Role(RoleDef {
            assumed_by: Principal::Service(TASK_SERVICE_PRINCIPAL.to_string()),
            description: "Assumed by the discovery task".to_string(),
        }),
        &[],
    )?;

    let sg = security_group(
        graph,
        ctx,
        "Discovery",
        &spec.vpc_id,
        "Discovery task egress",
    )?;

    let (cluster, cluster_name) = match &spec.cluster_name {
        Some(name) => (None, name.clone()),
        None => {
            let name = ctx.physical_name("cluster");
            let id = graph.insert(
                "DiscoveryCluster",
                name.clone(),
                ResourceSpec::Cluster(ClusterDef {
                    container_insights: true,
                }),
                &[],
            )?;
            (Some(id), name)
        }
    };

    let mut task_deps = vec![&role_id, &sg];
    if let Some(c) = &cluster {
        task_deps.push(c);
    }
    let task = graph.insert(
        "DiscoveryTask",
        ctx.physical_name("discovery-task"),
        ResourceSpec::TaskDefinition(TaskDef {
            role: role_id.clone(),
            cpu_units: DISCOVERY_TASK_CPU_UNITS,
            memory_mib: DISCOVERY_TASK_MEMORY_MIB,
            cluster_name: cluster_name.clone(),
            subnet_ids: spec.subnet_ids.clone(),
            security_group: sg.clone(),
            environment: contract.variables,
        }),
        &task_deps,
    )?;

    let schedule = graph.insert(
        "DiscoverySchedule",
        ctx.physical_name("discovery-schedule"),
        ResourceSpec::Schedule(ScheduleDef {
            expression: spec.schedule.clone(),
            task: task.clone(),
            cluster_name: cluster_name.clone(),
            task_count: 1,
            invoker: Principal::Service(SCHEDULER_SERVICE_PRINCIPAL.to_string()),
        }),
        &[&task],
    )?;

    Ok(ClusterTopology {
        role: DiscoveryRoleHandle::new(role_id, role_name),
        security_group: sg,
        cluster,
        cluster_name,
        task,
        schedule,
    })
}

fn build_fleet(
    graph: &mut ResourceGraph,
    ctx: &DeploymentContext,
    spec: &FleetSpec,
    contract: EnvironmentContract,
    shared: &SharedResources,
) -> Result<FleetTopology, TransitError> {
    let role_name = ctx.physical_name("worker-role");
    let role_id = graph.insert(
        "WorkerRole",
        role_name.clone(),
        ResourceSpec::Role(RoleDef {
            assumed_by: Principal::Service(INSTANCE_SERVICE_PRINCIPAL.to_string()),
            description: "Assumed by worker fleet instances".to_string(),
        }),
        &[],
    )?;

    let sg = security_group(graph, ctx, "Worker", &spec.vpc_id, "Worker fleet egress")?;

    let fleet_name = ctx.physical_name("worker-fleet");
    let fleet_id = graph.insert(
        "WorkerFleet",
        fleet_name.clone(),
        ResourceSpec::Fleet(FleetDef {
            role: role_id.clone(),
            security_group: sg.clone(),
            subnet_ids: spec.subnet_ids.clone(),
            min_capacity: spec.capacity.min(),
            desired_capacity: spec.capacity.desired(),
            max_capacity: spec.capacity.max(),
            memory_mib: spec.memory_mib,
            scaling_signal: shared.queue.id().clone(),
            environment: contract.variables,
        }),
        &[&role_id, &sg, shared.queue.id()],
    )?;

    let signal = MetricRef::queue(
        "ApproximateNumberOfMessagesVisible",
        shared.queue.name(),
        Statistic::Maximum,
    );

    let scale_out = graph.insert(
        "WorkerScaleOut",
        ctx.physical_name("worker-scale-out"),
        ResourceSpec::ScalingPolicy(ScalingPolicyDef {
            fleet: fleet_id.clone(),
            metric: signal.clone(),
            steps: scale_out_steps(),
            cooldown_secs: SCALING_COOLDOWN_SECS,
        }),
        &[&fleet_id],
    )?;

    let scale_in = graph.insert(
        "WorkerScaleIn",
        ctx.physical_name("worker-scale-in"),
        ResourceSpec::ScalingPolicy(ScalingPolicyDef {
            fleet: fleet_id.clone(),
            metric: signal,
            steps: vec![ScalingStep {
                lower_bound: 0,
                upper_bound: Some(1),
                adjustment: ScalingAdjustment::ExactCapacity(spec.capacity.min()),
            }],
            cooldown_secs: SCALING_COOLDOWN_SECS,
        }),
        &[&fleet_id],
    )?;

    Ok(FleetTopology {
        role: WorkerRoleHandle::new(role_id, role_name),
        security_group: sg,
        fleet: FleetHandle::new(fleet_id, fleet_name),
        scale_out,
        scale_in,
    })
}

fn scale_out_steps() -> Vec<ScalingStep> {
    SCALE_OUT_STEPS
        .iter()
        .enumerate()
        .map(|(i, (lower, change))| ScalingStep {
            lower_bound: *lower,
            upper_bound: SCALE_OUT_STEPS.get(i + 1).map(|(next, _)| *next),
            adjustment: ScalingAdjustment::ChangeBy(*change),
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::catalog::{ParameterCatalog, RawValue, names};
    use crate::shared::provision_shared;

    fn params_with(overrides: &[(&str, &str)]) -> DeploymentParams {
        let mut values: BTreeMap<String, RawValue> = BTreeMap::new();
        values.insert(names::SOURCE_BUCKET.to_string(), "src".into());
        values.insert(names::DESTINATION_BUCKET.to_string(), "dst".into());
        values.insert(names::ALARM_EMAIL.to_string(), "ops@example.com".into());
        values.insert(names::VPC_ID.to_string(), "vpc-0a1b2c3d".into());
        values.insert(names::SUBNET_IDS.to_string(), "subnet-a,subnet-b".into());
        for (k, v) in overrides {
            values.insert((*k).to_string(), (*v).into());
        }
        let catalog = ParameterCatalog::standard().expect("catalog");
        let set = catalog.validate(&values).expect("valid");
        DeploymentParams::from_set(&set).expect("typed")
    }

    fn build(params: &DeploymentParams) -> (ResourceGraph, ComputeTopology) {
        let ctx = DeploymentContext::default();
        let mut graph = ResourceGraph::new();
        let shared = provision_shared(&mut graph, &ctx, &params.alarm_email).expect("shared");
        let mode = RuntimeMode::select(params).expect("mode");
        let contract = EnvironmentContract::for_role(mode.role(), params, &ctx, &shared);
        let topology =
            select_and_build(&mut graph, &ctx, &mode, contract, &shared).expect("topology");
        (graph, topology)
    }

    #[test]
    fn cluster_branch_builds_no_fleet_resources() {
        let (graph, topology) = build(&params_with(&[]));
        assert_eq!(topology.run_type(), RunType::Cluster);
        assert!(topology.fleet().is_none());
        assert_eq!(graph.of_kind("fleet").count(), 0);
        assert_eq!(graph.of_kind("scaling-policy").count(), 0);
        assert_eq!(graph.of_kind("task-definition").count(), 1);
        assert_eq!(graph.of_kind("role").count(), 1);
    }

    #[test]
    fn empty_cluster_name_creates_dedicated_cluster() {
        let (graph, topology) = build(&params_with(&[]));
        let ComputeTopology::Cluster(cluster) = topology else {
            panic!("expected cluster topology");
        };
        assert!(cluster.cluster.is_some());
        assert_eq!(cluster.cluster_name, "transit-cluster");
        assert_eq!(graph.of_kind("cluster").count(), 1);
    }

    #[test]
    fn named_cluster_is_reused() {
        let (graph, topology) = build(&params_with(&[(names::CLUSTER_NAME, "shared-ops")]));
        let ComputeTopology::Cluster(cluster) = topology else {
            panic!("expected cluster topology");
        };
        assert!(cluster.cluster.is_none());
        assert_eq!(graph.of_kind("cluster").count(), 0);

        let Some(ResourceSpec::TaskDefinition(task)) = graph.get(&cluster.task).map(|r| &r.spec)
        else {
            panic!("task is not a task definition");
        };
        assert_eq!(task.cluster_name, "shared-ops");
        assert_eq!(task.subnet_ids.len(), 2);
        assert!(task.environment.contains_key("FINDER_DEPTH"));
    }

    #[test]
    fn fleet_branch_binds_capacity_and_signal() {
        let (graph, topology) = build(&params_with(&[(names::RUN_TYPE, "fleet")]));
        let fleet = topology.fleet().expect("fleet handle");
        assert_eq!(fleet.name(), "transit-worker-fleet");
        assert_eq!(graph.of_kind("task-definition").count(), 0);
        assert_eq!(graph.of_kind("schedule").count(), 0);

        let Some(ResourceSpec::Fleet(def)) = graph.get(fleet.id()).map(|r| &r.spec) else {
            panic!("fleet is not a fleet");
        };
        assert_eq!((def.min_capacity, def.desired_capacity, def.max_capacity), (1, 1, 20));
        assert_eq!(def.scaling_signal.as_str(), "WorkQueue");
        assert!(def.environment.contains_key("WORKER_NUMBER"));
        assert_eq!(def.memory_mib, 2048);
    }

    #[test]
    fn inverted_capacity_fails_before_any_resource() {
        let mut params = params_with(&[(names::RUN_TYPE, "fleet")]);
        params.capacity = CapacityParams {
            min: 10,
            max: 2,
            desired: 1,
        };
        let result = RuntimeMode::select(&params);
        let Err(TransitError::Validation(errors)) = result else {
            panic!("expected validation failure");
        };
        assert!(errors.mentions(names::MIN_CAPACITY));
    }

    #[test]
    fn mismatched_contract_is_rejected() {
        let params = params_with(&[]);
        let ctx = DeploymentContext::default();
        let mut graph = ResourceGraph::new();
        let shared = provision_shared(&mut graph, &ctx, "ops@example.com").expect("shared");
        let mode = RuntimeMode::select(&params).expect("mode");
        let wrong = EnvironmentContract::worker(&params, &ctx, &shared);
        let before = graph.len();

        let result = select_and_build(&mut graph, &ctx, &mode, wrong, &shared);
        assert!(matches!(result, Err(TransitError::InvariantViolation(_))));
        assert_eq!(graph.len(), before);
    }

    #[test]
    fn scaling_steps_follow_queue_depth() {
        let (graph, topology) = build(&params_with(&[(names::RUN_TYPE, "fleet")]));
        let ComputeTopology::Fleet(fleet) = topology else {
            panic!("expected fleet topology");
        };
        let Some(ResourceSpec::ScalingPolicy(out)) = graph.get(&fleet.scale_out).map(|r| &r.spec)
        else {
            panic!("scale-out is not a policy");
        };
        assert_eq!(out.adjustment_for(0), None);
        assert_eq!(out.adjustment_for(1), Some(ScalingAdjustment::ChangeBy(1)));
        assert_eq!(out.adjustment_for(99), Some(ScalingAdjustment::ChangeBy(1)));
        assert_eq!(out.adjustment_for(100), Some(ScalingAdjustment::ChangeBy(2)));
        assert_eq!(out.adjustment_for(10_000), Some(ScalingAdjustment::ChangeBy(5)));

        let Some(ResourceSpec::ScalingPolicy(back)) = graph.get(&fleet.scale_in).map(|r| &r.spec)
        else {
            panic!("scale-in is not a policy");
        };
        assert_eq!(back.adjustment_for(0), Some(ScalingAdjustment::ExactCapacity(1)));
        assert_eq!(back.adjustment_for(3), None);
    }
}
