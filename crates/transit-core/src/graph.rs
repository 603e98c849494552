//! # Resource Graph
//!
//! The set of provisionable entities produced by one composition pass, and
//! their dependency relationships.
//!
//! - Every resource is inserted exactly once, by the composer that owns it
//! - A resource may only depend on resources that already exist, so
//!   insertion order is always a valid topological order
//! - All data structures use `BTreeMap`/`BTreeSet` for deterministic ordering

use crate::compute::{
    ClusterDef, FleetDef, RoleDef, ScalingPolicyDef, ScheduleDef, SecurityGroupDef, TaskDef,
};
use crate::observability::Dashboard;
use crate::shared::{AlarmRule, KeyDef, QueueDef, SubscriptionDef, TableDef, TopicDef};
use crate::trigger::{BucketNotificationDef, QueuePolicyDef};
use crate::{ResourceId, TransitError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// PRINCIPALS
// =============================================================================

/// Who a policy statement or trust relationship applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Principal {
    /// A cloud service, e.g. `sns.amazonaws.com`.
    Service(String),
    /// An account root, as a rendered ARN.
    Account(String),
}

// =============================================================================
// RESOURCE SPECIFICATIONS
// =============================================================================

/// Full specification of a single resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceSpec {
    Table(TableDef),
    Queue(QueueDef),
    Key(KeyDef),
    Topic(TopicDef),
    Subscription(SubscriptionDef),
    Alarm(AlarmRule),
    Role(RoleDef),
    SecurityGroup(SecurityGroupDef),
    Cluster(ClusterDef),
    TaskDefinition(TaskDef),
    Schedule(ScheduleDef),
    Fleet(FleetDef),
    ScalingPolicy(ScalingPolicyDef),
    Dashboard(Dashboard),
    BucketNotification(BucketNotificationDef),
    QueuePolicy(QueuePolicyDef),
}

impl ResourceSpec {
    /// Short kind name, stable across releases.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceSpec::Table(_) => "table",
            ResourceSpec::Queue(_) => "queue",
            ResourceSpec::Key(_) => "key",
            ResourceSpec::Topic(_) => "topic",
            ResourceSpec::Subscription(_) => "subscription",
            ResourceSpec::Alarm(_) => "alarm",
            ResourceSpec::Role(_) => "role",
            ResourceSpec::SecurityGroup(_) => "security-group",
            ResourceSpec::Cluster(_) => "cluster",
            ResourceSpec::TaskDefinition(_) => "task-definition",
            ResourceSpec::Schedule(_) => "schedule",
            ResourceSpec::Fleet(_) => "fleet",
            ResourceSpec::ScalingPolicy(_) => "scaling-policy",
            ResourceSpec::Dashboard(_) => "dashboard",
            ResourceSpec::BucketNotification(_) => "bucket-notification",
            ResourceSpec::QueuePolicy(_) => "queue-policy",
        }
    }
}

/// A resource in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Logical id (graph key).
    pub id: ResourceId,
    /// Physical name.
    pub name: String,
    /// Full specification.
    pub spec: ResourceSpec,
    /// Resources that must be realized first.
    pub depends_on: BTreeSet<ResourceId>,
    /// Name of the condition gating this resource's existence, if any.
    pub condition: Option<String>,
}

// =============================================================================
// GRAPH
// =============================================================================

/// The resource graph.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGraph {
    /// Resource storage: ResourceId -> Resource
    resources: BTreeMap<ResourceId, Resource>,

    /// Insertion order (a topological order of the dependency DAG).
    order: Vec<ResourceId>,
}

impl ResourceGraph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource that always exists.
    ///
    /// Fails with an invariant violation if the id is taken or a dependency
    /// is not in the graph yet.
    pub fn insert(
        &mut self,
        id: &str,
        name: impl Into<String>,
        spec: ResourceSpec,
        depends_on: &[&ResourceId],
    ) -> Result<ResourceId, TransitError> {
        self.insert_resource(id, name.into(), spec, depends_on, None)
    }

    /// Insert a resource whose existence is gated by a named condition.
    pub fn insert_conditional(
        &mut self,
        id: &str,
        name: impl Into<String>,
        spec: ResourceSpec,
        depends_on: &[&ResourceId],
        condition: &str,
    ) -> Result<ResourceId, TransitError> {
        self.insert_resource(id, name.into(), spec, depends_on, Some(condition.to_string()))
    }

    fn insert_resource(
        &mut self,
        id: &str,
        name: String,
        spec: ResourceSpec,
        depends_on: &[&ResourceId],
        condition: Option<String>,
    ) -> Result<ResourceId, TransitError> {
        let id = ResourceId::new(id);
        if self.resources.contains_key(&id) {
            return Err(TransitError::InvariantViolation(format!(
                "resource '{}' inserted twice",
                id
            )));
        }

        let mut deps = BTreeSet::new();
        for dep in depends_on {
            if !self.resources.contains_key(*dep) {
                return Err(TransitError::InvariantViolation(format!(
                    "resource '{}' depends on unknown resource '{}'",
                    id, dep
                )));
            }
            deps.insert((*dep).clone());
        }

        tracing::trace!(resource = %id, kind = spec.kind(), "resource specified");

        self.order.push(id.clone());
        self.resources.insert(
            id.clone(),
            Resource {
                id: id.clone(),
                name,
                spec,
                depends_on: deps,
                condition,
            },
        );
        Ok(id)
    }

    /// Lookup a resource by id.
    #[must_use]
    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Lookup a resource by id string.
    #[must_use]
    pub fn get_by_name(&self, id: &str) -> Option<&Resource> {
        self.resources.get(&ResourceId::new(id))
    }

    /// Check if a resource exists in the graph.
    #[must_use]
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    /// Total number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// True if the graph holds no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// All resources in topological (insertion) order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.order.iter().filter_map(|id| self.resources.get(id))
    }

    /// All resources of a kind, in topological order.
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources().filter(move |r| r.spec.kind() == kind)
    }

    /// Resources that always exist, regardless of conditions.
    pub fn unconditional(&self) -> impl Iterator<Item = &Resource> {
        self.resources().filter(|r| r.condition.is_none())
    }

    /// All dependency edges as (dependent, dependency), in deterministic order.
    pub fn edges(&self) -> impl Iterator<Item = (&ResourceId, &ResourceId)> {
        self.resources
            .values()
            .flat_map(|r| r.depends_on.iter().map(move |dep| (&r.id, dep)))
    }

    /// Total number of dependency edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.resources.values().map(|r| r.depends_on.len()).sum()
    }
}

// =============================================================================
// TESTS
// =============================================================================
