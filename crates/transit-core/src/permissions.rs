//! # Permission Graph Builder
//!
//! Least-privilege grants from the selected compute role to the resources
//! it touches.
//!
//! - Both roles get full ledger access
//! - Discovery sends to the work queue, workers consume from it
//! - Source bucket is read-only; destination is read-write for workers only
//! - Secret reads are scoped to one versioned secret ARN per credential
//!
//! Grants are stored in a `BTreeSet`, so identical grants collapse to one
//! statement and the rendered policy is stable.

use crate::compute::ComputeTopology;
use crate::environment::ComputeRole;
use crate::params::DeploymentParams;
use crate::shared::SharedResources;
use crate::{
    DeploymentContext, DiscoveryRoleHandle, LedgerHandle, QueueHandle, ResourceId, TransitError,
    WorkerRoleHandle,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// ACTIONS
// =============================================================================

/// Whether an action observes or mutates its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    Read,
    Write,
    ReadWrite,
}

/// A single permitted API action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    LedgerGetItem,
    LedgerBatchGetItem,
    LedgerQuery,
    LedgerScan,
    LedgerDescribeTable,
    LedgerPutItem,
    LedgerUpdateItem,
    LedgerDeleteItem,
    LedgerBatchWriteItem,
    QueueSendMessage,
    QueueReceiveMessage,
    QueueDeleteMessage,
    QueueChangeMessageVisibility,
    QueueGetAttributes,
    QueueGetUrl,
    BucketGetObject,
    BucketListBucket,
    BucketPutObject,
    BucketPutObjectAcl,
    BucketAbortMultipartUpload,
    SecretGetValue,
    SecretDescribe,
}

impl Action {
    /// The IAM action name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Action::LedgerGetItem => "dynamodb:GetItem",
            Action::LedgerBatchGetItem => "dynamodb:BatchGetItem",
            Action::LedgerQuery => "dynamodb:Query",
            Action::LedgerScan => "dynamodb:Scan",
            Action::LedgerDescribeTable => "dynamodb:DescribeTable",
            Action::LedgerPutItem => "dynamodb:PutItem",
            Action::LedgerUpdateItem => "dynamodb:UpdateItem",
            Action::LedgerDeleteItem => "dynamodb:DeleteItem",
            Action::LedgerBatchWriteItem => "dynamodb:BatchWriteItem",
            Action::QueueSendMessage => "sqs:SendMessage",
            Action::QueueReceiveMessage => "sqs:ReceiveMessage",
            Action::QueueDeleteMessage => "sqs:DeleteMessage",
            Action::QueueChangeMessageVisibility => "sqs:ChangeMessageVisibility",
            Action::QueueGetAttributes => "sqs:GetQueueAttributes",
            Action::QueueGetUrl => "sqs:GetQueueUrl",
            Action::BucketGetObject => "s3:GetObject",
            Action::BucketListBucket => "s3:ListBucket",
            Action::BucketPutObject => "s3:PutObject",
            Action::BucketPutObjectAcl => "s3:PutObjectAcl",
            Action::BucketAbortMultipartUpload => "s3:AbortMultipartUpload",
            Action::SecretGetValue => "secretsmanager:GetSecretValue",
            Action::SecretDescribe => "secretsmanager:DescribeSecret",
        }
    }

    /// True if the action mutates its target.
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Action::LedgerPutItem
                | Action::LedgerUpdateItem
                | Action::LedgerDeleteItem
                | Action::LedgerBatchWriteItem
                | Action::QueueSendMessage
                | Action::QueueDeleteMessage
                | Action::QueueChangeMessageVisibility
                | Action::BucketPutObject
                | Action::BucketPutObjectAcl
                | Action::BucketAbortMultipartUpload
        )
    }
}

/// Full ledger access, shared by both compute roles.
pub const LEDGER_CRUD: &[Action] = &[
    Action::LedgerGetItem,
    Action::LedgerBatchGetItem,
    Action::LedgerQuery,
    Action::LedgerScan,
    Action::LedgerDescribeTable,
    Action::LedgerPutItem,
    Action::LedgerUpdateItem,
    Action::LedgerDeleteItem,
    Action::LedgerBatchWriteItem,
];

/// Enqueue only.
pub const QUEUE_SEND: &[Action] = &[
    Action::QueueSendMessage,
    Action::QueueGetAttributes,
    Action::QueueGetUrl,
];

/// Dequeue only.
pub const QUEUE_CONSUME: &[Action] = &[
    Action::QueueReceiveMessage,
    Action::QueueDeleteMessage,
    Action::QueueChangeMessageVisibility,
    Action::QueueGetAttributes,
    Action::QueueGetUrl,
];

pub const BUCKET_READ: &[Action] = &[Action::BucketGetObject, Action::BucketListBucket];

pub const BUCKET_READ_WRITE: &[Action] = &[
    Action::BucketGetObject,
    Action::BucketListBucket,
    Action::BucketPutObject,
    Action::BucketPutObjectAcl,
    Action::BucketAbortMultipartUpload,
];

pub const SECRET_READ: &[Action] = &[Action::SecretGetValue, Action::SecretDescribe];

// =============================================================================
// GRANTEES & TARGETS
// =============================================================================

/// A compute role, as produced by the selected branch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoleRef {
    Discovery(DiscoveryRoleHandle),
    Worker(WorkerRoleHandle),
}

impl RoleRef {
    #[must_use]
    pub fn id(&self) -> &ResourceId {
        match self {
            RoleRef::Discovery(h) => h.id(),
            RoleRef::Worker(h) => h.id(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            RoleRef::Discovery(h) => h.name(),
            RoleRef::Worker(h) => h.name(),
        }
    }

    #[must_use]
    pub fn compute_role(&self) -> ComputeRole {
        match self {
            RoleRef::Discovery(_) => ComputeRole::Discovery,
            RoleRef::Worker(_) => ComputeRole::Worker,
        }
    }
}

/// Which end of the transfer a bucket or secret belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Source,
    Destination,
}

/// What a grant applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GrantTarget {
    Ledger(LedgerHandle),
    Queue(QueueHandle),
    /// An external bucket, by name.
    Bucket { side: Side, bucket: String },
    /// A credential secret, by name.
    Secret { side: Side, name: String },
}

impl GrantTarget {
    /// Statement id fragment.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            GrantTarget::Ledger(_) => "JobLedger",
            GrantTarget::Queue(_) => "WorkQueue",
            GrantTarget::Bucket {
                side: Side::Source, ..
            } => "SourceBucket",
            GrantTarget::Bucket {
                side: Side::Destination,
                ..
            } => "DestinationBucket",
            GrantTarget::Secret {
                side: Side::Source, ..
            } => "SourceCredentials",
            GrantTarget::Secret {
                side: Side::Destination,
                ..
            } => "DestinationCredentials",
        }
    }

    /// Resource ARNs the grant is scoped to.
    #[must_use]
    pub fn arns(&self, ctx: &DeploymentContext) -> Vec<String> {
        match self {
            GrantTarget::Ledger(h) => vec![ctx.arn("dynamodb", &format!("table/{}", h.name()))],
            GrantTarget::Queue(h) => vec![ctx.arn("sqs", h.name())],
            GrantTarget::Bucket { bucket, .. } => vec![
                format!("arn:{}:s3:::{}", ctx.partition, bucket),
                format!("arn:{}:s3:::{}/*", ctx.partition, bucket),
            ],
            // Versioned secrets carry a six character random suffix.
            GrantTarget::Secret { name, .. } => {
                vec![ctx.arn("secretsmanager", &format!("secret:{}-??????", name))]
            }
        }
    }
}

// =============================================================================
// GRANTS
// =============================================================================

/// One permission grant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub grantee: RoleRef,
    pub target: GrantTarget,
    pub actions: BTreeSet<Action>,
    pub direction: Direction,
}

/// A rendered policy statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    pub sid: String,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

fn direction_of(actions: &BTreeSet<Action>) -> Direction {
    let writes = actions.iter().filter(|a| a.is_write()).count();
    if writes == 0 {
        Direction::Read
    } else if writes == actions.len() {
        Direction::Write
    } else {
        Direction::ReadWrite
    }
}

/// All grants of one composition, held for the selected role only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGraph {
    grantee: RoleRef,
    grants: BTreeSet<PermissionGrant>,
}

impl PermissionGraph {
    /// Empty graph accepting grants for the topology's role only.
    #[must_use]
    pub fn for_topology(topology: &ComputeTopology) -> Self {
        Self {
            grantee: topology.role(),
            grants: BTreeSet::new(),
        }
    }

    /// Add a grant. Returns `false` if an identical grant already exists.
    ///
    /// Granting to a role outside the selected branch is an invariant
    /// violation.
    pub fn grant(
        &mut self,
        role: &RoleRef,
        target: GrantTarget,
        actions: &[Action],
    ) -> Result<bool, TransitError> {
        if *role != self.grantee {
            return Err(TransitError::InvariantViolation(format!(
                "grant to role '{}' outside the selected compute branch",
                role.id()
            )));
        }
        if actions.is_empty() {
            return Err(TransitError::InvariantViolation(format!(
                "empty grant on {}",
                target.label()
            )));
        }

        let actions: BTreeSet<Action> = actions.iter().copied().collect();
        let direction = direction_of(&actions);
        Ok(self.grants.insert(PermissionGrant {
            grantee: role.clone(),
            target,
            actions,
            direction,
        }))
    }

    /// The role every grant applies to.
    #[must_use]
    pub fn grantee(&self) -> &RoleRef {
        &self.grantee
    }

    /// All grants, in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &PermissionGrant> {
        self.grants.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Union of actions granted on targets matching the label.
    #[must_use]
    pub fn actions_on(&self, label: &str) -> BTreeSet<Action> {
        self.grants
            .iter()
            .filter(|g| g.target.label() == label)
            .flat_map(|g| g.actions.iter().copied())
            .collect()
    }

    /// Direction of the grant on targets matching the label.
    #[must_use]
    pub fn direction_on(&self, label: &str) -> Option<Direction> {
        let actions = self.actions_on(label);
        (!actions.is_empty()).then(|| direction_of(&actions))
    }

    /// Render one statement per grant.
    #[must_use]
    pub fn statements(&self, ctx: &DeploymentContext) -> Vec<PolicyStatement> {
        self.grants
            .iter()
            .enumerate()
            .map(|(i, g)| PolicyStatement {
                sid: format!("{}{}", g.target.label(), i),
                actions: g.actions.iter().map(|a| a.as_str().to_string()).collect(),
                resources: g.target.arns(ctx),
            })
            .collect()
    }
}

/// Derive every grant of the selected compute role.
pub fn apply_compute_grants(
    topology: &ComputeTopology,
    shared: &SharedResources,
    params: &DeploymentParams,
) -> Result<PermissionGraph, TransitError> {
    let mut graph = PermissionGraph::for_topology(topology);
    let role = topology.role();

    graph.grant(&role, GrantTarget::Ledger(shared.ledger.clone()), LEDGER_CRUD)?;

    let (queue_actions, destination_actions) = match role {
        RoleRef::Discovery(_) => (QUEUE_SEND, BUCKET_READ),
        RoleRef::Worker(_) => (QUEUE_CONSUME, BUCKET_READ_WRITE),
    };
    graph.grant(&role, GrantTarget::Queue(shared.queue.clone()), queue_actions)?;

    graph.grant(
        &role,
        GrantTarget::Bucket {
            side: Side::Source,
            bucket: params.source.bucket.clone(),
        },
        BUCKET_READ,
    )?;
    graph.grant(
        &role,
        GrantTarget::Bucket {
            side: Side::Destination,
            bucket: params.destination.bucket.clone(),
        },
        destination_actions,
    )?;

    for (side, name) in [
        (Side::Source, &params.source.credentials),
        (Side::Destination, &params.destination.credentials),
    ] {
        if !name.is_empty() {
            graph.grant(
                &role,
                GrantTarget::Secret {
                    side,
                    name: name.clone(),
                },
                SECRET_READ,
            )?;
        }
    }

    tracing::info!(
        role = role.name(),
        grants = graph.len(),
        "permission graph built"
    );
    Ok(graph)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ParameterCatalog, RawValue, names};
    use crate::compute::{RuntimeMode, select_and_build};
    use crate::environment::EnvironmentContract;
    use crate::graph::ResourceGraph;
    use crate::shared::provision_shared;
    use std::collections::BTreeMap;

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

    fn composed(
        params: &DeploymentParams,
    ) -> (SharedResources, ComputeTopology, PermissionGraph) {
        let ctx = DeploymentContext::default();
        let mut graph = ResourceGraph::new();
        let shared = provision_shared(&mut graph, &ctx, &params.alarm_email).expect("shared");
        let mode = RuntimeMode::select(params).expect("mode");
        let contract = EnvironmentContract::for_role(mode.role(), params, &ctx, &shared);
        let topology =
            select_and_build(&mut graph, &ctx, &mode, contract, &shared).expect("topology");
        let grants = apply_compute_grants(&topology, &shared, params).expect("grants");
        (shared, topology, grants)
    }

    fn set(actions: &[Action]) -> BTreeSet<Action> {
        actions.iter().copied().collect()
    }

    #[test]
    fn discovery_role_sends_and_reads() {
        let (_, _, grants) = composed(&params_with(&[]));
        assert_eq!(grants.grantee().compute_role(), ComputeRole::Discovery);
        assert_eq!(grants.actions_on("JobLedger"), set(LEDGER_CRUD));
        assert_eq!(grants.actions_on("WorkQueue"), set(QUEUE_SEND));
        assert!(!grants.actions_on("WorkQueue").contains(&Action::QueueReceiveMessage));
        assert_eq!(grants.direction_on("SourceBucket"), Some(Direction::Read));
        assert_eq!(grants.direction_on("DestinationBucket"), Some(Direction::Read));
        assert_eq!(grants.len(), 4);
    }

    #[test]
    fn worker_role_consumes_and_writes_destination() {
        let (_, _, grants) = composed(&params_with(&[(names::RUN_TYPE, "fleet")]));
        assert_eq!(grants.grantee().compute_role(), ComputeRole::Worker);
        assert_eq!(grants.actions_on("JobLedger"), set(LEDGER_CRUD));
        assert_eq!(grants.actions_on("WorkQueue"), set(QUEUE_CONSUME));
        assert!(!grants.actions_on("WorkQueue").contains(&Action::QueueSendMessage));
        assert_eq!(grants.direction_on("SourceBucket"), Some(Direction::Read));
        assert_eq!(
            grants.direction_on("DestinationBucket"),
            Some(Direction::ReadWrite)
        );
    }

    #[test]
    fn identical_grants_collapse() {
        let (shared, topology, mut grants) = composed(&params_with(&[]));
        let before = grants.len();
        let added = grants
            .grant(
                &topology.role(),
                GrantTarget::Ledger(shared.ledger.clone()),
                LEDGER_CRUD,
            )
            .expect("grant");
        assert!(!added);
        assert_eq!(grants.len(), before);
        assert_eq!(grants.statements(&DeploymentContext::default()).len(), before);
    }

    #[test]
    fn grants_to_unselected_role_are_rejected() {
        let (shared, _, mut grants) = composed(&params_with(&[]));
        let (_, fleet_topology, _) = composed(&params_with(&[(names::RUN_TYPE, "fleet")]));
        let result = grants.grant(
            &fleet_topology.role(),
            GrantTarget::Ledger(shared.ledger.clone()),
            LEDGER_CRUD,
        );
        assert!(matches!(result, Err(TransitError::InvariantViolation(_))));
    }

    #[test]
    fn secrets_are_scoped_per_credential() {
        let (_, _, grants) = composed(&params_with(&[
            (names::SOURCE_CREDENTIALS, "src-keys"),
            (names::DESTINATION_CREDENTIALS, "dst-keys"),
        ]));
        let ctx = DeploymentContext::default();
        let statements = grants.statements(&ctx);
        let secrets: Vec<&String> = statements
            .iter()
            .filter(|s| s.actions.iter().any(|a| a.starts_with("secretsmanager:")))
            .flat_map(|s| s.resources.iter())
            .collect();
        assert_eq!(secrets.len(), 2);
        for arn in secrets {
            assert!(arn.contains(":secret:"));
            assert!(arn.ends_with("-??????"));
            assert!(!arn.ends_with(":secret:*"));
        }
    }

    #[test]
    fn no_secret_grants_without_credentials() {
        let (_, _, grants) = composed(&params_with(&[]));
        assert!(grants.actions_on("SourceCredentials").is_empty());
        assert!(grants.actions_on("DestinationCredentials").is_empty());
    }

    #[test]
    fn direction_follows_actions() {
        assert_eq!(direction_of(&set(BUCKET_READ)), Direction::Read);
        assert_eq!(direction_of(&set(&[Action::QueueSendMessage])), Direction::Write);
        assert_eq!(direction_of(&set(BUCKET_READ_WRITE)), Direction::ReadWrite);
    }
}
