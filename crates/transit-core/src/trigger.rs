//! # Conditional Event Trigger Composer
//!
//! Forwards source-bucket change notifications into the work queue.
//!
//! The sub-topology is always specified in full and inserted under a named
//! condition. Only the predicate decides whether it is realized, so
//! toggling the trigger mode re-evaluates one boolean and touches nothing
//! else in the plan.

use crate::graph::{Principal, ResourceGraph, ResourceSpec};
use crate::params::{DeploymentParams, SourceType, TriggerMode};
use crate::primitives::{EVENT_TRIGGER_CONDITION, OBJECT_EVENT_SERVICE_PRINCIPAL};
use crate::{DeploymentContext, QueueHandle, ResourceId, TransitError};
use serde::{Deserialize, Serialize};

// =============================================================================
// PREDICATE
// =============================================================================

/// Gate of the event sub-topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPredicate {
    pub source_in_current_account: bool,
    pub source_type: SourceType,
    pub trigger_mode: TriggerMode,
}

impl TriggerPredicate {
    #[must_use]
    pub fn from_params(params: &DeploymentParams) -> Self {
        Self {
            source_in_current_account: params.source.in_current_account,
            source_type: params.source.source_type,
            trigger_mode: params.trigger_mode,
        }
    }

    /// In current account AND native source AND trigger mode not disabled.
    #[must_use]
    pub fn evaluate(&self) -> bool {
        self.source_in_current_account
            && self.source_type.is_native()
            && self.trigger_mode != TriggerMode::Disabled
    }
}

// =============================================================================
// SUB-TOPOLOGY
// =============================================================================

/// A bucket change notification type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectEvent {
    Created,
    Removed,
}

impl ObjectEvent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectEvent::Created => "s3:ObjectCreated:*",
            ObjectEvent::Removed => "s3:ObjectRemoved:*",
        }
    }

    /// Events subscribed for a trigger mode.
    ///
    /// `Disabled` specifies the creations set, so enabling creations later
    /// changes no resource specification.
    #[must_use]
    pub fn for_mode(mode: TriggerMode) -> Vec<ObjectEvent> {
        match mode {
            TriggerMode::Disabled | TriggerMode::Creations => vec![ObjectEvent::Created],
            TriggerMode::CreationsAndDeletions => {
                vec![ObjectEvent::Created, ObjectEvent::Removed]
            }
        }
    }
}

/// Notification configuration on the source bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketNotificationDef {
    pub bucket: String,
    pub prefix: String,
    pub events: Vec<ObjectEvent>,
    pub queue: ResourceId,
}

/// Lets the object-event service send to the work queue, for one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePolicyDef {
    pub queue: ResourceId,
    pub principal: Principal,
    pub actions: Vec<String>,
    pub source_arn: String,
    pub source_account: String,
}

/// Resources of the event sub-topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSubTopology {
    pub queue_policy: ResourceId,
    pub notification: ResourceId,
    pub events: Vec<ObjectEvent>,
}

/// The sub-topology together with the predicate gating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatedTopology {
    pub predicate: TriggerPredicate,
    /// Condition name the gated resources carry in the graph.
    pub condition: String,
    pub topology: EventSubTopology,
}

impl GatedTopology {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.predicate.evaluate()
    }

    /// The sub-topology if its predicate holds.
    #[must_use]
    pub fn active(&self) -> Option<&EventSubTopology> {
        self.is_active().then_some(&self.topology)
    }
}

/// Specify the event sub-topology and insert it under the trigger condition.
pub fn compose_if_enabled(
    graph: &mut ResourceGraph,
    ctx: &DeploymentContext,
    predicate: TriggerPredicate,
    queue: &QueueHandle,
    bucket: &str,
    prefix: &str,
) -> Result<GatedTopology, TransitError> {
    let events = ObjectEvent::for_mode(predicate.trigger_mode);

    let queue_policy = graph.insert_conditional(
        "EventQueuePolicy",
        ctx.physical_name("event-queue-policy"),
        ResourceSpec::QueuePolicy(QueuePolicyDef {
            queue: queue.id().clone(),
            principal: Principal::Service(OBJECT_EVENT_SERVICE_PRINCIPAL.to_string()),
            actions: vec!["sqs:SendMessage".to_string()],
            source_arn: format!("arn:{}:s3:::{}", ctx.partition, bucket),
            source_account: ctx.account.clone(),
        }),
        &[queue.id()],
        EVENT_TRIGGER_CONDITION,
    )?;

    let notification = graph.insert_conditional(
        "SourceBucketNotification",
        ctx.physical_name("source-notification"),
        ResourceSpec::BucketNotification(BucketNotificationDef {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            events: events.clone(),
            queue: queue.id().clone(),
        }),
        &[queue.id(), &queue_policy],
        EVENT_TRIGGER_CONDITION,
    )?;

    let gated = GatedTopology {
        predicate,
        condition: EVENT_TRIGGER_CONDITION.to_string(),
        topology: EventSubTopology {
            queue_policy,
            notification,
            events,
        },
    };

    tracing::info!(active = gated.is_active(), "event trigger composed");
    Ok(gated)
}

// =============================================================================
// TESTS
// =============================================================================
