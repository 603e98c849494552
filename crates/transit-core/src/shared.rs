//! # Shared Resource Provisioner
//!
//! Foundational resources consumed by every downstream composer:
//! - the job ledger (single-key table, on-demand, encrypted, PITR)
//! - the work queue and its dead-letter queue (bounded redrive)
//! - a rotating key and the alarm topic it encrypts
//! - the operator email subscription
//! - the zero-tolerance dead-letter alarm

use crate::graph::{Principal, ResourceGraph, ResourceSpec};
use crate::observability::{MetricRef, Statistic};
use crate::primitives::{
    ALARM_PERIOD_SECS, DLQ_ALARM_EVALUATION_PERIODS, DLQ_ALARM_THRESHOLD,
    DLQ_RETENTION_SECS, DLQ_VISIBILITY_TIMEOUT_SECS, MAX_RECEIVE_COUNT,
    MONITORING_SERVICE_PRINCIPAL, NOTIFICATION_SERVICE_PRINCIPAL, QUEUE_VISIBILITY_TIMEOUT_SECS,
};
use crate::{
    AlarmTopicHandle, DeploymentContext, DlqHandle, KeyHandle, LedgerHandle, QueueHandle,
    ResourceId, TransitError,
};
use serde::{Deserialize, Serialize};

/// Partition key of the job ledger: the object key.
pub const LEDGER_PARTITION_KEY: &str = "objectKey";

/// Key actions granted to the notification and monitoring services.
pub const KEY_DATA_ACTIONS: [&str; 3] = ["kms:Encrypt", "kms:Decrypt", "kms:GenerateDataKey*"];

/// Key actions granted to the account root for administration only.
pub const KEY_ADMIN_ACTIONS: [&str; 9] = [
    "kms:Create*",
    "kms:Describe*",
    "kms:Enable*",
    "kms:List*",
    "kms:Put*",
    "kms:Update*",
    "kms:Revoke*",
    "kms:Disable*",
    "kms:ScheduleKeyDeletion",
];

// =============================================================================
// RESOURCE DEFINITIONS
// =============================================================================

/// The job ledger table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Partition key attribute (string-typed). No sort key, no secondary indexes.
    pub partition_key: String,
    pub on_demand_capacity: bool,
    pub encrypted_at_rest: bool,
    pub point_in_time_recovery: bool,
}

/// Moves a message to a dead-letter queue after repeated failed consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedrivePolicy {
    pub dead_letter_queue: ResourceId,
    pub max_receive_count: u32,
}

/// A message queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDef {
    pub visibility_timeout_secs: u32,
    /// `None` keeps the service default retention.
    pub retention_secs: Option<u32>,
    pub redrive: Option<RedrivePolicy>,
    /// Server-side encryption with a service-managed key.
    pub managed_encryption: bool,
}

/// One statement of a key policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPolicyStatement {
    pub sid: String,
    pub principal: Principal,
    pub actions: Vec<String>,
}

/// An encryption key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDef {
    pub description: String,
    pub rotation_enabled: bool,
    pub policy: Vec<KeyPolicyStatement>,
}

impl KeyDef {
    /// Principals allowed to perform a key action.
    pub fn principals_for<'a>(
        &'a self,
        action: &'a str,
    ) -> impl Iterator<Item = &'a Principal> + 'a {
        self.policy
            .iter()
            .filter(move |s| s.actions.iter().any(|a| a == action))
            .map(|s| &s.principal)
    }
}

/// A notification topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDef {
    pub display_name: String,
    pub encryption_key: ResourceId,
}

/// A subscription to a notification topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDef {
    pub topic: ResourceId,
    pub protocol: String,
    pub endpoint: String,
}

// =============================================================================
// ALARM RULE
// =============================================================================

/// State of an alarm after evaluating a series of datapoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmState {
    Ok,
    Alarm,
}

/// A threshold alarm on a single metric.
///
/// Fires when the metric is strictly greater than `threshold` for
/// `evaluation_periods` consecutive periods. Missing data is not breaching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRule {
    pub description: String,
    pub metric: MetricRef,
    pub threshold: u64,
    pub evaluation_periods: u32,
    pub period_secs: u32,
    /// Topics notified when the alarm fires.
    pub actions: Vec<ResourceId>,
}

impl AlarmRule {
    /// True if a single datapoint breaches the threshold.
    #[must_use]
    pub fn breaches(&self, value: u64) -> bool {
        value > self.threshold
    }

    /// Evaluate the alarm against datapoints, oldest first.
    ///
    /// Only the most recent `evaluation_periods` datapoints are considered.
    #[must_use]
    pub fn evaluate(&self, datapoints: &[u64]) -> AlarmState {
        let periods = self.evaluation_periods.max(1) as usize;
        if datapoints.len() < periods {
            return AlarmState::Ok;
        }
        let recent = &datapoints[datapoints.len() - periods..];
        if recent.iter().all(|v| self.breaches(*v)) {
            AlarmState::Alarm
        } else {
            AlarmState::Ok
        }
    }
}

// =============================================================================
// PROVISIONER
// =============================================================================

/// Handles to the shared resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedResources {
    pub ledger: LedgerHandle,
    pub queue: QueueHandle,
    pub dlq: DlqHandle,
    pub alarm_topic: AlarmTopicHandle,
    pub key: KeyHandle,
    pub alarm: ResourceId,
}

/// Build the shared resources and insert them into the graph.
pub fn provision_shared(
    graph: &mut ResourceGraph,
    ctx: &DeploymentContext,
    alarm_email: &str,
) -> Result<SharedResources, TransitError> {
    let ledger_name = ctx.physical_name("job-ledger");
    let ledger_id = graph.insert(
        "JobLedger",
        ledger_name.clone(),
        ResourceSpec::Table(TableDef {
            partition_key: LEDGER_PARTITION_KEY.to_string(),
            on_demand_capacity: true,
            encrypted_at_rest: true,
            point_in_time_recovery: true,
        }),
        &[],
    )?;

    let dlq_name = ctx.physical_name("work-queue-dlq");
    let dlq_id = graph.insert(
        "WorkQueueDlq",
        dlq_name.clone(),
        ResourceSpec::Queue(QueueDef {
            visibility_timeout_secs: DLQ_VISIBILITY_TIMEOUT_SECS,
            retention_secs: Some(DLQ_RETENTION_SECS),
            redrive: None,
            managed_encryption: true,
        }),
        &[],
    )?;

    let queue_name = ctx.physical_name("work-queue");
    let queue_id = graph.insert(
        "WorkQueue",
        queue_name.clone(),
        ResourceSpec::Queue(QueueDef {
            visibility_timeout_secs: QUEUE_VISIBILITY_TIMEOUT_SECS,
            retention_secs: None,
            redrive: Some(RedrivePolicy {
                dead_letter_queue: dlq_id.clone(),
                max_receive_count: MAX_RECEIVE_COUNT,
            }),
            managed_encryption: true,
        }),
        &[&dlq_id],
    )?;

    let data_actions: Vec<String> = KEY_DATA_ACTIONS.iter().map(|a| (*a).to_string()).collect();
    let key_name = ctx.physical_name("alarm-key");
    let key_id = graph.insert(
        "AlarmTopicKey",
        key_name.clone(),
        ResourceSpec::Key(KeyDef {
            description: "Encrypts the transfer alarm topic".to_string(),
            rotation_enabled: true,
            policy: vec![
                KeyPolicyStatement {
                    sid: "KeyAdministration".to_string(),
                    principal: Principal::Account(ctx.account_root()),
                    actions: KEY_ADMIN_ACTIONS.iter().map(|a| (*a).to_string()).collect(),
                },
                KeyPolicyStatement {
                    sid: "NotificationServiceDataKey".to_string(),
                    principal: Principal::Service(NOTIFICATION_SERVICE_PRINCIPAL.to_string()),
                    actions: data_actions.clone(),
                },
                KeyPolicyStatement {
                    sid: "MonitoringServiceDataKey".to_string(),
                    principal: Principal::Service(MONITORING_SERVICE_PRINCIPAL.to_string()),
                    actions: data_actions,
                },
            ],
        }),
        &[],
    )?;

    let topic_name = ctx.physical_name("alarm-topic");
    let topic_id = graph.insert(
        "AlarmTopic",
        topic_name.clone(),
        ResourceSpec::Topic(TopicDef {
            display_name: format!("{} transfer alarms", ctx.stack_name),
            encryption_key: key_id.clone(),
        }),
        &[&key_id],
    )?;

    graph.insert(
        "AlarmEmailSubscription",
        ctx.physical_name("alarm-email"),
        ResourceSpec::Subscription(SubscriptionDef {
            topic: topic_id.clone(),
            protocol: "email".to_string(),
            endpoint: alarm_email.to_string(),
        }),
        &[&topic_id],
    )?;

    let alarm_id = graph.insert(
        "DeadLetterAlarm",
        ctx.physical_name("dlq-alarm"),
        ResourceSpec::Alarm(AlarmRule {
            description: "Transfer tasks reached the dead-letter queue".to_string(),
            metric: MetricRef::queue(
                "ApproximateNumberOfMessagesVisible",
                &dlq_name,
                Statistic::Maximum,
            ),
            threshold: DLQ_ALARM_THRESHOLD,
            evaluation_periods: DLQ_ALARM_EVALUATION_PERIODS,
            period_secs: ALARM_PERIOD_SECS,
            actions: vec![topic_id.clone()],
        }),
        &[&dlq_id, &topic_id],
    )?;

    tracing::debug!(ledger = %ledger_name, queue = %queue_name, "shared resources composed");

    Ok(SharedResources {
        ledger: LedgerHandle::new(ledger_id, ledger_name),
        queue: QueueHandle::new(queue_id, queue_name),
        dlq: DlqHandle::new(dlq_id, dlq_name),
        alarm_topic: AlarmTopicHandle::new(topic_id, topic_name),
        key: KeyHandle::new(key_id, key_name),
        alarm: alarm_id,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn provisioned() -> (ResourceGraph, SharedResources) {
        let mut graph = ResourceGraph::new();
        let shared = provision_shared(&mut graph, &DeploymentContext::default(), "ops@example.com")
            .expect("provision");
        (graph, shared)
    }

    #[test]
    fn names_derive_from_stack() {
        let (_, shared) = provisioned();
        assert_eq!(shared.ledger.name(), "transit-job-ledger");
        assert_eq!(shared.queue.name(), "transit-work-queue");
        assert_eq!(shared.dlq.name(), "transit-work-queue-dlq");
        assert_eq!(shared.alarm_topic.name(), "transit-alarm-topic");
    }

    #[test]
    fn ledger_is_single_key_on_demand_encrypted() {
        let (graph, shared) = provisioned();
        let Some(ResourceSpec::Table(table)) = graph.get(shared.ledger.id()).map(|r| &r.spec) else {
            panic!("ledger is not a table");
        };
        assert_eq!(table.partition_key, LEDGER_PARTITION_KEY);
        assert!(table.on_demand_capacity);
        assert!(table.encrypted_at_rest);
        assert!(table.point_in_time_recovery);
    }

    #[test]
    fn queue_redrives_to_dlq_after_five_attempts() {
        let (graph, shared) = provisioned();
        let Some(ResourceSpec::Queue(queue)) = graph.get(shared.queue.id()).map(|r| &r.spec) else {
            panic!("queue is not a queue");
        };
        assert_eq!(queue.visibility_timeout_secs, 900);
        let redrive = queue.redrive.as_ref().expect("redrive");
        assert_eq!(&redrive.dead_letter_queue, shared.dlq.id());
        assert_eq!(redrive.max_receive_count, 5);

        let Some(ResourceSpec::Queue(dlq)) = graph.get(shared.dlq.id()).map(|r| &r.spec) else {
            panic!("dlq is not a queue");
        };
        assert_eq!(dlq.visibility_timeout_secs, 1800);
        assert_eq!(dlq.retention_secs, Some(1_209_600));
        assert!(dlq.redrive.is_none());
    }

    #[test]
    fn key_data_actions_granted_to_exactly_two_services() {
        let (graph, shared) = provisioned();
        let Some(ResourceSpec::Key(key)) = graph.get(shared.key.id()).map(|r| &r.spec) else {
            panic!("key is not a key");
        };
        assert!(key.rotation_enabled);

        for action in KEY_DATA_ACTIONS {
            let principals: Vec<&Principal> = key.principals_for(action).collect();
            assert_eq!(
                principals,
                vec![
                    &Principal::Service(NOTIFICATION_SERVICE_PRINCIPAL.to_string()),
                    &Principal::Service(MONITORING_SERVICE_PRINCIPAL.to_string()),
                ]
            );
        }
    }

    #[test]
    fn single_email_subscription() {
        let (graph, _) = provisioned();
        let subscriptions: Vec<_> = graph.of_kind("subscription").collect();
        assert_eq!(subscriptions.len(), 1);
        let ResourceSpec::Subscription(sub) = &subscriptions[0].spec else {
            panic!("not a subscription");
        };
        assert_eq!(sub.protocol, "email");
        assert_eq!(sub.endpoint, "ops@example.com");
    }

    #[test]
    fn alarm_fires_on_any_dead_lettered_message() {
        let (graph, shared) = provisioned();
        let Some(ResourceSpec::Alarm(alarm)) = graph.get(&shared.alarm).map(|r| &r.spec) else {
            panic!("alarm is not an alarm");
        };
        assert_eq!(alarm.metric.dimension_value, shared.dlq.name());
        assert_eq!(alarm.actions, vec![shared.alarm_topic.id().clone()]);

        assert_eq!(alarm.evaluate(&[1]), AlarmState::Alarm);
        assert_eq!(alarm.evaluate(&[0, 0, 7]), AlarmState::Alarm);
        assert_eq!(alarm.evaluate(&[0]), AlarmState::Ok);
        assert_eq!(alarm.evaluate(&[9, 0]), AlarmState::Ok);
        assert_eq!(alarm.evaluate(&[]), AlarmState::Ok);
    }

    #[test]
    fn multi_period_alarm_needs_consecutive_breaches() {
        let rule = AlarmRule {
            description: String::new(),
            metric: MetricRef::queue("M", "q", Statistic::Maximum),
            threshold: 0,
            evaluation_periods: 2,
            period_secs: 60,
            actions: Vec::new(),
        };
        assert_eq!(rule.evaluate(&[1]), AlarmState::Ok);
        assert_eq!(rule.evaluate(&[0, 1]), AlarmState::Ok);
        assert_eq!(rule.evaluate(&[1, 1]), AlarmState::Alarm);
    }
}
