//! # Composition Primitives
//!
//! Hardcoded constants for the Transit composer.
//!
//! These values are compiled into the binary and are immutable at runtime.
//! They describe the fixed shape of the shared resources: queue timing,
//! redrive bounds, the dead-letter alarm, and the service principals that
//! appear in resource policies.

// =============================================================================
// WORK QUEUE & DEAD-LETTER QUEUE
// =============================================================================

/// Visibility window of the work queue.
///
/// Must cover a worst-case single-object transfer (15 minutes).
pub const QUEUE_VISIBILITY_TIMEOUT_SECS: u32 = 15 * 60;

/// Visibility window of the dead-letter queue (30 minutes).
pub const DLQ_VISIBILITY_TIMEOUT_SECS: u32 = 30 * 60;

/// Retention period of the dead-letter queue (14 days).
pub const DLQ_RETENTION_SECS: u32 = 14 * 24 * 60 * 60;

/// Failed consume attempts before a message is moved to the DLQ.
pub const MAX_RECEIVE_COUNT: u32 = 5;

// =============================================================================
// DEAD-LETTER ALARM
// =============================================================================

/// The DLQ alarm fires when the visible-message count exceeds this value.
///
/// Zero tolerance: any dead-lettered message triggers a notification.
pub const DLQ_ALARM_THRESHOLD: u64 = 0;

/// Consecutive breaching periods required before the alarm fires.
pub const DLQ_ALARM_EVALUATION_PERIODS: u32 = 1;

/// Length of one alarm evaluation period.
pub const ALARM_PERIOD_SECS: u32 = 300;

// =============================================================================
// NETWORK & COMPUTE
// =============================================================================

/// Minimum number of subnets for fault tolerance.
pub const MIN_SUBNET_COUNT: usize = 2;

/// Upper bound for every numeric parameter.
///
/// Numeric parameters are handed to the data plane as 32-bit values.
pub const MAX_NUMERIC_PARAMETER: i64 = u32::MAX as i64;

/// Maximum length of a single string parameter value.
pub const MAX_PARAMETER_VALUE_LENGTH: usize = 1024;

/// Queue depth boundaries (visible messages) for fleet scale-out steps.
///
/// Scale-out begins at one visible message; an empty queue scales in.
/// Each entry is `(lower_bound, capacity_change)`; a step applies from its
/// lower bound up to the next step's lower bound.
pub const SCALE_OUT_STEPS: [(u64, i64); 3] = [(1, 1), (100, 2), (500, 5)];

// =============================================================================
// PRINCIPALS
// =============================================================================

/// Service principal of the notification service (alarm topic).
pub const NOTIFICATION_SERVICE_PRINCIPAL: &str = "sns.amazonaws.com";

/// Service principal of the monitoring service (alarms).
pub const MONITORING_SERVICE_PRINCIPAL: &str = "cloudwatch.amazonaws.com";

/// Service principal that delivers object-store change notifications.
pub const OBJECT_EVENT_SERVICE_PRINCIPAL: &str = "s3.amazonaws.com";

/// Principal assumed by the cluster-hosted discovery task.
pub const TASK_SERVICE_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";

/// Principal assumed by worker fleet instances.
pub const INSTANCE_SERVICE_PRINCIPAL: &str = "ec2.amazonaws.com";

/// Principal that runs scheduled tasks on the cluster.
pub const SCHEDULER_SERVICE_PRINCIPAL: &str = "events.amazonaws.com";

// =============================================================================
// DEPLOYMENT CONTEXT DEFAULTS
// =============================================================================

/// Default stack name used as the prefix of every physical name.
pub const DEFAULT_STACK_NAME: &str = "transit";

/// Default partition for rendered ARNs.
pub const DEFAULT_PARTITION: &str = "aws";

/// Placeholder for the region, resolved by the provisioning backend.
pub const REGION_TOKEN: &str = "${AWS::Region}";

/// Placeholder for the account id, resolved by the provisioning backend.
pub const ACCOUNT_TOKEN: &str = "${AWS::AccountId}";

/// Name of the condition gating the event trigger sub-topology.
pub const EVENT_TRIGGER_CONDITION: &str = "EventTriggerEnabled";

// =============================================================================
// VALIDATION PATTERNS
// =============================================================================

/// Pattern an operator alarm email must match.
pub const EMAIL_PATTERN: &str = r"^\w[-\w.+]*@([A-Za-z0-9][-A-Za-z0-9]+\.)+[A-Za-z]{2,14}$";

/// Pattern a discovery schedule expression must match.
pub const SCHEDULE_PATTERN: &str =
    r"^(rate\(\d+ (minute|minutes|hour|hours|day|days)\)|cron\([^()]+\))$";

/// Pattern a VPC id must match.
pub const VPC_ID_PATTERN: &str = r"^vpc-[0-9a-f]{8,17}$";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_visibility_covers_fifteen_minutes() {
        assert_eq!(QUEUE_VISIBILITY_TIMEOUT_SECS, 900);
        assert_eq!(DLQ_VISIBILITY_TIMEOUT_SECS, 1800);
    }

    #[test]
    fn dlq_retention_is_fourteen_days() {
        assert_eq!(DLQ_RETENTION_SECS, 1_209_600);
    }

    #[test]
    fn scale_out_steps_are_ascending() {
        for pair in SCALE_OUT_STEPS.windows(2) {
            assert!(pair[0].0 < pair[1].0);
        }
    }

    #[test]
    fn scale_out_starts_at_first_visible_message() {
        assert_eq!(SCALE_OUT_STEPS.map(|(lower, _)| lower), [1, 100, 500]);
    }
}
