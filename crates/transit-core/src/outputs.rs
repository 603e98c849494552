//! # Output Contract Emitter
//!
//! Named references published for downstream consumers. The fleet name is
//! present only when the fleet branch was selected.

use crate::compute::ComputeTopology;
use crate::shared::SharedResources;
use serde::{Deserialize, Serialize};

pub const LEDGER_NAME: &str = "JobLedgerName";
pub const QUEUE_NAME: &str = "WorkQueueName";
pub const DLQ_NAME: &str = "DeadLetterQueueName";
pub const ALARM_TOPIC_NAME: &str = "AlarmTopicName";
pub const FLEET_NAME: &str = "WorkerFleetName";

/// The published outputs of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputContract {
    pub ledger_name: String,
    pub queue_name: String,
    pub dlq_name: String,
    pub alarm_topic_name: String,
    pub fleet_name: Option<String>,
}

impl OutputContract {
    #[must_use]
    pub fn emit(shared: &SharedResources, topology: &ComputeTopology) -> Self {
        Self {
            ledger_name: shared.ledger.name().to_string(),
            queue_name: shared.queue.name().to_string(),
            dlq_name: shared.dlq.name().to_string(),
            alarm_topic_name: shared.alarm_topic.name().to_string(),
            fleet_name: topology.fleet().map(|f| f.name().to_string()),
        }
    }

    /// `(output name, value)` pairs in publication order.
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        let mut entries = vec![
            (LEDGER_NAME, self.ledger_name.as_str()),
            (QUEUE_NAME, self.queue_name.as_str()),
            (DLQ_NAME, self.dlq_name.as_str()),
            (ALARM_TOPIC_NAME, self.alarm_topic_name.as_str()),
        ];
        if let Some(fleet) = &self.fleet_name {
            entries.push((FLEET_NAME, fleet.as_str()));
        }
        entries
    }
}
