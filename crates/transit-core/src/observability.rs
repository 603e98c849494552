//! # Observability Composer
//!
//! Builds the monitoring dashboard for a deployment.
//!
//! Queue-depth and dead-letter widgets are always rendered. Fleet-capacity
//! widgets are rendered only when the selected compute topology has a fleet;
//! the cluster topology contributes no compute widgets.

use crate::compute::ComputeTopology;
use crate::graph::{ResourceGraph, ResourceSpec};
use crate::shared::SharedResources;
use crate::{DeploymentContext, ResourceId, TransitError};
use serde::{Deserialize, Serialize};

/// Metric namespace of the queue service.
pub const QUEUE_NAMESPACE: &str = "AWS/SQS";

/// Metric namespace of the fleet autoscaling service.
pub const FLEET_NAMESPACE: &str = "AWS/AutoScaling";

/// Metric namespace of fleet instances.
pub const INSTANCE_NAMESPACE: &str = "AWS/EC2";

// =============================================================================
// METRICS
// =============================================================================

/// Aggregation applied to a metric over one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statistic {
    Maximum,
    Average,
    Sum,
}

/// A single metric series, identified by namespace, name and one dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRef {
    pub namespace: String,
    pub metric_name: String,
    pub dimension_name: String,
    pub dimension_value: String,
    pub statistic: Statistic,
}

impl MetricRef {
    /// A queue metric, keyed by queue name.
    #[must_use]
    pub fn queue(metric_name: &str, queue_name: &str, statistic: Statistic) -> Self {
        Self {
            namespace: QUEUE_NAMESPACE.to_string(),
            metric_name: metric_name.to_string(),
            dimension_name: "QueueName".to_string(),
            dimension_value: queue_name.to_string(),
            statistic,
        }
    }

    /// A fleet metric, keyed by group name.
    #[must_use]
    pub fn fleet(
        namespace: &str,
        metric_name: &str,
        group_name: &str,
        statistic: Statistic,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            metric_name: metric_name.to_string(),
            dimension_name: "AutoScalingGroupName".to_string(),
            dimension_value: group_name.to_string(),
            statistic,
        }
    }
}

// =============================================================================
// DASHBOARD
// =============================================================================

/// A titled graph of one or more metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    pub title: String,
    pub metrics: Vec<MetricRef>,
}

/// The monitoring view of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
    pub widgets: Vec<Widget>,
}

impl Dashboard {
    /// True if some widget watches the given namespace.
    #[must_use]
    pub fn watches(&self, namespace: &str) -> bool {
        self.widgets
            .iter()
            .any(|w| w.metrics.iter().any(|m| m.namespace == namespace))
    }

    /// Widget titles, in render order.
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.widgets.iter().map(|w| w.title.as_str())
    }
}

/// Build the dashboard for the selected topology and insert it into the graph.
pub fn build_dashboard(
    graph: &mut ResourceGraph,
    ctx: &DeploymentContext,
    topology: &ComputeTopology,
    shared: &SharedResources,
) -> Result<ResourceId, TransitError> {
    let queue = shared.queue.name();
    let dlq = shared.dlq.name();

    let mut widgets = vec![
        Widget {
            title: "Work Queue Depth".to_string(),
            metrics: vec![
                MetricRef::queue("ApproximateNumberOfMessagesVisible", queue, Statistic::Maximum),
                MetricRef::queue(
                    "ApproximateNumberOfMessagesNotVisible",
                    queue,
                    Statistic::Maximum,
                ),
            ],
        },
        Widget {
            title: "Oldest Task Age".to_string(),
            metrics: vec![MetricRef::queue(
                "ApproximateAgeOfOldestMessage",
                queue,
                Statistic::Maximum,
            )],
        },
        Widget {
            title: "Dead-Letter Queue".to_string(),
            metrics: vec![MetricRef::queue(
                "ApproximateNumberOfMessagesVisible",
                dlq,
                Statistic::Maximum,
            )],
        },
    ];

    let mut depends_on = vec![shared.queue.id(), shared.dlq.id()];

    match topology {
        ComputeTopology::Cluster(_) => {}
        ComputeTopology::Fleet(fleet) => {
            let group = fleet.fleet.name();
            widgets.push(Widget {
                title: "Fleet Capacity".to_string(),
                metrics: vec![
                    MetricRef::fleet(
                        FLEET_NAMESPACE,
                        "GroupDesiredCapacity",
                        group,
                        Statistic::Average,
                    ),
                    MetricRef::fleet(
                        FLEET_NAMESPACE,
                        "GroupInServiceInstances",
                        group,
                        Statistic::Average,
                    ),
                ],
            });
            widgets.push(Widget {
                title: "Fleet CPU".to_string(),
                metrics: vec![MetricRef::fleet(
                    INSTANCE_NAMESPACE,
                    "CPUUtilization",
                    group,
                    Statistic::Average,
                )],
            });
            depends_on.push(fleet.fleet.id());
        }
    }

    tracing::debug!(widgets = widgets.len(), "dashboard composed");

    graph.insert(
        "Dashboard",
        ctx.physical_name("dashboard"),
        ResourceSpec::Dashboard(Dashboard { widgets }),
        &depends_on,
    )
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_metrics_are_keyed_by_queue_name() {
        let metric = MetricRef::queue("ApproximateNumberOfMessagesVisible", "q", Statistic::Sum);
        assert_eq!(metric.namespace, QUEUE_NAMESPACE);
        assert_eq!(metric.dimension_name, "QueueName");
        assert_eq!(metric.dimension_value, "q");
    }

    #[test]
    fn dashboard_watches_namespaces() {
        let dashboard = Dashboard {
            widgets: vec![Widget {
                title: "Depth".to_string(),
                metrics: vec![MetricRef::queue("M", "q", Statistic::Maximum)],
            }],
        };
        assert!(dashboard.watches(QUEUE_NAMESPACE));
        assert!(!dashboard.watches(FLEET_NAMESPACE));
        assert_eq!(dashboard.titles().collect::<Vec<_>>(), vec!["Depth"]);
    }
}
