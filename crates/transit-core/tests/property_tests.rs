//! # Property-Based Tests
//!
//! Determinism and correctness invariants of the composer, checked with
//! proptest over sampled parameter sets.

use proptest::prelude::*;
use std::collections::BTreeMap;
use transit_core::catalog::names;
use transit_core::params::{CapacityParams, SourceType, TriggerMode};
use transit_core::shared::{AlarmState, AlarmRule};
use transit_core::observability::{MetricRef, Statistic};
use transit_core::primitives::{DLQ_ALARM_EVALUATION_PERIODS, DLQ_ALARM_THRESHOLD};
use transit_core::{
    Compositor, DeploymentContext, ParameterCatalog, RawValue, TransitError, TriggerPredicate,
    export_canonical,
};

fn values(
    run_type: &str,
    min: i64,
    max: i64,
    desired: i64,
    in_account: bool,
    trigger: &str,
) -> BTreeMap<String, RawValue> {
    let mut values = BTreeMap::new();
    values.insert(names::SOURCE_BUCKET.to_string(), RawValue::from("src"));
    values.insert(names::DESTINATION_BUCKET.to_string(), RawValue::from("dst"));
    values.insert(names::ALARM_EMAIL.to_string(), RawValue::from("ops@example.com"));
    values.insert(names::VPC_ID.to_string(), RawValue::from("vpc-0a1b2c3d"));
    values.insert(names::SUBNET_IDS.to_string(), RawValue::from("subnet-a,subnet-b"));
    values.insert(names::RUN_TYPE.to_string(), RawValue::from(run_type));
    values.insert(names::MIN_CAPACITY.to_string(), RawValue::Integer(min));
    values.insert(names::MAX_CAPACITY.to_string(), RawValue::Integer(max));
    values.insert(names::DESIRED_CAPACITY.to_string(), RawValue::Integer(desired));
    values.insert(
        names::SOURCE_IN_CURRENT_ACCOUNT.to_string(),
        RawValue::Bool(in_account),
    );
    values.insert(names::EVENT_TRIGGER_MODE.to_string(), RawValue::from(trigger));
    values
}

fn dlq_rule() -> AlarmRule {
    AlarmRule {
        description: String::new(),
        metric: MetricRef::queue("ApproximateNumberOfMessagesVisible", "dlq", Statistic::Maximum),
        threshold: DLQ_ALARM_THRESHOLD,
        evaluation_periods: DLQ_ALARM_EVALUATION_PERIODS,
        period_secs: 300,
        actions: Vec::new(),
    }
}

fn run_type() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("cluster"), Just("fleet")]
}

fn trigger_mode() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("disabled"),
        Just("creations"),
        Just("creations-and-deletions")
    ]
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Same parameters produce bit-identical canonical plans.
    #[test]
    fn determinism_identical_input_produces_identical_plan(
        run_type in run_type(),
        min in 0i64..5,
        extra in 0i64..20,
        in_account in any::<bool>(),
        trigger in trigger_mode(),
    ) {
        let catalog = ParameterCatalog::standard().expect("catalog");
        let ctx = DeploymentContext::default();
        let vals = values(run_type, min, min + extra, min, in_account, trigger);

        let a = Compositor::compose(&catalog, &vals, &ctx).expect("plan a");
        let b = Compositor::compose(&catalog, &vals, &ctx).expect("plan b");
        prop_assert_eq!(export_canonical(&a).expect("a"), export_canonical(&b).expect("b"));
    }

    /// Valid sets instantiate exactly one compute branch.
    #[test]
    fn exactly_one_compute_branch(
        run_type in run_type(),
        min in 0i64..5,
        extra in 0i64..20,
    ) {
        let catalog = ParameterCatalog::standard().expect("catalog");
        let vals = values(run_type, min, min + extra, min, false, "disabled");
        let plan = Compositor::compose(&catalog, &vals, &DeploymentContext::default())
            .expect("plan");

        let discovery = plan.resources.get_by_name("DiscoveryRole").is_some();
        let worker = plan.resources.get_by_name("WorkerRole").is_some();
        prop_assert!(discovery ^ worker);
        prop_assert_eq!(worker, plan.outputs.fleet_name.is_some());
        prop_assert_eq!(plan.resources.of_kind("role").count(), 1);
    }

    /// `min > max` always fails, in either mode, with a validation error.
    #[test]
    fn inverted_capacity_always_fails(
        run_type in run_type(),
        max in 0i64..50,
        gap in 1i64..50,
    ) {
        let catalog = ParameterCatalog::standard().expect("catalog");
        let vals = values(run_type, max + gap, max, max, false, "disabled");
        let result = Compositor::compose(&catalog, &vals, &DeploymentContext::default());
        prop_assert!(matches!(result, Err(TransitError::Validation(_))));
    }

    /// Capacity ordering holds iff min <= desired <= max.
    #[test]
    fn capacity_order_matches_definition(min in 0u32..100, desired in 0u32..100, max in 0u32..100) {
        let ok = CapacityParams { min, max, desired }.check_order().is_ok();
        prop_assert_eq!(ok, min <= desired && desired <= max);
    }

    /// The DLQ alarm fires iff the latest count is non-zero.
    #[test]
    fn dlq_alarm_fires_on_any_message(history in proptest::collection::vec(0u64..1000, 1..20)) {
        let rule = dlq_rule();
        let expected = if history.last().copied().unwrap_or(0) > 0 {
            AlarmState::Alarm
        } else {
            AlarmState::Ok
        };
        prop_assert_eq!(rule.evaluate(&history), expected);
    }

    /// The trigger predicate is the conjunction of its three inputs.
    #[test]
    fn trigger_predicate_is_conjunction(
        in_account in any::<bool>(),
        source in prop_oneof![
            Just(SourceType::AmazonS3),
            Just(SourceType::AliyunOss),
            Just(SourceType::QiniuKodo),
            Just(SourceType::TencentCos),
        ],
        mode in prop_oneof![
            Just(TriggerMode::Disabled),
            Just(TriggerMode::Creations),
            Just(TriggerMode::CreationsAndDeletions),
        ],
    ) {
        let predicate = TriggerPredicate {
            source_in_current_account: in_account,
            source_type: source,
            trigger_mode: mode,
        };
        prop_assert_eq!(
            predicate.evaluate(),
            in_account && source == SourceType::AmazonS3 && mode != TriggerMode::Disabled
        );
    }

    /// Re-granting any existing grant never adds a statement.
    #[test]
    fn regrant_is_idempotent(run_type in run_type()) {
        let catalog = ParameterCatalog::standard().expect("catalog");
        let vals = values(run_type, 1, 20, 1, false, "disabled");
        let plan = Compositor::compose(&catalog, &vals, &DeploymentContext::default())
            .expect("plan");

        let mut grants = plan.grants.clone();
        for grant in plan.grants.iter() {
            let actions: Vec<_> = grant.actions.iter().copied().collect();
            let added = grants
                .grant(&grant.grantee, grant.target.clone(), &actions)
                .expect("grant");
            prop_assert!(!added);
        }
        prop_assert_eq!(grants.len(), plan.grants.len());
    }
}
