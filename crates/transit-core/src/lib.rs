//! # transit-core
//!
//! The deterministic deployment composer for Transit - THE LOGIC.
//!
//! Given the parameters of a cross-cloud object-storage transfer pipeline,
//! this crate decides which backing resources must exist, how they are
//! parameterized, and which permissions flow between them. The output is a
//! [`DeploymentPlan`]: a resource graph, a permission graph, the
//! environment contract of the selected compute role, gated sub-topologies
//! and the published outputs.
//!
//! ## Architectural Constraints
//!
//! - Runs once per deployment and then stops; holds no state across runs
//! - Has NO async, NO network, NO filesystem access (pure Rust)
//! - `BTreeMap`/`BTreeSet` only: the same parameters give a bit-identical plan
//! - Realizing the plan is delegated to a [`ProvisioningBackend`]

// =============================================================================
// MODULES
// =============================================================================

pub mod backend;
pub mod catalog;
pub mod compositor;
pub mod compute;
pub mod environment;
pub mod export;
pub mod graph;
pub mod observability;
pub mod outputs;
pub mod params;
pub mod permissions;
pub mod primitives;
pub mod shared;
pub mod trigger;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AlarmTopicHandle, DeploymentContext, DiscoveryRoleHandle, DlqHandle, FleetHandle, KeyHandle,
    LedgerHandle, QueueHandle, ResourceId, TransitError, ValidationErrors, Violation,
    ViolationRule, WorkerRoleHandle,
};

// =============================================================================
// RE-EXPORTS: Composition
// =============================================================================

pub use backend::{DryRunBackend, ProvisioningBackend, RealizedStack};
pub use catalog::{
    ParameterCatalog, ParameterCatalogBuilder, ParameterSet, ParameterSpec, RawValue,
};
pub use compositor::{Compositor, DeploymentPlan};
pub use compute::{ComputeTopology, RuntimeMode};
pub use environment::{ComputeRole, EnvironmentContract};
pub use graph::{Resource, ResourceGraph, ResourceSpec};
pub use outputs::OutputContract;
pub use params::{DeploymentParams, RunType};
pub use permissions::{PermissionGraph, PermissionGrant};
pub use trigger::{GatedTopology, TriggerPredicate};

// =============================================================================
// RE-EXPORTS: Export
// =============================================================================

#[cfg(feature = "crypto-hash")]
pub use export::{compute_blake3_hash, plan_hash};
pub use export::{
    PlanHeader, canonical_checksum, export_canonical, import_canonical, verify_canonical,
};
