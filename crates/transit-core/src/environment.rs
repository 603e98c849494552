//! # Environment Contracts
//!
//! The resolved variable set handed to each data-plane process at launch.
//!
//! Contracts are derived entirely from parameter values and resource
//! handle names. They are emitted, never parsed back by this crate.

use crate::params::{CatalogEnum, DeploymentParams};
use crate::shared::SharedResources;
use crate::DeploymentContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Variable names understood by the data-plane processes.
pub mod vars {
    pub const REGION: &str = "AWS_DEFAULT_REGION";
    pub const JOB_TABLE_NAME: &str = "JOB_TABLE_NAME";
    pub const JOB_QUEUE_NAME: &str = "JOB_QUEUE_NAME";

    pub const SOURCE_TYPE: &str = "SOURCE_TYPE";
    pub const SRC_BUCKET: &str = "SRC_BUCKET";
    pub const SRC_PREFIX: &str = "SRC_PREFIX";
    pub const SRC_REGION: &str = "SRC_REGION";
    pub const SRC_ENDPOINT: &str = "SRC_ENDPOINT";
    pub const SRC_CREDENTIALS: &str = "SRC_CREDENTIALS";
    pub const SRC_IN_CURRENT_ACCOUNT: &str = "SRC_IN_CURRENT_ACCOUNT";

    pub const DEST_BUCKET: &str = "DEST_BUCKET";
    pub const DEST_PREFIX: &str = "DEST_PREFIX";
    pub const DEST_REGION: &str = "DEST_REGION";
    pub const DEST_CREDENTIALS: &str = "DEST_CREDENTIALS";
    pub const DEST_IN_CURRENT_ACCOUNT: &str = "DEST_IN_CURRENT_ACCOUNT";

    pub const FINDER_DEPTH: &str = "FINDER_DEPTH";
    pub const FINDER_NUMBER: &str = "FINDER_NUMBER";

    pub const DEST_STORAGE_CLASS: &str = "DEST_STORAGE_CLASS";
    pub const DEST_ACL: &str = "DEST_ACL";
    pub const INCLUDE_METADATA: &str = "INCLUDE_METADATA";
    pub const WORKER_NUMBER: &str = "WORKER_NUMBER";
}

/// Which data-plane process a contract is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComputeRole {
    /// Enumerates and diffs objects, enqueues transfer tasks.
    Discovery,
    /// Consumes transfer tasks and copies objects.
    Worker,
}

impl ComputeRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ComputeRole::Discovery => "discovery",
            ComputeRole::Worker => "worker",
        }
    }

    /// Parse the lowercase role name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "discovery" => Some(ComputeRole::Discovery),
            "worker" => Some(ComputeRole::Worker),
            _ => None,
        }
    }
}

/// Variable name -> resolved value, for one compute role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentContract {
    pub role: ComputeRole,
    pub variables: BTreeMap<String, String>,
}

impl EnvironmentContract {
    /// Contract of the discovery process.
    ///
    /// Region, ledger and queue names, every source/destination location and
    /// credential field, and the discovery parallelism settings.
    #[must_use]
    pub fn discovery(
        params: &DeploymentParams,
        ctx: &DeploymentContext,
        shared: &SharedResources,
    ) -> Self {
        let mut variables = common_variables(params, ctx, shared);
        variables.insert(
            vars::FINDER_DEPTH.to_string(),
            params.discovery_depth.to_string(),
        );
        variables.insert(
            vars::FINDER_NUMBER.to_string(),
            params.discovery_parallelism.to_string(),
        );
        Self {
            role: ComputeRole::Discovery,
            variables,
        }
    }

    /// Contract of the worker process.
    ///
    /// The shared location fields plus storage class, ACL, metadata flag and
    /// worker thread count.
    #[must_use]
    pub fn worker(
        params: &DeploymentParams,
        ctx: &DeploymentContext,
        shared: &SharedResources,
    ) -> Self {
        let mut variables = common_variables(params, ctx, shared);
        let dest = &params.destination;
        variables.insert(
            vars::DEST_STORAGE_CLASS.to_string(),
            dest.storage_class.as_str().to_string(),
        );
        variables.insert(vars::DEST_ACL.to_string(), dest.acl.as_str().to_string());
        variables.insert(
            vars::INCLUDE_METADATA.to_string(),
            params.include_metadata.to_string(),
        );
        variables.insert(
            vars::WORKER_NUMBER.to_string(),
            params.worker_threads.to_string(),
        );
        Self {
            role: ComputeRole::Worker,
            variables,
        }
    }

    /// Contract for the given role.
    #[must_use]
    pub fn for_role(
        role: ComputeRole,
        params: &DeploymentParams,
        ctx: &DeploymentContext,
        shared: &SharedResources,
    ) -> Self {
        match role {
            ComputeRole::Discovery => Self::discovery(params, ctx, shared),
            ComputeRole::Worker => Self::worker(params, ctx, shared),
        }
    }

    /// Value of a variable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// True if the contract has no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Render as `NAME=value` lines, sorted by name.
    #[must_use]
    pub fn to_dotenv(&self) -> String {
        self.variables
            .iter()
            .map(|(k, v)| format!("{}={}\n", k, v))
            .collect()
    }
}

fn common_variables(
    params: &DeploymentParams,
    ctx: &DeploymentContext,
    shared: &SharedResources,
) -> BTreeMap<String, String> {
    let src = &params.source;
    let dest = &params.destination;

    [
        (vars::REGION, ctx.region.clone()),
        (vars::JOB_TABLE_NAME, shared.ledger.name().to_string()),
        (vars::JOB_QUEUE_NAME, shared.queue.name().to_string()),
        (vars::SOURCE_TYPE, src.source_type.as_str().to_string()),
        (vars::SRC_BUCKET, src.bucket.clone()),
        (vars::SRC_PREFIX, src.prefix.clone()),
        (vars::SRC_REGION, src.region.clone()),
        (vars::SRC_ENDPOINT, src.endpoint.clone()),
        (vars::SRC_CREDENTIALS, src.credentials.clone()),
        (vars::SRC_IN_CURRENT_ACCOUNT, src.in_current_account.to_string()),
        (vars::DEST_BUCKET, dest.bucket.clone()),
        (vars::DEST_PREFIX, dest.prefix.clone()),
        (vars::DEST_REGION, dest.region.clone()),
        (vars::DEST_CREDENTIALS, dest.credentials.clone()),
        (vars::DEST_IN_CURRENT_ACCOUNT, dest.in_current_account.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

// =============================================================================
// TESTS
// =============================================================================
