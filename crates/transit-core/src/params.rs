//! # Typed Deployment Parameters
//!
//! A strongly typed view over a validated `ParameterSet`.
//!
//! Enumerated parameters are declared once here; the catalog takes its
//! allowed-value sets from the same declarations.

use crate::catalog::{ParameterSet, names};
use crate::{TransitError, ValidationErrors, Violation, ViolationRule};
use serde::{Deserialize, Serialize};

/// An enumeration whose values are declared in the parameter catalog.
pub trait CatalogEnum: Sized + Copy {
    /// Allowed values, in declaration order. The first one is the default.
    const VALUES: &'static [&'static str];

    /// The catalog value of this variant.
    fn as_str(self) -> &'static str;

    /// Parse a catalog value.
    fn parse(value: &str) -> Option<Self>;
}

macro_rules! catalog_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl CatalogEnum for $name {
            const VALUES: &'static [&'static str] = &[$($value),+];

            fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }

            fn parse(value: &str) -> Option<Self> {
                match value {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

catalog_enum!(
    /// Object-store flavour of the transfer source.
    SourceType {
        /// The native object store of the deployment cloud.
        AmazonS3 => "Amazon_S3",
        AliyunOss => "Aliyun_OSS",
        QiniuKodo => "Qiniu_Kodo",
        TencentCos => "Tencent_COS",
    }
);

impl SourceType {
    /// True for the deployment cloud's own object store.
    #[must_use]
    pub fn is_native(self) -> bool {
        matches!(self, SourceType::AmazonS3)
    }
}

catalog_enum!(
    /// Storage class of objects written to the destination.
    StorageClass {
        Standard => "STANDARD",
        StandardIa => "STANDARD_IA",
        OneZoneIa => "ONEZONE_IA",
        IntelligentTiering => "INTELLIGENT_TIERING",
    }
);

catalog_enum!(
    /// Canned ACL applied to objects written to the destination.
    ObjectAcl {
        Private => "private",
        PublicRead => "public-read",
        PublicReadWrite => "public-read-write",
        AuthenticatedRead => "authenticated-read",
        AwsExecRead => "aws-exec-read",
        BucketOwnerRead => "bucket-owner-read",
        BucketOwnerFullControl => "bucket-owner-full-control",
    }
);

catalog_enum!(
    /// Which source change notifications feed the work queue.
    TriggerMode {
        Disabled => "disabled",
        Creations => "creations",
        CreationsAndDeletions => "creations-and-deletions",
    }
);

catalog_enum!(
    /// Which compute deployment shape is requested.
    RunType {
        /// Stateless discovery task on a managed cluster.
        Cluster => "cluster",
        /// Worker pool autoscaling against queue depth.
        Fleet => "fleet",
    }
);

// =============================================================================
// DEPLOYMENT PARAMETERS
// =============================================================================

/// Location of the transfer source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub source_type: SourceType,
    pub bucket: String,
    pub prefix: String,
    pub region: String,
    pub endpoint: String,
    pub in_current_account: bool,
    /// Secret name holding access credentials; empty when none.
    pub credentials: String,
}

/// Location of the transfer destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationLocation {
    pub bucket: String,
    pub prefix: String,
    pub region: String,
    pub in_current_account: bool,
    /// Secret name holding access credentials; empty when none.
    pub credentials: String,
    pub storage_class: StorageClass,
    pub acl: ObjectAcl,
}

/// Fleet capacity values as supplied; not yet checked against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityParams {
    pub min: u32,
    pub max: u32,
    pub desired: u32,
}

/// Every parameter of a deployment, typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentParams {
    pub source: SourceLocation,
    pub destination: DestinationLocation,
    pub alarm_email: String,
    pub trigger_mode: TriggerMode,
    pub run_type: RunType,
    /// Existing cluster to run discovery on; empty to create one.
    pub cluster_name: String,
    pub vpc_id: String,
    pub subnet_ids: Vec<String>,
    pub discovery_schedule: String,
    pub include_metadata: bool,
    pub discovery_depth: u32,
    pub discovery_parallelism: u32,
    pub worker_threads: u32,
    pub capacity: CapacityParams,
    pub worker_memory_mib: u32,
}

impl DeploymentParams {
    /// Build the typed view of a validated parameter set.
    ///
    /// Fails only if the set was not produced by the standard catalog.
    pub fn from_set(set: &ParameterSet) -> Result<Self, TransitError> {
        Ok(Self {
            source: SourceLocation {
                source_type: enum_value(set, names::SOURCE_TYPE)?,
                bucket: set.text(names::SOURCE_BUCKET)?.to_string(),
                prefix: set.text(names::SOURCE_PREFIX)?.to_string(),
                region: set.text(names::SOURCE_REGION)?.to_string(),
                endpoint: set.text(names::SOURCE_ENDPOINT)?.to_string(),
                in_current_account: set.flag(names::SOURCE_IN_CURRENT_ACCOUNT)?,
                credentials: set.text(names::SOURCE_CREDENTIALS)?.to_string(),
            },
            destination: DestinationLocation {
                bucket: set.text(names::DESTINATION_BUCKET)?.to_string(),
                prefix: set.text(names::DESTINATION_PREFIX)?.to_string(),
                region: set.text(names::DESTINATION_REGION)?.to_string(),
                in_current_account: set.flag(names::DESTINATION_IN_CURRENT_ACCOUNT)?,
                credentials: set.text(names::DESTINATION_CREDENTIALS)?.to_string(),
                storage_class: enum_value(set, names::DESTINATION_STORAGE_CLASS)?,
                acl: enum_value(set, names::DESTINATION_ACL)?,
            },
            alarm_email: set.text(names::ALARM_EMAIL)?.to_string(),
            trigger_mode: enum_value(set, names::EVENT_TRIGGER_MODE)?,
            run_type: enum_value(set, names::RUN_TYPE)?,
            cluster_name: set.text(names::CLUSTER_NAME)?.to_string(),
            vpc_id: set.text(names::VPC_ID)?.to_string(),
            subnet_ids: set.list(names::SUBNET_IDS)?.to_vec(),
            discovery_schedule: set.text(names::DISCOVERY_SCHEDULE)?.to_string(),
            include_metadata: set.flag(names::INCLUDE_METADATA)?,
            discovery_depth: u32_value(set, names::DISCOVERY_DEPTH)?,
            discovery_parallelism: u32_value(set, names::DISCOVERY_PARALLELISM)?,
            worker_threads: u32_value(set, names::WORKER_THREADS)?,
            capacity: CapacityParams {
                min: u32_value(set, names::MIN_CAPACITY)?,
                max: u32_value(set, names::MAX_CAPACITY)?,
                desired: u32_value(set, names::DESIRED_CAPACITY)?,
            },
            worker_memory_mib: u32_value(set, names::WORKER_MEMORY_MIB)?,
        })
    }
}

impl CapacityParams {
    /// Check `min <= desired <= max`.
    ///
    /// The violation is reported against every capacity parameter involved.
    pub fn check_order(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.min > self.max || self.desired < self.min || self.desired > self.max {
            let rule = ViolationRule::CapacityOrder {
                min: self.min,
                desired: self.desired,
                max: self.max,
            };
            if self.min > self.max {
                errors.push(Violation::new(names::MIN_CAPACITY, rule.clone()));
                errors.push(Violation::new(names::MAX_CAPACITY, rule));
            } else {
                errors.push(Violation::new(names::DESIRED_CAPACITY, rule));
            }
        }
        errors.into_result()
    }
}

fn enum_value<E: CatalogEnum>(set: &ParameterSet, name: &str) -> Result<E, TransitError> {
    let value = set.text(name)?;
    E::parse(value).ok_or_else(|| {
        TransitError::InvariantViolation(format!(
            "validated parameter '{}' holds undeclared value {:?}",
            name, value
        ))
    })
}

fn u32_value(set: &ParameterSet, name: &str) -> Result<u32, TransitError> {
    let value = set.number(name)?;
    u32::try_from(value).map_err(|_| {
        TransitError::InvariantViolation(format!(
            "validated parameter '{}' is out of range: {}",
            name, value
        ))
    })
}

// =============================================================================
// TESTS
// =============================================================================
