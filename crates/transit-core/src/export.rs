//! # Canonical Export Module
//!
//! Bit-exact `postcard` serialization of a deployment plan.
//!
//! The same parameter set always composes to the same plan, and the same
//! plan always exports to the same bytes. The canonical bytes are what the
//! `hash` and `verify` commands operate on.
//!
//! Format:
//! ```text
//! [header_len: u32 LE] [PlanHeader (postcard)] [DeploymentPlan (postcard)]
//! ```

use crate::TransitError;
use crate::compositor::DeploymentPlan;
use serde::{Deserialize, Serialize};

/// Magic bytes of the canonical plan format.
pub const PLAN_MAGIC: [u8; 4] = *b"TRNP";

/// Current canonical format version.
pub const PLAN_VERSION: u8 = 1;

/// Upper bound on resources in an imported plan.
pub const MAX_IMPORT_RESOURCE_COUNT: u64 = 10_000;

/// Upper bound on grants in an imported plan.
pub const MAX_IMPORT_GRANT_COUNT: u64 = 10_000;

/// Header of a canonical plan file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub resource_count: u64,
    pub grant_count: u64,
    /// Checksum of the plan section.
    pub checksum: u64,
}

impl PlanHeader {
    #[must_use]
    pub fn new(resource_count: u64, grant_count: u64, checksum: u64) -> Self {
        Self {
            magic: PLAN_MAGIC,
            version: PLAN_VERSION,
            resource_count,
            grant_count,
            checksum,
        }
    }

    /// Check magic and version.
    pub fn validate(&self) -> Result<(), TransitError> {
        if self.magic != PLAN_MAGIC {
            return Err(TransitError::SerializationError(
                "Invalid file format".to_string(),
            ));
        }
        if self.version != PLAN_VERSION {
            return Err(TransitError::SerializationError(
                "Unsupported file version".to_string(),
            ));
        }
        Ok(())
    }
}

/// Deterministic XOR-rotate checksum of serialized plan bytes.
///
/// Detects accidental corruption only. Use [`plan_hash`] (feature
/// `crypto-hash`) where tampering matters.
#[must_use]
pub fn checksum_bytes(data: &[u8]) -> u64 {
    let mut hash: u64 = data.len() as u64;
    for (i, byte) in data.iter().enumerate() {
        let shift = ((i % 8) * 8) as u32;
        hash ^= (u64::from(*byte) << shift).rotate_left((i % 61) as u32);
        hash = hash.rotate_left(5);
    }
    hash
}

fn plan_bytes(plan: &DeploymentPlan) -> Result<Vec<u8>, TransitError> {
    postcard::to_allocvec(plan)
        .map_err(|e| TransitError::SerializationError(format!("Plan: {}", e)))
}

/// Export a plan to canonical postcard format.
pub fn export_canonical(plan: &DeploymentPlan) -> Result<Vec<u8>, TransitError> {
    let data_bytes = plan_bytes(plan)?;
    let header = PlanHeader::new(
        plan.resources.len() as u64,
        plan.grants.len() as u64,
        checksum_bytes(&data_bytes),
    );

    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| TransitError::SerializationError(format!("Header: {}", e)))?;
    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| TransitError::SerializationError("Header too large".to_string()))?;

    let mut result = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    result.extend_from_slice(&header_len.to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data_bytes);
    Ok(result)
}

/// Import a plan from canonical postcard format.
///
/// Validates magic, version, size limits, checksum and counts.
pub fn import_canonical(data: &[u8]) -> Result<DeploymentPlan, TransitError> {
    let Some((len_bytes, rest)) = data.split_first_chunk::<4>() else {
        return Err(TransitError::SerializationError(
            "Data too short".to_string(),
        ));
    };
    let header_len = u32::from_le_bytes(*len_bytes) as usize;
    if rest.len() < header_len {
        return Err(TransitError::SerializationError(
            "Data too short for header".to_string(),
        ));
    }
    let (header_bytes, data_bytes) = rest.split_at(header_len);

    let header: PlanHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| TransitError::SerializationError(format!("Header: {}", e)))?;
    header.validate()?;

    if header.resource_count > MAX_IMPORT_RESOURCE_COUNT {
        return Err(TransitError::SerializationError(format!(
            "Resource count {} exceeds maximum allowed {}",
            header.resource_count, MAX_IMPORT_RESOURCE_COUNT
        )));
    }
    if header.grant_count > MAX_IMPORT_GRANT_COUNT {
        return Err(TransitError::SerializationError(format!(
            "Grant count {} exceeds maximum allowed {}",
            header.grant_count, MAX_IMPORT_GRANT_COUNT
        )));
    }

    let computed = checksum_bytes(data_bytes);
    if computed != header.checksum {
        return Err(TransitError::SerializationError(format!(
            "Checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }

    let plan: DeploymentPlan = postcard::from_bytes(data_bytes)
        .map_err(|e| TransitError::SerializationError(format!("Plan: {}", e)))?;

    if plan.resources.len() as u64 != header.resource_count {
        return Err(TransitError::SerializationError(
            "Resource count mismatch".to_string(),
        ));
    }
    if plan.grants.len() as u64 != header.grant_count {
        return Err(TransitError::SerializationError(
            "Grant count mismatch".to_string(),
        ));
    }

    Ok(plan)
}

/// True if the canonical bytes decode to exactly this plan.
pub fn verify_canonical(
    plan: &DeploymentPlan,
    canonical_data: &[u8],
) -> Result<bool, TransitError> {
    let imported = import_canonical(canonical_data)?;
    Ok(imported == *plan)
}

/// Checksum of a plan's canonical data section.
pub fn canonical_checksum(plan: &DeploymentPlan) -> Result<u64, TransitError> {
    Ok(checksum_bytes(&plan_bytes(plan)?))
}

/// BLAKE3 hash of the canonical export, as 64 hex characters.
#[cfg(feature = "crypto-hash")]
pub fn plan_hash(plan: &DeploymentPlan) -> Result<String, TransitError> {
    Ok(compute_blake3_hash(&export_canonical(plan)?))
}

/// BLAKE3 hash of raw bytes, as 64 hex characters.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn compute_blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================
