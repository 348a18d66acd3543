//! Key encoding utilities for `RocksDB`.
//!
//! Period keys come first wherever a column family is listed per period, so a
//! period's records form one contiguous, chronologically sorted range.

use tally_billing_core::{AllowanceId, AllowanceKind, BillingPeriod, ProjectId, UserId};

/// Charge record key.
///
/// Format: `period (8 bytes) || project_id (16 bytes)`
#[must_use]
pub fn charge_record_key(period: &BillingPeriod, project_id: &ProjectId) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(&period.key());
    key.extend_from_slice(project_id.as_bytes());
    key
}

/// Prefix of all charge records of a period.
#[must_use]
pub fn period_prefix(period: &BillingPeriod) -> Vec<u8> {
    period.key().to_vec()
}

/// User index key for charge records.
///
/// Format: `user_id (16 bytes) || period (8 bytes) || project_id (16 bytes)`
#[must_use]
pub fn user_charge_record_key(
    user_id: &UserId,
    period: &BillingPeriod,
    project_id: &ProjectId,
) -> Vec<u8> {
    let mut key = user_period_prefix(user_id, period);
    key.extend_from_slice(project_id.as_bytes());
    key
}

/// Prefix of a user's index entries for one period.
#[must_use]
pub fn user_period_prefix(user_id: &UserId, period: &BillingPeriod) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&period.key());
    key
}

/// Extract the project ID from a user charge record index key.
#[must_use]
pub fn project_id_from_user_key(key: &[u8]) -> Option<ProjectId> {
    let bytes: [u8; 16] = key.get(24..40)?.try_into().ok()?;
    Some(ProjectId::from_bytes(bytes))
}

/// Allowance key.
#[must_use]
pub fn allowance_key(allowance_id: &AllowanceId) -> Vec<u8> {
    allowance_id.to_bytes().to_vec()
}

/// Kind index key: `kind (1 byte) || allowance_id (16 bytes)`.
///
/// ULIDs are time-ordered, so a kind's allowances are listed oldest first.
#[must_use]
pub fn kind_allowance_key(kind: AllowanceKind, allowance_id: &AllowanceId) -> Vec<u8> {
    let mut key = Vec::with_capacity(17);
    key.push(kind.tag());
    key.extend_from_slice(&allowance_id.to_bytes());
    key
}

/// User index key for allowances.
///
/// Format: `user_id (16 bytes) || kind (1 byte) || allowance_id (16 bytes)`
#[must_use]
pub fn user_allowance_key(
    user_id: &UserId,
    kind: AllowanceKind,
    allowance_id: &AllowanceId,
) -> Vec<u8> {
    let mut key = user_kind_prefix(user_id, kind);
    key.extend_from_slice(&allowance_id.to_bytes());
    key
}

/// Prefix of a user's allowances of one kind.
#[must_use]
pub fn user_kind_prefix(user_id: &UserId, kind: AllowanceKind) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.extend_from_slice(user_id.as_bytes());
    key.push(kind.tag());
    key
}

/// Extract the trailing allowance ID from an index key.
#[must_use]
pub fn trailing_allowance_id(key: &[u8]) -> Option<AllowanceId> {
    let start = key.len().checked_sub(16)?;
    let bytes: [u8; 16] = key[start..].try_into().ok()?;
    Some(AllowanceId::from_bytes(bytes))
}

/// Allowance usage key.
///
/// Format: `period (8 bytes) || allowance_id (16 bytes)`; one usage per
/// allowance per period by construction.
#[must_use]
pub fn usage_key(period: &BillingPeriod, allowance_id: &AllowanceId) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(&period.key());
    key.extend_from_slice(&allowance_id.to_bytes());
    key
}

/// User index key for usages.
///
/// Format: `user_id (16 bytes) || period (8 bytes) || allowance_id (16 bytes)`
#[must_use]
pub fn user_usage_key(
    user_id: &UserId,
    period: &BillingPeriod,
    allowance_id: &AllowanceId,
) -> Vec<u8> {
    let mut key = user_period_prefix(user_id, period);
    key.extend_from_slice(&allowance_id.to_bytes());
    key
}

/// Signup grant marker key.
#[must_use]
pub fn signup_grant_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}
