//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Charge records, keyed by `period || project_id`.
    pub const CHARGE_RECORDS: &str = "charge_records";

    /// Index: charge records by user, keyed by `user_id || period || project_id`.
    /// Value is empty (index only).
    pub const CHARGE_RECORDS_BY_USER: &str = "charge_records_by_user";

    /// Coupons and credits, keyed by `allowance_id` (ULID).
    pub const ALLOWANCES: &str = "allowances";

    /// Index: allowances by kind, keyed by `kind || allowance_id`.
    pub const ALLOWANCES_BY_KIND: &str = "allowances_by_kind";

    /// Index: allowances by user, keyed by `user_id || kind || allowance_id`.
    pub const ALLOWANCES_BY_USER: &str = "allowances_by_user";

    /// Allowance usages, keyed by `period || allowance_id`.
    pub const ALLOWANCE_USAGES: &str = "allowance_usages";

    /// Index: usages by user, keyed by `user_id || period || allowance_id`.
    pub const USAGES_BY_USER: &str = "usages_by_user";

    /// Signup coupon markers, keyed by `user_id`; value is the coupon ID.
    pub const SIGNUP_GRANTS: &str = "signup_grants";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::CHARGE_RECORDS,
        cf::CHARGE_RECORDS_BY_USER,
        cf::ALLOWANCES,
        cf::ALLOWANCES_BY_KIND,
        cf::ALLOWANCES_BY_USER,
        cf::ALLOWANCE_USAGES,
        cf::USAGES_BY_USER,
        cf::SIGNUP_GRANTS,
    ]
}
