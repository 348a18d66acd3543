//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use tally_billing_core::{
    Allowance, AllowanceId, AllowanceKind, AllowanceStatus, AllowanceUsage, BillingPeriod,
    CouponType, Page, ProjectChargeRecord, ProjectId, RecordStatus, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{RecordFilter, Store, UsageFilter};

/// RocksDB-backed storage implementation.
///
/// Reads go straight to the database. Every write that depends on a prior read
/// (existence checks, conditional status updates, balance decrements) holds the
/// store's write lock for the read and the batch write together.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".into()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(cf_name)?;
        let found = self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        Ok(found)
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Visit every entry whose key starts with `prefix`, in key order.
    ///
    /// The visitor returns `false` to stop early.
    fn scan_prefix<F>(&self, cf_name: &str, prefix: &[u8], mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool>,
    {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            if !visit(&key, &value)? {
                break;
            }
        }
        Ok(())
    }

    /// List one page of deserialized values under `prefix` that pass `keep`.
    fn list_page<T, P>(
        &self,
        cf_name: &str,
        prefix: &[u8],
        offset: usize,
        limit: usize,
        keep: P,
    ) -> Result<Page<T>>
    where
        T: serde::de::DeserializeOwned,
        P: Fn(&T) -> bool,
    {
        let mut skipped = 0;
        let mut items = Vec::new();

        self.scan_prefix(cf_name, prefix, |_, value| {
            let item: T = Self::deserialize(value)?;
            if !keep(&item) {
                return Ok(true);
            }
            if skipped < offset {
                skipped += 1;
                return Ok(true);
            }
            items.push(item);
            // One extra item tells us whether another page exists.
            Ok(items.len() <= limit)
        })?;

        Ok(Page::from_overfetch(items, offset, limit))
    }

    fn put_allowance(&self, batch: &mut WriteBatch, allowance: &Allowance) -> Result<()> {
        let cf_allowances = self.cf(cf::ALLOWANCES)?;
        batch.put_cf(
            &cf_allowances,
            keys::allowance_key(&allowance.id),
            Self::serialize(allowance)?,
        );
        Ok(())
    }

    fn put_new_allowance(&self, batch: &mut WriteBatch, allowance: &Allowance) -> Result<()> {
        let cf_by_kind = self.cf(cf::ALLOWANCES_BY_KIND)?;
        let cf_by_user = self.cf(cf::ALLOWANCES_BY_USER)?;
        let kind = allowance.kind();

        self.put_allowance(batch, allowance)?;
        batch.put_cf(&cf_by_kind, keys::kind_allowance_key(kind, &allowance.id), []);
        batch.put_cf(
            &cf_by_user,
            keys::user_allowance_key(&allowance.user_id, kind, &allowance.id),
            [],
        );
        Ok(())
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Charge Records
    // =========================================================================

    fn insert_charge_records(&self, records: &[ProjectChargeRecord]) -> Result<usize> {
        let _guard = self.lock()?;
        let cf_records = self.cf(cf::CHARGE_RECORDS)?;
        let cf_by_user = self.cf(cf::CHARGE_RECORDS_BY_USER)?;

        let mut batch = WriteBatch::default();
        let mut seen = HashSet::new();

        for record in records {
            let key = keys::charge_record_key(&record.period, &record.project_id);
            if seen.contains(&key) || self.exists(cf::CHARGE_RECORDS, &key)? {
                continue;
            }
            if record.status != RecordStatus::Unapplied {
                return Err(StoreError::Integrity(format!(
                    "charge record for project {} must be created unapplied",
                    record.project_id
                )));
            }

            let user_key =
                keys::user_charge_record_key(&record.user_id, &record.period, &record.project_id);
            batch.put_cf(&cf_records, &key, Self::serialize(record)?);
            batch.put_cf(&cf_by_user, &user_key, []);
            seen.insert(key);
        }

        let inserted = seen.len();
        if inserted > 0 {
            self.write(batch)?;
        }
        Ok(inserted)
    }

    fn get_charge_record(
        &self,
        project_id: &ProjectId,
        period: &BillingPeriod,
    ) -> Result<Option<ProjectChargeRecord>> {
        self.get_value(cf::CHARGE_RECORDS, &keys::charge_record_key(period, project_id))
    }

    fn list_charge_records(
        &self,
        filter: &RecordFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Page<ProjectChargeRecord>> {
        let prefix = keys::period_prefix(&filter.period);
        self.list_page(
            cf::CHARGE_RECORDS,
            &prefix,
            offset,
            limit,
            |record: &ProjectChargeRecord| filter.status.map_or(true, |s| record.status == s),
        )
    }

    fn list_user_charge_records(
        &self,
        user_id: &UserId,
        period: &BillingPeriod,
    ) -> Result<Vec<ProjectChargeRecord>> {
        let prefix = keys::user_period_prefix(user_id, period);
        let mut project_ids = Vec::new();

        self.scan_prefix(cf::CHARGE_RECORDS_BY_USER, &prefix, |key, _| {
            let project_id = keys::project_id_from_user_key(key)
                .ok_or_else(|| StoreError::Integrity("malformed charge record index key".into()))?;
            project_ids.push(project_id);
            Ok(true)
        })?;

        let mut records = Vec::with_capacity(project_ids.len());
        for project_id in project_ids {
            let record = self.get_charge_record(&project_id, period)?.ok_or_else(|| {
                StoreError::Integrity(format!(
                    "user index points at missing charge record for project {project_id}"
                ))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn post_charge_records(&self, period: &BillingPeriod, projects: &[ProjectId]) -> Result<usize> {
        let _guard = self.lock()?;
        let cf_records = self.cf(cf::CHARGE_RECORDS)?;

        let mut batch = WriteBatch::default();
        let mut posted = 0;

        for project_id in projects {
            let key = keys::charge_record_key(period, project_id);
            let mut record: ProjectChargeRecord = self
                .get_value(cf::CHARGE_RECORDS, &key)?
                .ok_or_else(|| {
                    StoreError::NotFound(format!("charge record {project_id} for {period}"))
                })?;

            if !record.status.can_transition_to(RecordStatus::Applied) {
                continue;
            }
            record.status = RecordStatus::Applied;
            batch.put_cf(&cf_records, &key, Self::serialize(&record)?);
            posted += 1;
        }

        if posted > 0 {
            self.write(batch)?;
        }
        tracing::debug!(period = %period, posted, "Posted charge records");
        Ok(posted)
    }

    // =========================================================================
    // Allowances
    // =========================================================================

    fn insert_allowance(&self, allowance: &Allowance) -> Result<()> {
        let _guard = self.lock()?;

        if self.exists(cf::ALLOWANCES, &keys::allowance_key(&allowance.id))? {
            return Err(StoreError::AlreadyExists(format!("allowance {}", allowance.id)));
        }

        let mut batch = WriteBatch::default();
        self.put_new_allowance(&mut batch, allowance)?;
        self.write(batch)
    }

    fn grant_signup_coupon(&self, coupon: &Allowance) -> Result<bool> {
        if coupon.coupon_type() != Some(CouponType::Signup) {
            return Err(StoreError::Integrity(format!(
                "allowance {} is not a signup coupon",
                coupon.id
            )));
        }

        let _guard = self.lock()?;
        let marker = keys::signup_grant_key(&coupon.user_id);
        if self.exists(cf::SIGNUP_GRANTS, &marker)? {
            return Ok(false);
        }

        let cf_grants = self.cf(cf::SIGNUP_GRANTS)?;
        let mut batch = WriteBatch::default();
        self.put_new_allowance(&mut batch, coupon)?;
        batch.put_cf(&cf_grants, &marker, coupon.id.to_bytes());
        self.write(batch)?;

        tracing::debug!(user_id = %coupon.user_id, allowance_id = %coupon.id, "Granted signup coupon");
        Ok(true)
    }

    fn get_allowance(&self, allowance_id: &AllowanceId) -> Result<Option<Allowance>> {
        self.get_value(cf::ALLOWANCES, &keys::allowance_key(allowance_id))
    }

    fn list_allowances(
        &self,
        kind: AllowanceKind,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Allowance>> {
        let prefix = [kind.tag()];
        let mut skipped = 0;
        let mut ids = Vec::new();

        self.scan_prefix(cf::ALLOWANCES_BY_KIND, &prefix, |key, _| {
            if skipped < offset {
                skipped += 1;
                return Ok(true);
            }
            let id = keys::trailing_allowance_id(key)
                .ok_or_else(|| StoreError::Integrity("malformed allowance index key".into()))?;
            ids.push(id);
            Ok(ids.len() <= limit)
        })?;

        let mut allowances = Vec::with_capacity(ids.len());
        for id in ids {
            let allowance = self.get_allowance(&id)?.ok_or_else(|| {
                StoreError::Integrity(format!("kind index points at missing allowance {id}"))
            })?;
            allowances.push(allowance);
        }
        Ok(Page::from_overfetch(allowances, offset, limit))
    }

    fn list_user_allowances(
        &self,
        user_id: &UserId,
        kind: AllowanceKind,
    ) -> Result<Vec<Allowance>> {
        let prefix = keys::user_kind_prefix(user_id, kind);
        let mut ids = Vec::new();

        self.scan_prefix(cf::ALLOWANCES_BY_USER, &prefix, |key, _| {
            let id = keys::trailing_allowance_id(key)
                .ok_or_else(|| StoreError::Integrity("malformed allowance index key".into()))?;
            ids.push(id);
            Ok(true)
        })?;

        let mut allowances = Vec::with_capacity(ids.len());
        for id in ids {
            let allowance = self.get_allowance(&id)?.ok_or_else(|| {
                StoreError::Integrity(format!("user index points at missing allowance {id}"))
            })?;
            allowances.push(allowance);
        }
        Ok(allowances)
    }

    fn advance_coupons(&self, allowances: &[AllowanceId], period: &BillingPeriod) -> Result<usize> {
        let _guard = self.lock()?;

        let mut batch = WriteBatch::default();
        let mut changed = 0;
        let mut expired = 0;

        for id in allowances {
            let mut allowance = self
                .get_allowance(id)?
                .ok_or_else(|| StoreError::NotFound(format!("allowance {id}")))?;

            if !allowance.advance(*period) {
                continue;
            }
            if allowance.status == AllowanceStatus::Expired {
                expired += 1;
            }
            self.put_allowance(&mut batch, &allowance)?;
            changed += 1;
        }

        if changed > 0 {
            self.write(batch)?;
        }
        Ok(expired)
    }

    // =========================================================================
    // Allowance Usages
    // =========================================================================

    fn record_allowance_usages(&self, usages: &[AllowanceUsage]) -> Result<usize> {
        let _guard = self.lock()?;
        let cf_usages = self.cf(cf::ALLOWANCE_USAGES)?;
        let cf_by_user = self.cf(cf::USAGES_BY_USER)?;

        let mut batch = WriteBatch::default();
        let mut seen = HashSet::new();
        let mut touched: HashMap<AllowanceId, Allowance> = HashMap::new();

        for usage in usages {
            let key = keys::usage_key(&usage.period, &usage.allowance_id);
            if seen.contains(&key) || self.exists(cf::ALLOWANCE_USAGES, &key)? {
                continue;
            }

            let allowance = match touched.entry(usage.allowance_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let loaded = self.get_allowance(&usage.allowance_id)?.ok_or_else(|| {
                        StoreError::NotFound(format!("allowance {}", usage.allowance_id))
                    })?;
                    entry.insert(loaded)
                }
            };

            if allowance.user_id != usage.user_id || allowance.kind() != usage.kind {
                return Err(StoreError::Integrity(format!(
                    "usage of allowance {} does not match its owner or kind",
                    usage.allowance_id
                )));
            }
            if usage.status != RecordStatus::Unapplied {
                return Err(StoreError::Integrity(format!(
                    "usage of allowance {} must be created unapplied",
                    usage.allowance_id
                )));
            }
            if !allowance.is_spendable()
                || usage.amount_cents <= 0
                || usage.amount_cents > allowance.remaining_cents
            {
                return Err(StoreError::AllowanceUnavailable {
                    allowance_id: usage.allowance_id.to_string(),
                    remaining: allowance.remaining_cents,
                    requested: usage.amount_cents,
                });
            }
            allowance
                .consume(usage.amount_cents)
                .map_err(|e| StoreError::Integrity(e.to_string()))?;

            batch.put_cf(&cf_usages, &key, Self::serialize(usage)?);
            batch.put_cf(
                &cf_by_user,
                keys::user_usage_key(&usage.user_id, &usage.period, &usage.allowance_id),
                [],
            );
            seen.insert(key);
        }

        for allowance in touched.values() {
            self.put_allowance(&mut batch, allowance)?;
        }

        let recorded = seen.len();
        if recorded > 0 {
            self.write(batch)?;
        }
        Ok(recorded)
    }

    fn get_allowance_usage(
        &self,
        allowance_id: &AllowanceId,
        period: &BillingPeriod,
    ) -> Result<Option<AllowanceUsage>> {
        self.get_value(cf::ALLOWANCE_USAGES, &keys::usage_key(period, allowance_id))
    }

    fn list_allowance_usages(
        &self,
        filter: &UsageFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Page<AllowanceUsage>> {
        let prefix = keys::period_prefix(&filter.period);
        self.list_page(
            cf::ALLOWANCE_USAGES,
            &prefix,
            offset,
            limit,
            |usage: &AllowanceUsage| {
                filter.kind.map_or(true, |k| usage.kind == k)
                    && filter.status.map_or(true, |s| usage.status == s)
            },
        )
    }

    fn list_user_allowance_usages(
        &self,
        user_id: &UserId,
        period: &BillingPeriod,
    ) -> Result<Vec<AllowanceUsage>> {
        let prefix = keys::user_period_prefix(user_id, period);
        let mut ids = Vec::new();

        self.scan_prefix(cf::USAGES_BY_USER, &prefix, |key, _| {
            let id = keys::trailing_allowance_id(key)
                .ok_or_else(|| StoreError::Integrity("malformed usage index key".into()))?;
            ids.push(id);
            Ok(true)
        })?;

        let mut usages = Vec::with_capacity(ids.len());
        for id in ids {
            let usage = self.get_allowance_usage(&id, period)?.ok_or_else(|| {
                StoreError::Integrity(format!("user index points at missing usage of {id}"))
            })?;
            usages.push(usage);
        }
        Ok(usages)
    }

    fn post_allowance_usages(
        &self,
        period: &BillingPeriod,
        allowances: &[AllowanceId],
    ) -> Result<usize> {
        let _guard = self.lock()?;
        let cf_usages = self.cf(cf::ALLOWANCE_USAGES)?;

        let mut batch = WriteBatch::default();
        let mut posted = 0;

        for allowance_id in allowances {
            let key = keys::usage_key(period, allowance_id);
            let mut usage: AllowanceUsage = self
                .get_value(cf::ALLOWANCE_USAGES, &key)?
                .ok_or_else(|| {
                    StoreError::NotFound(format!("usage of {allowance_id} for {period}"))
                })?;

            if !self.exists(cf::ALLOWANCES, &keys::allowance_key(allowance_id))? {
                return Err(StoreError::Integrity(format!(
                    "usage for {period} references missing allowance {allowance_id}"
                )));
            }
            if !usage.status.can_transition_to(RecordStatus::Applied) {
                continue;
            }
            usage.status = RecordStatus::Applied;
            batch.put_cf(&cf_usages, &key, Self::serialize(&usage)?);
            posted += 1;
        }

        if posted > 0 {
            self.write(batch)?;
        }
        tracing::debug!(period = %period, posted, "Posted allowance usages");
        Ok(posted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tally_billing_core::Project;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn period() -> BillingPeriod {
        BillingPeriod::month(2020, 8).unwrap()
    }

    fn record_for(owner: UserId) -> ProjectChargeRecord {
        let project = Project {
            id: ProjectId::generate(),
            owner_id: owner,
            created_at: Utc::now(),
        };
        ProjectChargeRecord::new(&project, period(), 1024, 10.0, 2.0, Utc::now())
    }

    #[test]
    fn charge_records_insert_once() {
        let (store, _dir) = create_test_store();
        let record = record_for(UserId::generate());

        assert_eq!(store.insert_charge_records(&[record.clone(), record.clone()]).unwrap(), 1);
        assert_eq!(store.insert_charge_records(&[record.clone()]).unwrap(), 0);

        let stored = store
            .get_charge_record(&record.project_id, &period())
            .unwrap()
            .unwrap();
        assert_eq!(stored, record);
    }

    #[test]
    fn posting_is_conditional() {
        let (store, _dir) = create_test_store();
        let record = record_for(UserId::generate());
        store.insert_charge_records(&[record.clone()]).unwrap();

        assert_eq!(store.post_charge_records(&period(), &[record.project_id]).unwrap(), 1);
        assert_eq!(store.post_charge_records(&period(), &[record.project_id]).unwrap(), 0);

        let missing = store.post_charge_records(&period(), &[ProjectId::generate()]);
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn user_index_lists_only_that_period() {
        let (store, _dir) = create_test_store();
        let user = UserId::generate();
        let mut other_period = record_for(user);
        other_period.period = period().next();

        store
            .insert_charge_records(&[record_for(user), record_for(user), other_period])
            .unwrap();
        store.insert_charge_records(&[record_for(UserId::generate())]).unwrap();

        assert_eq!(store.list_user_charge_records(&user, &period()).unwrap().len(), 2);
        assert_eq!(store.list_user_charge_records(&user, &period().next()).unwrap().len(), 1);
    }

    #[test]
    fn usage_draws_from_allowance_atomically() {
        let (store, _dir) = create_test_store();
        let user = UserId::generate();
        let credit = Allowance::credit(user, 9, "tx-1", Utc::now()).unwrap();
        store.insert_allowance(&credit).unwrap();

        let usage = AllowanceUsage::new(&credit, period(), 9, Utc::now());
        assert_eq!(store.record_allowance_usages(&[usage.clone()]).unwrap(), 1);
        // Same (allowance, period) again is a no-op.
        assert_eq!(store.record_allowance_usages(&[usage]).unwrap(), 0);

        let stored = store.get_allowance(&credit.id).unwrap().unwrap();
        assert_eq!(stored.remaining_cents, 0);
        assert_eq!(stored.status, AllowanceStatus::Used);
    }

    #[test]
    fn overdrawn_usage_writes_nothing() {
        let (store, _dir) = create_test_store();
        let user = UserId::generate();
        let small = Allowance::credit(user, 5, "tx-1", Utc::now()).unwrap();
        let big = Allowance::credit(user, 50, "tx-2", Utc::now()).unwrap();
        store.insert_allowance(&small).unwrap();
        store.insert_allowance(&big).unwrap();

        let result = store.record_allowance_usages(&[
            AllowanceUsage::new(&big, period(), 10, Utc::now()),
            AllowanceUsage::new(&small, period(), 6, Utc::now()),
        ]);
        assert!(matches!(result, Err(StoreError::AllowanceUnavailable { remaining: 5, requested: 6, .. })));

        assert!(store.get_allowance_usage(&big.id, &period()).unwrap().is_none());
        assert_eq!(store.get_allowance(&big.id).unwrap().unwrap().remaining_cents, 50);
    }

    #[test]
    fn signup_coupon_granted_once_per_user() {
        let (store, _dir) = create_test_store();
        let user = UserId::generate();
        let first = Allowance::coupon(user, 5500, 2, CouponType::Signup, Utc::now()).unwrap();
        let second = Allowance::coupon(user, 5500, 2, CouponType::Signup, Utc::now()).unwrap();

        assert!(store.grant_signup_coupon(&first).unwrap());
        assert!(!store.grant_signup_coupon(&second).unwrap());
        assert_eq!(
            store.list_user_allowances(&user, AllowanceKind::Coupon).unwrap().len(),
            1
        );
    }

    #[test]
    fn advance_expires_coupons_once() {
        let (store, _dir) = create_test_store();
        let coupon =
            Allowance::coupon(UserId::generate(), 10, 1, CouponType::Promotional, Utc::now())
                .unwrap();
        store.insert_allowance(&coupon).unwrap();

        assert_eq!(store.advance_coupons(&[coupon.id], &period()).unwrap(), 1);
        assert_eq!(store.advance_coupons(&[coupon.id], &period()).unwrap(), 0);

        let stored = store.get_allowance(&coupon.id).unwrap().unwrap();
        assert_eq!(stored.status, AllowanceStatus::Expired);
        assert_eq!(stored.remaining_duration(), Some(0));
    }

    #[test]
    fn list_allowances_pages_by_kind() {
        let (store, _dir) = create_test_store();
        let user = UserId::generate();
        for i in 0..5 {
            let credit = Allowance::credit(user, 10, format!("tx-{i}"), Utc::now()).unwrap();
            store.insert_allowance(&credit).unwrap();
        }
        let coupon =
            Allowance::coupon(user, 10, 2, CouponType::Promotional, Utc::now()).unwrap();
        store.insert_allowance(&coupon).unwrap();

        let first = store.list_allowances(AllowanceKind::Credit, 0, 3).unwrap();
        assert_eq!(first.len(), 3);
        assert!(first.has_more);

        let second = store
            .list_allowances(AllowanceKind::Credit, first.next_offset, 3)
            .unwrap();
        assert_eq!(second.len(), 2);
        assert!(!second.has_more);

        let coupons = store.list_allowances(AllowanceKind::Coupon, 0, 3).unwrap();
        assert_eq!(coupons.items, vec![coupon]);
    }
}
