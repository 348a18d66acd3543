//! Common test utilities for reconciliation integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use tally_billing_core::{
    BillingPeriod, EgressSettlement, Invoice, OccupancySample, Page, Project, ProjectId, UserId,
};
use tally_billing_reconcile::{
    CancelSignal, FixedClock, InvoiceSink, MeteringError, MeteringSource, ProviderError,
    ProviderInvoiceId, Reconciler, ReconcilerConfig, WelcomePolicy,
};
use tally_billing_store::{RocksStore, Store};

pub const GIB: u64 = 1 << 30;
pub const TIB: u64 = 1 << 40;

/// The period every test reconciles.
pub fn period() -> BillingPeriod {
    BillingPeriod::month(2020, 8).unwrap()
}

/// A clock reading well after the period closed.
pub fn after_period() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 9, 15, 0, 0, 0).unwrap()
}

/// Metering source backed by in-memory vectors.
#[derive(Default)]
pub struct FakeMetering {
    projects: Mutex<Vec<Project>>,
    egress: Mutex<HashMap<ProjectId, Vec<EgressSettlement>>>,
    samples: Mutex<HashMap<ProjectId, Vec<OccupancySample>>>,
    list_calls: AtomicUsize,
    cancel_after: Mutex<Option<(usize, CancelSignal)>>,
}

impl FakeMetering {
    /// Register a project owned by `owner`.
    pub fn add_project(&self, owner: UserId) -> Project {
        let project = Project {
            id: ProjectId::generate(),
            owner_id: owner,
            created_at: period().start(),
        };
        self.projects.lock().unwrap().push(project.clone());
        project
    }

    /// Record settled egress.
    pub fn add_egress(&self, project_id: ProjectId, bytes: u64, settled_at: DateTime<Utc>) {
        self.egress
            .lock()
            .unwrap()
            .entry(project_id)
            .or_default()
            .push(EgressSettlement {
                project_id,
                bytes,
                settled_at,
            });
    }

    /// Record an occupancy sample.
    pub fn add_sample(
        &self,
        project_id: ProjectId,
        bytes: u64,
        object_count: u64,
        timestamp: DateTime<Utc>,
    ) {
        self.samples
            .lock()
            .unwrap()
            .entry(project_id)
            .or_default()
            .push(OccupancySample {
                project_id,
                bytes,
                object_count,
                timestamp,
            });
    }

    /// Set `signal` once `pages` project pages have been listed.
    pub fn cancel_after_pages(&self, pages: usize, signal: CancelSignal) {
        *self.cancel_after.lock().unwrap() = Some((pages, signal));
    }
}

#[async_trait]
impl MeteringSource for FakeMetering {
    async fn list_projects(
        &self,
        _period: &BillingPeriod,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Project>, MeteringError> {
        let calls = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((pages, signal)) = self.cancel_after.lock().unwrap().as_ref() {
            if calls >= *pages {
                signal.cancel();
            }
        }

        let items = self
            .projects
            .lock()
            .unwrap()
            .iter()
            .skip(offset)
            .take(limit + 1)
            .cloned()
            .collect();
        Ok(Page::from_overfetch(items, offset, limit))
    }

    async fn egress_settlements(
        &self,
        project_id: &ProjectId,
        _period: &BillingPeriod,
    ) -> Result<Vec<EgressSettlement>, MeteringError> {
        Ok(self
            .egress
            .lock()
            .unwrap()
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn occupancy_samples(
        &self,
        project_id: &ProjectId,
        _period: &BillingPeriod,
    ) -> Result<Vec<OccupancySample>, MeteringError> {
        Ok(self
            .samples
            .lock()
            .unwrap()
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Invoice sink that records submissions and deduplicates on the idempotency key.
#[derive(Default)]
pub struct RecordingSink {
    accepted: Mutex<HashMap<String, (ProviderInvoiceId, Invoice)>>,
    calls: AtomicUsize,
    rejecting: Mutex<HashSet<UserId>>,
    flaky: Mutex<HashMap<UserId, u32>>,
}

impl RecordingSink {
    /// Reject every submission for `user_id`.
    pub fn reject(&self, user_id: UserId) {
        self.rejecting.lock().unwrap().insert(user_id);
    }

    /// Accept submissions for `user_id` again.
    pub fn accept(&self, user_id: &UserId) {
        self.rejecting.lock().unwrap().remove(user_id);
    }

    /// Fail the next `times` submissions for `user_id` as unavailable.
    pub fn fail_transiently(&self, user_id: UserId, times: u32) {
        self.flaky.lock().unwrap().insert(user_id, times);
    }

    /// Accepted invoices.
    pub fn invoices(&self) -> Vec<Invoice> {
        self.accepted
            .lock()
            .unwrap()
            .values()
            .map(|(_, invoice)| invoice.clone())
            .collect()
    }

    /// The accepted invoice of a user, if any.
    pub fn invoice_for(&self, user_id: &UserId) -> Option<Invoice> {
        self.invoices().into_iter().find(|i| i.user_id == *user_id)
    }

    /// Total submit calls, including failures.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InvoiceSink for RecordingSink {
    async fn submit(
        &self,
        invoice: &Invoice,
        idempotency_key: &str,
    ) -> Result<ProviderInvoiceId, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.rejecting.lock().unwrap().contains(&invoice.user_id) {
            return Err(ProviderError::Rejected("card declined".into()));
        }
        if let Some(left) = self.flaky.lock().unwrap().get_mut(&invoice.user_id) {
            if *left > 0 {
                *left -= 1;
                return Err(ProviderError::Unavailable("timeout".into()));
            }
        }

        let mut accepted = self.accepted.lock().unwrap();
        let next = accepted.len() + 1;
        let (id, _) = accepted
            .entry(idempotency_key.to_string())
            .or_insert_with(|| (ProviderInvoiceId(format!("in_{next}")), invoice.clone()));
        Ok(id.clone())
    }
}

/// Test harness containing everything needed for pipeline tests.
pub struct Harness {
    /// The store under test.
    pub store: Arc<RocksStore>,
    /// Fake metering data.
    pub metering: Arc<FakeMetering>,
    /// Recording invoice sink.
    pub sink: Arc<RecordingSink>,
    /// The reconciler's clock.
    pub clock: Arc<FixedClock>,
    policy: Arc<dyn WelcomePolicy>,
    config: ReconcilerConfig,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
}

impl Harness {
    /// Create a harness with a fresh database.
    pub fn new(listing_limit: usize, policy: Arc<dyn WelcomePolicy>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");

        let mut config = ReconcilerConfig::default();
        config.listing_limit = listing_limit;
        config.invoicing.backoff = Duration::from_millis(1);
        config.data_dir = temp_dir.path().to_string_lossy().to_string();

        Self {
            store: Arc::new(store),
            metering: Arc::new(FakeMetering::default()),
            sink: Arc::new(RecordingSink::default()),
            clock: Arc::new(FixedClock::new(after_period())),
            policy,
            config,
            _temp_dir: temp_dir,
        }
    }

    /// A reconciler over the harness's collaborators.
    pub fn reconciler(&self) -> Reconciler {
        let store: Arc<dyn Store> = self.store.clone();
        Reconciler::new(
            store,
            self.metering.clone(),
            self.sink.clone(),
            self.clock.clone(),
            Arc::clone(&self.policy),
            self.config.clone(),
        )
    }

    /// Assert `remaining + usage == original` for every allowance of `users`.
    pub fn assert_conserved(&self, users: &[UserId]) {
        use tally_billing_core::AllowanceKind;

        for user in users {
            for kind in [AllowanceKind::Coupon, AllowanceKind::Credit] {
                for allowance in self.store.list_user_allowances(user, kind).unwrap() {
                    let used = self
                        .store
                        .get_allowance_usage(&allowance.id, &period())
                        .unwrap()
                        .map_or(0, |u| u.amount_cents);
                    assert_eq!(
                        allowance.remaining_cents + used,
                        allowance.original_cents,
                        "allowance {} is not conserved",
                        allowance.id
                    );
                }
            }
        }
    }
}

/// An instant `hours` after the period started.
pub fn at_hour(hours: i64) -> DateTime<Utc> {
    period().start() + chrono::Duration::hours(hours)
}
