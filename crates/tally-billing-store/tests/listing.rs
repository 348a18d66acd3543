//! Paged listing over a store that changes between pages.

use std::collections::HashSet;

use chrono::Utc;
use tempfile::TempDir;

use tally_billing_core::{
    AllowanceKind, BillingPeriod, Project, ProjectChargeRecord, ProjectId, UserId,
};
use tally_billing_store::{RecordFilter, RocksStore, Store};

const RECORDS: usize = 19;
const LIMIT: usize = 4;

fn seeded() -> (TempDir, RocksStore, BillingPeriod, Vec<ProjectId>) {
    let temp_dir = TempDir::new().unwrap();
    let store = RocksStore::open(temp_dir.path()).unwrap();
    let period = BillingPeriod::month(2020, 8).unwrap();

    let records: Vec<_> = (0..RECORDS)
        .map(|i| {
            let project = Project {
                id: ProjectId::generate(),
                owner_id: UserId::generate(),
                created_at: period.start(),
            };
            ProjectChargeRecord::new(&project, period, i as u64, 0.0, 0.0, Utc::now())
        })
        .collect();
    assert_eq!(store.insert_charge_records(&records).unwrap(), RECORDS);

    let ids = records.iter().map(|r| r.project_id).collect();
    (temp_dir, store, period, ids)
}

#[test]
fn scanning_a_stable_set_visits_each_record_once() {
    let (_temp_dir, store, period, ids) = seeded();

    let mut seen = Vec::new();
    let mut offset = 0;
    let mut pages = 0;
    loop {
        let page = store
            .list_charge_records(&RecordFilter::all(period), offset, LIMIT)
            .unwrap();
        pages += 1;
        seen.extend(page.items.iter().map(|r| r.project_id));
        if !page.has_more {
            break;
        }
        offset = page.next_offset;
    }

    assert_eq!(pages, RECORDS.div_ceil(LIMIT));
    assert_eq!(seen.len(), RECORDS);
    let unique: HashSet<_> = seen.into_iter().collect();
    assert_eq!(unique, ids.into_iter().collect());
}

#[test]
fn draining_unapplied_records_posts_each_once() {
    let (_temp_dir, store, period, ids) = seeded();

    let mut posted = 0;
    loop {
        let page = store
            .list_charge_records(&RecordFilter::unapplied(period), 0, LIMIT)
            .unwrap();
        if page.is_empty() {
            break;
        }
        assert!(page.len() <= LIMIT);
        let batch: Vec<_> = page.items.iter().map(|r| r.project_id).collect();
        posted += store.post_charge_records(&period, &batch).unwrap();
    }

    assert_eq!(posted, RECORDS);
    for id in &ids {
        let record = store.get_charge_record(id, &period).unwrap().unwrap();
        assert!(record.is_applied());
    }

    let page = store
        .list_charge_records(&RecordFilter::applied(period), 0, RECORDS + 1)
        .unwrap();
    assert_eq!(page.len(), RECORDS);
    assert!(!page.has_more);
}

#[test]
fn empty_listings_have_no_next_page() {
    let temp_dir = TempDir::new().unwrap();
    let store = RocksStore::open(temp_dir.path()).unwrap();

    let page = store.list_allowances(AllowanceKind::Credit, 0, LIMIT).unwrap();
    assert!(page.is_empty());
    assert!(!page.has_more);
}
