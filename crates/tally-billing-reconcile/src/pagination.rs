//! Paged enumeration of listings.
//!
//! Listing operations take `(offset, limit)` and return a `Page`. A `Paginator`
//! drives one stage's loop over such a listing:
//!
//! - **scan** walks a listing whose membership does not change while it is read,
//!   advancing the offset page by page;
//! - **drain** walks a listing that each processed page leaves (the unapplied
//!   set while posting), so it always re-reads offset 0.
//!
//! ```ignore
//! let mut pages = Paginator::drain(Stage::PostCharges, limit, &cancel);
//! while let Some(offset) = pages.next_offset()? {
//!     let page = store.list_charge_records(&filter, offset, pages.limit())?;
//!     let moved = store.post_charge_records(&period, &ids(&page))?;
//!     pages.drained(&page, moved)?;
//! }
//! ```
//!
//! The cancel signal is only consulted before a page is fetched, never while
//! one is being processed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tally_billing_core::Page;

use crate::error::{ReconcileError, Result, Stage};

/// Shared flag asking running stages to stop at the next page boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancelSignal {
    /// Create an unset signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask running stages to stop.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Scan,
    Drain,
}

/// Loop driver for one paged listing.
#[derive(Debug)]
pub struct Paginator {
    stage: Stage,
    mode: Mode,
    limit: usize,
    offset: usize,
    pages: usize,
    done: bool,
    cancel: CancelSignal,
}

impl Paginator {
    /// Walk a listing that stays stable while it is read.
    #[must_use]
    pub fn scan(stage: Stage, limit: usize, cancel: &CancelSignal) -> Self {
        Self::new(stage, Mode::Scan, limit, cancel)
    }

    /// Walk a listing that processed items leave.
    #[must_use]
    pub fn drain(stage: Stage, limit: usize, cancel: &CancelSignal) -> Self {
        Self::new(stage, Mode::Drain, limit, cancel)
    }

    fn new(stage: Stage, mode: Mode, limit: usize, cancel: &CancelSignal) -> Self {
        Self {
            stage,
            mode,
            limit,
            offset: 0,
            pages: 0,
            done: false,
            cancel: cancel.clone(),
        }
    }

    /// Page size.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Pages processed so far.
    #[must_use]
    pub const fn pages(&self) -> usize {
        self.pages
    }

    /// Offset of the next page to fetch, or `None` once the listing is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Cancelled` if the cancel signal is set, and a
    /// configuration error for a zero page size.
    pub fn next_offset(&mut self) -> Result<Option<usize>> {
        if self.done {
            return Ok(None);
        }
        if self.limit == 0 {
            return Err(ReconcileError::Configuration(
                "listing limit must be positive".into(),
            ));
        }
        if self.cancel.is_cancelled() {
            tracing::warn!(stage = %self.stage, pages = self.pages, "Stage cancelled");
            return Err(ReconcileError::Cancelled {
                stage: self.stage,
                pages_completed: self.pages,
            });
        }
        Ok(Some(self.offset))
    }

    /// Record a processed page of a scanned listing.
    pub fn advance<T>(&mut self, page: &Page<T>) {
        self.finish_page(page.len());
        self.offset = page.next_offset;
        self.done = !page.has_more || page.is_empty();
    }

    /// Record a processed page of a drained listing.
    ///
    /// `moved` is the number of items that left the listing.
    ///
    /// # Errors
    ///
    /// Returns an integrity error if a non-empty page moved nothing, since the
    /// next fetch would return the same page again.
    pub fn drained<T>(&mut self, page: &Page<T>, moved: usize) -> Result<()> {
        debug_assert_eq!(self.mode, Mode::Drain);
        if !page.is_empty() && moved == 0 {
            return Err(ReconcileError::integrity(
                self.stage,
                format!("page of {} items made no progress", page.len()),
            ));
        }
        self.finish_page(page.len());
        self.done = !page.has_more || page.is_empty();
        Ok(())
    }

    fn finish_page(&mut self, items: usize) {
        self.pages += 1;
        tracing::debug!(stage = %self.stage, page = self.pages, items, "Processed page");
    }
}
