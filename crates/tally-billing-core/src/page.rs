//! Offset-based listing pages.

use serde::{Deserialize, Serialize};

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page, in listing order.
    pub items: Vec<T>,

    /// Offset of the first item of the next page.
    pub next_offset: usize,

    /// Whether more items exist past this page.
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Build a page from up to `limit + 1` fetched items starting at `offset`.
    ///
    /// Listing implementations fetch one extra item to learn whether another
    /// page exists; the extra item is dropped here.
    #[must_use]
    pub fn from_overfetch(mut items: Vec<T>, offset: usize, limit: usize) -> Self {
        let has_more = items.len() > limit;
        items.truncate(limit);
        Self {
            next_offset: offset + items.len(),
            items,
            has_more,
        }
    }

    /// An empty final page.
    #[must_use]
    pub fn empty(offset: usize) -> Self {
        Self {
            items: Vec::new(),
            next_offset: offset,
            has_more: false,
        }
    }

    /// Number of items on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether this page has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overfetch_sets_has_more() {
        let page = Page::from_overfetch(vec![1, 2, 3, 4, 5], 8, 4);
        assert_eq!(page.items, vec![1, 2, 3, 4]);
        assert!(page.has_more);
        assert_eq!(page.next_offset, 12);
    }

    #[test]
    fn short_fetch_is_last_page() {
        let page = Page::from_overfetch(vec![1, 2], 4, 4);
        assert!(!page.has_more);
        assert_eq!(page.next_offset, 6);
        assert_eq!(page.len(), 2);
    }
}
