use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::models::BookSummary;

/// Pages fetched for one query and page size, keyed by start offset.
///
/// Bounded: once more than `capacity` offsets are held, the least recently
/// used one is dropped. Contents are only meaningful for `query` and
/// `page_size`; [`PageCache::reset`] replaces everything at once.
#[derive(Debug, Clone)]
pub struct PageCache {
    query: String,
    page_size: usize,
    total_count: usize,
    pages: HashMap<usize, Vec<BookSummary>>,
    // front = least recently used
    recency: VecDeque<usize>,
    capacity: usize,
}

/// Serializable form written to durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub query: String,
    pub page_size: usize,
    pub total_count: usize,
    /// Ordered least to most recently used.
    pub pages: Vec<CachedPage>,
    /// Offset the user was looking at.
    pub current_offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPage {
    pub offset: usize,
    pub items: Vec<BookSummary>,
}

impl PageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            query: String::new(),
            page_size: 0,
            total_count: 0,
            pages: HashMap::new(),
            recency: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn set_total_count(&mut self, total: usize) {
        self.total_count = total;
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn matches(&self, query: &str, page_size: usize) -> bool {
        self.query == query && self.page_size == page_size
    }

    /// Drop every page and rebind the cache to a new query and page size.
    pub fn reset(&mut self, query: &str, page_size: usize) {
        self.query = query.to_string();
        self.page_size = page_size;
        self.total_count = 0;
        self.pages.clear();
        self.recency.clear();
    }

    /// Look up a page, marking it most recently used.
    pub fn get(&mut self, offset: usize) -> Option<Vec<BookSummary>> {
        let items = self.pages.get(&offset)?.clone();
        self.touch(offset);
        Some(items)
    }

    pub fn insert(&mut self, offset: usize, items: Vec<BookSummary>) {
        self.pages.insert(offset, items);
        self.touch(offset);

        while self.pages.len() > self.capacity {
            let Some(oldest) = self.recency.pop_front() else {
                break;
            };
            self.pages.remove(&oldest);
            tracing::debug!(offset = oldest, "evicted cached page");
        }
    }

    fn touch(&mut self, offset: usize) {
        if let Some(pos) = self.recency.iter().position(|&o| o == offset) {
            self.recency.remove(pos);
        }
        self.recency.push_back(offset);
    }

    /// Cached offsets in ascending order.
    pub fn offsets(&self) -> Vec<usize> {
        let mut offsets: Vec<usize> = self.pages.keys().copied().collect();
        offsets.sort_unstable();
        offsets
    }

    pub fn snapshot(&self, current_offset: usize) -> CacheSnapshot {
        let pages = self
            .recency
            .iter()
            .filter_map(|offset| {
                self.pages.get(offset).map(|items| CachedPage {
                    offset: *offset,
                    items: items.clone(),
                })
            })
            .collect();

        CacheSnapshot {
            query: self.query.clone(),
            page_size: self.page_size,
            total_count: self.total_count,
            pages,
            current_offset,
        }
    }

    /// Rebuild from storage. If the snapshot holds more pages than
    /// `capacity`, the oldest ones are dropped on the way in.
    pub fn from_snapshot(snapshot: CacheSnapshot, capacity: usize) -> Self {
        let mut cache = Self::new(capacity);
        cache.reset(&snapshot.query, snapshot.page_size);
        cache.total_count = snapshot.total_count;
        for page in snapshot.pages {
            cache.insert(page.offset, page.items);
        }
        cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn book(id: &str) -> BookSummary {
        BookSummary {
            id: id.to_string(),
            title: format!("Book {id}"),
            authors: vec![],
            publisher: None,
            published_date: None,
            page_count: None,
            description: None,
            thumbnail_url: None,
            info_link: None,
        }
    }

    #[test]
    fn get_returns_inserted_page() {
        let mut cache = PageCache::new(4);
        cache.reset("dune", 5);
        cache.insert(0, vec![book("a"), book("b")]);

        assert_eq!(cache.get(0), Some(vec![book("a"), book("b")]));
        assert_eq!(cache.get(5), None);
    }

    #[test]
    fn reset_replaces_everything() {
        let mut cache = PageCache::new(4);
        cache.reset("dune", 5);
        cache.insert(0, vec![book("a")]);
        cache.insert(5, vec![book("b")]);
        cache.set_total_count(120);

        cache.reset("foundation", 5);

        assert_eq!(cache.len(), 0);
        assert_eq!(cache.total_count(), 0);
        assert!(cache.matches("foundation", 5));
        assert!(!cache.matches("foundation", 10));
        assert_eq!(cache.get(0), None);
    }

    #[test]
    fn least_recently_used_page_is_evicted() {
        let mut cache = PageCache::new(2);
        cache.reset("q", 5);
        cache.insert(0, vec![book("a")]);
        cache.insert(5, vec![book("b")]);

        // touch 0 so 5 becomes the oldest
        assert!(cache.get(0).is_some());
        cache.insert(10, vec![book("c")]);

        assert_eq!(cache.offsets(), vec![0, 10]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reinserting_an_offset_does_not_grow_the_cache() {
        let mut cache = PageCache::new(2);
        cache.reset("q", 5);
        cache.insert(0, vec![book("a")]);
        cache.insert(0, vec![book("a2")]);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(0), Some(vec![book("a2")]));
    }

    #[test]
    fn snapshot_keeps_recency_order() {
        let mut cache = PageCache::new(8);
        cache.reset("dune", 5);
        cache.set_total_count(42);
        cache.insert(5, vec![book("b")]);
        cache.insert(0, vec![book("a")]);
        cache.get(5);

        let snapshot = cache.snapshot(5);
        let order: Vec<usize> = snapshot.pages.iter().map(|p| p.offset).collect();
        assert_eq!(order, vec![0, 5]);
        assert_eq!(snapshot.current_offset, 5);

        let mut restored = PageCache::from_snapshot(snapshot, 8);
        assert!(restored.matches("dune", 5));
        assert_eq!(restored.total_count(), 42);
        assert_eq!(restored.get(0), Some(vec![book("a")]));
    }

    #[test]
    fn restoring_into_smaller_capacity_keeps_newest() {
        let mut cache = PageCache::new(8);
        cache.reset("q", 5);
        for offset in [0, 5, 10, 15] {
            cache.insert(offset, vec![book(&offset.to_string())]);
        }

        let restored = PageCache::from_snapshot(cache.snapshot(0), 2);
        assert_eq!(restored.offsets(), vec![10, 15]);
    }
}
