//! Fetch-or-serve-from-cache decisions for a paginated listing.
//!
//! The controller is split into `begin_*` / [`PaginationController::complete`]
//! so the UI can run the network call on a worker thread. Every request
//! carries a [`FetchTicket`]; a response whose ticket belongs to an older
//! query is dropped, and only the newest request for the current query
//! decides what is on screen.

use tracing::{debug, info, warn};

use crate::books_client::PageSource;
use crate::db::CacheStore;
use crate::error::Result;
use crate::models::{BookSummary, PageResponse, SearchResultPage};
use crate::page_cache::PageCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Search,
    PageChange,
}

/// Identifies one outstanding fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    request_id: u64,
    pub kind: RequestKind,
    pub query: String,
    pub offset: usize,
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// Served from cache, nothing to fetch.
    Cached(Vec<BookSummary>),
    Fetch(FetchTicket),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Response cached and now on screen.
    Applied,
    /// Page change answered from cache without a fetch.
    FromCache,
    /// Response cached, but a newer request owns the screen.
    CachedOnly,
    /// Response belonged to a previous query and was dropped.
    Stale,
    /// Fetch failed; the view degrades to an empty page.
    Failed,
}

pub struct PaginationController<S: CacheStore> {
    namespace: &'static str,
    store: S,
    cache: PageCache,
    query: String,
    offset: usize,
    page_size: usize,
    items: Vec<BookSummary>,
    loading: bool,
    last_error: Option<String>,
    // bumped whenever cached offsets stop being valid
    generation: u64,
    next_request: u64,
    latest_request: u64,
}

impl<S: CacheStore> PaginationController<S> {
    pub fn new(namespace: &'static str, store: S, page_size: usize, capacity: usize) -> Self {
        let page_size = page_size.max(1);
        let mut cache = PageCache::new(capacity);
        cache.reset("", page_size);

        Self {
            namespace,
            store,
            cache,
            query: String::new(),
            offset: 0,
            page_size,
            items: Vec::new(),
            loading: false,
            last_error: None,
            generation: 0,
            next_request: 0,
            latest_request: 0,
        }
    }

    /// Build a controller from whatever `store` holds for `namespace`.
    /// Missing or unreadable data yields an empty controller.
    pub fn restore(namespace: &'static str, store: S, page_size: usize, capacity: usize) -> Self {
        let snapshot = store.load(namespace);
        let mut controller = Self::new(namespace, store, page_size, capacity);

        let Some(snapshot) = snapshot else {
            debug!(namespace, "no stored cache");
            return controller;
        };
        if snapshot.page_size == 0 {
            warn!(namespace, "stored cache has no page size, ignoring it");
            return controller;
        }

        controller.query = snapshot.query.clone();
        controller.page_size = snapshot.page_size;
        controller.offset = snapshot.current_offset;
        controller.cache = PageCache::from_snapshot(snapshot, capacity);
        controller.items = controller.cache.get(controller.offset).unwrap_or_default();

        info!(
            namespace,
            query = %controller.query,
            pages = controller.cache.len(),
            "restored page cache"
        );
        controller
    }

    fn issue(&mut self, kind: RequestKind) -> FetchTicket {
        self.next_request += 1;
        self.latest_request = self.next_request;
        FetchTicket {
            generation: self.generation,
            request_id: self.latest_request,
            kind,
            query: self.query.clone(),
            offset: self.offset,
            page_size: self.page_size,
        }
    }

    fn invalidate(&mut self) {
        self.generation += 1;
        self.cache.reset(&self.query, self.page_size);
    }

    fn persist(&self) {
        let snapshot = self.cache.snapshot(self.offset);
        if let Err(e) = self.store.save(self.namespace, &snapshot) {
            warn!(namespace = self.namespace, error = %e, "failed to persist page cache");
        }
    }

    /// Start a search. A different query (or a cache bound to another page
    /// size) drops every cached page before offset 0 is requested.
    pub fn begin_search(&mut self, query: &str) -> FetchTicket {
        if query != self.query || !self.cache.matches(query, self.page_size) {
            debug!(namespace = self.namespace, from = %self.query, to = query, "query changed, clearing cache");
            self.query = query.to_string();
            self.invalidate();
            self.persist();
        }

        self.offset = 0;
        self.items.clear();
        self.loading = true;
        self.last_error = None;
        self.issue(RequestKind::Search)
    }

    /// Move to `offset`. Cached offsets are answered immediately.
    pub fn begin_page_change(&mut self, offset: usize, page_size: usize) -> PageRequest {
        let page_size = page_size.max(1);
        if page_size != self.page_size {
            debug!(namespace = self.namespace, from = self.page_size, to = page_size, "page size changed, clearing cache");
            self.page_size = page_size;
            self.offset = offset;
            self.invalidate();
            self.persist();
        }
        self.offset = offset;

        if let Some(items) = self.cache.get(offset) {
            // claim the screen so an older in-flight page cannot overwrite it
            self.issue(RequestKind::PageChange);
            self.items = items.clone();
            self.loading = false;
            self.last_error = None;
            self.persist();
            return PageRequest::Cached(items);
        }

        self.loading = true;
        self.last_error = None;
        PageRequest::Fetch(self.issue(RequestKind::PageChange))
    }

    /// Apply the outcome of a fetch started by `begin_*`.
    pub fn complete(&mut self, ticket: FetchTicket, result: Result<PageResponse>) -> Completion {
        if ticket.generation != self.generation {
            debug!(
                namespace = self.namespace,
                query = %ticket.query,
                offset = ticket.offset,
                "dropping response for a previous query"
            );
            return Completion::Stale;
        }
        let is_latest = ticket.request_id == self.latest_request;

        match result {
            Ok(page) => {
                self.cache.insert(ticket.offset, page.items.clone());
                self.cache.set_total_count(page.total_count);
                self.persist();

                if !is_latest {
                    return Completion::CachedOnly;
                }
                self.items = page.items;
                self.loading = false;
                self.last_error = None;
                Completion::Applied
            }
            Err(e) => {
                warn!(
                    namespace = self.namespace,
                    query = %ticket.query,
                    offset = ticket.offset,
                    error = %e,
                    "fetch failed"
                );
                if !is_latest {
                    return Completion::Failed;
                }
                if ticket.kind == RequestKind::Search {
                    self.cache.set_total_count(0);
                }
                self.items.clear();
                self.loading = false;
                self.last_error = Some(e.to_string());
                Completion::Failed
            }
        }
    }

    /// Search and wait for the result on the calling thread.
    #[allow(dead_code)]
    pub fn search<P: PageSource + ?Sized>(&mut self, source: &P, query: &str) -> Completion {
        let ticket = self.begin_search(query);
        let result = source.fetch_page(&ticket.query, ticket.offset, ticket.page_size);
        self.complete(ticket, result)
    }

    /// Change page and wait for the result on the calling thread.
    #[allow(dead_code)]
    pub fn change_page<P: PageSource + ?Sized>(
        &mut self,
        source: &P,
        offset: usize,
        page_size: usize,
    ) -> Completion {
        match self.begin_page_change(offset, page_size) {
            PageRequest::Cached(_) => Completion::FromCache,
            PageRequest::Fetch(ticket) => {
                let result = source.fetch_page(&ticket.query, ticket.offset, ticket.page_size);
                self.complete(ticket, result)
            }
        }
    }

    /// Forget everything, including what is stored.
    pub fn clear(&mut self) {
        self.query.clear();
        self.offset = 0;
        self.items.clear();
        self.loading = false;
        self.last_error = None;
        self.invalidate();
        self.persist();
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn items(&self) -> &[BookSummary] {
        &self.items
    }

    pub fn total_count(&self) -> usize {
        self.cache.total_count()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn cached_offsets(&self) -> Vec<usize> {
        self.cache.offsets()
    }

    #[allow(dead_code)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Zero-based index of the visible page.
    pub fn page_index(&self) -> usize {
        self.offset / self.page_size
    }

    pub fn page_count(&self) -> usize {
        self.total_count().div_ceil(self.page_size)
    }

    /// Offset of the last page, or 0 when nothing is known.
    pub fn last_offset(&self) -> usize {
        self.page_count().saturating_sub(1) * self.page_size
    }

    #[allow(dead_code)]
    pub fn current_page(&self) -> SearchResultPage {
        SearchResultPage {
            query: self.query.clone(),
            offset: self.offset,
            page_size: self.page_size,
            items: self.items.clone(),
            total_count: self.total_count(),
        }
    }
}
