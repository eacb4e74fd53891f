//! Paging state and fetch lifecycle for one list view.
//!
//! The controller never performs I/O on its own. Every operation that needs
//! fresh data returns a [`FetchTicket`]; the caller runs the request through a
//! [`ListSource`] (directly with [`PagedListController::load`], or on an async
//! runtime) and hands the outcome back to [`PagedListController::apply`].
//! Tickets carry a generation number so that a response issued for an older
//! parameter snapshot is dropped instead of overwriting newer state.

use crate::error::DashboardError;
use crate::models::ListItem;
use crate::page_nav::PageNav;
use crate::pagination::{
    DEFAULT_PAGE_SIZE, LocalQuery, PageRequest, RawListResponse, SortOrder, SortSpec,
    normalize_request, total_pages,
};
use itertools::Itertools;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use tracing::{debug, error, warn};

/// Anything that can answer a page request with one of the two list shapes.
pub trait ListSource<T>: Send + Sync {
    fn fetch(
        &self,
        request: &PageRequest,
    ) -> impl Future<Output = Result<RawListResponse<T>, DashboardError>> + Send;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListPhase {
    Idle,
    Loading,
    Ready,
    /// The last fetch failed. Items are empty, as in `Ready` with no data, but
    /// the view can tell "failed to load" apart from "nothing found".
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
    pub generation: u64,
    pub request: PageRequest,
}

#[derive(Debug, Clone)]
pub struct PagedListController<T> {
    page: usize,
    page_size: usize,
    filters: BTreeMap<String, Option<String>>,
    sort: Option<SortSpec>,
    items: Vec<T>,
    total_count: usize,
    phase: ListPhase,
    generation: u64,
}

impl<T> Default for PagedListController<T> {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl<T> PagedListController<T> {
    pub fn new(page_size: usize) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            filters: BTreeMap::new(),
            sort: None,
            items: Vec::new(),
            total_count: 0,
            phase: ListPhase::Idle,
            generation: 0,
        }
    }

    pub fn with_sort(mut self, key: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(SortSpec::new(key, order));
        self
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn total_pages(&self) -> usize {
        total_pages(self.total_count, self.page_size)
    }

    pub fn phase(&self) -> &ListPhase {
        &self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == ListPhase::Loading
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.phase {
            ListPhase::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn filter(&self, key: &str) -> Option<&str> {
        self.filters.get(key).and_then(|v| v.as_deref())
    }

    pub fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    pub fn nav(&self) -> PageNav {
        PageNav::new(self.total_count, self.page_size, self.page)
    }

    /// 1-based position of the `index`-th loaded item in the whole list.
    pub fn row_number(&self, index: usize) -> usize {
        (self.page - 1) * self.page_size + index + 1
    }

    /// The parameter snapshot a fetch issued now would use.
    pub fn request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            page_size: self.page_size,
            filters: self.filters.clone(),
            sort: self.sort.clone(),
        }
    }

    /// Enters `Loading` and issues a ticket for the current parameters.
    pub fn refetch(&mut self) -> FetchTicket {
        self.generation += 1;
        self.phase = ListPhase::Loading;
        debug!(
            generation = self.generation,
            page = self.page,
            page_size = self.page_size,
            "List fetch issued"
        );
        FetchTicket {
            generation: self.generation,
            request: self.request(),
        }
    }

    /// Moves to `page`, clamped into `[1, total_pages]`. No ticket when the
    /// clamped page is the current one.
    pub fn set_page(&mut self, page: usize) -> Option<FetchTicket> {
        let target = page.clamp(1, self.total_pages());
        if target == self.page {
            return None;
        }
        self.page = target;
        Some(self.refetch())
    }

    /// Changes the page size and returns to page 1.
    pub fn set_page_size(&mut self, page_size: usize) -> Option<FetchTicket> {
        if page_size == 0 {
            warn!("Ignoring page size of zero");
            return None;
        }
        self.page_size = page_size;
        self.page = 1;
        Some(self.refetch())
    }

    /// Sets or clears (`None` or blank) a filter and returns to page 1.
    pub fn set_filter(&mut self, key: impl Into<String>, value: Option<String>) -> FetchTicket {
        self.filters.insert(key.into(), value);
        self.page = 1;
        self.refetch()
    }

    pub fn set_sort(&mut self, key: impl Into<String>, order: SortOrder) -> FetchTicket {
        self.sort = Some(SortSpec::new(key, order));
        self.page = 1;
        self.refetch()
    }

    pub fn toggle_sort_order(&mut self) -> FetchTicket {
        let current = self.sort.take().unwrap_or_else(|| SortSpec::new("created_at", SortOrder::Desc));
        self.sort = Some(SortSpec::new(current.key, current.order.toggled()));
        self.page = 1;
        self.refetch()
    }

    /// Distinct values of `key` over the loaded page, in first-seen order.
    pub fn distinct_values<K, F>(&self, key: F) -> Vec<K>
    where
        K: Eq + Hash + Clone,
        F: FnMut(&T) -> K,
    {
        self.items.iter().map(key).unique().collect()
    }
}

impl<T: ListItem + LocalQuery> PagedListController<T> {
    /// Settles a fetch. Returns `false` when the ticket was superseded and the
    /// outcome was dropped.
    pub fn apply<E: fmt::Display>(
        &mut self,
        ticket: &FetchTicket,
        outcome: Result<RawListResponse<T>, E>,
    ) -> bool {
        if ticket.generation != self.generation {
            debug!(
                stale = ticket.generation,
                current = self.generation,
                "Dropping stale list response"
            );
            return false;
        }

        match outcome {
            Ok(raw) => {
                if let RawListResponse::Malformed(reason) = &raw {
                    warn!(reason = %reason, "List response matched neither shape, showing empty page");
                }
                let result = normalize_request(raw, &ticket.request);
                self.items = result.items;
                self.total_count = result.total_count;
                self.phase = ListPhase::Ready;
                debug!(
                    generation = ticket.generation,
                    total_count = self.total_count,
                    shown = self.items.len(),
                    "List page ready"
                );
            }
            Err(e) => {
                error!(error = %e, page = ticket.request.page, "Failed to load list page");
                self.items.clear();
                self.total_count = 0;
                self.phase = ListPhase::Failed(e.to_string());
            }
        }
        true
    }

    /// Fetches `ticket` from `source` and applies the outcome.
    pub async fn load<S: ListSource<T>>(&mut self, ticket: FetchTicket, source: &S) -> bool {
        let outcome = source.fetch(&ticket.request).await;
        self.apply(&ticket, outcome)
    }

    /// Convenience for callers that own the controller for the whole request.
    pub async fn refresh<S: ListSource<T>>(&mut self, source: &S) -> bool {
        let ticket = self.refetch();
        self.load(ticket, source).await
    }

    /// Reflects a delete that already succeeded on the server. Returns a ticket
    /// when the current page became empty and the view stepped back a page.
    pub fn reconcile_after_delete(&mut self, removed_id: u64) -> Option<FetchTicket> {
        self.items.retain(|item| item.item_id() != removed_id);
        self.total_count = self.total_count.saturating_sub(1);

        if self.items.is_empty() && self.page > 1 {
            self.page -= 1;
            debug!(page = self.page, "Deleted last row on page, stepping back");
            return Some(self.refetch());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LEADERBOARD_SORT_KEY, ModelPerformance};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, serde::Deserialize)]
    struct Row {
        id: u64,
    }

    impl ListItem for Row {
        fn item_id(&self) -> u64 {
            self.id
        }
    }

    impl LocalQuery for Row {}

    fn rows(ids: std::ops::Range<u64>) -> Vec<Row> {
        ids.map(|id| Row { id }).collect()
    }

    /// Serves a fixed collection, either as an envelope sliced server-side or
    /// as the full flat array.
    struct FakeSource {
        all: Vec<Row>,
        paginated: bool,
        fail: bool,
        calls: AtomicUsize,
        seen: Mutex<Vec<PageRequest>>,
    }

    impl FakeSource {
        fn new(all: Vec<Row>, paginated: bool) -> Self {
            Self {
                all,
                paginated,
                fail: false,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ListSource<Row> for FakeSource {
        async fn fetch(&self, request: &PageRequest) -> Result<RawListResponse<Row>, DashboardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(DashboardError::Http {
                    status: 502,
                    url: "http://test/list".to_string(),
                });
            }
            if self.paginated {
                let start = (request.page - 1) * request.page_size;
                let results = self
                    .all
                    .iter()
                    .skip(start)
                    .take(request.page_size)
                    .cloned()
                    .collect();
                Ok(RawListResponse::Envelope {
                    results,
                    count: self.all.len(),
                })
            } else {
                Ok(RawListResponse::Flat(self.all.clone()))
            }
        }
    }

    #[tokio::test]
    async fn test_initial_refresh_fills_first_page() {
        let source = FakeSource::new(rows(0..25), false);
        let mut list = PagedListController::<Row>::default();
        assert_eq!(list.phase(), &ListPhase::Idle);

        assert!(list.refresh(&source).await);
        assert_eq!(list.phase(), &ListPhase::Ready);
        assert_eq!(list.page(), 1);
        assert_eq!(list.page_size(), 10);
        assert_eq!(list.items(), rows(0..10).as_slice());
        assert_eq!(list.total_count(), 25);
        assert_eq!(list.total_pages(), 3);
    }

    #[tokio::test]
    async fn test_set_page_same_value_is_noop() {
        let source = FakeSource::new(rows(0..25), true);
        let mut list = PagedListController::<Row>::default();
        list.refresh(&source).await;
        assert_eq!(source.calls(), 1);

        assert!(list.set_page(1).is_none());
        assert!(!list.is_loading());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_set_page_clamps() {
        let source = FakeSource::new(rows(0..25), true);
        let mut list = PagedListController::<Row>::default();
        list.refresh(&source).await;

        let ticket = list.set_page(3 + 100).expect("page changes");
        assert_eq!(ticket.request.page, 3);
        assert!(list.is_loading());
        list.load(ticket, &source).await;
        assert_eq!(list.items(), rows(20..25).as_slice());

        let ticket = list.set_page(0).expect("page changes");
        assert_eq!(ticket.request.page, 1);
        list.load(ticket, &source).await;
        assert_eq!(list.page(), 1);
    }

    #[tokio::test]
    async fn test_set_page_size_returns_to_first_page() {
        let source = FakeSource::new(rows(0..95), true);
        let mut list = PagedListController::<Row>::default();
        list.refresh(&source).await;
        let ticket = list.set_page(5).unwrap();
        list.load(ticket, &source).await;
        assert_eq!(list.page(), 5);

        let ticket = list.set_page_size(20).unwrap();
        assert_eq!(ticket.request.page, 1);
        assert_eq!(ticket.request.page_size, 20);
        list.load(ticket, &source).await;
        assert_eq!(list.items().len(), 20);
        assert_eq!(list.total_pages(), 5);

        assert!(list.set_page_size(0).is_none());
        assert_eq!(list.page_size(), 20);
    }

    #[tokio::test]
    async fn test_filter_change_resets_page_and_is_sent() {
        let source = FakeSource::new(rows(0..95), true);
        let mut list = PagedListController::<Row>::default().with_sort("created_at", SortOrder::Desc);
        list.refresh(&source).await;
        let ticket = list.set_page(4).unwrap();
        list.load(ticket, &source).await;

        let ticket = list.set_filter("q", Some("resnet".to_string()));
        assert_eq!(ticket.request.page, 1);
        list.load(ticket, &source).await;

        let ticket = list.toggle_sort_order();
        assert_eq!(ticket.request.sort, Some(SortSpec::new("created_at", SortOrder::Asc)));
        list.load(ticket, &source).await;

        let seen = source.seen.lock().unwrap();
        let last = seen.last().unwrap();
        assert_eq!(last.filter("q"), Some("resnet"));
        assert_eq!(last.page, 1);
    }

    #[tokio::test]
    async fn test_delete_last_row_steps_back_and_refetches() {
        let source = FakeSource::new(rows(0..21), true);
        let mut list = PagedListController::<Row>::default();
        list.refresh(&source).await;
        let ticket = list.set_page(3).unwrap();
        list.load(ticket, &source).await;
        assert_eq!(list.items(), &[Row { id: 20 }]);
        let calls_before = source.calls();

        let ticket = list
            .reconcile_after_delete(20)
            .expect("empty non-first page triggers refetch");
        assert_eq!(list.page(), 2);
        assert_eq!(list.total_count(), 20);
        assert_eq!(ticket.request.page, 2);
        assert!(list.is_loading());

        list.load(ticket, &source).await;
        assert_eq!(source.calls(), calls_before + 1);
        assert_eq!(list.items().len(), 10);
    }

    #[tokio::test]
    async fn test_delete_with_rows_left_stays_put() {
        let source = FakeSource::new(rows(0..15), true);
        let mut list = PagedListController::<Row>::default();
        list.refresh(&source).await;

        assert!(list.reconcile_after_delete(3).is_none());
        assert_eq!(list.items().len(), 9);
        assert!(list.items().iter().all(|r| r.id != 3));
        assert_eq!(list.total_count(), 14);
    }

    #[test]
    fn test_delete_on_first_page_never_goes_below_one() {
        let mut list = PagedListController::<Row>::default();
        let ticket = list.refetch();
        list.apply(&ticket, Ok::<_, DashboardError>(RawListResponse::Flat(vec![Row { id: 1 }])));

        assert!(list.reconcile_after_delete(1).is_none());
        assert_eq!(list.page(), 1);
        assert_eq!(list.total_count(), 0);
        assert!(list.reconcile_after_delete(1).is_none());
        assert_eq!(list.total_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_empties_list_and_is_distinguishable() {
        let mut source = FakeSource::new(rows(0..5), false);
        let mut list = PagedListController::<Row>::default();
        list.refresh(&source).await;
        assert_eq!(list.total_count(), 5);

        source.fail = true;
        list.refresh(&source).await;
        assert!(list.items().is_empty());
        assert_eq!(list.total_count(), 0);
        assert!(list.error_message().unwrap().contains("502"));

        source.fail = false;
        list.refresh(&source).await;
        assert_eq!(list.phase(), &ListPhase::Ready);
        assert_eq!(list.error_message(), None);
    }

    #[test]
    fn test_malformed_response_settles_empty_ready() {
        let mut list = PagedListController::<Row>::default();
        let ticket = list.refetch();
        assert!(list.apply(&ticket, Ok::<_, DashboardError>(RawListResponse::Malformed("html".to_string()))));
        assert_eq!(list.phase(), &ListPhase::Ready);
        assert!(list.items().is_empty());
        assert_eq!(list.total_count(), 0);
    }

    #[test]
    fn test_stale_response_is_dropped() {
        let mut list = PagedListController::<Row>::default();
        let first = list.refetch();
        let ticket = list.set_page_size(20).unwrap();

        let dropped = list.apply(&first, Ok::<_, DashboardError>(RawListResponse::Flat(rows(0..3))));
        assert!(!dropped);
        assert!(list.is_loading());
        assert!(list.items().is_empty());

        assert!(list.apply(&ticket, Ok::<_, DashboardError>(RawListResponse::Flat(rows(0..30)))));
        assert_eq!(list.items().len(), 20);
        assert_eq!(list.total_count(), 30);
    }

    #[test]
    fn test_nav_reflects_state() {
        let mut list = PagedListController::<Row>::default();
        let ticket = list.refetch();
        list.apply(&ticket, Ok::<_, DashboardError>(RawListResponse::Envelope { results: rows(0..10), count: 95 }));
        let nav = list.nav();
        assert_eq!(nav.total_pages, 10);
        assert_eq!(nav.current_page, 1);
        assert!(!nav.prev_enabled());
    }

    #[test]
    fn test_distinct_values_keep_first_seen_order() {
        let mut list = PagedListController::<Row>::default();
        let ticket = list.refetch();
        list.apply(&ticket, Ok::<_, DashboardError>(RawListResponse::Flat(rows(0..9))));
        assert_eq!(list.distinct_values(|row| row.id % 3), vec![0, 1, 2]);
    }

    struct LeaderboardSource(Vec<ModelPerformance>);

    impl ListSource<ModelPerformance> for LeaderboardSource {
        async fn fetch(
            &self,
            _request: &PageRequest,
        ) -> Result<RawListResponse<ModelPerformance>, DashboardError> {
            Ok(RawListResponse::Flat(self.0.clone()))
        }
    }

    #[tokio::test]
    async fn test_flat_leaderboard_ranks_across_pages() {
        // Server order is worst first.
        let entries = (1..=20)
            .map(|id| ModelPerformance {
                id,
                accuracy: id as f64 / 100.0,
                ..Default::default()
            })
            .collect();
        let source = LeaderboardSource(entries);
        let mut list =
            PagedListController::<ModelPerformance>::new(10).with_sort(LEADERBOARD_SORT_KEY, SortOrder::Desc);

        list.refresh(&source).await;
        assert_eq!(list.items()[0].id, 20);
        assert_eq!(list.row_number(0), 1);
        let page_one_worst = list.items()[9].accuracy;

        let ticket = list.set_page(2).unwrap();
        list.load(ticket, &source).await;
        assert_eq!(list.items()[0].id, 10);
        assert_eq!(list.row_number(0), 11);
        assert_eq!(list.row_number(9), 20);
        assert!(list.items().iter().all(|entry| entry.accuracy < page_one_worst));
    }
}
