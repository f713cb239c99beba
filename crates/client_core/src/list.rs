//! Paginated list controller.
//!
//! Holds the page, page size, applied and draft filters, and the last fetched page of a
//! list view. Every change to the fetch key `(page, limit, filters)` issues one fetch;
//! responses carry the sequence number they were issued with and only the latest
//! issued sequence may write `data`/`pagination`.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use shared::protocol::{Filters, ListQuery, ListResult, Pagination};
use tokio::sync::watch;
use tracing::{debug, warn};

pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Source of list pages. Implementations may fail; the controller never retries.
#[async_trait]
pub trait ListFetcher<T, F>: Send + Sync {
    async fn fetch(&self, query: ListQuery<F>) -> Result<ListResult<T>>;
}

/// Adapts an async closure into a [`ListFetcher`].
pub struct FnFetcher<Func>(pub Func);

#[async_trait]
impl<T, F, Func, Fut> ListFetcher<T, F> for FnFetcher<Func>
where
    T: Send + 'static,
    F: Send + 'static,
    Func: Fn(ListQuery<F>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ListResult<T>>> + Send,
{
    async fn fetch(&self, query: ListQuery<F>) -> Result<ListResult<T>> {
        (self.0)(query).await
    }
}

#[derive(Debug, Clone)]
pub struct ListOptions<F = Filters> {
    pub initial_limit: u32,
    pub initial_filters: F,
}

impl<F: Default> Default for ListOptions<F> {
    fn default() -> Self {
        Self {
            initial_limit: DEFAULT_PAGE_LIMIT,
            initial_filters: F::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaginatedListState<T, F = Filters> {
    pub data: Vec<T>,
    pub loading: bool,
    pub page: u32,
    pub limit: u32,
    /// Filters in effect for fetching.
    pub filters: F,
    /// Filters being edited; only `apply_filters` moves them into `filters`.
    pub draft_filters: F,
    pub pagination: Option<Pagination>,
    /// Message of the most recent failed load, cleared by the next successful one.
    pub last_error: Option<String>,
}

impl<T, F: Clone> PaginatedListState<T, F> {
    fn initial(limit: u32, filters: F) -> Self {
        Self {
            data: Vec::new(),
            loading: false,
            page: 1,
            limit,
            filters: filters.clone(),
            draft_filters: filters,
            pagination: None,
            last_error: None,
        }
    }

    pub fn query(&self) -> ListQuery<F> {
        ListQuery {
            page: self.page,
            limit: self.limit,
            filters: self.filters.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The response was written to state.
    Applied,
    /// A newer fetch was issued before this one resolved; the response was dropped.
    Superseded,
    /// The fetch failed; stale data was kept.
    Failed(String),
    /// The fetch key did not change, so nothing was issued.
    Unchanged,
}

struct PendingFetch<F> {
    sequence: u64,
    query: ListQuery<F>,
}

/// Clears `loading` if an in-flight fetch is dropped before it resolves, as long as no
/// newer fetch was issued in the meantime.
struct InFlight<'a, T, F> {
    state: &'a watch::Sender<PaginatedListState<T, F>>,
    issued: &'a AtomicU64,
    sequence: u64,
    resolved: bool,
}

impl<T, F> Drop for InFlight<'_, T, F> {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        let sequence = self.sequence;
        let cleared = self.state.send_if_modified(|state| {
            if self.issued.load(Ordering::SeqCst) != sequence || !state.loading {
                return false;
            }
            state.loading = false;
            true
        });
        if cleared {
            debug!(sequence, "list fetch abandoned; loading cleared");
        }
    }
}

pub struct PaginatedListController<T, F = Filters> {
    fetcher: Arc<dyn ListFetcher<T, F>>,
    initial_filters: F,
    state: watch::Sender<PaginatedListState<T, F>>,
    issued: AtomicU64,
}

impl<T, F> PaginatedListController<T, F>
where
    T: Clone + Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
{
    /// Creates an idle controller on page 1. Nothing is fetched until the first `load`.
    pub fn new(fetcher: Arc<dyn ListFetcher<T, F>>, options: ListOptions<F>) -> Arc<Self> {
        let limit = options.initial_limit.max(1);
        let (state, _) = watch::channel(PaginatedListState::initial(
            limit,
            options.initial_filters.clone(),
        ));
        Arc::new(Self {
            fetcher,
            initial_filters: options.initial_filters,
            state,
            issued: AtomicU64::new(0),
        })
    }

    pub fn state(&self) -> PaginatedListState<T, F> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PaginatedListState<T, F>> {
        self.state.subscribe()
    }

    pub fn initial_filters(&self) -> &F {
        &self.initial_filters
    }

    /// Fetches the page for the current key.
    pub async fn load(&self) -> LoadOutcome {
        match self.issue(|_| true) {
            Some(pending) => self.run(pending).await,
            None => LoadOutcome::Unchanged,
        }
    }

    pub async fn reload(&self) -> LoadOutcome {
        self.load().await
    }

    pub async fn set_page(&self, page: u32) -> LoadOutcome {
        let page = page.max(1);
        let pending = self.issue(|state| {
            if state.page == page {
                return false;
            }
            state.page = page;
            true
        });
        match pending {
            Some(pending) => self.run(pending).await,
            None => LoadOutcome::Unchanged,
        }
    }

    /// Sets the page size and returns to page 1 in the same state replacement.
    pub async fn set_limit(&self, limit: u32) -> LoadOutcome {
        let limit = limit.max(1);
        let pending = self.issue(|state| {
            if state.limit == limit && state.page == 1 {
                return false;
            }
            state.limit = limit;
            state.page = 1;
            true
        });
        match pending {
            Some(pending) => self.run(pending).await,
            None => LoadOutcome::Unchanged,
        }
    }

    /// Edits the draft filters. Never fetches.
    pub fn set_draft_filters(&self, update: impl FnOnce(&mut F)) {
        self.state.send_modify(|state| update(&mut state.draft_filters));
    }

    /// Commits the draft filters and returns to page 1; always issues one fetch.
    pub async fn apply_filters(&self) -> LoadOutcome {
        let pending = self.issue(|state| {
            state.filters = state.draft_filters.clone();
            state.page = 1;
            true
        });
        match pending {
            Some(pending) => self.run(pending).await,
            None => LoadOutcome::Unchanged,
        }
    }

    /// Restores both filter snapshots to the initial filters and returns to page 1.
    pub async fn reset_filters(&self) -> LoadOutcome {
        let initial = self.initial_filters.clone();
        let pending = self.issue(|state| {
            state.filters = initial.clone();
            state.draft_filters = initial;
            state.page = 1;
            true
        });
        match pending {
            Some(pending) => self.run(pending).await,
            None => LoadOutcome::Unchanged,
        }
    }

    /// Applies `mutate` and, when it reports a key change, takes the next sequence number
    /// and marks the list as loading. Both happen under the state lock.
    fn issue(
        &self,
        mutate: impl FnOnce(&mut PaginatedListState<T, F>) -> bool,
    ) -> Option<PendingFetch<F>> {
        let mut pending = None;
        self.state.send_if_modified(|state| {
            if !mutate(state) {
                return false;
            }
            let sequence = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            state.loading = true;
            pending = Some(PendingFetch {
                sequence,
                query: state.query(),
            });
            true
        });
        pending
    }

    async fn run(&self, pending: PendingFetch<F>) -> LoadOutcome {
        let PendingFetch { sequence, query } = pending;
        debug!(
            sequence,
            page = query.page,
            limit = query.limit,
            "list fetch issued"
        );

        let mut in_flight = InFlight {
            state: &self.state,
            issued: &self.issued,
            sequence,
            resolved: false,
        };
        let result = self.fetcher.fetch(query).await;
        in_flight.resolved = true;

        let mut outcome = LoadOutcome::Superseded;
        self.state.send_if_modified(|state| {
            if self.issued.load(Ordering::SeqCst) != sequence {
                return false;
            }
            state.loading = false;
            match result {
                Ok(fetched) => {
                    if !fetched.is_consistent() {
                        warn!(
                            sequence,
                            page = fetched.pagination.page,
                            total_pages = fetched.pagination.total_pages,
                            items = fetched.items.len(),
                            limit = fetched.pagination.limit,
                            "list response violates pagination invariants"
                        );
                    }
                    state.data = fetched.items;
                    state.pagination = Some(fetched.pagination);
                    state.last_error = None;
                    outcome = LoadOutcome::Applied;
                }
                Err(err) => {
                    let message = format!("{err:#}");
                    state.last_error = Some(message.clone());
                    outcome = LoadOutcome::Failed(message);
                }
            }
            true
        });

        match &outcome {
            LoadOutcome::Superseded => debug!(sequence, "list response superseded; dropped"),
            LoadOutcome::Failed(message) => warn!(sequence, error = %message, "list fetch failed"),
            LoadOutcome::Applied | LoadOutcome::Unchanged => {}
        }
        outcome
    }
}

impl<T> PaginatedListController<T, Filters>
where
    T: Clone + Send + Sync + 'static,
{
    /// Merges `partial` into the draft filters. A `null` value removes the filter.
    pub fn merge_draft_filters(&self, partial: Filters) {
        self.set_draft_filters(|draft| {
            for (key, value) in partial {
                if value.is_null() {
                    draft.remove(&key);
                } else {
                    draft.insert(key, value);
                }
            }
        });
    }

    pub fn set_draft_filter(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        self.set_draft_filters(|draft| {
            if value.is_null() {
                draft.remove(&key);
            } else {
                draft.insert(key, value);
            }
        });
    }
}

#[cfg(test)]
#[path = "tests/list_tests.rs"]
mod tests;
