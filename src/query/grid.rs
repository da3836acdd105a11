//! Server-side paginated grid: query state, fetcher, and mutation flow for one list view.

use std::sync::Arc;
use std::time::Duration;

use crate::core::errors::Result;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::query::fetcher::{DebouncedFetcher, FetchFn, FetchStatus};
use crate::query::mutation::{MutationKind, RefetchPolicy, RefetchTarget};
use crate::query::page::Page;
use crate::query::sort::{SortCycle, SortPolicy, SortSpec};
use crate::query::state::{FilterValue, PageSizePolicy, QueryState};
use crate::ui::alerts::AlertCenter;
use crate::ui::i18n::{Catalog, MessageKey};

/// A row together with its 1-based position across all pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridRow<T> {
    pub ordinal: u64,
    pub item: T,
}

/// What to draw over the table body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridOverlay {
    None,
    Loading,
    Empty,
    Error(String),
}

pub struct GridOptions {
    pub entity: &'static str,
    pub sort_policy: SortPolicy,
    pub sort_cycle: SortCycle,
    pub page_sizes: PageSizePolicy,
    pub refetch: RefetchPolicy,
    pub debounce: Duration,
    pub catalog: Catalog,
    pub alerts: Arc<AlertCenter>,
    pub activity: Option<ActivityLoggerHandle>,
}

impl GridOptions {
    #[must_use]
    pub fn new(entity: &'static str, sort_policy: SortPolicy) -> Self {
        Self {
            entity,
            sort_policy,
            sort_cycle: SortCycle::default(),
            page_sizes: PageSizePolicy::default(),
            refetch: RefetchPolicy::keep_page(),
            debounce: crate::query::fetcher::DEFAULT_DEBOUNCE,
            catalog: Catalog::default(),
            alerts: Arc::new(AlertCenter::default()),
            activity: None,
        }
    }
}

pub struct GridBinding<T: Clone + Send + Sync + 'static> {
    entity: &'static str,
    query: QueryState,
    sort_policy: SortPolicy,
    sort_cycle: SortCycle,
    page_sizes: PageSizePolicy,
    refetch: RefetchPolicy,
    catalog: Catalog,
    alerts: Arc<AlertCenter>,
    activity: Option<ActivityLoggerHandle>,
    fetcher: DebouncedFetcher<T>,
}

impl<T: Clone + Send + Sync + 'static> GridBinding<T> {
    /// Build the grid. Nothing is fetched until [`GridBinding::load`] or a query change.
    pub fn new(fetch: FetchFn<T>, options: GridOptions) -> Result<Self> {
        let fetcher = DebouncedFetcher::builder(fetch)
            .debounce(options.debounce)
            .label(options.entity)
            .activity(options.activity.clone())
            .spawn()?;
        Ok(Self {
            entity: options.entity,
            query: QueryState::new(&options.page_sizes),
            sort_policy: options.sort_policy,
            sort_cycle: options.sort_cycle,
            page_sizes: options.page_sizes,
            refetch: options.refetch,
            catalog: options.catalog,
            alerts: options.alerts,
            activity: options.activity,
            fetcher,
        })
    }

    #[must_use]
    pub const fn query(&self) -> &QueryState {
        &self.query
    }

    #[must_use]
    pub const fn sort_policy(&self) -> &SortPolicy {
        &self.sort_policy
    }

    #[must_use]
    pub const fn fetcher(&self) -> &DebouncedFetcher<T> {
        &self.fetcher
    }

    #[must_use]
    pub fn alerts(&self) -> &Arc<AlertCenter> {
        &self.alerts
    }

    /// Dispatch the current query immediately.
    pub fn load(&self) {
        self.fetcher.fetch_now(self.query.clone());
    }

    pub fn set_keyword(&mut self, keyword: &str) {
        if self.query.set_keyword(keyword) {
            self.schedule();
        }
    }

    pub fn set_filter<I>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = FilterValue>,
    {
        if self.query.set_filter(name, values) {
            self.schedule();
        }
    }

    pub fn toggle_filter_value(&mut self, name: &str, value: FilterValue) {
        if self.query.toggle_filter_value(name, value) {
            self.schedule();
        }
    }

    pub fn clear_filters(&mut self) {
        if self.query.clear_filters() {
            self.schedule();
        }
    }

    /// Header click on `field`.
    pub fn toggle_sort(&mut self, field: &str) {
        let next = self.sort_cycle.next(self.query.sort(), field);
        if self.query.set_sort(next) {
            self.schedule();
        }
    }

    /// Sort chosen directly rather than by header clicks.
    pub fn set_sort(&mut self, sort: Option<SortSpec>) {
        if self.query.set_sort(sort) {
            self.schedule();
        }
    }

    pub fn set_page_size(&mut self, size: u32) -> Result<()> {
        if self.query.set_page_size(size, &self.page_sizes)? {
            self.schedule();
        }
        Ok(())
    }

    /// Paging is a direct user action: no debounce.
    pub fn set_page(&mut self, page: u32) {
        if self.query.page() != page {
            self.query.set_page(page);
            self.load();
        }
    }

    /// Rows of the last accepted page with their ordinals.
    #[must_use]
    pub fn rows(&self) -> Vec<GridRow<T>> {
        let Some(page) = self.fetcher.cached_page() else {
            return Vec::new();
        };
        let ordinals: Vec<u64> = (0..page.content.len()).map(|i| page.ordinal(i)).collect();
        page.content
            .into_iter()
            .zip(ordinals)
            .map(|(item, ordinal)| GridRow { ordinal, item })
            .collect()
    }

    /// Last accepted page, or an empty one at the current position.
    #[must_use]
    pub fn page(&self) -> Page<T> {
        self.fetcher
            .cached_page()
            .unwrap_or_else(|| Page::empty(self.query.page(), self.query.page_size()))
    }

    /// Server-reported row count across all pages.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.fetcher
            .cached_page()
            .map_or(0, |page| page.total_elements)
    }

    #[must_use]
    pub fn page_count(&self) -> u64 {
        self.total_rows().div_ceil(u64::from(self.query.page_size().max(1)))
    }

    #[must_use]
    pub fn overlay(&self) -> GridOverlay {
        match self.fetcher.status() {
            FetchStatus::Loading => GridOverlay::Loading,
            FetchStatus::Failure(message) => GridOverlay::Error(message),
            FetchStatus::Success(page) if page.is_empty() => GridOverlay::Empty,
            FetchStatus::Success(_) | FetchStatus::Idle => GridOverlay::None,
        }
    }

    /// Localized text for the current overlay, if any.
    #[must_use]
    pub fn overlay_text(&self) -> Option<String> {
        match self.overlay() {
            GridOverlay::None => None,
            GridOverlay::Loading => Some(self.catalog.text(MessageKey::Loading).to_string()),
            GridOverlay::Empty => Some(self.catalog.text(MessageKey::NoRows).to_string()),
            GridOverlay::Error(message) => Some(format!(
                "{}: {message}",
                self.catalog.text(MessageKey::LoadFailed)
            )),
        }
    }

    /// Run a mutation, report it, and refetch on success.
    ///
    /// On failure the error alert is raised, the cached page is left as is, and
    /// the error is returned.
    pub fn mutate<R, F>(&mut self, kind: MutationKind, op: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        match op() {
            Ok(value) => {
                self.alerts
                    .push_success(self.catalog.mutation_succeeded(kind, self.entity));
                self.log(ActivityEvent::MutationSucceeded {
                    resource: self.entity.to_string(),
                    action: kind.as_str().to_string(),
                });
                if self.refetch.target(kind) == RefetchTarget::FirstPage {
                    self.query.set_page(0);
                }
                self.load();
                Ok(value)
            }
            Err(error) => {
                let reason = error.display_message();
                self.alerts
                    .push_error(self.catalog.mutation_failed(kind, self.entity, &reason));
                self.log(ActivityEvent::MutationFailed {
                    resource: self.entity.to_string(),
                    action: kind.as_str().to_string(),
                    error_code: Some(error.code().to_string()),
                    message: reason,
                });
                Err(error)
            }
        }
    }

    /// Block until the latest fetch has been applied. `false` on timeout.
    pub fn wait_settled(&self, timeout: Duration) -> bool {
        self.fetcher.wait_settled(timeout)
    }

    fn schedule(&self) {
        self.fetcher.schedule(self.query.clone());
    }

    fn log(&self, event: ActivityEvent) {
        if let Some(activity) = &self.activity {
            activity.send(event);
        }
    }
}
