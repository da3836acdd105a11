//! Incremental, de-duplicated option loading for type-ahead pickers.
//!
//! Options accumulate page by page in first-seen order. A new keyword throws
//! them away and starts again from page 0.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::errors::Result;
use crate::logger::activity::ActivityLoggerHandle;
use crate::query::fetcher::{DebouncedFetcher, FetchFn, FetchOutcome};
use crate::query::page::Page;
use crate::query::state::{PageSizePolicy, QueryState};

/// Backend primary keys.
pub type EntityId = i64;

pub trait Identified {
    fn id(&self) -> EntityId;
}

/// One page the picker wants next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub keyword: String,
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    #[must_use]
    pub fn to_query(&self) -> QueryState {
        let mut query = QueryState::new(&PageSizePolicy::fixed(self.size));
        query.set_keyword(&self.keyword);
        query.set_page(self.page);
        query
    }

    #[must_use]
    pub fn from_query(query: &QueryState) -> Self {
        Self {
            keyword: query.keyword().to_string(),
            page: query.page(),
            size: query.page_size(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IncrementalSelection<T> {
    items: Vec<T>,
    ids: HashSet<EntityId>,
    keyword: String,
    page_size: u32,
    /// Last page merged; `None` before the first.
    page: Option<u32>,
    total: u64,
    has_more: bool,
    outstanding: Option<PageRequest>,
    selected: Option<EntityId>,
    last_error: Option<String>,
}

impl<T: Identified + Clone> IncrementalSelection<T> {
    #[must_use]
    pub fn new(page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            ids: HashSet::new(),
            keyword: String::new(),
            page_size: page_size.max(1),
            page: None,
            total: 0,
            has_more: false,
            outstanding: None,
            selected: None,
            last_error: None,
        }
    }

    /// Forget every option and request page 0 for `keyword`.
    pub fn begin_search(&mut self, keyword: &str) -> PageRequest {
        self.keyword = keyword.trim().to_string();
        self.items.clear();
        self.ids.clear();
        self.page = None;
        self.total = 0;
        self.has_more = false;
        self.last_error = None;
        let request = PageRequest {
            keyword: self.keyword.clone(),
            page: 0,
            size: self.page_size,
        };
        self.outstanding = Some(request.clone());
        request
    }

    /// Next page, or `None` when nothing more exists or a load is already running.
    pub fn begin_load_more(&mut self) -> Option<PageRequest> {
        if !self.has_more || self.outstanding.is_some() {
            return None;
        }
        let request = PageRequest {
            keyword: self.keyword.clone(),
            page: self.page.map_or(0, |p| p + 1),
            size: self.page_size,
        };
        self.outstanding = Some(request.clone());
        Some(request)
    }

    /// Merge a page answering the outstanding request. Anything else is ignored
    /// and `false` is returned.
    pub fn apply(&mut self, request: &PageRequest, page: Page<T>) -> bool {
        if self.outstanding.as_ref() != Some(request) {
            return false;
        }
        self.outstanding = None;
        self.last_error = None;
        let arrived = page.content.len();
        for item in page.content {
            if self.ids.insert(item.id()) {
                self.items.push(item);
            }
        }
        self.page = Some(request.page);
        self.total = page.total_elements;
        // An empty page ends paging even if the reported total says otherwise.
        self.has_more = arrived > 0 && self.total > self.items.len() as u64;
        true
    }

    /// Record a failed load. Options already loaded stay; there is no retry.
    pub fn fail(&mut self, request: &PageRequest, message: impl Into<String>) -> bool {
        if self.outstanding.as_ref() != Some(request) {
            return false;
        }
        self.outstanding = None;
        self.last_error = Some(message.into());
        true
    }

    /// Select a loaded option. Unknown ids are refused.
    pub fn select(&mut self, id: EntityId) -> bool {
        if self.ids.contains(&id) {
            self.selected = Some(id);
            true
        } else {
            false
        }
    }

    /// Empty the input: selection cleared, search restarted with no keyword.
    pub fn clear_input(&mut self) -> PageRequest {
        self.selected = None;
        self.begin_search("")
    }

    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    #[must_use]
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    #[must_use]
    pub const fn page(&self) -> Option<u32> {
        self.page
    }

    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.has_more
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.outstanding.is_some()
    }

    #[must_use]
    pub const fn selected(&self) -> Option<EntityId> {
        self.selected
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

/// Picker backed by a remote list: debounced search, immediate load-more.
pub struct RemotePicker<T: Identified + Clone + Send + Sync + 'static> {
    selection: Arc<Mutex<IncrementalSelection<T>>>,
    fetcher: DebouncedFetcher<T>,
}

impl<T: Identified + Clone + Send + Sync + 'static> RemotePicker<T> {
    pub fn new(
        fetch: FetchFn<T>,
        page_size: u32,
        debounce: Duration,
        label: &str,
        activity: Option<ActivityLoggerHandle>,
    ) -> Result<Self> {
        let selection = Arc::new(Mutex::new(IncrementalSelection::new(page_size)));
        let fetcher = DebouncedFetcher::builder(fetch)
            .debounce(debounce)
            .label(label)
            .activity(activity)
            .spawn()?;
        let sink = Arc::clone(&selection);
        fetcher.on_settle(move |query, outcome| {
            let request = PageRequest::from_query(query);
            let mut selection = sink.lock();
            match outcome {
                FetchOutcome::Loaded(page) => {
                    selection.apply(&request, page.clone());
                }
                FetchOutcome::Failed(message) => {
                    selection.fail(&request, message.clone());
                }
            }
        });
        Ok(Self { selection, fetcher })
    }

    /// First load when the picker opens. Not debounced.
    pub fn open(&self) {
        let request = self.selection.lock().begin_search("");
        self.fetcher.fetch_now(request.to_query());
    }

    /// Typing in the input.
    pub fn search(&self, keyword: &str) {
        let request = self.selection.lock().begin_search(keyword);
        self.fetcher.schedule(request.to_query());
    }

    /// Scrolled near the bottom. `false` when there was nothing to load.
    pub fn load_more(&self) -> bool {
        let request = self.selection.lock().begin_load_more();
        match request {
            Some(request) => {
                self.fetcher.fetch_now(request.to_query());
                true
            }
            None => false,
        }
    }

    pub fn select(&self, id: EntityId) -> bool {
        self.selection.lock().select(id)
    }

    pub fn clear_input(&self) {
        let request = self.selection.lock().clear_input();
        self.fetcher.schedule(request.to_query());
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> IncrementalSelection<T> {
        self.selection.lock().clone()
    }

    pub fn wait_settled(&self, timeout: Duration) -> bool {
        self.fetcher.wait_settled(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Opt(EntityId, &'static str);

    impl Identified for Opt {
        fn id(&self) -> EntityId {
            self.0
        }
    }

    fn page_of(ids: &[EntityId], total: u64, number: u32) -> Page<Opt> {
        Page::new(ids.iter().map(|&id| Opt(id, "x")).collect(), total, number, 3)
    }

    #[test]
    fn merge_keeps_first_seen_order_and_dedups() {
        let mut sel = IncrementalSelection::new(3);
        let first = sel.begin_search("ana");
        assert!(sel.apply(&first, page_of(&[1, 2, 3], 7, 0)));
        let second = sel.begin_load_more().unwrap();
        assert_eq!(second.page, 1);
        assert!(sel.apply(&second, page_of(&[3, 4, 5], 7, 1)));

        let ids: Vec<EntityId> = sel.items().iter().map(Identified::id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert!(sel.has_more());
        assert_eq!(sel.page(), Some(1));
    }

    #[test]
    fn load_more_is_noop_when_exhausted_or_busy() {
        let mut sel = IncrementalSelection::new(3);
        let first = sel.begin_search("");
        assert!(sel.begin_load_more().is_none(), "busy with page 0");
        sel.apply(&first, page_of(&[1, 2], 2, 0));
        assert!(!sel.has_more());
        assert!(sel.begin_load_more().is_none());
    }

    #[test]
    fn new_keyword_discards_options_and_stale_pages() {
        let mut sel = IncrementalSelection::new(3);
        let old = sel.begin_search("a");
        let fresh = sel.begin_search("ab");
        assert!(!sel.apply(&old, page_of(&[9], 1, 0)));
        assert!(sel.is_empty());
        assert!(sel.apply(&fresh, page_of(&[4], 1, 0)));
        assert_eq!(sel.keyword(), "ab");
        assert_eq!(sel.len(), 1);
    }

    #[test]
    fn empty_page_stops_paging() {
        let mut sel = IncrementalSelection::new(3);
        let first = sel.begin_search("");
        sel.apply(&first, page_of(&[1, 2, 3], 10, 0));
        let next = sel.begin_load_more().unwrap();
        sel.apply(&next, page_of(&[], 10, 1));
        assert!(!sel.has_more());
    }

    #[test]
    fn failure_keeps_loaded_options() {
        let mut sel = IncrementalSelection::new(3);
        let first = sel.begin_search("");
        sel.apply(&first, page_of(&[1, 2, 3], 9, 0));
        let next = sel.begin_load_more().unwrap();
        assert!(sel.fail(&next, "Unable to reach the server"));
        assert_eq!(sel.len(), 3);
        assert_eq!(sel.last_error(), Some("Unable to reach the server"));
        assert!(!sel.is_loading());
        assert!(sel.begin_load_more().is_some(), "user may scroll again");
    }

    #[test]
    fn selection_and_clear() {
        let mut sel = IncrementalSelection::new(3);
        let first = sel.begin_search("bo");
        sel.apply(&first, page_of(&[5, 6], 2, 0));
        assert!(!sel.select(99));
        assert!(sel.select(6));
        assert_eq!(sel.selected(), Some(6));
        let request = sel.clear_input();
        assert_eq!(request.keyword, "");
        assert_eq!(sel.selected(), None);
        assert!(sel.is_empty());
    }

    #[test]
    fn request_query_round_trip() {
        let request = PageRequest {
            keyword: "lab".to_string(),
            page: 4,
            size: 20,
        };
        assert_eq!(PageRequest::from_query(&request.to_query()), request);
    }

    #[test]
    fn remote_picker_searches_and_pages() {
        let fetch: FetchFn<Opt> = Arc::new(|q: &QueryState| {
            let all: Vec<EntityId> = (1..=7).collect();
            let start = (q.page() * q.page_size()) as usize;
            let ids: Vec<EntityId> = all.iter().skip(start).take(q.page_size() as usize).copied().collect();
            Ok(Page::new(ids.into_iter().map(|id| Opt(id, "u")).collect(), 7, q.page(), q.page_size()))
        });
        let picker = RemotePicker::new(fetch, 3, Duration::from_millis(20), "user-picker", None).unwrap();
        picker.open();
        assert!(picker.wait_settled(Duration::from_secs(5)));
        assert!(picker.load_more());
        assert!(picker.wait_settled(Duration::from_secs(5)));
        assert!(picker.load_more());
        assert!(picker.wait_settled(Duration::from_secs(5)));
        assert!(!picker.load_more());

        let snapshot = picker.snapshot();
        assert_eq!(snapshot.len(), 7);
        assert!(!snapshot.has_more());
        assert!(picker.select(7));
    }

    proptest! {
        #[test]
        fn merged_ids_are_unique(pages in prop::collection::vec(prop::collection::vec(0i64..20, 0..6), 1..10)) {
            let mut sel = IncrementalSelection::new(6);
            let mut request = sel.begin_search("");
            for (n, ids) in pages.iter().enumerate() {
                let page = Page::new(ids.iter().map(|&id| Opt(id, "p")).collect(), 1_000, n as u32, 6);
                sel.apply(&request, page);
                match sel.begin_load_more() {
                    Some(next) => request = next,
                    None => break,
                }
            }
            let ids: Vec<EntityId> = sel.items().iter().map(Identified::id).collect();
            let unique: HashSet<EntityId> = ids.iter().copied().collect();
            prop_assert_eq!(ids.len(), unique.len());
            prop_assert!(sel.len() <= 20);
        }
    }
}
