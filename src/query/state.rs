//! Query state for server-side paginated lists.
//!
//! Any change to keyword, filters, sort or page size sends the list back to the
//! first page; only [`QueryState::set_page`] moves within the current result set.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::config::GridConfig;
use crate::core::errors::{LabError, Result};
use crate::query::sort::{SortPolicy, SortSpec};

/// A single filter value. Numeric ids and enum names both appear in filters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Int(i64),
    Text(String),
}

impl FilterValue {
    /// Integers become `Int`, everything else `Text`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        trimmed
            .parse::<i64>()
            .map_or_else(|_| Self::Text(trimmed.to_string()), Self::Int)
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// Allow-list of page sizes a list view accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSizePolicy {
    allowed: Vec<u32>,
    default: u32,
}

impl PageSizePolicy {
    /// `default` is added to the list if missing.
    #[must_use]
    pub fn new(mut allowed: Vec<u32>, default: u32) -> Self {
        allowed.retain(|size| *size > 0);
        if !allowed.contains(&default) {
            allowed.push(default);
        }
        allowed.sort_unstable();
        allowed.dedup();
        Self { allowed, default }
    }

    /// A single permitted size, as used by pickers and count queries.
    #[must_use]
    pub fn fixed(size: u32) -> Self {
        Self::new(vec![size], size)
    }

    #[must_use]
    pub fn from_config(grid: &GridConfig) -> Self {
        Self::new(grid.page_sizes.clone(), grid.default_page_size)
    }

    #[must_use]
    pub fn allows(&self, size: u32) -> bool {
        self.allowed.contains(&size)
    }

    #[must_use]
    pub fn allowed(&self) -> &[u32] {
        &self.allowed
    }

    #[must_use]
    pub const fn default_size(&self) -> u32 {
        self.default
    }
}

impl Default for PageSizePolicy {
    fn default() -> Self {
        Self::new(vec![5, 10, 20, 50, 100], 10)
    }
}

/// Pagination, keyword, filters and sort driving one list view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryState {
    page: u32,
    page_size: u32,
    keyword: String,
    filters: BTreeMap<String, BTreeSet<FilterValue>>,
    sort: Option<SortSpec>,
}

impl QueryState {
    #[must_use]
    pub fn new(policy: &PageSizePolicy) -> Self {
        Self {
            page: 0,
            page_size: policy.default_size(),
            keyword: String::new(),
            filters: BTreeMap::new(),
            sort: None,
        }
    }

    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    #[must_use]
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    #[must_use]
    pub const fn filters(&self) -> &BTreeMap<String, BTreeSet<FilterValue>> {
        &self.filters
    }

    #[must_use]
    pub fn filter(&self, name: &str) -> Option<&BTreeSet<FilterValue>> {
        self.filters.get(name)
    }

    #[must_use]
    pub const fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    /// Returns `true` when the keyword actually changed.
    pub fn set_keyword(&mut self, keyword: &str) -> bool {
        let keyword = keyword.trim();
        if self.keyword == keyword {
            return false;
        }
        self.keyword = keyword.to_string();
        self.page = 0;
        true
    }

    /// Replace every value of one filter. An empty set removes the filter.
    pub fn set_filter<I>(&mut self, name: &str, values: I) -> bool
    where
        I: IntoIterator<Item = FilterValue>,
    {
        let values: BTreeSet<FilterValue> = values.into_iter().collect();
        let changed = if values.is_empty() {
            self.filters.remove(name).is_some()
        } else if self.filters.get(name) == Some(&values) {
            false
        } else {
            self.filters.insert(name.to_string(), values);
            true
        };
        if changed {
            self.page = 0;
        }
        changed
    }

    /// Add the value if absent, remove it if present.
    pub fn toggle_filter_value(&mut self, name: &str, value: FilterValue) -> bool {
        let set = self.filters.entry(name.to_string()).or_default();
        if !set.remove(&value) {
            set.insert(value);
        }
        if set.is_empty() {
            self.filters.remove(name);
        }
        self.page = 0;
        true
    }

    pub fn clear_filter(&mut self, name: &str) -> bool {
        self.set_filter(name, std::iter::empty())
    }

    pub fn clear_filters(&mut self) -> bool {
        if self.filters.is_empty() {
            return false;
        }
        self.filters.clear();
        self.page = 0;
        true
    }

    pub fn set_sort(&mut self, sort: Option<SortSpec>) -> bool {
        if self.sort == sort {
            return false;
        }
        self.sort = sort;
        self.page = 0;
        true
    }

    /// Move within the current result set. Does not reset anything else.
    pub fn set_page(&mut self, page: u32) {
        self.page = page;
    }

    /// Change the page size; sizes outside `policy` are rejected.
    pub fn set_page_size(&mut self, size: u32, policy: &PageSizePolicy) -> Result<bool> {
        if !policy.allows(size) {
            return Err(LabError::validation(
                "page size",
                format!("{size} is not one of {:?}", policy.allowed()),
            ));
        }
        if self.page_size == size {
            return Ok(false);
        }
        self.page_size = size;
        self.page = 0;
        Ok(true)
    }

    /// Reject filters the endpoint does not understand.
    pub fn check_filters(&self, supported: &[&str]) -> Result<()> {
        match self.filters.keys().find(|name| !supported.contains(&name.as_str())) {
            Some(name) => Err(LabError::validation(
                "filter",
                format!("{name:?} is not supported here; expected one of {supported:?}"),
            )),
            None => Ok(()),
        }
    }

    /// `page, size, keyword, <filters...>, sortBy, sortOrder` query pairs.
    ///
    /// A filter with several values repeats its key once per value. The sort is
    /// always coerced through `sort_policy`.
    #[must_use]
    pub fn to_query_params(&self, sort_policy: &SortPolicy) -> Vec<(String, String)> {
        let mut params = vec![
            ("page".to_string(), self.page.to_string()),
            ("size".to_string(), self.page_size.to_string()),
        ];
        if !self.keyword.is_empty() {
            params.push(("keyword".to_string(), self.keyword.clone()));
        }
        for (name, values) in &self.filters {
            for value in values {
                params.push((name.clone(), value.to_string()));
            }
        }
        let sort = sort_policy.coerce(self.sort.as_ref());
        params.push(("sortBy".to_string(), sort.field));
        params.push(("sortOrder".to_string(), sort.direction.as_str().to_string()));
        params
    }
}

impl Default for QueryState {
    fn default() -> Self {
        Self::new(&PageSizePolicy::default())
    }
}
