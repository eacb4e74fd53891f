//! Page requests and the response-shape normalizer.
//!
//! List endpoints answer either with a paginated envelope
//! (`{"results": [...], "count": n}`) or with the whole collection as a bare
//! array. [`RawListResponse`] names both shapes, and [`normalize`] turns either
//! one into a [`PageResult`] for the requested page.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }

    /// Applies this order to an ascending comparison.
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub key: String,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new(key: impl Into<String>, order: SortOrder) -> Self {
        Self {
            key: key.into(),
            order,
        }
    }
}

/// Snapshot of what a list view wants to fetch. Rebuilt on every parameter change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
    pub filters: BTreeMap<String, Option<String>>,
    pub sort: Option<SortSpec>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

impl PageRequest {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
            filters: BTreeMap::new(),
            sort: None,
        }
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.filters.insert(key.into(), value);
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    /// A filter counts as set only when it holds a non-blank value.
    pub fn filter(&self, key: &str) -> Option<&str> {
        self.filters
            .get(key)
            .and_then(|value| value.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Query parameters in the backend's naming: `page`, `page_size`, every set
    /// filter, then `sort` and `order`.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("page_size".to_string(), self.page_size.to_string()),
        ];
        for key in self.filters.keys() {
            if let Some(value) = self.filter(key) {
                pairs.push((key.clone(), value.to_string()));
            }
        }
        if let Some(sort) = &self.sort {
            pairs.push(("sort".to_string(), sort.key.clone()));
            pairs.push(("order".to_string(), sort.order.as_str().to_string()));
        }
        pairs
    }
}

/// The two shapes a list endpoint may answer with, plus everything else.
#[derive(Debug, Clone, PartialEq)]
pub enum RawListResponse<T> {
    Envelope { results: Vec<T>, count: usize },
    Flat(Vec<T>),
    Malformed(String),
}

impl<T: DeserializeOwned> RawListResponse<T> {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) if map.contains_key("results") && map.contains_key("count") => {
                let count = match map.get("count").and_then(Value::as_u64) {
                    Some(count) => count as usize,
                    None => {
                        return RawListResponse::Malformed(
                            "envelope count is not a non-negative integer".to_string(),
                        );
                    }
                };
                let results = map.remove("results").unwrap_or(Value::Null);
                if !results.is_array() {
                    return RawListResponse::Malformed("envelope results is not an array".to_string());
                }
                match serde_json::from_value::<Vec<T>>(results) {
                    Ok(results) => RawListResponse::Envelope { results, count },
                    Err(e) => RawListResponse::Malformed(format!("envelope item: {}", e)),
                }
            }
            Value::Array(_) => match serde_json::from_value::<Vec<T>>(value) {
                Ok(items) => RawListResponse::Flat(items),
                Err(e) => RawListResponse::Malformed(format!("list item: {}", e)),
            },
            Value::Null => RawListResponse::Malformed("empty body".to_string()),
            Value::Object(_) => {
                RawListResponse::Malformed("object without results/count".to_string())
            }
            other => RawListResponse::Malformed(format!("unexpected JSON value: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total_count: usize,
}

impl<T> PageResult<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
        }
    }
}

/// Client-side filtering and ordering, applied only when the backend returned
/// the full collection. Envelope responses are taken as already filtered.
pub trait LocalQuery {
    fn matches(&self, _request: &PageRequest) -> bool {
        true
    }

    fn compare(&self, _other: &Self, _sort: Option<&SortSpec>) -> Ordering {
        Ordering::Equal
    }
}

/// `max(1, ceil(total_items / page_size))`.
pub fn total_pages(total_items: usize, page_size: usize) -> usize {
    total_items.div_ceil(page_size.max(1)).max(1)
}

/// Pure normalization of either response shape into one page.
pub fn normalize<T>(raw: RawListResponse<T>, page: usize, page_size: usize) -> PageResult<T> {
    match raw {
        RawListResponse::Envelope { results, count } => PageResult {
            items: results,
            total_count: count,
        },
        RawListResponse::Flat(all) => slice_page(all, page, page_size),
        RawListResponse::Malformed(_) => PageResult::empty(),
    }
}

/// Like [`normalize`], but a flat collection is first filtered and sorted
/// according to `request` so that paging happens over the visible set.
pub fn normalize_request<T: LocalQuery>(raw: RawListResponse<T>, request: &PageRequest) -> PageResult<T> {
    match raw {
        RawListResponse::Flat(all) => {
            let mut visible: Vec<T> = all.into_iter().filter(|item| item.matches(request)).collect();
            visible.sort_by(|a, b| a.compare(b, request.sort.as_ref()));
            slice_page(visible, request.page, request.page_size)
        }
        other => normalize(other, request.page, request.page_size),
    }
}

fn slice_page<T>(all: Vec<T>, page: usize, page_size: usize) -> PageResult<T> {
    let total_count = all.len();
    let start = page.saturating_sub(1).saturating_mul(page_size);
    let items = if start >= total_count {
        Vec::new()
    } else {
        all.into_iter().skip(start).take(page_size).collect()
    };
    PageResult { items, total_count }
}
