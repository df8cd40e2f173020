//! Collection pagination.
//!
//! [`paginate`] slices a collection and builds navigation links that carry
//! `page` and `per_page` query parameters.
//!
//! An empty collection still has a first and a last page (both page 1) but
//! zero `pages`; `prev` and `next` are null.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default items per page.
pub const DEFAULT_PER_PAGE: u64 = 10;

/// Default upper bound on `per_page`.
pub const DEFAULT_MAX_PER_PAGE: u64 = 100;

/// Navigation metadata of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    /// 1-based page number.
    pub page: u64,
    /// Items per page after clamping.
    pub per_page: u64,
    /// Collection size before slicing.
    pub total: u64,
    /// Number of non-empty pages.
    pub pages: u64,
    /// Link to the previous page.
    pub prev: Option<String>,
    /// Link to the next page.
    pub next: Option<String>,
    /// Link to page 1.
    pub first: String,
    /// Link to the last page.
    pub last: String,
}

/// One page of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page, in collection order.
    pub items: Vec<T>,
    /// Navigation metadata.
    pub meta: PageMeta,
}

impl<T: Serialize> Page<T> {
    /// Renders the page as `{ <items_key>: [...], "meta": {...} }`.
    pub fn into_body(self, items_key: &str) -> Value {
        let mut body = serde_json::Map::new();
        body.insert(
            items_key.to_string(),
            serde_json::to_value(self.items).unwrap_or(Value::Array(Vec::new())),
        );
        body.insert(
            "meta".to_string(),
            serde_json::to_value(self.meta).unwrap_or(Value::Null),
        );
        Value::Object(body)
    }
}

/// A resolved page request, ready to paginate with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u64,
    /// Items per page, already clamped.
    pub per_page: u64,
    /// Collection URL the links are built on, without a query string.
    pub base_url: String,
}

/// Page-size policy shared by every collection route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    default_per_page: u64,
    max_per_page: u64,
}

impl Paginator {
    /// Creates a paginator. Both bounds are raised to at least one.
    #[must_use]
    pub fn new(default_per_page: u64, max_per_page: u64) -> Self {
        let max_per_page = max_per_page.max(1);
        Self {
            default_per_page: default_per_page.clamp(1, max_per_page),
            max_per_page,
        }
    }

    /// Returns the default page size.
    #[must_use]
    pub fn default_per_page(&self) -> u64 {
        self.default_per_page
    }

    /// Returns the page size limit.
    #[must_use]
    pub fn max_per_page(&self) -> u64 {
        self.max_per_page
    }

    /// Reads `page` and `per_page` from a query string.
    ///
    /// Missing, malformed or zero values fall back to page 1 and the default
    /// size; oversized `per_page` is clamped.
    #[must_use]
    pub fn request(&self, query: Option<&str>, base_url: impl Into<String>) -> PageRequest {
        let pairs: Vec<(String, String)> = query
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default();
        let param = |name: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == name)
                .and_then(|(_, value)| value.trim().parse::<u64>().ok())
                .filter(|value| *value >= 1)
        };

        PageRequest {
            page: param("page").unwrap_or(1),
            per_page: param("per_page")
                .unwrap_or(self.default_per_page)
                .min(self.max_per_page),
            base_url: base_url.into(),
        }
    }

    /// Paginates `collection` according to `request`.
    #[must_use]
    pub fn paginate<T: Clone>(&self, collection: &[T], request: &PageRequest) -> Page<T> {
        paginate(
            collection,
            Some(request.page),
            Some(request.per_page),
            self.default_per_page,
            self.max_per_page,
            &request.base_url,
        )
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_PER_PAGE, DEFAULT_MAX_PER_PAGE)
    }
}

/// Slices `collection` into one page and computes its links.
#[must_use]
pub fn paginate<T: Clone>(
    collection: &[T],
    page: Option<u64>,
    per_page: Option<u64>,
    default_per_page: u64,
    max_per_page: u64,
    base_url: &str,
) -> Page<T> {
    let max_per_page = max_per_page.max(1);
    let page = page.filter(|p| *p >= 1).unwrap_or(1);
    let per_page = per_page
        .filter(|p| *p >= 1)
        .unwrap_or(default_per_page)
        .clamp(1, max_per_page);

    let total = collection.len() as u64;
    let pages = total.div_ceil(per_page);
    let last_page = pages.max(1);

    let start = page.saturating_sub(1).saturating_mul(per_page);
    let items = usize::try_from(start)
        .ok()
        .and_then(|start| collection.get(start..))
        .unwrap_or_default()
        .iter()
        .take(usize::try_from(per_page).unwrap_or(usize::MAX))
        .cloned()
        .collect();

    let link = |n: u64| page_url(base_url, n, per_page);
    let has_more = start.saturating_add(per_page) < total;

    Page {
        items,
        meta: PageMeta {
            page,
            per_page,
            total,
            pages,
            prev: (page > 1).then(|| link(page - 1)),
            next: has_more.then(|| link(page + 1)),
            first: link(1),
            last: link(last_page),
        },
    }
}

fn page_url(base_url: &str, page: u64, per_page: u64) -> String {
    format!("{base_url}?page={page}&per_page={per_page}")
}
