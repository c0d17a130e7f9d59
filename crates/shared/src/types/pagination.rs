//! Paging and ordering for file listings.

use serde::{Deserialize, Serialize};

/// Largest page a listing will return.
pub const MAX_PAGE_SIZE: u32 = 200;

const DEFAULT_PAGE_SIZE: u32 = 50;

/// Order of a file listing. Ties break on uid so pages never overlap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOrder {
    /// Most recently created first.
    #[default]
    NewestFirst,
    /// Oldest first.
    OldestFirst,
    /// Original filename, case-insensitive.
    Filename,
}

/// Which slice of a listing to return.
///
/// Out-of-range values are tolerated: page 0 reads as page 1 and the page
/// size is clamped to `1..=MAX_PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-indexed page number.
    #[serde(default = "first_page")]
    pub page: u32,
    /// Requested page size.
    #[serde(default = "default_page_size")]
    pub per_page: u32,
    /// Listing order.
    #[serde(default)]
    pub order: FileOrder,
}

fn first_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(first_page(), DEFAULT_PAGE_SIZE)
    }
}

impl PageRequest {
    /// Requests `page` of `per_page` files, newest first.
    #[must_use]
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page,
            per_page,
            order: FileOrder::default(),
        }
    }

    /// Same page in another order.
    #[must_use]
    pub fn ordered_by(self, order: FileOrder) -> Self {
        Self { order, ..self }
    }

    /// Effective 1-indexed page.
    #[must_use]
    pub fn page_number(&self) -> u32 {
        self.page.max(1)
    }

    /// Effective page size.
    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.per_page.clamp(1, MAX_PAGE_SIZE)
    }

    /// Number of rows before this page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page_number() - 1) * u64::from(self.page_size())
    }

    /// Cuts this page out of an already filtered and ordered listing.
    pub fn window<T>(&self, ordered: impl IntoIterator<Item = T>) -> PageResponse<T> {
        let mut total = 0u64;
        let skip = self.offset();
        let take = u64::from(self.page_size());
        let mut items = Vec::new();
        for item in ordered {
            if total >= skip && total - skip < take {
                items.push(item);
            }
            total += 1;
        }
        PageResponse::new(items, self, total)
    }
}

/// One page of a listing, echoing the normalized request that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResponse<T> {
    /// Rows on this page.
    pub items: Vec<T>,
    /// Effective 1-indexed page.
    pub page: u32,
    /// Effective page size.
    pub per_page: u32,
    /// Rows matching the filter across all pages.
    pub total: u64,
    /// Order the rows are in.
    pub order: FileOrder,
}

impl<T> PageResponse<T> {
    /// Wraps one page of rows.
    #[must_use]
    pub fn new(items: Vec<T>, request: &PageRequest, total: u64) -> Self {
        Self {
            items,
            page: request.page_number(),
            per_page: request.page_size(),
            total,
            order: request.order,
        }
    }

    /// Number of pages; an empty listing still has one (empty) page.
    #[must_use]
    pub fn page_count(&self) -> u64 {
        total_pages(self.total, self.per_page)
    }

    /// Whether a later page exists.
    #[must_use]
    pub fn has_more(&self) -> bool {
        u64::from(self.page) < self.page_count()
    }

    /// Converts the items, keeping the paging fields.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResponse<U> {
        PageResponse {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            order: self.order,
        }
    }
}

fn total_pages(total: u64, per_page: u32) -> u64 {
    total.div_ceil(u64::from(per_page.max(1))).max(1)
}

#[cfg(test)]
#[path = "pagination_tests.rs"]
mod tests;
