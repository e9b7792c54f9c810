//! Query Builder LIMIT / OFFSET operations

use super::builder::QueryBuilder;

impl QueryBuilder {
    /// Add LIMIT clause
    pub fn limit(mut self, count: i64) -> Self {
        self.limit_count = Some(count);
        self
    }

    /// Add OFFSET clause
    pub fn offset(mut self, count: i64) -> Self {
        self.offset_value = Some(count);
        self
    }

    /// Drop LIMIT and OFFSET, keeping every other clause (used for counting)
    pub fn without_window(mut self) -> Self {
        self.limit_count = None;
        self.offset_value = None;
        self.order_by.clear();
        self
    }
}

/// Offset of the first row on `page` (1-based)
pub fn page_offset(page: u64, per_page: u64) -> u64 {
    per_page * page.saturating_sub(1)
}

/// Number of pages needed for `total` rows
pub fn last_page(total: u64, per_page: u64) -> u64 {
    if total == 0 || per_page == 0 {
        0
    } else {
        total.div_ceil(per_page)
    }
}
