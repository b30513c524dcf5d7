//! Offset paging shared by list and search operations.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_COUNT: u32 = 20;

/// Requested page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: u32,
    pub count: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            count: DEFAULT_PAGE_COUNT,
        }
    }
}

impl PageRequest {
    pub fn new(offset: u32, count: u32) -> Self {
        Self { offset, count }
    }

    /// Clamp `count` into `1..=max`.
    #[must_use]
    pub fn clamped(self, max: u32) -> Self {
        Self {
            offset: self.offset,
            count: self.count.clamp(1, max.max(1)),
        }
    }

    /// Slice an already-filtered result set into a page.
    pub fn apply<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len() as u32;
        let items: Vec<T> = items
            .into_iter()
            .skip(self.offset as usize)
            .take(self.count as usize)
            .collect();
        let has_more = (self.offset as u64 + items.len() as u64) < total as u64;
        Page {
            items,
            total,
            offset: self.offset,
            has_more,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u32,
    pub offset: u32,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            offset: self.offset,
            has_more: self.has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_windows() {
        let page = PageRequest::new(2, 3).apply((0..10).collect());
        assert_eq!(page.items, vec![2, 3, 4]);
        assert_eq!(page.total, 10);
        assert!(page.has_more);

        let last = PageRequest::new(8, 5).apply((0..10).collect());
        assert_eq!(last.items, vec![8, 9]);
        assert!(!last.has_more);

        let past_end = PageRequest::new(50, 5).apply((0..10).collect::<Vec<i32>>());
        assert!(past_end.is_empty());
        assert!(!past_end.has_more);
    }

    #[test]
    fn test_clamped() {
        assert_eq!(PageRequest::new(0, 0).clamped(100).count, 1);
        assert_eq!(PageRequest::new(0, 500).clamped(100).count, 100);
    }
}
