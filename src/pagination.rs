//! Row cursors over the filtered dataset: incremental reveal and page-by-page.

use std::ops::Range;

use serde::Serialize;

pub const DEFAULT_LAZY_PAGE_SIZE: usize = 50;
pub const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_MARKERS: usize = 5;

/// Infinite-scroll cursor. Reveals `page_size` more rows per trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LazyLoader {
    page_size: usize,
    visible_count: usize,
    total: usize,
    loading: bool,
}

impl LazyLoader {
    pub fn new(page_size: usize, total: usize) -> Self {
        let page_size = page_size.max(1);
        Self {
            page_size,
            visible_count: page_size.min(total),
            total,
            loading: false,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn visible_count(&self) -> usize {
        self.visible_count
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Resets the cursor when the underlying result size changed.
    pub fn sync_total(&mut self, total: usize) -> bool {
        if total == self.total {
            return false;
        }
        self.total = total;
        self.visible_count = self.page_size.min(total);
        self.loading = false;
        true
    }

    pub fn has_more(&self) -> bool {
        self.visible_count < self.total
    }

    pub fn visible_range(&self) -> Range<usize> {
        0..self.visible_count()
    }

    pub fn begin_load(&mut self) -> bool {
        if self.loading || !self.has_more() {
            return false;
        }
        self.loading = true;
        true
    }

    pub fn finish_load(&mut self) {
        if !self.loading {
            return;
        }
        self.visible_count = (self.visible_count + self.page_size).min(self.total);
        self.loading = false;
    }

    pub fn load_more(&mut self) -> bool {
        if !self.begin_load() {
            return false;
        }
        self.finish_load();
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "page", rename_all = "lowercase")]
pub enum PageMarker {
    Page(usize),
    Ellipsis,
}

/// Classic page-by-page cursor, 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pager {
    page_size: usize,
    current_page: usize,
    total: usize,
}

impl Pager {
    pub fn new(page_size: usize, total: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            current_page: 1,
            total,
        }
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.page_size)
    }

    pub fn sync_total(&mut self, total: usize) -> bool {
        if total == self.total {
            return false;
        }
        self.total = total;
        self.current_page = 1;
        true
    }

    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }

    pub fn next(&mut self) -> bool {
        if !self.has_next() {
            return false;
        }
        self.current_page += 1;
        true
    }

    pub fn previous(&mut self) -> bool {
        if !self.has_previous() {
            return false;
        }
        self.current_page -= 1;
        true
    }

    /// Jumps to `page`; out-of-range pages are ignored.
    pub fn go_to(&mut self, page: usize) -> bool {
        if page == 0 || page > self.total_pages() || page == self.current_page {
            return false;
        }
        self.current_page = page;
        true
    }

    pub fn range(&self) -> Range<usize> {
        let start = ((self.current_page - 1) * self.page_size).min(self.total);
        let end = (start + self.page_size).min(self.total);
        start..end
    }

    pub fn start_item(&self) -> usize {
        if self.total == 0 {
            0
        } else {
            self.range().start + 1
        }
    }

    pub fn end_item(&self) -> usize {
        self.range().end
    }

    pub fn page_markers(&self) -> Vec<PageMarker> {
        let last = self.total_pages();
        if last <= MAX_PAGE_MARKERS {
            return (1..=last).map(PageMarker::Page).collect();
        }

        let current = self.current_page;
        let mut markers = vec![PageMarker::Page(1)];
        if current > 3 {
            markers.push(PageMarker::Ellipsis);
        }

        let window_start = current.saturating_sub(1).max(2);
        let window_end = (current + 1).min(last - 1);
        markers.extend((window_start..=window_end).map(PageMarker::Page));

        if current + 2 < last {
            markers.push(PageMarker::Ellipsis);
        }
        markers.push(PageMarker::Page(last));
        markers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PageMarker::{Ellipsis, Page};

    #[test]
    fn lazy_loader_reveals_in_page_steps() {
        let mut loader = LazyLoader::new(50, 120);
        assert_eq!(loader.visible_range(), 0..50);
        assert!(loader.has_more());

        assert!(loader.load_more());
        assert_eq!(loader.visible_count(), 100);
        assert!(loader.load_more());
        assert_eq!(loader.visible_count(), 120);
        assert!(!loader.has_more());
        assert!(!loader.load_more());
        assert_eq!(loader.visible_count(), 120);
    }

    #[test]
    fn overlapping_loads_are_refused() {
        let mut loader = LazyLoader::new(50, 120);
        assert!(loader.begin_load());
        assert!(!loader.begin_load());
        assert!(!loader.load_more());
        loader.finish_load();
        assert_eq!(loader.visible_count(), 100);
        assert!(!loader.is_loading());

        // finishing without a load in flight changes nothing
        loader.finish_load();
        assert_eq!(loader.visible_count(), 100);
    }

    #[test]
    fn lazy_loader_resets_on_size_change() {
        let mut loader = LazyLoader::new(50, 120);
        loader.load_more();
        assert!(!loader.sync_total(120));
        assert_eq!(loader.visible_count(), 100);

        assert!(loader.sync_total(30));
        assert_eq!(loader.visible_range(), 0..30);
        assert!(!loader.has_more());
    }

    #[test]
    fn serialized_visible_count_never_exceeds_total() {
        let mut loader = LazyLoader::new(50, 19);
        assert_eq!(loader.visible_count(), 19);
        let json = serde_json::to_value(&loader).expect("loader should serialize");
        assert_eq!(json["visibleCount"], 19);

        loader.sync_total(7);
        let json = serde_json::to_value(&loader).expect("loader should serialize");
        assert_eq!(json["visibleCount"], 7);
        assert_eq!(json["total"], 7);
    }

    #[test]
    fn pager_ranges_and_bounds() {
        let mut pager = Pager::new(10, 25);
        assert_eq!(pager.total_pages(), 3);
        assert_eq!((pager.start_item(), pager.end_item()), (1, 10));
        assert!(!pager.previous());

        assert!(pager.go_to(3));
        assert_eq!(pager.range(), 20..25);
        assert_eq!((pager.start_item(), pager.end_item()), (21, 25));
        assert!(!pager.next());
        assert!(!pager.go_to(4));
        assert!(!pager.go_to(0));

        assert!(pager.sync_total(5));
        assert_eq!(pager.current_page(), 1);

        let empty = Pager::new(10, 0);
        assert_eq!(empty.total_pages(), 0);
        assert_eq!((empty.start_item(), empty.end_item()), (0, 0));
        assert!(empty.page_markers().is_empty());
    }

    #[test]
    fn page_markers_collapse_with_ellipsis() {
        let mut pager = Pager::new(10, 50);
        assert_eq!(
            pager.page_markers(),
            vec![Page(1), Page(2), Page(3), Page(4), Page(5)]
        );

        pager.sync_total(100);
        assert_eq!(
            pager.page_markers(),
            vec![Page(1), Page(2), Ellipsis, Page(10)]
        );

        pager.go_to(5);
        assert_eq!(
            pager.page_markers(),
            vec![Page(1), Ellipsis, Page(4), Page(5), Page(6), Ellipsis, Page(10)]
        );

        pager.go_to(10);
        assert_eq!(
            pager.page_markers(),
            vec![Page(1), Ellipsis, Page(9), Page(10)]
        );

        pager.go_to(3);
        assert_eq!(
            pager.page_markers(),
            vec![Page(1), Page(2), Page(3), Page(4), Ellipsis, Page(10)]
        );
    }
}
