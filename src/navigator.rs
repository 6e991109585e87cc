/// One page of an ordered collection.
#[derive(Debug, Clone, PartialEq)]
pub struct PageView<'a, T> {
    pub items: &'a [T],
    pub page_index: usize,
    pub page_count: usize,
    pub has_prev: bool,
    pub has_next: bool,
}

/// Slice `items` into the requested page.
///
/// An index past the last page falls back to page 0; a page size of 0 is
/// treated as 1. An empty collection has zero pages and an empty page 0.
pub fn page<T>(items: &[T], page_index: usize, page_size: usize) -> PageView<'_, T> {
    let size = page_size.max(1);
    let page_count = items.len().div_ceil(size);
    let page_index = if page_index < page_count { page_index } else { 0 };
    let start = (page_index * size).min(items.len());
    let end = (start + size).min(items.len());
    PageView {
        items: &items[start..end],
        page_index,
        page_count,
        has_prev: page_index > 0,
        has_next: page_index + 1 < page_count,
    }
}
