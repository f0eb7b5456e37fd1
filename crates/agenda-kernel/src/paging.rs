/// One slice of a larger result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number.
    pub number: usize,
    /// 1-based position of the first item.
    pub first: usize,
    /// 1-based position of the last item.
    pub last: usize,
    pub total: usize,
    pub has_next: bool,
}

/// Returns page `number` (1-based) of `items`, or `None` when the page starts
/// past the end of the set.
pub fn paginate<T: Clone>(items: &[T], number: usize, page_size: usize) -> Option<Page<T>> {
    let number = number.max(1);
    let page_size = page_size.max(1);
    let offset = (number - 1).saturating_mul(page_size);
    if offset >= items.len() {
        return None;
    }
    let end = (offset + page_size).min(items.len());
    Some(Page {
        items: items[offset..end].to_vec(),
        number,
        first: offset + 1,
        last: end,
        total: items.len(),
        has_next: end < items.len(),
    })
}
