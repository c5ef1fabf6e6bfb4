//! Paginated enumeration over cursor-based listing APIs.
//!
//! Both the management API and the storage listing API return results as a
//! page of items plus an opaque continuation cursor. [`Pager`] turns a
//! page-fetching closure into a lazy, finite sequence of items in
//! provider-returned order. One network round trip per page; no cursor is
//! persisted, so an interrupted enumeration restarts from the beginning.

use crate::error::Result;
use futures::future::BoxFuture;
use std::collections::VecDeque;

/// One page of a listing operation.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items in provider-returned order.
    pub items: Vec<T>,

    /// Opaque continuation cursor; `None` or empty means the listing is done.
    pub next: Option<String>,
}

impl<T> Page<T> {
    /// A terminal page holding the given items.
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Page-fetching closure: given the previous cursor (None for the first
/// page), produce the next page.
pub type PageFetch<'a, T> = Box<dyn FnMut(Option<String>) -> BoxFuture<'a, Result<Page<T>>> + Send + 'a>;

/// Lazy walker over a cursor-based result set.
pub struct Pager<'a, T> {
    fetch: PageFetch<'a, T>,
    buffered: VecDeque<T>,
    cursor: Option<String>,
    exhausted: bool,
}

impl<'a, T> Pager<'a, T> {
    /// Create a pager from a page-fetching closure.
    pub fn new(fetch: PageFetch<'a, T>) -> Self {
        Self {
            fetch,
            buffered: VecDeque::new(),
            cursor: None,
            exhausted: false,
        }
    }

    /// Yield the next item, fetching the next page when the buffer drains.
    pub async fn try_next(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Ok(Some(item));
            }
            if self.exhausted {
                return Ok(None);
            }

            let page = (self.fetch)(self.cursor.take()).await?;
            self.cursor = page.next.filter(|c| !c.is_empty());
            if self.cursor.is_none() {
                self.exhausted = true;
            }
            self.buffered.extend(page.items);
        }
    }

    /// Drain the remaining sequence into a Vec.
    pub async fn collect(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.try_next().await? {
            items.push(item);
        }
        Ok(items)
    }
}
