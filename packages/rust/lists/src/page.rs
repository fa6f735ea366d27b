//! Page contract and the paginated accumulator.
//!
//! A collection is read one page at a time; each page carries an optional
//! continuation handle. [`accumulate`] follows the handles until none is left
//! and returns the ordered concatenation of every page.

use std::future::Future;

use tracing::{debug, info, instrument};

use codejson_shared::{CodeJsonError, Result};

/// One page of records plus the handle to the next page, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Opaque continuation handle (a next-link URL, an offset, ...).
    pub next: Option<String>,
}

impl<T> Page<T> {
    /// A final page: no continuation.
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

/// A source collection readable page by page.
pub trait PagedCollection {
    type Item;

    /// Collection name used in logs and read errors (e.g. `ImportData`).
    fn label(&self) -> &str;

    /// Fetch the first page (`cursor == None`) or the page behind a
    /// continuation handle returned earlier.
    fn fetch_page(
        &self,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<Page<Self::Item>>> + Send;
}

/// Receives incremental feedback while a collection is accumulated.
pub trait PageObserver: Send + Sync {
    /// Called after each page with the running totals.
    fn page_loaded(&self, collection: &str, pages: usize, items_so_far: usize);
}

/// Observer that ignores every update.
pub struct SilentObserver;

impl PageObserver for SilentObserver {
    fn page_loaded(&self, _collection: &str, _pages: usize, _items_so_far: usize) {}
}

/// Read every page of `source` in order and concatenate the items.
///
/// Any failed page aborts the read with [`CodeJsonError::CollectionRead`];
/// a partial collection is never returned.
#[instrument(skip_all, fields(collection = %source.label()))]
pub async fn accumulate<C: PagedCollection>(
    source: &C,
    observer: &dyn PageObserver,
) -> Result<Vec<C::Item>> {
    let label = source.label();
    let mut items: Vec<C::Item> = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = source
            .fetch_page(cursor.as_deref())
            .await
            .map_err(|e| as_read_error(label, e))?;

        pages += 1;
        items.extend(page.items);
        observer.page_loaded(label, pages, items.len());
        debug!(pages, items = items.len(), has_next = page.next.is_some(), "page loaded");

        match page.next {
            Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                return Err(CodeJsonError::collection_read(
                    label,
                    format!("continuation did not advance past {next}"),
                ));
            }
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    info!(pages, items = items.len(), "collection read complete");
    Ok(items)
}

/// Attribute any page failure to the collection being read.
fn as_read_error(label: &str, err: CodeJsonError) -> CodeJsonError {
    match err {
        CodeJsonError::CollectionRead { .. } => err,
        other => CodeJsonError::collection_read(label, other.to_string()),
    }
}
