//! List-backed source collections and the paginated accumulator.
//!
//! This crate provides:
//! - [`page`]: the page contract ([`Page`], [`PagedCollection`]) and [`accumulate`]
//! - [`sharepoint`]: REST client for SharePoint lists (paged reads, item writes)
//! - [`memory`]: in-memory collections, loadable from JSON exports

pub mod memory;
pub mod page;
pub mod sharepoint;

pub use memory::MemoryCollection;
pub use page::{Page, PageObserver, PagedCollection, SilentObserver, accumulate};
pub use sharepoint::{APPEND_FIELDS, IMPORT_FIELDS, ListCollection, SharePointClient};
