//! In-memory collections, optionally loaded from a JSON export of a list.

use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use codejson_shared::{CodeJsonError, Result};

use crate::page::{Page, PagedCollection};

/// A collection held in memory and served in fixed-size pages.
///
/// The continuation handle is the offset of the next page.
#[derive(Debug, Clone)]
pub struct MemoryCollection<T> {
    label: String,
    items: Vec<T>,
    page_size: usize,
}

/// Accepted JSON shapes: a bare array, or a list REST response body.
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonItems<T> {
    Bare(Vec<T>),
    Wrapped { value: Vec<T> },
}

impl<T> MemoryCollection<T> {
    /// A page size of zero serves everything in a single page.
    pub fn new(label: impl Into<String>, items: Vec<T>, page_size: usize) -> Self {
        Self {
            label: label.into(),
            items,
            page_size,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: DeserializeOwned> MemoryCollection<T> {
    /// Load records from a JSON file holding an array or `{"value": [...]}`.
    pub fn from_json_file(label: impl Into<String>, path: &Path, page_size: usize) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CodeJsonError::io(path, e))?;
        let items = match serde_json::from_str::<JsonItems<T>>(&content) {
            Ok(JsonItems::Bare(items)) | Ok(JsonItems::Wrapped { value: items }) => items,
            Err(e) => {
                return Err(CodeJsonError::parse(format!(
                    "{}: expected a JSON array of list items: {e}",
                    path.display()
                )));
            }
        };
        debug!(path = %path.display(), count = items.len(), "loaded collection file");
        Ok(Self::new(label, items, page_size))
    }
}

impl<T: Clone + Send + Sync> PagedCollection for MemoryCollection<T> {
    type Item = T;

    fn label(&self) -> &str {
        &self.label
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page<T>> {
        let start = match cursor {
            None => 0,
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| CodeJsonError::parse(format!("invalid page cursor '{c}'")))?,
        };
        if start > self.items.len() {
            return Err(CodeJsonError::parse(format!(
                "page cursor {start} is past the end of {}",
                self.label
            )));
        }

        let size = if self.page_size == 0 {
            self.items.len()
        } else {
            self.page_size
        };
        let end = (start + size).min(self.items.len());
        let next = (end < self.items.len()).then(|| end.to_string());

        Ok(Page {
            items: self.items[start..end].to_vec(),
            next,
        })
    }
}

#[cfg(test)]
mod tests {
    use codejson_shared::{AppendRecord, ImportRecord};

    use super::*;

    fn temp_file(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("cj-memory-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn serves_pages_with_offset_cursor() {
        let collection = MemoryCollection::new("Letters", vec!['a', 'b', 'c'], 2);

        let first = collection.fetch_page(None).await.unwrap();
        assert_eq!(first.items, vec!['a', 'b']);
        assert_eq!(first.next.as_deref(), Some("2"));

        let second = collection.fetch_page(first.next.as_deref()).await.unwrap();
        assert_eq!(second.items, vec!['c']);
        assert!(!second.has_next());
    }

    #[tokio::test]
    async fn zero_page_size_is_a_single_page() {
        let collection = MemoryCollection::new("All", vec![1, 2, 3], 0);
        let page = collection.fetch_page(None).await.unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.next.is_none());
    }

    #[tokio::test]
    async fn bad_cursor_is_rejected() {
        let collection = MemoryCollection::new("Letters", vec!['a'], 1);
        assert!(collection.fetch_page(Some("nope")).await.is_err());
        assert!(collection.fetch_page(Some("5")).await.is_err());
    }

    #[test]
    fn loads_bare_array_file() {
        let path = temp_file(
            "imports.json",
            r#"[{"VASI_x0020_Id": 1, "System_x0020_Name": "One", "System_x0020_Status": "Production"}]"#,
        );
        let collection: MemoryCollection<ImportRecord> =
            MemoryCollection::from_json_file("ImportData", &path, 1000).unwrap();
        assert_eq!(collection.len(), 1);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn null_id_row_keeps_the_rest_of_the_file() {
        let path = temp_file(
            "imports.json",
            r#"[
                {"VASI_x0020_Id": 1, "System_x0020_Name": "One", "System_x0020_Status": "Production"},
                {"VASI_x0020_Id": null, "System_x0020_Name": "Two", "System_x0020_Status": "Production"}
            ]"#,
        );
        let collection: MemoryCollection<ImportRecord> =
            MemoryCollection::from_json_file("ImportData", &path, 1000).unwrap();
        assert_eq!(collection.len(), 2);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn bad_date_cell_keeps_the_rest_of_the_file() {
        let path = temp_file(
            "appends.json",
            r#"[{"Id": 1, "Title": "1", "Created": "31/12/2023"}, {"Id": 2, "Title": "2"}]"#,
        );
        let collection: MemoryCollection<AppendRecord> =
            MemoryCollection::from_json_file("AppendData", &path, 100).unwrap();
        assert_eq!(collection.len(), 2);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn loads_rest_response_file() {
        let path = temp_file(
            "appends.json",
            r#"{"value": [{"Id": 1, "Title": "1"}, {"Id": 2, "Title": "2"}]}"#,
        );
        let collection: MemoryCollection<AppendRecord> =
            MemoryCollection::from_json_file("AppendData", &path, 100).unwrap();
        assert_eq!(collection.len(), 2);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn rejects_non_array_file() {
        let path = temp_file("bad.json", r#"{"items": 3}"#);
        let result: Result<MemoryCollection<AppendRecord>> =
            MemoryCollection::from_json_file("AppendData", &path, 100);
        assert!(matches!(result, Err(CodeJsonError::Parse { .. })));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
