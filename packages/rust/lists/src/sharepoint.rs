//! SharePoint REST list client.
//!
//! Reads list items page by page (`$top` + `odata.nextLink`) and exposes the
//! create/update/recycle calls the append-collection editor needs. Requests
//! use `odata=nometadata` so item bodies are plain column maps.

use std::marker::PhantomData;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};
use url::Url;

use codejson_shared::{AppendRecord, CodeJsonError, Result};

use crate::page::{Page, PagedCollection};

/// User-Agent string for list requests.
const USER_AGENT: &str = concat!("codejson/", env!("CARGO_PKG_VERSION"));

const ODATA_JSON: &str = "application/json;odata=nometadata";

/// Columns selected from the import list.
pub const IMPORT_FIELDS: &[&str] = &[
    "VASI_x0020_Id",
    "System_x0020_Name",
    "Software_x0020_Type",
    "System_x0020_Status",
    "Technology_x0020_Components",
];

/// Columns selected from the append list. Nothing outside this list is read.
pub const APPEND_FIELDS: &[&str] = &[
    "Id",
    "Title",
    "codeVersion",
    "disclaimerURL",
    "downloadURL",
    "homepageURL",
    "laborHours",
    "licenseName",
    "opRL",
    "repositoryURL",
    "tags",
    "usageType",
    "vcs",
    "disclaimer",
    "Created",
    "Modified",
];

/// Body of an items read.
#[derive(Debug, Deserialize)]
struct ItemsResponse<T> {
    value: Vec<T>,
    #[serde(rename = "odata.nextLink", alias = "@odata.nextLink", default)]
    next_link: Option<String>,
}

// ---------------------------------------------------------------------------
// SharePointClient
// ---------------------------------------------------------------------------

/// Client for one SharePoint site.
#[derive(Debug, Clone)]
pub struct SharePointClient {
    client: Client,
    site_url: String,
    token: Option<String>,
}

impl SharePointClient {
    /// Create a client for `site_url`, authenticating with a bearer token if given.
    pub fn new(site_url: &str, token: Option<String>) -> Result<Self> {
        let parsed = Url::parse(site_url).map_err(|e| {
            CodeJsonError::config(format!("invalid SharePoint site URL '{site_url}': {e}"))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| CodeJsonError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            site_url: parsed.as_str().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// A paged view over one list, selecting only `fields`.
    pub fn list<T>(
        &self,
        label: impl Into<String>,
        list_id: impl Into<String>,
        fields: &[&str],
        page_size: u32,
    ) -> ListCollection<'_, T> {
        ListCollection {
            client: self,
            label: label.into(),
            list_id: list_id.into(),
            select: fields.join(","),
            page_size,
            _item: PhantomData,
        }
    }

    /// Create an append item from the record's persisted columns.
    #[instrument(skip_all, fields(list_id = %list_id, title = %record.title))]
    pub async fn create_item(&self, list_id: &str, record: &AppendRecord) -> Result<AppendRecord> {
        let url = self.items_url(list_id);
        let response = self
            .request(self.client.post(&url))
            .header(reqwest::header::CONTENT_TYPE, ODATA_JSON)
            .json(&record.persisted_fields())
            .send()
            .await
            .map_err(|e| CodeJsonError::write("create", format!("{url}: {e}")))?;

        let response = ensure_success(response, &url).map_err(|m| CodeJsonError::write("create", m))?;
        let created: AppendRecord = response
            .json()
            .await
            .map_err(|e| CodeJsonError::write("create", format!("{url}: invalid response: {e}")))?;

        info!(id = ?created.id, "append item created");
        Ok(created)
    }

    /// Merge the record's persisted columns into item `id`.
    #[instrument(skip_all, fields(list_id = %list_id, id))]
    pub async fn update_item(&self, list_id: &str, id: i64, record: &AppendRecord) -> Result<()> {
        let url = format!("{}({id})", self.items_url(list_id));
        let response = self
            .request(self.client.post(&url))
            .header(reqwest::header::CONTENT_TYPE, ODATA_JSON)
            .header("X-HTTP-Method", "MERGE")
            .header(reqwest::header::IF_MATCH, "*")
            .json(&record.persisted_fields())
            .send()
            .await
            .map_err(|e| CodeJsonError::write("update", format!("{url}: {e}")))?;

        ensure_success(response, &url).map_err(|m| CodeJsonError::write("update", m))?;
        info!("append item updated");
        Ok(())
    }

    /// Soft-delete item `id` by moving it to the site recycle bin.
    #[instrument(skip_all, fields(list_id = %list_id, id))]
    pub async fn recycle_item(&self, list_id: &str, id: i64) -> Result<()> {
        let url = format!("{}({id})/recycle()", self.items_url(list_id));
        let response = self
            .request(self.client.post(&url))
            .send()
            .await
            .map_err(|e| CodeJsonError::write("delete", format!("{url}: {e}")))?;

        ensure_success(response, &url).map_err(|m| CodeJsonError::write("delete", m))?;
        info!("append item recycled");
        Ok(())
    }

    fn items_url(&self, list_id: &str) -> String {
        format!("{}/_api/web/lists(guid'{list_id}')/items", self.site_url)
    }

    /// Attach the headers every call carries.
    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header(reqwest::header::ACCEPT, ODATA_JSON);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Turn a non-2xx response into a message naming the URL and status.
fn ensure_success(response: Response, url: &str) -> std::result::Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(format!("{url}: HTTP {status}"))
    }
}

// ---------------------------------------------------------------------------
// ListCollection
// ---------------------------------------------------------------------------

/// A paged, column-restricted view over one list.
#[derive(Debug)]
pub struct ListCollection<'a, T> {
    client: &'a SharePointClient,
    label: String,
    list_id: String,
    select: String,
    page_size: u32,
    _item: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned + Send> PagedCollection for ListCollection<'_, T> {
    type Item = T;

    fn label(&self) -> &str {
        &self.label
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page<T>> {
        let builder = match cursor {
            // The next link already carries $select/$top/$skiptoken.
            Some(next_link) => self.client.client.get(next_link),
            None => self
                .client
                .client
                .get(self.client.items_url(&self.list_id))
                .query(&[("$select", self.select.as_str())])
                .query(&[("$top", self.page_size)]),
        };

        let response = self
            .client
            .request(builder)
            .send()
            .await
            .map_err(|e| CodeJsonError::collection_read(&self.label, e.to_string()))?;

        let url = response.url().to_string();
        let response = ensure_success(response, &url)
            .map_err(|m| CodeJsonError::collection_read(&self.label, m))?;

        let body: ItemsResponse<T> = response.json().await.map_err(|e| {
            CodeJsonError::collection_read(&self.label, format!("{url}: invalid items body: {e}"))
        })?;

        debug!(
            list_id = %self.list_id,
            count = body.value.len(),
            has_next = body.next_link.is_some(),
            "list page fetched"
        );

        Ok(Page {
            items: body.value,
            next: body.next_link,
        })
    }
}
