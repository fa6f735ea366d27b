//! Repository metadata lookup for release descriptions.
//!
//! Each release's `description` comes from the code-hosting API
//! (`GET {api}/repos/{owner}/{repo}`). Lookups never fail an export: any
//! problem degrades to a fixed fallback sentence naming the system.

use std::future::Future;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use codejson_shared::{CodeJsonError, Result};

/// User-Agent string for API requests (GitHub rejects requests without one).
const USER_AGENT: &str = concat!("codejson/", env!("CARGO_PKG_VERSION"));

/// Repository URLs containing this marker are never looked up.
pub const SKIP_MARKER: &str = "Patches";

/// The description used whenever no fetched description is available.
pub fn fallback_description(system_name: &str) -> String {
    format!("Repository containing the FOIA Releases for {system_name}")
}

// ---------------------------------------------------------------------------
// MetadataSource
// ---------------------------------------------------------------------------

/// Anything that can produce a repository description from its URL.
pub trait MetadataSource {
    /// Fetch the description of the repository at `repository_url`.
    fn fetch_description(&self, repository_url: &str) -> impl Future<Output = Result<String>> + Send;
}

/// How a release description was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionOrigin {
    /// Returned by the metadata API.
    Fetched,
    /// Lookup skipped by rule (`Patches` repositories).
    Skipped,
    /// Lookup failed; fallback substituted.
    Fallback,
}

/// A release description and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    pub text: String,
    pub origin: DescriptionOrigin,
}

/// Describe a repository, substituting the fallback on any failure.
///
/// `Patches` repositories short-circuit to the fallback without a request.
#[instrument(skip_all, fields(repository_url = %repository_url, system_name = %system_name))]
pub async fn describe<M: MetadataSource>(
    source: &M,
    repository_url: &str,
    system_name: &str,
) -> Description {
    if repository_url.contains(SKIP_MARKER) {
        debug!("skipping lookup for patches repository");
        return Description {
            text: fallback_description(system_name),
            origin: DescriptionOrigin::Skipped,
        };
    }

    match source.fetch_description(repository_url).await {
        Ok(text) => Description {
            text,
            origin: DescriptionOrigin::Fetched,
        },
        Err(e) => {
            warn!(error = %e, "repository description unavailable, using fallback");
            Description {
                text: fallback_description(system_name),
                origin: DescriptionOrigin::Fallback,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// GitHubClient
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RepoResponse {
    #[serde(default)]
    description: Option<String>,
}

/// Client for the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    /// Create a client against `api_url` (e.g. `https://api.github.com`).
    ///
    /// No request timeout is set; a hung lookup stalls the export.
    pub fn new(api_url: &str, token: Option<String>) -> Result<Self> {
        Url::parse(api_url).map_err(|e| {
            CodeJsonError::config(format!("invalid metadata API URL '{api_url}': {e}"))
        })?;

        if token.is_none() {
            warn!("no API token configured, repository lookups will be unauthenticated");
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CodeJsonError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }
}

impl MetadataSource for GitHubClient {
    async fn fetch_description(&self, repository_url: &str) -> Result<String> {
        let (owner, repo) = repo_path(repository_url)?;
        let url = format!("{}/repos/{owner}/{repo}", self.api_url);

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CodeJsonError::Enrichment(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CodeJsonError::Enrichment(format!("{url}: HTTP {status}")));
        }

        let body: RepoResponse = response
            .json()
            .await
            .map_err(|e| CodeJsonError::Enrichment(format!("{url}: invalid body: {e}")))?;

        match body.description {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(CodeJsonError::Enrichment(format!("{url}: no description"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract `(owner, repo)` from a repository URL's path.
fn repo_path(repository_url: &str) -> Result<(String, String)> {
    let url = Url::parse(repository_url.trim()).map_err(|e| {
        CodeJsonError::Enrichment(format!("malformed repository URL '{repository_url}': {e}"))
    })?;

    let mut segments = url
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty());

    match (segments.next(), segments.next()) {
        (Some(owner), Some(repo)) => {
            let repo = repo.strip_suffix(".git").unwrap_or(repo);
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(CodeJsonError::Enrichment(format!(
            "repository URL has no owner/repo path: {repository_url}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    struct Counting {
        calls: AtomicUsize,
    }

    impl MetadataSource for Counting {
        async fn fetch_description(&self, _repository_url: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("from api".into())
        }
    }

    #[test]
    fn repo_path_variants() {
        assert_eq!(
            repo_path("https://github.com/org/alpha").unwrap(),
            ("org".into(), "alpha".into())
        );
        assert_eq!(
            repo_path("https://github.com/org/alpha.git/").unwrap(),
            ("org".into(), "alpha".into())
        );
        assert_eq!(
            repo_path("https://github.com/org/alpha/tree/main").unwrap(),
            ("org".into(), "alpha".into())
        );
        assert!(repo_path("https://github.com/org").is_err());
        assert!(repo_path("not a url").is_err());
    }

    /// Records the fields of every `describe` span opened while installed.
    #[derive(Clone, Default)]
    struct SpanFields(std::sync::Arc<std::sync::Mutex<Vec<(String, String)>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SpanFields {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::span::Id,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if attrs.metadata().name() == "describe" {
                attrs.record(&mut self.clone());
            }
        }
    }

    impl tracing::field::Visit for SpanFields {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            self.0
                .lock()
                .unwrap()
                .push((field.name().to_string(), format!("{value:?}")));
        }
    }

    #[tokio::test]
    async fn describe_span_carries_url_and_name() {
        use tracing_subscriber::layer::SubscriberExt;

        let fields = SpanFields::default();
        let subscriber = tracing_subscriber::registry().with(fields.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let source = Counting {
            calls: AtomicUsize::new(0),
        };
        describe(&source, "https://github.com/org/Patches", "Alpha").await;

        let recorded = fields.0.lock().unwrap().clone();
        assert!(recorded.contains(&(
            "repository_url".to_string(),
            "https://github.com/org/Patches".to_string()
        )));
        assert!(recorded.contains(&("system_name".to_string(), "Alpha".to_string())));
    }

    #[tokio::test]
    async fn patches_repositories_skip_the_lookup() {
        let source = Counting {
            calls: AtomicUsize::new(0),
        };

        let d = describe(&source, "https://github.com/org/Patches-2021", "Alpha").await;

        assert_eq!(d.text, "Repository containing the FOIA Releases for Alpha");
        assert_eq!(d.origin, DescriptionOrigin::Skipped);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fetched_description_is_verbatim() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/org/alpha"))
            .and(header("authorization", "Bearer gh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "alpha",
                "description": "  Alpha system sources  "
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GitHubClient::new(&server.uri(), Some("gh-token".into())).unwrap();
        let d = describe(&client, "https://github.com/org/alpha", "Alpha").await;

        assert_eq!(d.text, "  Alpha system sources  ");
        assert_eq!(d.origin, DescriptionOrigin::Fetched);
    }

    #[tokio::test]
    async fn not_found_falls_back() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/org/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = GitHubClient::new(&server.uri(), None).unwrap();
        let d = describe(&client, "https://github.com/org/missing", "Beta").await;

        assert_eq!(d.text, fallback_description("Beta"));
        assert_eq!(d.origin, DescriptionOrigin::Fallback);
    }

    #[tokio::test]
    async fn null_description_falls_back() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/org/bare"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"description": null})),
            )
            .mount(&server)
            .await;

        let client = GitHubClient::new(&server.uri(), None).unwrap();
        let err = client
            .fetch_description("https://github.com/org/bare")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no description"));
    }

    #[tokio::test]
    async fn malformed_url_falls_back_without_request() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = GitHubClient::new(&server.uri(), None).unwrap();
        let d = describe(&client, "github.com/alpha", "Gamma").await;

        assert_eq!(d.origin, DescriptionOrigin::Fallback);
        assert_eq!(d.text, fallback_description("Gamma"));
    }
}
