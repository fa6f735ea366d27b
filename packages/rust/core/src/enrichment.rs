//! Sequential enrichment of joined records into release entries.
//!
//! Records are processed through a single-slot ordered queue: one metadata
//! lookup in flight at a time, results in import order. The progress counter
//! is advanced before each lookup is issued.

use futures::StreamExt;
use futures::stream;
use tracing::{info, instrument};

use codejson_metadata::{DescriptionOrigin, MetadataSource, describe, fallback_description};
use codejson_shared::{AppendRecord, ExportSettings, ImportRecord, ReleaseEntry};

use crate::join::JoinedRecord;
use crate::release::build_release;

/// Lookups in flight at once.
const QUEUE_WIDTH: usize = 1;

/// Receives the enrichment counter.
pub trait EnrichmentProgress {
    /// Called before lookup `current` of `total` is issued.
    fn advance(&self, current: usize, total: usize, detail: &str);
}

/// Counts of how each description was obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentStats {
    pub fetched: usize,
    /// Lookups skipped by rule.
    pub skipped: usize,
    /// Lookups that failed and fell back.
    pub failed: usize,
    /// Records with no repository URL.
    pub no_repository: usize,
}

/// Releases in processing order plus how their descriptions were obtained.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentResults {
    pub releases: Vec<ReleaseEntry>,
    pub stats: EnrichmentStats,
}

/// One unit of work: a record with a matched append row.
struct Job<'a> {
    import: &'a ImportRecord,
    append: &'a AppendRecord,
    /// 1-based lookup position; `None` when there is no repository to look up.
    step: Option<(usize, &'a str)>,
}

/// Number of lookups an enrichment pass over `records` will issue.
pub fn lookup_count(records: &[JoinedRecord]) -> usize {
    records
        .iter()
        .filter_map(|r| r.append.as_ref())
        .filter(|a| repository_of(a).is_some())
        .count()
}

/// Walk `records` in order and build a release for each matched record.
///
/// Records without an append row are skipped. A failed lookup only changes
/// that release's description.
#[instrument(skip_all, fields(records = records.len()))]
pub async fn run_enrichment<M: MetadataSource>(
    records: &[JoinedRecord],
    settings: &ExportSettings,
    source: &M,
    progress: &dyn EnrichmentProgress,
) -> EnrichmentResults {
    let total = lookup_count(records);
    let mut step = 0usize;

    let jobs: Vec<Job<'_>> = records
        .iter()
        .filter_map(|r| r.append.as_ref().map(|a| (&r.import, a)))
        .map(|(import, append)| Job {
            import,
            append,
            step: repository_of(append).map(|url| {
                step += 1;
                (step, url)
            }),
        })
        .collect();

    info!(jobs = jobs.len(), lookups = total, "starting enrichment");

    let outcomes: Vec<(ReleaseEntry, Option<DescriptionOrigin>)> = stream::iter(jobs)
        .map(|job| async move {
            let (text, origin) = match job.step {
                Some((current, url)) => {
                    progress.advance(current, total, &job.import.system_name);
                    let d = describe(source, url, &job.import.system_name).await;
                    (d.text, Some(d.origin))
                }
                None => (fallback_description(&job.import.system_name), None),
            };
            (build_release(job.import, job.append, text, settings), origin)
        })
        .buffered(QUEUE_WIDTH)
        .collect()
        .await;

    let mut results = EnrichmentResults::default();
    for (release, origin) in outcomes {
        match origin {
            Some(DescriptionOrigin::Fetched) => results.stats.fetched += 1,
            Some(DescriptionOrigin::Skipped) => results.stats.skipped += 1,
            Some(DescriptionOrigin::Fallback) => results.stats.failed += 1,
            None => results.stats.no_repository += 1,
        }
        results.releases.push(release);
    }

    info!(
        releases = results.releases.len(),
        fetched = results.stats.fetched,
        skipped = results.stats.skipped,
        failed = results.stats.failed,
        "enrichment complete"
    );

    results
}

/// The non-blank repository URL of an append row.
fn repository_of(append: &AppendRecord) -> Option<&str> {
    append
        .repository_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use codejson_shared::{CodeJsonError, Result};

    use super::*;

    /// Answers by URL and logs every call and progress tick in one timeline.
    #[derive(Default)]
    struct Timeline {
        events: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MetadataSource for Timeline {
        async fn fetch_description(&self, repository_url: &str) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.events.lock().unwrap().push(format!("call {repository_url}"));
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if repository_url.ends_with("broken") {
                Err(CodeJsonError::Enrichment("HTTP 500".into()))
            } else {
                Ok(format!("about {repository_url}"))
            }
        }
    }

    impl EnrichmentProgress for Timeline {
        fn advance(&self, current: usize, total: usize, _detail: &str) {
            self.events.lock().unwrap().push(format!("progress {current}/{total}"));
        }
    }

    fn record(id: i64, name: &str, repo: Option<&str>, matched: bool) -> JoinedRecord {
        JoinedRecord {
            import: ImportRecord {
                vasi_id: Some(id),
                system_name: name.into(),
                software_type: None,
                system_status: "Production".into(),
                technology_components: None,
            },
            append: matched.then(|| AppendRecord {
                title: id.to_string(),
                repository_url: repo.map(String::from),
                ..Default::default()
            }),
        }
    }

    #[tokio::test]
    async fn processes_sequentially_with_progress_before_each_call() {
        let records = vec![
            record(1, "One", Some("https://host/o/one"), true),
            record(2, "Two", Some("https://host/o/two"), false),
            record(3, "Three", None, true),
            record(4, "Four", Some("https://host/o/broken"), true),
        ];
        let timeline = Timeline::default();

        let results =
            run_enrichment(&records, &ExportSettings::default(), &timeline, &timeline).await;

        assert_eq!(
            *timeline.events.lock().unwrap(),
            vec![
                "progress 1/2",
                "call https://host/o/one",
                "progress 2/2",
                "call https://host/o/broken",
            ]
        );
        assert_eq!(timeline.max_in_flight.load(Ordering::SeqCst), 1);

        let names: Vec<&str> = results.releases.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["One", "Three", "Four"]);
        assert_eq!(results.releases[0].description, "about https://host/o/one");
        assert_eq!(results.releases[1].description, fallback_description("Three"));
        assert_eq!(results.releases[2].description, fallback_description("Four"));
        assert_eq!(
            results.stats,
            EnrichmentStats {
                fetched: 1,
                skipped: 0,
                failed: 1,
                no_repository: 1,
            }
        );
    }

    #[tokio::test]
    async fn patches_repository_counts_progress_but_makes_no_call() {
        let records = vec![record(1, "One", Some("https://host/o/Patches"), true)];
        let timeline = Timeline::default();

        let results =
            run_enrichment(&records, &ExportSettings::default(), &timeline, &timeline).await;

        assert_eq!(*timeline.events.lock().unwrap(), vec!["progress 1/1"]);
        assert_eq!(results.stats.skipped, 1);
        assert_eq!(results.releases[0].description, fallback_description("One"));
    }

    #[test]
    fn lookup_count_ignores_unmatched_and_blank_urls() {
        let records = vec![
            record(1, "One", Some("https://host/o/one"), true),
            record(2, "Two", Some("https://host/o/two"), false),
            record(3, "Three", Some("   "), true),
        ];
        assert_eq!(lookup_count(&records), 1);
    }
}
