//! End-to-end export: load → join → enrich → assemble → artifact.
//!
//! An [`Exporter`] is built fresh for every export action and consumed by
//! [`Exporter::run`], so no state survives from one run to the next.

use std::time::{Duration, Instant};

use tracing::{error, info, instrument};

use codejson_lists::{PageObserver, PagedCollection, accumulate};
use codejson_metadata::MetadataSource;
use codejson_shared::{
    AppendRecord, ExportSettings, ImportRecord, ManifestDocument, Result, RunId,
};

use crate::assembler::{Artifact, assemble_manifest, build_artifact};
use crate::enrichment::{self, EnrichmentProgress, EnrichmentStats};
use crate::join::{self, AppendView, JoinOutcome, UnmatchedKey};

/// Where an export currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPhase {
    Idle,
    Loading,
    Joining,
    Enriching,
    Assembling,
    Done,
    /// Terminal; only reachable from `Loading`.
    Failed,
}

impl ExportPhase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Loading => "Loading collections",
            Self::Joining => "Joining records",
            Self::Enriching => "Fetching repository descriptions",
            Self::Assembling => "Assembling code.json",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for ExportPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Summary of a finished export.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub run_id: RunId,
    /// Import rows read (before filtering).
    pub imports_read: usize,
    pub appends_read: usize,
    pub releases: usize,
    pub unmatched: Vec<UnmatchedKey>,
    pub enrichment: EnrichmentStats,
    pub sha256: String,
    pub elapsed: Duration,
}

/// Everything a finished export hands back.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub manifest: ManifestDocument,
    pub artifact: Artifact,
    pub summary: ExportSummary,
}

/// Progress callback for reporting export status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, phase: ExportPhase);
    /// Called after each page of a collection is read.
    fn collection_progress(&self, collection: &str, pages: usize, items: usize);
    /// Called once before enrichment with the number of lookups to come.
    fn set_max(&self, max: usize);
    /// Called before each lookup is issued.
    fn advance(&self, current: usize, max: usize, detail: &str);
    /// Called when the artifact is ready; the counter has reached its maximum.
    fn done(&self, summary: &ExportSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _phase: ExportPhase) {}
    fn collection_progress(&self, _collection: &str, _pages: usize, _items: usize) {}
    fn set_max(&self, _max: usize) {}
    fn advance(&self, _current: usize, _max: usize, _detail: &str) {}
    fn done(&self, _summary: &ExportSummary) {}
}

// ---------------------------------------------------------------------------
// Exporter
// ---------------------------------------------------------------------------

/// One export run over two source collections and a metadata source.
pub struct Exporter<'a, I, A, M> {
    settings: &'a ExportSettings,
    imports: &'a I,
    appends: &'a A,
    metadata: &'a M,
    run_id: RunId,
    phase: ExportPhase,
}

impl<'a, I, A, M> Exporter<'a, I, A, M>
where
    I: PagedCollection<Item = ImportRecord>,
    A: PagedCollection<Item = AppendRecord>,
    M: MetadataSource,
{
    pub fn new(settings: &'a ExportSettings, imports: &'a I, appends: &'a A, metadata: &'a M) -> Self {
        Self {
            settings,
            imports,
            appends,
            metadata,
            run_id: RunId::new(),
            phase: ExportPhase::Idle,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn phase(&self) -> ExportPhase {
        self.phase
    }

    /// Run the full export.
    ///
    /// 1. Load both collections (fatal on any read failure)
    /// 2. Filter imports and join
    /// 3. Enrich matched records one at a time
    /// 4. Assemble the manifest
    /// 5. Produce the `code.json` artifact
    #[instrument(skip_all, fields(run_id = %self.run_id))]
    pub async fn run(mut self, progress: &dyn ProgressReporter) -> Result<ExportOutcome> {
        let start = Instant::now();
        info!("starting export");

        // --- Loading + Joining ---
        let (outcome, imports_read, appends_read) = self.load_and_join(progress).await?;

        // --- Enriching ---
        self.enter(ExportPhase::Enriching, progress);
        let max = enrichment::lookup_count(&outcome.records);
        progress.set_max(max);
        let enrich_progress = PipelineEnrichmentProgress { inner: progress };
        let enriched = enrichment::run_enrichment(
            &outcome.records,
            self.settings,
            self.metadata,
            &enrich_progress,
        )
        .await;

        // --- Assembling ---
        self.enter(ExportPhase::Assembling, progress);
        let releases = enriched.releases.len();
        let manifest = assemble_manifest(enriched.releases);
        let artifact = build_artifact(&manifest)?;

        // --- Done ---
        self.enter(ExportPhase::Done, progress);
        let summary = ExportSummary {
            run_id: self.run_id.clone(),
            imports_read,
            appends_read,
            releases,
            unmatched: outcome.unmatched,
            enrichment: enriched.stats,
            sha256: artifact.sha256.clone(),
            elapsed: start.elapsed(),
        };
        progress.done(&summary);

        info!(
            releases = summary.releases,
            unmatched = summary.unmatched.len(),
            failed_lookups = summary.enrichment.failed,
            elapsed_ms = summary.elapsed.as_millis(),
            "export complete"
        );

        Ok(ExportOutcome {
            manifest,
            artifact,
            summary,
        })
    }

    /// Load and join only, for reviewing keys without exporting.
    ///
    /// Returns the append rows with their derived system names.
    #[instrument(skip_all, fields(run_id = %self.run_id))]
    pub async fn preview(mut self, progress: &dyn ProgressReporter) -> Result<Vec<AppendView>> {
        let (outcome, _, _) = self.load_and_join(progress).await?;
        self.enter(ExportPhase::Done, progress);
        Ok(outcome.append_view)
    }

    async fn load_and_join(
        &mut self,
        progress: &dyn ProgressReporter,
    ) -> Result<(JoinOutcome, usize, usize)> {
        self.enter(ExportPhase::Loading, progress);
        let observer = LoadObserver { inner: progress };

        let imports = match accumulate(self.imports, &observer).await {
            Ok(items) => items,
            Err(e) => return Err(self.fail(e, progress)),
        };
        let appends = match accumulate(self.appends, &observer).await {
            Ok(items) => items,
            Err(e) => return Err(self.fail(e, progress)),
        };
        let (imports_read, appends_read) = (imports.len(), appends.len());

        self.enter(ExportPhase::Joining, progress);
        let imports = join::apply_import_filter(&self.settings.import_filter, imports);
        let outcome = join::join(imports, appends);

        Ok((outcome, imports_read, appends_read))
    }

    fn enter(&mut self, phase: ExportPhase, progress: &dyn ProgressReporter) {
        info!(from = %self.phase, to = %phase, "export phase");
        self.phase = phase;
        progress.phase(phase);
    }

    /// Record a fatal load error once and hand it back.
    fn fail(
        &mut self,
        err: codejson_shared::CodeJsonError,
        progress: &dyn ProgressReporter,
    ) -> codejson_shared::CodeJsonError {
        error!(error = %err, "export aborted while loading");
        self.phase = ExportPhase::Failed;
        progress.phase(ExportPhase::Failed);
        err
    }
}

// ---------------------------------------------------------------------------
// Progress adapters
// ---------------------------------------------------------------------------

/// Adapts a `ProgressReporter` to the `PageObserver` interface.
struct LoadObserver<'a> {
    inner: &'a dyn ProgressReporter,
}

impl PageObserver for LoadObserver<'_> {
    fn page_loaded(&self, collection: &str, pages: usize, items_so_far: usize) {
        self.inner.collection_progress(collection, pages, items_so_far);
    }
}

/// Adapts a `ProgressReporter` to the `EnrichmentProgress` interface.
struct PipelineEnrichmentProgress<'a> {
    inner: &'a dyn ProgressReporter,
}

impl EnrichmentProgress for PipelineEnrichmentProgress<'_> {
    fn advance(&self, current: usize, total: usize, detail: &str) {
        self.inner.advance(current, total, detail);
    }
}
