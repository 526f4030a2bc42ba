//! Pipeline runner
//!
//! Drives one batch run through extract, normalize, enrich and load. Sources
//! are fetched concurrently and their failures stay per-source. Only a store
//! that is unreachable (at start or mid-load) fails the run.

pub mod summary;

#[cfg(test)]
mod tests;

pub use summary::{FailureRecord, RunState, RunSummary, RunSummaryBuilder, SourceCounts, Stage};

use crate::config::Config;
use crate::enrich::EnrichmentStage;
use crate::error::{PipelineError, Result};
use crate::ingester::{BatchSource, FetchContext, FetchOutcome, SourceAdapter};
use crate::load::LoadStage;
use crate::normalize::Normalizer;
use crate::storage::DocumentStore;
use crate::types::{Document, EnrichedDocument, SourceType};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub struct PipelineRunner {
    sources: Vec<Arc<dyn BatchSource>>,
    enrichment: Arc<EnrichmentStage>,
    store: Arc<dyn DocumentStore>,
    load: LoadStage,
    run_timeout: Option<Duration>,
    state: RunState,
}

impl PipelineRunner {
    pub fn new(
        sources: Vec<Arc<dyn BatchSource>>,
        enrichment: EnrichmentStage,
        store: Arc<dyn DocumentStore>,
        load: LoadStage,
    ) -> Self {
        Self {
            sources,
            enrichment: Arc::new(enrichment),
            store,
            load,
            run_timeout: None,
            state: RunState::Idle,
        }
    }

    /// All configured sources over HTTP, writing to `store`
    pub fn from_config(config: &Config, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let sources = SourceAdapter::from_config(config)?
            .into_iter()
            .map(|adapter| Arc::new(adapter) as Arc<dyn BatchSource>)
            .collect();
        let load = LoadStage::new(
            store.clone(),
            config.pipeline.load_concurrency,
            config.pipeline.max_consecutive_failures,
        );

        Ok(Self::new(
            sources,
            EnrichmentStage::from_config(&config.enrichment),
            store,
            load,
        )
        .with_timeout(config.pipeline.run_timeout_secs.map(Duration::from_secs)))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Execute one run to a terminal state
    pub async fn run(mut self) -> RunSummary {
        let mut summary = RunSummaryBuilder::new();
        info!("Starting run {}", summary.run_id());

        let terminal = match self.execute(&mut summary).await {
            Ok(()) => RunState::Done,
            Err(e) => {
                error!("Run failed while {}: {}", self.state, e);
                summary.record_failure(None, self.state.stage(), &e);
                RunState::Failed
            }
        };

        if let Err(e) = self.advance(terminal) {
            error!("{}", e);
        }
        let summary = summary.finalize(self.state);
        info!(
            "Run {} finished {}: {} documents stored, {} failures",
            summary.run_id,
            summary.state,
            summary.total_loaded(),
            summary.failures.len()
        );
        summary
    }

    fn advance(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::Internal(format!(
                "invalid run transition {} -> {}",
                self.state, next
            )));
        }
        debug!("Run state {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    async fn execute(&mut self, summary: &mut RunSummaryBuilder) -> Result<()> {
        self.store
            .ping()
            .await
            .map_err(|e| PipelineError::StorageUnavailable(e.to_string()))?;

        let ctx = match self.run_timeout {
            Some(timeout) => FetchContext::with_deadline(Instant::now() + timeout),
            None => FetchContext::default(),
        };

        self.advance(RunState::Extracting)?;
        let outcomes = self.extract(&ctx, summary).await;

        self.advance(RunState::Normalizing)?;
        let buffer = normalize(outcomes, summary);

        self.advance(RunState::Enriching)?;
        let enriched = self.enrich(buffer, &ctx, summary).await;

        self.advance(RunState::Loading)?;
        let report = self.load.load(enriched).await;
        for (source, counts) in &report.counts {
            let entry = summary.source_mut(*source);
            entry.loaded = counts.loaded;
            entry.updated = counts.updated;
            entry.failed = counts.failed;
        }
        for failure in report.failures {
            summary.record_load_failure(failure);
        }

        match report.aborted {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Fetch every source concurrently. A crashed task is recorded against
    /// its source and the others are unaffected.
    async fn extract(
        &self,
        ctx: &FetchContext,
        summary: &mut RunSummaryBuilder,
    ) -> Vec<(SourceType, FetchOutcome)> {
        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                let ctx = *ctx;
                let source_type = source.source_type();
                (
                    source_type,
                    tokio::spawn(async move { source.fetch_batch(&ctx).await }),
                )
            })
            .collect();

        let (types, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(tasks).await;

        let mut outcomes = Vec::with_capacity(results.len());
        for (source, result) in types.into_iter().zip(results) {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("{} fetch task crashed: {}", source, e);
                    FetchOutcome {
                        records: Vec::new(),
                        errors: vec![PipelineError::Internal(format!("fetch task crashed: {}", e))],
                        partial: true,
                    }
                }
            };

            let counts = summary.source_mut(source);
            counts.fetched += outcome.records.len();
            counts.partial |= outcome.partial;
            for err in &outcome.errors {
                summary.record_failure(Some(source), Stage::Extract, err);
            }
            info!(
                "Fetched {} {} records{}",
                outcome.records.len(),
                source,
                if outcome.partial { " (partial)" } else { "" }
            );
            outcomes.push((source, outcome));
        }
        outcomes
    }

    /// Enrich the whole buffer off the async workers. A failure here leaves
    /// nothing enriched but does not fail the run.
    async fn enrich(
        &self,
        buffer: Vec<Document>,
        ctx: &FetchContext,
        summary: &mut RunSummaryBuilder,
    ) -> Vec<EnrichedDocument> {
        if ctx.expired() {
            warn!("Run deadline passed before enrichment, skipping {} documents", buffer.len());
            summary.record_failure(None, Stage::Enrich, &PipelineError::Timeout);
            return Vec::new();
        }

        let stage = Arc::clone(&self.enrichment);
        let result = tokio::task::spawn_blocking(move || stage.enrich(buffer))
            .await
            .unwrap_or_else(|e| Err(PipelineError::Internal(format!("enrichment task crashed: {}", e))));

        match result {
            Ok(enriched) => {
                for doc in &enriched {
                    summary.source_mut(doc.source_type()).enriched += 1;
                }
                enriched
            }
            Err(e) => {
                error!("Enrichment failed, nothing will be loaded: {}", e);
                summary.record_failure(None, Stage::Enrich, &e);
                Vec::new()
            }
        }
    }
}

/// Normalize every outcome into one run buffer
fn normalize(outcomes: Vec<(SourceType, FetchOutcome)>, summary: &mut RunSummaryBuilder) -> Vec<Document> {
    let mut normalizer = Normalizer::new();
    let mut buffer = Vec::new();
    for (_, outcome) in outcomes {
        buffer.extend(normalizer.normalize_all(outcome.records));
    }

    for source in SourceType::ALL {
        let stats = normalizer.stats(source);
        let counts = summary.source_mut(source);
        counts.normalized = stats.normalized;
        counts.skipped = stats.skipped;
        counts.duplicates = stats.duplicates;
        if stats.skipped > 0 || stats.duplicates > 0 {
            info!(
                "{}: {} normalized, {} skipped, {} duplicates",
                source, stats.normalized, stats.skipped, stats.duplicates
            );
        }
    }
    buffer
}
