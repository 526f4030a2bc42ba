//! Load stage: upsert enriched documents with per-document isolation
//!
//! Documents are grouped by fingerprint so writes to one key stay ordered,
//! and groups are written with bounded concurrency. A failed write is
//! counted and skipped. A streak of connectivity failures means the store is
//! gone; the stage stops and reports `StorageUnavailable`.

use crate::error::{ErrorKind, PipelineError};
use crate::storage::{DocumentStore, UpsertOutcome};
use crate::types::{EnrichedDocument, SourceType};
use futures_util::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Per-source write counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadCounts {
    /// Newly inserted
    pub loaded: usize,
    /// Existing fingerprint overwritten
    pub updated: usize,
    pub failed: usize,
}

/// One document that could not be written
#[derive(Debug, Clone, PartialEq)]
pub struct LoadFailure {
    pub source_type: SourceType,
    pub fingerprint: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub counts: BTreeMap<SourceType, LoadCounts>,
    pub failures: Vec<LoadFailure>,
    /// Set when the store was declared unreachable mid-load
    pub aborted: Option<PipelineError>,
}

impl LoadReport {
    pub fn counts_for(&self, source: SourceType) -> LoadCounts {
        self.counts.get(&source).copied().unwrap_or_default()
    }
}

pub struct LoadStage {
    store: Arc<dyn DocumentStore>,
    concurrency: usize,
    /// 0 disables escalation
    max_consecutive_failures: usize,
}

impl LoadStage {
    pub fn new(store: Arc<dyn DocumentStore>, concurrency: usize, max_consecutive_failures: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
            max_consecutive_failures,
        }
    }

    pub async fn load(&self, documents: Vec<EnrichedDocument>) -> LoadReport {
        let mut report = LoadReport::default();
        if documents.is_empty() {
            return report;
        }

        let total = documents.len();
        let groups = group_by_fingerprint(documents);

        let streak = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let streak = &streak;
        let stop = &stop;

        let results: Vec<Vec<(SourceType, String, Option<crate::error::Result<UpsertOutcome>>)>> =
            stream::iter(groups.into_iter().map(|group| async move {
                let mut results = Vec::with_capacity(group.len());
                for doc in group {
                    let source = doc.source_type();
                    let fingerprint = doc.fingerprint().to_string();
                    if stop.load(Ordering::SeqCst) {
                        results.push((source, fingerprint, None));
                        continue;
                    }

                    let result = self.store.upsert(&doc).await;
                    match &result {
                        Err(e) if e.kind() == ErrorKind::Connectivity => {
                            let n = streak.fetch_add(1, Ordering::SeqCst) + 1;
                            if self.max_consecutive_failures > 0 && n >= self.max_consecutive_failures {
                                stop.store(true, Ordering::SeqCst);
                            }
                        }
                        // The store answered, so it is reachable
                        _ => streak.store(0, Ordering::SeqCst),
                    }
                    results.push((source, fingerprint, Some(result)));
                }
                results
            }))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut skipped = 0;
        for (source, fingerprint, result) in results.into_iter().flatten() {
            let counts = report.counts.entry(source).or_default();
            match result {
                Some(Ok(UpsertOutcome::Inserted)) => counts.loaded += 1,
                Some(Ok(UpsertOutcome::Updated)) => counts.updated += 1,
                Some(Err(e)) => {
                    warn!("Failed to store {} document {}: {}", source, fingerprint, e);
                    counts.failed += 1;
                    report.failures.push(LoadFailure {
                        source_type: source,
                        fingerprint,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
                None => skipped += 1,
            }
        }

        if stop.load(Ordering::SeqCst) {
            error!(
                "Storage unreachable after {} consecutive failures, {} documents not attempted",
                self.max_consecutive_failures, skipped
            );
            report.aborted = Some(PipelineError::StorageUnavailable(format!(
                "{} consecutive connectivity failures",
                self.max_consecutive_failures
            )));
        }

        info!(
            "Load finished: {} documents, {} failed",
            total,
            report.failures.len()
        );
        report
    }
}

/// Group documents sharing a fingerprint, keeping first-seen order
fn group_by_fingerprint(documents: Vec<EnrichedDocument>) -> Vec<Vec<EnrichedDocument>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<EnrichedDocument>> = Vec::new();
    for doc in documents {
        match index.get(doc.fingerprint()) {
            Some(&i) => groups[i].push(doc),
            None => {
                index.insert(doc.fingerprint().to_string(), groups.len());
                groups.push(vec![doc]);
            }
        }
    }
    groups
}
