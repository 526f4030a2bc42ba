//! Run state machine and run summary

use crate::error::{ErrorKind, PipelineError};
use crate::load::LoadFailure;
use crate::types::SourceType;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Lifecycle of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Extracting,
    Normalizing,
    Enriching,
    Loading,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// Stages advance strictly in order; any live state may fail.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (*self, next) {
            (Idle, Extracting)
            | (Extracting, Normalizing)
            | (Normalizing, Enriching)
            | (Enriching, Loading)
            | (Loading, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Stage a failure in this state is attributed to
    pub fn stage(&self) -> Stage {
        match self {
            RunState::Idle => Stage::Startup,
            RunState::Extracting => Stage::Extract,
            RunState::Normalizing => Stage::Normalize,
            RunState::Enriching => Stage::Enrich,
            RunState::Loading | RunState::Done | RunState::Failed => Stage::Load,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Extracting => "extracting",
            RunState::Normalizing => "normalizing",
            RunState::Enriching => "enriching",
            RunState::Loading => "loading",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Startup,
    Extract,
    Normalize,
    Enrich,
    Load,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Startup => "startup",
            Stage::Extract => "extract",
            Stage::Normalize => "normalize",
            Stage::Enrich => "enrich",
            Stage::Load => "load",
        };
        f.write_str(s)
    }
}

/// Per-source counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub fetched: usize,
    pub normalized: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub enriched: usize,
    pub loaded: usize,
    pub updated: usize,
    pub failed: usize,
    /// Fetching stopped early (retries exhausted, deadline, crashed task)
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    /// None for run-level failures
    pub source_type: Option<SourceType>,
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

/// Mutable accumulator owned by the runner
#[derive(Debug)]
pub struct RunSummaryBuilder {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    counts: BTreeMap<SourceType, SourceCounts>,
    failures: Vec<FailureRecord>,
}

impl Default for RunSummaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSummaryBuilder {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            counts: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn source_mut(&mut self, source: SourceType) -> &mut SourceCounts {
        self.counts.entry(source).or_default()
    }

    pub fn record_failure(&mut self, source: Option<SourceType>, stage: Stage, err: &PipelineError) {
        self.failures.push(FailureRecord {
            source_type: source,
            stage,
            kind: err.kind(),
            message: err.to_string(),
        });
    }

    pub fn record_load_failure(&mut self, failure: LoadFailure) {
        self.failures.push(FailureRecord {
            source_type: Some(failure.source_type),
            stage: Stage::Load,
            kind: failure.kind,
            message: format!("{}: {}", failure.fingerprint, failure.message),
        });
    }

    /// Close the run. Consumes the builder so a summary is produced once.
    pub fn finalize(self, state: RunState) -> RunSummary {
        debug_assert!(state.is_terminal());
        RunSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            state,
            counts: self.counts,
            failures: self.failures,
        }
    }
}

/// Immutable outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub state: RunState,
    pub counts: BTreeMap<SourceType, SourceCounts>,
    pub failures: Vec<FailureRecord>,
}

impl RunSummary {
    pub fn counts_for(&self, source: SourceType) -> SourceCounts {
        self.counts.get(&source).copied().unwrap_or_default()
    }

    pub fn total_loaded(&self) -> usize {
        self.counts.values().map(|c| c.loaded + c.updated).sum()
    }

    /// 0 clean, 1 degraded, 2 failed
    pub fn exit_code(&self) -> i32 {
        if self.state == RunState::Failed {
            2
        } else if !self.failures.is_empty() || self.counts.values().any(|c| c.partial) {
            1
        } else {
            0
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Run {} {} in {:.1}s",
            self.run_id,
            self.state,
            (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
        )?;
        writeln!(
            f,
            "{:<10} {:>8} {:>10} {:>8} {:>6} {:>9} {:>7} {:>8} {:>7}",
            "Source", "Fetched", "Normalized", "Skipped", "Dups", "Enriched", "Loaded", "Updated", "Failed"
        )?;
        writeln!(f, "{}", "-".repeat(83))?;
        for (source, c) in &self.counts {
            writeln!(
                f,
                "{:<10} {:>8} {:>10} {:>8} {:>6} {:>9} {:>7} {:>8} {:>7}{}",
                source.as_str(),
                c.fetched,
                c.normalized,
                c.skipped,
                c.duplicates,
                c.enriched,
                c.loaded,
                c.updated,
                c.failed,
                if c.partial { "  (partial)" } else { "" }
            )?;
        }

        if !self.failures.is_empty() {
            writeln!(f, "\nFailures:")?;
            for failure in &self.failures {
                let source = failure.source_type.map(|s| s.as_str()).unwrap_or("run");
                writeln!(
                    f,
                    "  [{}/{}] {}: {}",
                    failure.stage, source, failure.kind, failure.message
                )?;
            }
        }
        Ok(())
    }
}
