//! In-memory document store
//!
//! Same upsert semantics as the SQLite store. Used for dry runs and tests.

use super::{summarize, DocumentStore, SourceStats, UpsertOutcome};
use crate::error::Result;
use crate::types::EnrichedDocument;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: Arc<RwLock<HashMap<String, EnrichedDocument>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored document
    pub fn snapshot(&self) -> Vec<EnrichedDocument> {
        self.documents.read().values().cloned().collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, doc: &EnrichedDocument) -> Result<UpsertOutcome> {
        let previous = self
            .documents
            .write()
            .insert(doc.fingerprint().to_string(), doc.clone());

        Ok(match previous {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        })
    }

    async fn get(&self, fingerprint: &str) -> Result<Option<EnrichedDocument>> {
        Ok(self.documents.read().get(fingerprint).cloned())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.documents.read().len() as u64)
    }

    async fn stats_by_source(&self) -> Result<Vec<SourceStats>> {
        let documents = self.documents.read();
        Ok(summarize(documents.values()))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<EnrichedDocument>> {
        let mut docs = self.snapshot();
        docs.sort_by(|a, b| {
            b.document
                .collected_at
                .cmp(&a.document.collected_at)
                .then_with(|| a.fingerprint().cmp(b.fingerprint()))
        });
        docs.truncate(limit);
        Ok(docs)
    }
}
