//! Enrichment: sentiment for every document, then one topic fit over the corpus
//!
//! Enrichment is all-or-nothing for a run. A scorer failure or a corpus too
//! small for the topic count fails the whole stage and nothing is enriched.

use crate::config::EnrichmentConfig;
use crate::error::{PipelineError, Result};
use crate::sentiment::{SentimentAnalyzer, SentimentScorer};
use crate::topic::TopicModel;
use crate::types::{Document, EnrichedDocument, Sentiment};
use std::sync::Arc;
use tracing::info;

pub struct EnrichmentStage {
    scorer: Arc<dyn SentimentScorer>,
    model: TopicModel,
}

impl EnrichmentStage {
    pub fn new(scorer: Arc<dyn SentimentScorer>, model: TopicModel) -> Self {
        Self { scorer, model }
    }

    /// Lexicon scorer with the configured topic model
    pub fn from_config(config: &EnrichmentConfig) -> Self {
        Self::new(Arc::new(SentimentAnalyzer::new()), TopicModel::new(config))
    }

    /// Enrich the whole run buffer. An empty buffer yields nothing.
    pub fn enrich(&self, documents: Vec<Document>) -> Result<Vec<EnrichedDocument>> {
        if documents.is_empty() {
            info!("No documents to enrich");
            return Ok(Vec::new());
        }

        let sentiments = documents
            .iter()
            .map(|doc| {
                self.scorer
                    .score(&doc.text)
                    .map(Sentiment::from)
                    .map_err(|e| match e {
                        PipelineError::Scorer(_) => e,
                        other => PipelineError::Scorer(other.to_string()),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        let topics = self.model.fit(&texts)?;

        info!(
            "Enriched {} documents across {} topics",
            documents.len(),
            topics.num_topics()
        );
        for topic in 0..topics.num_topics() {
            tracing::debug!("Topic {}: {}", topic, topics.topic_terms(topic).join(", "));
        }

        Ok(documents
            .into_iter()
            .zip(sentiments)
            .zip(topics.assignments())
            .map(|((document, sentiment), topic)| EnrichedDocument {
                document,
                sentiment,
                topic,
            })
            .collect())
    }
}
