//! Core pipeline types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which kind of source a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Forum,
    Microblog,
    Headline,
}

impl SourceType {
    pub const ALL: [SourceType; 3] = [SourceType::Forum, SourceType::Microblog, SourceType::Headline];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Forum => "forum",
            SourceType::Microblog => "microblog",
            SourceType::Headline => "headline",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "forum" => Ok(SourceType::Forum),
            "microblog" => Ok(SourceType::Microblog),
            "headline" => Ok(SourceType::Headline),
            other => Err(format!("unknown source type: {}", other)),
        }
    }
}

/// Display fields preserved from the source record
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Canonical, normalized unit of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Hex SHA-256 identity key
    pub fingerprint: String,
    pub source_type: SourceType,
    /// Source-native identifier (post id, tweet id, headline URL)
    pub native_id: Option<String>,
    /// Analyzable text, markup stripped
    pub text: String,
    pub metadata: Metadata,
    /// Set when the record was normalized
    pub collected_at: DateTime<Utc>,
}

/// Three-way sentiment label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SentimentLabel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "positive" => Ok(SentimentLabel::Positive),
            "neutral" => Ok(SentimentLabel::Neutral),
            "negative" => Ok(SentimentLabel::Negative),
            other => Err(format!("unknown sentiment label: {}", other)),
        }
    }
}

/// Sentiment attached during enrichment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    /// Compound score (-1.0 to 1.0)
    pub compound: f64,
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
    pub label: SentimentLabel,
}

/// Topic assignment for one document; only meaningful within its run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicAssignment {
    pub topic_id: usize,
    pub top_terms: Vec<String>,
    /// Weight of the assigned topic in the document's mixture (0.0 - 1.0)
    pub confidence: f64,
}

/// A document carrying both sentiment and topic; the only shape that is stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedDocument {
    #[serde(flatten)]
    pub document: Document,
    pub sentiment: Sentiment,
    pub topic: TopicAssignment,
}

impl EnrichedDocument {
    pub fn fingerprint(&self) -> &str {
        &self.document.fingerprint
    }

    pub fn source_type(&self) -> SourceType {
        self.document.source_type
    }
}
