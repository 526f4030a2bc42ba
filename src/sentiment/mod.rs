//! Sentiment scoring
//!
//! A [`SentimentScorer`] turns text into polarity proportions and a compound
//! score; [`label_for`] buckets the compound into a three-way label with
//! fixed symmetric thresholds.

pub mod sentiment_analyzer;

pub use sentiment_analyzer::{SentimentAnalyzer, SentimentResult};

use crate::error::Result;
use crate::types::{Sentiment, SentimentLabel};

/// Compound at or above this is positive
pub const POSITIVE_THRESHOLD: f64 = 0.05;
/// Compound at or below this is negative
pub const NEGATIVE_THRESHOLD: f64 = -0.05;

/// Pluggable text scorer used during enrichment
#[cfg_attr(test, mockall::automock)]
pub trait SentimentScorer: Send + Sync {
    fn score(&self, text: &str) -> Result<SentimentResult>;
}

/// Three-way label for a compound score; both boundaries inclusive
pub fn label_for(compound: f64) -> SentimentLabel {
    if compound >= POSITIVE_THRESHOLD {
        SentimentLabel::Positive
    } else if compound <= NEGATIVE_THRESHOLD {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    }
}

impl From<SentimentResult> for Sentiment {
    fn from(result: SentimentResult) -> Self {
        let compound = if result.compound.is_nan() {
            0.0
        } else {
            result.compound.clamp(-1.0, 1.0)
        };
        Sentiment {
            compound,
            positive: result.positive.clamp(0.0, 1.0),
            neutral: result.neutral.clamp(0.0, 1.0),
            negative: result.negative.clamp(0.0, 1.0),
            label: label_for(compound),
        }
    }
}
