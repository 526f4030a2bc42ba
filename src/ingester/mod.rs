//! Raw record ingestion from external sources
//!
//! Collects short-form text from:
//! - Reddit (subreddit listings)
//! - Twitter/X (recent search)
//! - News sites (RSS/Atom headline feeds)
//!
//! Each source is one variant of [`SourceAdapter`]. Adapters never fail the
//! run: page failures are absorbed into the [`FetchOutcome`].

pub mod news;
pub mod reddit;
pub mod retry;
pub mod twitter;


pub use news::{FeedApi, FeedEntry, HeadlineAdapter, HttpFeedClient};
pub use reddit::{ForumAdapter, ForumApi, ForumPage, RedditClient};
pub use retry::RetryPolicy;
pub use twitter::{MicroblogAdapter, MicroblogApi, SearchPage, TwitterClient};

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::types::SourceType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::time::Instant;

/// Subreddit post as returned by the listing API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumPost {
    pub id: String,
    pub subreddit: String,
    pub title: String,
    /// Self text, may contain markup
    pub body: String,
    pub author: Option<String>,
    pub score: i64,
    pub num_comments: u64,
    pub url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Engagement counters on a microblog post
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PostMetrics {
    pub retweet_count: u64,
    pub reply_count: u64,
    pub like_count: u64,
    pub quote_count: u64,
}

/// Microblog post from a term search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroblogPost {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub author_username: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Term this post was found with
    pub search_term: String,
    pub language: Option<String>,
    pub metrics: PostMetrics,
}

/// News headline from a site feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadlineItem {
    pub url: Option<String>,
    pub title: String,
    pub summary: String,
    /// Site the feed belongs to (bbc, cnn, ...)
    pub source_name: String,
    pub category: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Source-specific record, discarded after normalization
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    Forum(ForumPost),
    Microblog(MicroblogPost),
    Headline(HeadlineItem),
}

impl RawRecord {
    pub fn source_type(&self) -> SourceType {
        match self {
            RawRecord::Forum(_) => SourceType::Forum,
            RawRecord::Microblog(_) => SourceType::Microblog,
            RawRecord::Headline(_) => SourceType::Headline,
        }
    }
}

/// Per-run fetch context shared by all adapters
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchContext {
    /// No new page is requested past this instant
    pub deadline: Option<Instant>,
}

impl FetchContext {
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, if one is set
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// What an adapter produced in one run
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<RawRecord>,
    /// Failures absorbed while fetching
    pub errors: Vec<PipelineError>,
    /// Fetching stopped before the configured count was reached
    pub partial: bool,
}

impl FetchOutcome {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Record a page failure. Exhausted retries and deadlines stop the
    /// adapter; anything else only abandons the current sub-query.
    pub(crate) fn absorb(&mut self, source: SourceType, query: &str, err: PipelineError) -> ControlFlow<()> {
        let stop = err.is_transient() || matches!(err, PipelineError::Timeout);
        if stop {
            tracing::warn!(
                "{} fetch stopped at {} after retries: {} ({} records kept)",
                source,
                query,
                err,
                self.records.len()
            );
            self.partial = true;
            self.errors.push(err);
            ControlFlow::Break(())
        } else {
            tracing::warn!("{} fetch skipped {}: {}", source, query, err);
            self.errors.push(err);
            ControlFlow::Continue(())
        }
    }

    /// Stop because the run deadline passed
    pub(crate) fn deadline_reached(&mut self, source: SourceType) {
        tracing::warn!("{} fetch stopped: run deadline reached", source);
        self.partial = true;
        self.errors.push(PipelineError::Timeout);
    }
}

/// Capability shared by every source: produce one bounded batch of raw records
#[async_trait]
pub trait BatchSource: Send + Sync {
    fn source_type(&self) -> SourceType;

    /// Fetch up to the configured count. Never fails; failures land in the outcome.
    async fn fetch_batch(&self, ctx: &FetchContext) -> FetchOutcome;
}

/// Closed set of source adapters
pub enum SourceAdapter {
    Forum(ForumAdapter),
    Microblog(MicroblogAdapter),
    Headline(HeadlineAdapter),
}

impl SourceAdapter {
    /// Build all three adapters with HTTP clients from configuration
    pub fn from_config(config: &Config) -> Result<Vec<SourceAdapter>> {
        let retry = RetryPolicy::from_config(&config.pipeline);
        let timeout = Duration::from_secs(config.pipeline.request_timeout_secs);

        let reddit = RedditClient::new(
            &config.reddit.base_url,
            config.credentials.reddit_token.clone(),
            &config.credentials.reddit_user_agent,
            timeout,
        )?;
        let twitter = TwitterClient::new(
            &config.twitter.base_url,
            config.credentials.twitter_bearer_token.clone(),
            timeout,
        )?;
        let feeds = HttpFeedClient::new(timeout)?;

        Ok(vec![
            SourceAdapter::Forum(ForumAdapter::new(
                config.reddit.clone(),
                std::sync::Arc::new(reddit),
                retry.clone(),
            )),
            SourceAdapter::Microblog(MicroblogAdapter::new(
                config.twitter.clone(),
                std::sync::Arc::new(twitter),
                retry.clone(),
            )),
            SourceAdapter::Headline(HeadlineAdapter::new(
                config.news.clone(),
                std::sync::Arc::new(feeds),
                retry,
            )),
        ])
    }
}

#[async_trait]
impl BatchSource for SourceAdapter {
    fn source_type(&self) -> SourceType {
        match self {
            SourceAdapter::Forum(a) => a.source_type(),
            SourceAdapter::Microblog(a) => a.source_type(),
            SourceAdapter::Headline(a) => a.source_type(),
        }
    }

    async fn fetch_batch(&self, ctx: &FetchContext) -> FetchOutcome {
        match self {
            SourceAdapter::Forum(a) => a.fetch_batch(ctx).await,
            SourceAdapter::Microblog(a) => a.fetch_batch(ctx).await,
            SourceAdapter::Headline(a) => a.fetch_batch(ctx).await,
        }
    }
}

/// Map non-success HTTP responses to pipeline errors
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    if status.as_u16() == 429 {
        let retry_after_secs = retry_after_hint(resp.headers()).unwrap_or(0);
        return Err(PipelineError::RateLimited { retry_after_secs });
    }

    let body = resp.text().await.unwrap_or_default();
    Err(PipelineError::Api {
        status: status.as_u16(),
        message: body.chars().take(500).collect(),
    })
}

/// Seconds to wait according to rate-limit headers
fn retry_after_hint(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
    };

    if let Some(secs) = get("retry-after").and_then(|s| s.parse::<u64>().ok()) {
        return Some(secs);
    }
    // Reddit: seconds until the window resets (may be fractional)
    if let Some(secs) = get("x-ratelimit-reset").and_then(|s| s.parse::<f64>().ok()) {
        return Some(secs.ceil().max(0.0) as u64);
    }
    // Twitter: epoch seconds of the reset
    if let Some(epoch) = get("x-rate-limit-reset").and_then(|s| s.parse::<i64>().ok()) {
        let now = Utc::now().timestamp();
        return Some((epoch - now).max(0) as u64);
    }
    None
}
