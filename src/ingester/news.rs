//! News headlines from RSS/Atom feeds
//!
//! One feed per (site, category) pair. Feeds are fetched one after another
//! with a randomized pause in between to stay polite to the publishers.

use super::{check_status, BatchSource, FetchContext, FetchOutcome, HeadlineItem, RawRecord, RetryPolicy};
use crate::config::HeadlineConfig;
use crate::error::{PipelineError, Result};
use crate::types::SourceType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

/// Parsed feed entry before it is tied to a site and category
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub url: Option<String>,
    pub title: String,
    pub summary: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Feed retrieval used by [`HeadlineAdapter`]
#[async_trait]
pub trait FeedApi: Send + Sync {
    async fn fetch_feed(&self, url: &str) -> Result<Vec<FeedEntry>>;
}

/// Fetches feeds over HTTP and parses them with feed-rs
pub struct HttpFeedClient {
    http: reqwest::Client,
}

impl HttpFeedClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("sentiment-pipeline/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }
}

/// Parse an RSS/Atom document into entries
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedEntry>> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| PipelineError::Feed(e.to_string()))?;

    Ok(feed
        .entries
        .into_iter()
        .map(|entry| {
            let url = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()));

            let summary = entry
                .summary
                .map(|t| t.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();

            FeedEntry {
                url,
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                summary,
                published_at: entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.with_timezone(&Utc)),
            }
        })
        .collect())
}

#[async_trait]
impl FeedApi for HttpFeedClient {
    async fn fetch_feed(&self, url: &str) -> Result<Vec<FeedEntry>> {
        let resp = check_status(self.http.get(url).send().await?).await?;
        let bytes = resp.bytes().await?;
        parse_feed(&bytes[..])
    }
}

/// Headline source: latest N items from each site/category feed
pub struct HeadlineAdapter {
    config: HeadlineConfig,
    api: Arc<dyn FeedApi>,
    retry: RetryPolicy,
}

impl HeadlineAdapter {
    pub fn new(config: HeadlineConfig, api: Arc<dyn FeedApi>, retry: RetryPolicy) -> Self {
        Self { config, api, retry }
    }

    fn politeness_delay(&self) -> Duration {
        let (min, max) = (self.config.min_delay_ms, self.config.max_delay_ms);
        if max == 0 || min > max {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

#[async_trait]
impl BatchSource for HeadlineAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Headline
    }

    async fn fetch_batch(&self, ctx: &FetchContext) -> FetchOutcome {
        let mut outcome = FetchOutcome::empty();
        let wanted = self.config.articles_per_source;
        if wanted == 0 || self.config.categories.is_empty() {
            tracing::info!("Headline source disabled, skipping");
            return outcome;
        }

        let mut first = true;
        'feeds: for (site, categories) in &self.config.categories {
            for category in categories {
                let label = format!("{}/{}", site, category);
                let Some(url) = self.config.feed_url(site, category) else {
                    let err = PipelineError::Validation(format!("no feed known for site {:?}", site));
                    if let ControlFlow::Break(()) = outcome.absorb(SourceType::Headline, &label, err) {
                        break 'feeds;
                    }
                    continue;
                };

                if !first {
                    let delay = self.politeness_delay();
                    if ctx.remaining().is_some_and(|r| delay >= r) {
                        outcome.deadline_reached(SourceType::Headline);
                        break 'feeds;
                    }
                    tokio::time::sleep(delay).await;
                }
                first = false;

                if ctx.expired() {
                    outcome.deadline_reached(SourceType::Headline);
                    break 'feeds;
                }

                tracing::debug!("Fetching feed {}", url);
                let entries = self
                    .retry
                    .run(&label, ctx, |_| self.api.fetch_feed(&url))
                    .await;

                match entries {
                    Ok(entries) => {
                        outcome.records.extend(
                            entries
                                .into_iter()
                                .take(wanted)
                                .map(|e| {
                                    RawRecord::Headline(HeadlineItem {
                                        url: e.url,
                                        title: e.title,
                                        summary: e.summary,
                                        source_name: site.clone(),
                                        category: category.clone(),
                                        published_at: e.published_at,
                                    })
                                }),
                        );
                    }
                    Err(e) => {
                        if let ControlFlow::Break(()) = outcome.absorb(SourceType::Headline, &label, e) {
                            break 'feeds;
                        }
                    }
                }
            }
        }

        tracing::info!("Headline source fetched {} items", outcome.records.len());
        outcome
    }
}
