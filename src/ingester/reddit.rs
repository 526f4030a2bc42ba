//! Reddit subreddit listings
//!
//! Pages through `/r/{subreddit}/{sort}` with the `after` cursor until the
//! per-subreddit count is reached.

use super::{check_status, BatchSource, FetchContext, FetchOutcome, ForumPost, RawRecord, RetryPolicy};
use crate::config::{ForumConfig, ForumSort};
use crate::error::Result;
use crate::types::SourceType;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

/// Listing API page size limit
const MAX_PAGE_SIZE: usize = 100;

/// One listing page
#[derive(Debug, Clone, Default)]
pub struct ForumPage {
    pub posts: Vec<ForumPost>,
    /// Cursor for the next page, absent on the last one
    pub after: Option<String>,
}

/// Listing endpoint used by [`ForumAdapter`]
#[async_trait]
pub trait ForumApi: Send + Sync {
    async fn listing(
        &self,
        subreddit: &str,
        sort: ForumSort,
        limit: usize,
        after: Option<&str>,
    ) -> Result<ForumPage>;
}

/// HTTP client for the Reddit API
pub struct RedditClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl RedditClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: PostData,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    author: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
    url: Option<String>,
    created_utc: Option<f64>,
}

impl From<PostData> for ForumPost {
    fn from(p: PostData) -> Self {
        ForumPost {
            created_at: p
                .created_utc
                .and_then(|ts| Utc.timestamp_opt(ts as i64, 0).single()),
            id: p.id,
            subreddit: p.subreddit,
            title: p.title,
            body: p.selftext,
            author: p.author,
            score: p.score,
            num_comments: p.num_comments,
            url: p.url,
        }
    }
}

#[async_trait]
impl ForumApi for RedditClient {
    async fn listing(
        &self,
        subreddit: &str,
        sort: ForumSort,
        limit: usize,
        after: Option<&str>,
    ) -> Result<ForumPage> {
        let url = format!("{}/r/{}/{}", self.base_url, subreddit, sort.as_str());

        let mut query = vec![
            ("limit", limit.to_string()),
            ("raw_json", "1".to_string()),
        ];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        let mut req = self.http.get(&url).query(&query);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = check_status(req.send().await?).await?;
        let listing: Listing = resp.json().await?;

        Ok(ForumPage {
            posts: listing
                .data
                .children
                .into_iter()
                .map(|c| ForumPost::from(c.data))
                .collect(),
            after: listing.data.after,
        })
    }
}

/// Forum source: top-N posts from each configured subreddit
pub struct ForumAdapter {
    config: ForumConfig,
    api: Arc<dyn ForumApi>,
    retry: RetryPolicy,
}

impl ForumAdapter {
    pub fn new(config: ForumConfig, api: Arc<dyn ForumApi>, retry: RetryPolicy) -> Self {
        Self { config, api, retry }
    }
}

#[async_trait]
impl BatchSource for ForumAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Forum
    }

    async fn fetch_batch(&self, ctx: &FetchContext) -> FetchOutcome {
        let mut outcome = FetchOutcome::empty();
        let wanted = self.config.posts_per_subreddit;
        if wanted == 0 || self.config.subreddits.is_empty() {
            tracing::info!("Forum source disabled, skipping");
            return outcome;
        }

        tracing::info!(
            "Fetching {} {} posts from {} subreddits",
            wanted,
            self.config.sort.as_str(),
            self.config.subreddits.len()
        );

        'subreddits: for subreddit in &self.config.subreddits {
            let mut remaining = wanted;
            let mut after: Option<String> = None;

            while remaining > 0 {
                if ctx.expired() {
                    outcome.deadline_reached(SourceType::Forum);
                    break 'subreddits;
                }

                let limit = remaining.min(MAX_PAGE_SIZE);
                let label = format!("r/{}", subreddit);
                let page = self
                    .retry
                    .run(&label, ctx, |_| {
                        self.api
                            .listing(subreddit, self.config.sort, limit, after.as_deref())
                    })
                    .await;

                match page {
                    Ok(page) => {
                        let got = page.posts.len().min(remaining);
                        remaining -= got;
                        outcome.records.extend(
                            page.posts
                                .into_iter()
                                .take(got)
                                .map(RawRecord::Forum),
                        );
                        match page.after {
                            Some(cursor) if got > 0 => after = Some(cursor),
                            _ => break,
                        }
                    }
                    Err(e) => match outcome.absorb(SourceType::Forum, &label, e) {
                        ControlFlow::Break(()) => break 'subreddits,
                        ControlFlow::Continue(()) => break,
                    },
                }
            }
        }

        tracing::info!("Forum source fetched {} posts", outcome.records.len());
        outcome
    }
}
