//! Twitter/X recent search
//!
//! Each configured term is searched through API v2 `tweets/search/recent`,
//! paging with `next_token` until the per-term count is reached.

use super::{
    check_status, BatchSource, FetchContext, FetchOutcome, MicroblogPost, PostMetrics, RawRecord,
    RetryPolicy,
};
use crate::config::MicroblogConfig;
use crate::error::Result;
use crate::types::SourceType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

/// Search endpoint bounds on `max_results`
const MIN_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub posts: Vec<MicroblogPost>,
    pub next_token: Option<String>,
}

/// Search endpoint used by [`MicroblogAdapter`]
#[async_trait]
pub trait MicroblogApi: Send + Sync {
    /// `query` is the full search expression including operators
    async fn search(
        &self,
        term: &str,
        query: &str,
        max_results: usize,
        next_token: Option<&str>,
    ) -> Result<SearchPage>;
}

/// Twitter API v2 client
pub struct TwitterClient {
    base_url: String,
    bearer_token: Option<String>,
    http: reqwest::Client,
}

impl TwitterClient {
    pub fn new(base_url: &str, bearer_token: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token,
            http,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Tweet>,
    #[serde(default)]
    includes: Includes,
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    author_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
    lang: Option<String>,
    #[serde(default)]
    public_metrics: PostMetrics,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    username: String,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    next_token: Option<String>,
}

#[async_trait]
impl MicroblogApi for TwitterClient {
    async fn search(
        &self,
        term: &str,
        query: &str,
        max_results: usize,
        next_token: Option<&str>,
    ) -> Result<SearchPage> {
        let url = format!("{}/2/tweets/search/recent", self.base_url);

        let mut params = vec![
            ("query", query.to_string()),
            ("max_results", max_results.to_string()),
            ("tweet.fields", "created_at,author_id,lang,public_metrics".to_string()),
            ("expansions", "author_id".to_string()),
            ("user.fields", "username".to_string()),
        ];
        if let Some(token) = next_token {
            params.push(("next_token", token.to_string()));
        }

        let mut req = self.http.get(&url).query(&params);
        if let Some(bearer) = &self.bearer_token {
            req = req.bearer_auth(bearer);
        }

        let resp = check_status(req.send().await?).await?;
        let body: SearchResponse = resp.json().await?;

        let usernames: HashMap<String, String> = body
            .includes
            .users
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect();

        let posts = body
            .data
            .into_iter()
            .map(|t| MicroblogPost {
                author_username: t
                    .author_id
                    .as_ref()
                    .and_then(|id| usernames.get(id).cloned()),
                id: t.id,
                text: t.text,
                author_id: t.author_id,
                created_at: t.created_at,
                search_term: term.to_string(),
                language: t.lang,
                metrics: t.public_metrics,
            })
            .collect();

        Ok(SearchPage {
            posts,
            next_token: body.meta.next_token,
        })
    }
}

/// Microblog source: N most recent posts per search term
pub struct MicroblogAdapter {
    config: MicroblogConfig,
    api: Arc<dyn MicroblogApi>,
    retry: RetryPolicy,
}

impl MicroblogAdapter {
    pub fn new(config: MicroblogConfig, api: Arc<dyn MicroblogApi>, retry: RetryPolicy) -> Self {
        Self { config, api, retry }
    }

    /// Search expression for a term with retweet and language filters
    pub fn build_query(&self, term: &str) -> String {
        let mut query = if term.contains(' ') && !term.starts_with('"') {
            format!("\"{}\"", term)
        } else {
            term.to_string()
        };
        if !self.config.include_retweets {
            query.push_str(" -is:retweet");
        }
        if let Some(lang) = self.config.language.as_deref().filter(|l| !l.is_empty()) {
            query.push_str(" lang:");
            query.push_str(lang);
        }
        query
    }
}

#[async_trait]
impl BatchSource for MicroblogAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Microblog
    }

    async fn fetch_batch(&self, ctx: &FetchContext) -> FetchOutcome {
        let mut outcome = FetchOutcome::empty();
        let wanted = self.config.tweets_per_term;
        if wanted == 0 || self.config.search_terms.is_empty() {
            tracing::info!("Microblog source disabled, skipping");
            return outcome;
        }

        tracing::info!(
            "Searching {} terms, {} posts each",
            self.config.search_terms.len(),
            wanted
        );

        'terms: for term in &self.config.search_terms {
            let query = self.build_query(term);
            let mut remaining = wanted;
            let mut next_token: Option<String> = None;

            while remaining > 0 {
                if ctx.expired() {
                    outcome.deadline_reached(SourceType::Microblog);
                    break 'terms;
                }

                let max_results = remaining.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
                let label = format!("search {:?}", term);
                let page = self
                    .retry
                    .run(&label, ctx, |_| {
                        self.api
                            .search(term, &query, max_results, next_token.as_deref())
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
                                .map(RawRecord::Microblog),
                        );
                        match page.next_token {
                            Some(token) if got > 0 => next_token = Some(token),
                            _ => break,
                        }
                    }
                    Err(e) => match outcome.absorb(SourceType::Microblog, &label, e) {
                        ControlFlow::Break(()) => break 'terms,
                        ControlFlow::Continue(()) => break,
                    },
                }
            }
        }

        tracing::info!("Microblog source fetched {} posts", outcome.records.len());
        outcome
    }
}
