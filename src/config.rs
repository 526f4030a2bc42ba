//! Configuration management
//!
//! Settings come from a TOML file, an optional separate credentials file and
//! `SENTIMENT__`-prefixed environment variables (later layers win).

use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub reddit: ForumConfig,
    #[serde(default)]
    pub twitter: MicroblogConfig,
    #[serde(default)]
    pub news: HeadlineConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub credentials: Credentials,
}

/// Listing order for subreddit posts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ForumSort {
    #[default]
    Hot,
    New,
    Top,
    Controversial,
}

impl ForumSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForumSort::Hot => "hot",
            ForumSort::New => "new",
            ForumSort::Top => "top",
            ForumSort::Controversial => "controversial",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForumConfig {
    /// Subreddits to pull from
    #[serde(default)]
    pub subreddits: Vec<String>,
    /// Posts per subreddit; 0 disables the source
    #[serde(default)]
    pub posts_per_subreddit: usize,
    #[serde(default)]
    pub sort: ForumSort,
    /// API endpoint
    #[serde(default = "default_reddit_url")]
    pub base_url: String,
}

fn default_reddit_url() -> String {
    "https://oauth.reddit.com".to_string()
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            subreddits: Vec::new(),
            posts_per_subreddit: 0,
            sort: ForumSort::Hot,
            base_url: default_reddit_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MicroblogConfig {
    /// Search terms, each queried separately
    #[serde(default)]
    pub search_terms: Vec<String>,
    /// Posts per term; 0 disables the source
    #[serde(default)]
    pub tweets_per_term: usize,
    #[serde(default)]
    pub include_retweets: bool,
    /// Language filter (e.g. "en")
    #[serde(default = "default_language")]
    pub language: Option<String>,
    #[serde(default = "default_twitter_url")]
    pub base_url: String,
}

fn default_language() -> Option<String> {
    Some("en".to_string())
}

fn default_twitter_url() -> String {
    "https://api.twitter.com".to_string()
}

impl Default for MicroblogConfig {
    fn default() -> Self {
        Self {
            search_terms: Vec::new(),
            tweets_per_term: 0,
            include_retweets: false,
            language: default_language(),
            base_url: default_twitter_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadlineConfig {
    /// Site name -> categories, e.g. bbc = ["business", "technology"]
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
    /// Headlines per (site, category); 0 disables the source
    #[serde(default)]
    pub articles_per_source: usize,
    /// Feed URL templates per site, `{category}` is substituted
    #[serde(default)]
    pub feeds: BTreeMap<String, String>,
    /// Randomized pause between feeds (ms)
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_min_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    3000
}

impl Default for HeadlineConfig {
    fn default() -> Self {
        Self {
            categories: BTreeMap::new(),
            articles_per_source: 0,
            feeds: BTreeMap::new(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl HeadlineConfig {
    /// Feed URL for a site/category, configured template first, then built-ins
    pub fn feed_url(&self, site: &str, category: &str) -> Option<String> {
        let template = match self.feeds.get(site) {
            Some(t) => t.as_str(),
            None => match site {
                "bbc" => "https://feeds.bbci.co.uk/news/{category}/rss.xml",
                "cnn" => "http://rss.cnn.com/rss/edition_{category}.rss",
                "reuters" => "https://www.reutersagency.com/feed/?best-topics={category}",
                "guardian" => "https://www.theguardian.com/{category}/rss",
                _ => return None,
            },
        };
        Some(template.replace("{category}", category))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub path: String,
    /// Table holding enriched documents
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_table() -> String {
    "sentiment_analysis".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentConfig {
    /// Number of topics to fit per run
    #[serde(default = "default_num_topics")]
    pub num_topics: usize,
    /// Vocabulary size cap for the topic model
    #[serde(default = "default_max_features")]
    pub max_features: usize,
    /// Terms reported per topic
    #[serde(default = "default_top_terms")]
    pub top_terms: usize,
    /// Factorization iterations
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Seed for the factorization's initial weights
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_num_topics() -> usize {
    5
}

fn default_max_features() -> usize {
    500
}

fn default_top_terms() -> usize {
    10
}

fn default_iterations() -> usize {
    200
}

fn default_seed() -> u64 {
    42
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            num_topics: default_num_topics(),
            max_features: default_max_features(),
            top_terms: default_top_terms(),
            iterations: default_iterations(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Attempts per page before giving up on a source
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before each retry (ms); the last entry repeats
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: Vec<u64>,
    /// Upper bound on any single wait, including server hints (ms)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Whole-run deadline in seconds
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Parallel upserts during load
    #[serde(default = "default_load_concurrency")]
    pub load_concurrency: usize,
    /// Consecutive connectivity failures before the run is aborted
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: usize,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> Vec<u64> {
    vec![1000, 2000, 4000]
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_load_concurrency() -> usize {
    4
}

fn default_max_consecutive_failures() -> usize {
    5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            run_timeout_secs: None,
            request_timeout_secs: default_request_timeout_secs(),
            load_concurrency: default_load_concurrency(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

/// Opaque per-source tokens, handed to the clients as-is
#[derive(Clone, Deserialize)]
pub struct Credentials {
    /// OAuth bearer token for the forum API
    #[serde(default)]
    pub reddit_token: Option<String>,
    #[serde(default = "default_user_agent")]
    pub reddit_user_agent: String,
    /// Bearer token for the microblog API
    #[serde(default)]
    pub twitter_bearer_token: Option<String>,
}

fn default_user_agent() -> String {
    concat!("sentiment-pipeline/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            reddit_token: None,
            reddit_user_agent: default_user_agent(),
            twitter_bearer_token: None,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("reddit_token", &self.reddit_token.as_ref().map(|_| "***"))
            .field("reddit_user_agent", &self.reddit_user_agent)
            .field(
                "twitter_bearer_token",
                &self.twitter_bearer_token.as_ref().map(|_| "***"),
            )
            .finish()
    }
}

impl Config {
    /// Load configuration from file, optional credentials file, then environment
    pub fn load<P: AsRef<Path>>(path: P, credentials: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::File::from(path.as_ref()));

        if let Some(credentials) = credentials {
            builder = builder.add_source(config::File::from(credentials));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("SENTIMENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations
    pub fn load_default() -> Result<Self> {
        let paths = [
            "config.toml",
            "config/settings.toml",
            "~/.config/sentiment-pipeline/config.toml",
        ];

        for path in paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::load(expanded.as_ref(), None);
            }
        }

        Err(PipelineError::Config("No configuration file found".into()))
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.database.table) {
            return Err(PipelineError::Config(format!(
                "database.table must be a plain identifier, got {:?}",
                self.database.table
            )));
        }
        if self.enrichment.num_topics == 0 {
            return Err(PipelineError::Config(
                "enrichment.num_topics must be at least 1".into(),
            ));
        }
        if self.pipeline.max_attempts == 0 {
            return Err(PipelineError::Config(
                "pipeline.max_attempts must be at least 1".into(),
            ));
        }
        if self.pipeline.load_concurrency == 0 {
            return Err(PipelineError::Config(
                "pipeline.load_concurrency must be at least 1".into(),
            ));
        }
        if self.news.min_delay_ms > self.news.max_delay_ms {
            return Err(PipelineError::Config(
                "news.min_delay_ms must not exceed news.max_delay_ms".into(),
            ));
        }
        Ok(())
    }

    /// Database path with `~` expanded
    pub fn database_path(&self) -> String {
        shellexpand::tilde(&self.database.path).into_owned()
    }
}

/// SQL identifier: letter or underscore, then letters, digits, underscores
pub fn is_identifier(name: &str) -> bool {
    name.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            r#"
            [reddit]
            subreddits = ["news", "worldnews"]
            posts_per_subreddit = 25
            sort = "top"

            [twitter]
            search_terms = ["climate"]
            tweets_per_term = 0
            include_retweets = true

            [news]
            articles_per_source = 10
            [news.categories]
            bbc = ["business", "technology"]

            [database]
            path = "data/sentiment.db"
            "#,
        );

        let config = Config::load(file.path(), None).unwrap();
        assert_eq!(config.reddit.subreddits, vec!["news", "worldnews"]);
        assert_eq!(config.reddit.posts_per_subreddit, 25);
        assert_eq!(config.reddit.sort, ForumSort::Top);
        assert_eq!(config.twitter.tweets_per_term, 0);
        assert!(config.twitter.include_retweets);
        assert_eq!(config.news.categories["bbc"].len(), 2);
        assert_eq!(config.database.table, "sentiment_analysis");
        assert_eq!(config.enrichment.num_topics, 5);
        assert_eq!(config.pipeline.max_attempts, 3);
    }

    #[test]
    fn test_credentials_file_is_layered() {
        let settings = write_config(
            r#"
            [database]
            path = "sentiment.db"
            "#,
        );
        let credentials = write_config(
            r#"
            [credentials]
            twitter_bearer_token = "secret-token"
            "#,
        );

        let config = Config::load(settings.path(), Some(credentials.path())).unwrap();
        assert_eq!(
            config.credentials.twitter_bearer_token.as_deref(),
            Some("secret-token")
        );
        // Never printed in debug output
        assert!(!format!("{:?}", config.credentials).contains("secret-token"));
    }

    #[test]
    fn test_invalid_sort_rejected() {
        let file = write_config(
            r#"
            [reddit]
            sort = "best"

            [database]
            path = "sentiment.db"
            "#,
        );

        let err = Config::load(file.path(), None).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_table_name_must_be_identifier() {
        let file = write_config(
            r#"
            [database]
            path = "sentiment.db"
            table = "docs; DROP TABLE x"
            "#,
        );

        let err = Config::load(file.path(), None).unwrap_err();
        assert!(err.to_string().contains("database.table"));
    }

    #[test]
    fn test_zero_topics_rejected() {
        let file = write_config(
            r#"
            [database]
            path = "sentiment.db"

            [enrichment]
            num_topics = 0
            "#,
        );

        assert!(Config::load(file.path(), None).is_err());
    }

    #[test]
    fn test_feed_url_templates() {
        let mut news = HeadlineConfig::default();
        assert_eq!(
            news.feed_url("bbc", "business").as_deref(),
            Some("https://feeds.bbci.co.uk/news/business/rss.xml")
        );
        assert!(news.feed_url("unknown-site", "world").is_none());

        news.feeds
            .insert("local".to_string(), "http://localhost/{category}.xml".to_string());
        assert_eq!(
            news.feed_url("local", "world").as_deref(),
            Some("http://localhost/world.xml")
        );
    }

    #[test]
    fn test_pipeline_defaults() {
        let pipeline = PipelineConfig::default();
        assert_eq!(pipeline.backoff_ms, vec![1000, 2000, 4000]);
        assert_eq!(pipeline.max_consecutive_failures, 5);
        assert!(pipeline.run_timeout_secs.is_none());
    }
}
