//! Raw record normalization
//!
//! Turns source-specific records into canonical [`Document`]s: markup is
//! stripped, whitespace collapsed, and a stable fingerprint computed. Exact
//! fingerprint repeats within a run are dropped.

use crate::ingester::{ForumPost, HeadlineItem, MicroblogPost, RawRecord};
use crate::types::{Document, Metadata, SourceType};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

/// Widest line html2text may emit; long enough that it never breaks words
const RENDER_WIDTH: usize = 10_000;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("valid regex"));
static MD_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]*)\](?:\([^)]*\)|\[\d+\])").expect("valid regex")
});
static FOOTNOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\[\d+\]: \S*$").expect("valid regex"));
static EMPHASIS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*+|`").expect("valid regex"));
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Render HTML to text, strip markdown links and emphasis, collapse whitespace.
///
/// Entity-escaped markup (`&lt;p&gt;`) decodes into tags on the first render,
/// so it gets a second one.
pub fn clean_text(raw: &str) -> String {
    let mut text = render(raw);
    if TAG_RE.is_match(&text) {
        text = render(&text);
    }

    let text = FOOTNOTE_RE.replace_all(&text, " ");
    let text = MD_LINK_RE.replace_all(&text, "$1");
    let text = EMPHASIS_RE.replace_all(&text, "");
    WS_RE.replace_all(&text, " ").trim().to_string()
}

fn render(html: &str) -> String {
    html2text::from_read(html.as_bytes(), RENDER_WIDTH).unwrap_or_else(|e| {
        tracing::debug!("html2text failed, keeping raw text: {}", e);
        html.to_string()
    })
}

/// Hex SHA-256 over the source and native id, or the normalized text when
/// the record has no id of its own
pub fn fingerprint(source: SourceType, native_id: Option<&str>, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_str().as_bytes());
    match native_id {
        Some(id) => {
            hasher.update(b":id:");
            hasher.update(id.as_bytes());
        }
        None => {
            hasher.update(b":text:");
            hasher.update(text.to_lowercase().as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

/// Result of normalizing one record
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Document(Document),
    /// No analyzable text left after stripping
    Skipped,
    /// Fingerprint already seen this run
    Duplicate(String),
}

/// Per-source normalization counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub normalized: usize,
    pub skipped: usize,
    pub duplicates: usize,
}

/// Run-scoped normalizer; remembers fingerprints it has emitted
#[derive(Debug, Default)]
pub struct Normalizer {
    seen: HashSet<String>,
    stats: BTreeMap<SourceType, NormalizeStats>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&mut self, record: RawRecord) -> Normalized {
        let source = record.source_type();
        let (native_id, text, metadata) = match record {
            RawRecord::Forum(post) => forum_parts(post),
            RawRecord::Microblog(post) => microblog_parts(post),
            RawRecord::Headline(item) => headline_parts(item),
        };

        let stats = self.stats.entry(source).or_default();

        if text.is_empty() {
            stats.skipped += 1;
            tracing::debug!("Skipping empty {} record {:?}", source, native_id);
            return Normalized::Skipped;
        }

        let fp = fingerprint(source, native_id.as_deref(), &text);
        if !self.seen.insert(fp.clone()) {
            stats.duplicates += 1;
            return Normalized::Duplicate(fp);
        }

        stats.normalized += 1;
        Normalized::Document(Document {
            fingerprint: fp,
            source_type: source,
            native_id,
            text,
            metadata,
            collected_at: Utc::now(),
        })
    }

    /// Normalize a batch, keeping only new documents
    pub fn normalize_all(&mut self, records: Vec<RawRecord>) -> Vec<Document> {
        records
            .into_iter()
            .filter_map(|r| match self.normalize(r) {
                Normalized::Document(doc) => Some(doc),
                _ => None,
            })
            .collect()
    }

    pub fn stats(&self, source: SourceType) -> NormalizeStats {
        self.stats.get(&source).copied().unwrap_or_default()
    }
}

fn timestamp(ts: Option<DateTime<Utc>>) -> serde_json::Value {
    ts.map(|t| json!(t.to_rfc3339())).unwrap_or(serde_json::Value::Null)
}

fn forum_parts(post: ForumPost) -> (Option<String>, String, Metadata) {
    let title = clean_text(&post.title);
    let body = clean_text(&post.body);
    let text = match (title.is_empty(), body.is_empty()) {
        (false, false) => format!("{}\n\n{}", title, body),
        (false, true) => title.clone(),
        (true, _) => body,
    };

    let mut metadata = Metadata::new();
    metadata.insert("subreddit".into(), json!(post.subreddit));
    metadata.insert("title".into(), json!(title));
    metadata.insert("author".into(), json!(post.author));
    metadata.insert("score".into(), json!(post.score));
    metadata.insert("num_comments".into(), json!(post.num_comments));
    metadata.insert("url".into(), json!(post.url));
    metadata.insert("created_at".into(), timestamp(post.created_at));

    (non_empty(post.id), text, metadata)
}

fn microblog_parts(post: MicroblogPost) -> (Option<String>, String, Metadata) {
    let text = clean_text(&post.text);

    let mut metadata = Metadata::new();
    metadata.insert("search_term".into(), json!(post.search_term));
    metadata.insert("author_id".into(), json!(post.author_id));
    metadata.insert("author".into(), json!(post.author_username));
    metadata.insert("language".into(), json!(post.language));
    metadata.insert("created_at".into(), timestamp(post.created_at));
    metadata.insert("retweet_count".into(), json!(post.metrics.retweet_count));
    metadata.insert("reply_count".into(), json!(post.metrics.reply_count));
    metadata.insert("like_count".into(), json!(post.metrics.like_count));
    metadata.insert("quote_count".into(), json!(post.metrics.quote_count));

    (non_empty(post.id), text, metadata)
}

fn headline_parts(item: HeadlineItem) -> (Option<String>, String, Metadata) {
    let title = clean_text(&item.title);
    let summary = clean_text(&item.summary);
    let text = match (title.is_empty(), summary.is_empty()) {
        (false, false) if summary != title => format!("{}. {}", title.trim_end_matches('.'), summary),
        (false, _) => title.clone(),
        (true, _) => summary,
    };

    let mut metadata = Metadata::new();
    metadata.insert("site".into(), json!(item.source_name));
    metadata.insert("category".into(), json!(item.category));
    metadata.insert("title".into(), json!(title));
    metadata.insert("url".into(), json!(item.url));
    metadata.insert("published_at".into(), timestamp(item.published_at));

    let native_id = item.url.and_then(non_empty);
    (native_id, text, metadata)
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
