//! Enriched document storage
//!
//! [`DocumentStore`] is keyed by fingerprint: writing a fingerprint that is
//! already stored overwrites its mutable fields instead of adding a row.

pub mod memory;

#[cfg(test)]
mod tests;

pub use memory::MemoryStore;

use crate::error::{PipelineError, Result};
use crate::types::{
    Document, EnrichedDocument, Metadata, Sentiment, SentimentLabel, SourceType, TopicAssignment,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;

/// Whether an upsert created or replaced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Aggregate sentiment for one source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStats {
    pub source_type: SourceType,
    pub documents: u64,
    pub avg_compound: f64,
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fail fast when the backing store cannot be reached
    async fn ping(&self) -> Result<()>;

    async fn upsert(&self, doc: &EnrichedDocument) -> Result<UpsertOutcome>;

    async fn get(&self, fingerprint: &str) -> Result<Option<EnrichedDocument>>;

    async fn count(&self) -> Result<u64>;

    /// Per-source document counts and average compound sentiment
    async fn stats_by_source(&self) -> Result<Vec<SourceStats>>;

    /// Most recently collected documents first
    async fn recent(&self, limit: usize) -> Result<Vec<EnrichedDocument>>;
}

/// SQLite-backed store
pub struct SqliteStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteStore {
    /// Connect to SQLite database (creates if not exists)
    pub async fn connect<P: AsRef<Path>>(path: P, table: &str) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PipelineError::StorageUnavailable(format!(
                        "cannot create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let db_url = format!("sqlite:{}?mode=rwc", path.as_ref().display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        Self::with_pool(pool, table).await
    }

    /// Private in-memory database; one connection so every query sees the same data
    pub async fn in_memory(table: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::with_pool(pool, table).await
    }

    async fn with_pool(pool: SqlitePool, table: &str) -> Result<Self> {
        if !crate::config::is_identifier(table) {
            return Err(PipelineError::Config(format!(
                "invalid table name {:?}",
                table
            )));
        }

        let store = Self {
            pool,
            table: table.to_string(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                fingerprint TEXT PRIMARY KEY,
                source_type TEXT NOT NULL,
                native_id TEXT,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL,
                collected_at TEXT NOT NULL,
                sentiment_compound REAL NOT NULL,
                sentiment_positive REAL NOT NULL,
                sentiment_neutral REAL NOT NULL,
                sentiment_negative REAL NOT NULL,
                sentiment_label TEXT NOT NULL,
                topic_id INTEGER NOT NULL,
                topic_confidence REAL NOT NULL,
                topic_keywords TEXT NOT NULL,
                first_seen_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                revision INTEGER NOT NULL DEFAULT 0
            )
            "#,
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_source ON {table} (source_type)",
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_collected ON {table} (collected_at)",
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    const COLUMNS: &'static str = "fingerprint, source_type, native_id, text, metadata, collected_at, \
        sentiment_compound, sentiment_positive, sentiment_neutral, sentiment_negative, \
        sentiment_label, topic_id, topic_confidence, topic_keywords";
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert(&self, doc: &EnrichedDocument) -> Result<UpsertOutcome> {
        let metadata = serde_json::to_string(&doc.document.metadata)?;
        let keywords = serde_json::to_string(&doc.topic.top_terms)?;
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let (revision,): (i64,) = sqlx::query_as(&format!(
            r#"
            INSERT INTO {table} ({columns}, first_seen_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(fingerprint) DO UPDATE SET
                native_id = excluded.native_id,
                text = excluded.text,
                metadata = excluded.metadata,
                collected_at = excluded.collected_at,
                sentiment_compound = excluded.sentiment_compound,
                sentiment_positive = excluded.sentiment_positive,
                sentiment_neutral = excluded.sentiment_neutral,
                sentiment_negative = excluded.sentiment_negative,
                sentiment_label = excluded.sentiment_label,
                topic_id = excluded.topic_id,
                topic_confidence = excluded.topic_confidence,
                topic_keywords = excluded.topic_keywords,
                updated_at = excluded.updated_at,
                revision = revision + 1
            RETURNING revision
            "#,
            table = self.table,
            columns = Self::COLUMNS
        ))
        .bind(doc.fingerprint())
        .bind(doc.source_type().as_str())
        .bind(doc.document.native_id.as_deref())
        .bind(&doc.document.text)
        .bind(metadata)
        .bind(doc.document.collected_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .bind(doc.sentiment.compound)
        .bind(doc.sentiment.positive)
        .bind(doc.sentiment.neutral)
        .bind(doc.sentiment.negative)
        .bind(doc.sentiment.label.as_str())
        .bind(doc.topic.topic_id as i64)
        .bind(doc.topic.confidence)
        .bind(keywords)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(if revision > 0 {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    async fn get(&self, fingerprint: &str) -> Result<Option<EnrichedDocument>> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM {} WHERE fingerprint = ?",
            Self::COLUMNS,
            self.table
        ))
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EnrichedDocument::try_from).transpose()
    }

    async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn stats_by_source(&self) -> Result<Vec<SourceStats>> {
        let rows: Vec<(String, i64, f64, i64, i64, i64)> = sqlx::query_as(&format!(
            r#"
            SELECT source_type,
                   COUNT(*),
                   AVG(sentiment_compound),
                   SUM(CASE WHEN sentiment_label = 'positive' THEN 1 ELSE 0 END),
                   SUM(CASE WHEN sentiment_label = 'neutral' THEN 1 ELSE 0 END),
                   SUM(CASE WHEN sentiment_label = 'negative' THEN 1 ELSE 0 END)
            FROM {}
            GROUP BY source_type
            ORDER BY source_type
            "#,
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut stats = rows
            .into_iter()
            .map(|(source, documents, avg, positive, neutral, negative)| {
                Ok(SourceStats {
                    source_type: source.parse().map_err(PipelineError::Validation)?,
                    documents: documents.max(0) as u64,
                    avg_compound: avg,
                    positive: positive.max(0) as u64,
                    neutral: neutral.max(0) as u64,
                    negative: negative.max(0) as u64,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        stats.sort_by_key(|s| s.source_type);
        Ok(stats)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<EnrichedDocument>> {
        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM {} ORDER BY collected_at DESC, fingerprint LIMIT ?",
            Self::COLUMNS,
            self.table
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EnrichedDocument::try_from).collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    fingerprint: String,
    source_type: String,
    native_id: Option<String>,
    text: String,
    metadata: String,
    collected_at: String,
    sentiment_compound: f64,
    sentiment_positive: f64,
    sentiment_neutral: f64,
    sentiment_negative: f64,
    sentiment_label: String,
    topic_id: i64,
    topic_confidence: f64,
    topic_keywords: String,
}

impl TryFrom<DocumentRow> for EnrichedDocument {
    type Error = PipelineError;

    fn try_from(row: DocumentRow) -> Result<Self> {
        let source_type: SourceType = row.source_type.parse().map_err(PipelineError::Validation)?;
        let label: SentimentLabel = row.sentiment_label.parse().map_err(PipelineError::Validation)?;
        let metadata: Metadata = serde_json::from_str(&row.metadata)?;
        let top_terms: Vec<String> = serde_json::from_str(&row.topic_keywords)?;
        let collected_at = DateTime::parse_from_rfc3339(&row.collected_at)
            .map_err(|e| PipelineError::Validation(format!("bad collected_at: {}", e)))?
            .with_timezone(&Utc);

        Ok(EnrichedDocument {
            document: Document {
                fingerprint: row.fingerprint,
                source_type,
                native_id: row.native_id,
                text: row.text,
                metadata,
                collected_at,
            },
            sentiment: Sentiment {
                compound: row.sentiment_compound,
                positive: row.sentiment_positive,
                neutral: row.sentiment_neutral,
                negative: row.sentiment_negative,
                label,
            },
            topic: TopicAssignment {
                topic_id: row.topic_id.max(0) as usize,
                top_terms,
                confidence: row.topic_confidence,
            },
        })
    }
}

/// Average compound and label counts over any set of documents
pub(crate) fn summarize<'a, I>(docs: I) -> Vec<SourceStats>
where
    I: IntoIterator<Item = &'a EnrichedDocument>,
{
    let mut by_source: std::collections::BTreeMap<SourceType, (u64, f64, u64, u64, u64)> =
        std::collections::BTreeMap::new();
    for doc in docs {
        let entry = by_source.entry(doc.source_type()).or_default();
        entry.0 += 1;
        entry.1 += doc.sentiment.compound;
        match doc.sentiment.label {
            SentimentLabel::Positive => entry.2 += 1,
            SentimentLabel::Neutral => entry.3 += 1,
            SentimentLabel::Negative => entry.4 += 1,
        }
    }

    by_source
        .into_iter()
        .map(|(source_type, (documents, sum, positive, neutral, negative))| SourceStats {
            source_type,
            documents,
            avg_compound: if documents > 0 { sum / documents as f64 } else { 0.0 },
            positive,
            neutral,
            negative,
        })
        .collect()
}
