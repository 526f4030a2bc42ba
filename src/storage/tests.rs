//! Tests for storage module

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::normalize::fingerprint;
    use chrono::Duration;
    use serde_json::json;

    fn enriched(source: SourceType, id: &str, text: &str, compound: f64) -> EnrichedDocument {
        let mut metadata = Metadata::new();
        metadata.insert("author".into(), json!("someone"));
        EnrichedDocument {
            document: Document {
                fingerprint: fingerprint(source, Some(id), text),
                source_type: source,
                native_id: Some(id.to_string()),
                text: text.to_string(),
                metadata,
                collected_at: Utc::now(),
            },
            sentiment: Sentiment {
                compound,
                positive: 0.5,
                neutral: 0.5,
                negative: 0.0,
                label: crate::sentiment::label_for(compound),
            },
            topic: TopicAssignment {
                topic_id: 1,
                top_terms: vec!["markets".into(), "rally".into()],
                confidence: 0.8,
            },
        }
    }

    #[tokio::test]
    async fn test_sqlite_roundtrip() {
        let store = SqliteStore::in_memory("sentiment_analysis").await.unwrap();
        let doc = enriched(SourceType::Forum, "abc", "Markets rally", 0.4);

        assert_eq!(store.upsert(&doc).await.unwrap(), UpsertOutcome::Inserted);
        let loaded = store.get(doc.fingerprint()).await.unwrap().unwrap();

        assert_eq!(loaded.document.text, "Markets rally");
        assert_eq!(loaded.document.metadata["author"], json!("someone"));
        assert_eq!(loaded.sentiment.label, SentimentLabel::Positive);
        assert_eq!(loaded.topic.top_terms, vec!["markets", "rally"]);
        assert_eq!(
            loaded.document.collected_at.timestamp(),
            doc.document.collected_at.timestamp()
        );
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_upsert_is_idempotent() {
        let store = SqliteStore::in_memory("docs").await.unwrap();
        let first = enriched(SourceType::Microblog, "1", "Old text", -0.3);
        let mut second = first.clone();
        second.document.text = "Edited text".into();
        second.sentiment.compound = 0.6;
        second.sentiment.label = SentimentLabel::Positive;
        second.topic.topic_id = 3;

        assert_eq!(store.upsert(&first).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&second).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.count().await.unwrap(), 1);

        let stored = store.get(first.fingerprint()).await.unwrap().unwrap();
        assert_eq!(stored.document.text, "Edited text");
        assert_eq!(stored.sentiment.compound, 0.6);
        assert_eq!(stored.topic.topic_id, 3);
    }

    #[tokio::test]
    async fn test_sqlite_stats_by_source() {
        let store = SqliteStore::in_memory("sentiment_analysis").await.unwrap();
        for doc in [
            enriched(SourceType::Forum, "1", "a", 0.5),
            enriched(SourceType::Forum, "2", "b", -0.1),
            enriched(SourceType::Headline, "3", "c", 0.0),
        ] {
            store.upsert(&doc).await.unwrap();
        }

        let stats = store.stats_by_source().await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].source_type, SourceType::Forum);
        assert_eq!(stats[0].documents, 2);
        assert!((stats[0].avg_compound - 0.2).abs() < 1e-9);
        assert_eq!(stats[0].positive, 1);
        assert_eq!(stats[0].negative, 1);
        assert_eq!(stats[1].source_type, SourceType::Headline);
        assert_eq!(stats[1].neutral, 1);
    }

    #[tokio::test]
    async fn test_sqlite_recent_orders_newest_first() {
        let store = SqliteStore::in_memory("sentiment_analysis").await.unwrap();
        let mut old = enriched(SourceType::Forum, "old", "old post", 0.0);
        old.document.collected_at = Utc::now() - Duration::hours(2);
        let new = enriched(SourceType::Forum, "new", "new post", 0.0);
        store.upsert(&old).await.unwrap();
        store.upsert(&new).await.unwrap();

        let recent = store.recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].document.text, "new post");
    }

    #[tokio::test]
    async fn test_sqlite_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sentiment.db");

        let store = SqliteStore::connect(&path, "sentiment_analysis").await.unwrap();
        store.ping().await.unwrap();
        store
            .upsert(&enriched(SourceType::Headline, "https://x/1", "Headline", 0.1))
            .await
            .unwrap();
        drop(store);

        let reopened = SqliteStore::connect(&path, "sentiment_analysis").await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_table_rejected() {
        let result = SqliteStore::in_memory("bad-name").await;
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[tokio::test]
    async fn test_memory_store_matches_sqlite_semantics() {
        let store = MemoryStore::new();
        let doc = enriched(SourceType::Forum, "1", "text", 0.2);
        assert_eq!(store.upsert(&doc).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&doc).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.count().await.unwrap(), 1);

        let stats = store.stats_by_source().await.unwrap();
        assert_eq!(stats[0].documents, 1);
        assert_eq!(stats[0].positive, 1);
        assert_eq!(store.recent(10).await.unwrap().len(), 1);
    }
}
