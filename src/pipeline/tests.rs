//! End-to-end runner tests with in-process sources and stores

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::{EnrichmentConfig, HeadlineConfig};
    use crate::error::ErrorKind;
    use crate::ingester::{
        FeedApi, FeedEntry, ForumPost, HeadlineAdapter, HeadlineItem, MicroblogPost, PostMetrics,
        RawRecord, RetryPolicy,
    };
    use crate::storage::{MemoryStore, MockDocumentStore};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::assert_ok;

    struct FakeSource {
        source: SourceType,
        records: Vec<RawRecord>,
        errors: fn() -> Vec<PipelineError>,
        panics: bool,
        calls: Arc<AtomicUsize>,
    }

    impl FakeSource {
        fn new(source: SourceType, records: Vec<RawRecord>) -> Self {
            Self {
                source,
                records,
                errors: Vec::new,
                panics: false,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing(source: SourceType) -> Self {
            Self {
                errors: || {
                    vec![PipelineError::Api {
                        status: 401,
                        message: "invalid token".into(),
                    }]
                },
                ..Self::new(source, Vec::new())
            }
        }

        fn panicking(source: SourceType) -> Self {
            Self {
                panics: true,
                ..Self::new(source, Vec::new())
            }
        }
    }

    #[async_trait]
    impl BatchSource for FakeSource {
        fn source_type(&self) -> SourceType {
            self.source
        }

        async fn fetch_batch(&self, _ctx: &FetchContext) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panics {
                panic!("adapter bug");
            }
            FetchOutcome {
                records: self.records.clone(),
                errors: (self.errors)(),
                partial: false,
            }
        }
    }

    fn forum(id: &str, title: &str, body: &str) -> RawRecord {
        RawRecord::Forum(ForumPost {
            id: id.to_string(),
            subreddit: "worldnews".into(),
            title: title.to_string(),
            body: body.to_string(),
            author: Some("poster".into()),
            score: 10,
            num_comments: 2,
            url: None,
            created_at: None,
        })
    }

    fn tweet(id: &str, text: &str) -> RawRecord {
        RawRecord::Microblog(MicroblogPost {
            id: id.to_string(),
            text: text.to_string(),
            author_id: Some("42".into()),
            author_username: Some("someone".into()),
            created_at: None,
            search_term: "climate".into(),
            language: Some("en".into()),
            metrics: PostMetrics::default(),
        })
    }

    fn headline(url: &str, title: &str, summary: &str) -> RawRecord {
        RawRecord::Headline(HeadlineItem {
            url: Some(url.to_string()),
            title: title.to_string(),
            summary: summary.to_string(),
            source_name: "bbc".into(),
            category: "world".into(),
            published_at: None,
        })
    }

    fn forum_records() -> Vec<RawRecord> {
        vec![
            forum("f1", "Great football match tonight", "Fans loved the winning goal"),
            forum("f2", "Stock market rally continues", "Investors cheer strong earnings"),
            forum("f3", "Football season preview", "Coaches expect a tough league"),
        ]
    }

    fn headline_records() -> Vec<RawRecord> {
        vec![
            headline("https://news/1", "Markets fall on inflation fears", "Stocks slide worldwide"),
            headline("https://news/2", "League champions crowned", "Football club lifts trophy"),
            headline("https://news/3", "Central bank holds rates", "Investors await inflation data"),
        ]
    }

    fn runner(sources: Vec<FakeSource>, store: Arc<dyn DocumentStore>, topics: usize) -> PipelineRunner {
        runner_with(sources, store, topics, 5)
    }

    fn runner_with(
        sources: Vec<FakeSource>,
        store: Arc<dyn DocumentStore>,
        topics: usize,
        max_consecutive_failures: usize,
    ) -> PipelineRunner {
        let sources = sources
            .into_iter()
            .map(|s| Arc::new(s) as Arc<dyn BatchSource>)
            .collect();
        let enrichment = EnrichmentStage::from_config(&EnrichmentConfig {
            num_topics: topics,
            ..EnrichmentConfig::default()
        });
        let load = LoadStage::new(store.clone(), 1, max_consecutive_failures);
        PipelineRunner::new(sources, enrichment, store, load)
    }

    #[tokio::test]
    async fn test_all_sources_loaded() {
        let store = Arc::new(MemoryStore::new());
        let summary = runner(
            vec![
                FakeSource::new(SourceType::Forum, forum_records()),
                FakeSource::new(
                    SourceType::Microblog,
                    vec![tweet("t1", "Climate protest draws huge crowd"), tweet("t2", "Heatwave breaks records again")],
                ),
                FakeSource::new(SourceType::Headline, headline_records()),
            ],
            store.clone(),
            2,
        )
        .run()
        .await;

        assert_eq!(summary.state, RunState::Done);
        assert_eq!(summary.exit_code(), 0);
        let forum = summary.counts_for(SourceType::Forum);
        assert_eq!(forum.fetched, 3);
        assert_eq!(forum.normalized, 3);
        assert_eq!(forum.enriched, 3);
        assert_eq!(forum.loaded, 3);
        assert_eq!(summary.counts_for(SourceType::Microblog).loaded, 2);
        assert_eq!(assert_ok!(store.count().await), 8);
    }

    #[tokio::test]
    async fn test_failing_source_does_not_block_others() {
        let store = Arc::new(MemoryStore::new());
        let summary = runner(
            vec![
                FakeSource::new(SourceType::Forum, forum_records()),
                FakeSource::failing(SourceType::Microblog),
                FakeSource::new(SourceType::Headline, headline_records()),
            ],
            store,
            2,
        )
        .run()
        .await;

        assert_eq!(summary.state, RunState::Done);
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(summary.counts_for(SourceType::Forum).loaded, 3);
        assert_eq!(summary.counts_for(SourceType::Headline).loaded, 3);
        assert_eq!(summary.counts_for(SourceType::Microblog).fetched, 0);

        let failure = &summary.failures[0];
        assert_eq!(failure.source_type, Some(SourceType::Microblog));
        assert_eq!(failure.stage, Stage::Extract);
        assert_eq!(failure.kind, ErrorKind::Auth);
    }

    #[tokio::test]
    async fn test_panicking_source_is_contained() {
        let summary = runner(
            vec![
                FakeSource::panicking(SourceType::Forum),
                FakeSource::new(SourceType::Headline, headline_records()),
            ],
            Arc::new(MemoryStore::new()),
            2,
        )
        .run()
        .await;

        assert_eq!(summary.state, RunState::Done);
        let forum = summary.counts_for(SourceType::Forum);
        assert!(forum.partial);
        assert_eq!(forum.fetched, 0);
        assert_eq!(summary.counts_for(SourceType::Headline).loaded, 3);
        assert!(summary
            .failures
            .iter()
            .any(|f| f.source_type == Some(SourceType::Forum) && f.kind == ErrorKind::Internal));
    }

    #[tokio::test]
    async fn test_small_corpus_loads_nothing() {
        let store = Arc::new(MemoryStore::new());
        let summary = runner(
            vec![FakeSource::new(
                SourceType::Forum,
                vec![forum("a", "Only post", "short"), forum("b", "Second post", "tiny")],
            )],
            store.clone(),
            5,
        )
        .run()
        .await;

        assert_eq!(summary.state, RunState::Done);
        assert_eq!(summary.exit_code(), 1);
        let forum = summary.counts_for(SourceType::Forum);
        assert_eq!(forum.normalized, 2);
        assert_eq!(forum.enriched, 0);
        assert_eq!(forum.loaded, 0);
        assert_eq!(summary.failures[0].kind, ErrorKind::DegenerateCorpus);
        assert_eq!(summary.failures[0].stage, Stage::Enrich);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dedup_by_native_id() {
        let text = "Bitcoin price surges";
        let records = vec![
            forum("a", text, ""),
            forum("b", text, ""),
            forum("c", text, ""),
            forum("a", text, ""),
        ];
        let store = Arc::new(MemoryStore::new());
        let summary = runner(vec![FakeSource::new(SourceType::Forum, records)], store.clone(), 1)
            .run()
            .await;

        let forum = summary.counts_for(SourceType::Forum);
        assert_eq!(forum.fetched, 4);
        assert_eq!(forum.normalized, 3);
        assert_eq!(forum.duplicates, 1);
        assert_eq!(forum.loaded, 3);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_empty_headline_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let mut records = headline_records();
        records.push(headline("https://news/empty", "<p> </p>", "&nbsp;"));

        let summary = runner(vec![FakeSource::new(SourceType::Headline, records)], store.clone(), 2)
            .run()
            .await;

        let counts = summary.counts_for(SourceType::Headline);
        assert_eq!(counts.fetched, 4);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.loaded, 3);
        assert!(store
            .snapshot()
            .iter()
            .all(|d| d.document.native_id.as_deref() != Some("https://news/empty")));
    }

    struct WorldFeed;

    #[async_trait]
    impl FeedApi for WorldFeed {
        async fn fetch_feed(&self, _url: &str) -> crate::error::Result<Vec<FeedEntry>> {
            let entry = |url: &str, title: &str, summary: &str| FeedEntry {
                url: Some(url.to_string()),
                title: title.to_string(),
                summary: summary.to_string(),
                published_at: None,
            };
            Ok(vec![
                entry("https://news/1", "Markets fall on inflation fears", "Stocks slide worldwide"),
                entry("https://news/2", "League champions crowned", "Football club lifts trophy"),
                entry("https://news/3", "", "Floods devastate the valley"),
                entry("https://news/4", "", ""),
            ])
        }
    }

    #[tokio::test]
    async fn test_feed_headlines_without_title_are_counted() {
        let mut categories = BTreeMap::new();
        categories.insert("bbc".to_string(), vec!["world".to_string()]);
        let adapter = HeadlineAdapter::new(
            HeadlineConfig {
                categories,
                articles_per_source: 10,
                min_delay_ms: 0,
                max_delay_ms: 0,
                ..HeadlineConfig::default()
            },
            Arc::new(WorldFeed),
            RetryPolicy::immediate(1),
        );

        let store = Arc::new(MemoryStore::new());
        let enrichment = EnrichmentStage::from_config(&EnrichmentConfig {
            num_topics: 2,
            ..EnrichmentConfig::default()
        });
        let load = LoadStage::new(store.clone(), 1, 5);
        let sources: Vec<Arc<dyn BatchSource>> = vec![Arc::new(adapter)];
        let summary = PipelineRunner::new(sources, enrichment, store.clone(), load)
            .run()
            .await;

        let counts = summary.counts_for(SourceType::Headline);
        assert_eq!(counts.fetched, 4);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.normalized, 3);
        assert_eq!(counts.loaded, 3);
        assert!(store
            .snapshot()
            .iter()
            .any(|d| d.document.text == "Floods devastate the valley"));
    }

    #[tokio::test]
    async fn test_second_run_updates_instead_of_duplicating() {
        let store = Arc::new(MemoryStore::new());
        for _ in 0..2 {
            runner(
                vec![FakeSource::new(SourceType::Headline, headline_records())],
                store.clone(),
                2,
            )
            .run()
            .await;
        }

        let summary = runner(
            vec![FakeSource::new(SourceType::Headline, headline_records())],
            store.clone(),
            2,
        )
        .run()
        .await;
        let counts = summary.counts_for(SourceType::Headline);
        assert_eq!(counts.loaded, 0);
        assert_eq!(counts.updated, 3);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_before_fetching() {
        let mut store = MockDocumentStore::new();
        store
            .expect_ping()
            .returning(|| Err(PipelineError::Database(sqlx::Error::PoolClosed)));

        let source = FakeSource::new(SourceType::Forum, forum_records());
        let calls = source.calls.clone();
        let summary = runner(vec![source], Arc::new(store), 2).run().await;

        assert_eq!(summary.state, RunState::Failed);
        assert_eq!(summary.exit_code(), 2);
        assert_eq!(summary.failures[0].stage, Stage::Startup);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_storage_escalation_fails_run() {
        let mut store = MockDocumentStore::new();
        store.expect_ping().returning(|| Ok(()));
        store
            .expect_upsert()
            .times(2)
            .returning(|_| Err(PipelineError::Database(sqlx::Error::PoolTimedOut)));

        let summary = runner_with(
            vec![FakeSource::new(SourceType::Headline, headline_records())],
            Arc::new(store),
            1,
            2,
        )
        .run()
        .await;

        assert_eq!(summary.state, RunState::Failed);
        assert_eq!(summary.exit_code(), 2);
        assert_eq!(summary.counts_for(SourceType::Headline).failed, 2);
        let last = summary.failures.last().unwrap();
        assert_eq!(last.source_type, None);
        assert_eq!(last.stage, Stage::Load);
        assert_eq!(last.kind, ErrorKind::Connectivity);
    }

    #[tokio::test]
    async fn test_expired_deadline_skips_enrichment() {
        let store = Arc::new(MemoryStore::new());
        let summary = runner(
            vec![FakeSource::new(SourceType::Forum, forum_records())],
            store.clone(),
            2,
        )
        .with_timeout(Some(Duration::ZERO))
        .run()
        .await;

        assert_eq!(summary.state, RunState::Done);
        let forum = summary.counts_for(SourceType::Forum);
        assert_eq!(forum.normalized, 3);
        assert_eq!(forum.loaded, 0);
        assert!(summary.failures.iter().any(|f| f.kind == ErrorKind::Timeout));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_run_is_clean() {
        let summary = runner(
            vec![FakeSource::new(SourceType::Forum, Vec::new())],
            Arc::new(MemoryStore::new()),
            5,
        )
        .run()
        .await;

        assert_eq!(summary.state, RunState::Done);
        assert_eq!(summary.exit_code(), 0);
        assert_eq!(summary.total_loaded(), 0);
    }

    #[test]
    fn test_new_runner_is_idle() {
        let runner = runner(Vec::new(), Arc::new(MemoryStore::new()), 1);
        assert_eq!(runner.state(), RunState::Idle);
    }
}
