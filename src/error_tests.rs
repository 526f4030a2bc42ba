//! Tests for error types

#[cfg(test)]
mod tests {
    use super::super::error::{ErrorKind, PipelineError};

    #[test]
    fn test_api_error() {
        let err = PipelineError::Api {
            status: 503,
            message: "upstream unavailable".to_string(),
        };
        assert!(err.to_string().contains("API error"));
        assert!(err.to_string().contains("503"));
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.is_transient());
    }

    #[test]
    fn test_auth_status_not_transient() {
        let err = PipelineError::Api {
            status: 401,
            message: "bad token".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_not_found_is_validation() {
        let err = PipelineError::Api {
            status: 404,
            message: "no such subreddit".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_rate_limited() {
        let err = PipelineError::RateLimited { retry_after_secs: 30 };
        let msg = err.to_string();
        assert!(msg.contains("Rate limited"));
        assert!(msg.contains("30"));
        assert!(err.is_transient());
        assert_eq!(err.retry_after_secs(), Some(30));
        assert_eq!(err.kind(), ErrorKind::RateLimited);
    }

    #[test]
    fn test_degenerate_corpus() {
        let err = PipelineError::DegenerateCorpus {
            documents: 2,
            terms: 7,
            topics: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("2 documents"));
        assert!(msg.contains("5 topics"));
        assert_eq!(err.kind(), ErrorKind::DegenerateCorpus);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_config_error() {
        let err = PipelineError::Config("Missing subreddits".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_storage_unavailable_is_connectivity() {
        let err = PipelineError::StorageUnavailable("5 consecutive failures".to_string());
        assert_eq!(err.kind(), ErrorKind::Connectivity);
    }

    #[test]
    fn test_database_pool_timeout_is_connectivity() {
        let err = PipelineError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), ErrorKind::Connectivity);
    }

    #[test]
    fn test_json_error_is_parse() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = PipelineError::from(json_err);
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::DegenerateCorpus.to_string(), "degenerate_corpus");
        assert_eq!(
            serde_json::to_string(&ErrorKind::RateLimited).unwrap(),
            "\"rate_limited\""
        );
    }

    #[test]
    fn test_error_is_debug() {
        let err = PipelineError::Scorer("lexicon missing".to_string());
        let debug = format!("{:?}", err);
        assert!(debug.contains("Scorer"));
    }
}
