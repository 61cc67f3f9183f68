use keyharvest_core::{
    ConfigError, CoreError, DatabaseError, EmbeddingError, ErrorExt, ErrorReporter,
    KeywordApiError,
};
use std::time::Duration;

#[test]
fn test_error_codes() {
    let api_error = CoreError::KeywordApi(KeywordApiError::ServerError { status_code: 503 });
    assert_eq!(api_error.error_code(), "KEYWORD_API");

    let db_error = CoreError::Database(DatabaseError::DatabaseLocked);
    assert_eq!(db_error.error_code(), "DATABASE");

    let embedding_error = CoreError::Embedding(EmbeddingError::ModelNotFound {
        model_name: "all-MiniLM-L6-v2".to_string(),
    });
    assert_eq!(embedding_error.error_code(), "EMBEDDING");

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "source.endpoints".to_string(),
    });
    assert_eq!(config_error.error_code(), "CONFIG");
}

#[test]
fn test_only_rate_limits_are_retryable() {
    let rate_limited = CoreError::KeywordApi(KeywordApiError::RateLimited {
        endpoint: "keysuggest".to_string(),
        retry_after: Some(12),
    });
    assert!(rate_limited.is_retryable());

    let transport = CoreError::KeywordApi(KeywordApiError::Transport {
        endpoint: "globalkey".to_string(),
        reason: "dns failure".to_string(),
    });
    assert!(!transport.is_retryable());

    let missing_env = CoreError::Config(ConfigError::MissingEnvironmentVariable {
        var_name: "RAPIDAPI_KEY".to_string(),
    });
    assert!(!missing_env.is_retryable());
}

#[test]
fn test_retry_after() {
    let rate_limited = CoreError::KeywordApi(KeywordApiError::RateLimited {
        endpoint: "topkeys".to_string(),
        retry_after: Some(60),
    });
    assert_eq!(rate_limited.retry_after(), Some(Duration::from_secs(60)));

    let without_header = CoreError::KeywordApi(KeywordApiError::RateLimited {
        endpoint: "topkeys".to_string(),
        retry_after: None,
    });
    assert_eq!(without_header.retry_after(), None);
}

#[test]
fn test_user_friendly_messages() {
    let config_error = CoreError::Config(ConfigError::MissingEnvironmentVariable {
        var_name: "DB_CONNECTION_STRING".to_string(),
    });
    let message = config_error.user_friendly_message();
    assert!(message.contains("DB_CONNECTION_STRING"));

    let blacklisted = CoreError::Database(DatabaseError::BlacklistedTerm {
        term: "cloud gaming".to_string(),
    });
    assert!(blacklisted.user_friendly_message().contains("cloud gaming"));
}

#[test]
fn test_error_reporter() {
    let reporter = ErrorReporter::new();
    let error = CoreError::KeywordApi(KeywordApiError::Unauthorized {
        endpoint: "keysuggest".to_string(),
    });

    // This test just ensures the methods don't panic
    reporter.report_error(&error);
    reporter.report_warning(&error);
}
