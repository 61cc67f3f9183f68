use crate::error::*;
use std::time::Duration;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::KeywordApi(e) => {
                error!("Keyword API error details: {:?}", e);
            }
            CoreError::Database(e) => {
                error!("Database error details: {:?}", e);
            }
            CoreError::Embedding(e) => {
                error!("Embedding error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::KeywordApi(e) => e.is_retryable(),
            CoreError::Database(e) => e.is_retryable(),
            CoreError::Embedding(e) => e.is_retryable(),
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::KeywordApi(e) => e.retry_after(),
            CoreError::Database(e) => e.retry_after(),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::KeywordApi(e) => e.user_friendly_message(),
            CoreError::Database(e) => e.user_friendly_message(),
            CoreError::Embedding(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::InvalidInput { message } => format!("Invalid input: {}", message),
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::KeywordApi(_) => "KEYWORD_API".to_string(),
            CoreError::Database(_) => "DATABASE".to_string(),
            CoreError::Embedding(_) => "EMBEDDING".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for KeywordApiError {
    fn log_error(&self) -> &Self {
        error!("KeywordApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("KeywordApiError (warning): {}", self);
        self
    }

    /// Only rate limiting is retried; every other failure degrades the seed.
    fn is_retryable(&self) -> bool {
        matches!(self, KeywordApiError::RateLimited { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            KeywordApiError::RateLimited {
                retry_after: Some(seconds),
                ..
            } => Some(Duration::from_secs(*seconds)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            KeywordApiError::RateLimited { endpoint, .. } => format!(
                "Too many requests to '{}'. Waiting before trying again.",
                endpoint
            ),
            KeywordApiError::Unauthorized { .. } => {
                "Keyword API rejected the API key. Please check RAPIDAPI_KEY.".to_string()
            }
            KeywordApiError::RequestTimeout { endpoint } => {
                format!("Request to '{}' timed out.", endpoint)
            }
            _ => "Keyword API error occurred. The seed will be skipped.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            KeywordApiError::RateLimited { .. } => "KEYWORD_API_RATE_LIMIT".to_string(),
            KeywordApiError::Transport { .. } => "KEYWORD_API_TRANSPORT".to_string(),
            KeywordApiError::Unauthorized { .. } => "KEYWORD_API_UNAUTHORIZED".to_string(),
            KeywordApiError::RequestTimeout { .. } => "KEYWORD_API_TIMEOUT".to_string(),
            KeywordApiError::InvalidResponse { .. } => {
                "KEYWORD_API_INVALID_RESPONSE".to_string()
            }
            KeywordApiError::ServerError { .. } => "KEYWORD_API_SERVER_ERROR".to_string(),
        }
    }
}

impl ErrorExt for DatabaseError {
    fn log_error(&self) -> &Self {
        error!("DatabaseError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("DatabaseError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(self, DatabaseError::DatabaseLocked)
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            DatabaseError::DatabaseLocked => Some(Duration::from_millis(100)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => {
                "Database connection failed. Please check DB_CONNECTION_STRING.".to_string()
            }
            DatabaseError::DatabaseLocked => {
                "Database is temporarily busy. Please try again.".to_string()
            }
            DatabaseError::BlacklistedTerm { term } => {
                format!("'{}' is blacklisted and cannot be selected again yet.", term)
            }
            _ => "Database error occurred. Please try again.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => "DB_CONNECTION_FAILED".to_string(),
            DatabaseError::MigrationFailed { .. } => "DB_MIGRATION_FAILED".to_string(),
            DatabaseError::QueryFailed { .. } => "DB_QUERY_FAILED".to_string(),
            DatabaseError::BlacklistedTerm { .. } => "DB_BLACKLISTED_TERM".to_string(),
            DatabaseError::DatabaseLocked => "DB_LOCKED".to_string(),
            DatabaseError::Sql(_) => "DB_SQL_ERROR".to_string(),
        }
    }
}

impl ErrorExt for EmbeddingError {
    fn log_error(&self) -> &Self {
        error!("EmbeddingError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("EmbeddingError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            EmbeddingError::ModelNotFound { model_name } => format!(
                "Embedding model '{}' not found. Please download it first.",
                model_name
            ),
            EmbeddingError::ModelLoadingFailed { .. } => {
                "Failed to load embedding model. Please check the model directory.".to_string()
            }
            _ => "Embedding processing error occurred.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            EmbeddingError::ModelLoadingFailed { .. } => "EMBED_MODEL_LOAD_FAILED".to_string(),
            EmbeddingError::ModelNotFound { .. } => "EMBED_MODEL_NOT_FOUND".to_string(),
            EmbeddingError::TokenizationFailed { .. } => "EMBED_TOKENIZATION_FAILED".to_string(),
            EmbeddingError::InferenceFailed { .. } => "EMBED_INFERENCE_FAILED".to_string(),
            EmbeddingError::DimensionMismatch { .. } => "EMBED_DIMENSION_MISMATCH".to_string(),
            EmbeddingError::EmptyInput => "EMBED_EMPTY_INPUT".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false // Config errors need user intervention
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found.", path)
            }
            ConfigError::MissingField { field } => {
                format!("Required configuration field '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => format!(
                "Environment variable '{}' is required but not set.",
                var_name
            ),
            _ => "Configuration error occurred. Please check your settings.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV_VAR".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

/// Logs errors with their code and user-facing message.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn report_error(&self, error: &CoreError) {
        error.log_error();
        info!("Error code: {}", error.error_code());
        info!("User message: {}", error.user_friendly_message());
        if error.is_retryable() {
            if let Some(retry_after) = error.retry_after() {
                info!("Error is retryable. Retry after: {:?}", retry_after);
            }
        }
    }

    /// For errors the run survives.
    pub fn report_warning(&self, error: &CoreError) {
        error.log_warn();
        info!("Continuing without this result ({})", error.error_code());
    }
}
