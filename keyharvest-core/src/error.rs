use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Keyword API error: {0}")]
    KeywordApi(#[from] KeywordApiError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Error, Debug, Clone)]
pub enum KeywordApiError {
    #[error("Rate limited by keyword API on {endpoint}")]
    RateLimited {
        endpoint: String,
        retry_after: Option<u64>,
    },

    #[error("Transport failure on {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("Keyword API rejected credentials on {endpoint}")]
    Unauthorized { endpoint: String },

    #[error("Request timeout on {endpoint}")]
    RequestTimeout { endpoint: String },

    #[error("Invalid API response from {endpoint}: {details}")]
    InvalidResponse { endpoint: String, details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Migration failed: {migration}")]
    MigrationFailed { migration: String },

    #[error("Query execution failed: {query}")]
    QueryFailed { query: String },

    #[error("Refusing to persist blacklisted term: {term}")]
    BlacklistedTerm { term: String },

    #[error("Database locked")]
    DatabaseLocked,

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model loading failed: {model_path}")]
    ModelLoadingFailed { model_path: String },

    #[error("Model not found: {model_name}")]
    ModelNotFound { model_name: String },

    #[error("Tokenization failed: {reason}")]
    TokenizationFailed { reason: String },

    #[error("Model inference failed: {reason}")]
    InferenceFailed { reason: String },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Nothing to embed")]
    EmptyInput,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Environment variable not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
