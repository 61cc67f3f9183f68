pub mod api;
pub mod fetcher;
pub mod metrics;
pub mod retry;


pub use api::{ApiKeyword, ApiPayload, KeywordApiClient};
pub use fetcher::{KeywordSource, SeedFetch, SeedFetcher};
pub use metrics::{ApiMetrics, EndpointMetrics, MetricsCollector};
pub use retry::{RetryConfig, RetryExecutor, RetryMetrics, RetryStrategy};
