use crate::api::KeywordApiClient;
use crate::retry::{RetryConfig, RetryExecutor, RetryMetrics};
use futures::stream::{self, StreamExt};
use keyharvest_core::{
    CoreError, EndpointConfig, ErrorRecovery, FetchConfig, FetchMode, KeywordRecord,
    RecoveryResult, SeedKeyword, SourceConfig,
};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Anything that can turn a seed phrase into raw keyword records.
pub trait KeywordSource {
    async fn fetch_keywords(
        &self,
        endpoint: &EndpointConfig,
        seed: &str,
    ) -> Result<Vec<KeywordRecord>, CoreError>;
}

impl KeywordSource for KeywordApiClient {
    async fn fetch_keywords(
        &self,
        endpoint: &EndpointConfig,
        seed: &str,
    ) -> Result<Vec<KeywordRecord>, CoreError> {
        self.fetch_endpoint(endpoint, seed).await
    }
}

/// Everything one seed produced across all endpoints.
#[derive(Debug, Clone)]
pub struct SeedFetch {
    pub seed: SeedKeyword,
    pub records: Vec<KeywordRecord>,
    pub failed_endpoints: Vec<String>,
    /// Set when an endpoint ran out of rate-limit retries.
    pub degraded: bool,
}

impl SeedFetch {
    fn new(seed: SeedKeyword) -> Self {
        Self {
            seed,
            records: Vec::new(),
            failed_endpoints: Vec::new(),
            degraded: false,
        }
    }

    /// True when no endpoint delivered anything for this seed.
    pub fn is_failed(&self) -> bool {
        self.records.is_empty() && !self.failed_endpoints.is_empty()
    }
}

/// Runs every seed against every configured endpoint.
///
/// In concurrent mode at most `max_workers` seeds are in flight and results
/// are returned only once all of them finish, in seed order. Sequential mode
/// issues one request at a time with a fixed pause between requests.
pub struct SeedFetcher<S> {
    source: S,
    endpoints: Vec<EndpointConfig>,
    executor: RetryExecutor,
    mode: FetchMode,
    max_workers: usize,
    sequential_delay: Duration,
}

impl<S: KeywordSource> SeedFetcher<S> {
    pub fn new(source: S, source_config: &SourceConfig, fetch_config: &FetchConfig) -> Self {
        Self {
            source,
            endpoints: source_config.endpoints.clone(),
            executor: RetryExecutor::new(RetryConfig::from(fetch_config)),
            mode: fetch_config.mode,
            max_workers: fetch_config.max_workers.max(1),
            sequential_delay: fetch_config.sequential_delay(),
        }
    }

    pub fn with_mode(mut self, mode: FetchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> FetchMode {
        self.mode
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn retry_metrics(&self) -> RetryMetrics {
        self.executor.get_metrics()
    }

    /// Fetch all seeds. Only errors the recovery policy marks fatal surface as `Err`.
    pub async fn fetch_all(&self, seeds: &[SeedKeyword]) -> Result<Vec<SeedFetch>, CoreError> {
        info!(
            "Fetching {} seeds from {} endpoints ({:?} mode)",
            seeds.len(),
            self.endpoints.len(),
            self.mode
        );

        let fetches = match self.mode {
            FetchMode::Concurrent => {
                let results: Vec<Result<SeedFetch, CoreError>> = stream::iter(seeds)
                    .map(|seed| self.fetch_seed(seed, false))
                    .buffered(self.max_workers)
                    .collect()
                    .await;
                results.into_iter().collect::<Result<Vec<_>, _>>()?
            }
            FetchMode::Sequential => {
                let mut fetches = Vec::with_capacity(seeds.len());
                for (index, seed) in seeds.iter().enumerate() {
                    if index > 0 {
                        sleep(self.sequential_delay).await;
                    }
                    fetches.push(self.fetch_seed(seed, true).await?);
                }
                fetches
            }
        };

        let total: usize = fetches.iter().map(|f| f.records.len()).sum();
        let failed = fetches.iter().filter(|f| f.is_failed()).count();
        info!(
            "Fetched {} raw records from {} seeds ({} seeds failed)",
            total,
            fetches.len(),
            failed
        );
        Ok(fetches)
    }

    async fn fetch_seed(&self, seed: &SeedKeyword, paced: bool) -> Result<SeedFetch, CoreError> {
        let mut fetch = SeedFetch::new(seed.clone());

        for (index, endpoint) in self.endpoints.iter().enumerate() {
            if paced && index > 0 {
                sleep(self.sequential_delay).await;
            }

            let operation = format!("{}('{}')", endpoint.name, seed.text);
            let result = self
                .executor
                .execute(&operation, || self.source.fetch_keywords(endpoint, &seed.text))
                .await;

            match result {
                Ok(records) => {
                    debug!("{} yielded {} records", operation, records.len());
                    fetch
                        .records
                        .extend(records.into_iter().map(|record| record.tagged(seed)));
                }
                Err(error) => match ErrorRecovery::settle(error, ()) {
                    RecoveryResult::Recovered(()) => {}
                    RecoveryResult::Degraded(()) => {
                        fetch.degraded = true;
                        fetch.failed_endpoints.push(endpoint.name.clone());
                    }
                    RecoveryResult::Skipped => {
                        fetch.failed_endpoints.push(endpoint.name.clone());
                    }
                    RecoveryResult::Failed(error) => return Err(error),
                },
            }
        }

        if fetch.is_failed() {
            warn!("Seed '{}' contributed no records", seed.text);
        }
        Ok(fetch)
    }
}
