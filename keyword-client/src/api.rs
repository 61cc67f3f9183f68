use crate::metrics::{ApiMetrics, MetricsCollector, RequestMetrics};
use keyharvest_core::{
    CompetitionLevel, CoreError, Credentials, EndpointConfig, KeywordApiError, KeywordRecord,
    SourceConfig,
};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// One keyword entry as the provider returns it. Every field may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiKeyword {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub competition_level: Option<String>,
    #[serde(default)]
    pub trend: Option<f64>,
}

impl ApiKeyword {
    /// Records without text carry nothing usable and are dropped.
    pub fn into_record(self) -> Option<KeywordRecord> {
        let text = self.text?.trim().to_string();
        if text.is_empty() {
            return None;
        }

        let mut record = KeywordRecord::new(text);
        record.volume = self
            .volume
            .filter(|v| v.is_finite() && *v > 0.0)
            .map(|v| v as u64)
            .unwrap_or(0);
        record.competition_level = self
            .competition_level
            .as_deref()
            .map(CompetitionLevel::parse)
            .unwrap_or_default();
        record.trend = self.trend.filter(|t| t.is_finite()).unwrap_or(0.0);
        Some(record)
    }
}

/// The provider answers with either a list or a single object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiPayload {
    Many(Vec<ApiKeyword>),
    One(ApiKeyword),
}

impl ApiPayload {
    pub fn into_records(self) -> Vec<KeywordRecord> {
        let items = match self {
            ApiPayload::Many(items) => items,
            ApiPayload::One(item) => vec![item],
        };
        items.into_iter().filter_map(ApiKeyword::into_record).collect()
    }
}

/// Map a non-success status to the error taxonomy.
pub fn classify_status(endpoint: &str, status: StatusCode, headers: &HeaderMap) -> KeywordApiError {
    match status.as_u16() {
        429 => {
            let retry_after = headers
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok());
            KeywordApiError::RateLimited {
                endpoint: endpoint.to_string(),
                retry_after,
            }
        }
        401 | 403 => KeywordApiError::Unauthorized {
            endpoint: endpoint.to_string(),
        },
        code if status.is_server_error() => KeywordApiError::ServerError { status_code: code },
        code => KeywordApiError::Transport {
            endpoint: endpoint.to_string(),
            reason: format!("unexpected status {}", code),
        },
    }
}

#[derive(Debug)]
pub struct KeywordApiClient {
    http_client: Client,
    api_key: String,
    api_host: String,
    base_url: String,
    location: String,
    language: String,
    metrics: Arc<MetricsCollector>,
}

impl KeywordApiClient {
    pub fn new(credentials: &Credentials, source: &SourceConfig) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&source.user_agent)
            .timeout(Duration::from_secs(source.request_timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            api_key: credentials.api_key.clone(),
            api_host: credentials.api_host.clone(),
            base_url: format!("https://{}", credentials.api_host),
            location: source.location.clone(),
            language: source.language.clone(),
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    /// Point the client somewhere other than `https://{api_host}`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}/", self.base_url, endpoint)
    }

    pub fn query_params(&self, endpoint: &EndpointConfig, seed: &str) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(3);
        params.push(("keyword", seed.to_string()));
        if endpoint.with_location {
            params.push(("location", self.location.clone()));
        }
        params.push(("lang", self.language.clone()));
        params
    }

    /// Fetch raw keyword suggestions for one seed from one endpoint.
    pub async fn fetch_endpoint(
        &self,
        endpoint: &EndpointConfig,
        seed: &str,
    ) -> Result<Vec<KeywordRecord>, CoreError> {
        let url = self.endpoint_url(&endpoint.name);
        let params = self.query_params(endpoint, seed);
        let start_time = Instant::now();

        info!("Requesting {} for seed '{}'", endpoint.name, seed);
        let result = self.send(&url, &endpoint.name, &params).await;

        let (success, rate_limited, status_code) = match &result {
            Ok(_) => (true, false, Some(200)),
            Err(CoreError::KeywordApi(KeywordApiError::RateLimited { .. })) => {
                (false, true, Some(429))
            }
            Err(CoreError::KeywordApi(KeywordApiError::ServerError { status_code })) => {
                (false, false, Some(*status_code))
            }
            Err(_) => (false, false, None),
        };
        self.metrics
            .record_request(RequestMetrics {
                endpoint: endpoint.name.clone(),
                status_code,
                response_time: start_time.elapsed(),
                success,
                rate_limited,
            })
            .await;

        let records = result?;
        debug!(
            "{} returned {} records for seed '{}'",
            endpoint.name,
            records.len(),
            seed
        );
        Ok(records)
    }

    async fn send(
        &self,
        url: &str,
        endpoint: &str,
        params: &[(&'static str, String)],
    ) -> Result<Vec<KeywordRecord>, CoreError> {
        let response = self
            .http_client
            .get(url)
            .header("x-rapidapi-host", &self.api_host)
            .header("x-rapidapi-key", &self.api_key)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                error!("Network error for {}: {}", endpoint, e);
                if e.is_timeout() {
                    KeywordApiError::RequestTimeout {
                        endpoint: endpoint.to_string(),
                    }
                } else {
                    KeywordApiError::Transport {
                        endpoint: endpoint.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let api_error = classify_status(endpoint, status, response.headers());
            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!("Rate limited (429) on {}", endpoint);
            } else {
                let body = response.text().await.unwrap_or_default();
                error!("Request to {} failed with {}: {}", endpoint, status, body);
            }
            return Err(api_error.into());
        }

        let payload: ApiPayload = response.json().await.map_err(|e| {
            error!("Failed to parse {} response: {}", endpoint, e);
            KeywordApiError::InvalidResponse {
                endpoint: endpoint.to_string(),
                details: e.to_string(),
            }
        })?;

        Ok(payload.into_records())
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.get_metrics().await
    }
}
