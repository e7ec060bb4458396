//! HTTP client for the accrual oracle.
//!
//! `GET {base}/api/orders/{id}` is mapped onto `OracleOutcome`:
//! - `200` with a JSON body → `Scored` (or `RateLimited` when the body
//!   carries a positive `retry_after`)
//! - `204` → `Unknown`
//! - `429` with a `Retry-After` header in seconds → `RateLimited`
//!
//! Rate-limit hints are capped at [`MAX_RETRY_AFTER`].
//! - anything else, including network errors → `TransientFailure`

use super::{AccrualOracle, OracleOutcome, OracleStatus, MAX_RETRY_AFTER};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Response body of the oracle.
#[derive(Debug, Deserialize)]
struct AccrualResponse {
    #[serde(default)]
    order: Option<String>,
    status: OracleStatus,
    #[serde(default)]
    accrual: Option<Decimal>,
    #[serde(default)]
    retry_after: Option<u64>,
}

/// HTTP client for the accrual oracle.
#[derive(Debug, Clone)]
pub struct HttpAccrualClient {
    client: Client,
    base_url: String,
}

impl HttpAccrualClient {
    /// Create a new oracle client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the oracle (e.g., "http://localhost:8081")
    /// * `request_timeout` - Upper bound on a single query, connect included
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn order_url(&self, order_id: &str) -> String {
        format!("{}/api/orders/{}", self.base_url, order_id)
    }

    async fn read_scored(&self, order_id: &str, response: reqwest::Response) -> OracleOutcome {
        let body: AccrualResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => return OracleOutcome::transient(format!("malformed response body: {}", e)),
        };

        if let Some(reported) = body.order.as_deref() {
            if reported != order_id {
                return OracleOutcome::transient(format!(
                    "response for order {} while asking for {}",
                    reported, order_id
                ));
            }
        }

        if let Some(seconds) = body.retry_after.filter(|s| *s > 0) {
            return OracleOutcome::RateLimited {
                retry_after: capped(Duration::from_secs(seconds)),
            };
        }

        let accrual = body.accrual.unwrap_or(Decimal::ZERO);
        if accrual < Decimal::ZERO {
            return OracleOutcome::transient(format!("negative accrual {}", accrual));
        }

        OracleOutcome::Scored {
            status: body.status,
            accrual,
        }
    }
}

/// Seconds from a `Retry-After` header; zero or unparsable values yield `None`.
fn retry_after_from(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|seconds| *seconds > 0)
        .map(|seconds| capped(Duration::from_secs(seconds)))
}

fn capped(retry_after: Duration) -> Duration {
    if retry_after > MAX_RETRY_AFTER {
        warn!(
            retry_after_s = retry_after.as_secs(),
            max_s = MAX_RETRY_AFTER.as_secs(),
            "oracle asked for an excessive pause, capping"
        );
        return MAX_RETRY_AFTER;
    }
    retry_after
}

#[async_trait]
impl AccrualOracle for HttpAccrualClient {
    async fn query(&self, order_id: &str) -> OracleOutcome {
        let response = match self.client.get(self.order_url(order_id)).send().await {
            Ok(response) => response,
            Err(e) => return OracleOutcome::transient(format!("request failed: {}", e)),
        };

        let status = response.status();
        debug!(order = order_id, status = status.as_u16(), "oracle responded");

        match status {
            StatusCode::OK => self.read_scored(order_id, response).await,
            StatusCode::NO_CONTENT => OracleOutcome::Unknown,
            StatusCode::TOO_MANY_REQUESTS => match retry_after_from(response.headers()) {
                Some(retry_after) => OracleOutcome::RateLimited { retry_after },
                None => OracleOutcome::transient("rate limited without a usable Retry-After"),
            },
            other => OracleOutcome::transient(format!("unexpected status {}", other)),
        }
    }
}
