//! External venue interfaces
//!
//! Read-only data API, order book / order entry API and the on-chain
//! settlement contract. All HTTP calls share one timeout and transient
//! retry policy; callers see typed errors.

pub mod clob;
pub mod data;
pub mod settlement;

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub use clob::{ClobClient, OrderArgs, OrderPlacementResponse, OrderSide, OrderType};
pub use data::DataApiClient;
pub use settlement::{
    derive_address, key_controls_wallet, usdc_from_raw, usdc_to_raw, PayoutStatus,
    RedemptionOutcome, SettlementClient, SettlementError, USDC_DECIMALS,
};

/// Per-request ceiling; slow venue endpoints bubble as transient errors.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Deserialization failed: {0}")]
    DeserializeFailed(String),
}

impl ApiError {
    /// Timeouts, connection resets and 5xx responses are retried; 4xx and
    /// malformed bodies are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::RequestFailed(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::DeserializeFailed(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Shared HTTP client construction.
pub(crate) fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_idle_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(5)
        .tcp_keepalive(Duration::from_secs(15))
        .build()
        .expect("Failed to build HTTP client")
}

/// Run `f` up to three times with 1/2/4 s backoff on transient failures.
pub(crate) async fn retry_transient<T, F, Fut>(what: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = RETRY_BASE_DELAY;

    for attempt in 1..=RETRY_ATTEMPTS {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < RETRY_ATTEMPTS => {
                warn!("{} failed (attempt {}/{}): {}", what, attempt, RETRY_ATTEMPTS, e);
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!("retry loop returns on the final attempt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transience() {
        assert!(ApiError::Status {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_transient());
        assert!(!ApiError::Status {
            status: 404,
            message: "missing".to_string()
        }
        .is_transient());
        assert!(!ApiError::DeserializeFailed("bad json".to_string()).is_transient());
    }

    #[tokio::test]
    async fn test_retry_gives_up_on_permanent_error() {
        let mut calls = 0;
        let result: Result<()> = retry_transient("probe", || {
            calls += 1;
            async move {
                Err(ApiError::Status {
                    status: 400,
                    message: "bad request".to_string(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_retry_retries_transient_errors() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let calls = AtomicU32::new(0);
        let result: Result<u32> = retry_transient("probe", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 2 {
                    Err(ApiError::Status {
                        status: 500,
                        message: "boom".to_string(),
                    })
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }
}
