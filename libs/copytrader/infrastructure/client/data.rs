//! Data API client
//!
//! Read-only access to the venue's activity feed and position snapshots.

use reqwest::Client;
use tracing::debug;

use super::{build_http_client, retry_transient, ApiError, Result};
use crate::domain::{ActivityEvent, VenuePosition};

/// Position page size; the venue caps at 500.
const POSITIONS_LIMIT: u32 = 500;

pub struct DataApiClient {
    base_url: String,
    client: Client,
}

impl DataApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: build_http_client(),
        }
    }

    /// Recent activity for a user from `start_unix` onwards, in the
    /// venue's chronological order.
    pub async fn activities(&self, user: &str, start_unix: i64) -> Result<Vec<ActivityEvent>> {
        let url = format!("{}/activity", self.base_url);
        let user = user.to_string();
        let start = start_unix.to_string();

        retry_transient("activity fetch", || {
            let url = url.clone();
            let params = [("user", user.clone()), ("start", start.clone())];
            async move {
                let response = self.client.get(&url).query(&params).send().await?;
                let status = response.status();
                if !status.is_success() {
                    let message = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(ApiError::Status {
                        status: status.as_u16(),
                        message,
                    });
                }
                let activities: Vec<ActivityEvent> = response
                    .json()
                    .await
                    .map_err(|e| ApiError::DeserializeFailed(e.to_string()))?;
                debug!("Fetched {} activities for {}", activities.len(), url);
                Ok(activities)
            }
        })
        .await
    }

    /// Current (non-redeemable) positions for a user.
    pub async fn positions(&self, user: &str) -> Result<Vec<VenuePosition>> {
        let url = format!("{}/positions", self.base_url);
        let user = user.to_string();

        retry_transient("positions fetch", || {
            let url = url.clone();
            let params = [
                ("user", user.clone()),
                ("redeemable", "false".to_string()),
                ("limit", POSITIONS_LIMIT.to_string()),
            ];
            async move {
                let response = self.client.get(&url).query(&params).send().await?;
                let status = response.status();
                if !status.is_success() {
                    let message = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(ApiError::Status {
                        status: status.as_u16(),
                        message,
                    });
                }
                let positions: Vec<VenuePosition> = response
                    .json()
                    .await
                    .map_err(|e| ApiError::DeserializeFailed(e.to_string()))?;
                debug!("Fetched {} positions", positions.len());
                Ok(positions)
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_keeps_base_url() {
        let client = DataApiClient::new("https://data.example.com");
        assert_eq!(client.base_url, "https://data.example.com");
    }
}
