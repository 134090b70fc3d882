//! Order-book API client
//!
//! Depth snapshots, price probes and fill-or-kill order entry. Venue
//! authentication is carried as opaque headers supplied by the
//! deployment; this client never derives credentials itself.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{build_http_client, retry_transient, ApiError, Result};
use crate::domain::OrderBook;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    GTC, // Good Till Cancel
    FOK, // Fill Or Kill
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::GTC => "GTC",
            OrderType::FOK => "FOK",
        }
    }
}

/// Order submission parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderArgs {
    pub token_id: String,
    pub price: f64,
    /// Token quantity.
    pub size: f64,
    pub side: OrderSide,
    pub order_type: OrderType,
}

/// Venue response to an order placement.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlacementResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub error_msg: Option<String>,

    #[serde(default)]
    pub order_id: Option<String>,

    #[serde(default)]
    pub status: Option<String>,
}

impl OrderPlacementResponse {
    /// Rejections that no retry can cure: the operator wallet lacks funds
    /// or token allowance.
    pub fn is_insufficient_funds(&self) -> bool {
        self.error_msg
            .as_deref()
            .map(|msg| {
                let msg = msg.to_lowercase();
                msg.contains("not enough balance") || msg.contains("allowance")
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PriceResponse {
    price: String,
}


pub struct ClobClient {
    base_url: String,
    client: Client,
    /// Opaque venue auth headers, attached verbatim to order entry.
    auth_headers: Vec<(String, String)>,
}

impl ClobClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: build_http_client(),
            auth_headers: Vec::new(),
        }
    }

    pub fn with_auth_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.auth_headers = headers;
        self
    }

    /// Depth snapshot for one asset.
    pub async fn order_book(&self, asset_id: &str) -> Result<OrderBook> {
        let url = format!("{}/orderbook/{}", self.base_url, asset_id);

        retry_transient("orderbook fetch", || {
            let url = url.clone();
            async move {
                let response = self.client.get(&url).send().await?;
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
                let book: OrderBook = response
                    .json()
                    .await
                    .map_err(|e| ApiError::DeserializeFailed(e.to_string()))?;
                debug!(
                    "Order book for {}: {} bids / {} asks",
                    url,
                    book.bids.len(),
                    book.asks.len()
                );
                Ok(book)
            }
        })
        .await
    }

    /// Current sell-side quote for a token.
    pub async fn sell_price(&self, token_id: &str) -> Result<f64> {
        let url = format!("{}/price", self.base_url);
        let token = token_id.to_string();

        retry_transient("price fetch", || {
            let url = url.clone();
            let params = [("token_id", token.clone()), ("side", "sell".to_string())];
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
                let body: PriceResponse = response
                    .json()
                    .await
                    .map_err(|e| ApiError::DeserializeFailed(e.to_string()))?;
                body.price
                    .parse()
                    .map_err(|_| ApiError::DeserializeFailed(format!("bad price '{}'", body.price)))
            }
        })
        .await
    }

    /// Server clock, used as a connectivity probe. The endpoint serves a
    /// bare unix timestamp.
    pub async fn server_time(&self) -> Result<i64> {
        let url = format!("{}/time", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: "health probe failed".to_string(),
            });
        }
        let body = response.text().await?;
        body.trim()
            .parse()
            .map_err(|_| ApiError::DeserializeFailed(format!("bad timestamp '{}'", body.trim())))
    }

    /// Submit one order. Placement rejections come back inside the
    /// response body, not as transport errors; only transport failures
    /// are retried.
    pub async fn submit_order(&self, args: &OrderArgs) -> Result<OrderPlacementResponse> {
        let url = format!("{}/order", self.base_url);

        let mut request = self.client.post(&url).json(args);
        for (name, value) in &self.auth_headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() && status.as_u16() >= 500 {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let placement: OrderPlacementResponse = response
            .json()
            .await
            .map_err(|e| ApiError::DeserializeFailed(e.to_string()))?;

        info!(
            "Order {} {} {:.4} x {:.2}: success={} status={:?}",
            args.side.as_str(),
            args.token_id,
            args.price,
            args.size,
            placement.success,
            placement.status
        );
        Ok(placement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_args_wire_shape() {
        let args = OrderArgs {
            token_id: "123".to_string(),
            price: 0.42,
            size: 10.0,
            side: OrderSide::Buy,
            order_type: OrderType::FOK,
        };
        let json = serde_json::to_string(&args).unwrap();
        assert!(json.contains(r#""tokenId":"123""#));
        assert!(json.contains(r#""side":"BUY""#));
        assert!(json.contains(r#""orderType":"FOK""#));
    }

    #[test]
    fn test_insufficient_funds_detection() {
        let rejected = OrderPlacementResponse {
            success: false,
            error_msg: Some("not enough balance / allowance".to_string()),
            ..Default::default()
        };
        assert!(rejected.is_insufficient_funds());

        let other = OrderPlacementResponse {
            success: false,
            error_msg: Some("market closed".to_string()),
            ..Default::default()
        };
        assert!(!other.is_insufficient_funds());

        let ok = OrderPlacementResponse {
            success: true,
            ..Default::default()
        };
        assert!(!ok.is_insufficient_funds());
    }

    #[test]
    fn test_placement_response_tolerates_sparse_body() {
        let placement: OrderPlacementResponse =
            serde_json::from_str(r#"{"success": true, "orderId": "o-1"}"#).unwrap();
        assert!(placement.success);
        assert_eq!(placement.order_id.as_deref(), Some("o-1"));
        assert!(placement.status.is_none());
    }
}
