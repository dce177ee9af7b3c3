//! HTTP client for the accrual service.
//!
//! `GET {base_url}/api/orders/{number}` answers with:
//! - `200` and `{"order", "status", "accrual"}`
//! - `204` when the order is unknown to the service
//! - `429` with `Retry-After` (seconds) when the request limit is exceeded
//! - anything else on internal errors

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{AccrualError, AccrualService, AccrualStatus, OrderAccrual, RateLimitGate};

/// Accrual client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccrualConfig {
    /// Accrual service URL (e.g., "http://localhost:8081").
    #[serde(default)]
    pub base_url: String,
    /// Pause applied when a 429 comes without a usable `Retry-After` header.
    #[serde(default = "default_fallback_retry_after")]
    pub fallback_retry_after_secs: u64,
    /// TCP connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_fallback_retry_after() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10_000
}

impl AccrualConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            fallback_retry_after_secs: default_fallback_retry_after(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self::new(String::new())
    }
}

/// Accrual service client.
///
/// Performs exactly one request per call; retries are the caller's business.
pub struct HttpAccrualClient {
    client: Client,
    base_url: String,
    fallback_retry_after: Duration,
}

impl HttpAccrualClient {
    /// Create a new accrual client.
    pub fn new(config: AccrualConfig) -> Result<Self, AccrualError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(AccrualError::NotConfigured(
                "accrual base URL is required".to_string(),
            ));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url,
            fallback_retry_after: Duration::from_secs(config.fallback_retry_after_secs),
        })
    }

    fn order_url(&self, number: &str) -> String {
        format!(
            "{}/api/orders/{}",
            self.base_url,
            urlencoding::encode(number)
        )
    }
}

#[async_trait]
impl AccrualService for HttpAccrualClient {
    async fn get_order_accrual(&self, number: &str) -> Result<OrderAccrual, AccrualError> {
        let url = self.order_url(number);
        debug!(url = %url, "Requesting order accrual");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        debug!(order = %number, status = status.as_u16(), "Accrual system responded");

        match status {
            StatusCode::OK => {
                let body = response.bytes().await?;
                let payload: AccrualResponse = serde_json::from_slice(&body).map_err(|e| {
                    AccrualError::ParseError(format!("Failed to parse accrual response: {}", e))
                })?;
                payload.into_order_accrual(number)
            }
            StatusCode::NO_CONTENT => Err(AccrualError::NotRegistered(number.to_string())),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = parse_retry_after(response.headers()).unwrap_or_else(|| {
                    warn!(
                        order = %number,
                        fallback_secs = self.fallback_retry_after.as_secs(),
                        "Rate limited without a usable Retry-After header"
                    );
                    self.fallback_retry_after
                });
                Err(AccrualError::RateLimited { retry_after })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(AccrualError::ApiError {
                    status: status.as_u16(),
                    message: body,
                })
            }
        }
    }
}

/// `Retry-After` as delay-seconds, capped at [`RateLimitGate::MAX_PAUSE`].
/// HTTP-date values are not used by the accrual service.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs).min(RateLimitGate::MAX_PAUSE))
}

// ============================================================================
// Wire format (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct AccrualResponse {
    #[serde(default)]
    order: Option<String>,
    status: String,
    #[serde(default)]
    accrual: Option<Decimal>,
}

impl AccrualResponse {
    fn into_order_accrual(self, requested: &str) -> Result<OrderAccrual, AccrualError> {
        let status: AccrualStatus = self.status.parse()?;

        let order = match self.order {
            Some(returned) if returned != requested => {
                return Err(AccrualError::OrderMismatch {
                    requested: requested.to_string(),
                    returned,
                });
            }
            Some(returned) => returned,
            None => requested.to_string(),
        };

        Ok(OrderAccrual {
            order,
            status,
            accrual: self.accrual.unwrap_or(Decimal::ZERO),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_requires_base_url() {
        let result = HttpAccrualClient::new(AccrualConfig::new("  "));
        assert!(matches!(result, Err(AccrualError::NotConfigured(_))));
    }

    #[test]
    fn test_order_url_trims_trailing_slash() {
        let client = HttpAccrualClient::new(AccrualConfig::new("http://localhost:8081/")).unwrap();
        assert_eq!(
            client.order_url("9278923470"),
            "http://localhost:8081/api/orders/9278923470"
        );
    }

    #[test]
    fn test_order_url_encodes_number() {
        let client = HttpAccrualClient::new(AccrualConfig::new("http://localhost:8081")).unwrap();
        assert_eq!(
            client.order_url("12/34"),
            "http://localhost:8081/api/orders/12%2F34"
        );
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("60"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(60)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("18446744073709551615"),
        );
        assert_eq!(parse_retry_after(&headers), Some(RateLimitGate::MAX_PAUSE));
    }

    #[test]
    fn test_response_conversion() {
        let payload: AccrualResponse = serde_json::from_str(
            r#"{"order":"9278923470","status":"PROCESSED","accrual":500.50}"#,
        )
        .unwrap();
        let accrual = payload.into_order_accrual("9278923470").unwrap();
        assert_eq!(accrual.status, AccrualStatus::Processed);
        assert_eq!(accrual.accrual, dec!(500.50));
    }

    #[test]
    fn test_response_without_accrual_is_zero() {
        let payload: AccrualResponse =
            serde_json::from_str(r#"{"order":"9278923470","status":"PROCESSING"}"#).unwrap();
        let accrual = payload.into_order_accrual("9278923470").unwrap();
        assert_eq!(accrual.status, AccrualStatus::Processing);
        assert_eq!(accrual.accrual, Decimal::ZERO);
    }

    #[test]
    fn test_response_unknown_status() {
        let payload: AccrualResponse =
            serde_json::from_str(r#"{"order":"9278923470","status":"DONE"}"#).unwrap();
        let err = payload.into_order_accrual("9278923470").unwrap_err();
        assert!(matches!(err, AccrualError::UnknownStatus(_)));
    }

    #[test]
    fn test_response_order_mismatch() {
        let payload: AccrualResponse =
            serde_json::from_str(r#"{"order":"12345678903","status":"PROCESSED","accrual":1}"#)
                .unwrap();
        let err = payload.into_order_accrual("9278923470").unwrap_err();
        assert!(matches!(err, AccrualError::OrderMismatch { .. }));
    }
}
