//! Live payout driver speaking JSON over HTTP.

use crate::domain::money::SellerId;
use crate::domain::payout::Payout;
use crate::domain::ports::{PayoutProcessor, ProcessorError, ProcessorOutcome};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use backoff::future::retry;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Submits payouts to a disbursement API.
///
/// `POST {base_url}/payouts` carries an `Idempotency-Key` derived from the payout
/// id and attempt number, so a connection-level retry of the same attempt can
/// never disburse twice. Only connection failures are retried: once a request may
/// have reached the processor, the answer (or its absence) is final.
#[derive(Debug, Clone)]
pub struct HttpPayoutProcessor {
    client: Client,
    base_url: String,
    retry_window: Duration,
}

#[derive(Debug, Serialize)]
struct PayoutRequest<'a> {
    payout_id: u64,
    seller: u32,
    amount_minor: i64,
    amount: String,
    method: &'a str,
}

#[derive(Debug, Deserialize)]
struct PayoutResponse {
    id: Option<String>,
    status: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    payouts_enabled: bool,
}

impl HttpPayoutProcessor {
    pub fn new(base_url: String, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_window: Duration::from_secs(10),
        }
    }

    /// Limits how long connection failures are retried.
    pub fn with_retry_window(mut self, window: Duration) -> Self {
        self.retry_window = window;
        self
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_elapsed_time: Some(self.retry_window),
            ..Default::default()
        }
    }
}

fn classify(err: reqwest::Error) -> backoff::Error<ProcessorError> {
    if err.is_connect() {
        backoff::Error::transient(ProcessorError::Network(err.to_string()))
    } else if err.is_timeout() {
        backoff::Error::permanent(ProcessorError::Network(format!("request timed out: {err}")))
    } else {
        backoff::Error::permanent(ProcessorError::Network(err.to_string()))
    }
}

#[async_trait]
impl PayoutProcessor for HttpPayoutProcessor {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(&self, payout: &Payout) -> Result<ProcessorOutcome, ProcessorError> {
        let url = format!("{}/payouts", self.base_url);
        let key = payout.idempotency_key();
        let body = PayoutRequest {
            payout_id: payout.id.0,
            seller: payout.seller.0,
            amount_minor: payout.amount.minor(),
            amount: payout.amount.to_string(),
            method: &payout.method,
        };

        let response = retry(self.backoff(), || async {
            debug!(url = %url, key = %key, "posting payout");
            self.client
                .post(&url)
                .header("Idempotency-Key", key.as_str())
                .json(&body)
                .send()
                .await
                .map_err(classify)
        })
        .await?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProcessorError::Network(e.to_string()))?;

        if status.is_server_error() {
            warn!(payout = %payout.id, status = status.as_u16(), "processor server error");
            return Err(ProcessorError::Http {
                status: status.as_u16(),
                message: text,
            });
        }

        let parsed: Option<PayoutResponse> = serde_json::from_str(&text).ok();
        if status.is_client_error() {
            let reason = parsed
                .and_then(|r| r.reason)
                .unwrap_or_else(|| text.trim().to_string());
            return Ok(ProcessorOutcome::Failure {
                reason: format!("processor rejected payout ({}): {reason}", status.as_u16()),
            });
        }
        if !status.is_success() {
            return Err(ProcessorError::Http {
                status: status.as_u16(),
                message: text,
            });
        }

        let parsed = parsed.ok_or_else(|| ProcessorError::Parse(text.clone()))?;
        if parsed.status.as_deref() == Some("failed") {
            return Ok(ProcessorOutcome::Failure {
                reason: parsed
                    .reason
                    .unwrap_or_else(|| "processor reported failure".to_string()),
            });
        }
        match parsed.id {
            Some(external_id) if !external_id.is_empty() => {
                Ok(ProcessorOutcome::Success { external_id })
            }
            _ => Err(ProcessorError::Parse("response is missing the payout id".to_string())),
        }
    }

    async fn is_seller_onboarded(&self, seller: SellerId) -> Result<bool, ProcessorError> {
        let url = format!("{}/accounts/{}", self.base_url, seller);
        let response = retry(self.backoff(), || async {
            self.client.get(&url).send().await.map_err(classify)
        })
        .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => response
                .json::<AccountResponse>()
                .await
                .map(|account| account.payouts_enabled)
                .map_err(|e| ProcessorError::Parse(e.to_string())),
            status => Err(ProcessorError::Http {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}
