use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::clock::TimestampMs;

pub const ORDER_CURRENCY: &str = "INR";
const REQUEST_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment gateway credentials are not configured")]
    NotConfigured,
    #[error("order amount must be a positive number")]
    InvalidAmount,
    #[error("payment gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("payment gateway rejected order with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub amount: i64,
    pub currency: &'static str,
    pub receipt: String,
}

impl OrderRequest {
    /// Builds an order for `amount` major units, charged in minor units.
    pub fn new(amount: f64, now: TimestampMs) -> Result<Self, PaymentError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(PaymentError::InvalidAmount);
        }

        Ok(Self {
            amount: (amount * 100.0).round() as i64,
            currency: ORDER_CURRENCY,
            receipt: format!("order_rcptid_{}", now.0),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RazorpayCredentials {
    pub key_id: String,
    pub key_secret: String,
}

/// Client for the Razorpay orders API.
#[derive(Debug, Clone)]
pub struct RazorpayClient {
    http: reqwest::Client,
    api_base: String,
    credentials: Option<RazorpayCredentials>,
}

impl RazorpayClient {
    pub fn new(
        api_base: &str,
        credentials: Option<RazorpayCredentials>,
    ) -> Result<Self, PaymentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// Creates an order and returns the gateway's order document verbatim.
    pub async fn create_order(&self, order: &OrderRequest) -> Result<Value, PaymentError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(PaymentError::NotConfigured)?;

        let response = self
            .http
            .post(format!("{}/orders", self.api_base))
            .basic_auth(&credentials.key_id, Some(&credentials.key_secret))
            .json(order)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<Value>().await?)
    }
}
