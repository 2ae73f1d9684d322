//! Vendor cloud API client for Landau
//!
//! This module speaks the vendor's telematics cloud protocol: login,
//! customer data, CAN bus data, and CAN command posts. Responses are raw
//! JSON payloads; interpretation lives with the coordinator and the entity
//! schema.

use crate::config::ApiConfig;
use crate::error::{LandauError, Result};
use crate::logging::get_logger;
use serde_json::{Value, json};
use std::time::Duration;

/// Timeout for login, customer data, and command posts
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Credentials established by a successful login
#[derive(Debug, Clone)]
pub struct LoginSession {
    /// Vendor-side customer identifier
    pub customer_id: String,

    /// Bearer token for subsequent requests
    pub token: String,
}

/// HTTP client for the vendor telematics cloud
pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
    logger: crate::logging::StructuredLogger,
}

impl CloudClient {
    /// Create a new client for the configured endpoint
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            logger: get_logger("api"),
        })
    }

    /// Log in with account credentials and obtain a bearer token
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginSession> {
        self.logger.debug("Attempting to log in to the vendor cloud");
        let url = format!("{}/login", self.base_url);
        let response = self
            .http
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({"email": email, "password": password}))
            .send()
            .await?;
        let response = Self::check_status(response)?;
        let body: Value = response.json().await?;

        let session = parse_login_response(&body)?;
        self.logger.debug("Successfully logged in and obtained token");
        Ok(session)
    }

    /// Fetch the customer payload (account, vehicles, last position)
    pub async fn customer_data(&self, token: &str, customer_id: &str) -> Result<Value> {
        let url = format!("{}/customers/{}/1", self.base_url, customer_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let response = Self::check_status(response)?;
        Ok(response.json().await?)
    }

    /// Fetch the CAN bus payload for an asset
    pub async fn can_data(&self, token: &str, asset_id: &str, timeout: Duration) -> Result<Value> {
        let url = format!("{}/can/{}", self.base_url, asset_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .timeout(timeout)
            .send()
            .await?;
        let response = Self::check_status(response)?;
        Ok(response.json().await?)
    }

    /// Post a CAN command to a numbered endpoint on an asset
    pub async fn send_command(
        &self,
        token: &str,
        asset_id: &str,
        endpoint: u32,
        payload: &[u8],
    ) -> Result<()> {
        let url = format!("{}/can/{}/{}", self.base_url, asset_id, endpoint);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .timeout(REQUEST_TIMEOUT)
            .json(&payload)
            .send()
            .await?;
        Self::check_status(response)?;
        self.logger.info(&format!("Sent CAN command to {}", url));
        Ok(())
    }

    /// Map a non-2xx response to an HTTP status error
    fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(LandauError::http(
                status.as_u16(),
                format!("{} returned {}", response.url().path(), status),
            ))
        }
    }
}

/// Extract customer id and token from a login response.
///
/// The vendor returns the literal string "null" for an absent token; both
/// that and a missing field raise an authentication error.
fn parse_login_response(body: &Value) -> Result<LoginSession> {
    let customer_id = match body.get("customerID") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let token = body
        .get("token")
        .and_then(|v| v.as_str())
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("null"))
        .map(str::to_string);

    match (customer_id, token) {
        (Some(customer_id), Some(token)) => Ok(LoginSession { customer_id, token }),
        _ => Err(LandauError::auth(
            "Failed to get customer ID or token from login",
        )),
    }
}
