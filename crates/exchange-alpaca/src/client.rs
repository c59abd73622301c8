//! Alpaca REST client with rate limiting and per-request timeouts.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use trailstop_core::AlpacaConfig;

use crate::error::{AlpacaError, Result};

/// Live trading API.
pub const ALPACA_LIVE_URL: &str = "https://api.alpaca.markets";

/// Paper trading API.
pub const ALPACA_PAPER_URL: &str = "https://paper-api.alpaca.markets";

/// Alpaca trading API client.
pub struct AlpacaClient {
    base_url: String,
    key_id: String,
    secret_key: SecretString,
    http: Client,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
}

impl std::fmt::Debug for AlpacaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlpacaClient")
            .field("base_url", &self.base_url)
            .field("key_id", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl AlpacaClient {
    /// Builds a client from configuration.
    ///
    /// # Errors
    /// Returns `Configuration` if the key or secret is missing.
    pub fn new(config: &AlpacaConfig) -> Result<Self> {
        let key_id = config
            .key_id
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AlpacaError::Configuration("ALPACA_API_KEY missing".to_string()))?;
        let secret_key = config
            .secret_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AlpacaError::Configuration("ALPACA_API_SECRET missing".to_string()))?;

        let requests_per_minute =
            NonZeroU32::new(config.requests_per_minute).unwrap_or(nonzero!(180u32));

        Self::with_credentials(
            &config.base_url,
            key_id,
            SecretString::from(secret_key),
            Duration::from_secs(config.timeout_secs),
            requests_per_minute,
        )
    }

    /// Builds a client from explicit credentials.
    ///
    /// # Errors
    /// Returns `Network` if the HTTP client cannot be built.
    pub fn with_credentials(
        base_url: &str,
        key_id: impl Into<String>,
        secret_key: SecretString,
        timeout: Duration,
        requests_per_minute: NonZeroU32,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AlpacaError::Network(format!("failed to build HTTP client: {e}")))?;

        let base_url = normalize_base_url(base_url);
        info!(base_url = %base_url, "Alpaca client ready");

        Ok(Self {
            base_url,
            key_id: key_id.into(),
            secret_key,
            http,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(requests_per_minute))),
        })
    }

    /// Returns the base URL (without the `/v2` suffix).
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Waits for the rate limiter and makes an authenticated GET request.
    pub(crate) async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .header("APCA-API-KEY-ID", &self.key_id)
            .header("APCA-API-SECRET-KEY", self.secret_key.expose_secret())
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Waits for the rate limiter and makes an authenticated DELETE request.
    pub(crate) async fn delete<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        debug!("DELETE {}", url);

        let response = self
            .http
            .delete(&url)
            .header("Accept", "application/json")
            .header("APCA-API-KEY-ID", &self.key_id)
            .header("APCA-API-SECRET-KEY", self.secret_key.expose_secret())
            .send()
            .await?;

        Self::handle_response(response).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(AlpacaError::RateLimit {
                retry_after_secs: retry_after,
            });
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AlpacaError::api(status.as_u16(), text));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Strips trailing slashes and a trailing `/v2` so paths can always start with `/v2`.
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    trimmed.strip_suffix("/v2").unwrap_or(trimmed).to_string()
}

/// Validates a symbol before it is placed in a request path.
///
/// Accepts uppercase letters, digits, `.` (class shares such as `BRK.B`)
/// and nothing that could escape the path segment.
pub(crate) fn validate_symbol(symbol: &str) -> Result<&str> {
    if symbol.is_empty() || symbol.len() > 32 {
        return Err(AlpacaError::InvalidSymbol(format!(
            "symbol length out of range: {symbol:?}"
        )));
    }
    if symbol.contains("..")
        || !symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.')
    {
        return Err(AlpacaError::InvalidSymbol(symbol.to_string()));
    }
    Ok(symbol)
}
