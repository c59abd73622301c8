//! Open position queries.

use async_trait::async_trait;
use tracing::debug;
use trailstop_core::{MonitorError, PositionSnapshot, PositionSource};

use crate::client::AlpacaClient;
use crate::error::Result;
use crate::types::RawPosition;

impl AlpacaClient {
    /// Fetches all open positions.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn list_positions(&self) -> Result<Vec<RawPosition>> {
        let positions: Vec<RawPosition> = self.get("/v2/positions").await?;
        debug!(count = positions.len(), "Fetched open positions");
        Ok(positions)
    }
}

#[async_trait]
impl PositionSource for AlpacaClient {
    async fn list_open_positions(&self) -> trailstop_core::Result<Vec<PositionSnapshot>> {
        let positions = self
            .list_positions()
            .await
            .map_err(|e| MonitorError::transport("list_open_positions", e.to_string()))?;

        Ok(positions.into_iter().map(RawPosition::into_snapshot).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> AlpacaClient {
        AlpacaClient::with_credentials(
            &server.uri(),
            "key-id",
            SecretString::from("secret"),
            Duration::from_secs(5),
            nonzero_ext::nonzero!(600u32),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn lists_positions_with_auth_headers() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/positions"))
            .and(header("APCA-API-KEY-ID", "key-id"))
            .and(header("APCA-API-SECRET-KEY", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "symbol": "AAPL",
                    "qty": "10",
                    "avg_entry_price": "100",
                    "current_price": "104",
                    "side": "long",
                    "asset_class": "us_equity"
                },
                {
                    "symbol": "XYZ",
                    "qty": "3",
                    "avg_entry_price": "0",
                    "current_price": "5",
                    "side": "long",
                    "asset_class": "us_equity"
                }
            ])))
            .mount(&server)
            .await;

        let snapshots = client(&server).list_open_positions().await.unwrap();

        assert_eq!(snapshots.len(), 2);
        assert!(matches!(&snapshots[0], PositionSnapshot::Priced(p) if p.ticker == "AAPL"));
        assert!(matches!(&snapshots[1], PositionSnapshot::Unpriceable { ticker, .. } if ticker == "XYZ"));
    }

    #[tokio::test]
    async fn auth_failure_is_a_transport_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/positions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let err = client(&server).list_open_positions().await.unwrap_err();
        assert!(err.is_cycle_fatal());
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn malformed_body_is_a_transport_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/positions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = client(&server).list_open_positions().await.unwrap_err();
        assert!(matches!(err, MonitorError::Transport { .. }));
    }
}
