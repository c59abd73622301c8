//! Position closes via market liquidation.

use async_trait::async_trait;
use tracing::info;
use trailstop_core::{BrokerActions, MonitorError};

use crate::client::{validate_symbol, AlpacaClient};
use crate::error::{AlpacaError, Result};
use crate::types::CloseOrder;

impl AlpacaClient {
    /// Liquidates the whole position in `symbol` with a market order.
    ///
    /// # Errors
    /// Returns `PositionNotFound` on 404 and the API error otherwise.
    pub async fn close_position(&self, symbol: &str) -> Result<CloseOrder> {
        let symbol = validate_symbol(symbol)?;
        let path = format!("/v2/positions/{symbol}");

        let order: CloseOrder = match self.delete(&path).await {
            Err(AlpacaError::Api {
                status_code: 404, ..
            }) => {
                return Err(AlpacaError::PositionNotFound {
                    symbol: symbol.to_string(),
                })
            }
            other => other?,
        };

        info!(
            symbol,
            order_id = order.id.as_deref().unwrap_or("-"),
            status = order.status.as_deref().unwrap_or("-"),
            "Close order submitted"
        );
        Ok(order)
    }
}

#[async_trait]
impl BrokerActions for AlpacaClient {
    async fn close_position(&self, ticker: &str) -> trailstop_core::Result<()> {
        AlpacaClient::close_position(self, ticker)
            .await
            .map(|_| ())
            .map_err(|e| MonitorError::action(ticker, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
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
    async fn close_returns_the_liquidation_order() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/v2/positions/AAPL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "order-1",
                "symbol": "AAPL",
                "status": "accepted"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let order = client(&server).close_position("AAPL").await.unwrap();
        assert_eq!(order.id.as_deref(), Some("order-1"));
    }

    #[tokio::test]
    async fn missing_position_maps_to_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/v2/positions/MSFT"))
            .respond_with(ResponseTemplate::new(404).set_body_string("position does not exist"))
            .mount(&server)
            .await;

        let err = client(&server).close_position("MSFT").await.unwrap_err();
        assert!(matches!(err, AlpacaError::PositionNotFound { .. }));
    }

    #[tokio::test]
    async fn broker_failure_is_ticker_scoped() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/v2/positions/TSLA"))
            .respond_with(ResponseTemplate::new(403).set_body_string("trading blocked"))
            .mount(&server)
            .await;

        let broker: &dyn BrokerActions = &client(&server);
        let err = broker.close_position("TSLA").await.unwrap_err();
        assert!(matches!(err, MonitorError::Action { ref ticker, .. } if ticker == "TSLA"));
        assert!(err.is_ticker_scoped());
    }

    #[tokio::test]
    async fn invalid_symbol_never_reaches_the_network() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server).close_position("../account").await.unwrap_err();
        assert!(matches!(err, AlpacaError::InvalidSymbol(_)));
    }
}
