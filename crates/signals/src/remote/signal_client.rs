use std::time::Duration;

use async_trait::async_trait;
use common::config::SignalConfig;
use common::models::Signal;
use reqwest::Client;
use tracing::{debug, info};

use crate::{errors::SignalError, remote::SignalEnvelope, traits::SignalSource};

pub struct SignalClient {
    client: Client,
    url: String,
}

impl SignalClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SignalError> {
        Ok(Self {
            client: Client::builder()
                .user_agent("signal_bridge/0.1.0")
                .timeout(timeout)
                .build()?,
            url: url.into(),
        })
    }

    pub fn from_config(config: &SignalConfig) -> Result<Self, SignalError> {
        Self::new(config.url.clone(), config.request_timeout())
    }
}

#[async_trait]
impl SignalSource for SignalClient {
    async fn fetch_signal(&self) -> Result<Option<Signal>, SignalError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SignalError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let envelope: SignalEnvelope = serde_json::from_slice(&bytes)?;

        match envelope.into_signal() {
            Some(signal) => {
                info!(
                    "Received signal: {:?} - {}",
                    signal.action,
                    signal.reason.as_deref().unwrap_or("No reason")
                );
                Ok(Some(signal))
            }
            None => {
                debug!("No fresh signals available");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::SignalAction;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> SignalClient {
        SignalClient::new(
            format!("{}/api/trading-signals", server.uri()),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn returns_pending_signal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/trading-signals"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "signal": {
                    "action": "BUY",
                    "strength": "STRONG",
                    "reason": "Bullish Doji reversal",
                    "timestamp": 1722700000000_i64
                },
                "age_seconds": 3,
                "is_fresh": true
            })))
            .mount(&server)
            .await;

        let signal = client_for(&server).await.fetch_signal().await.unwrap().unwrap();

        assert_eq!(signal.action, Some(SignalAction::Buy));
        assert_eq!(signal.reason.as_deref(), Some("Bullish Doji reversal"));
    }

    #[tokio::test]
    async fn empty_envelope_is_no_signal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/trading-signals"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "signal": null,
                "message": "No fresh signals available"
            })))
            .mount(&server)
            .await;

        let signal = client_for(&server).await.fetch_signal().await.unwrap();

        assert!(signal.is_none());
    }

    #[tokio::test]
    async fn server_error_is_a_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/trading-signals"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Failed to retrieve signal"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.fetch_signal().await.unwrap_err();

        assert!(matches!(err, SignalError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn malformed_json_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/trading-signals"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"signal\": "))
            .mount(&server)
            .await;

        let err = client_for(&server).await.fetch_signal().await.unwrap_err();

        assert!(matches!(err, SignalError::Decode(_)));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"signal": null}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = SignalClient::new(server.uri(), Duration::from_millis(50)).unwrap();
        let err = client.fetch_signal().await.unwrap_err();

        assert!(matches!(err, SignalError::Transport(e) if e.is_timeout()));
    }
}
