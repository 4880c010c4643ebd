use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use common::config::TerminalConfig;
use common::models::{AccountInfo, OpenPosition, OrderRequest, OrderResult, SymbolInfo, Tick};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tracing::{debug, error, info, warn};

use crate::{errors::TerminalError, traits::ExecutionTerminal};

type HmacSha256 = Hmac<Sha256>;

const API_KEY_HEADER: &str = "X-BRIDGE-APIKEY";
const TIMESTAMP_HEADER: &str = "X-BRIDGE-TIMESTAMP";
const SIGNATURE_HEADER: &str = "X-BRIDGE-SIGNATURE";

/// Terminal reached through an HTTP gateway running next to it.
#[derive(Clone)]
pub struct BridgeTerminal {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    secret_key: Option<String>,
}

impl BridgeTerminal {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        secret_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TerminalError> {
        let client = Client::builder()
            .user_agent("signal_bridge/0.1.0")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            secret_key,
        })
    }

    pub fn from_config(config: &TerminalConfig) -> Result<Self, TerminalError> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| TerminalError::Initialize("terminal.url is not set".to_string()))?;
        Self::new(
            url,
            config.api_key.clone(),
            config.api_secret.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn sign(secret: &str, payload: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<Response, TerminalError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method.clone(), &url);

        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }

        if let Some(secret) = &self.secret_key {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis();
            let payload = format!(
                "{}{}{}{}",
                timestamp,
                method.as_str(),
                path,
                body.as_deref().unwrap_or("")
            );
            request = request
                .header(TIMESTAMP_HEADER, timestamp.to_string())
                .header(SIGNATURE_HEADER, Self::sign(secret, &payload));
        }

        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let resp = request.send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TerminalError::Status { status, body });
        }

        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TerminalError> {
        let resp = self.send(Method::GET, path, None).await?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, TerminalError> {
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| TerminalError::Decode(e.to_string()))
    }

    /// 404 on a symbol route means the terminal does not know the symbol.
    fn symbol_error(symbol: &str, err: TerminalError) -> TerminalError {
        match err {
            TerminalError::Status { status, .. } if status == StatusCode::NOT_FOUND.as_u16() => {
                TerminalError::SymbolNotFound(symbol.to_string())
            }
            other => other,
        }
    }
}

#[async_trait]
impl ExecutionTerminal for BridgeTerminal {
    async fn initialize(&self) -> Result<(), TerminalError> {
        self.send(Method::POST, "/initialize", None)
            .await
            .map_err(|e| TerminalError::Initialize(e.to_string()))?;
        Ok(())
    }

    async fn shutdown(&self) {
        if let Err(e) = self.send(Method::POST, "/shutdown", None).await {
            warn!("Terminal shutdown request failed: {}", e);
        }
    }

    async fn account_info(&self) -> Result<AccountInfo, TerminalError> {
        self.get_json("/account")
            .await
            .map_err(|e| match e {
                TerminalError::Status { status, body } => {
                    error!("Account info failed with HTTP {}: {}", status, body);
                    TerminalError::AccountUnavailable(body)
                }
                other => other,
            })
    }

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, TerminalError> {
        self.get_json(&format!("/symbols/{}", symbol))
            .await
            .map_err(|e| Self::symbol_error(symbol, e))
    }

    async fn symbol_select(&self, symbol: &str) -> Result<(), TerminalError> {
        match self
            .send(Method::POST, &format!("/symbols/{}/select", symbol), None)
            .await
        {
            Ok(_) => Ok(()),
            Err(TerminalError::Status { status, .. }) if status == 404 => {
                Err(TerminalError::SymbolNotFound(symbol.to_string()))
            }
            Err(TerminalError::Status { .. }) => {
                Err(TerminalError::SymbolSelect(symbol.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn symbol_tick(&self, symbol: &str) -> Result<Tick, TerminalError> {
        self.get_json(&format!("/symbols/{}/tick", symbol))
            .await
            .map_err(|e| match Self::symbol_error(symbol, e) {
                TerminalError::Decode(_) => TerminalError::TickUnavailable(symbol.to_string()),
                other => other,
            })
    }

    async fn order_send(&self, request: &OrderRequest) -> Result<OrderResult, TerminalError> {
        let body =
            serde_json::to_string(request).map_err(|e| TerminalError::Decode(e.to_string()))?;

        info!(
            "Sending order: {} {} {} (position {:?})",
            request.side, request.volume, request.symbol, request.position
        );

        let resp = self.send(Method::POST, "/orders", Some(body)).await?;
        let result: OrderResult = Self::decode(resp).await?;
        debug!("Order result: {:?}", result);
        Ok(result)
    }

    async fn positions(&self) -> Result<Vec<OpenPosition>, TerminalError> {
        self.get_json("/positions").await
    }
}
