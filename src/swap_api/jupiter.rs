//! reqwest transport for the Jupiter v6 quote/swap API

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{Quote, QuoteRequest, SwapApi, SwapRequest, SwapResponse};
use crate::errors::SwapApiError;

pub const DEFAULT_JUPITER_URL: &str = "https://quote-api.jup.ag/v6";

/// Error codes the quote endpoint uses when it has no route
const NO_ROUTE_CODES: &[&str] = &[
    "COULD_NOT_FIND_ANY_ROUTE",
    "NO_ROUTES_FOUND",
    "TOKEN_NOT_TRADABLE",
];

#[derive(Debug, Clone)]
pub struct JupiterApi {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl JupiterApi {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, SwapApiError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SwapApiError::Transport(format!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }

    async fn read_json(resp: reqwest::Response) -> Result<(StatusCode, Value), SwapApiError> {
        let status = resp.status();
        let body = resp.text().await?;
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SwapApiError::RateLimited);
        }
        let json = serde_json::from_str::<Value>(&body);
        match json {
            Ok(value) => Ok((status, value)),
            Err(_) if !status.is_success() => {
                Err(SwapApiError::from_status(status.as_u16(), body))
            }
            Err(e) => Err(SwapApiError::Decode(e.to_string())),
        }
    }

    /// A 2xx quote body carrying `error` has no route. A non-2xx body only
    /// counts as no route when its `errorCode` says so.
    fn no_route_reason(status: StatusCode, value: &Value) -> Option<String> {
        let error = value.get("error")?;
        let code = value
            .get("errorCode")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !status.is_success() && !NO_ROUTE_CODES.contains(&code) {
            return None;
        }
        Some(
            error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
        )
    }
}

#[async_trait]
impl SwapApi for JupiterApi {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, SwapApiError> {
        let url = format!("{}/quote", self.base_url);
        let req = self.http.get(&url).query(&[
            ("inputMint", request.input_mint.to_string()),
            ("outputMint", request.output_mint.to_string()),
            ("amount", request.amount.to_string()),
            ("slippageBps", request.slippage_bps.to_string()),
        ]);

        let resp = self.authorize(req).send().await?;
        let (status, value) = Self::read_json(resp).await?;

        if let Some(reason) = Self::no_route_reason(status, &value) {
            debug!(mint = %request.output_mint, reason = %reason, "No route for quote");
            return Err(SwapApiError::NoRoute(reason));
        }
        if !status.is_success() {
            return Err(SwapApiError::from_status(status.as_u16(), value.to_string()));
        }

        serde_json::from_value(value).map_err(|e| SwapApiError::Decode(e.to_string()))
    }

    async fn swap(&self, request: &SwapRequest) -> Result<SwapResponse, SwapApiError> {
        let url = format!("{}/swap", self.base_url);
        let req = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .json(request);

        let resp = self.authorize(req).send().await?;
        let (status, value) = Self::read_json(resp).await?;
        if !status.is_success() {
            return Err(SwapApiError::from_status(status.as_u16(), value.to_string()));
        }

        serde_json::from_value(value).map_err(|e| SwapApiError::Decode(e.to_string()))
    }
}
