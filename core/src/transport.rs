//! The transport boundary: one HTTP exchange per call.
//!
//! # Design
//! `Transport` is the last stage of every middleware chain. Implementations
//! report non-2xx responses as `TransportError::Status` carrying the full
//! response, which the connection hands to the classifier. `ReqwestTransport`
//! is the bundled implementation; tests substitute their own.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::ClientConfig;
use crate::error::ConfigError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Why a transport could not produce a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server answered with a non-2xx status.
    #[error("server responded with status {}", .0.status)]
    Status(HttpResponse),

    /// No response was received.
    #[error("network error: {0}")]
    Network(String),

    #[error("exchange cancelled")]
    Cancelled,
}

/// Performs a single HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`. Must stop and return `TransportError::Cancelled` once
    /// `cancel` fires.
    async fn send(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestTransport {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Result<Self, ConfigError> {
        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
        })
    }

    /// Build a client honoring the configured timeout and user agent.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ConfigError::Transport(e.to_string()))?;
        Self::with_client(&config.base_url, client)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for `request`. Query values of `None` become bare keys.
    pub fn request_url(&self, request: &HttpRequest) -> Result<Url, TransportError> {
        let mut url = self
            .base_url
            .join(&request.path)
            .map_err(|e| TransportError::Network(format!("invalid path `{}`: {e}", request.path)))?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &request.query {
                match value {
                    Some(value) => pairs.append_pair(name, value),
                    None => pairs.append_key_only(name),
                };
            }
        }
        Ok(url)
    }

    async fn exchange(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = self.request_url(request)?;
        let mut builder = self.client.request(reqwest_method(request.method), url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, TransportError> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            result = self.exchange(request) => result?,
        };
        tracing::trace!(status = response.status, path = %request.path, "exchange complete");

        if response.is_success() {
            Ok(response)
        } else {
            Err(TransportError::Status(response))
        }
    }
}

fn reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

/// Parse and normalize a base URL so relative paths join beneath it.
pub(crate) fn parse_base_url(base_url: &str) -> Result<Url, ConfigError> {
    let mut url =
        Url::parse(base_url).map_err(|_| ConfigError::InvalidBaseUrl(base_url.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ConfigError::InvalidBaseUrl(base_url.to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let url = parse_base_url("https://api.guildwars2.com/proxy").unwrap();
        assert_eq!(url.as_str(), "https://api.guildwars2.com/proxy/");
        assert_eq!(
            url.join("v2/items").unwrap().as_str(),
            "https://api.guildwars2.com/proxy/v2/items"
        );
    }

    #[test]
    fn non_http_base_url_is_rejected() {
        assert!(matches!(
            parse_base_url("ftp://example.com"),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            parse_base_url("not a url"),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
    }

    fn request(path: &str, query: Vec<(String, Option<String>)>) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            path: path.to_string(),
            query,
            headers: Vec::new(),
            body: None,
        }
    }

    #[test]
    fn request_url_keeps_bare_keys_and_order() {
        let transport = ReqwestTransport::new("https://api.guildwars2.com").unwrap();
        let url = transport
            .request_url(&request(
                "v2/items",
                vec![
                    ("page".to_string(), Some("3".to_string())),
                    ("flag".to_string(), None),
                    ("ids".to_string(), Some("14,19".to_string())),
                ],
            ))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.guildwars2.com/v2/items?page=3&flag&ids=14%2C19"
        );
    }

    #[test]
    fn request_url_without_query_has_none() {
        let transport = ReqwestTransport::new("https://api.guildwars2.com").unwrap();
        let url = transport.request_url(&request("v2/build", Vec::new())).unwrap();
        assert_eq!(url.as_str(), "https://api.guildwars2.com/v2/build");
        assert_eq!(url.query(), None);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        // Port 9 (discard) on localhost is never contacted: the token is
        // already cancelled and the select is biased towards it.
        let transport = ReqwestTransport::new("http://127.0.0.1:9").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = transport
            .send(&request("v2/build", Vec::new()), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Cancelled);
    }
}
