//! The request pipeline.
//!
//! # Design
//! `Connection` owns the immutable per-client configuration (credential,
//! locale, transport, cache store, middleware stages) and nothing else, so a
//! single instance can serve any number of concurrent calls. Each call:
//!
//! 1. assembles the outbound `HttpRequest` from the caller's `RequestOptions`
//!    (`Authorization`, `Accept-Language`, `X-Schema-Version`, custom headers),
//! 2. runs it through the middleware chain down to the transport, raced
//!    against the caller's cancellation token,
//! 3. classifies status failures, or decodes the body into the caller's type.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::cache::{CacheStore, CachedResponse, MemoryCacheStore, NullCacheStore};
use crate::classify::classify;
use crate::config::{ClientConfig, DEFAULT_BASE_URL};
use crate::error::{ApiError, ConfigError};
use crate::http::{set_header, HttpRequest};
use crate::middleware::{CacheMiddleware, Middleware, Next};
use crate::request::{ApiRequest, RequestOptions};
use crate::transport::{ReqwestTransport, Transport, TransportError};
use crate::types::{ApiResponse, Locale};

/// Executes API calls through the middleware chain.
#[derive(Clone)]
pub struct Connection {
    access_token: Option<String>,
    locale: Locale,
    transport: Arc<dyn Transport>,
    cache_store: Arc<dyn CacheStore>,
    middleware: Arc<[Arc<dyn Middleware>]>,
}

impl Connection {
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::default()
    }

    /// Connection to the public API with an in-memory cache.
    pub fn new(access_token: Option<String>, locale: Locale) -> Result<Self, ConfigError> {
        let mut builder = Self::builder().locale(locale);
        if let Some(token) = access_token {
            builder = builder.access_token(token);
        }
        builder.build()
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport = ReqwestTransport::from_config(config)?;
        let cache_store: Arc<dyn CacheStore> = if config.cache.enabled {
            Arc::new(MemoryCacheStore::new())
        } else {
            Arc::new(NullCacheStore)
        };

        let mut builder = Self::builder()
            .locale(config.locale)
            .transport(Arc::new(transport))
            .cache_store(cache_store);
        if let Some(token) = &config.access_token {
            builder = builder.access_token(token.clone());
        }
        if !config.cache.enabled {
            builder = builder.without_cache_middleware();
        }
        builder.build()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn cache_store(&self) -> &Arc<dyn CacheStore> {
        &self.cache_store
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Assemble the outbound request for `options`. Custom headers from the
    /// options override the connection's defaults.
    pub fn build_request(&self, options: &RequestOptions) -> HttpRequest {
        let mut headers = Vec::new();
        if let Some(token) = &self.access_token {
            set_header(&mut headers, "Authorization", format!("Bearer {token}"));
        }
        set_header(&mut headers, "Accept-Language", self.locale.code());
        if let Some(version) = options.schema_version() {
            set_header(&mut headers, "X-Schema-Version", version);
        }
        for (name, value) in options.headers() {
            set_header(&mut headers, name, value.clone());
        }

        HttpRequest {
            method: options.method(),
            path: options.path().to_string(),
            query: options.query().to_vec(),
            headers,
            body: None,
        }
    }

    /// Execute `options` and decode the body as `T`.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse<T>, ApiError> {
        let http = self.build_request(options);
        let request_headers = http.headers.clone();
        let response = self.dispatch(options, http, cancel).await?;

        let content = serde_json::from_str::<T>(&response.body).map_err(|e| {
            tracing::debug!(path = options.path(), error = %e, "response body did not decode");
            ApiError::Decode {
                message: e.to_string(),
                body: response.body.clone(),
            }
        })?;

        Ok(ApiResponse {
            status: response.status,
            request_headers,
            response_headers: response.headers.clone(),
            content,
        })
    }

    /// Execute `options` without decoding. Cache hits return the stored
    /// response object itself.
    pub async fn execute_raw(
        &self,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<CachedResponse, ApiError> {
        let http = self.build_request(options);
        self.dispatch(options, http, cancel).await
    }

    async fn dispatch(
        &self,
        options: &RequestOptions,
        http: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<CachedResponse, ApiError> {
        let span = tracing::debug_span!(
            "api_request",
            request_id = %Uuid::new_v4(),
            method = %options.method(),
            path = options.path(),
        );

        async move {
            let request = ApiRequest::new(options.clone(), http);
            let result = {
                let chain = Next::new(&self.middleware, self.transport.as_ref(), cancel).run(&request);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(TransportError::Cancelled),
                    result = chain => result,
                }
            };

            match result {
                Ok(response) => Ok(response),
                Err(TransportError::Status(response)) => {
                    let error = classify(request.into_http(), response);
                    tracing::debug!(status = ?error.status(), error = %error, "request failed");
                    Err(error)
                }
                Err(TransportError::Network(message)) => {
                    tracing::debug!(error = %message, "transport failed");
                    Err(ApiError::Transport(message))
                }
                Err(TransportError::Cancelled) => {
                    tracing::debug!("request cancelled");
                    Err(ApiError::Cancelled)
                }
            }
        }
        .instrument(span)
        .await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("locale", &self.locale)
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Connection`].
pub struct ConnectionBuilder {
    access_token: Option<String>,
    locale: Locale,
    base_url: String,
    transport: Option<Arc<dyn Transport>>,
    cache_store: Option<Arc<dyn CacheStore>>,
    middleware: Vec<Arc<dyn Middleware>>,
    cache_middleware: bool,
    error: Option<ConfigError>,
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self {
            access_token: None,
            locale: Locale::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            transport: None,
            cache_store: None,
            middleware: Vec::new(),
            cache_middleware: true,
            error: None,
        }
    }
}

impl ConnectionBuilder {
    /// Access token sent as a bearer credential. Empty tokens are ignored.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.access_token = (!token.is_empty()).then_some(token);
        self
    }

    pub fn locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    /// Set the locale from its two-letter code. Unsupported codes make
    /// [`ConnectionBuilder::build`] fail.
    pub fn locale_code(mut self, code: &str) -> Self {
        match code.parse() {
            Ok(locale) => self.locale = locale,
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Base URL for the default transport. Ignored when a transport is set.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// Append a stage. Stages run in the order added, after the cache.
    pub fn middleware(mut self, stage: Arc<dyn Middleware>) -> Self {
        self.middleware.push(stage);
        self
    }

    pub fn without_cache_middleware(mut self) -> Self {
        self.cache_middleware = false;
        self
    }

    pub fn build(self) -> Result<Connection, ConfigError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.base_url)?),
        };
        let cache_store = self
            .cache_store
            .unwrap_or_else(|| Arc::new(MemoryCacheStore::new()));

        let mut stages: Vec<Arc<dyn Middleware>> = Vec::with_capacity(self.middleware.len() + 1);
        if self.cache_middleware {
            stages.push(Arc::new(CacheMiddleware::new(cache_store.clone())));
        }
        stages.extend(self.middleware);

        Ok(Connection {
            access_token: self.access_token,
            locale: self.locale,
            transport,
            cache_store,
            middleware: stages.into(),
        })
    }
}
