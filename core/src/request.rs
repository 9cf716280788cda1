//! Request descriptors for a single logical API call.
//!
//! # Design
//! `RequestOptions` is built once through `RequestOptionsBuilder` and is
//! read-only afterwards: the connection and every middleware stage only get
//! `&RequestOptions`. Validation (duplicate query names, malformed header
//! names) happens in `build()` so a bad descriptor never reaches the network.

use std::fmt::Display;

use reqwest::header::HeaderName;

use crate::error::RequestError;
use crate::http::{find_header, set_header, Headers, HttpMethod, HttpRequest};

/// Immutable descriptor of one logical API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    method: HttpMethod,
    path: String,
    query: Vec<(String, Option<String>)>,
    headers: Headers,
    schema_version: Option<String>,
}

impl RequestOptions {
    /// Start building options for the given resource path, e.g. `v2/items`.
    pub fn builder(path: impl Into<String>) -> RequestOptionsBuilder {
        RequestOptionsBuilder {
            options: RequestOptions {
                method: HttpMethod::Get,
                path: path.into().trim_start_matches('/').to_string(),
                query: Vec::new(),
                headers: Vec::new(),
                schema_version: None,
            },
            error: None,
        }
    }

    /// Options for a plain `GET` of `path` with no query or headers.
    pub fn get(path: impl Into<String>) -> Self {
        Self::builder(path).options
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// The resource path, independent of query parameters.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, Option<String>)] {
        &self.query
    }

    /// Value of a query parameter. Returns `Some(None)` for a bare key.
    pub fn query_param(&self, name: &str) -> Option<Option<&str>> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_deref())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn schema_version(&self) -> Option<&str> {
        self.schema_version.as_deref()
    }
}

/// Builder for [`RequestOptions`]. The first validation failure is kept and
/// reported by [`RequestOptionsBuilder::build`].
#[derive(Debug, Clone)]
pub struct RequestOptionsBuilder {
    options: RequestOptions,
    error: Option<RequestError>,
}

impl RequestOptionsBuilder {
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.options.method = method;
        self
    }

    /// Append a query parameter. Names must be unique.
    pub fn query(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        let name = name.into();
        if self.error.is_none() && self.options.query.iter().any(|(key, _)| *key == name) {
            self.error = Some(RequestError::DuplicateQueryParameter(name));
            return self;
        }
        self.options.query.push((name, value));
        self
    }

    /// `ids=<a>,<b>,...` for a bulk fetch by identifier.
    pub fn ids<I, T>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        let joined = ids
            .into_iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.query("ids", Some(joined))
    }

    /// `ids=all` for the full collection.
    pub fn all(self) -> Self {
        self.query("ids", Some("all".to_string()))
    }

    /// `page=<page>` and, when given, `page_size=<size>`.
    pub fn page(self, page: u32, page_size: Option<u32>) -> Self {
        let builder = self.query("page", Some(page.to_string()));
        match page_size {
            Some(size) => builder.query("page_size", Some(size.to_string())),
            None => builder,
        }
    }

    /// Extra request header. A later header with the same name (in any case)
    /// replaces the earlier one.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        if self.error.is_none() && HeaderName::from_bytes(name.as_bytes()).is_err() {
            self.error = Some(RequestError::InvalidHeaderName(name.to_string()));
            return self;
        }
        set_header(&mut self.options.headers, name, value);
        self
    }

    /// Pin the endpoint schema version (`X-Schema-Version`).
    pub fn schema_version(mut self, version: impl Into<String>) -> Self {
        self.options.schema_version = Some(version.into());
        self
    }

    pub fn build(self) -> Result<RequestOptions, RequestError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.options),
        }
    }
}

/// A request as it travels through the middleware chain: the caller's
/// options next to the fully assembled outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    options: RequestOptions,
    http: HttpRequest,
}

impl ApiRequest {
    pub fn new(options: RequestOptions, http: HttpRequest) -> Self {
        Self { options, http }
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn http(&self) -> &HttpRequest {
        &self.http
    }

    pub fn into_http(self) -> HttpRequest {
        self.http
    }
}
