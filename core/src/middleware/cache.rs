//! Response caching keyed by resource path and query shape.
//!
//! # Keys
//! The sub-key depends on how the request addresses the collection:
//!
//! | query              | sub-key                         |
//! |--------------------|---------------------------------|
//! | `ids=all`          | `_all`                          |
//! | `ids=1,2,3`        | one entry per element id        |
//! | `page=P[&page_size=S]` | `_pageP-S` (`S` may be empty) |
//! | anything else      | `_index`                        |
//!
//! Values of the configured vary headers are folded into the category, so
//! two requests that differ only in locale or credential never share an
//! entry. The category is the JSON array `[path, [[name, value], ...]]`,
//! which keeps every path and header value distinct whatever characters
//! they contain.
//!
//! # Bulk requests
//! An `ids` list is never cached as a whole. The response is split into its
//! elements and each is stored under its own `id`, so later requests for a
//! single identifier can be served from those entries.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cache::{expiry_from_headers, CacheStore};
use crate::http::HttpResponse;
use crate::request::ApiRequest;
use crate::transport::TransportError;

use super::{Middleware, Next, PipelineResult};

/// Request headers that distinguish cache entries unless configured otherwise.
pub const DEFAULT_VARY_HEADERS: [&str; 3] = ["Accept-Language", "Authorization", "X-Schema-Version"];

/// The query shapes the cache distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheQuery {
    All,
    Ids(Vec<String>),
    Page {
        page: String,
        page_size: Option<String>,
    },
    Index,
}

impl CacheQuery {
    pub fn from_query(query: &[(String, Option<String>)]) -> Self {
        let param = |name: &str| {
            query
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_deref().unwrap_or_default())
        };

        if let Some(ids) = param("ids") {
            if ids == "all" {
                return CacheQuery::All;
            }
            let ids = ids
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
            return CacheQuery::Ids(ids);
        }
        if let Some(page) = param("page") {
            return CacheQuery::Page {
                page: page.to_string(),
                page_size: param("page_size").map(str::to_string),
            };
        }
        CacheQuery::Index
    }

    /// Sub-key for single-object shapes. Bulk id lists have none.
    pub fn sub_key(&self) -> Option<String> {
        match self {
            CacheQuery::All => Some("_all".to_string()),
            CacheQuery::Ids(_) => None,
            CacheQuery::Page { page, page_size } => Some(format!(
                "_page{page}-{}",
                page_size.as_deref().unwrap_or_default()
            )),
            CacheQuery::Index => Some("_index".to_string()),
        }
    }
}

/// Caches successful responses in a [`CacheStore`].
#[derive(Clone)]
pub struct CacheMiddleware {
    store: Arc<dyn CacheStore>,
    vary_headers: Vec<String>,
}

impl CacheMiddleware {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            vary_headers: DEFAULT_VARY_HEADERS.iter().map(|h| h.to_string()).collect(),
        }
    }

    /// Replace the set of request headers that distinguish entries.
    pub fn with_vary_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vary_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Cache category for `request`: the resource path plus the values of
    /// any vary headers it carries, in configuration order.
    pub fn category(&self, request: &ApiRequest) -> String {
        let varying: Vec<(String, &str)> = self
            .vary_headers
            .iter()
            .filter_map(|name| {
                let value = request.http().header(name)?;
                Some((name.to_ascii_lowercase(), value))
            })
            .collect();
        json!([request.options().path(), varying]).to_string()
    }

    async fn request_single(
        &self,
        category: &str,
        sub_key: &str,
        request: &ApiRequest,
        next: Next<'_>,
    ) -> PipelineResult {
        if let Some(entry) = self.store.try_get(category, sub_key).await {
            if !entry.is_expired() {
                tracing::debug!(category, sub_key, "cache hit");
                return Ok(entry.item);
            }
        }
        tracing::debug!(category, sub_key, "cache miss");

        let cancel = next.cancellation();
        let response = next.run(request).await?;
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let expires_at = expiry_from_headers(&response.headers);
        self.store
            .set(category, sub_key, response.clone(), expires_at)
            .await;
        tracing::debug!(category, sub_key, ?expires_at, "cached response");
        Ok(response)
    }

    async fn request_many(
        &self,
        category: &str,
        request: &ApiRequest,
        next: Next<'_>,
    ) -> PipelineResult {
        let cancel = next.cancellation();
        let response = next.run(request).await?;
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let elements = match split_elements(&response) {
            Ok(elements) => elements,
            Err(e) => {
                tracing::warn!(category, error = %e, "bulk response is not a list, not caching elements");
                return Ok(response);
            }
        };

        let expires_at = expiry_from_headers(&response.headers);
        let count = elements.len();
        for (id, element) in elements {
            self.store
                .set(category, &id, Arc::new(element), expires_at)
                .await;
        }
        tracing::debug!(category, count, ?expires_at, "cached bulk elements");
        Ok(response)
    }

    /// `ids=<one id>`: serve from the element entry when it is live.
    async fn request_one_id(
        &self,
        category: &str,
        id: &str,
        request: &ApiRequest,
        next: Next<'_>,
    ) -> PipelineResult {
        if let Some(entry) = self.store.try_get(category, id).await {
            if !entry.is_expired() {
                tracing::debug!(category, id, "cache hit on element");
                return Ok(Arc::new(HttpResponse {
                    status: entry.item.status,
                    headers: entry.item.headers.clone(),
                    body: format!("[{}]", entry.item.body),
                }));
            }
        }
        self.request_many(category, request, next).await
    }
}

#[async_trait]
impl Middleware for CacheMiddleware {
    async fn handle(&self, request: &ApiRequest, next: Next<'_>) -> PipelineResult {
        let category = self.category(request);
        let query = CacheQuery::from_query(request.options().query());

        match (&query, query.sub_key()) {
            (CacheQuery::Ids(ids), _) if ids.len() == 1 => {
                self.request_one_id(&category, &ids[0], request, next).await
            }
            (_, Some(sub_key)) => {
                self.request_single(&category, &sub_key, request, next)
                    .await
            }
            (_, None) => self.request_many(&category, request, next).await,
        }
    }
}

/// Split a bulk response into `(id, element response)` pairs. Elements
/// without a usable `id` are skipped.
fn split_elements(response: &HttpResponse) -> Result<Vec<(String, HttpResponse)>, serde_json::Error> {
    let elements: Vec<Value> = serde_json::from_str(&response.body)?;
    Ok(elements
        .into_iter()
        .filter_map(|element| {
            let id = element_id(element.get("id")?)?;
            Some((
                id,
                HttpResponse {
                    status: response.status,
                    headers: response.headers.clone(),
                    body: element.to_string(),
                },
            ))
        })
        .collect())
}

fn element_id(id: &Value) -> Option<String> {
    match id {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        Value::Bool(id) => Some(id.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
