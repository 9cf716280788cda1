//! Asynchronous request pipeline for the Guild Wars 2 API (v2).
//!
//! # Overview
//! A [`Connection`] turns a [`RequestOptions`] descriptor into an HTTP
//! exchange: it attaches the access token and locale headers, runs the
//! request through an ordered chain of [`Middleware`] stages down to a
//! [`Transport`], classifies failed exchanges into [`ApiError`] variants and
//! decodes successful bodies into the caller's type.
//!
//! # Design
//! - The connection is immutable after construction and `Clone + Send + Sync`;
//!   concurrent calls share it freely.
//! - The network sits behind the [`Transport`] trait. [`ReqwestTransport`] is
//!   the bundled implementation; tests plug in scripted transports.
//! - The response cache is a middleware stage ([`CacheMiddleware`]) over a
//!   pluggable [`CacheStore`]. It understands the API's bulk (`ids=`),
//!   `ids=all`, paged and index request shapes.
//! - Every call takes a `CancellationToken`; a cancelled call yields
//!   [`ApiError::Cancelled`] and never writes to the cache.

pub mod cache;
pub mod classify;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod middleware;
pub mod request;
pub mod transport;
pub mod types;

pub use cache::{CacheStore, CachedEntry, CachedResponse, MemoryCacheStore, NullCacheStore};
pub use classify::{classify, classify_status, Classification};
pub use config::{load_config, CacheConfig, ClientConfig};
pub use connection::{Connection, ConnectionBuilder};
pub use error::{ApiError, AuthorizationKind, BadRequestKind, ConfigError, ErrorDetails, RequestError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use middleware::{CacheMiddleware, Middleware, Next, PipelineResult};
pub use request::{ApiRequest, RequestOptions, RequestOptionsBuilder};
pub use transport::{ReqwestTransport, Transport, TransportError};
pub use types::{ApiResponse, ErrorObject, Locale, PageInfo};

pub use tokio_util::sync::CancellationToken;
