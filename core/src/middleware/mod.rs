//! Composable request middleware.
//!
//! # Design
//! A chain is an ordered slice of stages followed by a transport. Each stage
//! receives the request and a [`Next`] continuation for the rest of the
//! chain; it may call `next.run(request)` once, or return without calling it
//! to short-circuit everything downstream, including the transport.
//!
//! ```text
//! Connection::execute
//!     → stage[0].handle(request, next)
//!         → stage[1].handle(request, next)
//!             → Transport::send
//! ```

mod cache;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cache::CachedResponse;
use crate::request::ApiRequest;
use crate::transport::{Transport, TransportError};

pub use cache::{CacheMiddleware, CacheQuery, DEFAULT_VARY_HEADERS};

/// Result of running (part of) a middleware chain.
pub type PipelineResult = Result<CachedResponse, TransportError>;

/// One stage of the request pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: &ApiRequest, next: Next<'_>) -> PipelineResult;
}

/// The remainder of a middleware chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Middleware>],
    transport: &'a dyn Transport,
    cancel: &'a CancellationToken,
}

impl<'a> Next<'a> {
    pub fn new(
        stages: &'a [Arc<dyn Middleware>],
        transport: &'a dyn Transport,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            stages,
            transport,
            cancel,
        }
    }

    /// Cancellation token of the call this chain runs for.
    pub fn cancellation(&self) -> &'a CancellationToken {
        self.cancel
    }

    /// Run the next stage, or the transport when no stages remain.
    pub async fn run(self, request: &ApiRequest) -> PipelineResult {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    ..self
                };
                stage.handle(request, next).await
            }
            None => self
                .transport
                .send(request.http(), self.cancel)
                .await
                .map(Arc::new),
        }
    }
}
