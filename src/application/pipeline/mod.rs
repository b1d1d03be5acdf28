//! Ordered request pipeline.
//!
//! Middleware run first-added first. Each receives the request context and a
//! [`Next`] continuation; awaiting [`Next::run`] hands control to the following
//! middleware, and the last continuation calls the terminal [`Endpoint`].
//! Returning without running `next` short-circuits the rest of the chain.

mod dispatch;

pub use dispatch::{Action, ActionResult, Dispatcher, RouteTable};

use std::{fmt, sync::Arc, time::Instant};

use async_trait::async_trait;
use axum::response::Response;
use metrics::histogram;

use crate::application::error::AppError;

pub const METRIC_PIPELINE_MS: &str = "bulletin_pipeline_ms";

pub type PipelineResult = Result<Response, AppError>;

#[async_trait]
pub trait Middleware<C: Send + 'static>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &mut C, next: Next<'_, C>) -> PipelineResult;
}

#[async_trait]
pub trait Endpoint<C: Send + 'static>: Send + Sync {
    async fn call(&self, ctx: &mut C) -> PipelineResult;
}

/// The remainder of the chain after the current middleware.
pub struct Next<'a, C: Send + 'static> {
    middleware: &'a [Arc<dyn Middleware<C>>],
    endpoint: &'a dyn Endpoint<C>,
}

impl<C: Send + 'static> Next<'_, C> {
    pub async fn run(self, ctx: &mut C) -> PipelineResult {
        match self.middleware.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    middleware: rest,
                    endpoint: self.endpoint,
                };
                current.handle(ctx, next).await
            }
            None => self.endpoint.call(ctx).await,
        }
    }
}

pub struct Pipeline<C: Send + 'static> {
    middleware: Vec<Arc<dyn Middleware<C>>>,
    endpoint: Arc<dyn Endpoint<C>>,
}

impl<C: Send + 'static> fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("middleware", &self.names())
            .finish_non_exhaustive()
    }
}

impl<C: Send + 'static> Pipeline<C> {
    pub fn new(endpoint: impl Endpoint<C> + 'static) -> Self {
        Self {
            middleware: Vec::new(),
            endpoint: Arc::new(endpoint),
        }
    }

    pub fn add_middleware(&mut self, middleware: impl Middleware<C> + 'static) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    pub async fn handle(&self, ctx: &mut C) -> PipelineResult {
        let start = Instant::now();
        let next = Next {
            middleware: &self.middleware,
            endpoint: self.endpoint.as_ref(),
        };
        let result = next.run(ctx).await;
        histogram!(METRIC_PIPELINE_MS).record(start.elapsed().as_secs_f64() * 1000.0);
        result
    }
}
