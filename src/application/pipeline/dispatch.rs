use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use axum::response::Response;
use futures::future::BoxFuture;
use tracing::debug;

use super::{Endpoint, PipelineResult};
use crate::{
    application::{context::RequestContext, error::AppError},
    presentation::views,
};

pub type ActionResult = Result<Response, AppError>;

/// A controller action.
pub type Action = for<'a> fn(&'a mut RequestContext) -> BoxFuture<'a, ActionResult>;

/// `(controller, action)` → handler, registered once at startup.
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: HashMap<(String, String), Action>,
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .routes
            .keys()
            .map(|(controller, action)| format!("{controller}/{action}"))
            .collect();
        keys.sort();
        f.debug_struct("RouteTable").field("routes", &keys).finish()
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, controller: &str, action: &str, handler: Action) -> Self {
        self.routes.insert(
            (controller.to_ascii_lowercase(), action.to_ascii_lowercase()),
            handler,
        );
        self
    }

    pub fn resolve(&self, controller: &str, action: &str) -> Option<Action> {
        self.routes
            .get(&(controller.to_ascii_lowercase(), action.to_ascii_lowercase()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Terminal step: run the routed action, render its failure, then tear down.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    routes: RouteTable,
}

impl Dispatcher {
    pub fn new(routes: RouteTable) -> Self {
        Self { routes }
    }
}

#[async_trait]
impl Endpoint<RequestContext> for Dispatcher {
    async fn call(&self, ctx: &mut RequestContext) -> PipelineResult {
        let controller = ctx.route.controller.clone();
        let action = ctx.route.action.clone();
        debug!(
            target = "bulletin_fusion::application::pipeline::dispatch",
            request_id = %ctx.request_id,
            controller = %controller,
            action = %action,
            "Dispatching"
        );

        let result = match self.routes.resolve(&controller, &action) {
            Some(handler) => handler(ctx).await,
            None => Err(AppError::route_not_found(&controller, &action)),
        };

        let response = match result {
            Ok(response) => response,
            Err(err) => views::render_app_error(ctx, err),
        };

        ctx.teardown().await;
        Ok(response)
    }
}
