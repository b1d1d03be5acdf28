//! The front controller: every path except the health check runs through the
//! request pipeline.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::{Body, to_bytes},
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use super::middleware::RequestId;
use crate::{
    application::{
        context::RequestContext, error::HttpError, pipeline::Pipeline, services::AppServices,
    },
    presentation::views,
};

const UNKNOWN_CLIENT_IP: &str = "0.0.0.0";

#[derive(Clone)]
pub struct HttpState {
    pub services: Arc<AppServices>,
    pub pipeline: Arc<Pipeline<RequestContext>>,
}

pub async fn front_controller(State(state): State<HttpState>, request: Request<Body>) -> Response {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT_IP.to_string());

    let limit = state.services.config.server.max_body_bytes.get();
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, limit).await {
        Ok(body) => body,
        Err(err) => {
            return HttpError::from_error(
                "infra::http::front_controller",
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large",
                &err,
            )
            .into_response();
        }
    };

    let mut ctx = RequestContext::new(
        state.services.clone(),
        request_id,
        parts.method,
        parts.uri,
        parts.headers,
        body,
        client_ip,
    );

    let response = match state.pipeline.handle(&mut ctx).await {
        Ok(response) => response,
        Err(err) => views::render_app_error(&ctx, err),
    };
    ctx.teardown().await;

    (ctx.take_cookies(), response).into_response()
}
