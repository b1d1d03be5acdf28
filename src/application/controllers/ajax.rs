use axum::{Json, response::IntoResponse};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use futures::{FutureExt, future::BoxFuture};
use serde_json::json;

use super::check_csrf;
use crate::{
    application::{
        authentication::validate_credentials,
        context::RequestContext,
        error::AppError,
        pipeline::ActionResult,
        reactions,
        topics::{HOME_FILTER_KEY, feed},
    },
    domain::{content::HomeFilter, types::ReactionKind},
    presentation::views::{JsonEnvelope, TopicSnapshotTemplate, json_success, render_fragment},
};

pub fn preauthorize(ctx: &mut RequestContext) -> BoxFuture<'_, ActionResult> {
    run_preauthorize(ctx).boxed()
}

pub fn snapshots(ctx: &mut RequestContext) -> BoxFuture<'_, ActionResult> {
    run_snapshots(ctx).boxed()
}

pub fn toggle_like(ctx: &mut RequestContext) -> BoxFuture<'_, ActionResult> {
    toggle(ctx, ReactionKind::Like).boxed()
}

pub fn toggle_subscribe(ctx: &mut RequestContext) -> BoxFuture<'_, ActionResult> {
    toggle(ctx, ReactionKind::Subscription).boxed()
}

/// Check an email and base64-encoded password without signing in.
async fn run_preauthorize(ctx: &mut RequestContext) -> ActionResult {
    let email = ctx.raw_param("email").unwrap_or_default().to_string();
    let password = decode_password(ctx.raw_param("password").unwrap_or_default())?;

    let check = validate_credentials(ctx, &email, &password).await?;
    Ok(Json(JsonEnvelope {
        status: check.status,
        message: check.message.clone(),
        data: Some(check),
    })
    .into_response())
}

/// Feed cards for the requested filter, which becomes the visitor's default.
async fn run_snapshots(ctx: &mut RequestContext) -> ActionResult {
    let requested = ctx.param("filter").unwrap_or_default().to_string();
    let filter: HomeFilter = requested.parse().map_err(|_| {
        let shown = if requested.is_empty() {
            ctx.localization.get("global", "unknown")
        } else {
            requested.clone()
        };
        AppError::validation(
            ctx.localization
                .replace("errors", "frontFilterNotFound", "filter", shown),
        )
    })?;
    ctx.session_mut()?
        .set_data(HOME_FILTER_KEY, filter.as_str());

    let feed = feed(ctx, filter)?;
    let mut html = String::new();
    for item in &feed.items {
        html.push_str(&render_fragment(TopicSnapshotTemplate { item })?);
    }
    Ok(json_success(json!({
        "filter": filter.as_str(),
        "snapshots": ctx.localization.render_placeholders(&html),
        "loadMoreButton": feed.load_more,
    })))
}

fn decode_password(encoded: &str) -> Result<String, AppError> {
    STANDARD
        .decode(encoded.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| AppError::validation("`password` must be base64-encoded UTF-8"))
}

async fn toggle(ctx: &mut RequestContext, kind: ReactionKind) -> ActionResult {
    check_csrf(ctx)?;
    let payload = reactions::toggle(ctx, kind).await?;
    Ok(json_success(payload))
}
