use axum::http::StatusCode;
use futures::{FutureExt, future::BoxFuture};

use super::{issue_csrf_token, layout_chrome};
use crate::application::{
    context::RequestContext,
    pipeline::ActionResult,
    security::CSRF_FIELD,
    topics::{TopicPage, topic_page},
};
use crate::presentation::views::{LayoutContext, TopicTemplate, TopicView, render_localized};

pub fn view(ctx: &mut RequestContext) -> BoxFuture<'_, ActionResult> {
    render_view(ctx).boxed()
}

async fn render_view(ctx: &mut RequestContext) -> ActionResult {
    let TopicPage {
        topic,
        forum,
        started_by,
        started,
        breadcrumbs,
        like,
        subscribe,
        posts,
    } = topic_page(ctx)?;
    let chrome = layout_chrome(ctx)?;
    let csrf_token = issue_csrf_token(ctx)?;

    let view = LayoutContext::new(
        chrome,
        TopicView {
            id: topic.id,
            title: topic.title,
            forum_title: forum.title,
            started_by,
            started,
            breadcrumbs,
            signed_in: !ctx.member.is_guest(),
            like,
            subscribe,
            posts,
            csrf_field: CSRF_FIELD,
            csrf_token,
        },
    );
    Ok(render_localized(
        TopicTemplate { view },
        &ctx.localization,
        StatusCode::OK,
    ))
}
