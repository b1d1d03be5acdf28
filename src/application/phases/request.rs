use async_trait::async_trait;
use tracing::debug;

use crate::application::{
    context::RequestContext,
    pipeline::{Middleware, Next, PipelineResult},
    urls::{detect_search_bot, resolve_route},
};

/// Route the request and recognise search bots.
pub struct ResolveRequest;

#[async_trait]
impl Middleware<RequestContext> for ResolveRequest {
    fn name(&self) -> &'static str {
        "request"
    }

    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_, RequestContext>) -> PipelineResult {
        ctx.route = resolve_route(
            ctx.settings.url_format,
            &ctx.services.config.site.wrapper,
            ctx.uri.path(),
            ctx.uri.query(),
            &ctx.input,
        );
        ctx.search_bot = detect_search_bot(ctx.user_agent(), &ctx.settings.search_bot_list);

        debug!(
            target = "bulletin_fusion::application::phases::request",
            request_id = %ctx.request_id,
            controller = %ctx.route.controller,
            action = %ctx.route.action,
            format = %ctx.settings.url_format,
            search_bot = ctx.search_bot.as_deref().unwrap_or(""),
            "Resolved route"
        );
        next.run(ctx).await
    }
}
