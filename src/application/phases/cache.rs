use async_trait::async_trait;

use crate::application::{
    context::RequestContext,
    pipeline::{Middleware, Next, PipelineResult},
};

/// Snapshot every registered table for this request.
pub struct BuildSnapshots;

#[async_trait]
impl Middleware<RequestContext> for BuildSnapshots {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_, RequestContext>) -> PipelineResult {
        ctx.data_mut()?.cache.build().await?;
        next.run(ctx).await
    }
}
