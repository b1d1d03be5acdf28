use async_trait::async_trait;

use crate::application::{
    context::RequestContext,
    pipeline::{Middleware, Next, PipelineResult},
};

/// Check a connection out of the pool for the rest of the request.
pub struct OpenDatabase;

#[async_trait]
impl Middleware<RequestContext> for OpenDatabase {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_, RequestContext>) -> PipelineResult {
        let data = ctx.services.request_data();
        data.db.connect().await?;
        ctx.data = Some(data);
        next.run(ctx).await
    }
}
