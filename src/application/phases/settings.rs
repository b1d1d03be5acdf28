use async_trait::async_trait;

use crate::{
    application::{
        context::RequestContext,
        pipeline::{Middleware, Next, PipelineResult},
    },
    domain::settings::{ForumSettings, SettingRow},
};

/// Decode the `settings` snapshot into typed forum settings.
pub struct LoadSettings;

#[async_trait]
impl Middleware<RequestContext> for LoadSettings {
    fn name(&self) -> &'static str {
        "settings"
    }

    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_, RequestContext>) -> PipelineResult {
        let rows: Vec<SettingRow> = ctx.data()?.cache.decode("settings")?;
        ctx.settings = ForumSettings::from_rows(&rows)?;
        next.run(ctx).await
    }
}
