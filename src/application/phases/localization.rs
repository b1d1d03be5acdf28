use async_trait::async_trait;
use tracing::warn;

use crate::{
    application::{
        context::RequestContext,
        localization::Localization,
        pipeline::{Middleware, Next, PipelineResult},
    },
    domain::resources::InstalledLocalization,
};

/// Load the member's localization, falling back to the forum default.
pub struct LoadLocalization;

#[async_trait]
impl Middleware<RequestContext> for LoadLocalization {
    fn name(&self) -> &'static str {
        "localization"
    }

    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_, RequestContext>) -> PipelineResult {
        let installed: Vec<InstalledLocalization> =
            ctx.data()?.cache.decode("installed_localizations")?;
        let wanted = ctx
            .member
            .localization_id
            .or(ctx.settings.default_localization_id);

        let chosen = wanted
            .and_then(|id| installed.iter().find(|locale| locale.id == id))
            .or_else(|| installed.iter().find(|locale| locale.is_default))
            .or_else(|| installed.first());

        match chosen {
            Some(locale) => {
                ctx.localization =
                    Localization::load(&ctx.services.config.site.locales_dir, &locale.folder)
                        .await?;
            }
            None => warn!(
                target = "bulletin_fusion::application::phases::localization",
                request_id = %ctx.request_id,
                "No localization installed; strings render as markers"
            ),
        }
        next.run(ctx).await
    }
}
