use async_trait::async_trait;
use tracing::info;

use crate::{
    application::{
        context::RequestContext,
        error::AppError,
        pipeline::{Middleware, Next, PipelineResult},
        session::MEMBER_TOKEN_COOKIE,
    },
    domain::members::{Member, MemberDevice},
};

/// Resolve the signed-in member from the member token cookie.
///
/// The device row must have been registered from the same user agent; a token
/// replayed from another browser deletes the device row and signs the visitor
/// out.
pub struct ResolveMember;

#[async_trait]
impl Middleware<RequestContext> for ResolveMember {
    fn name(&self) -> &'static str {
        "member"
    }

    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_, RequestContext>) -> PipelineResult {
        ctx.member = resolve(ctx).await?;
        next.run(ctx).await
    }
}

async fn resolve(ctx: &mut RequestContext) -> Result<Member, AppError> {
    let Some(token) = ctx.cookie(MEMBER_TOKEN_COOKIE) else {
        return Ok(Member::guest());
    };

    let devices: Vec<MemberDevice> = ctx.data()?.cache.decode("member_devices")?;
    let Some(device) = devices
        .into_iter()
        .find(|device| !device.token.is_empty() && device.token == token)
    else {
        return Ok(Member::guest());
    };

    if device.user_agent != ctx.user_agent() {
        info!(
            target = "bulletin_fusion::application::phases::member",
            request_id = %ctx.request_id,
            member_id = device.member_id,
            device_id = %device.id,
            "Member token presented from a different user agent; revoking device"
        );
        let data = ctx.data_mut()?;
        data.builder
            .reset()
            .delete("member_devices")
            .filter("id = ?", [device.id.as_str()]);
        data.commit(&["member_devices"]).await?;
        ctx.remove_cookie(MEMBER_TOKEN_COOKIE);
        return Ok(Member::guest());
    }

    let members: Vec<Member> = ctx.data()?.cache.decode("members")?;
    Ok(members
        .into_iter()
        .find(|member| member.id == device.member_id)
        .unwrap_or_else(Member::guest))
}
