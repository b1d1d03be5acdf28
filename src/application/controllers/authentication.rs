use futures::{FutureExt, future::BoxFuture};

use super::{check_csrf, redirect_back};
use crate::{
    application::{
        authentication::{self as auth, validate_credentials},
        context::RequestContext,
        error::AppError,
        pipeline::ActionResult,
    },
    domain::members::Member,
};

pub fn authenticate(ctx: &mut RequestContext) -> BoxFuture<'_, ActionResult> {
    run_authenticate(ctx).boxed()
}

pub fn sign_out(ctx: &mut RequestContext) -> BoxFuture<'_, ActionResult> {
    run_sign_out(ctx).boxed()
}

async fn run_authenticate(ctx: &mut RequestContext) -> ActionResult {
    check_csrf(ctx)?;
    let email = ctx.raw_param("email").unwrap_or_default().to_string();
    let password = ctx.raw_param("password").unwrap_or_default().to_string();
    let remember_me = ctx
        .param("remember_me")
        .is_some_and(|value| !matches!(value, "0" | "false" | "off"));

    let check = validate_credentials(ctx, &email, &password).await?;
    if !check.status {
        return Err(AppError::authentication(check.message.unwrap_or_default()));
    }

    let members: Vec<Member> = ctx.data()?.cache.decode("members")?;
    let member = members
        .into_iter()
        .find(|member| Some(member.id) == check.member_id)
        .ok_or(AppError::NotFound)?;
    auth::complete_sign_in(ctx, &member, remember_me).await?;
    Ok(redirect_back(ctx))
}

async fn run_sign_out(ctx: &mut RequestContext) -> ActionResult {
    auth::sign_out(ctx).await?;
    Ok(redirect_back(ctx))
}
