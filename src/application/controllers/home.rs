use std::collections::BTreeSet;

use axum::http::StatusCode;
use futures::{FutureExt, future::BoxFuture};

use super::{issue_csrf_token, layout_chrome};
use crate::{
    application::{
        context::{RequestContext, unix_now},
        error::AppError,
        pipeline::ActionResult,
        security::CSRF_FIELD,
        topics::{current_filter, feed},
    },
    domain::{members::Member, sessions::SessionRecord},
    presentation::views::{
        HomeTemplate, HomeView, LayoutContext, WhosOnlineView, render_localized,
    },
};

pub fn index(ctx: &mut RequestContext) -> BoxFuture<'_, ActionResult> {
    render_index(ctx).boxed()
}

async fn render_index(ctx: &mut RequestContext) -> ActionResult {
    let chrome = layout_chrome(ctx)?;
    let online = whos_online(ctx)?;
    let feed = feed(ctx, current_filter(ctx))?;
    let signed_in = !ctx.member.is_guest();
    let greeting = if signed_in {
        ctx.localization
            .replace("home", "welcomeMember", "name", ctx.member.display())
    } else {
        ctx.localization.get("home", "welcomeGuest")
    };
    let csrf_token = issue_csrf_token(ctx)?;

    let view = LayoutContext::new(
        chrome,
        HomeView {
            greeting,
            signed_in,
            sign_in_url: ctx.url("authentication", "authenticate", &[]),
            sign_out_url: ctx.url("authentication", "signout", &[]),
            csrf_field: CSRF_FIELD,
            csrf_token,
            online,
            feed,
        },
    );
    Ok(render_localized(
        HomeTemplate { view },
        &ctx.localization,
        StatusCode::OK,
    ))
}

fn whos_online(ctx: &RequestContext) -> Result<WhosOnlineView, AppError> {
    let data = ctx.data()?;
    let sessions: Vec<SessionRecord> = data.cache.decode("sessions")?;
    let members: Vec<Member> = data.cache.decode("members")?;
    Ok(summarize_online(&sessions, &members, unix_now()))
}

/// Listed members (once each, by name), bots by name, everyone else as guests.
pub(crate) fn summarize_online(
    sessions: &[SessionRecord],
    members: &[Member],
    now: i64,
) -> WhosOnlineView {
    let mut listed = BTreeSet::new();
    let mut bots = BTreeSet::new();
    let mut guests = 0;

    for session in sessions.iter().filter(|session| !session.is_expired(now)) {
        if session.is_search_bot {
            bots.insert(
                session
                    .search_bot_name
                    .clone()
                    .unwrap_or_else(|| "bot".to_string()),
            );
            continue;
        }
        let member = session
            .is_member()
            .then(|| members.iter().find(|member| member.id == session.member_id))
            .flatten();
        match member {
            Some(member) if session.display_on_whos_online => {
                listed.insert(member.display().to_string());
            }
            Some(_) => {}
            None => guests += 1,
        }
    }

    WhosOnlineView {
        members: listed.into_iter().collect(),
        guests,
        bots: bots.into_iter().collect(),
    }
}
