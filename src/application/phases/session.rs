//! Who-is-online bookkeeping and the visitor's session data.
//!
//! Every request purges expired `sessions` rows, then finds or creates the row
//! for the current visitor. A visitor presenting a member token is attached to
//! the member's existing row when there is one. With IP matching enabled, a row
//! whose recorded IP address or user agent differs from the request is
//! destroyed and the visitor is redirected to start over. Requests for the
//! `resource` controller never write session rows.

use async_trait::async_trait;
use axum::response::{IntoResponse, Redirect};
use serde_json::Map;
use tracing::{debug, info};

use crate::{
    application::{
        context::{RequestContext, unix_now},
        error::AppError,
        pipeline::{Middleware, Next, PipelineResult},
        session::{
            MEMBER_TOKEN_COOKIE, MEMBER_TOKEN_KEY, SESSION_COOKIE, SessionState,
            generate_session_id,
        },
    },
    domain::{
        members::{GUEST_ID, Member, MemberDevice},
        sessions::SessionRecord,
    },
    infra::db::SqlValue,
};

pub struct StartSession;

enum Outcome {
    Continue,
    Restart,
}

#[async_trait]
impl Middleware<RequestContext> for StartSession {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_, RequestContext>) -> PipelineResult {
        let now = unix_now();
        purge_expired(ctx, now).await?;
        open(ctx, now).await?;

        let outcome = match ctx.cookie(MEMBER_TOKEN_COOKIE) {
            Some(token) => attach_member(ctx, &token, now).await?,
            None => attach_guest(ctx, now).await?,
        };

        match outcome {
            Outcome::Continue => next.run(ctx).await,
            Outcome::Restart => Ok(Redirect::to(&ctx.location()).into_response()),
        }
    }
}

async fn purge_expired(ctx: &mut RequestContext, now: i64) -> Result<(), AppError> {
    let store = ctx.services.session_store.clone();
    let data = ctx.data_mut()?;
    data.builder
        .reset()
        .delete("sessions")
        .filter("expires < ?", [now]);
    let purged = data.commit(&["sessions"]).await?.rows_affected();
    let dropped = store.collect_garbage(&mut data.builder, now).await?;
    if purged > 0 || dropped > 0 {
        debug!(
            target = "bulletin_fusion::application::phases::session",
            purged, dropped, "Expired sessions removed"
        );
    }
    Ok(())
}

/// Load the session named by the cookie, or start a new one.
///
/// Ids are only accepted when the server knows them.
async fn open(ctx: &mut RequestContext, now: i64) -> Result<(), AppError> {
    let store = ctx.services.session_store.clone();
    let requested = ctx.cookie(SESSION_COOKIE);

    let mut existing = None;
    if let Some(id) = requested {
        let data = ctx.data_mut()?;
        let known_row = data
            .cache
            .get("sessions")
            .iter()
            .any(|row| row.get_str("id") == Some(id.as_str()));
        match store.read(&mut data.builder, &id, now).await? {
            Some(values) => existing = Some((id, values)),
            None if known_row => existing = Some((id, Map::new())),
            None => {}
        }
    }

    let is_new = existing.is_none();
    let (id, values) = existing.unwrap_or_else(|| (generate_session_id(), Map::new()));
    let duration = ctx.settings.session_duration_minutes * 60;
    let record = SessionRecord {
        id: id.clone(),
        member_id: GUEST_ID,
        expires: now + duration,
        last_click: now,
        location: ctx.location(),
        ip_address: ctx.client_ip.clone(),
        hostname: ctx.host().to_string(),
        user_agent: ctx.user_agent().to_string(),
        display_on_whos_online: false,
        is_search_bot: ctx.search_bot.is_some(),
        search_bot_name: ctx.search_bot.clone(),
        is_admin: false,
    };
    ctx.session = Some(SessionState::new(record, values, is_new));
    if is_new {
        ctx.set_cookie(SESSION_COOKIE, id, None);
    }
    Ok(())
}

fn find_session(ctx: &RequestContext, matches: impl Fn(&SessionRecord) -> bool) -> Result<Option<SessionRecord>, AppError> {
    let rows: Vec<SessionRecord> = ctx.data()?.cache.decode("sessions")?;
    Ok(rows.into_iter().find(|row| matches(row)))
}

fn origin_changed(ctx: &RequestContext, row: &SessionRecord) -> bool {
    ctx.settings.session_ip_matching
        && (row.ip_address != ctx.client_ip || row.user_agent != ctx.user_agent())
}

async fn attach_member(ctx: &mut RequestContext, token: &str, now: i64) -> Result<Outcome, AppError> {
    let devices: Vec<MemberDevice> = ctx.data()?.cache.decode("member_devices")?;
    let Some(device) = devices
        .into_iter()
        .find(|device| !device.token.is_empty() && device.token == token)
    else {
        info!(
            target = "bulletin_fusion::application::phases::session",
            request_id = %ctx.request_id,
            "Unknown member token; starting a fresh session"
        );
        destroy(ctx, true).await?;
        return attach_guest(ctx, now).await;
    };

    let members: Vec<Member> = ctx.data()?.cache.decode("members")?;
    let display = members
        .iter()
        .find(|member| member.id == device.member_id)
        .is_some_and(|member| member.display_on_whos_online);

    let current_id = ctx.session()?.id().to_string();
    let row = match find_session(ctx, |row| row.id == current_id)? {
        Some(row) => Some(row),
        None => find_session(ctx, |row| row.member_id == device.member_id)?,
    };

    match row {
        Some(row) if origin_changed(ctx, &row) => {
            destroy(ctx, false).await?;
            Ok(Outcome::Restart)
        }
        Some(row) => {
            let adopt_id = row.id != current_id;
            {
                let session = ctx.session_mut()?;
                session.record.id = row.id.clone();
                session.record.ip_address = row.ip_address;
                session.record.user_agent = row.user_agent;
                session.record.hostname = row.hostname;
                session.record.is_admin = row.is_admin;
                session.record.member_id = device.member_id;
                session.record.display_on_whos_online = display;
                session.set_data(MEMBER_TOKEN_KEY, token);
            }
            if adopt_id {
                ctx.set_cookie(SESSION_COOKIE, row.id, None);
            }
            update(ctx, now).await?;
            Ok(Outcome::Continue)
        }
        None => {
            {
                let session = ctx.session_mut()?;
                session.record.member_id = device.member_id;
                session.record.display_on_whos_online = display;
                session.set_data(MEMBER_TOKEN_KEY, token);
            }
            create(ctx).await?;
            Ok(Outcome::Continue)
        }
    }
}

async fn attach_guest(ctx: &mut RequestContext, now: i64) -> Result<Outcome, AppError> {
    let current_id = ctx.session()?.id().to_string();
    match find_session(ctx, |row| row.id == current_id)? {
        Some(row) if origin_changed(ctx, &row) => {
            destroy(ctx, false).await?;
            Ok(Outcome::Restart)
        }
        Some(row) => {
            let session = ctx.session_mut()?;
            session.record.ip_address = row.ip_address;
            session.record.user_agent = row.user_agent;
            session.record.hostname = row.hostname;
            become_guest(session);
            update(ctx, now).await?;
            Ok(Outcome::Continue)
        }
        None => {
            become_guest(ctx.session_mut()?);
            create(ctx).await?;
            Ok(Outcome::Continue)
        }
    }
}

fn become_guest(session: &mut SessionState) {
    session.record.member_id = GUEST_ID;
    session.record.display_on_whos_online = false;
    session.record.is_admin = false;
    session.remove_data(MEMBER_TOKEN_KEY);
}

async fn create(ctx: &mut RequestContext) -> Result<(), AppError> {
    if ctx.route.is("resource") {
        return Ok(());
    }
    let record = ctx.session()?.record.clone();
    let data = ctx.data_mut()?;
    data.builder
        .reset()
        .insert(
            "sessions",
            &[
                "id",
                "member_id",
                "expires",
                "last_click",
                "location",
                "ip_address",
                "hostname",
                "user_agent",
                "display_on_whos_online",
                "is_search_bot",
                "search_bot_name",
                "is_admin",
            ],
        )
        .values([
            SqlValue::from(record.id.as_str()),
            record.member_id.into(),
            record.expires.into(),
            record.last_click.into(),
            record.location.as_str().into(),
            record.ip_address.as_str().into(),
            record.hostname.as_str().into(),
            record.user_agent.as_str().into(),
            i64::from(record.display_on_whos_online).into(),
            i64::from(record.is_search_bot).into(),
            record.search_bot_name.clone().into(),
            i64::from(record.is_admin).into(),
        ]);
    data.commit(&["sessions"]).await?;
    Ok(())
}

async fn update(ctx: &mut RequestContext, now: i64) -> Result<(), AppError> {
    if ctx.route.is("resource") {
        return Ok(());
    }
    let duration = ctx.settings.session_duration_minutes * 60;
    let location = ctx.location();
    let session = ctx.session_mut()?;
    session.record.expires = now + duration;
    session.record.last_click = now;
    session.record.location = location;
    let record = session.record.clone();

    let data = ctx.data_mut()?;
    data.builder
        .reset()
        .update("sessions")
        .set([
            ("expires", SqlValue::from(record.expires)),
            ("last_click", record.last_click.into()),
            ("location", record.location.as_str().into()),
            ("member_id", record.member_id.into()),
            (
                "display_on_whos_online",
                i64::from(record.display_on_whos_online).into(),
            ),
        ])
        .filter("id = ?", [record.id.as_str()]);
    data.commit(&["sessions"]).await?;
    Ok(())
}

/// Delete the session row and its data and clear the session cookies.
///
/// With `restart` the request carries on under a fresh session id; otherwise
/// the session is left destroyed so nothing is written back.
pub(crate) async fn destroy(ctx: &mut RequestContext, restart: bool) -> Result<(), AppError> {
    let id = ctx.session()?.id().to_string();
    let store = ctx.services.session_store.clone();

    let data = ctx.data_mut()?;
    data.builder.reset().delete("sessions").filter("id = ?", [id.as_str()]);
    data.commit(&["sessions"]).await?;
    store.destroy(&mut data.builder, &id).await?;

    ctx.remove_cookie(MEMBER_TOKEN_COOKIE);
    let session = ctx.session_mut()?;
    if restart {
        session.regenerate();
        let fresh = session.id().to_string();
        ctx.set_cookie(SESSION_COOKIE, fresh, None);
    } else {
        session.mark_destroyed();
        ctx.remove_cookie(SESSION_COOKIE);
    }
    Ok(())
}
