//! Controller actions and the route table that maps `(controller, action)` to them.

mod ajax;
mod authentication;
mod home;
mod resource;
mod topics;

use axum::{
    http::header,
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    application::{
        context::{RequestContext, unix_now},
        error::AppError,
        pipeline::RouteTable,
        security::{CSRF_FIELD, ClientOrigin, csrf_token, validate_csrf},
    },
    domain::resources::InstalledWebfont,
    presentation::views::LayoutChrome,
};

const DEFAULT_TITLE: &str = "Bulletin Fusion";

/// Every action the forum serves.
pub fn standard_routes() -> RouteTable {
    RouteTable::new()
        .route("home", "index", home::index)
        .route("topics", "view", topics::view)
        .route("ajax", "preauthorize", ajax::preauthorize)
        .route("ajax", "snapshots", ajax::snapshots)
        .route("ajax", "togglelike", ajax::toggle_like)
        .route("ajax", "togglesubscribe", ajax::toggle_subscribe)
        .route("authentication", "authenticate", authentication::authenticate)
        .route("authentication", "signout", authentication::sign_out)
        .route("resource", "css", resource::css)
        .route("resource", "js", resource::js)
        .route("resource", "webfont", resource::webfont)
}

pub(crate) fn layout_chrome(ctx: &RequestContext) -> Result<LayoutChrome, AppError> {
    let title = if ctx.settings.community_title.trim().is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        ctx.settings.community_title.clone()
    };

    let webfont_url = match ctx.settings.default_webfont_id {
        Some(id) => {
            let fonts: Vec<InstalledWebfont> = ctx.data()?.cache.decode("installed_webfonts")?;
            fonts
                .iter()
                .find(|font| font.id == id)
                .map(|font| ctx.url("resource", "webfont", &[("font", font.font_family_name.as_str())]))
        }
        None => None,
    };

    Ok(LayoutChrome {
        title,
        home_url: ctx.url("home", "index", &[]),
        stylesheet_url: ctx.url("resource", "css", &[("file", "common")]),
        script_url: ctx.url("resource", "js", &[("file", "ajax")]),
        webfont_url,
    })
}

/// The session's CSRF token, issuing one when needed.
pub(crate) fn issue_csrf_token(ctx: &mut RequestContext) -> Result<String, AppError> {
    let policy = ctx.csrf_policy();
    let ip = ctx.client_ip.clone();
    let user_agent = ctx.user_agent().to_string();
    let session = ctx.session_mut()?;
    Ok(csrf_token(
        &policy,
        session,
        ClientOrigin {
            ip: &ip,
            user_agent: &user_agent,
        },
        unix_now(),
    ))
}

/// Reject the request unless it carries the session's CSRF token.
pub(crate) fn check_csrf(ctx: &mut RequestContext) -> Result<(), AppError> {
    let policy = ctx.csrf_policy();
    let submitted = ctx.raw_param(CSRF_FIELD).map(str::to_string);
    let ip = ctx.client_ip.clone();
    let user_agent = ctx.user_agent().to_string();
    let session = ctx.session_mut()?;
    validate_csrf(
        &policy,
        session,
        submitted.as_deref(),
        ClientOrigin {
            ip: &ip,
            user_agent: &user_agent,
        },
        unix_now(),
    )?;
    Ok(())
}

/// Where to send the visitor after a form action: an explicit same-site
/// `redirect` parameter, else a same-site referer, else the home page.
pub(crate) fn redirect_back(ctx: &RequestContext) -> Response {
    let base = ctx.services.config.site.base_url.trim_end_matches('/');
    let requested = ctx
        .raw_param("redirect")
        .filter(|target| is_local_path(target));
    let referer = ctx
        .header(header::REFERER)
        .filter(|target| is_local_path(target) || (!base.is_empty() && target.starts_with(base)));

    let target = requested
        .or(referer)
        .map(str::to_string)
        .unwrap_or_else(|| ctx.url("home", "index", &[]));
    Redirect::to(&target).into_response()
}

fn is_local_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_action_is_registered() {
        let routes = standard_routes();
        assert_eq!(routes.len(), 11);
        for (controller, action) in [
            ("home", "index"),
            ("topics", "View"),
            ("ajax", "preauthorize"),
            ("ajax", "snapshots"),
            ("ajax", "ToggleLike"),
            ("ajax", "togglesubscribe"),
            ("authentication", "authenticate"),
            ("authentication", "signout"),
            ("resource", "css"),
            ("resource", "js"),
            ("resource", "webFont"),
        ] {
            assert!(routes.resolve(controller, action).is_some(), "{controller}/{action}");
        }
        assert!(routes.resolve("forums", "view").is_none());
    }

    #[test]
    fn only_local_paths_are_redirect_targets() {
        assert!(is_local_path("/index?controller=home"));
        assert!(!is_local_path("//evil.test/"));
        assert!(!is_local_path("https://evil.test/"));
        assert!(!is_local_path("/\\evil.test"));
    }
}
