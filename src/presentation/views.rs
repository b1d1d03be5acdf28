use crate::application::{
    context::RequestContext,
    error::{AppError, HttpError},
    localization::Localization,
};
use askama::{Error as AskamaError, Template};
use axum::{
    Json,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Render, then substitute `${[category][key]}` placeholders from the locale.
pub fn render_localized<T: Template>(
    template: T,
    localization: &Localization,
    status: StatusCode,
) -> Response {
    match render_template(template) {
        Ok(Html(body)) => (status, Html(localization.render_placeholders(&body))).into_response(),
        Err(err) => err.into_response(),
    }
}

/// `{status, data?, message?}`, the envelope every JSON action answers with.
#[derive(Debug, Serialize)]
pub struct JsonEnvelope<T> {
    pub status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn json_success<T: Serialize>(data: T) -> Response {
    Json(JsonEnvelope {
        status: true,
        data: Some(data),
        message: None,
    })
    .into_response()
}

pub fn json_failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(JsonEnvelope::<()> {
            status: false,
            data: None,
            message: Some(message.into()),
        }),
    )
        .into_response()
}

/// Shared page furniture.
#[derive(Clone)]
pub struct LayoutChrome {
    pub title: String,
    pub home_url: String,
    pub stylesheet_url: String,
    pub script_url: String,
    pub webfont_url: Option<String>,
}

impl LayoutChrome {
    /// Title only, for pages rendered before the request is fully resolved.
    pub fn bare(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            home_url: "/".to_string(),
            stylesheet_url: String::new(),
            script_url: String::new(),
            webfont_url: None,
        }
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub chrome: LayoutChrome,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self { chrome, content }
    }
}

pub struct WhosOnlineView {
    pub members: Vec<String>,
    pub guests: usize,
    pub bots: Vec<String>,
}

impl WhosOnlineView {
    pub fn total(&self) -> usize {
        self.members.len() + self.guests + self.bots.len()
    }
}

pub struct HomeView {
    pub greeting: String,
    pub signed_in: bool,
    pub sign_in_url: String,
    pub sign_out_url: String,
    pub csrf_field: &'static str,
    pub csrf_token: String,
    pub online: WhosOnlineView,
    pub feed: FeedView,
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub view: LayoutContext<HomeView>,
}

pub struct FilterOption {
    pub value: &'static str,
    pub label: String,
    pub checked: bool,
}

/// One topic card in the home feed.
pub struct TopicSnapshotView {
    pub topic_title: String,
    pub topic_url: String,
    pub forum_title: String,
    pub forum_color: String,
    pub forum_text_color: String,
    pub started_by: String,
    pub replied: Option<String>,
    pub total_replies: String,
    pub total_views: String,
    pub preview: String,
}

pub struct FeedView {
    pub filter: &'static str,
    pub filter_name: String,
    pub filters: Vec<FilterOption>,
    pub items: Vec<TopicSnapshotView>,
    pub load_more: bool,
}

#[derive(Template)]
#[template(path = "partials/topic_snapshot.html")]
pub struct TopicSnapshotTemplate<'a> {
    pub item: &'a TopicSnapshotView,
}

pub struct Breadcrumb {
    pub label: String,
    pub url: Option<String>,
}

/// A like or subscribe toggle handled by the ajax script.
pub struct ReactionButton {
    pub toggle: &'static str,
    pub content_type: &'static str,
    pub content_id: i64,
    pub label: String,
    pub active: bool,
    pub total: String,
}

pub struct PostView {
    pub author: String,
    pub posted: String,
    pub content: String,
}

pub struct TopicView {
    pub id: i64,
    pub title: String,
    pub forum_title: String,
    pub started_by: String,
    pub started: String,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub signed_in: bool,
    pub like: ReactionButton,
    pub subscribe: ReactionButton,
    pub posts: Vec<PostView>,
    pub csrf_field: &'static str,
    pub csrf_token: String,
}

#[derive(Template)]
#[template(path = "topic.html")]
pub struct TopicTemplate {
    pub view: LayoutContext<TopicView>,
}

/// Render a fragment for embedding in a JSON reply.
pub fn render_fragment<T: Template>(template: T) -> Result<String, AppError> {
    template
        .render()
        .map_err(|err| AppError::unexpected(format!("template rendering failed: {err}")))
}

pub struct ErrorPageView {
    pub status: u16,
    pub title: String,
    pub message: String,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

/// Text safe to show the visitor for a failed action.
pub fn visible_message(err: &AppError) -> String {
    match err {
        AppError::Authentication(message) | AppError::Validation(message) => message.clone(),
        other => other.presentation_message().to_string(),
    }
}

/// Turn a failed action into a response: the JSON envelope for `ajax`
/// actions, an error page otherwise. The error report rides along for the
/// response logger.
pub fn render_app_error(ctx: &RequestContext, err: AppError) -> Response {
    let status = err.status_code();
    let message = visible_message(&err);
    let report = err.report();

    let mut response = if ctx.route.is("ajax") {
        json_failure(status, message)
    } else {
        let title = if ctx.settings.community_title.is_empty() {
            "Bulletin Fusion".to_string()
        } else {
            ctx.settings.community_title.clone()
        };
        let view = LayoutContext::new(
            LayoutChrome {
                home_url: ctx.url("home", "index", &[]),
                ..LayoutChrome::bare(title)
            },
            ErrorPageView {
                status: status.as_u16(),
                title: status
                    .canonical_reason()
                    .unwrap_or("Error")
                    .to_string(),
                message,
            },
        );
        render_localized(ErrorTemplate { view }, &ctx.localization, status)
    };
    report.attach(&mut response);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_pages_escape_messages() {
        let view = LayoutContext::new(
            LayoutChrome::bare("Forum"),
            ErrorPageView {
                status: 400,
                title: "Bad Request".into(),
                message: "<script>alert(1)</script>".into(),
            },
        );
        let html = ErrorTemplate { view }.render().expect("render");
        assert!(html.contains("Bad Request"));
        assert!(html.contains("&#60;script&#62;") || html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
    }

    #[test]
    fn visible_messages_keep_user_facing_detail() {
        assert_eq!(
            visible_message(&AppError::authentication("Locked for 5 minutes.")),
            "Locked for 5 minutes."
        );
        assert_eq!(
            visible_message(&AppError::unexpected("stack trace")),
            "Unexpected error occurred"
        );
    }

    #[test]
    fn envelopes_skip_absent_fields() {
        let json = serde_json::to_value(JsonEnvelope {
            status: true,
            data: Some(serde_json::json!({"liked": true})),
            message: None,
        })
        .expect("json");
        assert_eq!(json, serde_json::json!({"status": true, "data": {"liked": true}}));
    }

    #[test]
    fn home_page_lists_who_is_online() {
        let locale = Localization::from_json(
            None,
            r#"{"home":{"whosOnline":"Online now","guests":"Guests"}}"#,
        )
        .expect("locale");
        let view = LayoutContext::new(
            LayoutChrome::bare("Forum"),
            HomeView {
                greeting: "Welcome, Guest".into(),
                signed_in: false,
                sign_in_url: "/index?controller=authentication&action=authenticate".into(),
                sign_out_url: String::new(),
                csrf_field: "csrf_token",
                csrf_token: "dG9rZW4=".into(),
                online: WhosOnlineView {
                    members: vec!["sam".into(), "kit".into()],
                    guests: 2,
                    bots: Vec::new(),
                },
                feed: FeedView {
                    filter: "latest",
                    filter_name: "Latest".into(),
                    filters: Vec::new(),
                    items: Vec::new(),
                    load_more: false,
                },
            },
        );
        let html = HomeTemplate { view }.render().expect("render");
        let html = locale.render_placeholders(&html);
        assert!(html.contains("Online now (4)"));
        assert!(html.contains("<span class=\"member\">sam</span>, <span class=\"member\">kit</span>"));
        assert!(html.contains("Guests: 2"));
        assert!(!html.contains("class=\"bots\""));
        assert!(html.contains("name=\"csrf_token\" value=\"dG9rZW4=\""));
        assert!(html.contains("class=\"feed-empty\""));
    }

    fn snapshot() -> TopicSnapshotView {
        TopicSnapshotView {
            topic_title: "Hello <world>".into(),
            topic_url: "/index?controller=topics&action=view&topic=3-hello-world".into(),
            forum_title: "General".into(),
            forum_color: "#336699".into(),
            forum_text_color: "#ffffff".into(),
            started_by: "Started by sam 2 hours ago".into(),
            replied: Some("kit replied Just now".into()),
            total_replies: "1.2K".into(),
            total_views: "25.6K".into(),
            preview: "First words...".into(),
        }
    }

    #[test]
    fn topic_snapshots_render_as_fragments() {
        let item = snapshot();
        let html = render_fragment(TopicSnapshotTemplate { item: &item }).expect("render");
        assert!(html.contains("Hello &#60;world&#62;") || html.contains("Hello &lt;world&gt;"));
        assert!(html.contains("topic=3-hello-world"));
        assert!(html.contains("kit replied Just now"));
        assert!(html.contains("25.6K"));
        assert!(html.contains("background-color: #336699"));
    }

    #[test]
    fn topic_pages_show_breadcrumbs_and_toggles() {
        let view = LayoutContext::new(
            LayoutChrome::bare("Forum"),
            TopicView {
                id: 3,
                title: "Hello world".into(),
                forum_title: "General".into(),
                started_by: "Started by sam".into(),
                started: "2 hours ago".into(),
                breadcrumbs: vec![
                    Breadcrumb {
                        label: "Forums".into(),
                        url: Some("/".into()),
                    },
                    Breadcrumb {
                        label: "General".into(),
                        url: None,
                    },
                ],
                signed_in: true,
                like: ReactionButton {
                    toggle: "like",
                    content_type: "topic",
                    content_id: 3,
                    label: "Like".into(),
                    active: true,
                    total: "2".into(),
                },
                subscribe: ReactionButton {
                    toggle: "subscribe",
                    content_type: "topic",
                    content_id: 3,
                    label: "Subscribe".into(),
                    active: false,
                    total: "0".into(),
                },
                posts: vec![PostView {
                    author: "sam".into(),
                    posted: "2 hours ago".into(),
                    content: "Opening post".into(),
                }],
                csrf_field: "csrf_token",
                csrf_token: "dG9rZW4=".into(),
            },
        );
        let html = TopicTemplate { view }.render().expect("render");
        assert!(html.contains("<a href=\"/\">Forums</a>"));
        assert!(html.contains("<span>General</span>"));
        assert!(html.contains("data-toggle=\"like\""));
        assert!(html.contains("class=\"reaction active\""));
        assert!(html.contains("<span class=\"total\">2</span>"));
        assert!(html.contains("Opening post"));
    }
}
