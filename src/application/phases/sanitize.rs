use async_trait::async_trait;
use axum::http::header::CONTENT_TYPE;
use url::form_urlencoded;

use crate::application::{
    context::{Params, RequestContext},
    pipeline::{Middleware, Next, PipelineResult},
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Merge query-string and form-body parameters, trimmed and entity-escaped.
/// Body values win over query values of the same name.
pub struct SanitizeInput;

#[async_trait]
impl Middleware<RequestContext> for SanitizeInput {
    fn name(&self) -> &'static str {
        "sanitize"
    }

    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_, RequestContext>) -> PipelineResult {
        let mut raw = Params::new();
        if let Some(query) = ctx.uri.query() {
            for (key, value) in form_urlencoded::parse(query.as_bytes()) {
                raw.insert(key, value);
            }
        }

        let is_form = ctx
            .header(CONTENT_TYPE)
            .is_some_and(|value| value.starts_with(FORM_CONTENT_TYPE));
        if is_form {
            for (key, value) in form_urlencoded::parse(&ctx.body) {
                raw.insert(key, value);
            }
        }

        ctx.input = raw
            .iter()
            .map(|(key, value)| (key, escape_html(value.trim())))
            .collect();
        ctx.raw_input = raw;
        next.run(ctx).await
    }
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            other => escaped.push(other),
        }
    }
    escaped
}
