use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use futures::{FutureExt, future::BoxFuture};

use crate::application::{
    context::RequestContext, error::AppError, pipeline::ActionResult, resources,
};

const CSS: &str = "text/css; charset=utf-8";
const JAVASCRIPT: &str = "application/javascript; charset=utf-8";

pub fn css(ctx: &mut RequestContext) -> BoxFuture<'_, ActionResult> {
    async move {
        let file = required(ctx, "file")?;
        let body = resources::theme_css(ctx, &file).await?;
        Ok(source(CSS, body))
    }
    .boxed()
}

pub fn js(ctx: &mut RequestContext) -> BoxFuture<'_, ActionResult> {
    async move {
        let file = required(ctx, "file")?;
        let body = resources::script(ctx, &file).await?;
        Ok(source(JAVASCRIPT, body))
    }
    .boxed()
}

pub fn webfont(ctx: &mut RequestContext) -> BoxFuture<'_, ActionResult> {
    async move {
        let font = required(ctx, "font")?;
        Ok(source(CSS, resources::webfont(ctx, &font)?))
    }
    .boxed()
}

fn required(ctx: &RequestContext, key: &'static str) -> Result<String, AppError> {
    ctx.param(key)
        .map(str::to_string)
        .ok_or_else(|| AppError::validation(format!("`{key}` is required")))
}

fn source(content_type: &'static str, body: String) -> Response {
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}
