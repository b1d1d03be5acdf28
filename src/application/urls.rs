//! Link building and route extraction for the three URL formats.

use url::form_urlencoded;

use crate::{
    application::context::{Params, Route},
    domain::types::UrlFormat,
};

/// Link to `controller/action` with parameters, in the configured format.
pub fn build_url(
    format: UrlFormat,
    base_url: &str,
    wrapper: &str,
    controller: &str,
    action: &str,
    params: &[(&str, &str)],
) -> String {
    let base = base_url.trim_end_matches('/');
    match format {
        UrlFormat::None => {
            let mut query = form_urlencoded::Serializer::new(String::new());
            query.append_pair("controller", controller);
            query.append_pair("action", action);
            for (key, value) in params {
                query.append_pair(key, value);
            }
            format!("{base}/{wrapper}?{}", query.finish())
        }
        UrlFormat::Rewrite => format!("{wrapper}?{}", segments(controller, action, params)),
        UrlFormat::ApacheRewrite => format!("{base}{}", segments(controller, action, params)),
    }
}

fn segments(controller: &str, action: &str, params: &[(&str, &str)]) -> String {
    let mut path = format!("/{controller}/{action}");
    for (key, value) in params {
        path.push('/');
        path.push_str(&encode_segment(key));
        path.push('/');
        path.push_str(&encode_segment(value));
    }
    path
}

fn encode_segment(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Pull controller, action and positional parameters out of a request.
///
/// `input` holds the merged query/body parameters and is only consulted for
/// the `none` format.
pub fn resolve_route(
    format: UrlFormat,
    wrapper: &str,
    path: &str,
    query: Option<&str>,
    input: &Params,
) -> Route {
    match format {
        UrlFormat::None => Route::new(input.get("controller"), input.get("action"), input.clone()),
        UrlFormat::Rewrite => {
            let raw = query
                .unwrap_or_default()
                .split('&')
                .next()
                .unwrap_or_default();
            let parts: Vec<&str> = raw.split('/').filter(|part| !part.is_empty()).collect();
            from_segments(&parts)
        }
        UrlFormat::ApacheRewrite => {
            let mut parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
            if parts
                .first()
                .is_some_and(|first| !wrapper.is_empty() && first.contains(wrapper))
            {
                parts.remove(0);
            }
            from_segments(&parts)
        }
    }
}

fn from_segments(parts: &[&str]) -> Route {
    let controller = parts.first().copied();
    let action = parts.get(1).copied();
    let params = parts
        .get(2..)
        .unwrap_or_default()
        .chunks(2)
        .map(|pair| (pair[0], pair.get(1).copied().unwrap_or_default()))
        .collect();
    Route::new(controller, action, params)
}

/// Name of the last configured bot whose name occurs in the user agent.
pub fn detect_search_bot(user_agent: &str, bots: &[String]) -> Option<String> {
    let agent = user_agent.to_ascii_lowercase();
    bots.iter()
        .filter(|bot| !bot.trim().is_empty())
        .filter(|bot| agent.contains(&bot.trim().to_ascii_lowercase()))
        .next_back()
        .map(|bot| bot.trim().to_string())
}
