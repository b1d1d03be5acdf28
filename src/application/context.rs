//! Per-request state threaded through the pipeline.

use std::{collections::BTreeMap, sync::Arc};

use axum::http::{HeaderMap, Method, Uri, header};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::warn;

use crate::{
    application::{
        error::AppError,
        localization::Localization,
        security::{ClientOrigin, CsrfPolicy},
        services::AppServices,
        session::SessionState,
        urls,
    },
    cache::{CacheRegistry, SnapshotCache},
    domain::{members::Member, settings::ForumSettings},
    infra::db::{DatabaseProvider, QueryBuilder, ResultSet},
};

pub const DEFAULT_CONTROLLER: &str = "home";
pub const DEFAULT_ACTION: &str = "index";

pub fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Named request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Present and non-blank.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.trim().is_empty())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|value| value.trim().parse().ok())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Resolved `(controller, action)` plus positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub controller: String,
    pub action: String,
    pub params: Params,
}

impl Default for Route {
    fn default() -> Self {
        Self {
            controller: DEFAULT_CONTROLLER.to_string(),
            action: DEFAULT_ACTION.to_string(),
            params: Params::new(),
        }
    }
}

impl Route {
    pub fn new(controller: Option<&str>, action: Option<&str>, params: Params) -> Self {
        let normalize = |value: Option<&str>, fallback: &str| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(fallback)
                .to_ascii_lowercase()
        };
        Self {
            controller: normalize(controller, DEFAULT_CONTROLLER),
            action: normalize(action, DEFAULT_ACTION),
            params,
        }
    }

    pub fn is(&self, controller: &str) -> bool {
        self.controller == controller
    }
}

/// The request's database handle, query builder and table snapshots.
pub struct RequestData {
    pub db: Arc<dyn DatabaseProvider>,
    pub builder: QueryBuilder,
    pub cache: SnapshotCache,
}

impl RequestData {
    pub fn new(db: Arc<dyn DatabaseProvider>, table_prefix: &str, registry: CacheRegistry) -> Self {
        Self {
            builder: QueryBuilder::new(db.clone(), table_prefix),
            cache: SnapshotCache::new(db.clone(), table_prefix, registry),
            db,
        }
    }

    /// Run the built statement in a transaction, reset the builder, then
    /// re-fetch `refresh` so the snapshot reflects the write.
    pub async fn commit(&mut self, refresh: &[&str]) -> Result<ResultSet, AppError> {
        let result = self.builder.execute_transaction().await;
        self.builder.reset();
        let result = result?;
        self.cache.update_all(refresh).await?;
        Ok(result)
    }
}

pub struct RequestContext {
    pub services: Arc<AppServices>,
    pub request_id: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_ip: String,
    pub cookies: CookieJar,
    /// Trimmed, entity-escaped parameters.
    pub input: Params,
    /// Parameters exactly as submitted; only for secrets such as passwords.
    pub raw_input: Params,
    pub route: Route,
    pub search_bot: Option<String>,
    pub settings: ForumSettings,
    pub data: Option<RequestData>,
    pub session: Option<SessionState>,
    pub member: Member,
    pub localization: Localization,
    torn_down: bool,
}

impl RequestContext {
    pub fn new(
        services: Arc<AppServices>,
        request_id: impl Into<String>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        client_ip: impl Into<String>,
    ) -> Self {
        let cookies = CookieJar::from_headers(&headers);
        Self {
            services,
            request_id: request_id.into(),
            method,
            uri,
            headers,
            body,
            client_ip: client_ip.into(),
            cookies,
            input: Params::new(),
            raw_input: Params::new(),
            route: Route::default(),
            search_bot: None,
            settings: ForumSettings::default(),
            data: None,
            session: None,
            member: Member::guest(),
            localization: Localization::default(),
            torn_down: false,
        }
    }

    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn user_agent(&self) -> &str {
        self.header(header::USER_AGENT).unwrap_or_default()
    }

    pub fn host(&self) -> &str {
        self.header(header::HOST).unwrap_or_default()
    }

    /// Path and query as requested.
    pub fn location(&self) -> String {
        self.uri
            .path_and_query()
            .map(|value| value.as_str().to_string())
            .unwrap_or_else(|| "/".to_string())
    }

    /// A routed path parameter, else a sanitized request parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.route
            .params
            .value(key)
            .or_else(|| self.input.value(key))
    }

    /// Like [`Self::param`] but unescaped; for secrets only.
    pub fn raw_param(&self, key: &str) -> Option<&str> {
        self.route
            .params
            .value(key)
            .or_else(|| self.raw_input.value(key))
    }

    pub fn origin(&self) -> ClientOrigin<'_> {
        ClientOrigin {
            ip: &self.client_ip,
            user_agent: self.user_agent(),
        }
    }

    pub fn csrf_policy(&self) -> CsrfPolicy {
        CsrfPolicy::from(&self.settings)
    }

    pub fn data(&self) -> Result<&RequestData, AppError> {
        self.data.as_ref().ok_or_else(|| unavailable("database"))
    }

    pub fn data_mut(&mut self) -> Result<&mut RequestData, AppError> {
        self.data.as_mut().ok_or_else(|| unavailable("database"))
    }

    pub fn session(&self) -> Result<&SessionState, AppError> {
        self.session.as_ref().ok_or_else(|| unavailable("session"))
    }

    pub fn session_mut(&mut self) -> Result<&mut SessionState, AppError> {
        self.session.as_mut().ok_or_else(|| unavailable("session"))
    }

    pub fn cookie_name(&self, name: &str) -> String {
        self.services.cookie_name(name)
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies
            .get(&self.cookie_name(name))
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    }

    /// Queue a `Set-Cookie`; `None` means a browser-session cookie.
    pub fn set_cookie(&mut self, name: &str, value: impl Into<String>, max_age: Option<time::Duration>) {
        let settings = &self.services.config.cookies;
        let mut cookie = Cookie::build((self.cookie_name(name), value.into()))
            .path(settings.path.clone())
            .http_only(true)
            .secure(settings.secure);
        if let Some(domain) = settings.domain.clone() {
            cookie = cookie.domain(domain);
        }
        if let Some(max_age) = max_age {
            cookie = cookie.max_age(max_age);
        }
        self.cookies = std::mem::take(&mut self.cookies).add(cookie);
    }

    pub fn remove_cookie(&mut self, name: &str) {
        let settings = &self.services.config.cookies;
        let mut cookie = Cookie::build((self.cookie_name(name), "")).path(settings.path.clone());
        if let Some(domain) = settings.domain.clone() {
            cookie = cookie.domain(domain);
        }
        self.cookies = std::mem::take(&mut self.cookies).remove(cookie);
    }

    pub fn take_cookies(&mut self) -> CookieJar {
        std::mem::take(&mut self.cookies)
    }

    pub fn url(&self, controller: &str, action: &str, params: &[(&str, &str)]) -> String {
        let site = &self.services.config.site;
        urls::build_url(
            self.settings.url_format,
            &site.base_url,
            &site.wrapper,
            controller,
            action,
            params,
        )
    }

    /// Flush session data and hand the connection back. Safe to call twice.
    pub async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        let skip_session = self.route.is("resource");
        if let (Some(data), Some(session)) = (self.data.as_mut(), self.session.as_ref())
            && !session.is_destroyed()
            && !skip_session
            && let Err(err) = self
                .services
                .session_store
                .write(&mut data.builder, session.id(), session.data(), unix_now())
                .await
        {
            warn!(
                target = "bulletin_fusion::application::context",
                request_id = %self.request_id,
                session_id = session.id(),
                error = %err,
                "Failed to flush session data"
            );
        }

        if let Some(data) = self.data.as_ref() {
            data.db.disconnect().await;
        }
    }
}

fn unavailable(what: &'static str) -> AppError {
    AppError::unexpected(format!("{what} state is not available at this point of the request"))
}
