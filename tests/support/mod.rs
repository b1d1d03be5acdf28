#![allow(dead_code)]

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::ConnectInfo,
    http::{HeaderMap, Request, Response, header},
};
use bulletin_fusion::{
    application::{
        authentication::hash_password, controllers::standard_routes, phases::standard_pipeline,
        services::AppServices,
    },
    config::Settings,
    infra::{
        db::DatabasePool,
        http::{HttpState, build_router},
    },
};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

pub const SCHEMA: &str = include_str!("../../schema/sqlite.sql");
pub const PASSWORD: &str = "correct horse battery staple";

/// A throwaway SQLite forum with the schema applied and the English locale installed.
pub struct TestForum {
    _dir: TempDir,
    pub services: Arc<AppServices>,
    pub sqlite: SqlitePool,
}

pub async fn forum() -> TestForum {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("forum.db").display());
    let mut settings = Settings::with_database_url(url).expect("settings");
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    settings.site.locales_dir = root.join("locales");
    settings.site.themes_dir = root.join("themes");
    settings.site.assets_dir = root.join("public");

    let pool = DatabasePool::connect(&settings.database)
        .await
        .expect("connect sqlite");
    let DatabasePool::Sqlite(sqlite) = pool.clone() else {
        panic!("expected a sqlite pool");
    };
    sqlx::raw_sql(SCHEMA)
        .execute(&sqlite)
        .await
        .expect("apply schema");
    sqlx::query(
        "INSERT INTO installed_localizations (name, folder, iso_code, is_default) VALUES ('English', 'english', 'en', 1)",
    )
    .execute(&sqlite)
    .await
    .expect("seed localization");
    sqlx::query("INSERT INTO installed_themes (name, folder, is_default) VALUES ('Default', 'default', 1)")
        .execute(&sqlite)
        .await
        .expect("seed theme");

    TestForum {
        _dir: dir,
        services: AppServices::new(settings, pool),
        sqlite,
    }
}

impl TestForum {
    pub fn router(&self) -> Router {
        build_router(HttpState {
            services: self.services.clone(),
            pipeline: Arc::new(standard_pipeline(standard_routes())),
        })
    }

    pub async fn setting(&self, name: &str, value: &str, data_type: &str) {
        sqlx::query("INSERT OR REPLACE INTO settings (name, value, data_type) VALUES (?, ?, ?)")
            .bind(name)
            .bind(value)
            .bind(data_type)
            .execute(&self.sqlite)
            .await
            .expect("seed setting");
    }

    pub async fn member(&self, username: &str, email: &str) -> i64 {
        let hash = hash_password(PASSWORD).expect("hash");
        sqlx::query(
            "INSERT INTO members (username, email, password_hash, display_on_whos_online) VALUES (?, ?, ?, 1)",
        )
        .bind(username)
        .bind(email)
        .bind(hash)
        .execute(&self.sqlite)
        .await
        .expect("seed member")
        .last_insert_rowid()
    }

    pub async fn board(&self, title: &str) -> i64 {
        sqlx::query("INSERT INTO forums (title, visible) VALUES (?, 1)")
            .bind(title)
            .execute(&self.sqlite)
            .await
            .expect("seed forum")
            .last_insert_rowid()
    }

    /// A topic and its opening post.
    pub async fn topic(&self, forum_id: i64, member_id: i64, title: &str, created: i64) -> i64 {
        let topic_id = sqlx::query(
            "INSERT INTO topics (forum_id, title, created, created_member_id) VALUES (?, ?, ?, ?)",
        )
        .bind(forum_id)
        .bind(title)
        .bind(created)
        .bind(member_id)
        .execute(&self.sqlite)
        .await
        .expect("seed topic")
        .last_insert_rowid();
        let opening = format!("<p>{title} opening post</p>");
        self.write_post(topic_id, forum_id, member_id, created, true, &opening)
            .await;
        topic_id
    }

    pub async fn reply(&self, topic_id: i64, member_id: i64, posted: i64, content: &str) -> i64 {
        let forum_id: i64 = sqlx::query_scalar("SELECT forum_id FROM topics WHERE id = ?")
            .bind(topic_id)
            .fetch_one(&self.sqlite)
            .await
            .expect("topic forum");
        let post_id = self
            .write_post(topic_id, forum_id, member_id, posted, false, content)
            .await;
        sqlx::query("UPDATE topics SET total_replies = total_replies + 1 WHERE id = ?")
            .bind(topic_id)
            .execute(&self.sqlite)
            .await
            .expect("count reply");
        post_id
    }

    async fn write_post(
        &self,
        topic_id: i64,
        forum_id: i64,
        member_id: i64,
        posted: i64,
        first_post: bool,
        content: &str,
    ) -> i64 {
        let post_id = sqlx::query(
            "INSERT INTO posts (topic_id, forum_id, posted, posted_member_id, first_post, post_content) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(topic_id)
        .bind(forum_id)
        .bind(posted)
        .bind(member_id)
        .bind(i64::from(first_post))
        .bind(content)
        .execute(&self.sqlite)
        .await
        .expect("seed post")
        .last_insert_rowid();
        sqlx::query("UPDATE topics SET last_post_id = ? WHERE id = ?")
            .bind(post_id)
            .bind(topic_id)
            .execute(&self.sqlite)
            .await
            .expect("link last post");
        post_id
    }

    pub async fn like_post(&self, member_id: i64, post_id: i64) {
        sqlx::query("INSERT INTO likes (member_id, content_type, content_id) VALUES (?, 'post', ?)")
            .bind(member_id)
            .bind(post_id)
            .execute(&self.sqlite)
            .await
            .expect("seed like");
    }

    pub async fn session_ids(&self) -> Vec<String> {
        sqlx::query_scalar("SELECT id FROM sessions")
            .fetch_all(&self.sqlite)
            .await
            .expect("session ids")
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.sqlite)
            .await
            .expect("count rows")
    }
}

/// Cookies a browser would keep after `response`, merged over `jar`.
pub fn keep_cookies(jar: &mut Vec<(String, String)>, headers: &HeaderMap) {
    for value in headers.get_all(header::SET_COOKIE) {
        let Ok(text) = value.to_str() else { continue };
        let Some((name, rest)) = text.split_once('=') else { continue };
        let value = rest.split(';').next().unwrap_or_default().to_string();
        let expired = value.is_empty() || text.to_ascii_lowercase().contains("max-age=0");
        jar.retain(|(existing, _)| existing != name);
        if !expired {
            jar.push((name.to_string(), value));
        }
    }
}

pub fn cookie_header(jar: &[(String, String)]) -> String {
    jar.iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn get(uri: &str, jar: &[(String, String)]) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::USER_AGENT, "integration-test")
        .header(header::HOST, "127.0.0.1:3000")
        .header(header::COOKIE, cookie_header(jar))
        .body(Body::empty())
        .expect("request")
}

/// A GET as the listener would hand it over: peer address attached, custom agent.
pub fn get_from(uri: &str, jar: &[(String, String)], ip: [u8; 4], user_agent: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::USER_AGENT, user_agent)
        .header(header::HOST, "127.0.0.1:3000")
        .header(header::COOKIE, cookie_header(jar))
        .extension(ConnectInfo(SocketAddr::new(IpAddr::from(ip), 40_000)))
        .body(Body::empty())
        .expect("request")
}

pub fn post_form(uri: &str, jar: &[(String, String)], form: &[(&str, &str)]) -> Request<Body> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(form)
        .finish();
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::USER_AGENT, "integration-test")
        .header(header::HOST, "127.0.0.1:3000")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, cookie_header(jar))
        .body(Body::from(body))
        .expect("request")
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.expect("router response")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
