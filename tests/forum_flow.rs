mod support;

use axum::http::{StatusCode, header};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value;
use support::{PASSWORD, body_text, forum, get, get_from, keep_cookies, post_form, send};

const AUTHENTICATE: &str = "/index?controller=authentication&action=authenticate";
const SIGN_OUT: &str = "/index?controller=authentication&action=signout";
const TOGGLE_LIKE: &str = "/index?controller=ajax&action=togglelike";
const PREAUTHORIZE: &str = "/index?controller=ajax&action=preauthorize";
const SNAPSHOTS: &str = "/index?controller=ajax&action=snapshots";

async fn json_body(response: axum::http::Response<axum::body::Body>) -> Value {
    serde_json::from_str(&body_text(response).await).expect("json body")
}

#[tokio::test]
async fn guests_get_the_home_page_and_a_session() {
    let forum = forum().await;
    let router = forum.router();

    let response = send(&router, get("/", &[])).await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut jar = Vec::new();
    keep_cookies(&mut jar, response.headers());
    assert!(jar.iter().any(|(name, _)| name == "BF_Session"));

    let body = body_text(response).await;
    assert!(body.contains("Welcome, Guest"));
    assert!(body.contains("Who's Online"));
    assert!(body.contains("name=\"csrf_token\""));
    assert_eq!(forum.count("sessions").await, 1);

    let again = send(&router, get("/", &jar)).await;
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(forum.count("sessions").await, 1);
}

#[tokio::test]
async fn health_check_and_unknown_routes() {
    let forum = forum().await;
    let router = forum.router();

    let health = send(&router, get("/_health/db", &[])).await;
    assert_eq!(health.status(), StatusCode::NO_CONTENT);

    let missing = send(&router, get("/index?controller=nowhere&action=index", &[])).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert!(body_text(missing).await.contains("404"));
}

#[tokio::test]
async fn theme_stylesheets_are_served() {
    let forum = forum().await;
    let router = forum.router();

    let css = send(&router, get("/index?controller=resource&action=css&file=common", &[])).await;
    assert_eq!(css.status(), StatusCode::OK);
    assert!(
        css.headers()[header::CONTENT_TYPE]
            .to_str()
            .expect("content type")
            .starts_with("text/css")
    );
    assert!(body_text(css).await.contains(".whos-online"));

    let missing = send(&router, get("/index?controller=resource&action=css&file=missing", &[])).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let escape = send(&router, get("/index?controller=resource&action=js&file=../secret", &[])).await;
    assert_eq!(escape.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reactions_require_a_member() {
    let forum = forum().await;
    forum.setting("csrf_enabled", "0", "bool").await;
    let router = forum.router();

    let response = send(
        &router,
        post_form(TOGGLE_LIKE, &[], &[("content_type", "post"), ("content_id", "3")]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert_eq!(json["status"], Value::Bool(false));
    assert!(json["message"].is_string());
    assert!(json.get("data").is_none());
    assert_eq!(forum.count("likes").await, 0);
}

#[tokio::test]
async fn forms_without_a_csrf_token_are_refused() {
    let forum = forum().await;
    forum.member("sam", "sam@example.test").await;
    let router = forum.router();

    let response = send(
        &router,
        post_form(
            AUTHENTICATE,
            &[],
            &[("email", "sam@example.test"), ("password", PASSWORD)],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(forum.count("member_devices").await, 0);
}

#[tokio::test]
async fn sign_in_like_and_sign_out() {
    let forum = forum().await;
    forum.setting("csrf_enabled", "0", "bool").await;
    forum.member("sam", "sam@example.test").await;
    let router = forum.router();
    let mut jar = Vec::new();

    let home = send(&router, get("/", &jar)).await;
    keep_cookies(&mut jar, home.headers());

    let rejected = send(
        &router,
        post_form(
            AUTHENTICATE,
            &jar,
            &[("email", "sam@example.test"), ("password", "wrong")],
        ),
    )
    .await;
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
    assert!(body_text(rejected).await.contains("email address or password you entered is incorrect"));

    let signed_in = send(
        &router,
        post_form(
            AUTHENTICATE,
            &jar,
            &[("email", "SAM@example.test"), ("password", PASSWORD)],
        ),
    )
    .await;
    assert_eq!(signed_in.status(), StatusCode::SEE_OTHER);
    keep_cookies(&mut jar, signed_in.headers());
    assert!(jar.iter().any(|(name, _)| name == "BF_MemberToken"));
    assert!(jar.iter().any(|(name, _)| name == "BF_DeviceId"));
    assert_eq!(forum.count("member_devices").await, 1);

    let home = send(&router, get("/", &jar)).await;
    keep_cookies(&mut jar, home.headers());
    let body = body_text(home).await;
    assert!(body.contains("Welcome back, sam"));
    assert!(body.contains("<span class=\"member\">sam</span>"));

    let liked = send(
        &router,
        post_form(TOGGLE_LIKE, &jar, &[("content_type", "Post"), ("content_id", "3")]),
    )
    .await;
    assert_eq!(liked.status(), StatusCode::OK);
    let json = json_body(liked).await;
    assert_eq!(json["status"], Value::Bool(true));
    assert_eq!(json["data"]["liked"], Value::Bool(true));
    assert_eq!(json["data"]["total"], Value::from(1));

    let unliked = send(
        &router,
        post_form(TOGGLE_LIKE, &jar, &[("content_type", "post"), ("content_id", "3")]),
    )
    .await;
    let json = json_body(unliked).await;
    assert_eq!(json["data"]["liked"], Value::Bool(false));
    assert_eq!(json["data"]["total"], Value::from(0));
    assert_eq!(forum.count("likes").await, 0);

    let signed_out = send(&router, get(SIGN_OUT, &jar)).await;
    assert_eq!(signed_out.status(), StatusCode::SEE_OTHER);
    keep_cookies(&mut jar, signed_out.headers());
    assert!(!jar.iter().any(|(name, _)| name == "BF_MemberToken"));

    let home = send(&router, get("/", &jar)).await;
    assert!(body_text(home).await.contains("Welcome, Guest"));
}

#[tokio::test]
async fn preauthorize_counts_down_to_a_lockout() {
    let forum = forum().await;
    forum.setting("account_lockout_enabled", "1", "bool").await;
    forum.setting("account_lockout_max_failed_attempts", "2", "int").await;
    forum.setting("account_lockout_expiration_minutes", "30", "int").await;
    forum.member("sam", "sam@example.test").await;
    let router = forum.router();

    let attempt = |password: &str| {
        post_form(
            PREAUTHORIZE,
            &[],
            &[
                ("email", "sam@example.test"),
                ("password", STANDARD.encode(password).as_str()),
            ],
        )
    };

    let first = json_body(send(&router, attempt("nope")).await).await;
    assert_eq!(first["status"], Value::Bool(false));
    assert_eq!(first["data"]["attempts"], Value::from(1));
    assert!(
        first["message"]
            .as_str()
            .expect("message")
            .contains("1 of 2 attempts remaining")
    );

    let second = json_body(send(&router, attempt("still wrong")).await).await;
    assert_eq!(second["data"]["reason"], Value::from("lockedOut"));

    let correct = json_body(send(&router, attempt(PASSWORD)).await).await;
    assert_eq!(correct["status"], Value::Bool(false));
    assert!(
        correct["message"]
            .as_str()
            .expect("message")
            .contains("Try again in 30 minute(s)")
    );
}

#[tokio::test]
async fn preauthorize_accepts_valid_credentials() {
    let forum = forum().await;
    let member_id = forum.member("sam", "sam@example.test").await;
    let router = forum.router();

    let response = send(
        &router,
        post_form(
            PREAUTHORIZE,
            &[],
            &[
                ("email", "sam@example.test"),
                ("password", STANDARD.encode(PASSWORD).as_str()),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], Value::Bool(true));
    assert_eq!(json["data"]["memberId"], Value::from(member_id));
}

fn cookie<'a>(jar: &'a [(String, String)], name: &str) -> Option<&'a str> {
    jar.iter()
        .find(|(existing, _)| existing == name)
        .map(|(_, value)| value.as_str())
}

#[tokio::test]
async fn sessions_restart_when_the_client_moves() {
    let forum = forum().await;
    forum.setting("session_ip_matching", "1", "bool").await;
    let router = forum.router();
    let mut jar = Vec::new();

    let first = send(&router, get_from("/", &jar, [10, 0, 0, 1], "agent-a")).await;
    assert_eq!(first.status(), StatusCode::OK);
    keep_cookies(&mut jar, first.headers());
    assert!(cookie(&jar, "BF_Session").is_some());
    assert_eq!(forum.count("sessions").await, 1);

    let same = send(&router, get_from("/", &jar, [10, 0, 0, 1], "agent-a")).await;
    assert_eq!(same.status(), StatusCode::OK);
    keep_cookies(&mut jar, same.headers());
    assert_eq!(forum.count("sessions").await, 1);

    let moved = send(&router, get_from("/", &jar, [10, 0, 0, 2], "agent-a")).await;
    assert_eq!(moved.status(), StatusCode::SEE_OTHER);
    assert_eq!(moved.headers()[header::LOCATION], "/");
    keep_cookies(&mut jar, moved.headers());
    assert!(cookie(&jar, "BF_Session").is_none());
    assert_eq!(forum.count("sessions").await, 0);

    let fresh = send(&router, get_from("/", &jar, [10, 0, 0, 2], "agent-a")).await;
    assert_eq!(fresh.status(), StatusCode::OK);
    keep_cookies(&mut jar, fresh.headers());

    let new_agent = send(&router, get_from("/", &jar, [10, 0, 0, 2], "agent-b")).await;
    assert_eq!(new_agent.status(), StatusCode::SEE_OTHER);
    assert_eq!(forum.count("sessions").await, 0);
}

#[tokio::test]
async fn sessions_ignore_the_client_without_ip_matching() {
    let forum = forum().await;
    let router = forum.router();
    let mut jar = Vec::new();

    let first = send(&router, get_from("/", &jar, [10, 0, 0, 1], "agent-a")).await;
    keep_cookies(&mut jar, first.headers());
    let moved = send(&router, get_from("/", &jar, [10, 0, 0, 9], "agent-b")).await;
    assert_eq!(moved.status(), StatusCode::OK);
    assert_eq!(forum.count("sessions").await, 1);
}

#[tokio::test]
async fn unknown_member_tokens_restart_as_a_guest() {
    let forum = forum().await;
    let router = forum.router();
    let mut jar = Vec::new();

    let home = send(&router, get("/", &jar)).await;
    keep_cookies(&mut jar, home.headers());
    let original = cookie(&jar, "BF_Session").expect("session cookie").to_string();
    jar.push(("BF_MemberToken".to_string(), "forged".to_string()));

    let response = send(&router, get("/", &jar)).await;
    assert_eq!(response.status(), StatusCode::OK);
    keep_cookies(&mut jar, response.headers());
    assert!(body_text(response).await.contains("Welcome, Guest"));

    let renewed = cookie(&jar, "BF_Session").expect("new session cookie").to_string();
    assert_ne!(renewed, original);
    assert!(cookie(&jar, "BF_MemberToken").is_none());
    assert_eq!(forum.session_ids().await, vec![renewed]);
}

#[tokio::test]
async fn topics_render_with_breadcrumbs_and_posts() {
    let forum = forum().await;
    let sam = forum.member("sam", "sam@example.test").await;
    let board = forum.board("General").await;
    let topic = forum.topic(board, sam, "Hello there", 1_700_000_000).await;
    forum.reply(topic, sam, 1_700_000_600, "<b>Second</b> thoughts").await;
    let router = forum.router();

    let page = send(
        &router,
        get(&format!("/index?controller=topics&action=view&topic={topic}-hello-there"), &[]),
    )
    .await;
    assert_eq!(page.status(), StatusCode::OK);
    let body = body_text(page).await;
    assert!(body.contains("<h1>Hello there</h1>"));
    assert!(body.contains("Started by sam"));
    assert!(body.contains("Forums"));
    assert!(body.contains("General"));
    assert!(body.contains("Second thoughts"));
    assert!(body.contains("data-toggle=\"like\""));

    let missing = send(&router, get("/index?controller=topics&action=view&topic=999", &[])).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let garbled = send(&router, get("/index?controller=topics&action=view&topic=abc", &[])).await;
    assert_eq!(garbled.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn home_feed_lists_topics() {
    let forum = forum().await;
    let sam = forum.member("sam", "sam@example.test").await;
    let board = forum.board("General").await;
    forum.topic(board, sam, "Hello there", 1_700_000_000).await;
    let router = forum.router();

    let body = body_text(send(&router, get("/", &[])).await).await;
    assert!(body.contains("Hello there"));
    assert!(body.contains("Started by sam"));
    assert!(!body.contains("class=\"feed-empty\""));
}

#[tokio::test]
async fn snapshot_filters_reorder_the_feed() {
    let forum = forum().await;
    let sam = forum.member("sam", "sam@example.test").await;
    let board = forum.board("General").await;
    forum.topic(board, sam, "Quiet topic", 1_700_000_000).await;
    let popular = forum.topic(board, sam, "Popular topic", 1_600_000_000).await;
    let liked = forum.reply(popular, sam, 1_600_000_100, "Agreed").await;
    forum.like_post(sam, liked).await;
    let router = forum.router();
    let mut jar = Vec::new();

    let likes = send(&router, get(&format!("{SNAPSHOTS}&filter=likes"), &jar)).await;
    assert_eq!(likes.status(), StatusCode::OK);
    keep_cookies(&mut jar, likes.headers());
    let json = json_body(likes).await;
    assert_eq!(json["status"], Value::Bool(true));
    assert_eq!(json["data"]["filter"], Value::from("likes"));
    let html = json["data"]["snapshots"].as_str().expect("snapshots");
    let popular_at = html.find("Popular topic").expect("popular listed");
    let quiet_at = html.find("Quiet topic").expect("quiet listed");
    assert!(popular_at < quiet_at);
    assert!(html.contains("sam replied"));

    let newest = json_body(send(&router, get(&format!("{SNAPSHOTS}&filter=Newest"), &jar)).await).await;
    assert_eq!(newest["data"]["filter"], Value::from("newest"));
    let html = newest["data"]["snapshots"].as_str().expect("snapshots");
    assert!(html.find("Quiet topic") < html.find("Popular topic"));

    let bogus = send(&router, get(&format!("{SNAPSHOTS}&filter=bogus"), &jar)).await;
    assert_eq!(bogus.status(), StatusCode::BAD_REQUEST);
    let json = json_body(bogus).await;
    assert_eq!(json["status"], Value::Bool(false));
    assert!(
        json["message"]
            .as_str()
            .expect("message")
            .contains("'bogus' does not exist")
    );
}
