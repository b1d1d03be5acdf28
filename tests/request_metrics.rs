mod support;

use std::collections::HashSet;

use axum::http::StatusCode;
use bulletin_fusion::{
    application::pipeline::METRIC_PIPELINE_MS, cache::METRIC_CACHE_REFRESH_TOTAL,
    infra::db::METRIC_DB_QUERIES_TOTAL,
};
use metrics_util::debugging::DebuggingRecorder;
use support::{forum, get, send};

#[tokio::test]
async fn requests_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let forum = forum().await;
    let router = forum.router();
    let response = send(&router, get("/", &[])).await;
    assert_eq!(response.status(), StatusCode::OK);

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();
    for metric in [
        METRIC_PIPELINE_MS,
        METRIC_CACHE_REFRESH_TOTAL,
        METRIC_DB_QUERIES_TOTAL,
    ] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let refreshed: HashSet<String> = snapshot
        .iter()
        .filter(|(composite_key, _, _, _)| {
            composite_key.key().name() == METRIC_CACHE_REFRESH_TOTAL
        })
        .flat_map(|(composite_key, _, _, _)| {
            composite_key
                .key()
                .labels()
                .filter(|label| label.key() == "table")
                .map(|label| label.value().to_string())
                .collect::<Vec<_>>()
        })
        .collect();
    assert!(refreshed.contains("settings"));
    assert!(refreshed.contains("sessions"));
    assert!(!refreshed.contains("session_store"));
}
