use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::pipeline::METRIC_PIPELINE_MS;
use crate::cache::METRIC_CACHE_REFRESH_TOTAL;
use crate::config::{LogFormat, LoggingSettings};
use crate::infra::db::METRIC_DB_QUERIES_TOTAL;

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_DB_QUERIES_TOTAL,
            Unit::Count,
            "Total number of SQL statements sent to the database."
        );
        describe_counter!(
            METRIC_CACHE_REFRESH_TOTAL,
            Unit::Count,
            "Total number of full-table snapshot refreshes."
        );
        describe_histogram!(
            METRIC_PIPELINE_MS,
            Unit::Milliseconds,
            "Time spent running a request through the middleware chain."
        );
    });
}
