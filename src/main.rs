use std::{collections::BTreeMap, net::SocketAddr, process, sync::Arc};

use bulletin_fusion::{
    application::{
        controllers::standard_routes, error::AppError, phases::standard_pipeline,
        services::AppServices,
    },
    cache::CacheConfig,
    config,
    infra::{
        db::DatabasePool,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Snapshot(args) => run_snapshot(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let pool = DatabasePool::connect(&settings.database).await?;
    let addr = settings.server.addr;
    let grace = settings.server.graceful_shutdown;
    let cache = CacheConfig::from(&settings.cache);

    let services = AppServices::new(settings, pool.clone());
    let pipeline = standard_pipeline(standard_routes());
    info!(
        target = "bulletin_fusion::serve",
        phases = ?pipeline.names(),
        cache = cache.method.as_str(),
        session_store = ?services.session_store.method(),
        "Request pipeline assembled"
    );
    let router = http::build_router(HttpState {
        services,
        pipeline: Arc::new(pipeline),
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(target = "bulletin_fusion::serve", addr = %addr, "Listening");

    let shutdown = Arc::new(Notify::new());
    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move { shutdown.notified().await }
    });
    let mut handle = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut handle => {
            pool.close().await;
            return flatten_server_result(result);
        }
        _ = tokio::signal::ctrl_c() => {
            info!(target = "bulletin_fusion::serve", "Shutdown requested; draining connections");
            shutdown.notify_one();
        }
    }

    let result = match tokio::time::timeout(grace, &mut handle).await {
        Ok(result) => flatten_server_result(result),
        Err(_) => {
            warn!(
                target = "bulletin_fusion::serve",
                grace_secs = grace.as_secs(),
                "Connections still open after the grace period; aborting"
            );
            handle.abort();
            Ok(())
        }
    };
    pool.close().await;
    result
}

fn flatten_server_result(
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn run_snapshot(
    settings: config::Settings,
    args: config::SnapshotArgs,
) -> Result<(), AppError> {
    let pool = DatabasePool::connect(&settings.database).await?;
    let services = AppServices::new(settings, pool.clone());

    let mut data = services.request_data();
    data.db.connect().await?;
    let built = data.cache.build().await;
    data.db.disconnect().await;
    built?;

    let counts: BTreeMap<&str, usize> = data
        .cache
        .row_counts()
        .into_iter()
        .filter(|(table, _)| args.tables.is_empty() || args.tables.iter().any(|t| t.as_str() == *table))
        .collect();
    let json = serde_json::to_string_pretty(&counts)
        .map_err(|err| AppError::unexpected(format!("failed to encode row counts: {err}")))?;
    println!("{json}");

    info!(
        target = "bulletin_fusion::snapshot",
        tables = counts.len(),
        queries = data.db.total_queries(),
        "Snapshot complete"
    );
    pool.close().await;
    Ok(())
}
