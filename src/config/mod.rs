//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{CliArgs, Command, DatabaseOverride, ServeArgs, ServeOverrides, SnapshotArgs};

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "bulletin-fusion";
const ENV_PREFIX: &str = "BULLETIN_FUSION";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_MAX_BODY_BYTES: u64 = 2 * 1024 * 1024;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_METHOD: &str = "snapshot";
const DEFAULT_COOKIE_PREFIX: &str = "BF_";
const DEFAULT_COOKIE_PATH: &str = "/";
const DEFAULT_SESSION_LIFETIME_SECS: u64 = 1440;
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_WRAPPER: &str = "index";
const DEFAULT_LOCALES_DIR: &str = "locales";
const DEFAULT_THEMES_DIR: &str = "themes";
const DEFAULT_ASSETS_DIR: &str = "public";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub cookies: CookieSettings,
    pub session: SessionSettings,
    pub site: SiteSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    pub max_body_bytes: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseDriver {
    Postgres,
    Sqlite,
}

impl DatabaseDriver {
    pub fn as_str(self) -> &'static str {
        match self {
            DatabaseDriver::Postgres => "postgres",
            DatabaseDriver::Sqlite => "sqlite",
        }
    }

    /// Infer the driver from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Some(DatabaseDriver::Postgres),
            "sqlite" => Some(DatabaseDriver::Sqlite),
            _ => None,
        }
    }
}

impl FromStr for DatabaseDriver {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DatabaseDriver::Postgres),
            "sqlite" => Ok(DatabaseDriver::Sqlite),
            other => Err(format!("unsupported driver `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub driver: DatabaseDriver,
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub table_prefix: String,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub method: String,
}

#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub prefix: String,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStoreMethod {
    Database,
    Memory,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub store: SessionStoreMethod,
    pub lifetime: Duration,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub base_url: String,
    pub wrapper: String,
    pub locales_dir: PathBuf,
    pub themes_dir: PathBuf,
    pub assets_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Snapshot(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    cookies: RawCookieSettings,
    session: RawSessionSettings,
    site: RawSiteSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_database_override(&overrides.database);

        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(store) = overrides.session_store.as_ref() {
            self.session.store = Some(store.clone());
        }
        if let Some(url) = overrides.site_base_url.as_ref() {
            self.site.base_url = Some(url.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(driver) = overrides.database_driver.as_ref() {
            self.database.driver = Some(driver.clone());
        }
        if let Some(prefix) = overrides.database_table_prefix.as_ref() {
            self.database.table_prefix = Some(prefix.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            cookies,
            session,
            site,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache),
            cookies: build_cookie_settings(cookies)?,
            session: build_session_settings(session)?,
            site: build_site_settings(site)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    let max_body_value = server.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
    let max_body_bytes = usize::try_from(max_body_value)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid(
                "server.max_body_bytes",
                "must be greater than zero and fit in usize",
            )
        })?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        max_body_bytes,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let driver = match database.driver.as_deref() {
        Some(value) => DatabaseDriver::from_str(value)
            .map_err(|reason| LoadError::invalid("database.driver", reason))?,
        None => url
            .as_deref()
            .and_then(DatabaseDriver::from_url)
            .unwrap_or(DatabaseDriver::Postgres),
    };

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    let table_prefix = database.table_prefix.unwrap_or_default();
    if !table_prefix
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        return Err(LoadError::invalid(
            "database.table_prefix",
            "only ASCII letters, digits and underscores are allowed",
        ));
    }

    Ok(DatabaseSettings {
        driver,
        url,
        max_connections,
        table_prefix,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> CacheSettings {
    CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        method: cache
            .method
            .map(|method| method.trim().to_ascii_lowercase())
            .filter(|method| !method.is_empty())
            .unwrap_or_else(|| DEFAULT_CACHE_METHOD.to_string()),
    }
}

fn build_cookie_settings(cookies: RawCookieSettings) -> Result<CookieSettings, LoadError> {
    let prefix = cookies
        .prefix
        .unwrap_or_else(|| DEFAULT_COOKIE_PREFIX.to_string());
    if prefix.contains(|ch: char| ch.is_whitespace() || ch == ';' || ch == '=') {
        return Err(LoadError::invalid(
            "cookies.prefix",
            "must not contain whitespace, `;` or `=`",
        ));
    }

    let path = cookies
        .path
        .unwrap_or_else(|| DEFAULT_COOKIE_PATH.to_string());
    if !path.starts_with('/') {
        return Err(LoadError::invalid("cookies.path", "must start with `/`"));
    }

    Ok(CookieSettings {
        prefix,
        path,
        domain: cookies.domain.filter(|domain| !domain.trim().is_empty()),
        secure: cookies.secure.unwrap_or(false),
    })
}

fn build_session_settings(session: RawSessionSettings) -> Result<SessionSettings, LoadError> {
    let store = match session.store.as_deref().map(str::trim) {
        None | Some("database") | Some("dbstore") => SessionStoreMethod::Database,
        Some("memory") => SessionStoreMethod::Memory,
        Some(other) => {
            return Err(LoadError::invalid(
                "session.store",
                format!("unsupported session store `{other}`"),
            ));
        }
    };

    let lifetime_secs = session
        .lifetime_seconds
        .unwrap_or(DEFAULT_SESSION_LIFETIME_SECS);
    if lifetime_secs == 0 {
        return Err(LoadError::invalid(
            "session.lifetime_seconds",
            "must be greater than zero",
        ));
    }

    Ok(SessionSettings {
        store,
        lifetime: Duration::from_secs(lifetime_secs),
    })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let base_url = site
        .base_url
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    url::Url::parse(&base_url)
        .map_err(|err| LoadError::invalid("site.base_url", err.to_string()))?;

    let wrapper = site.wrapper.unwrap_or_else(|| DEFAULT_WRAPPER.to_string());
    if wrapper.trim().is_empty() || wrapper.contains('/') {
        return Err(LoadError::invalid(
            "site.wrapper",
            "must be a single non-empty path segment",
        ));
    }

    Ok(SiteSettings {
        base_url: base_url.trim_end_matches('/').to_string(),
        wrapper,
        locales_dir: site
            .locales_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCALES_DIR)),
        themes_dir: site
            .themes_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_THEMES_DIR)),
        assets_dir: site
            .assets_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR)),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    max_body_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    driver: Option<String>,
    url: Option<String>,
    max_connections: Option<u32>,
    table_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    method: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCookieSettings {
    prefix: Option<String>,
    path: Option<String>,
    domain: Option<String>,
    secure: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSessionSettings {
    store: Option<String>,
    lifetime_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    base_url: Option<String>,
    wrapper: Option<String>,
    locales_dir: Option<PathBuf>,
    themes_dir: Option<PathBuf>,
    assets_dir: Option<PathBuf>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

impl Settings {
    /// Defaults with the given database URL, for tests and tooling.
    pub fn with_database_url(url: impl Into<String>) -> Result<Self, LoadError> {
        let mut raw = RawSettings::default();
        raw.database.url = Some(url.into());
        Self::from_raw(raw)
    }
}

#[cfg(test)]
mod tests;
