use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn driver_is_inferred_from_url_scheme() {
    let settings = Settings::with_database_url("sqlite://forum.db").expect("valid settings");
    assert_eq!(settings.database.driver, DatabaseDriver::Sqlite);

    let settings =
        Settings::with_database_url("postgres://localhost/forum").expect("valid settings");
    assert_eq!(settings.database.driver, DatabaseDriver::Postgres);
}

#[test]
fn explicit_driver_wins_over_url() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("postgres://localhost/forum".into());
    raw.database.driver = Some("sqlite".into());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.database.driver, DatabaseDriver::Sqlite);
}

#[test]
fn unknown_driver_is_rejected() {
    let mut raw = RawSettings::default();
    raw.database.driver = Some("mysql".into());
    let err = Settings::from_raw(raw).expect_err("driver is invalid");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "database.driver",
            ..
        }
    ));
}

#[test]
fn table_prefix_must_be_identifier_safe() {
    let mut raw = RawSettings::default();
    raw.database.table_prefix = Some("bf; DROP".into());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn session_store_accepts_legacy_dbstore_name() {
    let mut raw = RawSettings::default();
    raw.session.store = Some("dbstore".into());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.session.store, SessionStoreMethod::Database);

    let mut raw = RawSettings::default();
    raw.session.store = Some("files".into());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn defaults_are_usable() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.method, "snapshot");
    assert_eq!(settings.cookies.prefix, "BF_");
    assert_eq!(settings.site.wrapper, "index");
    assert_eq!(settings.session.lifetime, Duration::from_secs(1440));
    assert!(settings.database.url.is_none());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["bulletin-fusion"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_snapshot_arguments() {
    let args = CliArgs::parse_from([
        "bulletin-fusion",
        "snapshot",
        "--database-url",
        "sqlite://forum.db",
        "--table",
        "members",
        "--table",
        "sessions",
    ]);

    match args.command.expect("snapshot command") {
        Command::Snapshot(snapshot) => {
            assert_eq!(
                snapshot.database.database_url.as_deref(),
                Some("sqlite://forum.db")
            );
            assert_eq!(snapshot.tables, vec!["members", "sessions"]);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "bulletin-fusion",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--database-url",
        "postgres://override",
        "--session-store",
        "memory",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.database.database_url.as_deref(),
                Some("postgres://override")
            );
            assert_eq!(serve.overrides.session_store.as_deref(), Some("memory"));
        }
        _ => panic!("wrong command parsed"),
    }
}
