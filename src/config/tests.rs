use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        logging: LoggingOverrides {
            log_level: Some("debug".to_string()),
            log_json: None,
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(
        settings.timeouts.policy.soft,
        Duration::from_millis(DEFAULT_SOFT_TIMEOUT_MS)
    );
    assert_eq!(settings.timeouts.heartbeat, HeartbeatMode::Off);
    assert!(settings.conversion.selective_serialization);
    assert_eq!(
        settings.conversion.cacheable_max_age_seconds,
        DEFAULT_CACHEABLE_MAX_AGE_SECS
    );
    assert!(settings.render_cache.url.is_none());
    assert_eq!(settings.sites.len(), 1);
    assert_eq!(settings.sites[0].prefix, LOCAL_SITE_PREFIX);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        logging: LoggingOverrides {
            log_level: None,
            log_json: Some(true),
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn hard_deadline_must_cover_the_soft_one() {
    let mut raw = RawSettings::default();
    raw.timeouts.soft_ms = Some(5_000);
    raw.timeouts.hard_ms = Some(1_000);

    match Settings::from_raw(raw) {
        Err(LoadError::Invalid { key, .. }) => assert_eq!(key, "timeouts.hard_ms"),
        other => panic!("expected invalid hard deadline, got {other:?}"),
    }
}

#[test]
fn deadlines_are_capped_at_a_day() {
    let mut raw = RawSettings::default();
    raw.timeouts.soft_ms = Some(1_000);
    raw.timeouts.hard_ms = Some(u64::MAX);

    match Settings::from_raw(raw.clone()) {
        Err(LoadError::Invalid { key, .. }) => assert_eq!(key, "timeouts.hard_ms"),
        other => panic!("expected invalid hard deadline, got {other:?}"),
    }

    raw.timeouts.hard_ms = Some(MAX_TIMEOUT_MS);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.timeouts.policy.hard, Duration::from_millis(MAX_TIMEOUT_MS));
}

#[test]
fn heartbeat_mode_is_validated() {
    let mut raw = RawSettings::default();
    raw.timeouts.heartbeat = Some("Watchdog".to_string());
    let settings = Settings::from_raw(raw.clone()).expect("valid settings");
    assert_eq!(settings.timeouts.heartbeat, HeartbeatMode::Watchdog);

    raw.timeouts.heartbeat = Some("pager".to_string());
    match Settings::from_raw(raw) {
        Err(LoadError::Invalid { key, .. }) => assert_eq!(key, "timeouts.heartbeat"),
        other => panic!("expected invalid heartbeat, got {other:?}"),
    }
}

#[test]
fn sites_are_parsed_and_checked_for_duplicates() {
    let mut raw = RawSettings::default();
    raw.sites = vec![
        RawSiteSettings {
            prefix: Some("enwiki".to_string()),
            domain: Some("en.example.org".to_string()),
            api_url: Some("https://en.example.org/api/".to_string()),
        },
        RawSiteSettings {
            prefix: Some(" dewiki ".to_string()),
            domain: Some("de.example.org".to_string()),
            api_url: Some("   ".to_string()),
        },
    ];
    let settings = Settings::from_raw(raw.clone()).expect("valid settings");
    assert_eq!(settings.sites.len(), 2);
    assert_eq!(settings.sites[1].prefix, "dewiki");
    assert!(settings.sites[1].api_url.is_none());
    assert_eq!(
        settings.sites[0].api_url.as_ref().map(Url::as_str),
        Some("https://en.example.org/api/")
    );

    raw.sites[1].domain = Some("EN.example.org".to_string());
    match Settings::from_raw(raw) {
        Err(LoadError::Invalid { key, .. }) => assert_eq!(key, "sites.domain"),
        other => panic!("expected duplicate domain, got {other:?}"),
    }
}

#[test]
fn render_cache_url_rejects_other_schemes() {
    let mut raw = RawSettings::default();
    raw.render_cache.url = Some("ftp://cache.example.org".to_string());
    match Settings::from_raw(raw) {
        Err(LoadError::Invalid { key, .. }) => assert_eq!(key, "render_cache.url"),
        other => panic!("expected invalid url, got {other:?}"),
    }
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["markbridge"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "markbridge",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--heartbeat",
        "stdout",
        "--log-json",
        "yes",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.heartbeat.as_deref(), Some("stdout"));
            assert_eq!(serve.overrides.logging.log_json, Some(true));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_convert_arguments() {
    let args = CliArgs::parse_from([
        "markbridge",
        "convert",
        "--to",
        "markup",
        "--title",
        "Sandbox",
        "/tmp/page.html",
    ]);

    match args.command.expect("convert command") {
        Command::Convert(convert) => {
            assert_eq!(convert.to, ConvertTarget::Markup);
            assert_eq!(convert.title, "Sandbox");
            assert!(convert.site.is_none());
            assert!(!convert.roundtrip);
            assert_eq!(convert.file, std::path::Path::new("/tmp/page.html"));
        }
        _ => panic!("wrong command parsed"),
    }
}

mod layered {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    const ENV_SOFT: &str = "MARKBRIDGE__TIMEOUTS__SOFT_MS";

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("tmp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    fn serve_with(file: &tempfile::NamedTempFile, overrides: ServeOverrides) -> CliArgs {
        CliArgs {
            config_file: Some(file.path().to_path_buf()),
            command: Some(Command::Serve(Box::new(ServeArgs { overrides }))),
        }
    }

    #[test]
    #[serial]
    fn file_then_env_then_cli() {
        let file = config_file(
            r#"
[server]
port = 9000

[timeouts]
soft_ms = 1000
hard_ms = 5000
heartbeat = "stdout"

[[sites]]
prefix = "enwiki"
domain = "en.example.org"
api_url = "https://en.example.org/api"
"#,
        );
        // SAFETY: env access is serialized across these tests.
        unsafe { std::env::set_var(ENV_SOFT, "2500") };

        let settings = load(&serve_with(
            &file,
            ServeOverrides {
                server_port: Some(9100),
                ..Default::default()
            },
        ));
        unsafe { std::env::remove_var(ENV_SOFT) };
        let settings = settings.expect("layered settings");

        assert_eq!(settings.server.addr.port(), 9100);
        assert_eq!(settings.timeouts.policy.soft, Duration::from_millis(2500));
        assert_eq!(settings.timeouts.policy.hard, Duration::from_millis(5000));
        assert_eq!(settings.timeouts.heartbeat, HeartbeatMode::Stdout);
        assert_eq!(settings.sites.len(), 1);
        assert_eq!(settings.sites[0].prefix, "enwiki");
    }

    #[test]
    #[serial]
    fn invalid_file_values_name_their_key() {
        let file = config_file("[timeouts]\nsoft_ms = 5000\nhard_ms = 10\n");
        let err = load(&serve_with(&file, ServeOverrides::default()))
            .expect_err("hard below soft");
        match err {
            LoadError::Invalid { key, .. } => assert_eq!(key, "timeouts.hard_ms"),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
