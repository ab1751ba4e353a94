//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::{
    convert::ConversionSettings, sites::Site, timeout::TimeoutPolicy,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "markbridge";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_SOFT_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_HARD_TIMEOUT_MS: u64 = 120_000;
const MAX_TIMEOUT_MS: u64 = 86_400_000;
const DEFAULT_CACHEABLE_MAX_AGE_SECS: u64 = 86_400;
const LOCAL_SITE_PREFIX: &str = "local";
const LOCAL_SITE_DOMAIN: &str = "localhost";

/// Command-line arguments for the markbridge binary.
#[derive(Debug, Parser)]
#[command(
    name = "markbridge",
    version,
    about = "Markup and HTML conversion service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MARKBRIDGE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Convert a local file without starting the service.
    Convert(ConvertArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the soft (wall-clock) deadline per request.
    #[arg(long = "timeouts-soft-ms", value_name = "MILLIS")]
    pub timeouts_soft_ms: Option<u64>,

    /// Override the hard deadline enforced by the watchdog.
    #[arg(long = "timeouts-hard-ms", value_name = "MILLIS")]
    pub timeouts_hard_ms: Option<u64>,

    /// Where heartbeat messages go (off|stdout|watchdog).
    #[arg(long = "heartbeat", value_name = "MODE")]
    pub heartbeat: Option<String>,

    /// Override the render cache base URL.
    #[arg(long = "render-cache-url", value_name = "URL")]
    pub render_cache_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConvertTarget {
    /// Markup in, HTML out.
    Rendered,
    /// HTML in, markup out.
    Markup,
}

#[derive(Debug, Args, Clone)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Output representation.
    #[arg(long = "to", value_enum, default_value_t = ConvertTarget::Rendered)]
    pub to: ConvertTarget,

    /// Site prefix used for links and file URLs; the first configured site by default.
    #[arg(long = "site", value_name = "PREFIX")]
    pub site: Option<String>,

    /// Page title.
    #[arg(long = "title", value_name = "TITLE", default_value = "Main_Page")]
    pub title: String,

    /// Serialize the result back and print the line diff instead.
    #[arg(long = "roundtrip", action = clap::ArgAction::SetTrue)]
    pub roundtrip: bool,

    /// Input file; `-` reads stdin.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub timeouts: TimeoutSettings,
    pub conversion: ConversionSettings,
    pub render_cache: RenderCacheSettings,
    pub sites: Vec<Site>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
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
pub enum HeartbeatMode {
    /// Soft deadlines only.
    Off,
    /// JSON lines for an external worker-pool supervisor.
    Stdout,
    /// In-process watchdog thread.
    Watchdog,
}

impl FromStr for HeartbeatMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "stdout" => Ok(Self::Stdout),
            "watchdog" => Ok(Self::Watchdog),
            other => Err(format!("unknown heartbeat mode `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TimeoutSettings {
    pub policy: TimeoutPolicy,
    pub heartbeat: HeartbeatMode,
}

#[derive(Debug, Clone, Default)]
pub struct RenderCacheSettings {
    pub url: Option<Url>,
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

    builder = builder.add_source(Environment::with_prefix("MARKBRIDGE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Convert(args)) => raw.apply_logging_overrides(&args.logging),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    timeouts: RawTimeoutSettings,
    conversion: RawConversionSettings,
    render_cache: RawRenderCacheSettings,
    sites: Vec<RawSiteSettings>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(soft) = overrides.timeouts_soft_ms {
            self.timeouts.soft_ms = Some(soft);
        }
        if let Some(hard) = overrides.timeouts_hard_ms {
            self.timeouts.hard_ms = Some(hard);
        }
        if let Some(mode) = overrides.heartbeat.as_ref() {
            self.timeouts.heartbeat = Some(mode.clone());
        }
        if let Some(url) = overrides.render_cache_url.as_ref() {
            self.render_cache.url = Some(url.clone());
        }

        self.apply_logging_overrides(&overrides.logging);
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            timeouts,
            conversion,
            render_cache,
            sites,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let timeouts = build_timeout_settings(timeouts)?;
        let conversion = build_conversion_settings(conversion)?;
        let render_cache = build_render_cache_settings(render_cache)?;
        let sites = build_sites(sites)?;

        Ok(Self {
            server,
            logging,
            timeouts,
            conversion,
            render_cache,
            sites,
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

    Ok(ServerSettings { addr })
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

fn build_timeout_settings(timeouts: RawTimeoutSettings) -> Result<TimeoutSettings, LoadError> {
    let soft_ms = timeouts.soft_ms.unwrap_or(DEFAULT_SOFT_TIMEOUT_MS);
    if soft_ms == 0 {
        return Err(LoadError::invalid(
            "timeouts.soft_ms",
            "must be greater than zero",
        ));
    }

    let hard_ms = timeouts.hard_ms.unwrap_or(DEFAULT_HARD_TIMEOUT_MS);
    if hard_ms > MAX_TIMEOUT_MS {
        return Err(LoadError::invalid(
            "timeouts.hard_ms",
            format!("must not exceed {MAX_TIMEOUT_MS} ms"),
        ));
    }
    if hard_ms < soft_ms {
        return Err(LoadError::invalid(
            "timeouts.hard_ms",
            format!("must not be shorter than the soft deadline ({soft_ms} ms)"),
        ));
    }

    let heartbeat = match timeouts.heartbeat {
        Some(mode) => mode
            .parse()
            .map_err(|reason: String| LoadError::invalid("timeouts.heartbeat", reason))?,
        None => HeartbeatMode::Off,
    };

    Ok(TimeoutSettings {
        policy: TimeoutPolicy {
            soft: Duration::from_millis(soft_ms),
            hard: Duration::from_millis(hard_ms),
        },
        heartbeat,
    })
}

fn build_conversion_settings(
    conversion: RawConversionSettings,
) -> Result<ConversionSettings, LoadError> {
    let cacheable_max_age_seconds = conversion
        .cacheable_max_age_seconds
        .unwrap_or(DEFAULT_CACHEABLE_MAX_AGE_SECS);
    if cacheable_max_age_seconds == 0 {
        return Err(LoadError::invalid(
            "conversion.cacheable_max_age_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ConversionSettings {
        selective_serialization: conversion.selective_serialization.unwrap_or(true),
        cacheable_max_age_seconds,
    })
}

fn build_render_cache_settings(
    render_cache: RawRenderCacheSettings,
) -> Result<RenderCacheSettings, LoadError> {
    let url = match non_blank(render_cache.url) {
        Some(value) => Some(
            parse_http_url(&value)
                .map_err(|reason| LoadError::invalid("render_cache.url", reason))?,
        ),
        None => None,
    };
    Ok(RenderCacheSettings { url })
}

fn build_sites(sites: Vec<RawSiteSettings>) -> Result<Vec<Site>, LoadError> {
    if sites.is_empty() {
        return Ok(vec![Site::new(LOCAL_SITE_PREFIX, LOCAL_SITE_DOMAIN, None)]);
    }

    let mut built: Vec<Site> = Vec::with_capacity(sites.len());
    for raw in sites {
        let prefix = non_blank(raw.prefix)
            .ok_or_else(|| LoadError::invalid("sites.prefix", "must not be empty"))?;
        let domain = non_blank(raw.domain)
            .ok_or_else(|| LoadError::invalid("sites.domain", "must not be empty"))?;
        if prefix.contains('/') {
            return Err(LoadError::invalid(
                "sites.prefix",
                format!("`{prefix}` must not contain `/`"),
            ));
        }
        if built.iter().any(|site| site.prefix == prefix) {
            return Err(LoadError::invalid(
                "sites.prefix",
                format!("`{prefix}` is configured twice"),
            ));
        }
        if built
            .iter()
            .any(|site| site.domain.eq_ignore_ascii_case(&domain))
        {
            return Err(LoadError::invalid(
                "sites.domain",
                format!("`{domain}` is configured twice"),
            ));
        }
        let api_url = match non_blank(raw.api_url) {
            Some(value) => Some(
                parse_http_url(&value).map_err(|reason| LoadError::invalid("sites.api_url", reason))?,
            ),
            None => None,
        };
        built.push(Site::new(prefix, domain, api_url));
    }
    Ok(built)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTimeoutSettings {
    soft_ms: Option<u64>,
    hard_ms: Option<u64>,
    heartbeat: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawConversionSettings {
    selective_serialization: Option<bool>,
    cacheable_max_age_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderCacheSettings {
    url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    prefix: Option<String>,
    domain: Option<String>,
    api_url: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_http_url(value: &str) -> Result<Url, String> {
    let url = Url::parse(value).map_err(|err| format!("invalid url `{value}`: {err}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme `{other}`")),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
