use std::{io::Read, path::Path, process, sync::Arc};

use markbridge::{
    application::{
        context::{ConversionInput, RequestContext, RequestMeta},
        convert::{Conversion, ConvertedBody, Orchestrator},
        error::AppError,
        ports::{ContentSource, Offline, Ports, Preprocessor, RenderCache},
        render::reference_engine,
        roundtrip::{RoundTripValidator, RoundTripVariant},
        sites::SiteRegistry,
        timeout::{
            AbortProcess, HeartbeatSink, StdoutHeartbeat, TimeoutSupervisor, WatchdogHandle,
            spawn_watchdog,
        },
    },
    config::{self, ConvertArgs, ConvertTarget, HeartbeatMode},
    domain::types::{ApiVersion, ConversionFlags, Direction},
    infra::{
        error::InfraError,
        http::{self, HttpState},
        remote::{HttpContentSource, HttpPreprocessor, HttpRenderCache, RemoteClient},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
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

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
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
        config::Command::Convert(args) => run_convert(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (heartbeat, _watchdog) = build_heartbeat(settings.timeouts.heartbeat)?;
    let supervisor = TimeoutSupervisor::new(settings.timeouts.policy, heartbeat);
    let ports = build_remote_ports(&settings)?;
    let orchestrator = Orchestrator::new(ports, supervisor, settings.conversion);
    let state = HttpState::new(orchestrator, SiteRegistry::new(settings.sites.clone()));
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "markbridge::serve",
        addr = %settings.server.addr,
        sites = settings.sites.len(),
        heartbeat = ?settings.timeouts.heartbeat,
        render_cache = settings.render_cache.url.is_some(),
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

/// The watchdog thread lives as long as its heartbeat senders; the handle is
/// returned only so that callers keep ownership explicit.
fn build_heartbeat(
    mode: HeartbeatMode,
) -> Result<(Option<Arc<dyn HeartbeatSink>>, Option<WatchdogHandle>), AppError> {
    match mode {
        HeartbeatMode::Off => Ok((None, None)),
        HeartbeatMode::Stdout => Ok((Some(Arc::new(StdoutHeartbeat)), None)),
        HeartbeatMode::Watchdog => {
            let (sink, handle) = spawn_watchdog(Arc::new(AbortProcess))
                .map_err(|err| AppError::from(InfraError::from(err)))?;
            Ok((Some(Arc::new(sink)), Some(handle)))
        }
    }
}

fn build_remote_ports(settings: &config::Settings) -> Result<Ports, AppError> {
    let engine = reference_engine();
    let client = RemoteClient::new(settings.timeouts.policy.soft).map_err(AppError::from)?;
    let render_cache = settings.render_cache.url.clone().map(|url| {
        Arc::new(HttpRenderCache::new(client.clone(), url)) as Arc<dyn RenderCache>
    });
    let preprocessor: Arc<dyn Preprocessor> = Arc::new(HttpPreprocessor::new(client.clone()));
    let content: Arc<dyn ContentSource> = Arc::new(HttpContentSource::new(client));

    Ok(Ports {
        parser: engine.clone(),
        serializer: engine,
        preprocessor,
        content,
        render_cache,
    })
}

fn offline_ports() -> Ports {
    let engine = reference_engine();
    Ports {
        parser: engine.clone(),
        serializer: engine,
        preprocessor: Arc::new(Offline),
        content: Arc::new(Offline),
        render_cache: None,
    }
}

async fn run_convert(settings: config::Settings, args: ConvertArgs) -> Result<(), AppError> {
    let text = read_input(&args.file).await?;
    let sites = SiteRegistry::new(settings.sites.clone());
    let site = match args.site.as_deref() {
        Some(prefix) => sites
            .by_prefix(prefix)
            .ok_or_else(|| AppError::validation(format!("unknown site prefix `{prefix}`")))?,
        None => sites
            .first()
            .ok_or_else(|| AppError::validation("no site configured"))?,
    };

    let (direction, input) = match args.to {
        ConvertTarget::Rendered => (Direction::MarkupToRendered, ConversionInput::Markup(text)),
        ConvertTarget::Markup => (Direction::RenderedToMarkup, ConversionInput::Rendered(text)),
    };
    let ctx = RequestContext {
        site,
        api_version: ApiVersion::V1,
        direction,
        format: None,
        title: args.title.clone(),
        revision: None,
        input,
        flags: ConversionFlags::default(),
        original: None,
        previous: None,
        update: Default::default(),
        cache_id: None,
        meta: RequestMeta {
            request_url: args.file.display().to_string(),
            ..RequestMeta::default()
        },
    };

    let supervisor = TimeoutSupervisor::new(settings.timeouts.policy, None);
    let orchestrator = Orchestrator::new(offline_ports(), supervisor, settings.conversion);

    if args.roundtrip {
        if direction != Direction::MarkupToRendered {
            return Err(AppError::validation(
                "--roundtrip takes markup input (use --to rendered)",
            ));
        }
        let report = RoundTripValidator::new(orchestrator)
            .check(&ctx, RoundTripVariant::Plain)
            .await?;
        for run in report.diff() {
            let marker = match run.op() {
                "insert" => '+',
                "delete" => '-',
                _ => ' ',
            };
            for line in run.lines() {
                println!("{marker} {line}");
            }
        }
        info!(
            target = "markbridge::convert",
            changes = report.changes().len(),
            "round trip finished"
        );
        return Ok(());
    }

    match orchestrator.convert(&ctx).await? {
        Conversion::Document { body, .. } => match body {
            ConvertedBody::Html(text) | ConvertedBody::Markup(text) => print!("{text}"),
            ConvertedBody::PageBundle(bundle) => println!(
                "{}",
                serde_json::to_string_pretty(&bundle)
                    .map_err(|err| AppError::unexpected(err.to_string()))?
            ),
            ConvertedBody::MarkupBundle(bundle) => println!(
                "{}",
                serde_json::to_string_pretty(&bundle)
                    .map_err(|err| AppError::unexpected(err.to_string()))?
            ),
        },
        Conversion::Redirect { location, .. } => {
            return Err(AppError::unexpected(format!(
                "conversion redirected to {location} without a content source"
            )));
        }
    }
    Ok(())
}

async fn read_input(path: &Path) -> Result<String, AppError> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|err| AppError::from(InfraError::from(err)))?;
        return Ok(text);
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))
}
