use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::{
    convert::METRIC_REDIRECTS,
    expansion::{METRIC_EXPANSION_REUSE, METRIC_RENDER_CACHE_FAILURES},
    timeout::{METRIC_HARD_TIMEOUTS, METRIC_SOFT_TIMEOUTS},
};
use crate::config::{LogFormat, LoggingSettings};

use super::{error::InfraError, http::METRIC_HTTP_RESPONSES};

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr; stdout belongs to the heartbeat protocol and to the
/// `convert` command's output.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(true)
            .boxed(),
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_SOFT_TIMEOUTS,
            Unit::Count,
            "Total number of operations cut off by the soft deadline."
        );
        describe_counter!(
            METRIC_HARD_TIMEOUTS,
            Unit::Count,
            "Total number of pipelines that outlived the hard deadline."
        );
        describe_counter!(
            METRIC_EXPANSION_REUSE,
            Unit::Count,
            "Total number of expansion sets reused, labelled by source."
        );
        describe_counter!(
            METRIC_RENDER_CACHE_FAILURES,
            Unit::Count,
            "Total number of render cache lookups that failed and were treated as misses."
        );
        describe_counter!(
            METRIC_REDIRECTS,
            Unit::Count,
            "Total number of redirects to the latest revision, labelled by API version."
        );
        describe_counter!(
            METRIC_HTTP_RESPONSES,
            Unit::Count,
            "Total number of HTTP responses, labelled by status class."
        );
    });
}
