use markbridge_api_types::{BundlePart, MarkupBundle};
use tracing::debug;

use crate::application::{
    adapter::MISSING_HTML,
    context::RequestContext,
    error::ConversionError,
    ports::SerializeMode,
    render::document::Document,
    timeout::TimeoutToken,
};
use crate::domain::types::ApiVersion;

use super::{CachePolicy, Conversion, ConvertedBody, MARKUP_CONTENT_TYPE, Orchestrator};

pub(super) async fn run(
    orchestrator: &Orchestrator,
    ctx: &RequestContext,
    token: &TimeoutToken,
) -> Result<Conversion, ConversionError> {
    let html = ctx
        .rendered_input()
        .ok_or_else(|| ConversionError::client(MISSING_HTML))?;
    let mut document = Document::parse(html)
        .map_err(|err| ConversionError::client(format!("Invalid html: {err}")))?;

    let original = ctx.original.as_ref();
    let baseline_source = original.and_then(|prior| prior.markup.as_deref());
    let annotations = original.and_then(|prior| prior.annotations.as_ref());
    let mut baseline = match original.and_then(|prior| prior.html.as_deref()) {
        Some(html) => Some(Document::parse(html).map_err(|err| {
            ConversionError::client(format!("Invalid original html: {err}"))
        })?),
        None => None,
    };
    if let Some(annotations) = annotations {
        document.apply_annotations(annotations);
        if let Some(baseline) = baseline.as_mut() {
            baseline.apply_annotations(annotations);
        }
    }

    let selective = ctx.flags.selective_serialization
        && ctx.revision.is_some()
        && orchestrator.settings().selective_serialization;
    let mode = match baseline_source {
        Some(baseline_source) if selective => SerializeMode::Selective {
            baseline_source,
            baseline: baseline.as_ref(),
        },
        _ => SerializeMode::Full,
    };
    if ctx.flags.selective_serialization && !mode.is_selective() {
        debug!(
            target = "markbridge::convert",
            location = %ctx.location(),
            has_revision = ctx.revision.is_some(),
            has_source = baseline_source.is_some(),
            "selective serialization unavailable, serializing in full"
        );
    }

    let markup = orchestrator
        .step(
            token,
            orchestrator
                .ports()
                .serializer
                .serialize(&ctx.site, &document, mode),
            ConversionError::Serialize,
        )
        .await?;

    let body = match ctx.api_version {
        ApiVersion::V2 if ctx.meta.accept_json => ConvertedBody::MarkupBundle(MarkupBundle {
            wikitext: BundlePart::new(MARKUP_CONTENT_TYPE, markup),
        }),
        _ => ConvertedBody::Markup(markup),
    };
    Ok(Conversion::Document {
        body,
        cache: CachePolicy::uncacheable(),
    })
}
