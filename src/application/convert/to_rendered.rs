use markbridge_api_types::{BundlePart, PageBundle};
use metrics::counter;
use tracing::{debug, info};
use url::{Position, Url};

use crate::application::{
    context::RequestContext,
    error::ConversionError,
    expansion::ReuseHints,
    ports::{ParseInput, PortError},
    render::document::Document,
    timeout::TimeoutToken,
};
use crate::domain::types::{ApiVersion, Format, RevisionId};

use super::{
    CachePolicy, Conversion, ConvertedBody, HTML_CONTENT_TYPE, JSON_CONTENT_TYPE,
    METRIC_REDIRECTS, Orchestrator, presubst::mark_for_substitution,
};

pub(super) async fn run(
    orchestrator: &Orchestrator,
    ctx: &RequestContext,
    token: &TimeoutToken,
) -> Result<Conversion, ConversionError> {
    let ports = orchestrator.ports();
    let mut hints = ReuseHints::default();

    let mut markup = match (ctx.inline_markup(), ctx.revision) {
        (Some(markup), _) => markup.to_string(),
        (None, Some(revision)) => {
            let record = orchestrator
                .step(
                    token,
                    ports.content.fetch(&ctx.site, &ctx.title, Some(revision)),
                    ConversionError::upstream,
                )
                .await?;
            hints.parent_revision = record.parent_revision_id.and_then(RevisionId::new);
            record.markup
        }
        (None, None) => {
            let latest = orchestrator
                .step(
                    token,
                    ports.content.latest_revision(&ctx.site, &ctx.title),
                    ConversionError::upstream,
                )
                .await?;
            return redirect_to_revision(ctx, latest);
        }
    };

    if ctx.flags.substitute_templates {
        let marked = mark_for_substitution(&markup);
        debug!(
            target = "markbridge::convert::presubst",
            location = %ctx.location(),
            "sending marked markup to the preprocessor"
        );
        markup = orchestrator
            .step(
                token,
                ports.preprocessor.substitute(&ctx.site, &ctx.title, &marked),
                ConversionError::upstream,
            )
            .await?;
        // The carried rendering no longer matches the rewritten source.
        hints.ignore_prior = true;
    }

    let expansions = orchestrator
        .supervisor()
        .bounded(token, orchestrator.resolver().resolve(ctx, hints))
        .await?;

    let document = orchestrator
        .step(
            token,
            ports.parser.parse(
                &ctx.site,
                ParseInput {
                    title: &ctx.title,
                    markup: &markup,
                    expansions: expansions.as_ref(),
                    scrub: ctx.flags.scrub_markup,
                },
            ),
            ConversionError::Parse,
        )
        .await?;

    let cache = CachePolicy::for_rendering(ctx, orchestrator.settings().cacheable_max_age_seconds);
    Ok(Conversion::Document {
        body: shape(ctx, document),
        cache,
    })
}

fn shape(ctx: &RequestContext, mut document: Document) -> ConvertedBody {
    let render = |document: &Document| {
        if ctx.flags.body_only {
            document.body_html()
        } else {
            document.to_html()
        }
    };

    match (ctx.api_version, ctx.format) {
        (ApiVersion::V2, Some(Format::PageBundle)) => {
            let annotations = document.extract_annotations();
            document.strip_annotations();
            ConvertedBody::PageBundle(PageBundle {
                html: BundlePart::new(HTML_CONTENT_TYPE, render(&document)),
                data_parsoid: BundlePart::new(JSON_CONTENT_TYPE, annotations),
            })
        }
        (ApiVersion::V2, _) => {
            document.strip_annotations();
            ConvertedBody::Html(render(&document))
        }
        // Legacy clients read the annotations inline.
        (ApiVersion::V1, _) => ConvertedBody::Html(render(&document)),
    }
}

fn redirect_to_revision(
    ctx: &RequestContext,
    revision: RevisionId,
) -> Result<Conversion, ConversionError> {
    let location = revision_location(ctx, revision)
        .map_err(|err| ConversionError::internal(err.to_string()))?;
    counter!(METRIC_REDIRECTS, "api" => ctx.api_version.as_str()).increment(1);
    info!(
        target = "markbridge::convert",
        location = %ctx.location(),
        redirect = %location,
        "redirecting to the latest revision"
    );
    Ok(Conversion::Redirect {
        location,
        cache: CachePolicy::uncacheable(),
    })
}

/// Canonical revision-qualified path for the request's API version, with the
/// original query string carried over.
pub(super) fn revision_location(
    ctx: &RequestContext,
    revision: RevisionId,
) -> Result<String, PortError> {
    let mut url = Url::parse("http://localhost/").map_err(PortError::failed)?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| PortError::failed("base url cannot hold a path"))?;
        match ctx.api_version {
            ApiVersion::V1 => {
                segments.push(&ctx.site.prefix);
                segments.extend(ctx.title.split('/'));
            }
            ApiVersion::V2 => {
                let format = ctx.format.unwrap_or(Format::Html);
                segments
                    .push("v2")
                    .push(&ctx.site.domain)
                    .push(format.as_str())
                    .push(&ctx.title)
                    .push(&revision.to_string());
            }
        }
    }

    let original_query = ctx.meta.query.as_deref().filter(|query| !query.is_empty());
    match ctx.api_version {
        ApiVersion::V1 => {
            let carried: Vec<(String, String)> = original_query
                .map(|query| {
                    url::form_urlencoded::parse(query.as_bytes())
                        .filter(|(key, _)| key != "oldid")
                        .map(|(key, value)| (key.into_owned(), value.into_owned()))
                        .collect()
                })
                .unwrap_or_default();
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("oldid", &revision.to_string());
            for (key, value) in &carried {
                pairs.append_pair(key, value);
            }
        }
        ApiVersion::V2 => url.set_query(original_query),
    }

    Ok(url[Position::BeforePath..].to_string())
}
