//! Normalizes legacy and versioned request shapes into one [`RequestContext`].
//!
//! Transport extractors hand over already-decoded pieces (path segments,
//! flags, the JSON body); everything here is pure and synchronous.

use std::collections::BTreeMap;

use axum::http::Method;
use markbridge_api_types::TransformBody;

use crate::application::{
    context::{ConversionInput, PriorState, RequestContext, RequestMeta},
    error::ConversionError,
    sites::SiteRegistry,
};
use crate::domain::types::{
    ApiVersion, ConversionFlags, Direction, Format, RevisionId, parse_flag,
};

pub const INVALID_DOMAIN: &str = "Invalid domain";
pub const INVALID_FORMAT: &str = "Invalid format";
pub const SUBST_UNSUPPORTED: &str = "Substitution is only supported for the rendered format.";
pub const MISSING_HTML: &str = "No html was supplied.";
pub const MISSING_INPUT: &str = "POST requires a `wt` or `html` parameter.";

/// A request to `/{prefix}/{title}`.
///
/// `params` holds query parameters merged with form fields, form fields
/// taking precedence.
#[derive(Debug, Clone)]
pub struct LegacyRequest<'a> {
    pub method: &'a Method,
    pub prefix: &'a str,
    pub title: &'a str,
    pub params: &'a BTreeMap<String, String>,
    pub meta: RequestMeta,
}

/// A request to `/v2/{domain}/{format}/{title}[/{revision}]`.
#[derive(Debug, Clone)]
pub struct VersionedRequest<'a> {
    pub method: &'a Method,
    pub domain: &'a str,
    pub format: &'a str,
    pub title: &'a str,
    pub revision: Option<&'a str>,
    pub query: &'a BTreeMap<String, String>,
    pub body: Option<TransformBody>,
    pub meta: RequestMeta,
}

pub fn from_legacy(
    sites: &SiteRegistry,
    request: LegacyRequest<'_>,
) -> Result<RequestContext, ConversionError> {
    let site = sites
        .by_prefix(request.prefix)
        .ok_or_else(|| ConversionError::client(INVALID_DOMAIN))?;
    let param = |name: &str| request.params.get(name).map(String::as_str);

    let revision = RevisionId::parse_optional(param("oldid"))?;
    let (direction, input) = if *request.method == Method::POST {
        if let Some(markup) = param("wt") {
            (
                Direction::MarkupToRendered,
                ConversionInput::Markup(markup.to_string()),
            )
        } else if let Some(html) = param("html") {
            (
                Direction::RenderedToMarkup,
                ConversionInput::Rendered(html.to_string()),
            )
        } else {
            return Err(ConversionError::client(MISSING_INPUT));
        }
    } else {
        (Direction::MarkupToRendered, ConversionInput::None)
    };

    let substitute_templates = parse_flag(param("subst"));
    if substitute_templates && direction != Direction::MarkupToRendered {
        return Err(ConversionError::client(SUBST_UNSUPPORTED));
    }

    let flags = ConversionFlags {
        selective_serialization: direction == Direction::RenderedToMarkup && revision.is_some(),
        scrub_markup: parse_flag(param("scrubWikitext")),
        substitute_templates,
        body_only: parse_flag(param("body")),
    };

    Ok(RequestContext {
        site,
        api_version: ApiVersion::V1,
        direction,
        format: None,
        title: request.title.to_string(),
        revision,
        input,
        flags,
        original: None,
        previous: None,
        update: Default::default(),
        cache_id: None,
        meta: request.meta,
    })
}

pub fn from_versioned(
    sites: &SiteRegistry,
    request: VersionedRequest<'_>,
) -> Result<RequestContext, ConversionError> {
    let site = sites
        .by_domain(request.domain)
        .ok_or_else(|| ConversionError::client(INVALID_DOMAIN))?;
    let format: Format = request
        .format
        .parse()
        .map_err(|_| ConversionError::client(INVALID_FORMAT))?;
    if *request.method != Method::POST && !format.is_rendering() {
        return Err(ConversionError::client(INVALID_FORMAT));
    }

    let body = request.body.unwrap_or_default();
    let substitute_templates = body.subst.unwrap_or(false)
        || parse_flag(request.query.get("subst").map(String::as_str));
    if substitute_templates && format != Format::Html {
        return Err(ConversionError::client(SUBST_UNSUPPORTED));
    }

    let direction = format.direction();
    let input = match direction {
        Direction::MarkupToRendered => body
            .wikitext
            .map(|markup| ConversionInput::Markup(markup.into_text()))
            .unwrap_or(ConversionInput::None),
        Direction::RenderedToMarkup => body
            .html
            .map(|html| ConversionInput::Rendered(html.into_text()))
            .ok_or_else(|| ConversionError::client(MISSING_HTML))?,
    };

    let original = body.original.map(PriorState::from);
    let previous = body.previous.map(PriorState::from);
    let path_revision = RevisionId::parse_optional(request.revision)?;
    let revision = match direction {
        Direction::RenderedToMarkup => {
            path_revision.or_else(|| original.as_ref().and_then(|prior| prior.revision))
        }
        Direction::MarkupToRendered => path_revision,
    };

    let flags = ConversionFlags {
        selective_serialization: direction == Direction::RenderedToMarkup && original.is_some(),
        scrub_markup: body.scrub_wikitext.unwrap_or(false),
        substitute_templates,
        body_only: body.body_only.unwrap_or(false)
            || parse_flag(request.query.get("body_only").map(String::as_str)),
    };

    Ok(RequestContext {
        site,
        api_version: ApiVersion::V2,
        direction,
        format: Some(format),
        title: request.title.to_string(),
        revision,
        input,
        flags,
        original,
        previous,
        update: body.update.unwrap_or_default(),
        cache_id: body.cache_id.filter(|id| !id.is_empty()),
        meta: request.meta,
    })
}

#[cfg(test)]
mod tests {
    use markbridge_api_types::TextOrPart;

    use super::*;
    use crate::application::sites::Site;

    fn sites() -> SiteRegistry {
        SiteRegistry::new([Site::new("enwiki", "en.example.org", None)])
    }

    fn versioned<'a>(
        method: &'a Method,
        format: &'a str,
        query: &'a BTreeMap<String, String>,
        body: Option<TransformBody>,
    ) -> VersionedRequest<'a> {
        VersionedRequest {
            method,
            domain: "en.example.org",
            format,
            title: "Main_Page",
            revision: None,
            query,
            body,
            meta: RequestMeta::default(),
        }
    }

    fn client_message(result: Result<RequestContext, ConversionError>) -> String {
        match result {
            Err(ConversionError::Client { status, message }) => {
                assert_eq!(status.as_u16(), 400);
                message
            }
            other => panic!("expected client error, got {other:?}"),
        }
    }

    #[test]
    fn versioned_get_rejects_markup_format() {
        let query = BTreeMap::new();
        let result = from_versioned(&sites(), versioned(&Method::GET, "markup", &query, None));
        assert_eq!(client_message(result), "Invalid format");
    }

    #[test]
    fn versioned_rejects_unknown_domain_and_format() {
        let query = BTreeMap::new();
        let mut request = versioned(&Method::GET, "html", &query, None);
        request.domain = "fr.example.org";
        assert_eq!(client_message(from_versioned(&sites(), request)), "Invalid domain");

        let result = from_versioned(&sites(), versioned(&Method::GET, "pdf", &query, None));
        assert_eq!(client_message(result), "Invalid format");
    }

    #[test]
    fn substitution_is_accepted_only_for_the_rendered_format() {
        let mut query = BTreeMap::new();
        query.insert("subst".to_string(), "true".to_string());
        let body = TransformBody {
            wikitext: Some(TextOrPart::Text("Hello {{Template}}".into())),
            html: Some(TextOrPart::Text("<p>Hello</p>".into())),
            ..TransformBody::default()
        };

        let accepted = from_versioned(
            &sites(),
            versioned(&Method::POST, "rendered", &query, Some(body.clone())),
        )
        .expect("rendered format accepts subst");
        assert!(accepted.flags.substitute_templates);
        assert_eq!(accepted.inline_markup(), Some("Hello {{Template}}"));

        let rejected = from_versioned(
            &sites(),
            versioned(&Method::POST, "markup", &query, Some(body)),
        );
        assert_eq!(
            client_message(rejected),
            "Substitution is only supported for the rendered format."
        );
    }

    #[test]
    fn versioned_serialization_requires_html() {
        let query = BTreeMap::new();
        let result = from_versioned(
            &sites(),
            versioned(&Method::POST, "wikitext", &query, Some(TransformBody::default())),
        );
        assert_eq!(client_message(result), MISSING_HTML);
    }

    #[test]
    fn versioned_serialization_takes_revision_from_original() {
        let query = BTreeMap::new();
        let body: TransformBody = serde_json::from_value(serde_json::json!({
            "html": "<p>x</p>",
            "original": {"revid": 12, "wikitext": "x"},
            "update": {"files": true},
            "cacheId": "",
        }))
        .expect("body");
        let ctx = from_versioned(&sites(), versioned(&Method::POST, "wikitext", &query, Some(body)))
            .expect("context");
        assert_eq!(ctx.direction, Direction::RenderedToMarkup);
        assert_eq!(ctx.revision.map(RevisionId::get), Some(12));
        assert!(ctx.flags.selective_serialization);
        assert!(ctx.update.files);
        assert_eq!(ctx.cache_id, None);
    }

    #[test]
    fn legacy_post_picks_direction_from_fields() {
        let mut params = BTreeMap::new();
        params.insert("html".to_string(), "<p>x</p>".to_string());
        params.insert("oldid".to_string(), "7".to_string());
        let ctx = from_legacy(
            &sites(),
            LegacyRequest {
                method: &Method::POST,
                prefix: "enwiki",
                title: "Main_Page",
                params: &params,
                meta: RequestMeta::default(),
            },
        )
        .expect("context");
        assert_eq!(ctx.direction, Direction::RenderedToMarkup);
        assert_eq!(ctx.api_version, ApiVersion::V1);
        assert!(ctx.flags.selective_serialization);

        params.insert("subst".to_string(), "1".to_string());
        let rejected = from_legacy(
            &sites(),
            LegacyRequest {
                method: &Method::POST,
                prefix: "enwiki",
                title: "Main_Page",
                params: &params,
                meta: RequestMeta::default(),
            },
        );
        assert_eq!(client_message(rejected), SUBST_UNSUPPORTED);
    }

    #[test]
    fn legacy_get_reads_flags_and_rejects_unknown_prefix() {
        let mut params = BTreeMap::new();
        params.insert("body".to_string(), "1".to_string());
        params.insert("scrubWikitext".to_string(), "true".to_string());
        let ctx = from_legacy(
            &sites(),
            LegacyRequest {
                method: &Method::GET,
                prefix: "enwiki",
                title: "Main_Page",
                params: &params,
                meta: RequestMeta::default(),
            },
        )
        .expect("context");
        assert_eq!(ctx.input, ConversionInput::None);
        assert!(ctx.flags.body_only);
        assert!(ctx.flags.scrub_markup);

        let rejected = from_legacy(
            &sites(),
            LegacyRequest {
                method: &Method::GET,
                prefix: "xxwiki",
                title: "Main_Page",
                params: &params,
                meta: RequestMeta::default(),
            },
        );
        assert_eq!(client_message(rejected), INVALID_DOMAIN);
    }
}
