use crate::application::{
    error::HttpError,
    roundtrip::{RoundTripReport, diff::DiffRun},
};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Clone)]
pub struct DiffLineView {
    pub class: &'static str,
    pub marker: &'static str,
    pub text: String,
}

#[derive(Clone)]
pub struct RoundTripView {
    pub variant: &'static str,
    pub request_url: String,
    /// Raw `<base>` element, trusted because it was produced by the renderer.
    pub headers: String,
    pub fragments: Vec<String>,
    /// Already HTML-escaped.
    pub rendered_text: String,
    pub original_markup: String,
    pub markup: String,
    pub diff: Vec<DiffLineView>,
    pub change_count: usize,
}

impl RoundTripView {
    pub fn from_report(report: &RoundTripReport) -> Self {
        let diff = report
            .diff()
            .iter()
            .flat_map(|run| {
                let (class, marker) = match run {
                    DiffRun::Equal(_) => ("equal", " "),
                    DiffRun::Insert(_) => ("insert", "+"),
                    DiffRun::Delete(_) => ("delete", "-"),
                };
                run.lines().iter().map(move |line| DiffLineView {
                    class,
                    marker,
                    text: line.clone(),
                })
            })
            .collect();

        Self {
            variant: report.variant().route_prefix(),
            request_url: report.request_url().to_string(),
            headers: report.headers().unwrap_or_default().to_string(),
            fragments: report.body_fragments().to_vec(),
            rendered_text: report.rendered_text().to_string(),
            original_markup: report.original_markup().to_string(),
            markup: report.markup().to_string(),
            diff,
            change_count: report.changes().len(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.change_count == 0
    }
}

#[derive(Template)]
#[template(path = "roundtrip.html")]
pub struct RoundTripTemplate {
    pub view: RoundTripView,
}
