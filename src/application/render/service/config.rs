use comrak::options::Options;

/// Comrak options for the reference engine.
///
/// Only constructs the HTML-to-markup converter can write back are enabled.
/// Source positions are always on; they become the per-node source ranges.
pub(crate) fn default_options() -> Options<'static> {
    let mut options = Options::default();

    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.tagfilter = false;
    ext.table = false;
    ext.autolink = false;
    ext.tasklist = false;
    ext.footnotes = false;

    let render = &mut options.render;
    render.github_pre_lang = false;
    render.r#unsafe = true;
    render.sourcepos = true;
    render.escaped_char_spans = false;

    options
}
