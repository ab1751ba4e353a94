//! Recovering reusable expansions from a previously rendered document.

use crate::domain::expansion::{ExpansionKind, ExpansionSet};

use super::document::Document;

/// Attribute holding a transclusion's invocation source.
pub const TEMPLATE_ATTR: &str = "data-template";
/// Attribute holding the file name an image was rendered from.
pub const FILE_ATTR: &str = "data-file";

/// Template fragments are keyed by invocation source, files by file name.
pub fn collect_expansions(document: &Document) -> ExpansionSet {
    let mut set = ExpansionSet::new();
    document.for_each_element(&mut |element| {
        if let Some(source) = element.attr(TEMPLATE_ATTR) {
            set.insert(ExpansionKind::Templates, source, element.inner_html());
        }
        if element.name == "img"
            && let (Some(file), Some(src)) = (element.attr(FILE_ATTR), element.attr("src"))
        {
            set.insert(ExpansionKind::Files, file, src);
        }
    });
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_transclusions_and_files() {
        let html = "<p id=\"mb0\">Hi <span typeof=\"mw:Transclusion\" data-template=\"{{Greeting|who=you}}\">\
                    <b>hello</b> you</span></p><p><img src=\"/media/cdn/Cat.png\" data-file=\"Cat.png\" alt=\"\"></p>";
        let document = Document::parse(html).expect("parse");

        let set = collect_expansions(&document);
        assert_eq!(
            set.get(ExpansionKind::Templates, "{{Greeting|who=you}}"),
            Some("<b>hello</b> you")
        );
        assert_eq!(set.get(ExpansionKind::Files, "Cat.png"), Some("/media/cdn/Cat.png"));
    }
}
