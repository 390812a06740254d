//! Cleanup of tex4ht hypertext before it is handed to pandoc.
//!
//! The raw file first goes through [`normalize_entities`] so it parses as XML.
//! The tree then receives the [`Pass`]es in [`Pass::ORDERED`]; later passes
//! rely on the removals done by earlier ones. Every pass walks the live tree
//! from the root, so nothing it touches was collected before a removal.

use crate::dom::{Document, Element, Node};
use crate::entities::normalize_entities;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

/// `hr` classes tex4ht uses to fence figures and floats.
pub const FLOAT_RULE_CLASSES: [&str; 4] = ["figure", "endfigure", "float", "endfloat"];

/// Spacing span tex4ht puts between a bibliography label and its entry.
pub const BIBLIOGRAPHY_SPACING_CLASS: &str = "bibsp";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
    /// pandoc would prepend the title to the body.
    RemoveTitles,
    /// pandoc would prepend the date to the body.
    RemoveDateMeta,
    RemoveFloatRules,
    RemoveBibliographySpacing,
    /// `<a href="#...">` is replaced by its children.
    UnwrapInternalLinks,
    /// Italic font spans (`ptmri8t-` and friends) get an `<em>` inside them.
    ReconstructItalics,
    PruneEmptyDivs,
}

impl Pass {
    pub const ORDERED: [Pass; 7] = [
        Pass::RemoveTitles,
        Pass::RemoveDateMeta,
        Pass::RemoveFloatRules,
        Pass::RemoveBibliographySpacing,
        Pass::UnwrapInternalLinks,
        Pass::ReconstructItalics,
        Pass::PruneEmptyDivs,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Pass::RemoveTitles => "remove-titles",
            Pass::RemoveDateMeta => "remove-date-meta",
            Pass::RemoveFloatRules => "remove-float-rules",
            Pass::RemoveBibliographySpacing => "remove-bibliography-spacing",
            Pass::UnwrapInternalLinks => "unwrap-internal-links",
            Pass::ReconstructItalics => "reconstruct-italics",
            Pass::PruneEmptyDivs => "prune-empty-divs",
        }
    }

    /// Run the pass over every descendant of `root`. Returns how many
    /// elements were removed, unwrapped or wrapped.
    pub fn apply(self, root: &mut Element) -> usize {
        match self {
            Pass::RemoveTitles => root.remove_where(&|e: &Element| e.is("title")),
            Pass::RemoveDateMeta => {
                root.remove_where(&|e: &Element| e.is("meta") && e.attr("name") == Some("date"))
            }
            Pass::RemoveFloatRules => root.remove_where(&|e: &Element| {
                e.is("hr")
                    && e
                        .attr("class")
                        .is_some_and(|c| FLOAT_RULE_CLASSES.contains(&c))
            }),
            Pass::RemoveBibliographySpacing => root.remove_where(&|e: &Element| {
                e.is("span") && e.attr("class") == Some(BIBLIOGRAPHY_SPACING_CLASS)
            }),
            Pass::UnwrapInternalLinks => unwrap_internal_links(&mut root.children),
            Pass::ReconstructItalics => reconstruct_italics(&mut root.children),
            Pass::PruneEmptyDivs => prune_empty_divs(&mut root.children),
        }
    }
}

fn is_internal_link(e: &Element) -> bool {
    e.is("a") && e.attr("href").is_some_and(|href| href.starts_with('#'))
}

fn unwrap_internal_links(children: &mut Vec<Node>) -> usize {
    let mut unwrapped = 0;
    let mut rewritten = Vec::with_capacity(children.len());
    for node in children.drain(..) {
        match node {
            Node::Element(mut element) => {
                unwrapped += unwrap_internal_links(&mut element.children);
                if is_internal_link(&element) {
                    rewritten.extend(element.children);
                    unwrapped += 1;
                } else {
                    rewritten.push(Node::Element(element));
                }
            }
            other => rewritten.push(other),
        }
    }
    *children = rewritten;
    unwrapped
}

// Font classes look like `<family><variant>-<size>`; an `i` in the variant
// marks italics.
fn is_italic_font_span(e: &Element) -> bool {
    e.is("span")
        && e
            .attr("class")
            .is_some_and(|c| c.contains('i') && c.contains('-'))
}

fn already_emphasized(e: &Element) -> bool {
    matches!(e.children.as_slice(), [Node::Element(only)] if only.is("em"))
}

fn reconstruct_italics(children: &mut Vec<Node>) -> usize {
    let mut wrapped = 0;
    let mut i = 0;
    while i < children.len() {
        let mut trailing_space = false;
        if let Node::Element(element) = &mut children[i] {
            if is_italic_font_span(element) && !already_emphasized(element) {
                let inner = std::mem::take(&mut element.children);
                trailing_space = matches!(inner.last(), Some(Node::Text(t)) if t.ends_with(' '));
                element
                    .children
                    .push(Node::Element(Element::with_children("em", inner)));
                wrapped += 1;
            }
            wrapped += reconstruct_italics(&mut element.children);
        }
        // Some renderers trim the space at the end of inline emphasis.
        if trailing_space {
            children.insert(i + 1, Node::Text(" ".to_string()));
            i += 1;
        }
        i += 1;
    }
    wrapped
}

fn prune_empty_divs(children: &mut Vec<Node>) -> usize {
    let mut pruned = 0;
    for node in children.iter_mut() {
        if let Node::Element(e) = node {
            pruned += prune_empty_divs(&mut e.children);
        }
    }
    let before = children.len();
    children.retain(|n| !matches!(n, Node::Element(e) if e.is("div") && e.children.is_empty()));
    pruned + before - children.len()
}

/// Apply every pass, in order, to `document`.
pub fn sanitize(document: &mut Document) -> &mut Document {
    for pass in Pass::ORDERED {
        let touched = pass.apply(&mut document.root);
        debug!(pass = pass.name(), touched, "sanitizer pass");
    }
    document
}

/// Entity pre-normalization, parse, passes and serialization of raw text.
pub fn sanitize_str(raw: &str) -> Result<String> {
    let mut document = Document::parse(&normalize_entities(raw))?;
    sanitize(&mut document);
    Ok(document.to_xml())
}

/// Sanitize the hypertext file at `path` in place. The rewritten tree is
/// returned so callers can inspect what was written (images, for instance).
pub fn sanitize_file(path: &Path) -> Result<Document> {
    let raw = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let mut document = Document::parse(&normalize_entities(&raw))?;
    sanitize(&mut document);
    fs::write(path, document.to_xml()).map_err(|e| Error::io(path, e))?;
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(inner: &str) -> String {
        format!("<html><head></head><body>{inner}</body></html>")
    }

    fn run(inner: &str) -> String {
        sanitize_str(&body(inner)).unwrap()
    }

    #[test]
    fn removes_titles_and_date_meta() {
        let out = sanitize_str(concat!(
            "<html><head><title>Paper</title>",
            r#"<meta name="date" content="2014-01-01"/>"#,
            r#"<meta name="generator" content="TeX4ht"/>"#,
            "</head><body><p>x</p></body></html>",
        ))
        .unwrap();
        assert_eq!(
            out,
            r#"<html><head><meta name="generator" content="TeX4ht"/></head><body><p>x</p></body></html>"#
        );
    }

    #[test]
    fn removes_only_exact_float_rules() {
        let out = run(concat!(
            r#"<hr class="figure"/><p>a</p><hr class="endfigure"/>"#,
            r#"<hr class="float"/><hr class="endfloat"/>"#,
            r#"<hr class="figure-extra"/><hr/>"#,
        ));
        assert_eq!(out, body(r#"<p>a</p><hr class="figure-extra"/><hr/>"#));
    }

    #[test]
    fn removes_bibliography_spacing() {
        let out = run(r#"<p><span class="biblabel">[1]<span class="bibsp">&#160;&#160;</span></span>Jones</p>"#);
        assert_eq!(out, body(r#"<p><span class="biblabel">[1]</span>Jones</p>"#));
    }

    #[test]
    fn unwraps_internal_links_in_place() {
        let out = run(concat!(
            r##"<p>See <a href="#sec1">Section <b>1</b></a>."##,
            r##" <a href="http://example.com/#x">web</a> <a id="anchor"></a></p>"##,
        ));
        assert_eq!(
            out,
            body(r#"<p>See Section <b>1</b>. <a href="http://example.com/#x">web</a> <a id="anchor"></a></p>"#)
        );
    }

    #[test]
    fn unwraps_nested_internal_links() {
        let out = run(r##"<p><a href="#a">x<a href="#b">y</a>z</a></p>"##);
        assert_eq!(out, body("<p>xyz</p>"));
    }

    #[test]
    fn wraps_italic_spans_and_keeps_trailing_space() {
        let out = run(r#"<p><span class="ptmri8t-">word </span>next</p>"#);
        assert_eq!(
            out,
            body(r#"<p><span class="ptmri8t-"><em>word </em></span> next</p>"#)
        );
    }

    #[test]
    fn italic_without_trailing_space_gets_no_extra_node() {
        let out = run(r#"<p><span class="ptmri8t-">word</span>, next</p>"#);
        assert_eq!(
            out,
            body(r#"<p><span class="ptmri8t-"><em>word</em></span>, next</p>"#)
        );
    }

    #[test]
    fn non_italic_font_spans_are_untouched() {
        let input = r#"<p><span class="ptmr8t-">roman </span><span class="ptmri8t">no size</span></p>"#;
        assert_eq!(run(input), body(input));
    }

    #[test]
    fn prunes_empty_divs_including_nested() {
        let out = run(r#"<div class="maketitle"></div><div><div/></div><div>text</div><div><p>p</p></div>"#);
        assert_eq!(out, body("<div>text</div><div><p>p</p></div>"));
    }

    #[test]
    fn internal_link_inside_bibliography_spacing_goes_with_it() {
        let out = run(r##"<p><span class="bibsp"><a href="#x">gone</a></span>kept</p>"##);
        assert_eq!(out, body("<p>kept</p>"));
    }

    #[test]
    fn quote_entities_are_accepted() {
        let out = run("<p>&ldquo;quoted&rdquo; &lsquo;single&rsquo;</p>");
        assert_eq!(
            out,
            body("<p>\u{201C}quoted\u{201D} \u{2018}single\u{2019}</p>")
        );
    }

    #[test]
    fn malformed_input_is_fatal() {
        assert!(sanitize_str("<html><body><p>unclosed</body></html>").is_err());
        assert!(sanitize_str("<html><body>&nbsp;</body></html>").is_err());
    }

    #[test]
    fn running_twice_changes_nothing() {
        let input = body(concat!(
            r##"<p>(<a href="#X1">Smith, 2010</a>; <a href="#X2">Jones, 2005</a>)</p>"##,
            r#"<p><span class="ptmri8t-">one </span><span class="ptmbi8t-">two</span></p>"#,
            r#"<div></div><hr class="figure"/><span class="bibsp"> </span>"#,
        ));
        let mut document = Document::parse(&input).unwrap();
        sanitize(&mut document);
        let once = document.to_xml();
        sanitize(&mut document);
        assert_eq!(document.to_xml(), once);
        for pass in Pass::ORDERED {
            assert_eq!(pass.apply(&mut document.root), 0, "{}", pass.name());
        }
    }

    #[test]
    fn postconditions_hold() {
        let input = concat!(
            "<html><head><title>T</title><meta name=\"date\" content=\"d\"/></head>",
            "<body><title>again</title><p><a href=\"#x\">a</a><a href=\"#y\"/></p></body></html>",
        );
        let mut document = Document::parse(input).unwrap();
        sanitize(&mut document);
        assert!(document.find_all("title").is_empty());
        assert!(document
            .find_all("meta")
            .iter()
            .all(|m| m.attr("name") != Some("date")));
        assert!(document
            .find_all("a")
            .iter()
            .all(|a| !a.attr("href").is_some_and(|h| h.starts_with('#'))));
    }

    #[test]
    fn sanitize_file_rewrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.html");
        fs::write(&path, body("<title>x</title><div></div><p>kept</p>")).unwrap();
        let document = sanitize_file(&path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, body("<p>kept</p>"));
        assert_eq!(document.to_xml(), written);
    }
}
