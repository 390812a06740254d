//! Owned XML tree for the tex4ht hypertext output.
//!
//! The tree is loaded once with a strict reader, mutated in place by the
//! sanitizer passes and serialized once. Parent links are not kept: every
//! rewrite walks `children` vectors top-down, so removals never leave stale
//! handles behind.

use crate::error::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
    Declaration(String),
    DocType(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Attributes in document order.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_children(name, Vec::new())
    }

    pub fn with_children(name: impl Into<String>, children: Vec<Node>) -> Self {
        Element {
            name: name.into(),
            attrs: Vec::new(),
            children,
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.attrs.push((key.to_string(), value)),
        }
    }

    /// Detach and drop every descendant element matching `pred`, together with
    /// its subtree. Returns the number of elements removed.
    pub fn remove_where(&mut self, pred: &dyn Fn(&Element) -> bool) -> usize {
        let before = self.children.len();
        self.children
            .retain(|c| !matches!(c, Node::Element(e) if pred(e)));
        let mut removed = before - self.children.len();
        for child in &mut self.children {
            if let Node::Element(e) = child {
                removed += e.remove_where(pred);
            }
        }
        removed
    }

    /// Descendant elements named `name`, in document order.
    pub fn find_all(&self, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect_named(name, &mut found);
        found
    }

    fn collect_named<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        for child in &self.children {
            if let Node::Element(e) = child {
                if e.is(name) {
                    found.push(e);
                }
                e.collect_named(name, found);
            }
        }
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                Node::Text(t) | Node::CData(t) => out.push_str(t),
                Node::Element(e) => out.push_str(&e.text_content()),
                _ => {}
            }
        }
        out
    }
}

/// A parsed hypertext file: whatever precedes the root element (declaration,
/// doctype, comments), the root itself, and whatever trails it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    pub prolog: Vec<Node>,
    pub root: Element,
    pub epilog: Vec<Node>,
}

impl Document {
    /// Parse well-formed XML. Any syntax error is fatal; no partial tree is
    /// returned.
    pub fn parse(source: &str) -> Result<Document> {
        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text_start = false;
        reader.config_mut().trim_text_end = false;

        let mut builder = TreeBuilder::default();
        loop {
            let event = reader.read_event().map_err(|err| Error::XmlSyntax {
                message: err.to_string(),
                position: reader.error_position(),
            })?;
            let position = reader.buffer_position();

            match event {
                Event::Start(e) => {
                    let element = element_from(&e, position)?;
                    builder.stack.push(element);
                }
                Event::Empty(e) => {
                    let element = element_from(&e, position)?;
                    builder.push(Node::Element(element))?;
                }
                Event::End(e) => {
                    let name = lossy(e.name().as_ref());
                    let element = builder
                        .stack
                        .pop()
                        .ok_or_else(|| Error::UnexpectedEndTag(name.clone()))?;
                    if element.name != name {
                        return Err(Error::MismatchedEndTag {
                            expected: element.name,
                            found: name,
                        });
                    }
                    builder.push(Node::Element(element))?;
                }
                Event::Text(e) => {
                    let text = e.unescape().map_err(|err| Error::XmlSyntax {
                        message: format!("invalid text content: {err}"),
                        position,
                    })?;
                    builder.push(Node::Text(text.into_owned()))?;
                }
                Event::CData(e) => builder.push(Node::CData(lossy(&e)))?,
                Event::Comment(e) => builder.push(Node::Comment(lossy(&e)))?,
                Event::PI(e) => builder.push(Node::ProcessingInstruction(lossy(&e)))?,
                Event::Decl(e) => builder.push(Node::Declaration(lossy(&e)))?,
                Event::DocType(e) => builder.push(Node::DocType(lossy(&e).trim().to_string()))?,
                Event::Eof => break,
            }
        }

        if let Some(open) = builder.stack.pop() {
            return Err(Error::UnclosedElement(open.name));
        }
        let root = builder.root.ok_or(Error::EmptyDocument)?;
        Ok(Document {
            prolog: builder.prolog,
            root,
            epilog: builder.epilog,
        })
    }

    pub fn find_all(&self, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        if self.root.is(name) {
            found.push(&self.root);
        }
        found.extend(self.root.find_all(name));
        found
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        for n in &self.prolog {
            serialize_node(&mut out, n);
        }
        serialize_element(&mut out, &self.root);
        for n in &self.epilog {
            serialize_node(&mut out, n);
        }
        out
    }
}

#[derive(Default)]
struct TreeBuilder {
    prolog: Vec<Node>,
    root: Option<Element>,
    epilog: Vec<Node>,
    stack: Vec<Element>,
}

impl TreeBuilder {
    fn push(&mut self, node: Node) -> Result<()> {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(node);
            return Ok(());
        }
        match node {
            Node::Element(e) => {
                if self.root.is_some() {
                    return Err(Error::MultipleRoots);
                }
                self.root = Some(e);
            }
            Node::Text(ref t) | Node::CData(ref t) if !t.trim().is_empty() => {
                return Err(Error::TextOutsideRoot);
            }
            other if self.root.is_some() => self.epilog.push(other),
            other => self.prolog.push(other),
        }
        Ok(())
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn element_from(e: &BytesStart<'_>, position: u64) -> Result<Element> {
    let mut element = Element::new(lossy(e.name().as_ref()));
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::XmlSyntax {
            message: format!("invalid attribute: {err}"),
            position,
        })?;
        let value = attr.unescape_value().map_err(|err| Error::XmlSyntax {
            message: format!("invalid attribute value: {err}"),
            position,
        })?;
        element
            .attrs
            .push((lossy(attr.key.as_ref()), value.into_owned()));
    }
    Ok(element)
}

fn esc_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn esc_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn is_void(tag: &str) -> bool {
    matches!(
        tag.to_ascii_lowercase().as_str(),
        "br" | "hr" | "img" | "meta" | "link" | "input"
    )
}

fn serialize_node(out: &mut String, n: &Node) {
    match n {
        Node::Element(e) => serialize_element(out, e),
        Node::Text(t) => out.push_str(&esc_text(t)),
        Node::CData(t) => {
            out.push_str("<![CDATA[");
            out.push_str(t);
            out.push_str("]]>");
        }
        Node::Comment(c) => {
            out.push_str("<!--");
            out.push_str(c);
            out.push_str("-->");
        }
        Node::ProcessingInstruction(p) | Node::Declaration(p) => {
            out.push_str("<?");
            out.push_str(p);
            out.push_str("?>");
        }
        Node::DocType(d) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(d);
            out.push('>');
        }
    }
}

fn serialize_element(out: &mut String, e: &Element) {
    out.push('<');
    out.push_str(&e.name);
    for (k, v) in &e.attrs {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        out.push_str(&esc_attr(v));
        out.push('"');
    }
    // Only void elements self-close; `<div/>` confuses HTML readers.
    if e.children.is_empty() && is_void(&e.name) {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for c in &e.children {
        serialize_node(out, c);
    }
    out.push_str("</");
    out.push_str(&e.name);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_simple_markup() {
        let xml = r#"<html><body><p class="noindent">Hello <b>world</b>.</p><br/></body></html>"#;
        let doc = Document::parse(xml).unwrap();
        assert_eq!(doc.to_xml(), xml);
    }

    #[test]
    fn keeps_prolog_and_doctype() {
        let xml = concat!(
            "<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n",
            "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.1//EN\" \"http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd\">\n",
            "<!-- generated -->\n",
            "<html xmlns=\"http://www.w3.org/1999/xhtml\"><body/></html>\n",
        );
        let doc = Document::parse(xml).unwrap();
        let out = doc.to_xml();
        assert!(out.starts_with("<?xml version=\"1.0\""));
        assert!(out.contains(
            "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.1//EN\" \"http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd\">"
        ));
        assert!(out.contains("<!-- generated -->"));
        assert!(out.contains("<html xmlns=\"http://www.w3.org/1999/xhtml\"><body></body></html>"));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn unescapes_and_reescapes_text_and_attributes() {
        let xml = r#"<p title="a &quot;b&quot; &amp; c">x &amp; y &lt; z</p>"#;
        let doc = Document::parse(xml).unwrap();
        assert_eq!(doc.root.attr("title"), Some("a \"b\" & c"));
        assert_eq!(doc.root.text_content(), "x & y < z");
        assert_eq!(doc.to_xml(), xml);
    }

    #[test]
    fn numeric_references_become_characters() {
        let doc = Document::parse("<p>&#8220;quoted&#x201D;</p>").unwrap();
        assert_eq!(doc.root.text_content(), "\u{201C}quoted\u{201D}");
    }

    #[test]
    fn rejects_undeclared_named_entities() {
        assert!(Document::parse("<p>&ldquo;x</p>").is_err());
    }

    #[test]
    fn rejects_unclosed_and_mismatched_markup() {
        assert!(Document::parse("<html><body></html>").is_err());
        assert!(Document::parse("<html><body>").is_err());
        assert!(matches!(Document::parse(""), Err(Error::EmptyDocument)));
        assert!(Document::parse("<a/><b/>").is_err());
        assert!(Document::parse("stray<a/>").is_err());
    }

    #[test]
    fn remove_where_drops_whole_subtrees() {
        let mut doc =
            Document::parse("<r><x><x>inner</x></x><y><x/></y><z>keep</z></r>").unwrap();
        let removed = doc.root.remove_where(&|e: &Element| e.is("x"));
        assert_eq!(removed, 2);
        assert_eq!(doc.to_xml(), "<r><y></y><z>keep</z></r>");
    }

    #[test]
    fn find_all_is_document_ordered() {
        let doc = Document::parse(r#"<r><img src="a"/><p><img src="b"/></p><img src="c"/></r>"#)
            .unwrap();
        let srcs: Vec<_> = doc
            .find_all("img")
            .into_iter()
            .filter_map(|e| e.attr("src"))
            .collect();
        assert_eq!(srcs, vec!["a", "b", "c"]);
    }

    #[test]
    fn set_attr_replaces_in_place() {
        let mut e = Element::new("span");
        e.set_attr("class", "a");
        e.set_attr("id", "x");
        e.set_attr("class", "b");
        assert_eq!(
            e.attrs,
            vec![
                ("class".to_string(), "b".to_string()),
                ("id".to_string(), "x".to_string())
            ]
        );
    }
}
