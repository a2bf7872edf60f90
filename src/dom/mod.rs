//! Markup parse, query and mutate interface.
//!
//! [`Document`] parses an HTML or XHTML content document into an arena DOM
//! with html5ever, lets callers query and edit elements through [`NodeId`]
//! handles, and writes the tree back out as XHTML.
//!
//! # Example
//!
//! ```
//! use folio::dom::Document;
//! use folio::EpubVersion;
//!
//! let mut doc = Document::parse("<html><body><p>Hi</p></body></html>", EpubVersion::V3);
//! let root = doc.root_element().unwrap();
//! doc.set_attr(root, "xml:lang", "en");
//! assert!(doc.to_xhtml().contains(r#"xml:lang="en""#));
//! ```

mod arena;
mod serialize;
mod tree_sink;

use std::ops::Range;
use std::sync::LazyLock;

use html5ever::driver::ParseOpts;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use regex_lite::{Captures, Regex};

pub use arena::{ArenaDom, Attribute, Node, NodeData, NodeId};
pub use serialize::{
    XML_DECLARATION, default_doctype, escape_attr, escape_text, is_void_element, serialize_node,
};
use tree_sink::ArenaSink;

use crate::book::EpubVersion;

static XML_DECLARATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*<\?xml[^>]*\?>").expect("valid regex"));

static SELF_CLOSING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<([A-Za-z][A-Za-z0-9:_.-]*)((?:\s+[^\s=/>]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))?)*)\s*/>"#)
        .expect("valid regex")
});

/// Start of a region whose text is not markup: a comment, a CDATA section or
/// the start tag of an element with raw or escapable text content.
static VERBATIM_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<!--|<!\[CDATA\[|<(script|style|textarea|title|iframe|noembed|noframes|xmp)[\s/>]",
    )
    .expect("valid regex")
});

/// A parsed content document.
pub struct Document {
    dom: ArenaDom,
    version: EpubVersion,
    parse_errors: usize,
}

impl Document {
    /// Parse markup text. Never fails: malformed input yields a best-effort tree.
    pub fn parse(text: &str, version: EpubVersion) -> Self {
        let prepared = prepare_xhtml(text);

        let opts = ParseOpts {
            tree_builder: TreeBuilderOpts {
                drop_doctype: false,
                // Keep <noscript> content as markup instead of raw text.
                scripting_enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };

        let sink = parse_document(ArenaSink::new(), opts)
            .from_utf8()
            .one(prepared.as_bytes());
        let parse_errors = sink.error_count();

        Self {
            dom: sink.into_dom(),
            version,
            parse_errors,
        }
    }

    /// The dialect this document was parsed with.
    pub fn version(&self) -> EpubVersion {
        self.version
    }

    /// Number of recoverable parse errors found in the source.
    pub fn parse_errors(&self) -> usize {
        self.parse_errors
    }

    pub fn dom(&self) -> &ArenaDom {
        &self.dom
    }

    /// All elements whose local name is in `tags`, in document order.
    pub fn nodes_with_tags(&self, tags: &[&str]) -> Vec<NodeId> {
        self.dom
            .descendants(self.dom.document())
            .filter(|&id| {
                self.dom
                    .element_name(id)
                    .is_some_and(|name| tags.contains(&name.as_ref()))
            })
            .collect()
    }

    /// All elements with the given local name, in document order.
    pub fn nodes_with_tag(&self, tag: &str) -> Vec<NodeId> {
        self.nodes_with_tags(&[tag])
    }

    /// Every distinct element name in the document, in first-seen order.
    pub fn tag_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for id in self.dom.descendants(self.dom.document()) {
            if let Some(name) = self.dom.element_name(id)
                && !names.contains(&name.as_ref())
            {
                names.push(name.as_ref());
            }
        }
        names
    }

    /// The `html` element, when there is exactly one.
    pub fn root_element(&self) -> Option<NodeId> {
        match self.nodes_with_tag("html").as_slice() {
            [root] => Some(*root),
            _ => None,
        }
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.dom.element_name(node).map(|n| n.as_ref())
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.dom.get_attr(node, name)
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        self.dom.set_attr(node, name, value);
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) -> bool {
        self.dom.remove_attr(node, name)
    }

    /// Serialize the (possibly edited) tree as an XHTML document.
    pub fn to_xhtml(&self) -> String {
        serialize::serialize_document(&self.dom, self.version)
    }
}

/// Undo the XML-only syntax the HTML5 tree builder would misread.
///
/// The XML declaration would become a bogus comment, and `<title/>` or
/// `<script src="a.js"/>` would swallow the rest of the document. Trailing
/// whitespace is dropped since the tree builder moves it into `<body>`.
/// Comments, CDATA and the content of script-like elements are left as is.
fn prepare_xhtml(text: &str) -> String {
    let text = XML_DECLARATION_RE.replace(text.trim_end(), "");
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for range in verbatim_ranges(&text) {
        out.push_str(&expand_self_closing(&text[last..range.start]));
        out.push_str(&text[range.clone()]);
        last = range.end;
    }
    out.push_str(&expand_self_closing(&text[last..]));
    out
}

fn expand_self_closing(markup: &str) -> String {
    SELF_CLOSING_RE
        .replace_all(markup, |caps: &Captures| {
            let tag = &caps[1];
            let attrs = caps.get(2).map_or("", |m| m.as_str());
            if is_void_element(tag) {
                format!("<{tag}{attrs}/>")
            } else {
                format!("<{tag}{attrs}></{tag}>")
            }
        })
        .into_owned()
}

/// Byte ranges of `text` that are not markup.
///
/// A self-closed `<script/>` or `<title/>` has no content and yields nothing.
fn verbatim_ranges(text: &str) -> Vec<Range<usize>> {
    let lower = text.to_ascii_lowercase();
    let mut ranges = Vec::new();
    let mut pos = 0;

    while let Some(caps) = VERBATIM_START_RE.captures_at(text, pos) {
        let Some(opening) = caps.get(0) else {
            break;
        };

        let Some(tag) = caps.get(1) else {
            let terminator = if opening.as_str() == "<!--" { "-->" } else { "]]>" };
            let end = text[opening.end()..]
                .find(terminator)
                .map_or(text.len(), |i| opening.end() + i + terminator.len());
            ranges.push(opening.start()..end);
            pos = end;
            continue;
        };

        let Some(tag_end) = text[tag.end()..].find('>').map(|i| tag.end() + i) else {
            break;
        };
        if text[..tag_end].ends_with('/') {
            pos = tag_end + 1;
            continue;
        }

        let content_start = tag_end + 1;
        let close = format!("</{}", tag.as_str().to_ascii_lowercase());
        let content_end = lower[content_start..]
            .find(&close)
            .map_or(text.len(), |i| content_start + i);
        ranges.push(content_start..content_end);
        pos = content_end;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAPTER: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" xml:lang="en">
<head>
<title>Chapter 1</title>
<link href="../Styles/style.css" rel="stylesheet" type="text/css"/>
</head>
<body>
<div id="start"/>
<p>First <img src="../Images/a.png" alt=""/> paragraph.</p>
<audio src="../Audio/a.mp3"/>
</body>
</html>"#;

    #[test]
    fn test_parse_strips_declaration() {
        let doc = Document::parse(CHAPTER, EpubVersion::V3);
        let has_comment = doc
            .dom()
            .descendants(doc.dom().document())
            .any(|id| matches!(doc.dom().get(id).map(|n| &n.data), Some(NodeData::Comment(_))));
        assert!(!has_comment);
    }

    #[test]
    fn test_self_closing_div_does_not_swallow_content() {
        let doc = Document::parse(CHAPTER, EpubVersion::V3);
        let div = doc.nodes_with_tag("div")[0];
        assert_eq!(doc.dom().children(div).count(), 0);

        let p = doc.nodes_with_tag("p")[0];
        let body = doc.nodes_with_tag("body")[0];
        assert_eq!(doc.dom().get(p).map(|n| n.parent), Some(body));
    }

    #[test]
    fn test_nodes_with_tags_in_document_order() {
        let doc = Document::parse(CHAPTER, EpubVersion::V3);
        let found = doc.nodes_with_tags(&["audio", "img", "link"]);
        let names: Vec<_> = found.iter().filter_map(|&id| doc.tag_name(id)).collect();
        assert_eq!(names, vec!["link", "img", "audio"]);
    }

    #[test]
    fn test_attribute_editing_round_trip() {
        let mut doc = Document::parse(CHAPTER, EpubVersion::V3);
        let root = doc.root_element().expect("single html element");
        assert_eq!(doc.attr(root, "xml:lang"), Some("en"));

        doc.set_attr(root, "xml:lang", "fr");
        doc.set_attr(root, "lang", "fr");
        let out = doc.to_xhtml();

        let reparsed = Document::parse(&out, EpubVersion::V3);
        let root = reparsed.root_element().expect("single html element");
        assert_eq!(reparsed.attr(root, "xml:lang"), Some("fr"));
        assert_eq!(reparsed.attr(root, "lang"), Some("fr"));
        assert_eq!(reparsed.attr(root, "xmlns:epub"), Some("http://www.idpf.org/2007/ops"));
    }

    #[test]
    fn test_script_and_comment_text_untouched() {
        let source = r#"<html><head><script>var t = "<span/>";</script><!-- <br/><div/> --></head><body><script src="a.js"/><p>after</p></body></html>"#;
        let doc = Document::parse(source, EpubVersion::V3);
        let out = doc.to_xhtml();
        assert!(out.contains(r#"<script>var t = "<span/>";</script>"#));
        assert!(out.contains("<!-- <br/><div/> -->"));
        assert!(out.contains(r#"<script src="a.js"></script><p>after</p>"#));
    }

    #[test]
    fn test_noscript_markup_survives_reserialization() {
        let source = "<html><body><noscript><p>No JS &amp; more</p></noscript></body></html>";
        let once = Document::parse(source, EpubVersion::V3).to_xhtml();
        assert!(once.contains("<noscript><p>No JS &amp; more</p></noscript>"));

        let twice = Document::parse(&once, EpubVersion::V3).to_xhtml();
        assert_eq!(twice, once);
    }

    #[test]
    fn test_foreign_content_reserializes_well_formed() {
        let source = r#"<html xmlns="http://www.w3.org/1999/xhtml"><body><svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 1 1"><rect width="1" height="1"/></svg><math xmlns="http://www.w3.org/1998/Math/MathML"><mi>x</mi></math></body></html>"#;
        let once = Document::parse(source, EpubVersion::V3).to_xhtml();
        assert_eq!(crate::transform::xhtml::well_formed_error(&once), None);

        let twice = Document::parse(&once, EpubVersion::V3).to_xhtml();
        assert_eq!(twice, once);
    }

    #[test]
    fn test_garbage_still_parses() {
        let doc = Document::parse("<<<>>> not <b>markup", EpubVersion::V2);
        assert!(doc.root_element().is_some());
        assert!(doc.nodes_with_tag("img").is_empty());
        assert!(doc.to_xhtml().contains("<body>"));
    }

    #[test]
    fn test_tag_names_distinct() {
        let doc = Document::parse("<p>a</p><p>b</p><svg></svg>", EpubVersion::V3);
        let names = doc.tag_names();
        assert_eq!(names.iter().filter(|n| **n == "p").count(), 1);
        assert!(names.contains(&"svg"));
    }
}
