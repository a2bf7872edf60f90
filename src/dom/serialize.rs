//! XHTML serialization of an [`ArenaDom`].

use html5ever::{Namespace, ns};

use super::arena::{ArenaDom, NodeData, NodeId};
use crate::book::EpubVersion;

/// XML declaration written at the top of every serialized document.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8" standalone="no"?>"#;

const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";
const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";
const MATHML_NAMESPACE: &str = "http://www.w3.org/1998/Math/MathML";

/// HTML elements that never have content and are written self-closed.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "bgsound", "br", "col", "embed", "frame", "hr", "img", "input",
    "keygen", "link", "meta", "param", "source", "track", "wbr",
];

/// Elements the tree builder reads as raw text, so their content is written
/// back without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "iframe", "noembed", "noframes", "xmp"];

const LEADING_NEWLINE_ELEMENTS: &[&str] = &["pre", "textarea", "listing"];

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}

/// The DOCTYPE used when the source document did not carry one.
pub fn default_doctype(version: EpubVersion) -> &'static str {
    match version {
        EpubVersion::V2 => {
            r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">"#
        }
        EpubVersion::V3 => "<!DOCTYPE html>",
    }
}

/// Serialize a whole document as XHTML.
pub fn serialize_document(dom: &ArenaDom, version: EpubVersion) -> String {
    let mut out = String::with_capacity(dom.len() * 16);
    out.push_str(XML_DECLARATION);
    out.push('\n');

    let doc = dom.document();
    let has_doctype = dom
        .children(doc)
        .any(|c| dom.get(c).is_some_and(|n| matches!(n.data, NodeData::Doctype { .. })));
    if !has_doctype {
        out.push_str(default_doctype(version));
        out.push('\n');
    }

    for child in dom.children(doc) {
        write_node(dom, child, &mut out, None);
        if !dom.is_element(child) {
            out.push('\n');
        }
    }

    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Serialize a node and its subtree.
pub fn serialize_node(dom: &ArenaDom, id: NodeId) -> String {
    let mut out = String::new();
    write_node(dom, id, &mut out, None);
    out
}

fn write_node(dom: &ArenaDom, id: NodeId, out: &mut String, parent_ns: Option<&Namespace>) {
    let Some(node) = dom.get(id) else {
        return;
    };

    match &node.data {
        NodeData::Document => {
            for child in dom.children(id) {
                write_node(dom, child, out, None);
            }
        }
        NodeData::Doctype {
            name,
            public_id,
            system_id,
        } => {
            out.push_str("<!DOCTYPE ");
            out.push_str(if name.is_empty() { "html" } else { name });
            if !public_id.is_empty() {
                out.push_str(" PUBLIC \"");
                out.push_str(public_id);
                out.push('"');
                if !system_id.is_empty() {
                    out.push_str(" \"");
                    out.push_str(system_id);
                    out.push('"');
                }
            } else if !system_id.is_empty() {
                out.push_str(" SYSTEM \"");
                out.push_str(system_id);
                out.push('"');
            }
            out.push('>');
        }
        NodeData::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeData::Text(text) => {
            let raw = dom.get(node.parent).is_some_and(|p| match &p.data {
                NodeData::Element { name, .. } => {
                    name.ns == ns!(html) && RAW_TEXT_ELEMENTS.contains(&&*name.local)
                }
                _ => false,
            });
            if raw {
                out.push_str(text);
            } else {
                escape_text(text, out);
            }
        }
        NodeData::Element { name, attrs } => {
            let tag = element_tag(&name.prefix, &name.local);
            out.push('<');
            out.push_str(&tag);

            // Namespace declarations that XML parsers need but the HTML tree
            // builder does not keep track of.
            if let Some(uri) = missing_namespace_declaration(&name.ns, parent_ns)
                && !attrs.iter().any(|a| a.matches("xmlns"))
            {
                out.push_str(" xmlns=\"");
                out.push_str(uri);
                out.push('"');
            }

            for attr in attrs {
                out.push(' ');
                out.push_str(&attr.qualified_name());
                out.push_str("=\"");
                escape_attr(&attr.value, out);
                out.push('"');
            }

            let has_children = node.first_child.is_some();
            let self_closing = if name.ns == ns!(html) {
                is_void_element(&name.local)
            } else {
                !has_children
            };

            if self_closing {
                out.push_str("/>");
                return;
            }

            out.push('>');
            // The parser drops one newline right after these start tags.
            if name.ns == ns!(html)
                && LEADING_NEWLINE_ELEMENTS.contains(&&*name.local)
                && dom
                    .get(node.first_child)
                    .is_some_and(|c| matches!(&c.data, NodeData::Text(t) if t.starts_with('\n')))
            {
                out.push('\n');
            }
            for child in dom.children(id) {
                write_node(dom, child, out, Some(&name.ns));
            }
            out.push_str("</");
            out.push_str(&tag);
            out.push('>');
        }
    }
}

fn element_tag(prefix: &Option<html5ever::Prefix>, local: &html5ever::LocalName) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
        _ => local.to_string(),
    }
}

fn missing_namespace_declaration(
    ns: &Namespace,
    parent_ns: Option<&Namespace>,
) -> Option<&'static str> {
    if parent_ns == Some(ns) {
        return None;
    }
    if *ns == ns!(html) {
        // Only the root needs the declaration; html children of foreign
        // content (foreignObject) inherit nothing useful either way.
        return parent_ns.is_none().then_some(XHTML_NAMESPACE);
    }
    if *ns == ns!(svg) {
        return Some(SVG_NAMESPACE);
    }
    if *ns == ns!(mathml) {
        return Some(MATHML_NAMESPACE);
    }
    None
}

/// Escape character data.
pub fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&#160;"),
            _ => out.push(c),
        }
    }
}

/// Escape an attribute value for a double-quoted attribute.
pub fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&#160;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use html5ever::driver::ParseOpts;
    use html5ever::parse_document;
    use html5ever::tendril::TendrilSink;

    use super::*;
    use crate::dom::tree_sink::ArenaSink;

    fn parse(html: &str) -> ArenaDom {
        parse_document(ArenaSink::new(), ParseOpts::default())
            .from_utf8()
            .one(html.as_bytes())
            .into_dom()
    }

    #[test]
    fn test_void_elements_self_close() {
        let dom = parse("<html><body><p>a<br>b</p><img src=\"x.png\" alt=\"\"></body></html>");
        let out = serialize_document(&dom, EpubVersion::V3);
        assert!(out.contains("a<br/>b"));
        assert!(out.contains("<img src=\"x.png\" alt=\"\"/>"));
    }

    #[test]
    fn test_declaration_and_default_doctype() {
        let dom = parse("<html><head><title>t</title></head><body></body></html>");

        let v3 = serialize_document(&dom, EpubVersion::V3);
        assert!(v3.starts_with(XML_DECLARATION));
        assert!(v3.contains("<!DOCTYPE html>\n<html xmlns=\"http://www.w3.org/1999/xhtml\">"));

        let v2 = serialize_document(&dom, EpubVersion::V2);
        assert!(v2.contains("XHTML 1.1"));
    }

    #[test]
    fn test_existing_doctype_kept() {
        let dom = parse(
            r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd"><html xmlns="http://www.w3.org/1999/xhtml"><body></body></html>"#,
        );
        let out = serialize_document(&dom, EpubVersion::V3);
        assert_eq!(out.matches("<!DOCTYPE").count(), 1);
        assert!(out.contains("-//W3C//DTD XHTML 1.1//EN"));
        assert_eq!(out.matches("xmlns=").count(), 1);
    }

    #[test]
    fn test_escaping_and_raw_text() {
        let dom = parse(
            r#"<html><head><style>p > a { color: red }</style></head><body><p title="a &quot;b&quot; &amp; c">1 &lt; 2 &amp; 3</p></body></html>"#,
        );
        let out = serialize_document(&dom, EpubVersion::V3);
        assert!(out.contains("<style>p > a { color: red }</style>"));
        assert!(out.contains(r#"title="a &quot;b&quot; &amp; c""#));
        assert!(out.contains("1 &lt; 2 &amp; 3"));
    }

    #[test]
    fn test_foreign_xmlns_written_once() {
        let dom = parse(
            r#"<html><body><svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 1 1"><circle r="1"/></svg><math xmlns="http://www.w3.org/1998/Math/MathML"><mi>x</mi></math></body></html>"#,
        );
        let out = serialize_document(&dom, EpubVersion::V3);
        assert!(out.contains(r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 1 1">"#));
        assert!(out.contains(r#"<math xmlns="http://www.w3.org/1998/Math/MathML">"#));
        assert!(!out.contains(" :xmlns"));
        assert_eq!(out.matches("xmlns=").count(), 3);
    }

    #[test]
    fn test_raw_text_elements_not_escaped() {
        let dom = parse(
            r#"<html><body><iframe>a &amp; <b>b</b></iframe><xmp>1 < 2</xmp></body></html>"#,
        );
        let out = serialize_document(&dom, EpubVersion::V3);
        assert!(out.contains("<iframe>a &amp; <b>b</b></iframe>"));
        assert!(out.contains("<xmp>1 < 2</xmp>"));
    }

    #[test]
    fn test_inline_svg_gets_namespace() {
        let dom = parse(
            r#"<html><body><svg viewBox="0 0 10 10"><rect width="10" height="10"></rect></svg></body></html>"#,
        );
        let out = serialize_document(&dom, EpubVersion::V3);
        assert!(out.contains(r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"><rect width="10" height="10"/></svg>"#));
    }
}
