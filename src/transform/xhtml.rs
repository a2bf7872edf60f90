//! XHTML utilities over raw document text.
//!
//! Provides utilities for:
//! - Extracting linked stylesheets and scripts
//! - Splitting a document at section markers
//! - Mending arbitrary markup into a well-formed XHTML document
//! - Checking XML well-formedness

use std::fmt;
use std::sync::LazyLock;

use quick_xml::Reader;
use quick_xml::events::Event;
use regex_lite::Regex;

use crate::book::EpubVersion;
use crate::dom::Document;
use crate::util::line_and_column;

/// Marker element a user inserts to request a split at that position.
pub const SECTION_MARKER: &str = r#"<hr class="section_split_marker"/>"#;

/// Closing markup appended to every split fragment.
const FRAGMENT_TAIL: &str = "</body>\n</html>\n";

static BODY_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<body(?:\s[^>]*)?>").expect("valid regex"));

static BODY_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</body\s*>").expect("valid regex"));

static SECTION_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<hr\s[^>]*class\s*=\s*["']section_split_marker["'][^>]*>(?:\s*</hr\s*>)?"#)
        .expect("valid regex")
});

/// `href` of every `<link>` whose `rel` contains the `stylesheet` token, in document order.
///
/// This includes `rel="alternate stylesheet"`. Link tracking through
/// [`crate::resource::linked_resource_paths`] applies the same rule.
pub fn linked_stylesheet_hrefs(text: &str) -> Vec<String> {
    let doc = Document::parse(text, EpubVersion::V3);
    doc.nodes_with_tag("link")
        .into_iter()
        .filter(|&link| {
            doc.attr(link, "rel").is_some_and(is_stylesheet_rel)
        })
        .filter_map(|link| doc.attr(link, "href").map(str::to_string))
        .collect()
}

/// Whether a `rel` value holds the `stylesheet` token.
pub fn is_stylesheet_rel(rel: &str) -> bool {
    rel.split_ascii_whitespace()
        .any(|token| token.eq_ignore_ascii_case("stylesheet"))
}

/// `src` of every `<script>` that has one, in document order.
pub fn linked_script_srcs(text: &str) -> Vec<String> {
    let doc = Document::parse(text, EpubVersion::V3);
    doc.nodes_with_tag("script")
        .into_iter()
        .filter_map(|script| doc.attr(script, "src").map(str::to_string))
        .collect()
}

/// Split a document at every section marker.
///
/// Each fragment keeps the source header (everything up to and including the
/// `<body>` start tag) and is closed with `</body></html>`. Fragments are not
/// mended; see [`clean_and_mend`]. A document without a marker, or without a
/// body, comes back as a single fragment holding the original text.
pub fn split_on_section_markers(text: &str) -> Vec<String> {
    let Some(body_start) = BODY_START_RE.find(text) else {
        return vec![text.to_string()];
    };
    let header = &text[..body_start.end()];
    let body_end = BODY_END_RE
        .find_iter(&text[body_start.end()..])
        .last()
        .map_or(text.len(), |m| body_start.end() + m.start());
    let body = &text[body_start.end()..body_end];

    if !SECTION_MARKER_RE.is_match(body) {
        return vec![text.to_string()];
    }

    SECTION_MARKER_RE
        .split(body)
        .map(|slice| {
            let mut fragment = String::with_capacity(header.len() + slice.len() + FRAGMENT_TAIL.len());
            fragment.push_str(header);
            fragment.push_str(slice);
            fragment.push_str(FRAGMENT_TAIL);
            fragment
        })
        .collect()
}

/// Parse with error recovery and re-serialize as a standalone XHTML document.
pub fn clean_and_mend(text: &str, version: EpubVersion) -> String {
    Document::parse(text, version).to_xhtml()
}

/// First XML well-formedness violation in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WellFormedError {
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
    pub message: String,
}

impl fmt::Display for WellFormedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for WellFormedError {}

const PREDEFINED_ENTITIES: &[&[u8]] = &[b"lt", b"gt", b"amp", b"apos", b"quot"];

/// Check that `text` is a well-formed XML document. Returns the first error, if any.
pub fn well_formed_error(text: &str) -> Option<WellFormedError> {
    let mut reader = Reader::from_str(text);
    let mut open: Vec<(String, usize)> = Vec::new();
    let mut roots = 0usize;

    let at = |offset: usize, message: String| {
        let (line, column) = line_and_column(text, offset);
        Some(WellFormedError { line, column, message })
    };

    loop {
        let event_start = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if open.is_empty() {
                    roots += 1;
                }
                for attr in e.attributes() {
                    if let Err(err) = attr {
                        return at(event_start, err.to_string());
                    }
                }
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                open.push((name, event_start));
            }
            Ok(Event::Empty(e)) => {
                if open.is_empty() {
                    roots += 1;
                }
                for attr in e.attributes() {
                    if let Err(err) = attr {
                        return at(event_start, err.to_string());
                    }
                }
            }
            Ok(Event::End(_)) => {
                open.pop();
            }
            Ok(Event::Text(e)) if open.is_empty() => {
                if !e.as_ref().iter().all(u8::is_ascii_whitespace) {
                    return at(event_start, "text outside the root element".to_string());
                }
            }
            Ok(Event::GeneralRef(e)) => {
                let name = e.as_ref();
                if !name.starts_with(b"#") && !PREDEFINED_ENTITIES.contains(&name) {
                    return at(
                        event_start,
                        format!("undefined entity &{};", String::from_utf8_lossy(name)),
                    );
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return at(reader.error_position() as usize, err.to_string()),
            Ok(_) => {}
        }
        if roots > 1 {
            return at(event_start, "more than one root element".to_string());
        }
    }

    if let Some((name, offset)) = open.last() {
        return at(*offset, format!("element <{name}> is never closed"));
    }
    if roots == 0 {
        return at(text.len(), "no root element".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_MARKERS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>T</title></head>
<body class="main">
<p>one</p>
<hr class="section_split_marker"/>
<p>two</p>
<hr class="section_split_marker" />
<p>three</p>
</body>
</html>
"#;

    #[test]
    fn test_linked_stylesheets_and_scripts() {
        let html = r#"<html><head>
<link rel="stylesheet" href="../Styles/a.css"/>
<link rel="alternate StyleSheet" href="b.css"/>
<link rel="icon" href="icon.png"/>
<script src="../Misc/app.js"></script>
<script>var inline = 1;</script>
</head><body/></html>"#;

        assert_eq!(linked_stylesheet_hrefs(html), vec!["../Styles/a.css", "b.css"]);
        assert_eq!(linked_script_srcs(html), vec!["../Misc/app.js"]);
    }

    #[test]
    fn test_split_on_two_markers() {
        let fragments = split_on_section_markers(TWO_MARKERS);
        assert_eq!(fragments.len(), 3);

        for (fragment, word) in fragments.iter().zip(["one", "two", "three"]) {
            assert!(fragment.contains(r#"<body class="main">"#));
            assert!(fragment.contains(word));
            assert!(fragment.ends_with("</body>\n</html>\n"));
            assert!(!fragment.contains("section_split_marker"));
        }
        assert!(!fragments[0].contains("two"));
    }

    #[test]
    fn test_split_without_marker_is_identity() {
        let html = "<html><body><p>x</p></body></html>";
        assert_eq!(split_on_section_markers(html), vec![html.to_string()]);
        assert_eq!(split_on_section_markers("no markup"), vec!["no markup".to_string()]);
    }

    #[test]
    fn test_clean_and_mend_produces_well_formed_output() {
        let mended = clean_and_mend("<p>unclosed <b>bold<br>", EpubVersion::V2);
        assert!(mended.starts_with(crate::dom::XML_DECLARATION));
        assert_eq!(well_formed_error(&mended), None);
    }

    #[test]
    fn test_well_formed_error_positions() {
        assert_eq!(well_formed_error(TWO_MARKERS), None);

        let err = well_formed_error("<html>\n<body>\n<p>text</body></html>").unwrap();
        assert_eq!(err.line, 3);

        let err = well_formed_error("<html><body>\n<div>").unwrap();
        assert!(err.message.contains("never closed"));

        let err = well_formed_error("<html><p>&nbsp;</p></html>").unwrap();
        assert!(err.message.contains("nbsp"));

        assert!(well_formed_error("<a/><b/>").is_some());
        assert!(well_formed_error("").is_some());
    }
}
