//! Style rule scanning and removal using cssparser
//!
//! Provides utilities for:
//! - Listing the rules of the `<style>` blocks embedded in a document
//! - Removing rules by selector text and line

use std::ops::Range;
use std::sync::LazyLock;

use cssparser::{ParseError, Parser, ParserInput, Token};
use regex_lite::Regex;

use crate::util::line_number;

type CssParseError<'i> = ParseError<'i, ()>;

static STYLE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<style(?:\s[^>]*)?>(.*?)</style\s*>").expect("valid regex")
});

/// At-rules whose blocks contain style rules.
const GROUPING_AT_RULES: &[&str] = &["media", "supports", "document", "-moz-document"];

/// A style rule identified by its selector group and position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CssSelector {
    /// Selector text as written, trimmed (e.g. `h1, h2.title`).
    pub group_text: String,
    /// 1-based line of the selector in the document.
    pub line: usize,
}

impl CssSelector {
    pub fn new(group_text: impl Into<String>, line: usize) -> Self {
        Self {
            group_text: group_text.into(),
            line,
        }
    }
}

#[derive(Debug)]
struct StyleRule {
    selector: CssSelector,
    /// Byte range of the whole rule (selector through closing brace) in the document.
    span: Range<usize>,
}

/// Every style rule inside the document's `<style>` elements, in source order.
pub fn inline_style_selectors(html: &str) -> Vec<CssSelector> {
    scan_style_rules(html)
        .into_iter()
        .map(|rule| rule.selector)
        .collect()
}

/// Remove whole rules matching `selectors` by trimmed text and line.
///
/// Returns the new document text, or `None` when nothing matched.
pub fn remove_matching_selectors(html: &str, selectors: &[CssSelector]) -> Option<String> {
    if selectors.is_empty() {
        return None;
    }

    let doomed: Vec<Range<usize>> = scan_style_rules(html)
        .into_iter()
        .filter(|rule| selectors.contains(&rule.selector))
        .map(|rule| extend_over_line_end(html, rule.span))
        .collect();

    if doomed.is_empty() {
        return None;
    }

    let mut result = html.to_string();
    for span in doomed.into_iter().rev() {
        result.replace_range(span, "");
    }
    Some(result)
}

/// Swallow trailing blanks and one line break after a removed rule.
fn extend_over_line_end(html: &str, span: Range<usize>) -> Range<usize> {
    let bytes = html.as_bytes();
    let mut end = span.end;
    while end < bytes.len() && matches!(bytes[end], b' ' | b'\t') {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'\n' {
        end += 1;
    }
    span.start..end
}

fn scan_style_rules(html: &str) -> Vec<StyleRule> {
    let mut rules = Vec::new();

    for caps in STYLE_BLOCK_RE.captures_iter(html) {
        let Some(content) = caps.get(1) else {
            continue;
        };
        let css = content.as_str();
        let base = content.start();

        let mut found = Vec::new();
        let mut input = ParserInput::new(css);
        let mut parser = Parser::new(&mut input);
        collect_rules(&mut parser, css, &mut found);

        for span in found {
            let prelude = &css[span.prelude.clone()];
            let leading = prelude.len() - prelude.trim_start().len();
            let line = line_number(html, base + span.prelude.start + leading);
            rules.push(StyleRule {
                selector: CssSelector {
                    group_text: prelude.trim().to_string(),
                    line,
                },
                span: base + span.rule.start..base + span.rule.end,
            });
        }
    }

    rules
}

struct RuleSpan {
    prelude: Range<usize>,
    rule: Range<usize>,
}

fn collect_rules(parser: &mut Parser, css: &str, found: &mut Vec<RuleSpan>) {
    loop {
        let start = parser.position().byte_index();
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };

        match token {
            Token::WhiteSpace(_) | Token::Comment(_) | Token::CDO | Token::CDC | Token::Semicolon => {}
            Token::AtKeyword(name) => {
                let name = name.to_ascii_lowercase();
                if GROUPING_AT_RULES.contains(&name.as_str()) {
                    if skip_to_block(parser).is_some() {
                        let _ = parser.parse_nested_block(|p| {
                            collect_rules(p, css, found);
                            Ok::<_, CssParseError>(())
                        });
                    }
                } else if skip_to_block(parser).is_some() {
                    consume_block(parser);
                }
            }
            Token::CurlyBracketBlock => {
                // A block with no selector is not a rule.
                consume_block(parser);
            }
            _ => {
                let Some(prelude_end) = skip_to_block(parser) else {
                    break;
                };
                consume_block(parser);
                let end = parser.position().byte_index().min(css.len());
                found.push(RuleSpan {
                    prelude: start..prelude_end,
                    rule: start..end,
                });
            }
        }
    }
}

/// Advance to the next `{`, returning the offset where it starts.
///
/// Returns `None` at a `;` or end of input.
fn skip_to_block(parser: &mut Parser) -> Option<usize> {
    loop {
        let before = parser.position().byte_index();
        match parser.next_including_whitespace_and_comments() {
            Ok(Token::CurlyBracketBlock) => return Some(before),
            Ok(Token::Semicolon) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

fn consume_block(parser: &mut Parser) {
    let _ = parser.parse_nested_block(|p| {
        while p.next_including_whitespace_and_comments().is_ok() {}
        Ok::<_, CssParseError>(())
    });
}
