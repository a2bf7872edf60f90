//! Book path resolution for references found in markup.
//!
//! Book paths are `/`-separated locations relative to the package root, e.g.
//! `OEBPS/Text/chapter1.xhtml`.

use percent_encoding::percent_decode_str;

/// True when a reference carries a scheme separator (`http:`, `mailto:`, `data:`...).
///
/// Such references point outside the book and are never resolved.
pub fn has_scheme(href: &str) -> bool {
    href.contains(':')
}

/// Split a relative reference into its percent-decoded path and fragment.
///
/// The query part, if any, is dropped.
pub fn parse_relative_href(href: &str) -> (String, Option<String>) {
    let (rest, fragment) = match href.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment.to_string())),
        None => (href, None),
    };
    let path = rest.split_once('?').map_or(rest, |(path, _)| path);
    let path = percent_decode_str(path).decode_utf8_lossy().into_owned();
    (path, fragment)
}

/// Resolve `relative` against the folder `start_folder` into a normalized book path.
///
/// A leading `/` means the package root. `..` never climbs above the root.
pub fn build_book_path(relative: &str, start_folder: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();

    if !relative.starts_with('/') {
        stack.extend(start_folder.split('/').filter(|s| !s.is_empty() && *s != "."));
    }

    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            s => stack.push(s),
        }
    }

    stack.join("/")
}

/// Folder part of a book path (`OEBPS/Text/a.xhtml` → `OEBPS/Text`).
pub fn folder_of(book_path: &str) -> &str {
    book_path.rsplit_once('/').map_or("", |(folder, _)| folder)
}

/// Resolve an attribute value from a document in `folder` into a book path.
///
/// Returns `None` for external references and references with an empty path
/// (such as a bare `#fragment`).
pub fn resolve_href(href: &str, folder: &str) -> Option<String> {
    let href = href.trim();
    if has_scheme(href) {
        return None;
    }
    let (path, _) = parse_relative_href(href);
    if path.is_empty() {
        return None;
    }
    let book_path = build_book_path(&path, folder);
    (!book_path.is_empty()).then_some(book_path)
}
