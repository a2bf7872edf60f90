//! Text decoding, position and file type helpers.

use std::borrow::Cow;

use crate::resource::ResourceType;

/// Decode bytes to a string, handling various encodings.
///
/// This function:
/// 1. First tries UTF-8 (handles BOM automatically via encoding_rs)
/// 2. If malformed, tries the hint encoding (from `<?xml encoding="..."?>`)
/// 3. Falls back to Windows-1252 (common in old ebooks)
///
/// Uses `Cow<str>` to avoid allocation when the input is valid UTF-8.
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Extract encoding from XML declaration.
///
/// Parses `<?xml ... encoding="..." ?>` in the first 100 bytes.
pub fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let check_len = bytes.len().min(100);
    let prefix = &bytes[..check_len];

    let xml_start = prefix.windows(5).position(|w| w == b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let after_enc = &after_xml[enc_pos + 9..];

    let quote = *after_enc.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let value_end = after_enc[1..].iter().position(|&b| b == quote)? + 1;
    std::str::from_utf8(&after_enc[1..value_end]).ok()
}

/// 1-based line number of a byte offset.
pub fn line_number(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    memchr::memchr_iter(b'\n', &text.as_bytes()[..end]).count() + 1
}

/// 1-based line and column of a byte offset. Columns count characters.
pub fn line_and_column(text: &str, offset: usize) -> (usize, usize) {
    let end = floor_char_boundary(text, offset);
    let line_start = memchr::memrchr(b'\n', &text.as_bytes()[..end]).map_or(0, |i| i + 1);
    (line_number(text, end), text[line_start..end].chars().count() + 1)
}

fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut end = offset.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Classify a book path by its extension.
pub fn detect_resource_type(path: &str) -> ResourceType {
    let path_lower = path.to_lowercase();
    let ext = path_lower.rsplit_once('.').map_or("", |(_, ext)| ext);

    match ext {
        "xhtml" | "html" | "htm" => ResourceType::Html,
        "css" => ResourceType::Css,
        "js" => ResourceType::Script,
        "jpg" | "jpeg" | "png" | "gif" | "svg" | "webp" => ResourceType::Image,
        "mp3" | "m4a" | "ogg" | "oga" | "wav" | "aac" => ResourceType::Audio,
        "mp4" | "m4v" | "webm" | "ogv" => ResourceType::Video,
        "ttf" | "otf" | "woff" | "woff2" => ResourceType::Font,
        "ncx" => ResourceType::Ncx,
        "opf" => ResourceType::Opf,
        _ => ResourceType::Generic,
    }
}
