//! Benchmarks for content document parsing and editing.
//!
//! Run with: cargo bench

use std::fmt::Write;
use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use folio::dom::Document;
use folio::{Book, EpubVersion};

/// A long chapter with links, embedded styles and section markers.
fn sample_chapter() -> String {
    let mut html = String::from(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
<title>Sample</title>
<link rel="stylesheet" type="text/css" href="../Styles/main.css"/>
<style type="text/css">
p.first { text-indent: 0; }
.note { font-size: 0.8em; }
</style>
</head>
<body>
"#,
    );
    for i in 0..500 {
        let _ = writeln!(
            html,
            r#"<p class="first">Paragraph {i} with <em>emphasis</em> &amp; an <img src="../Images/img{}.png" alt=""/>.</p>"#,
            i % 20
        );
        if i % 100 == 99 {
            html.push_str("<hr class=\"section_split_marker\"/>\n");
        }
    }
    html.push_str("</body>\n</html>\n");
    html
}

// ============================================================================
// Markup Benchmarks
// ============================================================================

fn bench_parse(c: &mut Criterion) {
    let html = sample_chapter();

    c.bench_function("parse", |b| {
        b.iter(|| Document::parse(black_box(&html), EpubVersion::V3));
    });
}

fn bench_parse_serialize(c: &mut Criterion) {
    let html = sample_chapter();

    c.bench_function("parse_serialize", |b| {
        b.iter(|| Document::parse(black_box(&html), EpubVersion::V3).to_xhtml());
    });
}

// ============================================================================
// Resource Benchmarks
// ============================================================================

fn bench_set_text_with_tracking(c: &mut Criterion) {
    let html = sample_chapter();
    let book = Book::new("/tmp/folio-bench", EpubVersion::V3);
    book.add_file("OEBPS/Styles/main.css");
    for i in 0..20 {
        book.add_file(format!("OEBPS/Images/img{i}.png"));
    }
    let chapter = book.add_html("OEBPS/Text/ch1.xhtml");

    c.bench_function("set_text_with_tracking", |b| {
        b.iter(|| chapter.set_text(black_box(html.as_str())));
    });
}

fn bench_set_language(c: &mut Criterion) {
    let html = sample_chapter();
    let book = Book::new("/tmp/folio-bench", EpubVersion::V3);
    let chapter = book.add_html("OEBPS/Text/ch1.xhtml");
    chapter.set_text(html);

    c.bench_function("set_language_attribute", |b| {
        b.iter(|| chapter.set_language_attribute(black_box("he")));
    });
}

criterion_group!(
    benches,
    // Markup
    bench_parse,
    bench_parse_serialize,
    // Resource
    bench_set_text_with_tracking,
    bench_set_language,
);
criterion_main!(benches);
