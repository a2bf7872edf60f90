//! # folio
//!
//! The content-document layer of an EPUB editor: XHTML resources that keep
//! their links to stylesheets, images and media in sync as their text changes.
//!
//! ## Features
//!
//! - Parse, query and edit XHTML with error recovery, and write it back out
//! - Track outbound links and relay updates of linked resources
//! - Derive manifest properties (`svg`, `scripted`, `mathml`, ...)
//! - Set the document language, including right-to-left direction
//! - Split documents at section markers and remove embedded style rules
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use folio::{Book, EpubVersion, ListenerId, Resource, ResourceEvent};
//!
//! let book = Book::new("/tmp/unpacked", EpubVersion::V3);
//! let css = book.add_file("OEBPS/Styles/main.css");
//! let chapter = book.add_html("OEBPS/Text/ch1.xhtml");
//!
//! chapter.set_text(r#"<html xmlns="http://www.w3.org/1999/xhtml">
//! <head><link rel="stylesheet" href="../Styles/main.css"/></head>
//! <body><p>Hello</p></body></html>"#);
//! assert_eq!(chapter.linked_resources(), vec!["OEBPS/Styles/main.css"]);
//!
//! chapter.set_language_attribute("he");
//! assert_eq!(chapter.language_attribute(), "he");
//! assert!(chapter.text().contains(r#"dir="rtl""#));
//!
//! // Rewriting the stylesheet is relayed to the chapter.
//! let updates = Arc::new(AtomicUsize::new(0));
//! let counter = updates.clone();
//! chapter.events().connect(ListenerId::next(), move |_, event| {
//!     if event == ResourceEvent::LinkedResourceUpdated {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     }
//! });
//! css.notify_updated_on_disk();
//! assert_eq!(updates.load(Ordering::SeqCst), 1);
//! ```

pub mod book;
pub mod dom;
pub mod error;
pub mod preview_cache;
pub mod resource;
pub mod transform;
pub(crate) mod util;

pub use book::{Book, BookResource, EpubVersion};
pub use error::{Error, Result};
pub use preview_cache::{PreviewCache, PreviewCacheConfig};
pub use resource::{
    EventHub, FileResource, FsTextIo, HtmlResource, ListenerId, Resource, ResourceEvent,
    ResourceRegistry, ResourceType, TextFileIo,
};
pub use transform::css::CssSelector;
pub use transform::xhtml::{SECTION_MARKER, WellFormedError};
