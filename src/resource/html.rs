//! HTML content documents with link tracking.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use log::{debug, trace, warn};

use super::events::{EventHub, ListenerId, ResourceEvent};
use super::io::{FsTextIo, TextFileIo};
use super::{Resource, ResourceRegistry, ResourceType};
use crate::book::EpubVersion;
use crate::dom::Document;
use crate::error::Result;
use crate::transform::css::{self, CssSelector};
use crate::transform::path::resolve_href;
use crate::transform::xhtml::{self, WellFormedError};

/// Language codes written right to left.
const RTL_LANGUAGES: &[&str] = &[
    "ar", "arc", "dv", "div", "fa", "fas", "per", "ha", "hau", "he", "heb", "khw", "ks", "kas",
    "ku", "kur", "ps", "pus", "snd", "sd", "urd", "ur", "yi", "yid",
];

/// Elements whose references count as linked resources.
const LINKING_TAGS: &[&str] = &["img", "link", "audio", "video"];

/// Elements that can pull in a resource from elsewhere.
const RESOURCE_BEARING_TAGS: &[&str] = &[
    "img", "audio", "video", "source", "track", "script", "link", "embed", "iframe", "object",
    "image",
];

const RESOURCE_ATTRS: &[&str] = &["src", "href", "data", "poster", "xlink:href"];

/// An XHTML content document in a book.
///
/// The text is the single source of truth; everything else (linked paths,
/// manifest properties, language) is derived from it on demand. Every
/// [`set_text`](Self::set_text) re-subscribes this resource to the resources
/// its new text links to, so an update to a linked stylesheet or image is
/// relayed as [`ResourceEvent::LinkedResourceUpdated`].
pub struct HtmlResource {
    book_path: String,
    full_path: PathBuf,
    version: RwLock<EpubVersion>,
    text: RwLock<String>,
    toc_cache: Mutex<Option<String>>,
    linked_book_paths: Mutex<Vec<String>>,
    modified: AtomicBool,
    events: Arc<EventHub>,
    listener: ListenerId,
    registry: Option<Weak<dyn ResourceRegistry>>,
    io: Arc<dyn TextFileIo>,
}

impl HtmlResource {
    /// Create an empty resource with no registry, backed by the filesystem.
    pub fn new(
        book_path: impl Into<String>,
        full_path: impl Into<PathBuf>,
        version: EpubVersion,
    ) -> Self {
        Self {
            book_path: book_path.into(),
            full_path: full_path.into(),
            version: RwLock::new(version),
            text: RwLock::new(String::new()),
            toc_cache: Mutex::new(None),
            linked_book_paths: Mutex::new(Vec::new()),
            modified: AtomicBool::new(false),
            events: Arc::new(EventHub::new()),
            listener: ListenerId::next(),
            registry: None,
            io: Arc::new(FsTextIo),
        }
    }

    /// Attach the registry used to resolve linked book paths.
    pub fn with_registry(mut self, registry: Weak<dyn ResourceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replace the file I/O collaborator.
    pub fn with_io(mut self, io: Arc<dyn TextFileIo>) -> Self {
        self.io = io;
        self
    }

    pub fn version(&self) -> EpubVersion {
        *self.version.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_epub_version(&self, version: EpubVersion) {
        *self.version.write().unwrap_or_else(PoisonError::into_inner) = version;
    }

    /// Id this resource subscribes to linked resources under.
    pub fn listener_id(&self) -> ListenerId {
        self.listener
    }

    /// A copy of the current text.
    pub fn text(&self) -> String {
        self.with_text(str::to_string)
    }

    /// Run `f` with the current text under the read lock.
    pub fn with_text<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        let text = self.text.read().unwrap_or_else(PoisonError::into_inner);
        f(&text)
    }

    /// Replace the text and re-track linked resources.
    ///
    /// Emits [`ResourceEvent::TextChanging`] first. When this returns, the
    /// tracked link set matches the new text and subscriptions have moved.
    pub fn set_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.events.emit(&self.book_path, ResourceEvent::TextChanging);

        let mut linked = self.lock_linked();
        let new_paths = {
            let mut current = self.text.write().unwrap_or_else(PoisonError::into_inner);
            *current = text;
            linked_resource_paths(&current, self.folder(), self.version())
        };
        self.track_new_resources(&mut linked, new_paths);
    }

    /// Reload the text from the backing file.
    ///
    /// On failure the in-memory text is left untouched.
    pub fn load_from_disk(&self) -> Result<()> {
        let text = self
            .io
            .read_text_file(&self.full_path)
            .inspect_err(|e| warn!("failed to load {}: {e}", self.book_path))?;

        self.set_text(text);
        self.events.emit(&self.book_path, ResourceEvent::LoadedFromDisk);
        Ok(())
    }

    /// Write the text to the backing file.
    ///
    /// A single-file save announces [`ResourceEvent::UpdatedOnDisk`]; a
    /// book-wide save leaves that to the caller.
    pub fn save_to_disk(&self, book_wide: bool) -> Result<()> {
        self.set_text(self.text());

        self.with_text(|text| self.io.write_text_file(&self.full_path, text))
            .inspect_err(|e| warn!("failed to save {}: {e}", self.book_path))?;
        self.modified.store(false, Ordering::Release);

        if !book_wide {
            self.events.emit(&self.book_path, ResourceEvent::UpdatedOnDisk);
        }
        Ok(())
    }

    /// True after an edit operation changed the text and before the next save.
    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    /// Snapshot used for TOC generation. Filled from the text when unset or empty.
    pub fn toc_cache(&self) -> String {
        let mut cache = self.toc_cache.lock().unwrap_or_else(PoisonError::into_inner);
        match cache.as_ref() {
            Some(cached) if !cached.is_empty() => cached.clone(),
            _ => {
                let text = self.text();
                *cache = Some(text.clone());
                text
            }
        }
    }

    pub fn set_toc_cache(&self, text: impl Into<String>) {
        *self.toc_cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(text.into());
    }

    pub fn clear_toc_cache(&self) {
        *self.toc_cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Book paths of the stylesheets this document links.
    pub fn linked_stylesheets(&self) -> Vec<String> {
        let hrefs = self.with_text(xhtml::linked_stylesheet_hrefs);
        self.resolve_all(&hrefs)
    }

    /// Book paths of the external scripts this document loads.
    pub fn linked_javascripts(&self) -> Vec<String> {
        let srcs = self.with_text(xhtml::linked_script_srcs);
        self.resolve_all(&srcs)
    }

    fn resolve_all(&self, hrefs: &[String]) -> Vec<String> {
        hrefs
            .iter()
            .filter_map(|href| resolve_href(href, self.folder()))
            .collect()
    }

    /// Manifest `properties` this document needs.
    ///
    /// Output order is fixed: `mathml`, `svg`, `scripted`, `switch`,
    /// `remote-resources`.
    pub fn manifest_properties(&self) -> Vec<&'static str> {
        let version = self.version();
        self.with_text(|text| {
            let doc = Document::parse(text, version);
            let tags = doc.tag_names();
            let mut properties = Vec::new();

            for (tag, property) in [
                ("math", "mathml"),
                ("svg", "svg"),
                ("script", "scripted"),
                ("epub:switch", "switch"),
            ] {
                if tags.contains(&tag) {
                    properties.push(property);
                }
            }

            let remote = doc.nodes_with_tags(RESOURCE_BEARING_TAGS).into_iter().any(|node| {
                RESOURCE_ATTRS
                    .iter()
                    .filter_map(|attr| doc.attr(node, attr))
                    .any(is_remote_reference)
            });
            if remote {
                properties.push("remote-resources");
            }

            properties
        })
    }

    /// Split at section markers.
    ///
    /// This resource keeps the first section, mended into a standalone
    /// document. The remaining sections are returned in order, unmended.
    pub fn split_on_section_markers(&self) -> Vec<String> {
        let mut sections = self.with_text(xhtml::split_on_section_markers).into_iter();
        let first = sections.next().unwrap_or_default();
        let rest: Vec<String> = sections.collect();

        debug!("{}: split off {} sections", self.book_path, rest.len());
        self.set_text(xhtml::clean_and_mend(&first, self.version()));
        rest
    }

    /// Book paths of every image, stylesheet, audio and video this document references.
    pub fn paths_to_linked_resources(&self) -> Vec<String> {
        let version = self.version();
        self.with_text(|text| linked_resource_paths(text, self.folder(), version))
    }

    /// The tracked outbound link set, as of the last `set_text`.
    pub fn linked_resources(&self) -> Vec<String> {
        self.lock_linked().clone()
    }

    /// `xml:lang` of the root element, else `lang`, else empty.
    pub fn language_attribute(&self) -> String {
        let version = self.version();
        self.with_text(|text| {
            let doc = Document::parse(text, version);
            let Some(root) = doc.root_element() else {
                return String::new();
            };
            doc.attr(root, "xml:lang")
                .or_else(|| doc.attr(root, "lang"))
                .unwrap_or_default()
                .to_string()
        })
    }

    /// Set the document language on the root element.
    ///
    /// An empty code removes `lang`, `xml:lang` and `dir`. Otherwise `xml:lang`
    /// is written, `lang` too on EPUB 3, and `dir="rtl"` for right-to-left
    /// languages. Nothing happens unless there is exactly one `html` element.
    pub fn set_language_attribute(&self, code: &str) {
        let version = self.version();
        let mut doc = self.with_text(|text| Document::parse(text, version));
        let Some(root) = doc.root_element() else {
            debug!("{}: no single html element, language unchanged", self.book_path);
            return;
        };

        if code.is_empty() {
            for attr in ["lang", "xml:lang", "dir"] {
                doc.remove_attr(root, attr);
            }
        } else {
            if version == EpubVersion::V3 {
                doc.set_attr(root, "lang", code);
            }
            doc.set_attr(root, "xml:lang", code);
            if is_rtl_language(code) {
                doc.set_attr(root, "dir", "rtl");
            }
        }

        self.set_text(doc.to_xhtml());
    }

    /// Remove the embedded style rules matching `selectors`.
    ///
    /// Returns whether anything was removed.
    pub fn delete_css_styles(&self, selectors: &[CssSelector]) -> bool {
        let Some(new_text) = self.with_text(|text| css::remove_matching_selectors(text, selectors))
        else {
            return false;
        };

        self.set_text(new_text);
        self.modified.store(true, Ordering::Release);
        self.events.emit(&self.book_path, ResourceEvent::Modified);
        true
    }

    pub fn well_formed_error(&self) -> Option<WellFormedError> {
        self.with_text(xhtml::well_formed_error)
    }

    pub fn is_well_formed(&self) -> bool {
        self.well_formed_error().is_none()
    }

    /// Drop every subscription on linked resources.
    ///
    /// The tracked link set is emptied until the next `set_text`.
    pub fn unlink(&self) {
        let mut linked = self.lock_linked();
        if let Some(registry) = self.registry() {
            for resource in registry.resolve_linked_resources(&linked) {
                resource.events().disconnect(self.listener);
            }
        }
        linked.clear();
    }

    fn registry(&self) -> Option<Arc<dyn ResourceRegistry>> {
        self.registry.as_ref().and_then(Weak::upgrade)
    }

    fn lock_linked(&self) -> MutexGuard<'_, Vec<String>> {
        self.linked_book_paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Move subscriptions from the old link set to `new_paths`, then store it.
    fn track_new_resources(&self, linked: &mut Vec<String>, new_paths: Vec<String>) {
        if let Some(registry) = self.registry() {
            let old = registry.resolve_linked_resources(linked);
            for resource in &old {
                resource.events().disconnect(self.listener);
            }

            let new = registry.resolve_linked_resources(&new_paths);
            for resource in &new {
                let relay = Arc::downgrade(&self.events);
                let source = self.book_path.clone();
                resource.events().connect(self.listener, move |_, event| {
                    if matches!(event, ResourceEvent::UpdatedOnDisk | ResourceEvent::Deleted)
                        && let Some(hub) = relay.upgrade()
                    {
                        hub.emit(&source, ResourceEvent::LinkedResourceUpdated);
                    }
                });
            }

            debug!(
                "{}: tracking {} linked resources (was {})",
                self.book_path,
                new.len(),
                old.len()
            );
        } else {
            trace!("{}: no registry, links not tracked", self.book_path);
        }

        *linked = new_paths;
    }
}

impl Resource for HtmlResource {
    fn book_path(&self) -> &str {
        &self.book_path
    }

    fn full_path(&self) -> &Path {
        &self.full_path
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Html
    }

    fn events(&self) -> &Arc<EventHub> {
        &self.events
    }
}

impl fmt::Debug for HtmlResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HtmlResource")
            .field("book_path", &self.book_path)
            .field("full_path", &self.full_path)
            .field("version", &self.version())
            .field("modified", &self.is_modified())
            .finish_non_exhaustive()
    }
}

impl Drop for HtmlResource {
    fn drop(&mut self) {
        self.unlink();
    }
}

/// Book paths referenced by `img`, `link`, `audio` and `video` elements of `text`.
///
/// `href` wins over `src`. A `link` whose `rel` lacks the `stylesheet` token
/// is skipped, as are external references and empty paths. Duplicates are kept.
pub fn linked_resource_paths(text: &str, folder: &str, version: EpubVersion) -> Vec<String> {
    let doc = Document::parse(text, version);
    doc.nodes_with_tags(LINKING_TAGS)
        .into_iter()
        .filter_map(|node| {
            if doc.tag_name(node) == Some("link")
                && let Some(rel) = doc.attr(node, "rel")
                && !xhtml::is_stylesheet_rel(rel)
            {
                return None;
            }
            let href = doc.attr(node, "href").or_else(|| doc.attr(node, "src"))?;
            resolve_href(href, folder)
        })
        .collect()
}

/// Whether a language code is written right to left.
///
/// Codes longer than three characters are matched on their first two
/// (`he-IL` → `he`).
pub fn is_rtl_language(code: &str) -> bool {
    let short: String = if code.chars().count() > 3 {
        code.chars().take(2).collect()
    } else {
        code.to_string()
    };
    RTL_LANGUAGES.contains(&short.to_ascii_lowercase().as_str())
}

fn is_remote_reference(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    ["http://", "https://", "ftp://", "//"]
        .iter()
        .any(|prefix| value.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAPTER: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
<title>One</title>
<link href="../Styles/main.css" rel="stylesheet" type="text/css"/>
<link href="../Misc/next.xhtml" rel="next"/>
<script src="../Misc/app.js"></script>
</head>
<body>
<p><img src="../Images/cover.png" alt=""/><img src="http://example.com/x.png" alt=""/></p>
<audio src="../Audio/a%20b.mp3"></audio>
<a href="#top">top</a>
</body>
</html>"##;

    fn chapter() -> HtmlResource {
        let res = HtmlResource::new("OEBPS/Text/one.xhtml", "one.xhtml", EpubVersion::V3);
        res.set_text(CHAPTER);
        res
    }

    #[test]
    fn test_linked_resource_paths() {
        let paths = linked_resource_paths(CHAPTER, "OEBPS/Text", EpubVersion::V3);
        assert_eq!(
            paths,
            vec![
                "OEBPS/Styles/main.css",
                "OEBPS/Images/cover.png",
                "OEBPS/Audio/a b.mp3",
            ]
        );
    }

    #[test]
    fn test_alternate_stylesheet_is_listed_and_tracked() {
        let text = r#"<html><head><link rel="alternate stylesheet" href="night.css"/></head></html>"#;
        let res = HtmlResource::new("OEBPS/Text/one.xhtml", "one.xhtml", EpubVersion::V3);
        res.set_text(text);
        assert_eq!(res.linked_stylesheets(), vec!["OEBPS/Text/night.css"]);
        assert_eq!(res.linked_resources(), vec!["OEBPS/Text/night.css"]);
    }

    #[test]
    fn test_link_set_follows_text() {
        let res = chapter();
        assert_eq!(res.linked_resources(), res.paths_to_linked_resources());

        res.set_text("<html><body><img src='b.png'/></body></html>");
        assert_eq!(res.linked_resources(), vec!["OEBPS/Text/b.png"]);
    }

    #[test]
    fn test_stylesheets_and_scripts() {
        let res = chapter();
        assert_eq!(res.linked_stylesheets(), vec!["OEBPS/Styles/main.css"]);
        assert_eq!(res.linked_javascripts(), vec!["OEBPS/Misc/app.js"]);
    }

    #[test]
    fn test_manifest_properties() {
        let res = chapter();
        assert_eq!(res.manifest_properties(), vec!["scripted", "remote-resources"]);

        res.set_text(
            "<html><body><math><mi>x</mi></math><svg><rect/></svg><epub:switch></epub:switch></body></html>",
        );
        assert_eq!(res.manifest_properties(), vec!["mathml", "svg", "switch"]);
    }

    #[test]
    fn test_rtl_detection() {
        assert!(is_rtl_language("he"));
        assert!(!is_rtl_language("ara"));
        assert!(is_rtl_language("ar-EG"));
        assert!(is_rtl_language("fas"));
        assert!(!is_rtl_language("en-US"));
    }

    #[test]
    fn test_language_round_trip_without_rtl() {
        let res = HtmlResource::new("a.xhtml", "a.xhtml", EpubVersion::V3);
        res.set_text(CHAPTER);
        assert_eq!(res.language_attribute(), "");

        res.set_language_attribute("fr");
        assert_eq!(res.language_attribute(), "fr");
        let text = res.text();
        assert!(text.contains(r#"lang="fr""#));
        assert!(!text.contains("dir="));
    }

    #[test]
    fn test_epub2_only_writes_xml_lang() {
        let res = HtmlResource::new("a.xhtml", "a.xhtml", EpubVersion::V2);
        res.set_text(r#"<html xmlns="http://www.w3.org/1999/xhtml"><body/></html>"#);
        res.set_language_attribute("de");

        let text = res.text();
        assert!(text.contains(r#"xml:lang="de""#));
        assert!(!text.contains(r#" lang="de""#));
    }

    #[test]
    fn test_toc_cache_is_lazy_and_sticky() {
        let res = chapter();
        assert_eq!(res.toc_cache(), CHAPTER);

        res.set_text("<html><body/></html>");
        assert_eq!(res.toc_cache(), CHAPTER);

        res.set_toc_cache("snapshot");
        assert_eq!(res.toc_cache(), "snapshot");

        res.clear_toc_cache();
        assert_eq!(res.toc_cache(), "<html><body/></html>");
    }

    #[test]
    fn test_delete_css_styles_marks_modified() {
        let res = HtmlResource::new("a.xhtml", "a.xhtml", EpubVersion::V3);
        res.set_text("<html><head><style>\np { color: red; }\n.x { margin: 0; }\n</style></head><body/></html>");

        assert!(!res.delete_css_styles(&[]));
        assert!(!res.is_modified());

        assert!(res.delete_css_styles(&[CssSelector::new(".x", 3)]));
        assert!(res.is_modified());
        assert!(!res.text().contains(".x"));
        assert!(res.text().contains("p { color: red; }"));
    }

    #[test]
    fn test_events_order_on_set_text() {
        let res = chapter();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        res.events().connect(ListenerId::next(), move |_: &str, event: ResourceEvent| {
            sink.lock().unwrap().push(event);
        });

        res.set_text("<html><body/></html>");
        assert!(!res.delete_css_styles(&[]));
        assert_eq!(*seen.lock().unwrap(), vec![ResourceEvent::TextChanging]);
    }

    #[test]
    fn test_well_formedness() {
        let res = chapter();
        assert!(res.is_well_formed());
        res.set_text("<html><body><p>open</body></html>");
        assert!(res.well_formed_error().is_some());
    }
}
