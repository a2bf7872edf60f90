use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use log::debug;

use crate::error::{Error, Result};
use crate::resource::{
    FileResource, HtmlResource, Resource, ResourceEvent, ResourceRegistry, ResourceType,
};
use crate::transform::xhtml::clean_and_mend;

/// EPUB dialect a book is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EpubVersion {
    V2,
    #[default]
    V3,
}

impl EpubVersion {
    /// Parse a package version string: anything starting with `3` is EPUB 3,
    /// everything else EPUB 2.
    pub fn from_version_str(version: &str) -> Self {
        if version.trim().starts_with('3') {
            EpubVersion::V3
        } else {
            EpubVersion::V2
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EpubVersion::V2 => "2.0",
            EpubVersion::V3 => "3.0",
        }
    }
}

impl fmt::Display for EpubVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EpubVersion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_version_str(s))
    }
}

/// A resource held by a [`Book`].
#[derive(Debug, Clone)]
pub enum BookResource {
    Html(Arc<HtmlResource>),
    File(Arc<FileResource>),
}

impl BookResource {
    pub fn as_resource(&self) -> Arc<dyn Resource> {
        match self {
            BookResource::Html(html) => html.clone(),
            BookResource::File(file) => file.clone(),
        }
    }

    pub fn as_html(&self) -> Option<&Arc<HtmlResource>> {
        match self {
            BookResource::Html(html) => Some(html),
            BookResource::File(_) => None,
        }
    }

    pub fn book_path(&self) -> &str {
        match self {
            BookResource::Html(html) => html.book_path(),
            BookResource::File(file) => file.book_path(),
        }
    }
}

/// An unpacked book: the resources under a main folder, keyed by book path.
///
/// The book owns its resources. HTML resources hold a weak reference back to
/// it, which they use to resolve the resources they link to.
pub struct Book {
    main_folder: PathBuf,
    version: RwLock<EpubVersion>,
    resources: RwLock<HashMap<String, BookResource>>,
}

impl Book {
    pub fn new(main_folder: impl Into<PathBuf>, version: EpubVersion) -> Arc<Self> {
        Arc::new(Self {
            main_folder: main_folder.into(),
            version: RwLock::new(version),
            resources: RwLock::new(HashMap::new()),
        })
    }

    pub fn main_folder(&self) -> &Path {
        &self.main_folder
    }

    pub fn version(&self) -> EpubVersion {
        *self.version.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the dialect of the book and every HTML resource in it.
    pub fn set_version(&self, version: EpubVersion) {
        *self.version.write().unwrap_or_else(PoisonError::into_inner) = version;
        for html in self.html_resources() {
            html.set_epub_version(version);
        }
    }

    /// Register an HTML resource at `book_path`. Its text starts empty.
    pub fn add_html(self: &Arc<Self>, book_path: impl Into<String>) -> Arc<HtmlResource> {
        let book_path = book_path.into();
        let weak = Arc::downgrade(self);
        let registry: Weak<dyn ResourceRegistry> = weak;
        let html = Arc::new(
            HtmlResource::new(
                book_path.clone(),
                self.main_folder.join(&book_path),
                self.version(),
            )
            .with_registry(registry),
        );

        debug!("adding html resource {book_path}");
        // A replaced HtmlResource unlinks on drop, which needs the map lock.
        let previous = self
            .write_resources()
            .insert(book_path, BookResource::Html(html.clone()));
        drop(previous);
        html
    }

    /// Register a non-HTML resource at `book_path`.
    pub fn add_file(&self, book_path: impl Into<String>) -> Arc<FileResource> {
        let book_path = book_path.into();
        let file = Arc::new(FileResource::new(
            book_path.clone(),
            self.main_folder.join(&book_path),
        ));

        debug!("adding file resource {book_path}");
        let previous = self
            .write_resources()
            .insert(book_path, BookResource::File(file.clone()));
        drop(previous);
        file
    }

    /// Register whatever lives at `book_path`, by extension.
    pub fn add(self: &Arc<Self>, book_path: impl Into<String>) -> BookResource {
        let book_path = book_path.into();
        match ResourceType::from_book_path(&book_path) {
            ResourceType::Html => BookResource::Html(self.add_html(book_path)),
            _ => BookResource::File(self.add_file(book_path)),
        }
    }

    pub fn get(&self, book_path: &str) -> Option<BookResource> {
        self.read_resources().get(book_path).cloned()
    }

    pub fn html(&self, book_path: &str) -> Result<Arc<HtmlResource>> {
        match self.get(book_path) {
            Some(BookResource::Html(html)) => Ok(html),
            Some(BookResource::File(_)) => Err(Error::NotHtml(book_path.to_string())),
            None => Err(Error::ResourceNotFound(book_path.to_string())),
        }
    }

    pub fn contains(&self, book_path: &str) -> bool {
        self.read_resources().contains_key(book_path)
    }

    /// Remove a resource, announcing [`Deleted`](crate::resource::ResourceEvent::Deleted)
    /// to everything that links to it.
    pub fn remove(&self, book_path: &str) -> Result<BookResource> {
        let removed = self
            .write_resources()
            .remove(book_path)
            .ok_or_else(|| Error::ResourceNotFound(book_path.to_string()))?;

        debug!("removed resource {book_path}");
        match &removed {
            BookResource::Html(html) => {
                html.events().emit(book_path, ResourceEvent::Deleted);
                html.unlink();
            }
            BookResource::File(file) => file.mark_deleted(),
        }
        Ok(removed)
    }

    /// Every book path, sorted.
    pub fn book_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.read_resources().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Every HTML resource, sorted by book path.
    pub fn html_resources(&self) -> Vec<Arc<HtmlResource>> {
        let mut html: Vec<Arc<HtmlResource>> = self
            .read_resources()
            .values()
            .filter_map(|r| r.as_html().cloned())
            .collect();
        html.sort_by(|a, b| a.book_path().cmp(b.book_path()));
        html
    }

    /// Load every HTML resource from disk. Returns the failures by book path.
    pub fn load_all(&self) -> Vec<(String, Error)> {
        self.html_resources()
            .into_iter()
            .filter_map(|html| {
                html.load_from_disk()
                    .err()
                    .map(|e| (html.book_path().to_string(), e))
            })
            .collect()
    }

    /// Save every HTML resource as part of a book-wide save.
    pub fn save_all(&self) -> Result<()> {
        for html in self.html_resources() {
            html.save_to_disk(true)?;
        }
        Ok(())
    }

    /// Split an HTML resource at its section markers.
    ///
    /// The resource keeps the first section. Each further section becomes a
    /// new mended resource next to it, named `<stem>_<n>.<ext>` with the
    /// first free `n`. Returns the new resources in order.
    pub fn split_html(self: &Arc<Self>, book_path: &str) -> Result<Vec<Arc<HtmlResource>>> {
        let html = self.html(book_path)?;
        let sections = html.split_on_section_markers();
        let version = self.version();

        let (stem, ext) = match book_path.rsplit_once('.') {
            Some((stem, ext)) if !ext.contains('/') => (stem, ext),
            _ => (book_path, "xhtml"),
        };

        let mut created = Vec::with_capacity(sections.len());
        let mut n = 1;
        for section in sections {
            let new_path = loop {
                let candidate = format!("{stem}_{n}.{ext}");
                n += 1;
                if !self.contains(&candidate) {
                    break candidate;
                }
            };
            let new_html = self.add_html(new_path);
            new_html.set_text(clean_and_mend(&section, version));
            created.push(new_html);
        }
        Ok(created)
    }

    fn read_resources(&self) -> RwLockReadGuard<'_, HashMap<String, BookResource>> {
        self.resources.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_resources(&self) -> RwLockWriteGuard<'_, HashMap<String, BookResource>> {
        self.resources.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResourceRegistry for Book {
    fn resolve_linked_resources(&self, book_paths: &[String]) -> Vec<Arc<dyn Resource>> {
        let resources = self.read_resources();
        let mut seen: Vec<&str> = Vec::new();
        let mut resolved = Vec::new();
        for path in book_paths {
            if seen.contains(&path.as_str()) {
                continue;
            }
            seen.push(path);
            if let Some(resource) = resources.get(path) {
                resolved.push(resource.as_resource());
            }
        }
        resolved
    }
}

impl fmt::Debug for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Book")
            .field("main_folder", &self.main_folder)
            .field("version", &self.version())
            .field("resources", &self.read_resources().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        assert_eq!(EpubVersion::from_version_str("3.0"), EpubVersion::V3);
        assert_eq!(EpubVersion::from_version_str("3.2"), EpubVersion::V3);
        assert_eq!(EpubVersion::from_version_str("2.0.1"), EpubVersion::V2);
        assert_eq!(EpubVersion::from_version_str(""), EpubVersion::V2);
        assert_eq!("3.0".parse::<EpubVersion>(), Ok(EpubVersion::V3));
        assert_eq!(EpubVersion::V2.to_string(), "2.0");
    }

    #[test]
    fn test_add_and_lookup() {
        let book = Book::new("/tmp/book", EpubVersion::V3);
        let html = book.add_html("OEBPS/Text/ch1.xhtml");
        book.add_file("OEBPS/Styles/main.css");

        assert_eq!(html.full_path(), Path::new("/tmp/book/OEBPS/Text/ch1.xhtml"));
        assert!(book.html("OEBPS/Text/ch1.xhtml").is_ok());
        assert!(matches!(book.html("OEBPS/Styles/main.css"), Err(Error::NotHtml(_))));
        assert!(matches!(book.html("missing.xhtml"), Err(Error::ResourceNotFound(_))));
        assert_eq!(
            book.book_paths(),
            vec!["OEBPS/Styles/main.css", "OEBPS/Text/ch1.xhtml"]
        );
    }

    #[test]
    fn test_add_by_extension() {
        let book = Book::new("/tmp/book", EpubVersion::V3);
        assert!(matches!(book.add("Text/a.html"), BookResource::Html(_)));
        assert!(matches!(book.add("Images/a.png"), BookResource::File(_)));
    }

    #[test]
    fn test_resolve_skips_missing_and_duplicates() {
        let book = Book::new("/tmp/book", EpubVersion::V3);
        book.add_file("a.css");
        book.add_file("b.png");

        let resolved = book.resolve_linked_resources(&[
            "a.css".to_string(),
            "missing.css".to_string(),
            "a.css".to_string(),
            "b.png".to_string(),
        ]);
        let paths: Vec<&str> = resolved.iter().map(|r| r.book_path()).collect();
        assert_eq!(paths, vec!["a.css", "b.png"]);
    }

    #[test]
    fn test_set_version_propagates() {
        let book = Book::new("/tmp/book", EpubVersion::V2);
        let html = book.add_html("a.xhtml");
        book.set_version(EpubVersion::V3);
        assert_eq!(html.version(), EpubVersion::V3);
    }

    #[test]
    fn test_split_html_names_new_resources() {
        let book = Book::new("/tmp/book", EpubVersion::V3);
        book.add_html("Text/ch_1.xhtml");
        let html = book.add_html("Text/ch.xhtml");
        html.set_text(
            "<html><head><title>t</title></head><body><p>a</p><hr class=\"section_split_marker\"/><p>b</p><hr class=\"section_split_marker\"/><p>c</p></body></html>",
        );

        let created = book.split_html("Text/ch.xhtml").unwrap();
        let paths: Vec<&str> = created.iter().map(|h| h.book_path()).collect();
        assert_eq!(paths, vec!["Text/ch_2.xhtml", "Text/ch_3.xhtml"]);
        assert!(created[0].text().contains("<p>b</p>"));
        assert!(created[1].text().contains("<p>c</p>"));
        assert!(!html.text().contains("<p>b</p>"));
    }
}
