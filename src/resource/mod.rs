//! Book resources and the seams they talk through.
//!
//! A [`Resource`] is a file inside the book package. HTML content documents
//! are [`HtmlResource`]s; everything else (stylesheets, images, audio, fonts)
//! is a [`FileResource`]. Resources find each other through a
//! [`ResourceRegistry`] and observe each other through their [`EventHub`].

mod events;
mod html;
mod io;

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use events::{EventHub, ListenerId, ResourceEvent};
pub use html::{HtmlResource, linked_resource_paths};
pub use io::{FsTextIo, TextFileIo};

use crate::transform::path::folder_of;
use crate::util::detect_resource_type;

/// Kind of file, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Html,
    Css,
    Script,
    Image,
    Audio,
    Video,
    Font,
    Ncx,
    Opf,
    Generic,
}

impl ResourceType {
    pub fn from_book_path(book_path: &str) -> Self {
        detect_resource_type(book_path)
    }
}

/// A file inside the book package.
pub trait Resource: Send + Sync + Debug {
    /// Location relative to the package root, `/`-separated.
    fn book_path(&self) -> &str;

    /// Location on disk.
    fn full_path(&self) -> &Path;

    fn resource_type(&self) -> ResourceType;

    /// Notifications published by this resource.
    fn events(&self) -> &Arc<EventHub>;

    /// Folder part of the book path, used to resolve relative references.
    fn folder(&self) -> &str {
        folder_of(self.book_path())
    }
}

/// Looks up resources by book path.
pub trait ResourceRegistry: Send + Sync {
    /// Resources for `book_paths`, in order. Missing paths are omitted and
    /// duplicates collapsed.
    fn resolve_linked_resources(&self, book_paths: &[String]) -> Vec<Arc<dyn Resource>>;
}

/// A non-HTML file: stylesheet, image, media, font or anything else.
#[derive(Debug)]
pub struct FileResource {
    book_path: String,
    full_path: PathBuf,
    resource_type: ResourceType,
    events: Arc<EventHub>,
}

impl FileResource {
    pub fn new(book_path: impl Into<String>, full_path: impl Into<PathBuf>) -> Self {
        let book_path = book_path.into();
        Self {
            resource_type: ResourceType::from_book_path(&book_path),
            book_path,
            full_path: full_path.into(),
            events: Arc::new(EventHub::new()),
        }
    }

    /// Announce that the file was rewritten.
    pub fn notify_updated_on_disk(&self) {
        self.events.emit(&self.book_path, ResourceEvent::UpdatedOnDisk);
    }

    /// Announce that the file was removed from the book.
    pub fn mark_deleted(&self) {
        self.events.emit(&self.book_path, ResourceEvent::Deleted);
    }
}

impl Resource for FileResource {
    fn book_path(&self) -> &str {
        &self.book_path
    }

    fn full_path(&self) -> &Path {
        &self.full_path
    }

    fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    fn events(&self) -> &Arc<EventHub> {
        &self.events
    }
}
