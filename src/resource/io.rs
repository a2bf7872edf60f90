//! File I/O collaborator for text resources.

use std::fmt::Debug;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::util::{decode_text, extract_xml_encoding};

/// Reads and writes the text of resource files.
pub trait TextFileIo: Send + Sync + Debug {
    /// Read a file as text.
    fn read_text_file(&self, path: &Path) -> Result<String>;

    /// Write text to a file, replacing its contents.
    fn write_text_file(&self, path: &Path, text: &str) -> Result<()>;
}

/// Filesystem implementation.
///
/// Reads are encoding aware (BOM, XML declaration, Windows-1252 fallback) and
/// normalize line endings to `\n`. Writes are UTF-8.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsTextIo;

impl TextFileIo for FsTextIo {
    fn read_text_file(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).map_err(|source| Error::CannotOpenFile {
            path: path.to_path_buf(),
            source,
        })?;

        let text = decode_text(&bytes, extract_xml_encoding(&bytes));
        if text.contains('\r') {
            Ok(text.replace("\r\n", "\n").replace('\r', "\n"))
        } else {
            Ok(text.into_owned())
        }
    }

    fn write_text_file(&self, path: &Path, text: &str) -> Result<()> {
        let to_write_error = |source| Error::CannotWriteFile {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(to_write_error)?;
        }
        fs::write(path, text).map_err(to_write_error)
    }
}
