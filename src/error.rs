//! Error types for folio operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading, saving or managing book resources.
///
/// Malformed markup is never an error: the parser always recovers.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot open file {}: {source}", path.display())]
    CannotOpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write file {}: {source}", path.display())]
    CannotWriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("not an HTML resource: {0}")]
    NotHtml(String),
}

pub type Result<T> = std::result::Result<T, Error>;
