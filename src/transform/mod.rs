//! Document utility layer
//!
//! - CSS: rule scanning and selector removal in embedded style blocks
//! - XHTML: link extraction, section splitting, mending, well-formedness
//! - Path: book path resolution for references

pub mod css;
pub mod path;
pub mod xhtml;
