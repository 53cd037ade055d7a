//! Payloads of entity create and update commands and their rich-text
//! documents.

mod update;
pub use update::*;

mod document;
pub use document::*;
pub(crate) use document::{DocumentCommand, SecretRef};
