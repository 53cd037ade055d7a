//! fibery is a library for reading and writing records of a
//! [Fibery](https://fibery.io/) workspace through its command api.
//!
//! It keeps a cache of workspace schemas and compiles select and filter
//! fragments of entity queries from them.

// Make sure all our public APIs have docs.
#![deny(missing_docs)]

mod error;
pub use error::Error;
pub use error::ErrorKind;
pub use error::Result;

pub mod catalog;
pub mod classify;
pub mod config;
pub mod datetime;
pub mod entity;
pub mod query;
pub mod types;
