//! This module defines how workspace schemas are fetched and cached.

use std::sync::Arc;

use async_trait::async_trait;

use crate::types::RawSchema;
use crate::Result;

mod cache;
mod coordinator;
pub use coordinator::*;
mod rest;
pub use rest::*;

/// Reference to a schema source.
pub type SchemaSourceRef = Arc<dyn SchemaSource>;

/// Answer to a conditional schema fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The schema identified by the sent etag is still current.
    NotModified,
    /// A schema payload, with the etag identifying it if the backend sent one.
    Modified {
        /// Raw schema.
        schema: RawSchema,
        /// Revalidation token of `schema`.
        etag: Option<String>,
    },
}

/// Where workspace schemas come from.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Fetch the raw schema of `workspace`.
    ///
    /// Without an `etag` the source must return [`FetchOutcome::Modified`].
    /// With one it may answer [`FetchOutcome::NotModified`].
    async fn fetch_raw_schema(&self, workspace: &str, etag: Option<&str>) -> Result<FetchOutcome>;
}
