//! Schema coordinator: cached, revalidated, single-flight schema lookups.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::time::Instant;

use super::cache::SchemaCache;
use super::{FetchOutcome, SchemaSourceRef};
use crate::config::CoordinatorConfig;
use crate::types::{Schema, SchemaRef};
use crate::{Error, ErrorKind, Result};

type SharedFetch = Shared<BoxFuture<'static, Result<SchemaRef>>>;

/// Hands out workspace schemas.
///
/// Fresh schemas are served from an LRU cache. Expired or missing ones are
/// revalidated against the [`SchemaSource`](super::SchemaSource) with the
/// last known etag. Concurrent lookups of one workspace share a single fetch
/// and all observe its outcome.
///
/// Fetches run on spawned tokio tasks, so lookups must happen inside a tokio
/// runtime. A fetch keeps running when every caller waiting for it is dropped.
#[derive(Clone)]
pub struct SchemaCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    source: SchemaSourceRef,
    state: Mutex<State>,
}

struct State {
    cache: SchemaCache,
    in_flight: HashMap<String, SharedFetch>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-flight registration of a workspace once its fetch task
/// finishes, panics or is dropped.
struct InFlightGuard {
    inner: Arc<Inner>,
    workspace: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.lock().in_flight.remove(&self.workspace);
    }
}

impl SchemaCoordinator {
    /// Create a coordinator fetching from `source`.
    pub fn new(source: SchemaSourceRef, config: &CoordinatorConfig) -> Self {
        log::info!(
            "Creating schema coordinator with capacity {} and ttl {:?}",
            config.capacity,
            config.ttl
        );

        Self {
            inner: Arc::new(Inner {
                source,
                state: Mutex::new(State {
                    cache: SchemaCache::new(config.capacity, config.ttl),
                    in_flight: HashMap::new(),
                }),
            }),
        }
    }

    /// Return the schema of `workspace`.
    ///
    /// Errors of the fetch are returned as is, a stale cached schema is never
    /// served in their place.
    pub async fn get_schema(&self, workspace: &str) -> Result<SchemaRef> {
        let runtime = Handle::try_current().map_err(|e| {
            Error::new(ErrorKind::Unexpected, "schema lookups need a tokio runtime").set_source(e)
        })?;

        let fetch = {
            let mut state = self.inner.lock();

            if let Some(schema) = state.cache.get_fresh(workspace, Instant::now()) {
                log::debug!("Schema cache hit for workspace {workspace}");
                return Ok(schema);
            }

            match state.in_flight.get(workspace) {
                Some(fetch) => {
                    log::debug!("Joining in-flight schema fetch for workspace {workspace}");
                    fetch.clone()
                }
                None => {
                    let previous = state.cache.previous(workspace);
                    let fetch = self.spawn_fetch(&runtime, workspace.to_string(), previous);
                    state.in_flight.insert(workspace.to_string(), fetch.clone());
                    fetch
                }
            }
        };

        fetch.await
    }

    /// Drop expired schemas, returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.inner.lock().cache.purge_expired(Instant::now())
    }

    /// Number of cached workspaces, expired ones included.
    pub fn cached_workspaces(&self) -> usize {
        self.inner.lock().cache.len()
    }

    // Called with the state lock held: the guard can't clear the
    // registration before it has been inserted.
    fn spawn_fetch(
        &self,
        runtime: &Handle,
        workspace: String,
        previous: Option<(SchemaRef, Option<String>)>,
    ) -> SharedFetch {
        let guard = InFlightGuard {
            inner: self.inner.clone(),
            workspace: workspace.clone(),
        };
        let handle = runtime.spawn(fetch_schema(self.inner.clone(), workspace, previous, guard));

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(Error::new(ErrorKind::Unexpected, "schema fetch task failed")
                    .set_source(e)),
            }
        }
        .boxed()
        .shared()
    }
}

async fn fetch_schema(
    inner: Arc<Inner>,
    workspace: String,
    previous: Option<(SchemaRef, Option<String>)>,
    _guard: InFlightGuard,
) -> Result<SchemaRef> {
    let etag = previous.as_ref().and_then(|(_, etag)| etag.clone());
    log::debug!(
        "Fetching schema of workspace {workspace}, etag: {}",
        etag.as_deref().unwrap_or("none")
    );

    let outcome = inner
        .source
        .fetch_raw_schema(&workspace, etag.as_deref())
        .await
        .map_err(|e| {
            log::warn!("Failed to fetch schema of workspace {workspace}: {e}");
            e.with_context("workspace", workspace.clone())
        })?;

    let (schema, etag) = match (outcome, previous) {
        (FetchOutcome::NotModified, Some((schema, Some(etag)))) => {
            log::debug!("Schema of workspace {workspace} not modified");
            (schema, Some(etag))
        }
        (FetchOutcome::NotModified, _) => {
            return Err(Error::new(
                ErrorKind::Unexpected,
                "schema reported as not modified, but no etag was sent",
            )
            .with_context("workspace", workspace));
        }
        (FetchOutcome::Modified { schema, etag }, _) => {
            let schema = Schema::try_from(schema)
                .map_err(|e| e.with_context("workspace", workspace.clone()))?;
            log::info!(
                "Loaded schema version {} of workspace {workspace}",
                schema.version
            );
            (Arc::new(schema), etag)
        }
    };

    inner
        .lock()
        .cache
        .insert(workspace, schema.clone(), etag, Instant::now());

    Ok(schema)
}
