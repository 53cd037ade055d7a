use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

use crate::types::SchemaRef;

struct CacheEntry {
    schema: SchemaRef,
    etag: Option<String>,
    expires_at: Instant,
}

/// LRU cache of built schemas keyed by workspace.
///
/// Expired entries stay around until evicted or purged so that their etag
/// can still be sent with the next fetch.
pub(crate) struct SchemaCache {
    entries: LruCache<String, CacheEntry>,
    ttl: Duration,
}

impl SchemaCache {
    pub(crate) fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            ttl,
        }
    }

    /// Return the schema of `workspace` if it hasn't expired, marking it as
    /// most recently used.
    pub(crate) fn get_fresh(&mut self, workspace: &str, now: Instant) -> Option<SchemaRef> {
        self.entries
            .get(workspace)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.schema.clone())
    }

    /// Last known schema and etag of `workspace`, expired or not.
    pub(crate) fn previous(&self, workspace: &str) -> Option<(SchemaRef, Option<String>)> {
        self.entries
            .peek(workspace)
            .map(|entry| (entry.schema.clone(), entry.etag.clone()))
    }

    pub(crate) fn insert(
        &mut self,
        workspace: String,
        schema: SchemaRef,
        etag: Option<String>,
        now: Instant,
    ) {
        let entry = CacheEntry {
            schema,
            etag,
            expires_at: now + self.ttl,
        };

        if let Some((evicted, _)) = self.entries.push(workspace.clone(), entry) {
            if evicted != workspace {
                log::debug!("Evicted schema of workspace {evicted} from cache");
            }
        }
    }

    /// Drop every expired entry, returns how many were dropped.
    pub(crate) fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(workspace, _)| workspace.clone())
            .collect();

        for workspace in &expired {
            self.entries.pop(workspace);
        }
        expired.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
