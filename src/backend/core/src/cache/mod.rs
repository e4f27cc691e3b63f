//! Per-session permission cache.
//!
//! The cache holds the effective permission set of the signed-in principal.
//! It is either fully loaded or empty as observed by evaluators:
//!
//! - **Coalescing**: concurrent `load()` calls share one in-flight fetch and
//!   all receive the identical `Arc<PermissionSet>`
//! - **Generation guard**: `invalidate()` bumps a generation counter, so a
//!   fetch started before the bump can never repopulate the cache
//! - **Fail closed**: a failed or superseded load leaves the cache empty
//!
//! Members keep the metadata the source supplied (display names, ids,
//! system flags); see [`PermissionSet::entries`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use portcullis_core::cache::PermissionCache;
//!
//! let cache = PermissionCache::new(Arc::new(backend_client));
//! let set = cache.load().await?;
//! assert!(Arc::ptr_eq(&set, &cache.load().await?));
//!
//! // on logout
//! cache.invalidate();
//! assert!(cache.snapshot().is_empty());
//! ```

pub mod mirror;
pub mod set;

pub use mirror::{MirrorEntry, PermissionMirror};
pub use set::PermissionSet;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{PortcullisError, Result};
use crate::rbac::models::{Permission, PermissionWithMeta};

// ═══════════════════════════════════════════════════════════════════════════════
// Permission Source
// ═══════════════════════════════════════════════════════════════════════════════

/// Where the effective permissions of the current principal come from.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// Fetch the current principal's effective permissions.
    async fn fetch_permissions(&self) -> Result<Vec<Permission>>;

    /// Same as [`fetch_permissions`](Self::fetch_permissions), keeping any
    /// metadata the source has. The cache loads through this.
    async fn fetch_permissions_with_meta(&self) -> Result<Vec<PermissionWithMeta>> {
        let permissions = self.fetch_permissions().await?;
        Ok(permissions.into_iter().map(PermissionWithMeta::new).collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache State
// ═══════════════════════════════════════════════════════════════════════════════

type SharedLoad =
    Shared<BoxFuture<'static, std::result::Result<Arc<PermissionSet>, Arc<PortcullisError>>>>;

#[derive(Default)]
struct CacheInner {
    permissions: Option<Arc<PermissionSet>>,
    generation: u64,
    in_flight: Option<(u64, SharedLoad)>,
}

/// Observable cache state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheState {
    pub loaded: bool,
    pub loading: bool,
    pub len: usize,
    pub generation: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission Cache
// ═══════════════════════════════════════════════════════════════════════════════

/// Coalescing, generation-guarded permission cache scoped to one login session.
///
/// Cloning yields another handle to the same cache.
#[derive(Clone)]
pub struct PermissionCache {
    source: Arc<dyn PermissionSource>,
    inner: Arc<Mutex<CacheInner>>,
}

impl std::fmt::Debug for PermissionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionCache")
            .field("state", &self.state())
            .finish()
    }
}

impl PermissionCache {
    /// Create an empty cache backed by `source`.
    pub fn new(source: Arc<dyn PermissionSource>) -> Self {
        Self {
            source,
            inner: Arc::new(Mutex::new(CacheInner::default())),
        }
    }

    /// Ensure the cache is populated.
    ///
    /// Returns the cached set without I/O when already loaded. Otherwise joins
    /// the in-flight fetch or starts one. If `invalidate()` runs while the
    /// fetch is pending, the result is discarded and `LoadSuperseded` is
    /// returned.
    pub async fn load(&self) -> Result<Arc<PermissionSet>> {
        let (generation, pending) = {
            let mut inner = self.inner.lock();
            if let Some(permissions) = &inner.permissions {
                return Ok(Arc::clone(permissions));
            }

            let generation = inner.generation;
            let joined = inner
                .in_flight
                .as_ref()
                .filter(|(started, _)| *started == generation)
                .map(|(_, load)| load.clone());

            let load = match joined {
                Some(load) => {
                    debug!(generation, "Joining in-flight permission load");
                    load
                }
                None => {
                    debug!(generation, "Starting permission load");
                    let load = Self::start_load(Arc::clone(&self.source));
                    inner.in_flight = Some((generation, load.clone()));
                    load
                }
            };
            (generation, load)
        };

        let outcome = pending.await;

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            debug!(
                started = generation,
                current = inner.generation,
                "Discarding superseded permission load"
            );
            counter!("portcullis_cache_loads_total", "outcome" => "superseded").increment(1);
            return Err(PortcullisError::load_superseded());
        }
        if matches!(&inner.in_flight, Some((started, _)) if *started == generation) {
            inner.in_flight = None;
        }

        match outcome {
            Ok(permissions) => {
                if inner.permissions.is_none() {
                    debug!(count = permissions.len(), "Permission cache loaded");
                    counter!("portcullis_cache_loads_total", "outcome" => "loaded").increment(1);
                    inner.permissions = Some(Arc::clone(&permissions));
                }
                Ok(permissions)
            }
            Err(error) => {
                warn!(error = %error, "Permission load failed; cache stays empty");
                counter!("portcullis_cache_loads_total", "outcome" => "failed").increment(1);
                Err(PortcullisError::from_shared(&error))
            }
        }
    }

    fn start_load(source: Arc<dyn PermissionSource>) -> SharedLoad {
        async move {
            source
                .fetch_permissions_with_meta()
                .await
                .map(|permissions| Arc::new(permissions.into_iter().collect::<PermissionSet>()))
                .map_err(Arc::new)
        }
        .boxed()
        .shared()
    }

    /// Clear the cache and discard any in-flight load.
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock();
        inner.permissions = None;
        inner.in_flight = None;
        inner.generation += 1;
        debug!(generation = inner.generation, "Permission cache invalidated");
    }

    /// Current permissions, empty when unloaded.
    pub fn snapshot(&self) -> PermissionSet {
        self.inner
            .lock()
            .permissions
            .as_deref()
            .cloned()
            .unwrap_or_default()
    }

    /// Current permissions, `None` when unloaded.
    pub fn view(&self) -> Option<Arc<PermissionSet>> {
        self.inner.lock().permissions.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.lock().permissions.is_some()
    }

    pub fn state(&self) -> CacheState {
        let inner = self.inner.lock();
        CacheState {
            loaded: inner.permissions.is_some(),
            loading: matches!(&inner.in_flight, Some((started, _)) if *started == inner.generation),
            len: inner.permissions.as_ref().map_or(0, |p| p.len()),
            generation: inner.generation,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct GatedSource {
        calls: AtomicUsize,
        gate: Notify,
        fail: bool,
    }

    impl GatedSource {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Notify::new(),
                fail,
            })
        }
    }

    #[async_trait]
    impl PermissionSource for GatedSource {
        async fn fetch_permissions(&self) -> Result<Vec<Permission>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            if self.fail {
                Err(PortcullisError::from_status(503, "/rbac/me/permissions", "down"))
            } else {
                Ok(vec![Permission::new("user", "read")])
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_fetch() {
        let source = GatedSource::new(false);
        let cache = PermissionCache::new(source.clone());

        let a = tokio::spawn({
            let cache = cache.clone();
            async move { cache.load().await }
        });
        let b = tokio::spawn({
            let cache = cache.clone();
            async move { cache.load().await }
        });
        while !cache.state().loading {
            tokio::task::yield_now().await;
        }
        source.gate.notify_one();

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_loaded());

        let c = cache.load().await.unwrap();
        assert!(Arc::ptr_eq(&a, &c));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_cache_empty() {
        let source = GatedSource::new(true);
        source.gate.notify_one();
        let cache = PermissionCache::new(source.clone());

        let err = cache.load().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::BackendUnavailable);
        assert!(!cache.is_loaded());
        assert!(cache.snapshot().is_empty());
        assert!(!cache.state().loading);
    }

    #[tokio::test]
    async fn test_invalidate_discards_in_flight_load() {
        let source = GatedSource::new(false);
        let cache = PermissionCache::new(source.clone());

        let pending = tokio::spawn({
            let cache = cache.clone();
            async move { cache.load().await }
        });
        while !cache.state().loading {
            tokio::task::yield_now().await;
        }

        cache.invalidate();
        source.gate.notify_one();

        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err.code(), ErrorCode::LoadSuperseded);
        assert!(!cache.is_loaded());
        assert!(cache.view().is_none());
        assert_eq!(cache.state().generation, 1);

        // The next load goes back to the source and fills the cache.
        source.gate.notify_one();
        let fresh = cache.load().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fresh.len(), 1);
        assert!(cache.snapshot().contains(&Permission::new("user", "read")));
        assert_eq!(
            cache.state(),
            CacheState {
                loaded: true,
                loading: false,
                len: 1,
                generation: 1,
            }
        );
    }

    struct LabelledSource;

    #[async_trait]
    impl PermissionSource for LabelledSource {
        async fn fetch_permissions(&self) -> Result<Vec<Permission>> {
            Ok(vec![Permission::new("report", "export")])
        }

        async fn fetch_permissions_with_meta(&self) -> Result<Vec<PermissionWithMeta>> {
            Ok(vec![PermissionWithMeta::new(Permission::new("report", "export"))
                .with_id(12)
                .with_display_name("Export reports")
                .system()])
        }
    }

    #[tokio::test]
    async fn test_load_keeps_source_metadata() {
        let cache = PermissionCache::new(Arc::new(LabelledSource));
        cache.load().await.unwrap();

        let snapshot = cache.snapshot();
        let export = snapshot.meta(&Permission::new("report", "export")).unwrap();
        assert_eq!(export.id, Some(12));
        assert_eq!(export.label(), "Export reports");
        assert!(export.is_system);
    }

    #[tokio::test]
    async fn test_invalidate_clears_loaded_set() {
        let source = GatedSource::new(false);
        source.gate.notify_one();
        let cache = PermissionCache::new(source.clone());

        cache.load().await.unwrap();
        assert_eq!(cache.snapshot().len(), 1);

        cache.invalidate();
        assert!(cache.snapshot().is_empty());
        assert_eq!(
            cache.state(),
            CacheState {
                loaded: false,
                loading: false,
                len: 0,
                generation: 1,
            }
        );
    }
}
