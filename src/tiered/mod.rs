//! The tiered cache: an ordered stack of backends behind one cache façade.
//!
//! [`TieredCache`] holds its backends fastest first and applies one policy per
//! operation:
//!
//! | Operation                         | Policy                                        |
//! |-----------------------------------|-----------------------------------------------|
//! | [`get`](TieredCache::get)         | in order, stop at the first hit               |
//! | [`exists`](TieredCache::exists)   | in order, stop at the first `true`            |
//! | [`start`](TieredCache::start)     | every backend                                 |
//! | [`save`](TieredCache::save)       | every backend, identical arguments            |
//! | [`delete`](TieredCache::delete)   | every backend, answer set by [`DeletePolicy`] |
//!
//! Backend errors are never caught. A failure aborts the lookup or broadcast
//! at the failing backend and reaches the caller as [`CacheError::Backend`];
//! backends already written are left as they are.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use tokio::task::JoinSet;
use tracing::{debug, info, trace};

use crate::backend::{BackendHandle, BoxFuture, Key, Lifetime};
use crate::config::{
    BackendRegistry, BackendSpec, BroadcastMode, DeletePolicy, RepopulatePolicy, TieredConfig,
};
use crate::error::{BackendResult, CacheResult};

#[cfg(doc)]
use crate::error::CacheError;

/// A multi-tier cache aggregator.
///
/// Index 0 is consulted first on reads and is the fastest tier by convention.
/// The sequence is append-only: [`push`](Self::push) adds a tier at the end,
/// nothing removes or reorders tiers. Since `push` needs `&mut self`, the
/// stack is fixed once the cache is shared.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use bytes::Bytes;
/// use tiercache::backend::{Key, MemoryBackend};
/// use tiercache::tiered::TieredCache;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), tiercache::CacheError> {
/// let mut cache = TieredCache::new();
/// cache
///     .push(Arc::new(MemoryBackend::default().with_name("l1")))
///     .push(Arc::new(MemoryBackend::default().with_name("l2")));
///
/// let key = Key::from("my-key");
/// cache.save(Some(&key), Some(Bytes::from_static(b"data")), None, None).await?;
/// assert_eq!(cache.get(&key, None).await?, Some(Bytes::from_static(b"data")));
/// assert!(cache.delete(&key).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct TieredCache {
    backends: Vec<BackendHandle>,
    broadcast: BroadcastMode,
    delete_policy: DeletePolicy,
    repopulate: RepopulatePolicy,
}

impl fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.backends.iter().map(|b| b.name()).collect();
        f.debug_struct("TieredCache")
            .field("backends", &names)
            .field("broadcast", &self.broadcast)
            .field("delete_policy", &self.delete_policy)
            .field("repopulate", &self.repopulate)
            .finish()
    }
}

impl TieredCache {
    /// Creates a cache with no backends.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache over `backends`, fastest first.
    pub fn with_backends(backends: Vec<BackendHandle>) -> Self {
        Self {
            backends,
            ..Self::default()
        }
    }

    /// Builds a cache from a parsed configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidArgument`] for the first backend spec the
    /// registry cannot build.
    pub fn from_config(config: &TieredConfig, registry: &BackendRegistry) -> CacheResult<Self> {
        let mut cache = Self::new()
            .broadcast_mode(config.broadcast)
            .delete_policy(config.delete)
            .repopulate_policy(config.repopulate);

        for spec in &config.backends {
            cache.push_spec(spec, registry)?;
        }

        info!(tiers = cache.len(), broadcast = ?cache.broadcast, "tiered cache configured");
        Ok(cache)
    }

    /// Sets how `start`, `save` and `delete` reach the backends.
    pub fn broadcast_mode(mut self, mode: BroadcastMode) -> Self {
        self.broadcast = mode;
        self
    }

    /// Sets what [`delete`](Self::delete) reports.
    pub fn delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.delete_policy = policy;
        self
    }

    /// Opts in to (or out of) writing slower-tier hits back into faster tiers.
    pub fn repopulate_policy(mut self, policy: RepopulatePolicy) -> Self {
        self.repopulate = policy;
        self
    }

    /// Appends `backend` as the slowest tier and returns `self` for chaining.
    pub fn push(&mut self, backend: BackendHandle) -> &mut Self {
        debug!(backend = backend.name(), tier = self.backends.len(), "backend added");
        self.backends.push(backend);
        self
    }

    /// By-value form of [`push`](Self::push).
    pub fn with_backend(mut self, backend: BackendHandle) -> Self {
        self.push(backend);
        self
    }

    /// Builds the backend described by `spec` and appends it.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidArgument`] if the registry has no factory
    /// for the spec's kind or the factory rejects it. The tier stack is left
    /// unmodified in that case.
    pub fn push_spec(
        &mut self,
        spec: &BackendSpec,
        registry: &BackendRegistry,
    ) -> CacheResult<&mut Self> {
        let backend = registry.build(spec)?;
        Ok(self.push(backend))
    }

    /// Number of tiers.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// The tiers, fastest first.
    pub fn backends(&self) -> &[BackendHandle] {
        &self.backends
    }

    /// Returns the content of the first tier holding `key`, or `None` if every
    /// tier misses.
    ///
    /// With [`RepopulatePolicy::FasterTiers`], a hit in tier `i > 0` is first
    /// saved into tiers `0..i` with the same `lifetime` and `stop_buffer` set
    /// to `Some(false)`, so a staged write in progress on those tiers survives.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] from the first backend that fails;
    /// later tiers are not consulted.
    pub async fn get(&self, key: &Key, lifetime: Lifetime) -> CacheResult<Option<Bytes>> {
        for (tier, backend) in self.backends.iter().enumerate() {
            let Some(content) = backend.get(key, lifetime).await? else {
                trace!(key = %key, tier, backend = backend.name(), "tier miss");
                continue;
            };

            debug!(key = %key, tier, backend = backend.name(), "cache hit");
            if tier > 0 && self.repopulate == RepopulatePolicy::FasterTiers {
                for faster in &self.backends[..tier] {
                    faster
                        .save(Some(key), Some(content.clone()), lifetime, Some(false))
                        .await?;
                }
                debug!(key = %key, tiers = tier, "repopulated faster tiers");
            }
            return Ok(Some(content));
        }

        debug!(key = %key, tiers = self.backends.len(), "cache miss");
        Ok(None)
    }

    /// Starts a staged write of `key` on every backend.
    pub async fn start(&self, key: &Key, lifetime: Lifetime) -> CacheResult<()> {
        let key = key.clone();
        self.broadcast("start", move |backend| {
            let key = key.clone();
            Box::pin(async move { backend.start(&key, lifetime).await })
        })
        .await?;
        Ok(())
    }

    /// Saves into every backend, passing the arguments through unchanged.
    ///
    /// Returns once every backend has been invoked.
    pub async fn save(
        &self,
        key: Option<&Key>,
        content: Option<Bytes>,
        lifetime: Lifetime,
        stop_buffer: Option<bool>,
    ) -> CacheResult<()> {
        let key = key.cloned();
        self.broadcast("save", move |backend| {
            let key = key.clone();
            let content = content.clone();
            Box::pin(async move {
                backend
                    .save(key.as_ref(), content, lifetime, stop_buffer)
                    .await
            })
        })
        .await?;
        Ok(())
    }

    /// Deletes `key` from every backend.
    ///
    /// Under the default [`DeletePolicy::AlwaysTrue`] this reports `true`
    /// whatever the backends did, including when there are no backends.
    /// Backend errors still propagate.
    pub async fn delete(&self, key: &Key) -> CacheResult<bool> {
        let owned = key.clone();
        let removed = self
            .broadcast("delete", move |backend| {
                let key = owned.clone();
                Box::pin(async move { backend.delete(&key).await })
            })
            .await?;

        Ok(match self.delete_policy {
            DeletePolicy::AlwaysTrue => true,
            DeletePolicy::AnyRemoved => removed.into_iter().any(|r| r),
        })
    }

    /// Returns `true` as soon as one backend reports `key` present.
    pub async fn exists(&self, key: Option<&Key>, lifetime: Lifetime) -> CacheResult<bool> {
        for (tier, backend) in self.backends.iter().enumerate() {
            if backend.exists(key, lifetime).await? {
                trace!(key = ?key, tier, backend = backend.name(), "exists");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Fetches `key` and decodes it as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`] if the first hit is not valid JSON
    /// for `T`.
    pub async fn get_json<T>(&self, key: &Key, lifetime: Lifetime) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.get(key, lifetime).await? {
            Some(content) => Ok(Some(serde_json::from_slice(&content)?)),
            None => Ok(None),
        }
    }

    /// Encodes `value` as JSON once and saves it into every backend.
    pub async fn save_json<T>(&self, key: &Key, value: &T, lifetime: Lifetime) -> CacheResult<()>
    where
        T: Serialize + ?Sized,
    {
        let content = Bytes::from(serde_json::to_vec(value)?);
        self.save(Some(key), Some(content), lifetime, None).await
    }

    // Runs `op` against every backend according to the broadcast mode and
    // collects the results. Fails fast on the first error.
    async fn broadcast<T, F>(&self, op: &'static str, invoke: F) -> CacheResult<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(BackendHandle) -> BoxFuture<'static, BackendResult<T>>,
    {
        debug!(op, tiers = self.backends.len(), mode = ?self.broadcast, "broadcast");
        let mut results = Vec::with_capacity(self.backends.len());

        match self.broadcast {
            BroadcastMode::Sequential => {
                for backend in &self.backends {
                    results.push(invoke(Arc::clone(backend)).await?);
                }
            }
            BroadcastMode::Concurrent => {
                let mut tasks = JoinSet::new();
                for backend in &self.backends {
                    tasks.spawn(invoke(Arc::clone(backend)));
                }
                while let Some(joined) = tasks.join_next().await {
                    match joined? {
                        Ok(value) => results.push(value),
                        Err(e) => {
                            tasks.abort_all();
                            return Err(e.into());
                        }
                    }
                }
            }
        }

        Ok(results)
    }
}
