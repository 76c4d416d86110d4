//! Bootstrap layer: describe a tier hierarchy in JSON and build it.
//!
//! ```json
//! {
//!   "broadcast": "sequential",
//!   "delete": "always_true",
//!   "repopulate": "disabled",
//!   "backends": [
//!     { "kind": "memory", "name": "l1", "lifetime_secs": 60 },
//!     { "kind": "memory", "name": "l2", "prefix": "cache:", "lifetime_secs": 3600 }
//!   ]
//! }
//! ```
//!
//! Backends are listed fastest first. Each entry is turned into a
//! [`BackendHandle`] by the factory registered for its `kind` in a
//! [`BackendRegistry`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::{BackendHandle, Lifetime, MemoryBackend, MemoryOptions};
use crate::error::{BackendError, BackendResult, CacheError, CacheResult};

/// How `start`, `save` and `delete` reach the backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastMode {
    /// Invoke each backend after the previous one completes, in stored order.
    #[default]
    Sequential,
    /// Invoke every backend at once on its own task. Invocation order is
    /// unspecified; the first failure aborts the rest.
    Concurrent,
}

/// What [`TieredCache::delete`](crate::tiered::TieredCache::delete) reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Always `true`, whatever the backends reported.
    #[default]
    AlwaysTrue,
    /// `true` only if at least one backend removed an entry.
    AnyRemoved,
}

/// Whether a hit in a slower tier is written back into the faster ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepopulatePolicy {
    #[default]
    Disabled,
    /// After a hit at tier `i`, save the content into tiers `0..i`.
    FasterTiers,
}

/// One backend entry of a [`TieredConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendSpec {
    /// Registry key selecting the factory, e.g. `"memory"`.
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Default lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime_secs: Option<u64>,
    /// Kind-specific settings, left for the factory to interpret.
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl BackendSpec {
    /// Creates a spec for `kind` with no other settings.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime_secs.map(Duration::from_secs)
    }
}

/// Policies plus the ordered list of backends to build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TieredConfig {
    pub broadcast: BroadcastMode,
    pub delete: DeletePolicy,
    pub repopulate: RepopulatePolicy,
    pub backends: Vec<BackendSpec>,
}

impl TieredConfig {
    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Configuration`] if the input is not valid JSON,
    /// if `backends` is present but not an array, or if any field has the
    /// wrong shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use tiercache::config::{DeletePolicy, TieredConfig};
    ///
    /// let config = TieredConfig::from_json(r#"{
    ///     "delete": "any_removed",
    ///     "backends": [{ "kind": "memory" }]
    /// }"#).unwrap();
    /// assert_eq!(config.delete, DeletePolicy::AnyRemoved);
    /// assert_eq!(config.backends.len(), 1);
    /// ```
    pub fn from_json(input: &str) -> CacheResult<Self> {
        let value: serde_json::Value =
            serde_json::from_str(input).map_err(|e| CacheError::Configuration(e.to_string()))?;

        if value.get("backends").is_some_and(|b| !b.is_array()) {
            return Err(CacheError::Configuration(
                "backends must be an array of backend definitions".to_owned(),
            ));
        }

        serde_json::from_value(value).map_err(|e| CacheError::Configuration(e.to_string()))
    }
}

/// Builds a backend from its spec.
pub type BackendFactory = Arc<dyn Fn(&BackendSpec) -> BackendResult<BackendHandle> + Send + Sync>;

/// Maps backend kinds to the factories that construct them.
///
/// [`BackendRegistry::default`] knows the `"memory"` kind; register further
/// kinds with [`register`](Self::register).
#[derive(Clone)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("memory", memory_factory);
        registry
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.factories.keys().collect();
        kinds.sort();
        f.debug_struct("BackendRegistry").field("kinds", &kinds).finish()
    }
}

impl BackendRegistry {
    /// A registry with no kinds at all.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers `factory` for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&BackendSpec) -> BackendResult<BackendHandle> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Builds the backend described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidArgument`] if no factory is registered for
    /// the spec's kind, or if the factory rejects the spec.
    pub fn build(&self, spec: &BackendSpec) -> CacheResult<BackendHandle> {
        let factory = self.factories.get(&spec.kind).ok_or_else(|| {
            CacheError::InvalidArgument(format!(
                "the backend is not valid: no factory registered for kind `{}`",
                spec.kind
            ))
        })?;

        factory(spec).map_err(|e| {
            CacheError::InvalidArgument(format!(
                "backend `{}` must be an instance of a valid backend: {e}",
                spec.kind
            ))
        })
    }
}

fn memory_factory(spec: &BackendSpec) -> BackendResult<BackendHandle> {
    if let Some(option) = spec.options.keys().next() {
        return Err(BackendError::Other(format!(
            "unsupported option `{option}` for the memory backend"
        )));
    }

    let backend = MemoryBackend::new(MemoryOptions {
        prefix: spec.prefix.clone().unwrap_or_default(),
        default_lifetime: spec.lifetime(),
    });
    let backend = match &spec.name {
        Some(name) => backend.with_name(name.clone()),
        None => backend,
    };
    Ok(Arc::new(backend))
}
