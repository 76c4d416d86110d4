//! The backend capability: the uniform interface every cache tier satisfies.
//!
//! A [`Backend`] is an independent cache store: an in-process map, a network
//! cache, a directory of files. [`TieredCache`](crate::tiered::TieredCache)
//! only ever talks to backends through this trait and never learns how a
//! backend stores, expires, or serializes anything.
//!
//! ## Core types
//!
//! - [`Backend`]: the five-operation capability.
//! - [`BackendHandle`]: shared, type-erased handle stored by the aggregator.
//! - [`Key`]: string or integer cache key.
//! - [`Lifetime`]: optional per-operation expiry override.
//! - [`BoxFuture`]: the pinned, `Send` future every operation returns.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::BackendResult;

pub mod memory;

pub use memory::{MemoryBackend, MemoryOptions};

/// Heap-allocated, `Send` future returned by every [`Backend`] operation.
///
/// Boxing keeps [`Backend`] object-safe so tiers of different concrete types
/// can live side by side in one `Vec<Arc<dyn Backend>>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Shared handle to a backend. Cloning is cheap and the same backend may be
/// registered in several aggregators at once.
pub type BackendHandle = Arc<dyn Backend>;

/// Optional expiry override. `None` means "use the backend's own default".
pub type Lifetime = Option<Duration>;

/// A cache key: either a string or an integer identifier.
///
/// # Examples
///
/// ```
/// use tiercache::backend::Key;
///
/// assert_eq!(Key::from("users:42").to_string(), "users:42");
/// assert_eq!(Key::from(42).to_string(), "42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Str(String),
    Int(i64),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Self::Int(n.into())
    }
}

/// The capability every cache tier implements.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync`; one backend may be shared by
///   several aggregators and used from many tasks.
/// - `get` returns `Ok(None)` for a miss. A miss is not an error.
/// - `save` receives every argument exactly as the caller passed it to the
///   aggregator. A `None` key or content refers to whatever the backend's own
///   staging convention established with `start`. `stop_buffer` is opaque to
///   the aggregator; `None` is conventionally treated as `Some(true)`.
/// - `delete` reports whether anything was removed. The aggregator may
///   discard that answer depending on its [`DeletePolicy`](crate::config::DeletePolicy).
pub trait Backend: Send + Sync {
    /// Short label used in log fields.
    fn name(&self) -> &str {
        "backend"
    }

    /// Fetch the content stored under `key`, or `None` on a miss.
    fn get<'a>(
        &'a self,
        key: &'a Key,
        lifetime: Lifetime,
    ) -> BoxFuture<'a, BackendResult<Option<Bytes>>>;

    /// Prepare the backend for a forthcoming staged write of `key`.
    fn start<'a>(&'a self, key: &'a Key, lifetime: Lifetime)
    -> BoxFuture<'a, BackendResult<()>>;

    /// Store `content` under `key`.
    fn save<'a>(
        &'a self,
        key: Option<&'a Key>,
        content: Option<Bytes>,
        lifetime: Lifetime,
        stop_buffer: Option<bool>,
    ) -> BoxFuture<'a, BackendResult<()>>;

    /// Remove `key`, returning `true` if an entry was removed.
    fn delete<'a>(&'a self, key: &'a Key) -> BoxFuture<'a, BackendResult<bool>>;

    /// Report whether a live entry exists for `key`.
    fn exists<'a>(
        &'a self,
        key: Option<&'a Key>,
        lifetime: Lifetime,
    ) -> BoxFuture<'a, BackendResult<bool>>;
}

impl fmt::Debug for dyn Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Backend").field(&self.name()).finish()
    }
}
