//! # tiercache
//!
//! Compose an ordered list of independent cache backends (fast in-memory,
//! slower network, slow disk) into one logical cache.
//!
//! Reads consult the tiers fastest first and return the first hit. Writes,
//! staged-write starts, and deletions fan out to every tier. Existence checks
//! stop at the first tier that has the key. Each tier keeps its own storage
//! and expiry rules; the aggregator only speaks the [`Backend`] capability.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use tiercache::{Key, MemoryBackend, TieredCache};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tiercache::CacheError> {
//! // Backends are registered from the fastest to the slowest.
//! let cache = TieredCache::new()
//!     .with_backend(Arc::new(MemoryBackend::default().with_name("l1")))
//!     .with_backend(Arc::new(MemoryBackend::default().with_name("l2")));
//!
//! let key = Key::from("my-key");
//! cache.save(Some(&key), Some(Bytes::from_static(b"data")), None, None).await?;
//! assert!(cache.exists(Some(&key), None).await?);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod tiered;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use backend::{Backend, BackendHandle, Key, Lifetime, MemoryBackend, MemoryOptions};
pub use config::{
    BackendRegistry, BackendSpec, BroadcastMode, DeletePolicy, RepopulatePolicy, TieredConfig,
};
pub use error::{BackendError, CacheError};
pub use tiered::TieredCache;
