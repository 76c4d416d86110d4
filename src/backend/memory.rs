//! Process-local backend holding entries in a `HashMap`.
//!
//! Useful as the fastest tier of a hierarchy and as a stand-in for real
//! stores in tests. Entries expire lazily: nothing sweeps the map, an expired
//! entry is dropped the next time it is looked up.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::trace;

use super::{Backend, BoxFuture, Key, Lifetime};
use crate::error::{BackendError, BackendResult};

/// Construction options for [`MemoryBackend`].
#[derive(Debug, Clone, Default)]
pub struct MemoryOptions {
    /// Prepended to every key before it is stored.
    pub prefix: String,
    /// Lifetime applied when neither the save call nor the staging frame gives one.
    pub default_lifetime: Lifetime,
}

#[derive(Debug)]
struct Entry {
    content: Bytes,
    stored_at: Instant,
    lifetime: Lifetime,
}

impl Entry {
    // `lifetime` overrides the lifetime the entry was stored with.
    fn is_live(&self, now: Instant, lifetime: Lifetime) -> bool {
        match lifetime.or(self.lifetime) {
            Some(ttl) => now.saturating_duration_since(self.stored_at) < ttl,
            None => true,
        }
    }
}

// Staging area opened by `start` and consumed by `save`.
#[derive(Debug)]
struct Frame {
    key: Key,
    lifetime: Lifetime,
    buffer: BytesMut,
}

/// An in-memory [`Backend`].
///
/// # Staging
///
/// [`start`](Backend::start) opens a frame for a key. Content can then be
/// accumulated with [`append`](Self::append) and committed with a
/// [`save`](Backend::save) that omits the key and/or content. A `stop_buffer`
/// of `Some(false)` keeps the frame open after saving; anything else closes it.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use tiercache::backend::{Backend, Key, MemoryBackend, MemoryOptions};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MemoryBackend::new(MemoryOptions::default());
/// let key = Key::from("greeting");
/// backend.save(Some(&key), Some(Bytes::from_static(b"hello")), None, None).await?;
/// assert_eq!(backend.get(&key, None).await?, Some(Bytes::from_static(b"hello")));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryBackend {
    name: String,
    options: MemoryOptions,
    entries: RwLock<HashMap<String, Entry>>,
    frame: Mutex<Option<Frame>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(MemoryOptions::default())
    }
}

impl MemoryBackend {
    /// Creates an empty backend named `"memory"`.
    pub fn new(options: MemoryOptions) -> Self {
        Self {
            name: "memory".to_owned(),
            options,
            entries: RwLock::new(HashMap::new()),
            frame: Mutex::new(None),
        }
    }

    /// Sets the name reported in log fields.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Appends `chunk` to the buffer of the open staging frame.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotStarted`] if no frame is open.
    pub async fn append(&self, chunk: impl AsRef<[u8]>) -> BackendResult<()> {
        let mut frame = self.frame.lock().await;
        let frame = frame.as_mut().ok_or(BackendError::NotStarted)?;
        frame.buffer.extend_from_slice(chunk.as_ref());
        Ok(())
    }

    /// Returns `true` while a staging frame is open.
    pub async fn is_started(&self) -> bool {
        self.frame.lock().await.is_some()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn storage_key(&self, key: &Key) -> String {
        format!("{}{}", self.options.prefix, key)
    }

    async fn lookup(&self, id: &str, lifetime: Lifetime) -> Option<Bytes> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            let entry = entries.get(id)?;
            if entry.is_live(now, lifetime) {
                return Some(entry.content.clone());
            }
            // Stale only under the caller's override: keep it for other readers.
            if entry.is_live(now, None) {
                return None;
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(id).is_some_and(|entry| !entry.is_live(now, None)) {
            entries.remove(id);
            trace!(backend = %self.name, key = id, "purged expired entry");
        }
        None
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn get<'a>(
        &'a self,
        key: &'a Key,
        lifetime: Lifetime,
    ) -> BoxFuture<'a, BackendResult<Option<Bytes>>> {
        Box::pin(async move { Ok(self.lookup(&self.storage_key(key), lifetime).await) })
    }

    fn start<'a>(&'a self, key: &'a Key, lifetime: Lifetime) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            *self.frame.lock().await = Some(Frame {
                key: key.clone(),
                lifetime,
                buffer: BytesMut::new(),
            });
            trace!(backend = %self.name, key = %key, "staging frame opened");
            Ok(())
        })
    }

    fn save<'a>(
        &'a self,
        key: Option<&'a Key>,
        content: Option<Bytes>,
        lifetime: Lifetime,
        stop_buffer: Option<bool>,
    ) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            let mut frame = self.frame.lock().await;
            // The frame only supplies defaults to a save that targets its key.
            let staged = frame.as_ref().filter(|f| key.is_none_or(|k| *k == f.key));

            let key = match key {
                Some(key) => key.clone(),
                None => staged
                    .map(|f| f.key.clone())
                    .ok_or(BackendError::NotStarted)?,
            };
            let content = content.unwrap_or_else(|| {
                staged
                    .map(|f| Bytes::copy_from_slice(&f.buffer))
                    .unwrap_or_default()
            });
            let lifetime = lifetime
                .or_else(|| staged.and_then(|f| f.lifetime))
                .or(self.options.default_lifetime);

            let id = self.storage_key(&key);
            trace!(backend = %self.name, key = %id, bytes = content.len(), "storing entry");
            self.entries.write().await.insert(
                id,
                Entry {
                    content,
                    stored_at: Instant::now(),
                    lifetime,
                },
            );

            if stop_buffer.unwrap_or(true) {
                *frame = None;
            }
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a Key) -> BoxFuture<'a, BackendResult<bool>> {
        Box::pin(async move {
            let removed = self
                .entries
                .write()
                .await
                .remove(&self.storage_key(key))
                .is_some();
            Ok(removed)
        })
    }

    fn exists<'a>(
        &'a self,
        key: Option<&'a Key>,
        lifetime: Lifetime,
    ) -> BoxFuture<'a, BackendResult<bool>> {
        Box::pin(async move {
            let id = match key {
                Some(key) => self.storage_key(key),
                None => match self.frame.lock().await.as_ref() {
                    Some(frame) => self.storage_key(&frame.key),
                    None => return Ok(false),
                },
            };
            Ok(self.lookup(&id, lifetime).await.is_some())
        })
    }
}
