use std::{
    io,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

/// Whole-content byte I/O for one backing resource.
///
/// Wrapping an implementation is also the place to add cross-process locking;
/// the store engine itself assumes exclusive ownership of the resource.
#[async_trait]
pub trait ByteStore: Send + Sync {
    /// Read the full content, `None` if nothing has been written yet.
    async fn read(&self) -> io::Result<Option<Vec<u8>>>;

    /// Replace the full content.
    async fn write(&self, bytes: &[u8]) -> io::Result<()>;
}

/// In-memory backend for tests and ephemeral stores. Clones share content.
#[derive(Debug, Default, Clone)]
pub struct InMemoryByteStore {
    inner: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    content: Option<Vec<u8>>,
    fail_writes: bool,
}

impl InMemoryByteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with existing content, as if a file were already on disk.
    pub fn with_content(bytes: impl Into<Vec<u8>>) -> Self {
        let store = Self::default();
        if let Ok(mut state) = store.inner.lock() {
            state.content = Some(bytes.into());
        }
        store
    }

    /// Current content, if any.
    pub fn content(&self) -> Option<Vec<u8>> {
        self.inner.lock().ok().and_then(|state| state.content.clone())
    }

    /// Make subsequent writes fail with an I/O error.
    pub fn fail_writes(&self, fail: bool) {
        if let Ok(mut state) = self.inner.lock() {
            state.fail_writes = fail;
        }
    }
}

fn poisoned<E: std::fmt::Display>(err: E) -> io::Error {
    io::Error::other(format!("lock poisoned: {err}"))
}

#[async_trait]
impl ByteStore for InMemoryByteStore {
    async fn read(&self) -> io::Result<Option<Vec<u8>>> {
        let state = self.inner.lock().map_err(poisoned)?;
        Ok(state.content.clone())
    }

    async fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.inner.lock().map_err(poisoned)?;
        if state.fail_writes {
            return Err(io::Error::other("injected write failure"));
        }
        state.content = Some(bytes.to_vec());
        Ok(())
    }
}
