//! Resident document handle
//!
//! A handle owns the original document bytes and the engine session opened
//! over them. The session reads lazily from the bytes, so it is always
//! released first: [`DocumentHandle::release`] takes the session out under
//! the write lock (waiting for in-flight renders), and the bytes go away
//! only when the last `Arc<DocumentHandle>` is dropped.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::error::{DocumentError, DocumentResult};
use super::types::PageSize;
use crate::engine::EngineDocument;

pub struct DocumentHandle<D: EngineDocument> {
    id: String,
    page_count: usize,
    // Field order matters: the session is dropped before the bytes
    session: RwLock<Option<D>>,
    /// Held for the whole render when the engine cannot render one
    /// document from several threads
    render_gate: Option<Mutex<()>>,
    bytes: Arc<[u8]>,
}

impl<D: EngineDocument> DocumentHandle<D> {
    pub(crate) fn new(
        id: String,
        bytes: Arc<[u8]>,
        session: D,
        page_count: usize,
        serialize_renders: bool,
    ) -> Self {
        Self {
            id,
            page_count,
            session: RwLock::new(Some(session)),
            render_gate: serialize_renders.then(|| Mutex::new(())),
            bytes,
        }
    }

    /// Caller-supplied identity
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Size of the original document in bytes
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_open(&self) -> bool {
        self.session.read().is_some()
    }

    pub fn serializes_renders(&self) -> bool {
        self.render_gate.is_some()
    }

    /// Run `f` against the live engine session.
    ///
    /// Fails with `NotFound` once the handle has been released. The session
    /// cannot be released while `f` runs.
    pub fn with_session<F, R>(&self, f: F) -> DocumentResult<R>
    where
        F: FnOnce(&D) -> DocumentResult<R>,
    {
        let session = self.session.read();
        let doc = session
            .as_ref()
            .ok_or_else(|| DocumentError::NotFound(self.id.clone()))?;

        let _gate = self.render_gate.as_ref().map(|gate| gate.lock());
        f(doc)
    }

    /// Natural size of every page, in page order
    pub fn page_sizes(&self) -> DocumentResult<Vec<PageSize>> {
        self.with_session(|doc| {
            (0..self.page_count)
                .map(|index| doc.page_size(index).map_err(DocumentError::render))
                .collect()
        })
    }

    /// Close the engine session. Returns false if it was already closed.
    pub(crate) fn release(&self) -> bool {
        let session = self.session.write().take();
        let released = session.is_some();
        drop(session);

        if released {
            tracing::debug!("Released engine session for '{}'", self.id);
        }
        released
    }
}

impl<D: EngineDocument> fmt::Debug for DocumentHandle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("id", &self.id)
            .field("page_count", &self.page_count)
            .field("byte_len", &self.byte_len())
            .field("open", &self.session.try_read().map(|s| s.is_some()))
            .finish()
    }
}

impl<D: EngineDocument> Drop for DocumentHandle<D> {
    fn drop(&mut self) {
        // Explicit so the session never outlives the bytes
        self.session.get_mut().take();
    }
}
