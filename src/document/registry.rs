//! Document registry
//!
//! Maps caller-supplied identities to resident [`DocumentHandle`]s and owns
//! the process-wide engine lifecycle.
//!
//! # Locking
//!
//! - `documents` is only held for map lookups and swaps, never across an
//!   engine call, so lookups never wait on a document load.
//! - `lifecycle` serializes mutations (install, close, shutdown) and guards
//!   the engine library state. Releasing a replaced handle happens under it,
//!   which waits for that handle's in-flight renders.
//! - `loads` is read-held for a whole open and write-held by shutdown, so the
//!   library is never torn down under a running load. Always taken before
//!   `lifecycle`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{DocumentError, DocumentResult};
use super::handle::DocumentHandle;
use crate::engine::{EngineCapabilities, EngineDocument, PdfEngine};
use crate::render::CancelToken;

/// Shared handle type for an engine
pub type SharedHandle<E> = Arc<DocumentHandle<<E as PdfEngine>::Document>>;

/// How renders against one document are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderConcurrency {
    /// Follow the engine's `reentrant_renders` capability
    #[default]
    Engine,
    /// One render at a time per document
    Serialized,
    /// Unrestricted
    Parallel,
}

impl RenderConcurrency {
    pub fn serializes(self, capabilities: EngineCapabilities) -> bool {
        match self {
            RenderConcurrency::Engine => !capabilities.reentrant_renders,
            RenderConcurrency::Serialized => true,
            RenderConcurrency::Parallel => false,
        }
    }
}

impl FromStr for RenderConcurrency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "engine" => Ok(RenderConcurrency::Engine),
            "serialized" => Ok(RenderConcurrency::Serialized),
            "parallel" => Ok(RenderConcurrency::Parallel),
            other => Err(format!("unknown render concurrency '{}'", other)),
        }
    }
}

impl fmt::Display for RenderConcurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderConcurrency::Engine => write!(f, "engine"),
            RenderConcurrency::Serialized => write!(f, "serialized"),
            RenderConcurrency::Parallel => write!(f, "parallel"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LibraryState {
    Uninitialized,
    Ready,
    ShutDown,
}

/// Registry of open documents over one engine
pub struct DocumentRegistry<E: PdfEngine> {
    engine: E,
    documents: RwLock<HashMap<String, SharedHandle<E>>>,
    lifecycle: Mutex<LibraryState>,
    loads: RwLock<()>,
    concurrency: RenderConcurrency,
}

impl<E: PdfEngine> DocumentRegistry<E> {
    pub fn new(engine: E) -> Self {
        Self::with_concurrency(engine, RenderConcurrency::default())
    }

    pub fn with_concurrency(engine: E, concurrency: RenderConcurrency) -> Self {
        Self {
            engine,
            documents: RwLock::new(HashMap::new()),
            lifecycle: Mutex::new(LibraryState::Uninitialized),
            loads: RwLock::new(()),
            concurrency,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn capabilities(&self) -> EngineCapabilities {
        self.engine.capabilities()
    }

    /// Open `bytes` under `id`, replacing any document already registered
    /// there. Returns the installed handle.
    pub fn open(
        &self,
        id: &str,
        bytes: Vec<u8>,
        password: Option<&str>,
    ) -> DocumentResult<SharedHandle<E>> {
        self.open_with_cancel(id, bytes, password, &CancelToken::new())
    }

    /// Like [`open`](Self::open), but a load that finishes after `cancel`
    /// has tripped is discarded instead of installed.
    pub fn open_with_cancel(
        &self,
        id: &str,
        bytes: Vec<u8>,
        password: Option<&str>,
        cancel: &CancelToken,
    ) -> DocumentResult<SharedHandle<E>> {
        if id.is_empty() {
            return Err(DocumentError::InvalidArgument(
                "document id must not be empty".to_string(),
            ));
        }

        let _loading = self.loads.read();
        self.ensure_initialized(id)?;

        debug!("Loading document '{}' ({} bytes)", id, bytes.len());
        let bytes: Arc<[u8]> = Arc::from(bytes);
        let loaded = self
            .engine
            .load_document(Arc::clone(&bytes), password)
            .map_err(|e| DocumentError::load(id, e))
            .and_then(|session| {
                let page_count = session
                    .page_count()
                    .map_err(|e| DocumentError::load(id, e))?;
                Ok((session, page_count))
            });

        let guard = self.lifecycle.lock();

        // Whatever happens next, the old handle under this id goes away
        if let Some(previous) = self.documents.write().remove(id) {
            warn!("Replacing open document '{}'", id);
            previous.release();
        }

        let (session, page_count) = loaded?;

        if cancel.is_cancelled() {
            return Err(DocumentError::LoadFailed {
                id: id.to_string(),
                reason: "open was abandoned by the caller".to_string(),
            });
        }

        let serialize = self.concurrency.serializes(self.engine.capabilities());
        let handle = Arc::new(DocumentHandle::new(
            id.to_string(),
            bytes,
            session,
            page_count,
            serialize,
        ));
        self.documents
            .write()
            .insert(id.to_string(), Arc::clone(&handle));
        drop(guard);

        info!(
            "Opened document '{}' ({} bytes, {} pages) on {}, serialized renders: {}",
            id,
            handle.byte_len(),
            page_count,
            self.engine.name(),
            handle.serializes_renders()
        );
        Ok(handle)
    }

    /// Live handle for `id`, if any
    pub fn lookup(&self, id: &str) -> Option<SharedHandle<E>> {
        self.documents.read().get(id).cloned()
    }

    /// Live handle for `id`, or `NotFound`
    pub fn get(&self, id: &str) -> DocumentResult<SharedHandle<E>> {
        self.lookup(id)
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))
    }

    /// Close and forget `id`. Returns false if nothing was registered.
    pub fn close(&self, id: &str) -> bool {
        let _state = self.lifecycle.lock();
        let removed = self.documents.write().remove(id);

        match removed {
            Some(handle) => {
                handle.release();
                info!("Closed document '{}'", id);
                true
            }
            None => {
                debug!("Close of unknown document '{}' ignored", id);
                false
            }
        }
    }

    /// Close every document and tear down the engine library
    pub fn shutdown(&self) {
        let _loads = self.loads.write();
        let mut state = self.lifecycle.lock();
        if *state != LibraryState::Ready {
            return;
        }

        let handles: Vec<_> = self.documents.write().drain().collect();
        let count = handles.len();
        for (_, handle) in handles {
            handle.release();
        }

        self.engine.destroy_library();
        *state = LibraryState::ShutDown;
        info!("Registry shut down, closed {} documents", count);
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.documents.read().contains_key(id)
    }

    /// Registered identities, sorted
    pub fn identities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.documents.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn ensure_initialized(&self, id: &str) -> DocumentResult<()> {
        let mut state = self.lifecycle.lock();
        if *state == LibraryState::Ready {
            return Ok(());
        }

        self.engine
            .init_library()
            .map_err(|e| DocumentError::load(id, e))?;

        if *state == LibraryState::ShutDown {
            debug!("Re-initializing {} after shutdown", self.engine.name());
        } else {
            debug!("Initialized {}", self.engine.name());
        }
        *state = LibraryState::Ready;
        Ok(())
    }
}

impl<E: PdfEngine> Drop for DocumentRegistry<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
