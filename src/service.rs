//! Async viewer service
//!
//! Front door for every document operation. Engine work is synchronous and
//! may take a while, so each call runs on the blocking pool under a
//! timeout. Renders carry a [`CancelToken`] that trips when the caller's
//! future is dropped or the timeout fires, so the blocking task stops at
//! its next checkpoint instead of finishing work nobody will read.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::document::{
    DocumentError, DocumentHandle, DocumentRegistry, DocumentResult, OpenedDocument, PageRenderRequest,
    PageSize, RenderConcurrency, TileRequest,
};
use crate::engine::{EngineCapabilities, PdfEngine};
use crate::render::{CancelToken, RasterBuffer, RasterConfig, Rasterizer};

/// Default timeout for opening a document
pub const OPEN_TIMEOUT_SECS: u64 = 30;
/// Default timeout for a single render
pub const RENDER_TIMEOUT_SECS: u64 = 30;

/// Viewer configuration
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub open_timeout: Duration,
    pub render_timeout: Duration,
    pub raster: RasterConfig,
    pub concurrency: RenderConcurrency,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            open_timeout: Duration::from_secs(OPEN_TIMEOUT_SECS),
            render_timeout: Duration::from_secs(RENDER_TIMEOUT_SECS),
            raster: RasterConfig::default(),
            concurrency: RenderConcurrency::default(),
        }
    }
}

/// Cloneable handle to the document registry and rasterizer
pub struct PdfViewer<E: PdfEngine> {
    inner: Arc<ViewerInner<E>>,
}

struct ViewerInner<E: PdfEngine> {
    registry: DocumentRegistry<E>,
    rasterizer: Rasterizer,
    config: ViewerConfig,
}

impl<E: PdfEngine> Clone for PdfViewer<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: PdfEngine> PdfViewer<E> {
    pub fn new(engine: E, config: ViewerConfig) -> Self {
        Self {
            inner: Arc::new(ViewerInner {
                registry: DocumentRegistry::with_concurrency(engine, config.concurrency),
                rasterizer: Rasterizer::new(config.raster),
                config,
            }),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &DocumentRegistry<E> {
        &self.inner.registry
    }

    /// Open `bytes` under `id`, replacing whatever was open there
    pub async fn open_document(
        &self,
        id: impl Into<String>,
        bytes: Vec<u8>,
        password: Option<String>,
    ) -> DocumentResult<OpenedDocument> {
        let id = id.into();
        let cancel = CancelToken::new();
        let guard = cancel.drop_guard();

        let inner = Arc::clone(&self.inner);
        let task_id = id.clone();
        let task_cancel = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            inner
                .registry
                .open_with_cancel(&task_id, bytes, password.as_deref(), &task_cancel)
                .map(|handle| handle.page_count())
        });

        let secs = self.inner.config.open_timeout.as_secs();
        let result = match timeout(self.inner.config.open_timeout, task).await {
            Ok(joined) => joined.map_err(|e| DocumentError::LoadFailed {
                id: id.clone(),
                reason: format!("Task join error: {}", e),
            })?,
            Err(_) => {
                cancel.cancel();
                warn!("Opening '{}' timed out after {}s", id, secs);
                Err(DocumentError::LoadFailed {
                    id: id.clone(),
                    reason: format!("timed out after {} seconds", secs),
                })
            }
        };
        guard.disarm();

        let page_count = result?;
        Ok(OpenedDocument {
            document_id: id,
            page_count,
        })
    }

    /// Natural size of every page, in points
    pub async fn get_page_sizes(&self, id: &str) -> DocumentResult<Vec<PageSize>> {
        let handle = self.inner.registry.get(id)?;
        let task = tokio::task::spawn_blocking(move || handle.page_sizes());

        match timeout(self.inner.config.render_timeout, task).await {
            Ok(joined) => {
                joined.map_err(|e| DocumentError::RenderError(format!("Task join error: {}", e)))?
            }
            Err(_) => Err(DocumentError::Timeout(self.inner.config.render_timeout.as_secs())),
        }
    }

    pub async fn get_pages_width(&self, id: &str) -> DocumentResult<Vec<f32>> {
        let sizes = self.get_page_sizes(id).await?;
        Ok(sizes.iter().map(|size| size.width).collect())
    }

    pub async fn get_pages_height(&self, id: &str) -> DocumentResult<Vec<f32>> {
        let sizes = self.get_page_sizes(id).await?;
        Ok(sizes.iter().map(|size| size.height).collect())
    }

    pub fn get_page_count(&self, id: &str) -> DocumentResult<usize> {
        Ok(self.inner.registry.get(id)?.page_count())
    }

    /// Render a whole page stretched to the requested size
    pub async fn render_page(
        &self,
        id: &str,
        request: PageRenderRequest,
    ) -> DocumentResult<RasterBuffer> {
        debug!(
            "render_page '{}' page {} at {}x{}",
            id, request.page_index, request.width, request.height
        );
        self.run_render(id, CancelToken::new(), move |raster, handle, caps, cancel| {
            raster.render_page(handle, caps, &request, cancel)
        })
        .await
    }

    /// Render a whole page at `zoom` pixels per point
    pub async fn render_page_at_zoom(
        &self,
        id: &str,
        page_index: usize,
        zoom: f32,
    ) -> DocumentResult<RasterBuffer> {
        debug!("render_page_at_zoom '{}' page {} at {}", id, page_index, zoom);
        self.run_render(id, CancelToken::new(), move |raster, handle, caps, cancel| {
            raster.render_page_at_zoom(handle, caps, page_index, zoom, cancel)
        })
        .await
    }

    /// Render a viewport of a page
    pub async fn render_tile(&self, id: &str, request: TileRequest) -> DocumentResult<RasterBuffer> {
        self.render_tile_with_cancel(id, request, CancelToken::new())
            .await
    }

    /// Render a viewport of a page, abandoning it once `cancel` trips
    pub async fn render_tile_with_cancel(
        &self,
        id: &str,
        request: TileRequest,
        cancel: CancelToken,
    ) -> DocumentResult<RasterBuffer> {
        debug!(
            "render_tile '{}' page {} origin ({}, {}) {}x{} scale {}",
            id,
            request.page_index,
            request.origin_x,
            request.origin_y,
            request.width,
            request.height,
            request.scale
        );
        self.run_render(id, cancel, move |raster, handle, caps, cancel| {
            raster.render_tile(handle, caps, &request, cancel)
        })
        .await
    }

    /// Close `id`. Closing an unknown or already closed document succeeds.
    pub async fn close_document(&self, id: &str) -> DocumentResult<()> {
        let inner = Arc::clone(&self.inner);
        let task_id = id.to_string();

        let closed = tokio::task::spawn_blocking(move || inner.registry.close(&task_id))
            .await
            .map_err(|e| DocumentError::RenderError(format!("Task join error: {}", e)))?;

        if !closed {
            debug!("close_document: '{}' was not open", id);
        }
        Ok(())
    }

    /// Close every document and release the engine library
    pub async fn shutdown(&self) -> DocumentResult<()> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.registry.shutdown())
            .await
            .map_err(|e| DocumentError::RenderError(format!("Task join error: {}", e)))
    }

    /// Identities of all open documents, sorted
    pub fn document_ids(&self) -> Vec<String> {
        self.inner.registry.identities()
    }

    async fn run_render<F>(&self, id: &str, cancel: CancelToken, op: F) -> DocumentResult<RasterBuffer>
    where
        F: FnOnce(
                &Rasterizer,
                &DocumentHandle<E::Document>,
                EngineCapabilities,
                &CancelToken,
            ) -> DocumentResult<RasterBuffer>
            + Send
            + 'static,
    {
        let handle = self.inner.registry.get(id)?;
        let guard = cancel.drop_guard();

        let inner = Arc::clone(&self.inner);
        let task_cancel = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            let caps = inner.registry.capabilities();
            op(&inner.rasterizer, &handle, caps, &task_cancel)
        });

        let render_timeout = self.inner.config.render_timeout;
        let result = match timeout(render_timeout, task).await {
            Ok(joined) => {
                joined.map_err(|e| DocumentError::RenderError(format!("Task join error: {}", e)))?
            }
            Err(_) => {
                cancel.cancel();
                warn!("Render of '{}' timed out after {:?}", id, render_timeout);
                Err(DocumentError::Timeout(render_timeout.as_secs()))
            }
        };
        guard.disarm();
        result
    }
}
