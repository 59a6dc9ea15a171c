//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::engine::PdfEngine;
use crate::service::PdfViewer;

/// Shared application state
pub struct AppState<E: PdfEngine> {
    inner: Arc<AppStateInner<E>>,
}

struct AppStateInner<E: PdfEngine> {
    config: Config,
    viewer: PdfViewer<E>,
}

impl<E: PdfEngine> Clone for AppState<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: PdfEngine> AppState<E> {
    /// Create the state and the viewer behind it
    pub fn new(config: Config, engine: E) -> Self {
        let viewer = PdfViewer::new(engine, config.viewer_config());
        Self {
            inner: Arc::new(AppStateInner { config, viewer }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the PDF viewer
    pub fn viewer(&self) -> &PdfViewer<E> {
        &self.inner.viewer
    }
}
