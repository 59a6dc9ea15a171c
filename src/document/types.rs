//! Request and response types shared by the registry, rasterizer and adapter

use serde::{Deserialize, Serialize};

pub use crate::engine::PageSize;

/// Result of opening a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedDocument {
    pub document_id: String,
    pub page_count: usize,
}

/// Full-page render into a fixed-size bitmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRenderRequest {
    /// Zero-based page index
    pub page_index: usize,
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
}

impl PageRenderRequest {
    pub fn new(page_index: usize, width: u32, height: u32) -> Self {
        Self {
            page_index,
            width,
            height,
        }
    }
}

/// Render of a viewport of a page at a given scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileRequest {
    /// Zero-based page index
    pub page_index: usize,
    /// Viewport origin in page space (points)
    pub origin_x: f32,
    pub origin_y: f32,
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Uniform page-space to pixel scale
    pub scale: f32,
}

impl TileRequest {
    pub fn new(page_index: usize, origin: (f32, f32), width: u32, height: u32, scale: f32) -> Self {
        Self {
            page_index,
            origin_x: origin.0,
            origin_y: origin.1,
            width,
            height,
            scale,
        }
    }
}
