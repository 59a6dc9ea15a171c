//! PDF engine capability boundary
//!
//! The registry and rasterizer never talk to a concrete PDF library. They
//! consume the narrow surface defined here: open a document from memory,
//! count and measure pages, allocate a bitmap, and rasterize a page into it
//! through an affine matrix and a clip rectangle.
//!
//! # Resource model
//!
//! Every engine resource is released by `Drop`:
//!
//! ```text
//! PdfEngine ──load_document──▶ EngineDocument   (drop = close document)
//!                                 │
//!                  load_page ─────┼───── create_bitmap
//!                                 ▼                ▼
//!                            EnginePage       EngineBitmap
//!                        (drop = close page) (drop = destroy bitmap)
//! ```
//!
//! Render code holds pages and bitmaps as locals, so they are released on
//! success, on `?` early returns, and while unwinding.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod fake;
#[cfg(feature = "mupdf")]
pub mod mupdf;

/// Errors raised at the engine boundary
#[derive(Debug, Error)]
pub enum EngineError {
    /// Process-wide library initialization failed
    #[error("Engine library error: {0}")]
    Library(String),

    /// Bytes are not a document the engine understands
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Document is encrypted and no password was supplied
    #[error("Document is encrypted and requires a password")]
    PasswordRequired,

    /// Supplied password was rejected
    #[error("Incorrect password")]
    IncorrectPassword,

    /// Page handle could not be obtained
    #[error("Failed to load page {0}")]
    PageLoad(usize),

    /// Bitmap could not be allocated
    #[error("Failed to allocate {width}x{height} bitmap")]
    BitmapAllocation { width: u32, height: u32 },

    /// Rasterization failed inside the engine
    #[error("Render failed: {0}")]
    Render(String),
}

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Page dimensions in points (1/72 inch)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Affine transform from page space to device space
///
/// Uses the PDF convention: a point `(x, y)` maps to
/// `(a*x + c*y + e, b*x + d*y + f)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

    pub const fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Uniform scale followed by a translation that moves `origin`
    /// (in page space) to device pixel (0, 0).
    pub fn viewport(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self::new(scale, 0.0, 0.0, scale, -origin_x * scale, -origin_y * scale)
    }

    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Inverse transform, or `None` for a degenerate matrix
    pub fn invert(&self) -> Option<Matrix> {
        let det = self.a * self.d - self.b * self.c;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let a = self.d / det;
        let b = -self.b / det;
        let c = -self.c / det;
        let d = self.a / det;
        let e = -(self.e * a + self.f * c);
        let f = -(self.e * b + self.f * d);
        Some(Matrix::new(a, b, c, d, e, f))
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Clip rectangle in device space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl ClipRect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Clip covering a whole `width` x `height` bitmap
    pub fn bitmap(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    pub fn intersect(&self, other: &ClipRect) -> ClipRect {
        ClipRect {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Integer pixel bounds `(x0, y0, x1, y1)` covered by this clip
    pub fn pixel_bounds(&self) -> (i32, i32, i32, i32) {
        (
            self.left.floor() as i32,
            self.top.floor() as i32,
            self.right.ceil() as i32,
            self.bottom.ceil() as i32,
        )
    }
}

/// Byte order of a 4-byte pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Bgra,
    Rgba,
}

impl PixelLayout {
    pub fn reversed(self) -> Self {
        match self {
            PixelLayout::Bgra => PixelLayout::Rgba,
            PixelLayout::Rgba => PixelLayout::Bgra,
        }
    }
}

impl fmt::Display for PixelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelLayout::Bgra => write!(f, "bgra8888"),
            PixelLayout::Rgba => write!(f, "rgba8888"),
        }
    }
}

/// Flags passed to the engine for a single render
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderFlags {
    /// Ask the engine to emit the reverse of its native byte order
    pub reverse_byte_order: bool,
}

/// What an engine can promise about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCapabilities {
    /// Concurrent renders against one open document are safe
    pub reentrant_renders: bool,
    /// `RenderFlags::reverse_byte_order` is honored
    pub reverse_byte_order: bool,
}

/// Process-wide engine entry point
pub trait PdfEngine: Send + Sync + 'static {
    type Document: EngineDocument;

    /// Short name for logs
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> EngineCapabilities;

    /// Initialize process-wide library state. Must tolerate repeated calls.
    fn init_library(&self) -> EngineResult<()>;

    /// Tear down process-wide library state.
    fn destroy_library(&self);

    /// Open a document that reads lazily from `bytes`.
    ///
    /// The returned session may keep a clone of `bytes`; the caller keeps its
    /// own reference alive for at least as long as the session.
    fn load_document(
        &self,
        bytes: Arc<[u8]>,
        password: Option<&str>,
    ) -> EngineResult<Self::Document>;
}

/// An open engine document session. Dropping it closes the session.
pub trait EngineDocument: Send + Sync + 'static {
    type Page: EnginePage;
    type Bitmap: EngineBitmap;

    fn page_count(&self) -> EngineResult<usize>;

    fn load_page(&self, index: usize) -> EngineResult<Self::Page>;

    /// Natural page size in points
    fn page_size(&self, index: usize) -> EngineResult<PageSize> {
        Ok(self.load_page(index)?.size())
    }

    fn create_bitmap(&self, width: u32, height: u32) -> EngineResult<Self::Bitmap>;

    /// Rasterize `page` into `bitmap` through `matrix`, limited to `clip`.
    fn render(
        &self,
        page: &Self::Page,
        bitmap: &mut Self::Bitmap,
        matrix: &Matrix,
        clip: &ClipRect,
        flags: RenderFlags,
    ) -> EngineResult<()>;
}

/// A loaded page. Dropping it closes the page.
pub trait EnginePage {
    fn size(&self) -> PageSize;
}

/// A 4-byte-per-pixel bitmap. Dropping it destroys the bitmap.
pub trait EngineBitmap {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Bytes per row, at least `width * 4`
    fn stride(&self) -> usize;

    /// Byte order the engine writes when no reverse flag is given
    fn native_layout(&self) -> PixelLayout;

    /// Fill every pixel with an `0xAARRGGBB` color
    fn fill(&mut self, argb: u32);

    fn buffer(&self) -> &[u8];
}
