//! Page and tile rasterization
//!
//! Every render runs the same pipeline against a live document session:
//!
//! 1. validate the request and bound the bitmap size
//! 2. load the page (first cancellation checkpoint)
//! 3. allocate a bitmap and fill it opaque white
//! 4. pick a normalization plan for the engine's byte order
//! 5. render through the request's matrix and clip (second checkpoint)
//! 6. copy out tight RGBA rows (third checkpoint)
//!
//! Pages and bitmaps are locals, so they are released on every exit path.

use tracing::debug;

use super::buffer::RasterBuffer;
use super::cancel::CancelToken;
use super::pixel::{self, NormalizationPlan};
use crate::document::{DocumentError, DocumentHandle, DocumentResult, PageRenderRequest, TileRequest};
use crate::engine::{
    ClipRect, EngineBitmap, EngineCapabilities, EngineDocument, EnginePage, Matrix, PageSize,
    RenderFlags,
};

/// Opaque white, `0xAARRGGBB`
const BACKGROUND: u32 = 0xFFFF_FFFF;

/// Lowest effective zoom for zoom renders
pub const DEFAULT_MIN_ZOOM: f32 = 1.75;

/// 8192 x 8192
pub const DEFAULT_MAX_BITMAP_PIXELS: u64 = 64 * 1024 * 1024;

/// Rasterizer settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterConfig {
    /// Zoom renders never go below this
    pub min_zoom: f32,
    /// Largest bitmap a single render may allocate
    pub max_bitmap_pixels: u64,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            min_zoom: DEFAULT_MIN_ZOOM,
            max_bitmap_pixels: DEFAULT_MAX_BITMAP_PIXELS,
        }
    }
}

/// Stateless render pipeline
#[derive(Debug, Clone, Default)]
pub struct Rasterizer {
    config: RasterConfig,
}

impl Rasterizer {
    pub fn new(config: RasterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RasterConfig {
        &self.config
    }

    /// Render the whole page stretched to exactly `width` x `height`
    pub fn render_page<D: EngineDocument>(
        &self,
        handle: &DocumentHandle<D>,
        capabilities: EngineCapabilities,
        request: &PageRenderRequest,
        cancel: &CancelToken,
    ) -> DocumentResult<RasterBuffer> {
        let (width, height) = (request.width, request.height);
        self.check_dimensions(width, height)?;

        handle.with_session(|doc| {
            check_page(request.page_index, handle.page_count())?;
            self.rasterize(doc, capabilities, request.page_index, width, height, cancel, |size| {
                full_page_layout(size, width, height)
            })
        })
    }

    /// Render the whole page at `zoom` pixels per point, never below the
    /// configured minimum zoom
    pub fn render_page_at_zoom<D: EngineDocument>(
        &self,
        handle: &DocumentHandle<D>,
        capabilities: EngineCapabilities,
        page_index: usize,
        zoom: f32,
        cancel: &CancelToken,
    ) -> DocumentResult<RasterBuffer> {
        if !zoom.is_finite() || zoom <= 0.0 {
            return Err(DocumentError::InvalidArgument(format!(
                "zoom must be positive, got {}",
                zoom
            )));
        }
        let zoom = self.effective_zoom(zoom);

        handle.with_session(|doc| {
            check_page(page_index, handle.page_count())?;
            let size = doc.page_size(page_index).map_err(DocumentError::render)?;
            let (width, height) = zoom_dimensions(size, zoom)?;
            self.check_dimensions(width, height)?;

            debug!(
                "Zoom render of page {} at {} -> {}x{}",
                page_index, zoom, width, height
            );
            self.rasterize(doc, capabilities, page_index, width, height, cancel, |size| {
                full_page_layout(size, width, height)
            })
        })
    }

    /// Render a `width` x `height` viewport whose top-left corner sits at
    /// the request origin in page space
    pub fn render_tile<D: EngineDocument>(
        &self,
        handle: &DocumentHandle<D>,
        capabilities: EngineCapabilities,
        request: &TileRequest,
        cancel: &CancelToken,
    ) -> DocumentResult<RasterBuffer> {
        let TileRequest {
            page_index,
            origin_x,
            origin_y,
            width,
            height,
            scale,
        } = *request;

        if !scale.is_finite() || scale <= 0.0 {
            return Err(DocumentError::InvalidArgument(format!(
                "scale must be positive, got {}",
                scale
            )));
        }
        if !origin_x.is_finite() || !origin_y.is_finite() {
            return Err(DocumentError::InvalidArgument(
                "tile origin must be finite".to_string(),
            ));
        }
        self.check_dimensions(width, height)?;

        let matrix = Matrix::viewport(origin_x, origin_y, scale);
        let clip = ClipRect::new(0.0, 0.0, width as f32 * scale, height as f32 * scale);

        handle.with_session(|doc| {
            check_page(page_index, handle.page_count())?;
            self.rasterize(doc, capabilities, page_index, width, height, cancel, |_| {
                Ok((matrix, clip))
            })
        })
    }

    pub fn effective_zoom(&self, zoom: f32) -> f32 {
        zoom.max(self.config.min_zoom)
    }

    fn check_dimensions(&self, width: u32, height: u32) -> DocumentResult<()> {
        if width == 0 || height == 0 {
            return Err(DocumentError::InvalidArgument(format!(
                "bitmap dimensions must be positive, got {}x{}",
                width, height
            )));
        }

        let pixels = width as u64 * height as u64;
        let fits = pixels <= self.config.max_bitmap_pixels
            && pixels
                .checked_mul(4)
                .and_then(|bytes| usize::try_from(bytes).ok())
                .is_some();
        if !fits {
            return Err(DocumentError::BitmapAllocation { width, height });
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn rasterize<D, F>(
        &self,
        doc: &D,
        capabilities: EngineCapabilities,
        page_index: usize,
        width: u32,
        height: u32,
        cancel: &CancelToken,
        layout: F,
    ) -> DocumentResult<RasterBuffer>
    where
        D: EngineDocument,
        F: FnOnce(PageSize) -> DocumentResult<(Matrix, ClipRect)>,
    {
        cancel.check()?;
        let page = doc.load_page(page_index).map_err(DocumentError::render)?;
        let (matrix, clip) = layout(page.size())?;

        let mut bitmap = doc.create_bitmap(width, height).map_err(|e| {
            debug!("Engine refused {}x{} bitmap: {}", width, height, e);
            DocumentError::BitmapAllocation { width, height }
        })?;
        bitmap.fill(BACKGROUND);

        let plan = NormalizationPlan::for_engine(bitmap.native_layout(), capabilities);
        let flags = RenderFlags {
            reverse_byte_order: plan.reverse_in_engine,
        };
        let clip = clip.intersect(&ClipRect::bitmap(width, height));

        cancel.check()?;
        doc.render(&page, &mut bitmap, &matrix, &clip, flags)
            .map_err(DocumentError::render)?;

        cancel.check()?;
        let pixels = pixel::copy_rows(
            bitmap.buffer(),
            bitmap.stride(),
            width,
            height,
            plan.swap_on_copy,
        )?;
        RasterBuffer::from_rgba(width, height, pixels)
    }
}

fn check_page(index: usize, count: usize) -> DocumentResult<()> {
    if index >= count {
        return Err(DocumentError::PageOutOfRange { index, count });
    }
    Ok(())
}

fn full_page_layout(size: PageSize, width: u32, height: u32) -> DocumentResult<(Matrix, ClipRect)> {
    if !(size.width > 0.0 && size.height > 0.0) {
        return Err(DocumentError::RenderError(format!(
            "page has no area ({}x{})",
            size.width, size.height
        )));
    }
    Ok((
        Matrix::scale(width as f32 / size.width, height as f32 / size.height),
        ClipRect::bitmap(width, height),
    ))
}

/// Pixel dimensions of a page rendered at `zoom`: `floor(points * zoom)`,
/// at least one pixel
pub fn zoom_dimensions(size: PageSize, zoom: f32) -> DocumentResult<(u32, u32)> {
    let scaled = |points: f32| {
        let pixels = (points as f64 * zoom as f64).floor();
        if pixels.is_finite() && pixels <= u32::MAX as f64 {
            Some((pixels as u32).max(1))
        } else {
            None
        }
    };

    match (scaled(size.width), scaled(size.height)) {
        (Some(width), Some(height)) => Ok((width, height)),
        _ => Err(DocumentError::BitmapAllocation {
            width: u32::MAX,
            height: u32::MAX,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::document::{DocumentRegistry, ErrorKind};
    use crate::engine::fake::{FakeEngine, FakePdf};
    use crate::engine::PdfEngine;

    type FakeHandle = Arc<DocumentHandle<<FakeEngine as PdfEngine>::Document>>;

    fn open(engine: &FakeEngine, pdf: FakePdf) -> (DocumentRegistry<FakeEngine>, FakeHandle) {
        let registry = DocumentRegistry::new(engine.clone());
        let handle = registry.open("doc", pdf.to_bytes(), None).unwrap();
        (registry, handle)
    }

    fn caps(engine: &FakeEngine) -> EngineCapabilities {
        engine.capabilities()
    }

    #[test]
    fn test_full_page_is_opaque_rgba() {
        let engine = FakeEngine::new();
        let (_registry, handle) = open(&engine, FakePdf::uniform(3, 612.0, 792.0));

        let buffer = Rasterizer::default()
            .render_page(
                &handle,
                caps(&engine),
                &PageRenderRequest::new(0, 300, 400),
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!((buffer.width(), buffer.height()), (300, 400));
        assert_eq!(buffer.stride(), 1200);
        assert_eq!(buffer.as_bytes().len(), 300 * 400 * 4);
        assert!(buffer.is_opaque());
        assert!(engine.stats().render_resources_balanced());
    }

    #[test]
    fn test_content_lands_in_the_middle() {
        let engine = FakeEngine::new();
        let (_registry, handle) = open(
            &engine,
            FakePdf::new().colored_page(100.0, 100.0, [0xFF, 0x00, 0x00]),
        );

        let buffer = Rasterizer::default()
            .render_page(
                &handle,
                caps(&engine),
                &PageRenderRequest::new(0, 100, 100),
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(buffer.pixel(50, 50), Some([0xFF, 0x00, 0x00, 0xFF]));
        assert_eq!(buffer.pixel(5, 5), Some([0xFF, 0xFF, 0xFF, 0xFF]));
        assert_eq!(buffer.pixel(95, 50), Some([0xFF, 0xFF, 0xFF, 0xFF]));
    }

    #[test]
    fn test_both_normalization_paths_agree() {
        let pdf = FakePdf::new().colored_page(64.0, 48.0, [0x12, 0x34, 0x56]);

        let reversing = FakeEngine::new();
        let swapping = FakeEngine::new().with_capabilities(EngineCapabilities {
            reentrant_renders: true,
            reverse_byte_order: false,
        });

        let render = |engine: &FakeEngine| {
            let (_registry, handle) = open(engine, pdf.clone());
            Rasterizer::default()
                .render_page(
                    &handle,
                    caps(engine),
                    &PageRenderRequest::new(0, 64, 48),
                    &CancelToken::new(),
                )
                .unwrap()
        };

        let a = render(&reversing);
        let b = render(&swapping);
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.pixel(32, 24), Some([0x12, 0x34, 0x56, 0xFF]));
    }

    #[test]
    fn test_tile_matches_full_page_pixels() {
        let engine = FakeEngine::new();
        let (_registry, handle) = open(
            &engine,
            FakePdf::new().colored_page(100.0, 80.0, [0x00, 0x80, 0xFF]),
        );
        let rasterizer = Rasterizer::default();
        let cancel = CancelToken::new();

        let page = rasterizer
            .render_page(&handle, caps(&engine), &PageRenderRequest::new(0, 200, 160), &cancel)
            .unwrap();
        let tile = rasterizer
            .render_tile(
                &handle,
                caps(&engine),
                &TileRequest::new(0, (25.0, 20.0), 64, 48, 2.0),
                &cancel,
            )
            .unwrap();

        for y in 0..48 {
            for x in 0..64 {
                assert_eq!(tile.pixel(x, y), page.pixel(x + 50, y + 40), "pixel ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_unit_scale_tile_equals_page() {
        let engine = FakeEngine::new();
        let (_registry, handle) = open(
            &engine,
            FakePdf::new().colored_page(100.0, 80.0, [0x40, 0x20, 0x10]),
        );
        let rasterizer = Rasterizer::default();
        let cancel = CancelToken::new();

        let page = rasterizer
            .render_page(&handle, caps(&engine), &PageRenderRequest::new(0, 100, 80), &cancel)
            .unwrap();
        let tile = rasterizer
            .render_tile(
                &handle,
                caps(&engine),
                &TileRequest::new(0, (0.0, 0.0), 100, 80, 1.0),
                &cancel,
            )
            .unwrap();

        assert_eq!(page, tile);
    }

    #[test]
    fn test_page_out_of_range() {
        let engine = FakeEngine::new();
        let (_registry, handle) = open(&engine, FakePdf::uniform(3, 612.0, 792.0));

        let err = Rasterizer::default()
            .render_page(
                &handle,
                caps(&engine),
                &PageRenderRequest::new(3, 10, 10),
                &CancelToken::new(),
            )
            .unwrap_err();

        assert!(matches!(err, DocumentError::PageOutOfRange { index: 3, count: 3 }));
        assert_eq!(err.kind(), ErrorKind::RenderFailure);
        assert_eq!(engine.stats().pages_opened, 0);
    }

    #[test]
    fn test_broken_page_fails_cleanly() {
        let engine = FakeEngine::new();
        let (_registry, handle) = open(&engine, FakePdf::new().page(10.0, 10.0).broken_page());

        let err = Rasterizer::default()
            .render_page(
                &handle,
                caps(&engine),
                &PageRenderRequest::new(1, 10, 10),
                &CancelToken::new(),
            )
            .unwrap_err();

        assert!(matches!(err, DocumentError::PageLoad(1)));
        assert!(engine.stats().render_resources_balanced());
    }

    #[test]
    fn test_invalid_arguments() {
        let engine = FakeEngine::new();
        let (_registry, handle) = open(&engine, FakePdf::uniform(1, 100.0, 100.0));
        let rasterizer = Rasterizer::default();
        let cancel = CancelToken::new();

        let zero = rasterizer
            .render_page(&handle, caps(&engine), &PageRenderRequest::new(0, 0, 10), &cancel)
            .unwrap_err();
        assert_eq!(zero.kind(), ErrorKind::InvalidArgument);

        let nan_scale = rasterizer
            .render_tile(
                &handle,
                caps(&engine),
                &TileRequest::new(0, (0.0, 0.0), 10, 10, f32::NAN),
                &cancel,
            )
            .unwrap_err();
        assert_eq!(nan_scale.kind(), ErrorKind::InvalidArgument);

        let bad_origin = rasterizer
            .render_tile(
                &handle,
                caps(&engine),
                &TileRequest::new(0, (f32::INFINITY, 0.0), 10, 10, 1.0),
                &cancel,
            )
            .unwrap_err();
        assert_eq!(bad_origin.kind(), ErrorKind::InvalidArgument);

        let negative_zoom = rasterizer
            .render_page_at_zoom(&handle, caps(&engine), 0, -1.0, &cancel)
            .unwrap_err();
        assert_eq!(negative_zoom.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_bitmap_limits() {
        let engine = FakeEngine::new().with_max_bitmap_pixels(100);
        let (_registry, handle) = open(&engine, FakePdf::uniform(1, 100.0, 100.0));
        let cancel = CancelToken::new();

        let capped = Rasterizer::new(RasterConfig {
            max_bitmap_pixels: 1000,
            ..RasterConfig::default()
        });
        let err = capped
            .render_page(&handle, caps(&engine), &PageRenderRequest::new(0, 100, 100), &cancel)
            .unwrap_err();
        assert!(matches!(err, DocumentError::BitmapAllocation { width: 100, height: 100 }));

        // Within the rasterizer's cap but refused by the engine
        let err = capped
            .render_page(&handle, caps(&engine), &PageRenderRequest::new(0, 20, 20), &cancel)
            .unwrap_err();
        assert!(matches!(err, DocumentError::BitmapAllocation { width: 20, height: 20 }));
        assert!(engine.stats().render_resources_balanced());
    }

    #[test]
    fn test_zoom_is_floored_at_minimum() {
        let engine = FakeEngine::new();
        let (_registry, handle) = open(&engine, FakePdf::uniform(1, 100.0, 200.0));
        let rasterizer = Rasterizer::default();
        let cancel = CancelToken::new();

        let low = rasterizer
            .render_page_at_zoom(&handle, caps(&engine), 0, 1.0, &cancel)
            .unwrap();
        assert_eq!((low.width(), low.height()), (175, 350));

        let high = rasterizer
            .render_page_at_zoom(&handle, caps(&engine), 0, 2.0, &cancel)
            .unwrap();
        assert_eq!((high.width(), high.height()), (200, 400));
    }

    #[test]
    fn test_zoom_dimensions() {
        assert_eq!(
            zoom_dimensions(PageSize::new(612.0, 792.0), 1.75).unwrap(),
            (1071, 1386)
        );
        assert_eq!(zoom_dimensions(PageSize::new(0.1, 0.1), 1.0).unwrap(), (1, 1));
        assert!(zoom_dimensions(PageSize::new(1.0e30, 1.0), 1.0e10).is_err());
    }

    #[test]
    fn test_cancelled_render_releases_resources() {
        let engine = FakeEngine::new();
        let (_registry, handle) = open(&engine, FakePdf::uniform(1, 100.0, 100.0));
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = Rasterizer::default()
            .render_page(&handle, caps(&engine), &PageRenderRequest::new(0, 10, 10), &cancel)
            .unwrap_err();

        assert!(matches!(err, DocumentError::Cancelled));
        assert_eq!(err.kind(), ErrorKind::RenderFailure);
        let stats = engine.stats();
        assert_eq!(stats.renders, 0);
        assert!(stats.render_resources_balanced());
    }

    #[test]
    fn test_render_after_close_is_not_found() {
        let engine = FakeEngine::new();
        let (registry, handle) = open(&engine, FakePdf::uniform(1, 100.0, 100.0));
        registry.close("doc");

        let err = Rasterizer::default()
            .render_page(&handle, caps(&engine), &PageRenderRequest::new(0, 10, 10), &CancelToken::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_repeated_renders_balance_resources() {
        let engine = FakeEngine::new();
        let (_registry, handle) = open(&engine, FakePdf::uniform(2, 50.0, 50.0));
        let rasterizer = Rasterizer::default();
        let cancel = CancelToken::new();

        for i in 0..50 {
            let request = TileRequest::new(i % 2, (i as f32, 0.0), 16, 16, 1.5);
            rasterizer
                .render_tile(&handle, caps(&engine), &request, &cancel)
                .unwrap();
        }

        let stats = engine.stats();
        assert_eq!(stats.renders, 50);
        assert_eq!(stats.pages_opened, 50);
        assert!(stats.render_resources_balanced());
    }
}
