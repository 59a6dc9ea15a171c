//! MuPDF engine backend
//!
//! MuPDF's `fz_context` is NOT thread-safe. A session keeps only the owned
//! bytes and reopens a fresh `mupdf::Document` for every page it loads, so
//! no MuPDF object ever crosses a thread boundary. Page sizes are measured
//! once at load time.
//!
//! MuPDF writes RGBA directly (device RGB with alpha), so no byte-order
//! reversal is needed or offered.

use std::sync::Arc;

use mupdf::{Colorspace, Device, Document, IRect, Pixmap};

use super::{
    ClipRect, EngineBitmap, EngineCapabilities, EngineDocument, EngineError, EnginePage,
    EngineResult, Matrix, PageSize, PdfEngine, PixelLayout, RenderFlags,
};

const PDF_MIME: &str = "application/pdf";

impl From<mupdf::Error> for EngineError {
    fn from(err: mupdf::Error) -> Self {
        EngineError::Render(err.to_string())
    }
}

/// MuPDF-backed engine
#[derive(Debug, Clone, Copy, Default)]
pub struct MupdfEngine;

impl MupdfEngine {
    pub fn new() -> Self {
        Self
    }
}

impl PdfEngine for MupdfEngine {
    type Document = MupdfSession;

    fn name(&self) -> &'static str {
        "mupdf"
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            reentrant_renders: false,
            reverse_byte_order: false,
        }
    }

    // MuPDF contexts are created lazily per thread by the mupdf crate
    fn init_library(&self) -> EngineResult<()> {
        Ok(())
    }

    fn destroy_library(&self) {}

    fn load_document(
        &self,
        bytes: Arc<[u8]>,
        password: Option<&str>,
    ) -> EngineResult<MupdfSession> {
        let doc = open(&bytes, password)?;

        let count = doc
            .page_count()
            .map_err(|e| EngineError::InvalidDocument(e.to_string()))?;

        let mut page_sizes = Vec::with_capacity(count.max(0) as usize);
        for index in 0..count {
            let bounds = doc
                .load_page(index)
                .and_then(|page| page.bounds())
                .map_err(|_| EngineError::PageLoad(index as usize))?;
            page_sizes.push(PageSize::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0));
        }

        Ok(MupdfSession {
            bytes,
            password: password.map(str::to_string),
            page_sizes,
        })
    }
}

fn open(bytes: &[u8], password: Option<&str>) -> EngineResult<Document> {
    let mut doc = Document::from_bytes(bytes, PDF_MIME)
        .map_err(|e| EngineError::InvalidDocument(e.to_string()))?;

    if doc.needs_password()? {
        let password = password.ok_or(EngineError::PasswordRequired)?;
        if !doc.authenticate(password)? {
            return Err(EngineError::IncorrectPassword);
        }
    }

    Ok(doc)
}

/// Open MuPDF document session
pub struct MupdfSession {
    bytes: Arc<[u8]>,
    password: Option<String>,
    page_sizes: Vec<PageSize>,
}

impl EngineDocument for MupdfSession {
    type Page = MupdfPage;
    type Bitmap = MupdfBitmap;

    fn page_count(&self) -> EngineResult<usize> {
        Ok(self.page_sizes.len())
    }

    fn load_page(&self, index: usize) -> EngineResult<MupdfPage> {
        let size = *self
            .page_sizes
            .get(index)
            .ok_or(EngineError::PageLoad(index))?;

        let document = open(&self.bytes, self.password.as_deref())?;
        let page = document
            .load_page(index as i32)
            .map_err(|_| EngineError::PageLoad(index))?;
        let bounds = page.bounds().map_err(|_| EngineError::PageLoad(index))?;

        Ok(MupdfPage {
            page,
            _document: document,
            origin: (bounds.x0, bounds.y0),
            size,
        })
    }

    fn page_size(&self, index: usize) -> EngineResult<PageSize> {
        self.page_sizes
            .get(index)
            .copied()
            .ok_or(EngineError::PageLoad(index))
    }

    fn create_bitmap(&self, width: u32, height: u32) -> EngineResult<MupdfBitmap> {
        let refused = || EngineError::BitmapAllocation { width, height };
        let w = i32::try_from(width).map_err(|_| refused())?;
        let h = i32::try_from(height).map_err(|_| refused())?;

        let pixmap = Pixmap::new(&Colorspace::device_rgb(), 0, 0, w, h, true)
            .map_err(|_| refused())?;

        Ok(MupdfBitmap {
            pixmap,
            width,
            height,
        })
    }

    fn render(
        &self,
        page: &MupdfPage,
        bitmap: &mut MupdfBitmap,
        matrix: &Matrix,
        clip: &ClipRect,
        _flags: RenderFlags,
    ) -> EngineResult<()> {
        // Page bounds may not start at (0, 0); shift them there first
        let (ox, oy) = page.origin;
        let ctm = mupdf::Matrix::new(
            matrix.a,
            matrix.b,
            matrix.c,
            matrix.d,
            matrix.e - (matrix.a * ox + matrix.c * oy),
            matrix.f - (matrix.b * ox + matrix.d * oy),
        );

        let full = ClipRect::bitmap(bitmap.width, bitmap.height);
        let bounds = clip.intersect(&full);
        if bounds.is_empty() {
            return Ok(());
        }

        // The device must be dropped before the pixmap is read back
        {
            let device = if bounds == full {
                Device::from_pixmap(&bitmap.pixmap)?
            } else {
                let (x0, y0, x1, y1) = bounds.pixel_bounds();
                Device::from_pixmap_with_clip(&bitmap.pixmap, IRect::new(x0, y0, x1, y1))?
            };
            page.page.run(&device, &ctm)?;
        }

        Ok(())
    }
}

/// Loaded MuPDF page together with the document instance it came from
pub struct MupdfPage {
    // Declared before the document so it is dropped first
    page: mupdf::Page,
    _document: Document,
    origin: (f32, f32),
    size: PageSize,
}

impl EnginePage for MupdfPage {
    fn size(&self) -> PageSize {
        self.size
    }
}

/// RGBA MuPDF pixmap
pub struct MupdfBitmap {
    pixmap: Pixmap,
    width: u32,
    height: u32,
}

impl EngineBitmap for MupdfBitmap {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn stride(&self) -> usize {
        self.pixmap.stride() as usize
    }

    fn native_layout(&self) -> PixelLayout {
        PixelLayout::Rgba
    }

    fn fill(&mut self, argb: u32) {
        let [a, r, g, b] = argb.to_be_bytes();
        let stride = self.stride();
        let row_bytes = self.width as usize * 4;
        for row in self.pixmap.samples_mut().chunks_mut(stride) {
            for px in row[..row_bytes.min(row.len())].chunks_exact_mut(4) {
                px.copy_from_slice(&[r, g, b, a]);
            }
        }
    }

    fn buffer(&self) -> &[u8] {
        self.pixmap.samples()
    }
}
