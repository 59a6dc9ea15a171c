//! Deterministic in-memory engine
//!
//! Understands a tiny line-based document format instead of PDF, paints a
//! solid content box in the middle of every page, and counts every resource
//! it hands out. Tests use the counters to prove that documents, pages and
//! bitmaps are released on every path; benches use it to measure the
//! rasterization pipeline without a real PDF library.
//!
//! ```text
//! %FAKEPDF-1
//! password secret
//! page 612 792
//! page 612 792 #ff0000
//! page broken
//! ```
//!
//! Each page paints the rectangle spanning the middle half of the page in
//! its color (black by default). Everything outside it stays untouched, the
//! same way transparent PDF content leaves the background visible.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{
    ClipRect, EngineBitmap, EngineCapabilities, EngineDocument, EngineError, EnginePage,
    EngineResult, Matrix, PageSize, PdfEngine, PixelLayout, RenderFlags,
};

const MAGIC: &str = "%FAKEPDF-1";

/// Extra bytes appended to every bitmap row so callers must honor the stride
const ROW_PADDING: usize = 8;

/// Builds documents in the fake engine's format
#[derive(Debug, Clone, Default)]
pub struct FakePdf {
    password: Option<String>,
    pages: Vec<String>,
}

impl FakePdf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Document with `count` identical pages
    pub fn uniform(count: usize, width: f32, height: f32) -> Self {
        (0..count).fold(Self::new(), |pdf, _| pdf.page(width, height))
    }

    pub fn page(mut self, width: f32, height: f32) -> Self {
        self.pages.push(format!("page {} {}", width, height));
        self
    }

    pub fn colored_page(mut self, width: f32, height: f32, rgb: [u8; 3]) -> Self {
        self.pages.push(format!(
            "page {} {} #{:02x}{:02x}{:02x}",
            width, height, rgb[0], rgb[1], rgb[2]
        ));
        self
    }

    /// A page the engine refuses to load
    pub fn broken_page(mut self) -> Self {
        self.pages.push("page broken".to_string());
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::from(MAGIC);
        out.push('\n');
        if let Some(password) = &self.password {
            out.push_str(&format!("password {}\n", password));
        }
        for page in &self.pages {
            out.push_str(page);
            out.push('\n');
        }
        out.into_bytes()
    }
}

/// Resource counters shared by an engine and everything it creates
#[derive(Debug, Default)]
struct FakeCounters {
    library_inits: AtomicUsize,
    library_destroys: AtomicUsize,
    loads_without_library: AtomicUsize,
    documents_opened: AtomicUsize,
    documents_closed: AtomicUsize,
    pages_opened: AtomicUsize,
    pages_closed: AtomicUsize,
    bitmaps_created: AtomicUsize,
    bitmaps_destroyed: AtomicUsize,
    renders: AtomicUsize,
    renders_in_flight: AtomicUsize,
    max_renders_in_flight: AtomicUsize,
}

/// Point-in-time copy of the engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FakeStats {
    pub library_inits: usize,
    pub library_destroys: usize,
    /// Loads that ran while the library was torn down
    pub loads_without_library: usize,
    pub documents_opened: usize,
    pub documents_closed: usize,
    pub pages_opened: usize,
    pub pages_closed: usize,
    pub bitmaps_created: usize,
    pub bitmaps_destroyed: usize,
    pub renders: usize,
    pub max_renders_in_flight: usize,
}

impl FakeStats {
    pub fn open_documents(&self) -> usize {
        self.documents_opened - self.documents_closed
    }

    /// No page or bitmap outlived its render
    pub fn render_resources_balanced(&self) -> bool {
        self.pages_opened == self.pages_closed && self.bitmaps_created == self.bitmaps_destroyed
    }
}

#[derive(Debug, Clone, Copy)]
struct FakeConfig {
    capabilities: EngineCapabilities,
    render_delay: Duration,
    load_delay: Duration,
    max_bitmap_pixels: u64,
    fail_init: bool,
}

/// Engine over the fake document format
#[derive(Debug, Clone)]
pub struct FakeEngine {
    config: FakeConfig,
    counters: Arc<FakeCounters>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            config: FakeConfig {
                capabilities: EngineCapabilities {
                    reentrant_renders: true,
                    reverse_byte_order: true,
                },
                render_delay: Duration::ZERO,
                load_delay: Duration::ZERO,
                max_bitmap_pixels: u64::MAX,
                fail_init: false,
            },
            counters: Arc::new(FakeCounters::default()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: EngineCapabilities) -> Self {
        self.config.capabilities = capabilities;
        self
    }

    /// Sleep inside every render, to exercise timeouts and concurrency
    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.config.render_delay = delay;
        self
    }

    /// Sleep inside every document load
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.config.load_delay = delay;
        self
    }

    /// Make library initialization fail
    pub fn with_failing_init(mut self) -> Self {
        self.config.fail_init = true;
        self
    }

    /// Refuse bitmaps larger than `pixels`
    pub fn with_max_bitmap_pixels(mut self, pixels: u64) -> Self {
        self.config.max_bitmap_pixels = pixels;
        self
    }

    pub fn stats(&self) -> FakeStats {
        let c = &self.counters;
        FakeStats {
            library_inits: c.library_inits.load(Ordering::SeqCst),
            library_destroys: c.library_destroys.load(Ordering::SeqCst),
            loads_without_library: c.loads_without_library.load(Ordering::SeqCst),
            documents_opened: c.documents_opened.load(Ordering::SeqCst),
            documents_closed: c.documents_closed.load(Ordering::SeqCst),
            pages_opened: c.pages_opened.load(Ordering::SeqCst),
            pages_closed: c.pages_closed.load(Ordering::SeqCst),
            bitmaps_created: c.bitmaps_created.load(Ordering::SeqCst),
            bitmaps_destroyed: c.bitmaps_destroyed.load(Ordering::SeqCst),
            renders: c.renders.load(Ordering::SeqCst),
            max_renders_in_flight: c.max_renders_in_flight.load(Ordering::SeqCst),
        }
    }
}

impl PdfEngine for FakeEngine {
    type Document = FakeDocument;

    fn name(&self) -> &'static str {
        "fake"
    }

    fn capabilities(&self) -> EngineCapabilities {
        self.config.capabilities
    }

    fn init_library(&self) -> EngineResult<()> {
        if self.config.fail_init {
            return Err(EngineError::Library("init refused".to_string()));
        }
        self.counters.library_inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn destroy_library(&self) {
        self.counters.library_destroys.fetch_add(1, Ordering::SeqCst);
    }

    fn load_document(
        &self,
        bytes: Arc<[u8]>,
        password: Option<&str>,
    ) -> EngineResult<FakeDocument> {
        if !self.config.load_delay.is_zero() {
            std::thread::sleep(self.config.load_delay);
        }
        let c = &self.counters;
        if c.library_inits.load(Ordering::SeqCst) <= c.library_destroys.load(Ordering::SeqCst) {
            c.loads_without_library.fetch_add(1, Ordering::SeqCst);
        }

        let parsed = parse(&bytes)?;

        if let Some(expected) = &parsed.password {
            match password {
                None => return Err(EngineError::PasswordRequired),
                Some(given) if given != expected => return Err(EngineError::IncorrectPassword),
                Some(_) => {}
            }
        }

        self.counters.documents_opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeDocument {
            _bytes: bytes,
            pages: parsed.pages,
            config: self.config,
            counters: Arc::clone(&self.counters),
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum PageSpec {
    Normal { size: PageSize, color: [u8; 3] },
    Broken,
}

struct ParsedFake {
    password: Option<String>,
    pages: Vec<PageSpec>,
}

fn parse(bytes: &[u8]) -> EngineResult<ParsedFake> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| EngineError::InvalidDocument("not UTF-8".to_string()))?;
    let mut lines = text.lines();

    if lines.next().map(str::trim) != Some(MAGIC) {
        return Err(EngineError::InvalidDocument("missing header".to_string()));
    }

    let mut password = None;
    let mut pages = Vec::new();

    for line in lines.map(str::trim).filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            ["password", value] => password = Some(value.to_string()),
            ["page", "broken"] => pages.push(PageSpec::Broken),
            ["page", w, h, rest @ ..] => {
                let size = PageSize::new(parse_points(w)?, parse_points(h)?);
                let color = match rest {
                    [] => [0, 0, 0],
                    [hex] => parse_color(hex)?,
                    _ => return Err(invalid_line(line)),
                };
                pages.push(PageSpec::Normal { size, color });
            }
            _ => return Err(invalid_line(line)),
        }
    }

    Ok(ParsedFake { password, pages })
}

fn parse_points(value: &str) -> EngineResult<f32> {
    value
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| EngineError::InvalidDocument(format!("bad page dimension '{}'", value)))
}

fn parse_color(value: &str) -> EngineResult<[u8; 3]> {
    let hex = value
        .strip_prefix('#')
        .filter(|h| h.len() == 6)
        .ok_or_else(|| EngineError::InvalidDocument(format!("bad color '{}'", value)))?;
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|_| EngineError::InvalidDocument(format!("bad color '{}'", value)))
    };
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

fn invalid_line(line: &str) -> EngineError {
    EngineError::InvalidDocument(format!("unrecognized line '{}'", line))
}

/// Open fake document session
pub struct FakeDocument {
    _bytes: Arc<[u8]>,
    pages: Vec<PageSpec>,
    config: FakeConfig,
    counters: Arc<FakeCounters>,
}

impl Drop for FakeDocument {
    fn drop(&mut self) {
        self.counters.documents_closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl EngineDocument for FakeDocument {
    type Page = FakePage;
    type Bitmap = FakeBitmap;

    fn page_count(&self) -> EngineResult<usize> {
        Ok(self.pages.len())
    }

    fn load_page(&self, index: usize) -> EngineResult<FakePage> {
        match self.pages.get(index) {
            Some(PageSpec::Normal { size, color }) => {
                self.counters.pages_opened.fetch_add(1, Ordering::SeqCst);
                Ok(FakePage {
                    size: *size,
                    color: *color,
                    counters: Arc::clone(&self.counters),
                })
            }
            _ => Err(EngineError::PageLoad(index)),
        }
    }

    fn create_bitmap(&self, width: u32, height: u32) -> EngineResult<FakeBitmap> {
        let pixels = width as u64 * height as u64;
        if width == 0 || height == 0 || pixels > self.config.max_bitmap_pixels {
            return Err(EngineError::BitmapAllocation { width, height });
        }

        let stride = width as usize * 4 + ROW_PADDING;
        self.counters.bitmaps_created.fetch_add(1, Ordering::SeqCst);
        Ok(FakeBitmap {
            width,
            height,
            stride,
            // Fresh bitmaps hold garbage, like uninitialized engine memory
            data: vec![0xCD; stride * height as usize],
            counters: Arc::clone(&self.counters),
        })
    }

    fn render(
        &self,
        page: &FakePage,
        bitmap: &mut FakeBitmap,
        matrix: &Matrix,
        clip: &ClipRect,
        flags: RenderFlags,
    ) -> EngineResult<()> {
        let _in_flight = InFlight::enter(&self.counters);

        if !self.config.render_delay.is_zero() {
            std::thread::sleep(self.config.render_delay);
        }

        let inverse = matrix
            .invert()
            .ok_or_else(|| EngineError::Render("singular matrix".to_string()))?;

        let layout = if flags.reverse_byte_order && self.config.capabilities.reverse_byte_order {
            bitmap.native_layout().reversed()
        } else {
            bitmap.native_layout()
        };
        let [r, g, b] = page.color;
        let pixel = match layout {
            PixelLayout::Bgra => [b, g, r, 0xFF],
            PixelLayout::Rgba => [r, g, b, 0xFF],
        };

        let bounds = clip.intersect(&ClipRect::bitmap(bitmap.width, bitmap.height));
        if bounds.is_empty() {
            return Ok(());
        }
        let (x0, y0, x1, y1) = bounds.pixel_bounds();
        let size = page.size;
        let content = (
            size.width * 0.25,
            size.height * 0.25,
            size.width * 0.75,
            size.height * 0.75,
        );

        for py in y0.max(0)..y1.min(bitmap.height as i32) {
            for px in x0.max(0)..x1.min(bitmap.width as i32) {
                let (x, y) = inverse.transform_point(px as f32 + 0.5, py as f32 + 0.5);
                if x >= content.0 && x < content.2 && y >= content.1 && y < content.3 {
                    let offset = py as usize * bitmap.stride + px as usize * 4;
                    bitmap.data[offset..offset + 4].copy_from_slice(&pixel);
                }
            }
        }

        Ok(())
    }
}

/// Tracks concurrent renders for the high-water mark
struct InFlight<'a>(&'a FakeCounters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a FakeCounters) -> Self {
        counters.renders.fetch_add(1, Ordering::SeqCst);
        let now = counters.renders_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_renders_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.renders_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FakePage {
    size: PageSize,
    color: [u8; 3],
    counters: Arc<FakeCounters>,
}

impl Drop for FakePage {
    fn drop(&mut self) {
        self.counters.pages_closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl EnginePage for FakePage {
    fn size(&self) -> PageSize {
        self.size
    }
}

pub struct FakeBitmap {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
    counters: Arc<FakeCounters>,
}

impl Drop for FakeBitmap {
    fn drop(&mut self) {
        self.counters.bitmaps_destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

impl EngineBitmap for FakeBitmap {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn native_layout(&self) -> PixelLayout {
        PixelLayout::Bgra
    }

    fn fill(&mut self, argb: u32) {
        let [a, r, g, b] = argb.to_be_bytes();
        let row_bytes = self.width as usize * 4;
        for row in self.data.chunks_mut(self.stride) {
            for px in row[..row_bytes].chunks_exact_mut(4) {
                px.copy_from_slice(&[b, g, r, a]);
            }
        }
    }

    fn buffer(&self) -> &[u8] {
        &self.data
    }
}
