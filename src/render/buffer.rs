use image::RgbaImage;

use crate::document::{DocumentError, DocumentResult};
use crate::engine::PixelLayout;

/// Rendered pixels: tight RGBA rows, top row first
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    image: RgbaImage,
}

impl RasterBuffer {
    /// Wrap `pixels`, which must be exactly `width * height * 4` bytes
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> DocumentResult<Self> {
        let len = pixels.len();
        let expected = width as u64 * height as u64 * 4;
        Some(pixels)
            .filter(|_| len as u64 == expected)
            .and_then(|pixels| RgbaImage::from_raw(width, height, pixels))
            .map(|image| Self { image })
            .ok_or_else(|| {
                DocumentError::RenderError(format!(
                    "{} bytes do not form a {}x{} RGBA image",
                    len, width, height
                ))
            })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.image.width() as usize * 4
    }

    pub fn layout(&self) -> PixelLayout {
        PixelLayout::Rgba
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.image.into_raw()
    }

    /// RGBA of the pixel at `(x, y)`
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.image.get_pixel_checked(x, y).map(|p| p.0)
    }

    /// Every pixel has alpha 255
    pub fn is_opaque(&self) -> bool {
        self.image.pixels().all(|p| p.0[3] == 0xFF)
    }
}
