//! Pixel normalization
//!
//! Output is always RGBA. An engine that writes BGRA either reverses its
//! byte order during the render (if it can) or the copy-out swaps red and
//! blue. Never both.

use crate::document::{DocumentError, DocumentResult};
use crate::engine::{EngineCapabilities, PixelLayout};

/// How a render reaches RGBA output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizationPlan {
    /// Pass `reverse_byte_order` to the engine
    pub reverse_in_engine: bool,
    /// Swap bytes 0 and 2 of every pixel while copying out
    pub swap_on_copy: bool,
}

impl NormalizationPlan {
    pub fn for_engine(native: PixelLayout, capabilities: EngineCapabilities) -> Self {
        match native {
            PixelLayout::Rgba => Self {
                reverse_in_engine: false,
                swap_on_copy: false,
            },
            PixelLayout::Bgra if capabilities.reverse_byte_order => Self {
                reverse_in_engine: true,
                swap_on_copy: false,
            },
            PixelLayout::Bgra => Self {
                reverse_in_engine: false,
                swap_on_copy: true,
            },
        }
    }
}

/// Copy a strided engine bitmap into tight `width * 4` rows
pub fn copy_rows(
    src: &[u8],
    stride: usize,
    width: u32,
    height: u32,
    swap_red_blue: bool,
) -> DocumentResult<Vec<u8>> {
    let row_bytes = width as usize * 4;
    let rows = height as usize;

    let required = match rows {
        0 => 0,
        _ => stride * (rows - 1) + row_bytes,
    };
    if stride < row_bytes || src.len() < required {
        return Err(DocumentError::RenderError(format!(
            "bitmap buffer too small: {} bytes with stride {} for {}x{}",
            src.len(),
            stride,
            width,
            height
        )));
    }

    let mut out = Vec::with_capacity(row_bytes * rows);
    for row in src.chunks(stride).take(rows) {
        out.extend_from_slice(&row[..row_bytes]);
    }

    if swap_red_blue {
        swap_channels(&mut out);
    }
    Ok(out)
}

/// BGRA <-> RGBA in place
pub fn swap_channels(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
}
