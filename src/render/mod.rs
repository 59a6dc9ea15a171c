//! Rasterization
//!
//! Turns a resident document into RGBA pixels, either the whole page scaled
//! to a target size or a tile of the page at a given scale.

pub mod buffer;
pub mod cancel;
pub mod pixel;
pub mod rasterizer;

pub use buffer::RasterBuffer;
pub use cancel::{CancelOnDrop, CancelToken};
pub use pixel::NormalizationPlan;
pub use rasterizer::{
    zoom_dimensions, RasterConfig, Rasterizer, DEFAULT_MAX_BITMAP_PIXELS, DEFAULT_MIN_ZOOM,
};
