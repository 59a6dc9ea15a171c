//! Document registry
//!
//! Owns every open document: the caller's bytes, the engine session opened
//! over them, and the identity they are registered under.

pub mod error;
pub mod handle;
pub mod registry;
pub mod types;

pub use error::{DocumentError, DocumentResult, ErrorKind};
pub use handle::DocumentHandle;
pub use registry::{DocumentRegistry, RenderConcurrency, SharedHandle};
pub use types::{OpenedDocument, PageRenderRequest, PageSize, TileRequest};
