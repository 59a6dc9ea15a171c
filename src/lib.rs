//! Folio Server Library
//!
//! Keeps PDF documents resident in memory under caller-chosen identities
//! and rasterizes whole pages or page tiles into RGBA buffers.
//!
//! # Modules
//!
//! - `engine`: PDF engine boundary, with MuPDF and in-memory fake backends
//! - `document`: Registry of open documents and their errors
//! - `render`: Page and tile rasterization
//! - `service`: Async façade with timeouts and cancellation
//! - `routes`: HTTP adapter

pub mod config;
pub mod document;
pub mod engine;
pub mod render;
pub mod routes;
pub mod service;
pub mod state;

pub use document::{DocumentError, DocumentResult, ErrorKind};
pub use service::{PdfViewer, ViewerConfig};
