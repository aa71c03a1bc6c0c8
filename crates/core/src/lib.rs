//! lode - PDF object location and stream decoding.
//!
//! Opens a PDF byte buffer, builds the cross-reference table (falling back to
//! a brute-force object scan), sets up decryption and hands out objects and
//! decoded stream payloads.

pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod font;
pub mod model;
pub mod parser;

pub use config::{CancelToken, ParseOptions};
pub use document::PDFDocument;
pub use error::{PdfError, Result};
pub use model::objects::{PDFObjRef, PDFObject, PDFStream};
