//! PDF Document module - object location, decryption and the document
//! entry point.
//!
//! This module contains:
//! - `catalog` - document bootstrap and object access (PDFDocument)
//! - `header` - `%PDF-x.y` version marker
//! - `xref` - classic tables, xref streams and the incremental-update chain
//! - `bruteforce` - memoized scan for object headers
//! - `locator` - table lookup with brute-force fallback
//! - `materializer` - reads objects and object streams
//! - `security` - PDF encryption/decryption handlers
//! - `saslprep` - RFC 4013 SASLprep for password normalization

pub mod bruteforce;
pub mod catalog;
pub mod header;
pub mod locator;
pub mod materializer;
pub mod saslprep;
pub mod security;
pub mod xref;

// Re-export main types for convenience
pub use bruteforce::{BruteForceLocator, ScanIndex};
pub use catalog::PDFDocument;
pub use header::{PdfHeader, parse_header};
pub use locator::{ObjectLocation, ObjectLocationProvider};
pub use materializer::ObjectMaterializer;
pub use saslprep::saslprep;
pub use security::{
    EncryptionAlgorithmCode, EncryptionContext, PASSWORD_PADDING, SecurityHandler,
};
pub use xref::{
    CrossReferenceParser, CrossReferenceTable, SectionKind, Trailer, XRefEntry, XRefSection,
    parse_xref_stream_rows,
};
