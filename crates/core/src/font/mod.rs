//! Font output support.
//!
//! - `writer` - big-endian TrueType data and two-pass table directories

pub mod writer;

pub use writer::{TableDirectoryWriter, TableRecord, TrueTypeDataWriter, read_table_directory};
