//! Object Location Provider: cross-reference table first, brute-force scan
//! second.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;

use super::bruteforce::BruteForceLocator;
use super::header::header_offset;
use super::xref::{CrossReferenceTable, XRefEntry};
use crate::config::ParseOptions;
use crate::error::{PdfError, Result};
use crate::model::objects::PDFObjRef;
use crate::parser::PDFParser;

/// Where an object's bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectLocation {
    /// Offset taken from the cross-reference table and verified.
    Offset(usize),
    /// Offset found by the brute-force scan; stream lengths there are
    /// always measured by scanning for `endstream`.
    Scanned(usize),
    /// Member `index` of the object stream `stream_objid`.
    Compressed { stream_objid: u32, index: usize },
}

impl ObjectLocation {
    /// File offset of an uncompressed object.
    pub const fn offset(self) -> Option<usize> {
        match self {
            Self::Offset(offset) | Self::Scanned(offset) => Some(offset),
            Self::Compressed { .. } => None,
        }
    }
}

/// Resolves references to locations.
///
/// The table slot is empty while the cross-reference data itself is being
/// read; lookups during that window go straight to the scan.
pub struct ObjectLocationProvider {
    data: Bytes,
    /// Where `%PDF-` starts; offsets may be relative to it.
    base: usize,
    table: OnceLock<CrossReferenceTable>,
    brute_force: BruteForceLocator,
    fallbacks: AtomicUsize,
}

impl ObjectLocationProvider {
    pub fn new(data: Bytes, options: &ParseOptions) -> Self {
        Self {
            brute_force: BruteForceLocator::new(data.clone(), options),
            base: header_offset(&data),
            data,
            table: OnceLock::new(),
            fallbacks: AtomicUsize::new(0),
        }
    }

    /// Install the merged table. Only the first call succeeds.
    pub fn install_table(&self, table: CrossReferenceTable) -> Result<()> {
        self.table
            .set(table)
            .map_err(|_| PdfError::SyntaxError("cross-reference table already installed".into()))
    }

    pub fn table(&self) -> Option<&CrossReferenceTable> {
        self.table.get()
    }

    pub const fn header_offset(&self) -> usize {
        self.base
    }

    pub const fn brute_force(&self) -> &BruteForceLocator {
        &self.brute_force
    }

    /// Number of lookups the table could not answer.
    pub fn fallback_count(&self) -> usize {
        self.fallbacks.load(Ordering::Relaxed)
    }

    /// Locate `objref`. `Ok(None)` means no source knows the object; errors
    /// come only from a cancelled or timed-out scan.
    pub fn resolve(&self, objref: PDFObjRef) -> Result<Option<ObjectLocation>> {
        if self.is_freed(objref.objid) {
            return Ok(None);
        }
        if let Some(entry) = self.table().and_then(|t| t.get(objref.objid)) {
            match entry {
                XRefEntry::Compressed {
                    stream_objid,
                    index,
                } => {
                    return Ok(Some(ObjectLocation::Compressed {
                        stream_objid,
                        index,
                    }));
                }
                XRefEntry::InFile { offset, .. } => {
                    if let Some(at) = self.verified_offset(offset, objref.objid) {
                        return Ok(Some(ObjectLocation::Offset(at)));
                    }
                    tracing::debug!(%objref, offset, "xref offset does not hold the object");
                }
            }
        }

        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        let found = self.brute_force.locate(objref)?;
        if let Some(offset) = found {
            tracing::debug!(%objref, offset, "object located by scan");
        }
        Ok(found.map(ObjectLocation::Scanned))
    }

    /// Deleted by the newest revision that mentions it. The scan is not
    /// consulted for such objects.
    pub fn is_freed(&self, objid: u32) -> bool {
        self.table().is_some_and(|t| t.is_free(objid))
    }

    /// `offset` itself, or `offset` counted from the header, whichever
    /// holds the object.
    fn verified_offset(&self, offset: usize, objid: u32) -> Option<usize> {
        if self.header_at(offset, objid) {
            return Some(offset);
        }
        let shifted = offset.checked_add(self.base).filter(|_| self.base > 0)?;
        self.header_at(shifted, objid).then_some(shifted)
    }

    /// True if `objid <gen> obj` starts exactly at `offset`.
    fn header_at(&self, offset: usize, objid: u32) -> bool {
        let Some(bytes) = self.data.get(offset..) else {
            return false;
        };
        if bytes.first().is_none_or(|b| !b.is_ascii_digit()) {
            return false;
        }
        PDFParser::new(bytes, false)
            .parse_indirect_header()
            .is_ok_and(|found| found.objid == objid)
    }
}
