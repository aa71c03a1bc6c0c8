//! Linear scan for `objid genno obj` headers.
//!
//! Used when the cross-reference data is missing, stale or points at the
//! wrong bytes. The scan runs at most once per document; its result is
//! shared by every later lookup.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use bytes::Bytes;
use regex::bytes::Regex;
use rustc_hash::FxHashMap;

use crate::config::{CancelToken, ParseOptions};
use crate::error::{PdfError, Result};
use crate::model::objects::PDFObjRef;

/// Bytes scanned between deadline and cancellation checks.
const CHUNK_SIZE: usize = 1 << 20;
/// Overlap between chunks so headers straddling a boundary are seen.
const CHUNK_OVERLAP: usize = 32;

fn header_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = PATTERN.get() {
        return Ok(re);
    }
    let re = Regex::new(r"(?-u)\b(\d{1,10})[ \t\r\n\x0c\x00]+(\d{1,5})[ \t\r\n\x0c\x00]+obj\b")
        .map_err(|e| PdfError::SyntaxError(format!("object header pattern: {e}")))?;
    Ok(PATTERN.get_or_init(|| re))
}

/// Offsets found by the scan.
#[derive(Debug, Default)]
pub struct ScanIndex {
    by_ref: FxHashMap<PDFObjRef, usize>,
    /// Latest header seen for each object number, any generation.
    latest: FxHashMap<u32, (PDFObjRef, usize)>,
}

impl ScanIndex {
    fn record(&mut self, objref: PDFObjRef, offset: usize) {
        self.by_ref.insert(objref, offset);
        self.latest.insert(objref.objid, (objref, offset));
    }

    /// Offset of the last header for exactly `objref`.
    pub fn get(&self, objref: PDFObjRef) -> Option<usize> {
        self.by_ref.get(&objref).copied()
    }

    /// Offset of the last header for `objid` in any generation.
    pub fn latest(&self, objid: u32) -> Option<(PDFObjRef, usize)> {
        self.latest.get(&objid).copied()
    }

    pub fn len(&self) -> usize {
        self.by_ref.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ref.is_empty()
    }

    /// Every reference found, in no particular order.
    pub fn refs(&self) -> impl Iterator<Item = (PDFObjRef, usize)> + '_ {
        self.by_ref.iter().map(|(r, o)| (*r, *o))
    }
}

/// Memoized brute-force locator over an immutable buffer.
pub struct BruteForceLocator {
    data: Bytes,
    deadline: Option<std::time::Duration>,
    cancel: Option<CancelToken>,
    index: OnceLock<Arc<ScanIndex>>,
}

impl BruteForceLocator {
    pub fn new(data: Bytes, options: &ParseOptions) -> Self {
        Self {
            data,
            deadline: options.scan_deadline,
            cancel: options.cancel.clone(),
            index: OnceLock::new(),
        }
    }

    /// True once a scan has completed.
    pub fn is_scanned(&self) -> bool {
        self.index.get().is_some()
    }

    /// The scan result, computed on first use.
    ///
    /// Every successful call returns the same `Arc`. A cancelled or
    /// timed-out scan is not remembered, so a later call scans again.
    pub fn offsets(&self) -> Result<Arc<ScanIndex>> {
        if let Some(index) = self.index.get() {
            return Ok(Arc::clone(index));
        }
        let scanned = Arc::new(self.scan()?);
        // A concurrent scan may have won; both saw the same bytes.
        Ok(Arc::clone(self.index.get_or_init(|| scanned)))
    }

    /// Offset of `objref`: exact generation first, then any generation.
    pub fn locate(&self, objref: PDFObjRef) -> Result<Option<usize>> {
        let index = self.offsets()?;
        Ok(index
            .get(objref)
            .or_else(|| index.latest(objref.objid).map(|(_, offset)| offset)))
    }

    fn check_budget(&self, started: Instant) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(PdfError::ScanCancelled);
        }
        if self.deadline.is_some_and(|limit| started.elapsed() > limit) {
            return Err(PdfError::ScanDeadlineExceeded);
        }
        Ok(())
    }

    fn scan(&self) -> Result<ScanIndex> {
        let pattern = header_pattern()?;
        let data = self.data.as_ref();
        let started = Instant::now();
        let mut index = ScanIndex::default();

        let mut chunk_start = 0;
        while chunk_start < data.len() {
            self.check_budget(started)?;
            let chunk_end = (chunk_start + CHUNK_SIZE).min(data.len());
            let chunk = &data[chunk_start..chunk_end];

            for cap in pattern.captures_iter(chunk) {
                self.check_budget(started)?;
                let Some(whole) = cap.get(0) else { continue };
                let offset = chunk_start + whole.start();
                // The chunk may begin in the middle of a number.
                if offset > 0 && data[offset - 1].is_ascii_alphanumeric() {
                    continue;
                }
                let (Some(objid), Some(genno)) = (parse_u32(&cap[1]), parse_u32(&cap[2])) else {
                    continue;
                };
                index.record(PDFObjRef::new(objid, genno), offset);
            }

            if chunk_end == data.len() {
                break;
            }
            chunk_start = chunk_end - CHUNK_OVERLAP;
        }

        tracing::debug!(
            objects = index.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "brute-force object scan finished"
        );
        Ok(index)
    }
}

fn parse_u32(digits: &[u8]) -> Option<u32> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Offset of the last standalone occurrence of `keyword`.
///
/// The match must not be preceded or followed by a letter, so `xref` does
/// not match inside `startxref`.
pub fn find_last_keyword(data: &[u8], keyword: &[u8]) -> Option<usize> {
    if keyword.is_empty() || data.len() < keyword.len() {
        return None;
    }
    (0..=data.len() - keyword.len()).rev().find(|&pos| {
        data[pos..].starts_with(keyword)
            && (pos == 0 || !data[pos - 1].is_ascii_alphabetic())
            && data
                .get(pos + keyword.len())
                .is_none_or(|b| !b.is_ascii_alphabetic())
    })
}
