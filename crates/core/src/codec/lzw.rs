//! LZW decoder for `/LZWDecode` streams.
//!
//! Codes are read MSB-first starting at 9 bits. Code 256 clears the table,
//! code 257 ends the data. The width grows to 10, 11 and 12 bits as the
//! table fills; `EarlyChange` (the default) switches one entry sooner.

use super::bitstream::BitStream;
use crate::error::{PdfError, Result};

pub const CLEAR_TABLE: u32 = 256;
pub const END_OF_DATA: u32 = 257;

/// Entries 0..=257 are always present.
const BASE_ENTRIES: usize = 258;
/// 12-bit codes address at most 4096 entries.
const MAX_ENTRIES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CodeEntry {
    Literal(Vec<u8>),
    ClearMarker,
    EndMarker,
}

struct CodeTable {
    entries: Vec<CodeEntry>,
}

impl CodeTable {
    fn new() -> Self {
        let mut entries = Vec::with_capacity(MAX_ENTRIES);
        entries.extend((0..=255u8).map(|b| CodeEntry::Literal(vec![b])));
        entries.push(CodeEntry::ClearMarker);
        entries.push(CodeEntry::EndMarker);
        Self { entries }
    }

    fn reset(&mut self) {
        self.entries.truncate(BASE_ENTRIES);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn literal(&self, code: usize) -> Result<&[u8]> {
        match self.entries.get(code) {
            Some(CodeEntry::Literal(bytes)) => Ok(bytes),
            Some(CodeEntry::ClearMarker | CodeEntry::EndMarker) => Err(PdfError::DecodeError(
                format!("LZW code {code} is a control code"),
            )),
            None => Err(PdfError::DecodeError(format!(
                "LZW code {code} is not in the table"
            ))),
        }
    }

    /// Append `prefix + [last]`. A full table ignores further additions.
    fn push(&mut self, prefix: usize, last: u8) -> Result<()> {
        if self.entries.len() >= MAX_ENTRIES {
            return Ok(());
        }
        let mut sequence = self.literal(prefix)?.to_vec();
        sequence.push(last);
        self.entries.push(CodeEntry::Literal(sequence));
        Ok(())
    }
}

/// Code width to use after the table reaches `table_len` entries.
pub const fn code_width(table_len: usize, early_change: bool) -> u8 {
    let offset = if early_change { 0 } else { 1 };
    if table_len >= 2047 + offset {
        12
    } else if table_len >= 1023 + offset {
        11
    } else if table_len >= 511 + offset {
        10
    } else {
        9
    }
}

/// Decode an LZW stream.
///
/// The stream must end with the end-of-data code; running out of input
/// first is a decode error, as is a code that references an entry the
/// table cannot have yet.
pub fn lzw_decode(data: &[u8], early_change: bool) -> Result<Vec<u8>> {
    let mut bits = BitStream::new(data);
    let mut table = CodeTable::new();
    let mut width: u8 = 9;
    let mut previous: Option<usize> = None;
    let mut out = Vec::with_capacity(data.len() * 2);

    loop {
        let code = bits.get(width).ok_or_else(|| {
            PdfError::DecodeError("LZW data ended before the end-of-data code".into())
        })?;

        match code {
            CLEAR_TABLE => {
                table.reset();
                previous = None;
                width = 9;
                continue;
            }
            END_OF_DATA => break,
            _ => {}
        }

        let code = code as usize;
        if code < table.len() {
            let sequence = table.literal(code)?;
            let first = sequence[0];
            out.extend_from_slice(sequence);
            if let Some(prev) = previous {
                table.push(prev, first)?;
            }
        } else if code == table.len() {
            // The encoder used the entry it was about to add:
            // previous sequence followed by its own first byte.
            let prev = previous.ok_or_else(|| {
                PdfError::DecodeError(format!("LZW code {code} with no previous code"))
            })?;
            let first = table.literal(prev)?[0];
            table.push(prev, first)?;
            out.extend_from_slice(table.literal(code)?);
        } else {
            return Err(PdfError::DecodeError(format!(
                "LZW code {code} beyond next table entry {}",
                table.len()
            )));
        }

        previous = Some(code);
        let next_width = code_width(table.len(), early_change);
        if next_width != width {
            tracing::trace!(table_len = table.len(), width = next_width, "LZW width switch");
            width = next_width;
        }
    }

    Ok(out)
}
