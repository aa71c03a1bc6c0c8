//! Big-endian TrueType table emission.
//!
//! Table directories are written in two passes: the offset table and the
//! 16-byte directory records are reserved first, table bodies follow, and
//! the reserved fields are patched once every body has its final position.

use std::io::{Cursor, ErrorKind, Read};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};

use crate::error::{PdfError, Result};

/// `checkSumAdjustment` target from the OpenType `head` table definition.
const CHECKSUM_MAGIC: u32 = 0xB1B0_AFBA;
const OFFSET_TABLE_LEN: usize = 12;
const RECORD_LEN: usize = 16;

fn invalid_input(msg: String) -> PdfError {
    PdfError::Io(std::io::Error::new(ErrorKind::InvalidInput, msg))
}

/// Growable big-endian output buffer.
#[derive(Debug, Default, Clone)]
pub struct TrueTypeDataWriter {
    buf: Vec<u8>,
}

impl TrueTypeDataWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        Ok(self.buf.write_u8(value)?)
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        Ok(self.buf.write_i16::<BigEndian>(value)?)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        Ok(self.buf.write_u16::<BigEndian>(value)?)
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        Ok(self.buf.write_i32::<BigEndian>(value)?)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        Ok(self.buf.write_u32::<BigEndian>(value)?)
    }

    /// 16.16 fixed point: the floor as a signed high word, the remaining
    /// fraction scaled by 65536 and truncated as the low word.
    pub fn write_fixed32(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(invalid_input(format!("fixed32 value {value} is not finite")));
        }
        let integer = value.floor();
        let fraction = ((value - integer) * 65536.0).trunc();
        if integer < f64::from(i16::MIN) || integer > f64::from(i16::MAX) {
            return Err(invalid_input(format!("fixed32 value {value} out of range")));
        }
        self.write_i16(integer as i16)?;
        self.write_u16(fraction as u16)
    }

    /// `LONGDATETIME`: signed seconds since 1904-01-01 00:00 UTC.
    pub fn write_long_datetime(&mut self, seconds_since_1904: i64) -> Result<()> {
        Ok(self.buf.write_i64::<BigEndian>(seconds_since_1904)?)
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Zero-pad to the next multiple of four.
    pub fn align4(&mut self) {
        let padded = self.buf.len().next_multiple_of(4);
        self.buf.resize(padded, 0);
    }

    /// Overwrite a previously reserved big-endian `u32`.
    pub fn patch_u32(&mut self, at: usize, value: u32) -> Result<()> {
        let slot = self
            .buf
            .get_mut(at..at + 4)
            .ok_or_else(|| invalid_input(format!("patch at {at} past end of buffer")))?;
        BigEndian::write_u32(slot, value);
        Ok(())
    }
}

/// Sum of big-endian words, the last one zero-padded.
pub fn table_checksum(data: &[u8]) -> u32 {
    data.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}

/// `(searchRange, entrySelector, rangeShift)` for `num_tables` records.
///
/// From 4096 tables on, `searchRange` no longer fits its 16-bit field.
pub fn search_params(num_tables: u16) -> Result<(u16, u16, u16)> {
    if num_tables == 0 {
        return Ok((0, 0, 0));
    }
    let entry_selector = 15 - num_tables.leading_zeros();
    let search_range = (1u32 << entry_selector) * RECORD_LEN as u32;
    let range_shift = u32::from(num_tables) * RECORD_LEN as u32 - search_range;
    match (u16::try_from(search_range), u16::try_from(range_shift)) {
        (Ok(search_range), Ok(range_shift)) => {
            Ok((search_range, entry_selector as u16, range_shift))
        }
        _ => Err(invalid_input(format!(
            "{num_tables} tables do not fit a table directory"
        ))),
    }
}

/// Collects tables and emits a complete sfnt file.
#[derive(Debug, Clone)]
pub struct TableDirectoryWriter {
    sfnt_version: u32,
    tables: Vec<([u8; 4], Vec<u8>)>,
}

impl TableDirectoryWriter {
    /// TrueType outlines.
    pub const TRUETYPE: u32 = 0x0001_0000;

    pub const fn new(sfnt_version: u32) -> Self {
        Self {
            sfnt_version,
            tables: Vec::new(),
        }
    }

    /// Add or replace the table `tag`.
    pub fn add_table(&mut self, tag: [u8; 4], data: Vec<u8>) {
        match self.tables.iter_mut().find(|(t, _)| *t == tag) {
            Some(slot) => slot.1 = data,
            None => self.tables.push((tag, data)),
        }
    }

    pub fn finish(mut self) -> Result<Vec<u8>> {
        let num_tables = u16::try_from(self.tables.len())
            .map_err(|_| invalid_input(format!("{} tables", self.tables.len())))?;
        self.tables.sort_by_key(|(tag, _)| *tag);

        let body_len: usize = self.tables.iter().map(|(_, d)| d.len().next_multiple_of(4)).sum();
        let mut out = TrueTypeDataWriter::with_capacity(
            OFFSET_TABLE_LEN + RECORD_LEN * self.tables.len() + body_len,
        );

        // Pass one: offset table and placeholder records.
        let (search_range, entry_selector, range_shift) = search_params(num_tables)?;
        out.write_u32(self.sfnt_version)?;
        out.write_u16(num_tables)?;
        out.write_u16(search_range)?;
        out.write_u16(entry_selector)?;
        out.write_u16(range_shift)?;
        let mut records = Vec::with_capacity(self.tables.len());
        for (tag, _) in &self.tables {
            records.push(out.position());
            out.write_bytes(tag)?;
            out.write_u32(0)?;
            out.write_u32(0)?;
            out.write_u32(0)?;
        }

        // Pass two: bodies, then the reserved fields.
        let mut head_offset = None;
        for ((tag, data), record) in self.tables.iter_mut().zip(records) {
            if tag == b"head" {
                if data.len() < 12 {
                    return Err(invalid_input("head table shorter than 12 bytes".into()));
                }
                data[8..12].fill(0);
            }
            out.align4();
            let offset = out.position();
            out.write_bytes(data)?;
            out.align4();
            if tag == b"head" {
                head_offset = Some(offset);
            }

            let offset = u32::try_from(offset)
                .map_err(|_| invalid_input(format!("table offset {offset} exceeds 32 bits")))?;
            let length = u32::try_from(data.len())
                .map_err(|_| invalid_input(format!("table length {} exceeds 32 bits", data.len())))?;
            out.patch_u32(record + 4, table_checksum(data))?;
            out.patch_u32(record + 8, offset)?;
            out.patch_u32(record + 12, length)?;
        }

        if let Some(head) = head_offset {
            let adjustment = CHECKSUM_MAGIC.wrapping_sub(table_checksum(out.as_bytes()));
            out.patch_u32(head + 8, adjustment)?;
        }
        Ok(out.into_bytes())
    }
}

/// One directory record read back from an sfnt file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRecord {
    pub tag: [u8; 4],
    pub checksum: u32,
    pub offset: u32,
    pub length: u32,
}

/// Read the sfnt version and table directory.
pub fn read_table_directory(data: &[u8]) -> Result<(u32, Vec<TableRecord>)> {
    let mut reader = Cursor::new(data);
    let sfnt_version = reader.read_u32::<BigEndian>()?;
    let num_tables = reader.read_u16::<BigEndian>()?;
    // searchRange, entrySelector, rangeShift
    reader.set_position(reader.position() + 6);

    let mut records = Vec::with_capacity(usize::from(num_tables));
    for _ in 0..num_tables {
        let mut tag = [0u8; 4];
        reader.read_exact(&mut tag)?;
        records.push(TableRecord {
            tag,
            checksum: reader.read_u32::<BigEndian>()?,
            offset: reader.read_u32::<BigEndian>()?,
            length: reader.read_u32::<BigEndian>()?,
        });
    }
    Ok((sfnt_version, records))
}
