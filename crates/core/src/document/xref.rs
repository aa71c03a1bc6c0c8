//! Cross-Reference Builder.
//!
//! Reads classic `xref` tables and cross-reference streams, follows the
//! `/Prev` and `/XRefStm` chain of incremental updates, and merges the
//! sections so the newest entry for each object wins.

use std::collections::HashMap;

use rustc_hash::{FxHashMap, FxHashSet};

use super::bruteforce::find_last_keyword;
use super::materializer::ObjectMaterializer;
use crate::error::{PdfError, Result};
use crate::model::objects::{PDFObjRef, PDFObject};
use crate::parser::{Keyword, PDFParser, Token};

/// Bytes at the end of the file searched for `startxref`.
const STARTXREF_WINDOW: usize = 1024;

/// Trailer keys that describe the xref stream itself.
const STREAM_ONLY_KEYS: [&str; 6] = ["Length", "Filter", "DecodeParms", "W", "Index", "Type"];

/// Location of one object according to the cross-reference data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Uncompressed object at a byte offset.
    InFile { offset: usize, genno: u32 },
    /// Member of an object stream.
    Compressed { stream_objid: u32, index: usize },
}

/// Typed view of the merged trailer dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trailer {
    pub root: Option<PDFObjRef>,
    /// `/Encrypt`, either a reference or a direct dictionary.
    pub encrypt: Option<PDFObject>,
    pub info: Option<PDFObjRef>,
    /// `/ID` strings; usually two.
    pub id: Vec<Vec<u8>>,
    pub prev: Option<usize>,
    pub xref_stm: Option<usize>,
    pub size: Option<u32>,
    pub dict: HashMap<String, PDFObject>,
}

impl Trailer {
    pub fn from_dict(dict: HashMap<String, PDFObject>) -> Self {
        let reference = |key: &str| match dict.get(key) {
            Some(PDFObject::Ref(r)) => Some(*r),
            _ => None,
        };
        let offset = |key: &str| {
            dict.get(key)
                .and_then(PDFObject::int_or_none)
                .and_then(|v| usize::try_from(v).ok())
        };
        let id = match dict.get("ID") {
            Some(PDFObject::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_string().ok().map(<[u8]>::to_vec))
                .collect(),
            _ => Vec::new(),
        };

        Self {
            root: reference("Root"),
            encrypt: dict.get("Encrypt").cloned(),
            info: reference("Info"),
            id,
            prev: offset("Prev"),
            xref_stm: offset("XRefStm"),
            size: dict
                .get("Size")
                .and_then(PDFObject::int_or_none)
                .and_then(|v| u32::try_from(v).ok()),
            dict,
        }
    }
}

/// How a section was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Table,
    Stream,
    /// Synthesised from the brute-force scan.
    Recovered,
}

/// One section of the chain, newest first in [`CrossReferenceTable::sections`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XRefSection {
    pub offset: usize,
    pub kind: SectionKind,
    pub entries: usize,
}

/// Merged cross-reference data for the whole file.
#[derive(Debug, Clone, Default)]
pub struct CrossReferenceTable {
    entries: FxHashMap<u32, XRefEntry>,
    /// Object numbers a newer revision marked free. Older sections cannot
    /// bring them back.
    freed: FxHashSet<u32>,
    trailer: Trailer,
    sections: Vec<XRefSection>,
}

impl CrossReferenceTable {
    pub fn new(trailer: Trailer) -> Self {
        Self {
            trailer,
            ..Self::default()
        }
    }

    pub fn get(&self, objid: u32) -> Option<XRefEntry> {
        self.entries.get(&objid).copied()
    }

    /// Add an entry unless a newer section already supplied one or freed
    /// the object.
    pub fn insert(&mut self, objid: u32, entry: XRefEntry) -> bool {
        use std::collections::hash_map::Entry;
        if self.freed.contains(&objid) {
            return false;
        }
        match self.entries.entry(objid) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Mark `objid` deleted unless a newer section already placed it.
    pub fn free(&mut self, objid: u32) -> bool {
        !self.entries.contains_key(&objid) && self.freed.insert(objid)
    }

    /// True when the newest revision mentioning `objid` lists it as free.
    pub fn is_free(&self, objid: u32) -> bool {
        self.freed.contains(&objid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    pub fn sections(&self) -> &[XRefSection] {
        &self.sections
    }

    /// True if the table came from the scan rather than the file's own data.
    pub fn is_recovered(&self) -> bool {
        self.sections
            .iter()
            .any(|s| s.kind == SectionKind::Recovered)
    }

    /// Object numbers with an entry, ascending.
    pub fn objids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Fold an older section in: its entries, free marks and trailer keys
    /// only fill gaps.
    fn merge_older(&mut self, mut section: ParsedSection) {
        let freed = std::mem::take(&mut section.freed);
        self.merge_entries(section);
        self.free_all(freed);
    }

    fn free_all(&mut self, freed: Vec<u32>) {
        for objid in freed {
            self.free(objid);
        }
    }

    fn merge_entries(&mut self, section: ParsedSection) {
        let added = section
            .entries
            .into_iter()
            .filter(|(objid, entry)| self.insert(*objid, *entry))
            .count();
        self.sections.push(XRefSection {
            offset: section.offset,
            kind: section.kind,
            entries: added,
        });

        let mut dict = std::mem::take(&mut self.trailer.dict);
        for (key, value) in section.trailer {
            dict.entry(key).or_insert(value);
        }
        self.trailer = Trailer::from_dict(dict);
    }
}

/// A single section before merging.
struct ParsedSection {
    offset: usize,
    kind: SectionKind,
    entries: Vec<(u32, XRefEntry)>,
    /// Object numbers listed as free.
    freed: Vec<u32>,
    trailer: HashMap<String, PDFObject>,
}

impl ParsedSection {
    fn link(&self, key: &str) -> Option<usize> {
        self.trailer
            .get(key)
            .and_then(PDFObject::int_or_none)
            .and_then(|v| usize::try_from(v).ok())
    }
}

/// Offset after the last `startxref` keyword in the file tail.
pub fn find_startxref(data: &[u8]) -> Option<usize> {
    let tail_start = data.len().saturating_sub(STARTXREF_WINDOW);
    let tail = &data[tail_start..];
    let keyword = find_last_keyword(tail, b"startxref")?;
    let mut parser = PDFParser::new(&tail[keyword + b"startxref".len()..], true);
    match parser.parse_object() {
        Ok(PDFObject::Int(offset)) => usize::try_from(offset).ok(),
        _ => None,
    }
}

/// Builds a [`CrossReferenceTable`] for a document.
pub struct CrossReferenceParser<'m> {
    materializer: &'m ObjectMaterializer,
    lenient: bool,
}

impl<'m> CrossReferenceParser<'m> {
    pub const fn new(materializer: &'m ObjectMaterializer) -> Self {
        Self {
            materializer,
            lenient: materializer.lenient(),
        }
    }

    fn data(&self) -> &'m [u8] {
        self.materializer.data()
    }

    /// Read the chain starting at `start` (the `startxref` value, if any).
    ///
    /// An unusable start is fatal in strict mode. Lenient mode retries at the
    /// last `xref` keyword and finally synthesises a table from the scan.
    pub fn parse(&self, start: Option<usize>) -> Result<CrossReferenceTable> {
        let attempt = match start.map(|offset| (offset, self.section_at(offset))) {
            Some((_, Some(at))) => self.read_chain(at),
            Some((offset, None)) => Err(PdfError::SyntaxError(format!(
                "startxref {offset} does not point at cross-reference data"
            ))),
            None => Err(PdfError::SyntaxError("no startxref".into())),
        };

        match attempt {
            Ok(table) => Ok(table),
            Err(err) if self.lenient => {
                tracing::warn!(error = %err, "invalid cross-reference data, recovering");
                self.recover(start)
            }
            Err(err) => {
                tracing::debug!(error = %err, "strict cross-reference read failed");
                Err(PdfError::NoValidXRef)
            }
        }
    }

    /// Where the section that `offset` names begins: at `offset` itself or,
    /// in files with bytes before the header, `offset` past the header.
    fn section_at(&self, offset: usize) -> Option<usize> {
        if self.is_section_start(offset) {
            return Some(offset);
        }
        let base = self.materializer.locator().header_offset();
        let shifted = offset.checked_add(base).filter(|_| base > 0)?;
        if !self.is_section_start(shifted) {
            return None;
        }
        tracing::debug!(offset, base, "cross-reference offset counted from the header");
        Some(shifted)
    }

    /// `xref` keyword or an object header at `offset`.
    fn is_section_start(&self, offset: usize) -> bool {
        let Some(bytes) = self.data().get(offset..) else {
            return false;
        };
        let mut parser = PDFParser::new(bytes, self.lenient);
        if parser.eat_keyword(&Keyword::Xref) {
            return true;
        }
        parser.seek(0);
        parser.parse_indirect_header().is_ok()
    }

    /// Walk newest to oldest through `/XRefStm` and `/Prev`.
    fn read_chain(&self, start: usize) -> Result<CrossReferenceTable> {
        let mut table = CrossReferenceTable::default();
        let mut visited: FxHashSet<usize> = FxHashSet::default();
        let mut next = Some(start);

        while let Some(link) = next {
            let offset = self.section_at(link).unwrap_or(link);
            if !visited.insert(offset) {
                tracing::warn!(offset, "cross-reference chain loops");
                break;
            }
            let section = match self.read_section(offset) {
                Ok(section) => section,
                Err(err) if table.sections.is_empty() => return Err(err),
                Err(err) if self.lenient => {
                    tracing::warn!(offset, error = %err, "broken /Prev link, keeping newer sections");
                    break;
                }
                Err(err) => return Err(err),
            };
            tracing::debug!(
                offset,
                kind = ?section.kind,
                entries = section.entries.len(),
                "read cross-reference section"
            );

            let xref_stm = (section.kind == SectionKind::Table)
                .then(|| section.link("XRefStm"))
                .flatten();
            next = section.link("Prev");
            // Hybrid files list stream-only objects as free in the table;
            // the same revision's /XRefStm may still place them.
            let mut section = section;
            let freed = std::mem::take(&mut section.freed);
            table.merge_entries(section);

            if let Some(stm) = xref_stm.map(|stm| self.section_at(stm).unwrap_or(stm))
                && visited.insert(stm)
            {
                match self.read_stream_section(stm) {
                    Ok(hybrid) => table.merge_older(hybrid),
                    Err(err) if self.lenient => {
                        tracing::warn!(offset = stm, error = %err, "unreadable /XRefStm");
                    }
                    Err(err) => return Err(err),
                }
            }
            table.free_all(freed);
        }

        Ok(table)
    }

    fn read_section(&self, offset: usize) -> Result<ParsedSection> {
        let bytes = self.data().get(offset..).ok_or_else(|| {
            PdfError::SyntaxError(format!("xref offset {offset} beyond end of file"))
        })?;
        let mut parser = PDFParser::new(bytes, self.lenient);
        if parser.eat_keyword(&Keyword::Xref) {
            self.read_table_section(offset, parser)
        } else {
            self.read_stream_section(offset)
        }
    }

    /// Classic table. `parser` sits just past the `xref` keyword.
    fn read_table_section(&self, offset: usize, mut parser: PDFParser<'_>) -> Result<ParsedSection> {
        let mut entries = Vec::new();
        let mut freed = Vec::new();

        loop {
            if parser.eat_keyword(&Keyword::Trailer) {
                break;
            }
            let (start, count) = match (next_int(&mut parser), next_int(&mut parser)) {
                (Some(start), Some(count)) if start >= 0 && count >= 0 => (start, count),
                _ if self.lenient && !entries.is_empty() => {
                    tracing::warn!(offset, "xref table ends without trailer");
                    return Ok(ParsedSection {
                        offset,
                        kind: SectionKind::Table,
                        entries,
                        freed,
                        trailer: HashMap::new(),
                    });
                }
                _ => {
                    return Err(PdfError::SyntaxError(format!(
                        "bad xref subsection header in table at {offset}"
                    )));
                }
            };

            let mut base = start;
            for i in 0..count {
                let Some((entry_offset, genno, in_use)) = read_table_entry(&mut parser) else {
                    if self.lenient {
                        tracing::warn!(offset, expected = count, read = i, "short xref subsection");
                        break;
                    }
                    return Err(PdfError::SyntaxError(format!(
                        "xref subsection at {offset} has {i} of {count} entries"
                    )));
                };
                // Some writers start the first subsection at 1 yet still
                // list the free head entry of object 0.
                if i == 0 && base > 0 && !in_use && entry_offset == 0 && genno == 65535 {
                    base -= 1;
                }
                let Some(objid) = base.checked_add(i).and_then(|id| u32::try_from(id).ok()) else {
                    continue;
                };
                if !in_use {
                    freed.push(objid);
                    continue;
                }
                let (Ok(offset), Ok(genno)) = (usize::try_from(entry_offset), u32::try_from(genno))
                else {
                    continue;
                };
                entries.push((objid, XRefEntry::InFile { offset, genno }));
            }
        }

        let trailer = match parser.parse_object() {
            Ok(PDFObject::Dict(dict)) => dict,
            Ok(_) | Err(_) if self.lenient => {
                tracing::warn!(offset, "unreadable trailer dictionary");
                HashMap::new()
            }
            Ok(other) => {
                return Err(PdfError::TypeError {
                    expected: "dict",
                    got: other.type_name(),
                });
            }
            Err(err) => return Err(err),
        };

        Ok(ParsedSection {
            offset,
            kind: SectionKind::Table,
            entries,
            freed,
            trailer,
        })
    }

    /// `/Type /XRef` stream at `offset`.
    fn read_stream_section(&self, offset: usize) -> Result<ParsedSection> {
        let (objref, obj) = self.materializer.parse_object_at(offset, None, true)?;
        let stream = obj.as_stream()?;
        if !stream.is_type("XRef") && !(self.lenient && stream.get("W").is_some()) {
            return Err(PdfError::SyntaxError(format!(
                "object {objref} at {offset} is not a cross-reference stream"
            )));
        }
        let data = self.materializer.decode_stream(stream)?;
        let (entries, freed) = read_stream_rows(&stream.attrs, &data)?;

        let trailer = stream
            .attrs
            .iter()
            .filter(|(key, _)| !STREAM_ONLY_KEYS.contains(&key.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(ParsedSection {
            offset,
            kind: SectionKind::Stream,
            entries,
            freed,
            trailer,
        })
    }

    /// Rebuild a table without trusting `startxref`.
    fn recover(&self, failed_start: Option<usize>) -> Result<CrossReferenceTable> {
        if let Some(xref) = find_last_keyword(self.data(), b"xref")
            && Some(xref) != failed_start
            && let Ok(table) = self.read_chain(xref)
            && !table.is_empty()
        {
            tracing::warn!(offset = xref, "using last xref keyword instead of startxref");
            return Ok(table);
        }
        self.synthesize()
    }

    /// Table built from the brute-force scan.
    fn synthesize(&self) -> Result<CrossReferenceTable> {
        let index = self.materializer.locator().brute_force().offsets()?;
        if index.is_empty() {
            return Err(PdfError::NoValidXRef);
        }
        tracing::warn!(objects = index.len(), "cross-reference table rebuilt by scanning");

        let mut scanned: Vec<(PDFObjRef, usize)> = index.refs().collect();
        scanned.sort_unstable_by_key(|&(_, offset)| std::cmp::Reverse(offset));

        let mut table = CrossReferenceTable::default();
        // Newest first, so later headers for the same id win.
        let entries = scanned
            .iter()
            .map(|&(objref, offset)| {
                (
                    objref.objid,
                    XRefEntry::InFile {
                        offset,
                        genno: objref.genno,
                    },
                )
            })
            .collect::<Vec<_>>();

        // Cross-reference streams still hold the only record of compressed
        // objects.
        let streams: Vec<ParsedSection> = scanned
            .iter()
            .filter(|&&(_, offset)| mentions_xref_type(self.data(), offset))
            .filter_map(|&(_, offset)| self.read_stream_section(offset).ok())
            .collect();

        let trailer = self.recover_trailer(&streams);
        table.merge_older(ParsedSection {
            offset: 0,
            kind: SectionKind::Recovered,
            entries,
            freed: Vec::new(),
            trailer,
        });
        for ParsedSection {
            offset,
            kind,
            entries,
            trailer,
            ..
        } in streams
        {
            let compressed = entries
                .into_iter()
                .filter(|(_, e)| matches!(e, XRefEntry::Compressed { .. }))
                .collect();
            table.merge_older(ParsedSection {
                offset,
                kind,
                entries: compressed,
                freed: Vec::new(),
                trailer,
            });
        }
        Ok(table)
    }

    /// Last `trailer` dictionary, else the newest cross-reference stream's.
    fn recover_trailer(&self, streams: &[ParsedSection]) -> HashMap<String, PDFObject> {
        if let Some(pos) = find_last_keyword(self.data(), b"trailer") {
            let mut parser = PDFParser::new(&self.data()[pos..], true);
            if parser.eat_keyword(&Keyword::Trailer)
                && let Ok(PDFObject::Dict(dict)) = parser.parse_object()
            {
                return dict;
            }
        }
        streams
            .first()
            .map(|s| s.trailer.clone())
            .unwrap_or_default()
    }
}

/// Cheap pre-check before parsing a scanned object as an xref stream.
fn mentions_xref_type(data: &[u8], offset: usize) -> bool {
    let end = (offset + 4096).min(data.len());
    data.get(offset..end)
        .is_some_and(|head| head.windows(5).any(|w| w == b"/XRef"))
}

fn next_int(parser: &mut PDFParser<'_>) -> Option<i64> {
    match parser.scanner().next_token() {
        Some(Ok((_, Token::Int(n)))) => Some(n),
        _ => None,
    }
}

/// `offset genno n|f`. Token based, so 19 and 21-byte lines are fine.
fn read_table_entry(parser: &mut PDFParser<'_>) -> Option<(i64, i64, bool)> {
    let offset = next_int(parser)?;
    let genno = next_int(parser)?;
    match parser.scanner().next_token() {
        Some(Ok((_, Token::Keyword(Keyword::Other(kw))))) => match kw.as_slice() {
            b"n" => Some((offset, genno, true)),
            b"f" => Some((offset, genno, false)),
            _ => None,
        },
        _ => None,
    }
}

/// Decode the rows of a cross-reference stream. Free rows are skipped.
pub fn parse_xref_stream_rows(
    attrs: &HashMap<String, PDFObject>,
    data: &[u8],
) -> Result<Vec<(u32, XRefEntry)>> {
    read_stream_rows(attrs, data).map(|(entries, _)| entries)
}

/// Placed entries plus the object numbers of type-0 (free) rows.
fn read_stream_rows(
    attrs: &HashMap<String, PDFObject>,
    data: &[u8],
) -> Result<(Vec<(u32, XRefEntry)>, Vec<u32>)> {
    let widths: Vec<usize> = attrs
        .get("W")
        .ok_or_else(|| PdfError::KeyError("W".into()))?
        .as_array()?
        .iter()
        .map(|w| match w.int_or_none() {
            Some(w @ 0..=8) => Ok(w as usize),
            _ => Err(PdfError::SyntaxError("xref stream /W entry out of range".into())),
        })
        .collect::<Result<_>>()?;
    let &[w0, w1, w2] = widths.as_slice() else {
        return Err(PdfError::SyntaxError(format!(
            "xref stream /W has {} entries",
            widths.len()
        )));
    };
    let row_len = w0 + w1 + w2;
    if row_len == 0 {
        return Err(PdfError::SyntaxError("xref stream rows are empty".into()));
    }

    let size = attrs.get("Size").and_then(PDFObject::int_or_none).unwrap_or(0);
    let index: Vec<i64> = match attrs.get("Index") {
        Some(PDFObject::Array(items)) => items.iter().filter_map(PDFObject::int_or_none).collect(),
        _ => vec![0, size],
    };

    let mut rows = data.chunks_exact(row_len);
    let mut entries = Vec::new();
    let mut freed = Vec::new();
    for pair in index.chunks_exact(2) {
        let (start, count) = (pair[0], pair[1]);
        for i in 0..count.max(0) {
            let Some(row) = rows.next() else {
                return Ok((entries, freed));
            };
            let kind = if w0 == 0 { 1 } else { read_be(&row[..w0]) };
            let f2 = read_be(&row[w0..w0 + w1]);
            let f3 = read_be(&row[w0 + w1..]);
            let Some(objid) = start.checked_add(i).and_then(|id| u32::try_from(id).ok()) else {
                continue;
            };
            let entry = match kind {
                1 => XRefEntry::InFile {
                    offset: f2 as usize,
                    genno: f3 as u32,
                },
                2 => XRefEntry::Compressed {
                    stream_objid: f2 as u32,
                    index: f3 as usize,
                },
                0 => {
                    freed.push(objid);
                    continue;
                }
                // Unknown types are references to the null object.
                _ => continue,
            };
            entries.push((objid, entry));
        }
    }
    Ok((entries, freed))
}

/// Big-endian unsigned integer of up to eight bytes.
fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}
