//! In-memory PDF builder shared by the integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// Writes objects and cross-reference sections, tracking offsets.
pub struct PdfBuilder {
    buf: Vec<u8>,
    /// Offsets written since the last cross-reference section.
    pending: BTreeMap<u32, usize>,
    /// Object-stream members since the last cross-reference stream.
    compressed: BTreeMap<u32, (u32, usize)>,
    /// Objects to list as free in the next cross-reference section.
    freed: BTreeSet<u32>,
    last_xref: Option<usize>,
    max_id: u32,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self::with_header("%PDF-1.7\n%\u{e2}\u{e3}\u{cf}\u{d3}\n")
    }

    pub fn with_header(header: &str) -> Self {
        Self {
            buf: header.as_bytes().to_vec(),
            pending: BTreeMap::new(),
            compressed: BTreeMap::new(),
            freed: BTreeSet::new(),
            last_xref: None,
            max_id: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    fn record(&mut self, id: u32) -> usize {
        let offset = self.buf.len();
        self.pending.insert(id, offset);
        self.max_id = self.max_id.max(id);
        offset
    }

    pub fn object(&mut self, id: u32, body: &str) -> usize {
        let offset = self.record(id);
        self.buf
            .extend_from_slice(format!("{id} 0 obj\n{body}\nendobj\n").as_bytes());
        offset
    }

    /// List `id` as free (generation 1) in the next section.
    pub fn delete(&mut self, id: u32) -> &mut Self {
        self.pending.remove(&id);
        self.freed.insert(id);
        self
    }

    /// Stream object with an accurate `/Length`.
    pub fn stream(&mut self, id: u32, dict: &str, data: &[u8]) -> usize {
        self.stream_with_length(id, dict, data, &data.len().to_string())
    }

    /// Stream object whose `/Length` is written verbatim.
    pub fn stream_with_length(&mut self, id: u32, dict: &str, data: &[u8], length: &str) -> usize {
        let offset = self.record(id);
        self.buf.extend_from_slice(
            format!("{id} 0 obj\n<< {dict} /Length {length} >>\nstream\n").as_bytes(),
        );
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
        offset
    }

    /// Object stream holding `members`; they are listed as compressed
    /// entries in the next cross-reference stream.
    pub fn object_stream(&mut self, id: u32, members: &[(u32, &str)]) -> usize {
        let mut header = String::new();
        let mut bodies = String::new();
        for (i, (member, body)) in members.iter().enumerate() {
            let _ = write!(header, "{member} {} ", bodies.len());
            bodies.push_str(body);
            bodies.push('\n');
            self.compressed.insert(*member, (id, i));
            self.max_id = self.max_id.max(*member);
        }
        let data = format!("{header}{bodies}");
        self.stream(
            id,
            &format!("/Type /ObjStm /N {} /First {}", members.len(), header.len()),
            data.as_bytes(),
        )
    }

    /// Classic table for the objects written since the last section.
    /// `overrides` replaces offsets to simulate stale entries.
    pub fn xref_table(&mut self, trailer: &str, overrides: &[(u32, usize)]) -> usize {
        let mut entries: BTreeMap<u32, Option<usize>> = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(id, offset)| (id, Some(offset)))
            .collect();
        for &(id, offset) in overrides {
            entries.insert(id, Some(offset));
        }
        for id in std::mem::take(&mut self.freed) {
            entries.insert(id, None);
        }
        let xref_offset = self.buf.len();
        let mut out = String::from("xref\n");
        if self.last_xref.is_none() {
            out.push_str("0 1\n0000000000 65535 f \n");
        }
        for run in contiguous_runs(&entries) {
            let _ = writeln!(out, "{} {}", run[0].0, run.len());
            for (_, offset) in run {
                match offset {
                    Some(offset) => {
                        let _ = write!(out, "{offset:010} 00000 n \n");
                    }
                    None => out.push_str("0000000000 00001 f \n"),
                }
            }
        }
        let prev = self
            .last_xref
            .map(|p| format!(" /Prev {p}"))
            .unwrap_or_default();
        let _ = write!(
            out,
            "trailer\n<< /Size {}{prev} {trailer} >>\nstartxref\n{xref_offset}\n%%EOF\n",
            self.max_id + 1
        );
        self.buf.extend_from_slice(out.as_bytes());
        self.last_xref = Some(xref_offset);
        xref_offset
    }

    /// Cross-reference stream (`/W [1 4 2]`, hex encoded) covering the
    /// objects and compressed members written since the last section.
    pub fn xref_stream(&mut self, id: u32, trailer: &str) -> usize {
        let xref_offset = self.record(id);
        let mut rows: BTreeMap<u32, (u8, u32, u16)> = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(objid, offset)| (objid, (1, offset as u32, 0)))
            .collect();
        for (objid, (container, index)) in std::mem::take(&mut self.compressed) {
            rows.insert(objid, (2, container, index as u16));
        }
        for objid in std::mem::take(&mut self.freed) {
            rows.insert(objid, (0, 0, 1));
        }

        let mut index = String::new();
        let mut data = Vec::new();
        for (objid, (kind, f2, f3)) in &rows {
            let _ = write!(index, "{objid} 1 ");
            data.push(*kind);
            data.extend_from_slice(&f2.to_be_bytes());
            data.extend_from_slice(&f3.to_be_bytes());
        }
        let hex = format!("{}>", hex::encode(&data));
        let prev = self
            .last_xref
            .map(|p| format!(" /Prev {p}"))
            .unwrap_or_default();
        self.buf.extend_from_slice(
            format!(
                "{id} 0 obj\n<< /Type /XRef /W [1 4 2] /Index [{index}] /Size {}{prev} {trailer} /Filter /ASCIIHexDecode /Length {} >>\nstream\n{hex}\nendstream\nendobj\nstartxref\n{xref_offset}\n%%EOF\n",
                self.max_id + 1,
                hex.len()
            )
            .as_bytes(),
        );
        self.last_xref = Some(xref_offset);
        xref_offset
    }

    /// Trailer-less tail: only `startxref` and `%%EOF`.
    pub fn startxref(&mut self, offset: usize) -> &mut Self {
        self.raw(format!("startxref\n{offset}\n%%EOF\n").as_bytes())
    }

    pub fn finish(&self) -> Vec<u8> {
        self.buf.clone()
    }
}

fn contiguous_runs<T: Copy>(entries: &BTreeMap<u32, T>) -> Vec<Vec<(u32, T)>> {
    let mut runs: Vec<Vec<(u32, T)>> = Vec::new();
    for (&id, &offset) in entries {
        match runs.last_mut() {
            Some(run) if run.last().is_some_and(|&(last, _)| last + 1 == id) => {
                run.push((id, offset));
            }
            _ => runs.push(vec![(id, offset)]),
        }
    }
    runs
}

/// zlib-compress `data`.
pub fn zlib(data: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Single-revision document: catalog, pages, one content stream.
pub fn simple_document() -> Vec<u8> {
    let mut pdf = PdfBuilder::new();
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    pdf.object(3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>");
    pdf.stream(4, "/Filter /FlateDecode", &zlib(b"BT /F1 12 Tf (Hello) Tj ET"));
    pdf.xref_table("/Root 1 0 R", &[]);
    pdf.finish()
}
