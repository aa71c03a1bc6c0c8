//! Object Materializer: turns locations into parsed, decrypted objects and
//! stream payloads into decoded bytes.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use bytes::Bytes;
use rustc_hash::{FxHashMap, FxHashSet};

use super::locator::{ObjectLocation, ObjectLocationProvider};
use super::security::EncryptionContext;
use crate::codec::filter::FilterChain;
use crate::config::ParseOptions;
use crate::error::{PdfError, Result};
use crate::model::objects::{PDFObjRef, PDFObject, PDFStream};
use crate::parser::{Keyword, PDFParser};

/// Longest chain of references `resolve` follows.
const MAX_REF_CHAIN: usize = 32;

static NO_ENCRYPTION: EncryptionContext = EncryptionContext::none();

thread_local! {
    /// Objects being materialized on this thread, keyed by owner address.
    static RESOLVING: RefCell<FxHashSet<(usize, PDFObjRef)>> = RefCell::new(FxHashSet::default());
}

/// Removes its key from [`RESOLVING`] when dropped.
struct ResolvingGuard {
    key: (usize, PDFObjRef),
}

impl ResolvingGuard {
    fn enter(owner: usize, objref: PDFObjRef) -> Result<Self> {
        let key = (owner, objref);
        let fresh = RESOLVING.with(|set| set.borrow_mut().insert(key));
        if !fresh {
            return Err(PdfError::SyntaxError(format!(
                "circular reference while reading {objref}"
            )));
        }
        Ok(Self { key })
    }
}

impl Drop for ResolvingGuard {
    fn drop(&mut self) {
        RESOLVING.with(|set| {
            set.borrow_mut().remove(&self.key);
        });
    }
}

/// Decoded object stream (`/Type /ObjStm`).
struct ObjectStream {
    data: Vec<u8>,
    first: usize,
    /// `(objid, offset relative to /First)` in header order.
    members: Vec<(u32, usize)>,
}

impl ObjectStream {
    fn parse(container: PDFObjRef, stream: &PDFStream, data: Vec<u8>, lenient: bool) -> Result<Self> {
        let header_int = |key: &str| -> Result<usize> {
            stream
                .get(key)
                .and_then(PDFObject::int_or_none)
                .and_then(|v| usize::try_from(v).ok())
                .ok_or_else(|| {
                    PdfError::SyntaxError(format!("object stream {container} has no valid /{key}"))
                })
        };
        let n = header_int("N")?;
        let first = header_int("First")?;
        let header = data.get(..first).ok_or_else(|| {
            PdfError::SyntaxError(format!("object stream {container} /First beyond its data"))
        })?;

        let mut parser = PDFParser::new(header, lenient);
        let mut members = Vec::with_capacity(n.min(4096));
        for _ in 0..n {
            let pair = (parser.parse_object(), parser.parse_object());
            match pair {
                (Ok(PDFObject::Int(objid)), Ok(PDFObject::Int(offset))) => {
                    match (u32::try_from(objid), usize::try_from(offset)) {
                        (Ok(objid), Ok(offset)) => members.push((objid, offset)),
                        _ => break,
                    }
                }
                _ if lenient => break,
                _ => {
                    return Err(PdfError::SyntaxError(format!(
                        "object stream {container} header has fewer than {n} entries"
                    )));
                }
            }
        }

        Ok(Self {
            data,
            first,
            members,
        })
    }

    /// Offset of `objid`, preferring the member at `index`.
    fn member_offset(&self, objid: u32, index: usize) -> Option<usize> {
        match self.members.get(index) {
            Some(&(id, offset)) if id == objid => Some(offset),
            _ => self
                .members
                .iter()
                .find(|(id, _)| *id == objid)
                .map(|&(_, offset)| offset),
        }
    }
}

/// Reads objects out of a document buffer.
pub struct ObjectMaterializer {
    data: Bytes,
    lenient: bool,
    locator: ObjectLocationProvider,
    encryption: OnceLock<EncryptionContext>,
    object_streams: Mutex<FxHashMap<u32, Arc<ObjectStream>>>,
    /// Members of every object stream found by the scan; built on demand.
    objstm_index: OnceLock<Arc<FxHashMap<u32, (u32, usize)>>>,
}

impl ObjectMaterializer {
    pub fn new(data: impl Into<Bytes>, options: &ParseOptions) -> Self {
        let data = data.into();
        Self {
            locator: ObjectLocationProvider::new(data.clone(), options),
            data,
            lenient: options.lenient,
            encryption: OnceLock::new(),
            object_streams: Mutex::new(FxHashMap::default()),
            objstm_index: OnceLock::new(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub const fn lenient(&self) -> bool {
        self.lenient
    }

    pub const fn locator(&self) -> &ObjectLocationProvider {
        &self.locator
    }

    /// Install the document's encryption context. Only the first call
    /// succeeds; until then every object is read as plaintext.
    pub fn install_encryption(&self, context: EncryptionContext) -> Result<()> {
        self.encryption
            .set(context)
            .map_err(|_| PdfError::SyntaxError("encryption context already installed".into()))
    }

    pub fn encryption(&self) -> &EncryptionContext {
        self.encryption.get().unwrap_or(&NO_ENCRYPTION)
    }

    fn owner_key(&self) -> usize {
        std::ptr::from_ref(self) as usize
    }

    /// Parse the indirect object whose header starts at `offset`.
    ///
    /// Returns the header's reference and the object as stored: strings
    /// are still encrypted and stream payloads still filtered. With
    /// `scan_stream` the payload is bounded by `endstream` instead of
    /// `/Length`.
    pub fn parse_object_at(
        &self,
        offset: usize,
        expected: Option<PDFObjRef>,
        scan_stream: bool,
    ) -> Result<(PDFObjRef, PDFObject)> {
        let bytes = self
            .data
            .get(offset..)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                PdfError::SyntaxError(format!(
                    "object offset {offset} beyond end of file ({} bytes)",
                    self.data.len()
                ))
            })?;
        let mut parser = PDFParser::new(bytes, self.lenient);
        let objref = parser
            .parse_indirect_header()
            .map_err(|_| PdfError::SyntaxError(format!("no object header at offset {offset}")))?;
        if let Some(expected) = expected
            && expected.objid != objref.objid
        {
            return Err(PdfError::SyntaxError(format!(
                "expected object {expected} at offset {offset}, found {objref}"
            )));
        }

        match parser.parse_object()? {
            PDFObject::Dict(attrs) if parser.eat_keyword(&Keyword::Stream) => {
                parser.scanner().skip_stream_eol();
                let start = offset + parser.position();
                let stream = self.read_stream_payload(objref, attrs, start, scan_stream)?;
                Ok((objref, PDFObject::Stream(Box::new(stream))))
            }
            obj => {
                if !parser.eat_keyword(&Keyword::EndObj) && !self.lenient {
                    return Err(PdfError::SyntaxError(format!(
                        "object {objref} at offset {offset} has no endobj"
                    )));
                }
                Ok((objref, obj))
            }
        }
    }

    fn read_stream_payload(
        &self,
        objref: PDFObjRef,
        attrs: HashMap<String, PDFObject>,
        start: usize,
        scan_stream: bool,
    ) -> Result<PDFStream> {
        let is_index_stream = matches!(
            attrs.get("Type"),
            Some(PDFObject::Name(t)) if t == "XRef" || t == "ObjStm"
        );
        let declared = if scan_stream || is_index_stream {
            None
        } else {
            self.declared_length(objref, attrs.get("Length"))
        };

        let end = match declared {
            Some(len) if self.endstream_follows(start.saturating_add(len)) => start + len,
            Some(len) if !self.lenient => {
                return Err(PdfError::SyntaxError(format!(
                    "/Length {len} of {objref} does not end at endstream"
                )));
            }
            _ => match find_endstream(&self.data[start.min(self.data.len())..]) {
                Some(len) => start + len,
                None if self.lenient => self.data.len(),
                None => {
                    return Err(PdfError::SyntaxError(format!(
                        "stream {objref} has no endstream"
                    )));
                }
            },
        };

        let mut stream = PDFStream::new(attrs, self.data.slice(start.min(end)..end));
        stream.set_objref(objref);
        Ok(stream)
    }

    /// `/Length`, following one indirect reference.
    fn declared_length(&self, owner: PDFObjRef, length: Option<&PDFObject>) -> Option<usize> {
        let value = match length? {
            PDFObject::Int(n) => *n,
            PDFObject::Ref(r) if r.objid != owner.objid => self.object(*r).ok()?.int_or_none()?,
            _ => return None,
        };
        usize::try_from(value).ok()
    }

    fn endstream_follows(&self, pos: usize) -> bool {
        let Some(rest) = self.data.get(pos..) else {
            return false;
        };
        let skip = rest
            .iter()
            .take_while(|b| matches!(b, b' ' | b'\r' | b'\n' | b'\t' | b'\x0c' | b'\x00'))
            .count();
        rest[skip..].starts_with(b"endstream")
    }

    /// Materialize `objref`: locate, parse, decrypt strings.
    pub fn object(&self, objref: PDFObjRef) -> Result<PDFObject> {
        let _guard = ResolvingGuard::enter(self.owner_key(), objref)?;

        let location = match self.locator.resolve(objref)? {
            Some(location) => location,
            None if self.locator.is_freed(objref.objid) => {
                return Err(PdfError::ObjectNotFound {
                    objid: objref.objid,
                    genno: objref.genno,
                });
            }
            None => self
                .object_stream_fallback(objref)?
                .ok_or(PdfError::ObjectNotFound {
                    objid: objref.objid,
                    genno: objref.genno,
                })?,
        };

        match location {
            ObjectLocation::Compressed {
                stream_objid,
                index,
            } => self.compressed_object(objref, stream_objid, index),
            ObjectLocation::Offset(offset) | ObjectLocation::Scanned(offset) => {
                let scanned = matches!(location, ObjectLocation::Scanned(_));
                let (found, obj) = self.parse_object_at(offset, Some(objref), scanned)?;
                self.encryption().decrypt_strings(found, obj)
            }
        }
    }

    /// Member of an object stream. Its strings were decrypted along with
    /// the container payload.
    fn compressed_object(&self, objref: PDFObjRef, container: u32, index: usize) -> Result<PDFObject> {
        let stream = self.object_stream(container)?;
        let offset = stream
            .member_offset(objref.objid, index)
            .ok_or(PdfError::ObjectNotFound {
                objid: objref.objid,
                genno: objref.genno,
            })?;
        let start = stream.first.saturating_add(offset);
        let bytes = stream.data.get(start..).ok_or_else(|| {
            PdfError::SyntaxError(format!("member {objref} lies beyond object stream {container}"))
        })?;
        PDFParser::new(bytes, self.lenient).parse_object()
    }

    fn object_stream(&self, container: u32) -> Result<Arc<ObjectStream>> {
        if let Ok(cache) = self.object_streams.lock()
            && let Some(stream) = cache.get(&container)
        {
            return Ok(Arc::clone(stream));
        }

        let container_ref = PDFObjRef::new(container, 0);
        let obj = self.object(container_ref)?;
        let stream = obj.as_stream()?;
        let data = self.decode_stream(stream)?;
        let parsed = Arc::new(ObjectStream::parse(container_ref, stream, data, self.lenient)?);

        if let Ok(mut cache) = self.object_streams.lock() {
            cache.insert(container, Arc::clone(&parsed));
        }
        Ok(parsed)
    }

    /// Look for `objref` inside object streams found by the scan.
    fn object_stream_fallback(&self, objref: PDFObjRef) -> Result<Option<ObjectLocation>> {
        Ok(self
            .objstm_index()?
            .get(&objref.objid)
            .map(|&(stream_objid, index)| ObjectLocation::Compressed {
                stream_objid,
                index,
            }))
    }

    /// Object numbers held by object streams the scan found, descending.
    pub fn scanned_compressed_objids(&self) -> Result<Vec<u32>> {
        let mut ids: Vec<u32> = self.objstm_index()?.keys().copied().collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    fn objstm_index(&self) -> Result<Arc<FxHashMap<u32, (u32, usize)>>> {
        if let Some(index) = self.objstm_index.get() {
            return Ok(Arc::clone(index));
        }
        let built = Arc::new(self.build_objstm_index()?);
        Ok(Arc::clone(self.objstm_index.get_or_init(|| built)))
    }

    fn build_objstm_index(&self) -> Result<FxHashMap<u32, (u32, usize)>> {
        let scan = self.locator.brute_force().offsets()?;
        let mut containers: Vec<(PDFObjRef, usize)> = scan
            .refs()
            .filter(|&(_, offset)| mentions_objstm(&self.data, offset))
            .collect();
        containers.sort_unstable_by_key(|&(_, offset)| std::cmp::Reverse(offset));

        let mut index = FxHashMap::default();
        for (container, _) in containers {
            let Ok(stream) = self.object_stream(container.objid) else {
                continue;
            };
            for (i, &(objid, _)) in stream.members.iter().enumerate() {
                index.entry(objid).or_insert((container.objid, i));
            }
        }
        tracing::debug!(members = index.len(), "indexed scanned object streams");
        Ok(index)
    }

    /// Follow references until a direct object is reached.
    pub fn resolve(&self, obj: &PDFObject) -> Result<PDFObject> {
        let mut current = obj.clone();
        for _ in 0..MAX_REF_CHAIN {
            match current {
                PDFObject::Ref(r) => current = self.object(r)?,
                direct => return Ok(direct),
            }
        }
        Err(PdfError::SyntaxError(format!(
            "reference chain longer than {MAX_REF_CHAIN}"
        )))
    }

    /// Decrypt (cross-reference streams excepted) and undo every filter.
    pub fn decode_stream(&self, stream: &PDFStream) -> Result<Vec<u8>> {
        let mut raw = Cow::Borrowed(stream.get_rawdata());
        let encryption = self.encryption();
        if encryption.is_encrypted()
            && !stream.is_type("XRef")
            && let Some(objref) = stream.objref
        {
            raw = Cow::Owned(encryption.decrypt_stream(objref, &raw, &stream.attrs)?);
        }

        let chain = FilterChain::from_stream_attrs(&stream.attrs, |o| {
            self.resolve(o).unwrap_or(PDFObject::Null)
        })?;
        chain.decode(&raw)
    }

    /// Decoded payload of the stream object `objref`.
    pub fn stream_bytes(&self, objref: PDFObjRef) -> Result<Vec<u8>> {
        let obj = self.object(objref)?;
        self.decode_stream(obj.as_stream()?)
    }
}

/// Payload length up to `endstream`, minus the end-of-line before it.
fn find_endstream(data: &[u8]) -> Option<usize> {
    let pos = data.windows(9).position(|w| w == b"endstream")?;
    let body = &data[..pos];
    let trimmed = body
        .strip_suffix(b"\r\n")
        .or_else(|| body.strip_suffix(b"\n"))
        .or_else(|| body.strip_suffix(b"\r"))
        .unwrap_or(body);
    Some(trimmed.len())
}

fn mentions_objstm(data: &[u8], offset: usize) -> bool {
    let end = (offset + 4096).min(data.len());
    data.get(offset..end)
        .is_some_and(|head| head.windows(7).any(|w| w == b"/ObjStm"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn materializer(data: &'static [u8], lenient: bool) -> ObjectMaterializer {
        ObjectMaterializer::new(
            Bytes::from_static(data),
            &ParseOptions::default().lenient(lenient),
        )
    }

    #[test]
    fn endstream_trims_single_eol() {
        assert_eq!(find_endstream(b"abc\r\nendstream"), Some(3));
        assert_eq!(find_endstream(b"abc \nendstream"), Some(4));
        assert_eq!(find_endstream(b"abc"), None);
    }

    #[test]
    fn stream_bounded_by_length() {
        let m = materializer(b"4 0 obj\n<< /Length 3 >>\nstream\nabcendstream\nendobj", false);
        let (objref, obj) = m.parse_object_at(0, None, false).unwrap();
        assert_eq!(objref, PDFObjRef::new(4, 0));
        let stream = obj.as_stream().unwrap();
        assert_eq!(stream.get_rawdata(), b"abc");
        assert_eq!(stream.objref, Some(objref));
    }

    #[test]
    fn wrong_length_scans_when_lenient() {
        let data: &[u8] = b"4 0 obj\n<< /Length 99 >>\nstream\nabcd\nendstream\nendobj";
        let (_, obj) = materializer(data, true).parse_object_at(0, None, false).unwrap();
        assert_eq!(obj.as_stream().unwrap().get_rawdata(), b"abcd");
        assert!(materializer(data, false).parse_object_at(0, None, false).is_err());
    }

    #[test]
    fn indirect_length_is_resolved() {
        let m = materializer(
            b"1 0 obj\n<< /Length 2 0 R >>\nstream\nxyz\nendstream\nendobj\n2 0 obj\n3\nendobj\n",
            false,
        );
        assert_eq!(m.stream_bytes(PDFObjRef::new(1, 0)).unwrap(), b"xyz");
    }

    #[test]
    fn header_mismatch_is_rejected() {
        let m = materializer(b"5 0 obj 1 endobj", true);
        assert!(m.parse_object_at(0, Some(PDFObjRef::new(6, 0)), false).is_err());
        assert!(m.parse_object_at(100, None, false).is_err());
    }

    #[test]
    fn self_referencing_chain_is_an_error() {
        let m = materializer(b"1 0 obj 1 0 R endobj", true);
        let err = m.resolve(&PDFObject::Ref(PDFObjRef::new(1, 0))).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn encryption_installs_once() {
        let m = materializer(b"", true);
        assert!(!m.encryption().is_encrypted());
        m.install_encryption(EncryptionContext::none()).unwrap();
        assert!(m.install_encryption(EncryptionContext::none()).is_err());
    }
}
