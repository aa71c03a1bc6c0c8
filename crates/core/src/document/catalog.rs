//! PDF Document - main entry point.
//!
//! Opening a document runs the bootstrap once:
//! - header
//! - `startxref` and the cross-reference chain (or its recovery)
//! - table installation into the location provider
//! - encryption context
//! - document catalog
//!
//! After that the document is read-only and can be shared across threads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use indexmap::IndexMap;
use rayon::prelude::*;

use super::header::parse_header;
use super::materializer::ObjectMaterializer;
use super::security::EncryptionContext;
use super::xref::{CrossReferenceParser, CrossReferenceTable, Trailer, find_startxref};
use crate::config::ParseOptions;
use crate::error::{PdfError, Result};
use crate::model::objects::{PDFObjRef, PDFObject};

/// Bounded LRU of materialized objects.
struct ObjectCache {
    capacity: usize,
    map: IndexMap<PDFObjRef, Arc<PDFObject>>,
}

impl ObjectCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: IndexMap::new(),
        }
    }

    fn get(&mut self, objref: PDFObjRef) -> Option<Arc<PDFObject>> {
        if self.capacity == 0 {
            return None;
        }
        let index = self.map.get_index_of(&objref)?;
        let value = Arc::clone(self.map.get_index(index)?.1);
        let last = self.map.len() - 1;
        if index != last {
            self.map.move_index(index, last);
        }
        Some(value)
    }

    fn insert(&mut self, objref: PDFObjRef, value: Arc<PDFObject>) {
        if self.capacity == 0 {
            return;
        }
        self.map.shift_remove(&objref);
        self.map.insert(objref, value);
        if self.map.len() > self.capacity {
            self.map.shift_remove_index(0);
        }
    }
}

fn is_catalog(obj: &PDFObject) -> bool {
    obj.dict_like()
        .and_then(|d| d.get("Type"))
        .and_then(|t| t.as_name().ok())
        == Some("Catalog")
}

/// An opened PDF document.
pub struct PDFDocument {
    materializer: ObjectMaterializer,
    version: String,
    trailer: Trailer,
    root: Option<PDFObjRef>,
    catalog: HashMap<String, PDFObject>,
    /// The `/Encrypt` dictionary as stored; never decrypted.
    encrypt: Option<(PDFObjRef, Arc<PDFObject>)>,
    cache: Mutex<ObjectCache>,
}

impl std::fmt::Debug for PDFDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PDFDocument")
            .field("version", &self.version)
            .field("root", &self.root)
            .field("encrypted", &self.is_encrypted())
            .finish_non_exhaustive()
    }
}

impl PDFDocument {
    /// Open with default options and the given password.
    pub fn new(data: impl Into<Bytes>, password: &str) -> Result<Self> {
        Self::open(data, ParseOptions::default().password(password))
    }

    pub fn open(data: impl Into<Bytes>, options: ParseOptions) -> Result<Self> {
        let data = data.into();
        let lenient = options.lenient;
        let header = parse_header(&data, lenient)?;
        let materializer = ObjectMaterializer::new(data, &options);

        let start = find_startxref(materializer.data());
        let table = CrossReferenceParser::new(&materializer).parse(start)?;
        let trailer = table.trailer().clone();
        tracing::debug!(
            objects = table.len(),
            sections = table.sections().len(),
            recovered = table.is_recovered(),
            "cross-reference table built"
        );
        materializer.locator().install_table(table)?;

        let encrypt = match &trailer.encrypt {
            Some(entry) => Some(Self::install_encryption(
                &materializer,
                entry,
                &trailer.id,
                &options.password,
            )?),
            None => {
                materializer.install_encryption(EncryptionContext::none())?;
                None
            }
        };

        let (root, catalog) = Self::load_catalog(&materializer, trailer.root, lenient)?;

        Ok(Self {
            materializer,
            version: header.version,
            trailer,
            root,
            catalog,
            encrypt,
            cache: Mutex::new(ObjectCache::new(options.cache_capacity)),
        })
    }

    /// Read `/Encrypt` without caching or decrypting it, then build the
    /// context. Setup errors end the open here.
    fn install_encryption(
        materializer: &ObjectMaterializer,
        entry: &PDFObject,
        doc_id: &[Vec<u8>],
        password: &str,
    ) -> Result<(PDFObjRef, Arc<PDFObject>)> {
        let (objref, obj) = match entry {
            PDFObject::Ref(r) => (*r, materializer.object(*r)?),
            // A direct dictionary has no reference of its own.
            direct => (PDFObjRef::new(0, 0), direct.clone()),
        };
        let dict = obj.dict_like().ok_or(PdfError::TypeError {
            expected: "dict",
            got: obj.type_name(),
        })?;
        let context = EncryptionContext::new(dict, doc_id, password)?;
        tracing::debug!(algorithm = ?context.algorithm(), "document is encrypted");
        materializer.install_encryption(context)?;
        Ok((objref, Arc::new(obj)))
    }

    fn load_catalog(
        materializer: &ObjectMaterializer,
        root: Option<PDFObjRef>,
        lenient: bool,
    ) -> Result<(Option<PDFObjRef>, HashMap<String, PDFObject>)> {
        let found = match root.map(|r| (r, materializer.object(r))) {
            Some((r, Ok(obj))) => Some((r, obj)),
            Some((r, Err(err))) if lenient => {
                tracing::warn!(root = %r, error = %err, "unreadable /Root");
                None
            }
            Some((_, Err(err))) => return Err(err),
            None => None,
        };

        let (root, obj) = match found {
            Some(found) => found,
            None if lenient => Self::find_catalog(materializer)?.ok_or(PdfError::MissingRoot)?,
            None => return Err(PdfError::MissingRoot),
        };

        match obj {
            PDFObject::Dict(mut dict) => {
                if lenient && !dict.contains_key("Type") {
                    tracing::warn!(root = %root, "catalog without /Type");
                    dict.insert("Type".to_string(), PDFObject::Name("Catalog".into()));
                }
                Ok((Some(root), dict))
            }
            other => Err(PdfError::TypeError {
                expected: "dict",
                got: other.type_name(),
            }),
        }
    }

    /// Newest scanned object with `/Type /Catalog`, looking inside object
    /// streams last.
    fn find_catalog(materializer: &ObjectMaterializer) -> Result<Option<(PDFObjRef, PDFObject)>> {
        let scan = materializer.locator().brute_force().offsets()?;
        let data = materializer.data();
        let mut candidates: Vec<(PDFObjRef, usize)> = scan
            .refs()
            .filter(|&(_, offset)| {
                let end = (offset + 4096).min(data.len());
                data[offset..end].windows(8).any(|w| w == b"/Catalog")
            })
            .collect();
        candidates.sort_unstable_by_key(|&(_, offset)| std::cmp::Reverse(offset));

        let direct = candidates.into_iter().map(|(objref, _)| objref);
        let compressed = materializer
            .scanned_compressed_objids()?
            .into_iter()
            .map(|objid| PDFObjRef::new(objid, 0));

        for objref in direct.chain(compressed) {
            if let Ok(obj @ PDFObject::Dict(_)) = materializer.object(objref)
                && is_catalog(&obj)
            {
                tracing::warn!(root = %objref, "using scanned catalog");
                return Ok(Some((objref, obj)));
            }
        }
        Ok(None)
    }

    /// Header version, e.g. `"1.7"`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Merged trailer of the newest revision.
    pub const fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    pub const fn root(&self) -> Option<PDFObjRef> {
        self.root
    }

    /// Document catalog dictionary.
    pub const fn catalog(&self) -> &HashMap<String, PDFObject> {
        &self.catalog
    }

    /// `/Info` dictionary, if present and readable.
    pub fn info(&self) -> Option<HashMap<String, PDFObject>> {
        let info = self.getobj(self.trailer.info?).ok()?;
        info.dict_like().cloned()
    }

    pub fn xref(&self) -> Option<&CrossReferenceTable> {
        self.materializer.locator().table()
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption().is_encrypted()
    }

    pub fn encryption(&self) -> &EncryptionContext {
        self.materializer.encryption()
    }

    pub const fn materializer(&self) -> &ObjectMaterializer {
        &self.materializer
    }

    /// Object numbers listed in the cross-reference table, ascending.
    pub fn objids(&self) -> Vec<u32> {
        self.xref().map(CrossReferenceTable::objids).unwrap_or_default()
    }

    /// True if the table was rebuilt or any lookup needed the scan.
    pub fn used_fallback(&self) -> bool {
        self.xref().is_some_and(CrossReferenceTable::is_recovered)
            || self.materializer.locator().fallback_count() > 0
    }

    /// Get an object by reference, sharing the cached copy.
    pub fn getobj(&self, objref: PDFObjRef) -> Result<Arc<PDFObject>> {
        if let Some((encrypt_ref, obj)) = &self.encrypt
            && *encrypt_ref == objref
        {
            return Ok(Arc::clone(obj));
        }
        if let Ok(mut cache) = self.cache.lock()
            && let Some(obj) = cache.get(objref)
        {
            return Ok(obj);
        }

        let obj = Arc::new(self.materializer.object(objref)?);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(objref, Arc::clone(&obj));
        }
        Ok(obj)
    }

    /// Follow references. Anything that cannot be resolved reads as null.
    pub fn resolve(&self, obj: &PDFObject) -> PDFObject {
        let mut current = obj.clone();
        for _ in 0..32 {
            match current {
                PDFObject::Ref(r) => match self.getobj(r) {
                    Ok(next) => current = (*next).clone(),
                    Err(err) => {
                        tracing::debug!(objref = %r, error = %err, "unresolvable reference");
                        return PDFObject::Null;
                    }
                },
                direct => return direct,
            }
        }
        PDFObject::Null
    }

    /// Decrypted, de-filtered payload of the stream object `objref`.
    pub fn stream_bytes(&self, objref: PDFObjRef) -> Result<Vec<u8>> {
        let obj = self.getobj(objref)?;
        self.materializer.decode_stream(obj.as_stream()?)
    }

    /// [`stream_bytes`](Self::stream_bytes) for many objects in parallel.
    pub fn stream_bytes_many(&self, refs: &[PDFObjRef]) -> Vec<Result<Vec<u8>>> {
        refs.par_iter().map(|&r| self.stream_bytes(r)).collect()
    }
}
