//! Standard security handler and the per-document encryption context.
//!
//! The context is built once while the document opens. Authentication and
//! parameter errors surface there; afterwards decryption is a pure
//! function of the object reference and the bytes.

use std::collections::HashMap;

use sha2::{Digest, Sha256, Sha384, Sha512};

use super::saslprep::saslprep;
use crate::codec::aes::{AES_BLOCK, aes_cbc_decrypt, aes_cbc_encrypt, unpad_aes};
use crate::codec::arcfour::{Arcfour, rc4};
use crate::error::{PdfError, Result};
use crate::model::objects::{PDFObjRef, PDFObject};

/// Password padding string (PDF 1.7, Algorithm 2).
pub const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// The `/V` entry of an encryption dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionAlgorithmCode {
    /// `/V 0` or an unknown value.
    Unrecognized,
    /// `/V 1`: 40-bit RC4.
    Rc4Bits40,
    /// `/V 2`: RC4 with keys longer than 40 bits.
    Rc4Extended,
    /// `/V 3`: unpublished 40 to 128-bit algorithm.
    Unpublished,
    /// `/V 4`: crypt filters with 128-bit keys.
    CryptFilter128,
    /// `/V 5`: crypt filters with 256-bit keys.
    CryptFilter256,
    /// `/V 6` and above.
    Undocumented,
}

impl EncryptionAlgorithmCode {
    pub const fn from_value(v: i64) -> Self {
        match v {
            1 => Self::Rc4Bits40,
            2 => Self::Rc4Extended,
            3 => Self::Unpublished,
            4 => Self::CryptFilter128,
            5 => Self::CryptFilter256,
            v if v >= 6 => Self::Undocumented,
            _ => Self::Unrecognized,
        }
    }

    pub const fn is_supported(self) -> bool {
        matches!(
            self,
            Self::Rc4Bits40 | Self::Rc4Extended | Self::CryptFilter128 | Self::CryptFilter256
        )
    }
}

/// Decrypts strings and streams of one document.
pub trait SecurityHandler: Send + Sync {
    /// Decrypt `data` belonging to `objref`.
    ///
    /// `attrs` is `Some` for stream payloads and `None` for strings.
    fn decrypt(
        &self,
        objref: PDFObjRef,
        data: &[u8],
        attrs: Option<&HashMap<String, PDFObject>>,
    ) -> Result<Vec<u8>>;
}

/// Encryption state shared by every object read from a document.
pub struct EncryptionContext {
    algorithm: EncryptionAlgorithmCode,
    handler: Option<Box<dyn SecurityHandler>>,
}

impl std::fmt::Debug for EncryptionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionContext")
            .field("algorithm", &self.algorithm)
            .field("encrypted", &self.handler.is_some())
            .finish()
    }
}

impl EncryptionContext {
    /// Context for an unencrypted document: every operation is identity.
    pub const fn none() -> Self {
        Self {
            algorithm: EncryptionAlgorithmCode::Unrecognized,
            handler: None,
        }
    }

    /// Authenticate `password` against an `/Encrypt` dictionary.
    ///
    /// `doc_id` is the trailer `/ID` array; only its first element is used.
    pub fn new(
        encrypt: &HashMap<String, PDFObject>,
        doc_id: &[Vec<u8>],
        password: &str,
    ) -> Result<Self> {
        let filter = encrypt.get("Filter").and_then(|f| f.as_name().ok());
        if let Some(name) = filter
            && name != "Standard"
        {
            return Err(PdfError::EncryptionError(format!(
                "unsupported security handler /{name}"
            )));
        }

        let v = int_or(encrypt, "V", 0);
        let r = int_or(encrypt, "R", 0);
        let algorithm = EncryptionAlgorithmCode::from_value(v);
        if !algorithm.is_supported() {
            return Err(PdfError::UnsupportedEncryption { v, r });
        }

        let docid = doc_id.first().cloned().unwrap_or_default();
        let handler: Box<dyn SecurityHandler> = match (algorithm, r) {
            (EncryptionAlgorithmCode::Rc4Bits40 | EncryptionAlgorithmCode::Rc4Extended, 2 | 3) => {
                Box::new(Rc4Handler::new(encrypt, docid, password)?)
            }
            (EncryptionAlgorithmCode::CryptFilter128, 4) => {
                Box::new(Aes128Handler::new(encrypt, docid, password)?)
            }
            (EncryptionAlgorithmCode::CryptFilter256, 5 | 6) => {
                Box::new(Aes256Handler::new(encrypt, password)?)
            }
            _ => return Err(PdfError::UnsupportedEncryption { v, r }),
        };

        tracing::debug!(v, r, "security handler ready");
        Ok(Self {
            algorithm,
            handler: Some(handler),
        })
    }

    pub const fn algorithm(&self) -> EncryptionAlgorithmCode {
        self.algorithm
    }

    pub const fn is_encrypted(&self) -> bool {
        self.handler.is_some()
    }

    /// Decrypt bytes of `objref` with the string method.
    pub fn decrypt(&self, objref: PDFObjRef, data: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_string(objref, data)
    }

    pub fn decrypt_string(&self, objref: PDFObjRef, data: &[u8]) -> Result<Vec<u8>> {
        match &self.handler {
            Some(handler) => handler.decrypt(objref, data, None),
            None => Ok(data.to_vec()),
        }
    }

    pub fn decrypt_stream(
        &self,
        objref: PDFObjRef,
        data: &[u8],
        attrs: &HashMap<String, PDFObject>,
    ) -> Result<Vec<u8>> {
        match &self.handler {
            Some(handler) => handler.decrypt(objref, data, Some(attrs)),
            None => Ok(data.to_vec()),
        }
    }

    /// Decrypt every string inside `obj`, descending into arrays,
    /// dictionaries and stream attributes. Stream payloads are untouched.
    pub fn decrypt_strings(&self, objref: PDFObjRef, obj: PDFObject) -> Result<PDFObject> {
        if self.handler.is_none() {
            return Ok(obj);
        }
        Ok(match obj {
            PDFObject::String(data) => PDFObject::String(self.decrypt_string(objref, &data)?),
            PDFObject::Array(items) => PDFObject::Array(
                items
                    .into_iter()
                    .map(|item| self.decrypt_strings(objref, item))
                    .collect::<Result<_>>()?,
            ),
            PDFObject::Dict(dict) => PDFObject::Dict(self.decrypt_dict(objref, dict)?),
            PDFObject::Stream(mut stream) => {
                let attrs = std::mem::take(&mut stream.attrs);
                stream.attrs = self.decrypt_dict(objref, attrs)?;
                PDFObject::Stream(stream)
            }
            other => other,
        })
    }

    fn decrypt_dict(
        &self,
        objref: PDFObjRef,
        dict: HashMap<String, PDFObject>,
    ) -> Result<HashMap<String, PDFObject>> {
        dict.into_iter()
            .map(|(k, v)| Ok((k, self.decrypt_strings(objref, v)?)))
            .collect()
    }
}

impl Default for EncryptionContext {
    fn default() -> Self {
        Self::none()
    }
}

/// Crypt filter method named by `/CFM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CryptMethod {
    Identity,
    Rc4,
    Aes128,
    Aes256,
}

impl CryptMethod {
    /// Resolve `/StrF` or `/StmF` through the `/CF` dictionary.
    fn from_encrypt(encrypt: &HashMap<String, PDFObject>, key: &str) -> Result<Self> {
        let name = encrypt
            .get(key)
            .and_then(|n| n.as_name().ok())
            .unwrap_or("Identity");
        if name == "Identity" {
            return Ok(Self::Identity);
        }

        let filter = encrypt
            .get("CF")
            .and_then(|cf| cf.as_dict().ok())
            .and_then(|cf| cf.get(name))
            .and_then(|f| f.as_dict().ok())
            .ok_or_else(|| {
                PdfError::EncryptionError(format!("crypt filter /{name} is not defined"))
            })?;

        match filter.get("CFM").and_then(|m| m.as_name().ok()) {
            None | Some("None") => Ok(Self::Identity),
            Some("V2") => Ok(Self::Rc4),
            Some("AESV2") => Ok(Self::Aes128),
            Some("AESV3") => Ok(Self::Aes256),
            Some(other) => Err(PdfError::EncryptionError(format!(
                "unknown crypt filter method /{other}"
            ))),
        }
    }
}

fn is_metadata(attrs: Option<&HashMap<String, PDFObject>>) -> bool {
    attrs
        .and_then(|a| a.get("Type"))
        .and_then(|t| t.as_name().ok())
        .is_some_and(|t| t == "Metadata")
}

fn int_or(dict: &HashMap<String, PDFObject>, key: &str, default: i64) -> i64 {
    dict.get(key).and_then(PDFObject::int_or_none).unwrap_or(default)
}

fn required_bytes(dict: &HashMap<String, PDFObject>, key: &str, min: usize) -> Result<Vec<u8>> {
    let bytes = dict
        .get(key)
        .ok_or_else(|| PdfError::EncryptionError(format!("/Encrypt has no /{key}")))?
        .as_string()?;
    if bytes.len() < min {
        return Err(PdfError::EncryptionError(format!(
            "/{key} is {} bytes, expected at least {min}",
            bytes.len()
        )));
    }
    Ok(bytes.to_vec())
}

/// Password padded or truncated to 32 bytes.
fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PASSWORD_PADDING;
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PASSWORD_PADDING[..32 - len]);
    padded
}

fn xor_key(key: &[u8], i: u8) -> Vec<u8> {
    key.iter().map(|b| b ^ i).collect()
}

/// Shared key derivation for revisions 2 through 4.
struct LegacyKeys {
    r: i64,
    /// File key length in bytes.
    key_len: usize,
    o: Vec<u8>,
    u: Vec<u8>,
    p: u32,
    docid: Vec<u8>,
    encrypt_metadata: bool,
}

impl LegacyKeys {
    fn from_encrypt(
        encrypt: &HashMap<String, PDFObject>,
        docid: Vec<u8>,
        r: i64,
    ) -> Result<Self> {
        let key_len = match r {
            2 => 5,
            3 => (int_or(encrypt, "Length", 40).clamp(40, 128) / 8) as usize,
            _ => 16,
        };
        let p = encrypt
            .get("P")
            .ok_or_else(|| PdfError::EncryptionError("/Encrypt has no /P".into()))?
            .as_int()?;
        Ok(Self {
            r,
            key_len,
            o: required_bytes(encrypt, "O", 32)?,
            u: required_bytes(encrypt, "U", 16)?,
            // /P is a signed 32-bit value in the file.
            p: p as u32,
            docid,
            encrypt_metadata: encrypt
                .get("EncryptMetadata")
                .and_then(|b| b.as_bool().ok())
                .unwrap_or(true),
        })
    }

    /// Algorithm 2: file key from a user password.
    fn file_key(&self, password: &[u8]) -> Vec<u8> {
        let mut context = md5::Context::new();
        context.consume(pad_password(password));
        context.consume(&self.o[..32]);
        context.consume(self.p.to_le_bytes());
        context.consume(&self.docid);
        if self.r >= 4 && !self.encrypt_metadata {
            context.consume([0xFF; 4]);
        }
        let mut digest = context.finalize().0;
        if self.r >= 3 {
            for _ in 0..50 {
                digest = md5::compute(&digest[..self.key_len]).0;
            }
        }
        digest[..self.key_len].to_vec()
    }

    /// Algorithms 4 and 5: the `/U` value a file key produces.
    fn u_value(&self, key: &[u8]) -> Result<Vec<u8>> {
        if self.r == 2 {
            return rc4(key, &PASSWORD_PADDING);
        }
        let mut context = md5::Context::new();
        context.consume(PASSWORD_PADDING);
        context.consume(&self.docid);
        let mut result = rc4(key, &context.finalize().0)?;
        for i in 1..20u8 {
            result = rc4(&xor_key(key, i), &result)?;
        }
        Ok(result)
    }

    fn check_user(&self, password: &[u8]) -> Result<Option<Vec<u8>>> {
        let key = self.file_key(password);
        let computed = self.u_value(&key)?;
        // Revision 3 and later only define the first 16 bytes.
        let matches = if self.r == 2 {
            computed[..] == self.u[..self.u.len().min(32)]
        } else {
            computed[..16] == self.u[..16]
        };
        Ok(matches.then_some(key))
    }

    /// Algorithm 7: recover the user password from `/O`.
    fn check_owner(&self, password: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut digest = md5::compute(pad_password(password)).0;
        if self.r >= 3 {
            for _ in 0..50 {
                digest = md5::compute(&digest[..self.key_len]).0;
            }
        }
        let key = &digest[..self.key_len];

        let user_password = if self.r == 2 {
            rc4(key, &self.o[..32])?
        } else {
            let mut result = self.o[..32].to_vec();
            for i in (0..20u8).rev() {
                result = rc4(&xor_key(key, i), &result)?;
            }
            result
        };
        self.check_user(&user_password)
    }

    fn authenticate(&self, password: &str) -> Result<Vec<u8>> {
        let password = password.as_bytes();
        if let Some(key) = self.check_user(password)? {
            return Ok(key);
        }
        if let Some(key) = self.check_owner(password)? {
            tracing::debug!("authenticated with owner password");
            return Ok(key);
        }
        Err(PdfError::IncorrectPassword)
    }

    /// Algorithm 1: per-object key.
    fn object_key(&self, key: &[u8], objref: PDFObjRef, aes: bool) -> Vec<u8> {
        let mut context = md5::Context::new();
        context.consume(key);
        context.consume(&objref.objid.to_le_bytes()[..3]);
        context.consume(&objref.genno.to_le_bytes()[..2]);
        if aes {
            context.consume(b"sAlT");
        }
        let digest = context.finalize().0;
        digest[..(key.len() + 5).min(16)].to_vec()
    }
}

/// Split the leading IV off `data` and decrypt the rest.
///
/// Data shorter than one block is returned untouched; a trailing partial
/// block is dropped.
fn aes_decrypt_payload(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < AES_BLOCK {
        return Ok(data.to_vec());
    }
    let (iv, ciphertext) = data.split_at(AES_BLOCK);
    let whole = ciphertext.len() - ciphertext.len() % AES_BLOCK;
    if whole == 0 {
        return Ok(Vec::new());
    }
    let plaintext = aes_cbc_decrypt(key, iv, &ciphertext[..whole])?;
    Ok(unpad_aes(&plaintext).to_vec())
}

/// Revisions 2 and 3: RC4 for strings and streams alike.
struct Rc4Handler {
    keys: LegacyKeys,
    key: Vec<u8>,
}

impl Rc4Handler {
    fn new(encrypt: &HashMap<String, PDFObject>, docid: Vec<u8>, password: &str) -> Result<Self> {
        let r = int_or(encrypt, "R", 2);
        let keys = LegacyKeys::from_encrypt(encrypt, docid, r)?;
        let key = keys.authenticate(password)?;
        Ok(Self { keys, key })
    }
}

impl SecurityHandler for Rc4Handler {
    fn decrypt(
        &self,
        objref: PDFObjRef,
        data: &[u8],
        _attrs: Option<&HashMap<String, PDFObject>>,
    ) -> Result<Vec<u8>> {
        let key = self.keys.object_key(&self.key, objref, false);
        Ok(Arcfour::new(&key)?.process(data))
    }
}

/// Revision 4: crypt filters choosing RC4 or AES-128 per string and stream.
struct Aes128Handler {
    keys: LegacyKeys,
    key: Vec<u8>,
    strf: CryptMethod,
    stmf: CryptMethod,
}

impl Aes128Handler {
    fn new(encrypt: &HashMap<String, PDFObject>, docid: Vec<u8>, password: &str) -> Result<Self> {
        let strf = CryptMethod::from_encrypt(encrypt, "StrF")?;
        let stmf = CryptMethod::from_encrypt(encrypt, "StmF")?;
        if strf == CryptMethod::Aes256 || stmf == CryptMethod::Aes256 {
            return Err(PdfError::EncryptionError(
                "AESV3 crypt filter requires /V 5".into(),
            ));
        }
        let keys = LegacyKeys::from_encrypt(encrypt, docid, 4)?;
        let key = keys.authenticate(password)?;
        Ok(Self {
            keys,
            key,
            strf,
            stmf,
        })
    }
}

impl SecurityHandler for Aes128Handler {
    fn decrypt(
        &self,
        objref: PDFObjRef,
        data: &[u8],
        attrs: Option<&HashMap<String, PDFObject>>,
    ) -> Result<Vec<u8>> {
        if !self.keys.encrypt_metadata && is_metadata(attrs) {
            return Ok(data.to_vec());
        }
        let method = if attrs.is_some() { self.stmf } else { self.strf };
        match method {
            CryptMethod::Identity | CryptMethod::Aes256 => Ok(data.to_vec()),
            CryptMethod::Rc4 => {
                let key = self.keys.object_key(&self.key, objref, false);
                Ok(Arcfour::new(&key)?.process(data))
            }
            CryptMethod::Aes128 => {
                let key = self.keys.object_key(&self.key, objref, true);
                aes_decrypt_payload(&key, data)
            }
        }
    }
}

/// Revisions 5 and 6: AES-256 with the file key used directly.
struct Aes256Handler {
    key: Vec<u8>,
    strf: CryptMethod,
    stmf: CryptMethod,
    encrypt_metadata: bool,
}

/// Hash, validation salt and key salt packed into `/O` or `/U`.
struct PasswordEntry<'a> {
    hash: &'a [u8],
    validation_salt: &'a [u8],
    key_salt: &'a [u8],
}

impl<'a> PasswordEntry<'a> {
    fn split(value: &'a [u8]) -> Self {
        Self {
            hash: &value[..32],
            validation_salt: &value[32..40],
            key_salt: &value[40..48],
        }
    }
}

impl Aes256Handler {
    fn new(encrypt: &HashMap<String, PDFObject>, password: &str) -> Result<Self> {
        let r = int_or(encrypt, "R", 6);
        let strf = CryptMethod::from_encrypt(encrypt, "StrF")?;
        let stmf = CryptMethod::from_encrypt(encrypt, "StmF")?;
        if matches!(strf, CryptMethod::Rc4 | CryptMethod::Aes128)
            || matches!(stmf, CryptMethod::Rc4 | CryptMethod::Aes128)
        {
            return Err(PdfError::EncryptionError(
                "/V 5 only supports the AESV3 crypt filter".into(),
            ));
        }

        let o = required_bytes(encrypt, "O", 48)?;
        let u = required_bytes(encrypt, "U", 48)?;
        let oe = required_bytes(encrypt, "OE", 32)?;
        let ue = required_bytes(encrypt, "UE", 32)?;

        let password = normalize_password(password, r)?;
        let owner = PasswordEntry::split(&o);
        let user = PasswordEntry::split(&u);
        let u48 = &u[..48];

        let key = if password_hash(r, &password, owner.validation_salt, Some(u48))? == owner.hash
        {
            let kek = password_hash(r, &password, owner.key_salt, Some(u48))?;
            aes_cbc_decrypt(&kek, &[0u8; AES_BLOCK], &oe[..32])?
        } else if password_hash(r, &password, user.validation_salt, None)? == user.hash {
            let kek = password_hash(r, &password, user.key_salt, None)?;
            aes_cbc_decrypt(&kek, &[0u8; AES_BLOCK], &ue[..32])?
        } else {
            return Err(PdfError::IncorrectPassword);
        };

        Ok(Self {
            key,
            strf,
            stmf,
            encrypt_metadata: encrypt
                .get("EncryptMetadata")
                .and_then(|b| b.as_bool().ok())
                .unwrap_or(true),
        })
    }
}

impl SecurityHandler for Aes256Handler {
    fn decrypt(
        &self,
        _objref: PDFObjRef,
        data: &[u8],
        attrs: Option<&HashMap<String, PDFObject>>,
    ) -> Result<Vec<u8>> {
        if !self.encrypt_metadata && is_metadata(attrs) {
            return Ok(data.to_vec());
        }
        let method = if attrs.is_some() { self.stmf } else { self.strf };
        match method {
            CryptMethod::Aes256 => aes_decrypt_payload(&self.key, data),
            _ => Ok(data.to_vec()),
        }
    }
}

/// UTF-8 password truncated to 127 bytes; SASLprep first for revision 6.
fn normalize_password(password: &str, r: i64) -> Result<Vec<u8>> {
    let prepared = if r >= 6 {
        saslprep(password)?
    } else {
        password.to_string()
    };
    let mut bytes = prepared.into_bytes();
    bytes.truncate(127);
    Ok(bytes)
}

/// Algorithm 2.A hash: plain SHA-256 for revision 5, Algorithm 2.B for 6.
fn password_hash(r: i64, password: &[u8], salt: &[u8], vector: Option<&[u8]>) -> Result<Vec<u8>> {
    let vector = vector.unwrap_or_default();
    let mut k = Sha256::new()
        .chain_update(password)
        .chain_update(salt)
        .chain_update(vector)
        .finalize()
        .to_vec();
    if r < 6 {
        return Ok(k);
    }

    let mut round = 0u32;
    loop {
        let block: Vec<u8> = [password, &k, vector].concat();
        let k1 = block.repeat(64);
        let e = aes_cbc_encrypt(&k[..16], &k[16..32], &k1)?;

        // Sum of the first 16 bytes mod 3 picks the next hash.
        let selector = e[..16].iter().map(|&b| u32::from(b)).sum::<u32>() % 3;
        k = match selector {
            0 => Sha256::digest(&e).to_vec(),
            1 => Sha384::digest(&e).to_vec(),
            _ => Sha512::digest(&e).to_vec(),
        };

        round += 1;
        let last = u32::from(e[e.len() - 1]);
        if round >= 64 && last <= round - 32 {
            break;
        }
    }
    k.truncate(32);
    Ok(k)
}
