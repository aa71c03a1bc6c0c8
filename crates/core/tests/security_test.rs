//! Tests for the encryption context and the standard security handler.

use std::collections::HashMap;

use lode_core::PdfError;
use lode_core::codec::arcfour::rc4;
use lode_core::document::security::{EncryptionAlgorithmCode, EncryptionContext};
use lode_core::model::objects::{PDFObjRef, PDFObject};

// V=1, R=2, 40-bit key, password="foo"
const RC4_40_O: [u8; 32] = [
    1, 169, 240, 206, 242, 141, 0, 248, 223, 176, 37, 143, 94, 240, 197, 92, 157, 247, 200, 22,
    149, 143, 54, 49, 0, 175, 119, 236, 2, 38, 36, 84,
];
const RC4_40_U: [u8; 32] = [
    105, 75, 157, 162, 248, 9, 199, 124, 114, 119, 140, 251, 202, 194, 4, 129, 178, 114, 5, 208,
    231, 211, 34, 98, 54, 130, 131, 100, 102, 106, 151, 8,
];

// V=2, R=3, 128-bit key, password="foo"
const RC4_128_O: [u8; 32] = [
    208, 72, 209, 82, 158, 83, 93, 24, 132, 205, 56, 86, 54, 123, 24, 75, 74, 144, 223, 1, 230, 55,
    209, 110, 202, 6, 91, 175, 78, 100, 144, 11,
];
const RC4_128_U: [u8; 32] = [
    9, 52, 18, 54, 59, 157, 50, 124, 122, 197, 1, 68, 199, 199, 85, 241, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0,
];

const DOCID: [u8; 16] = [
    101, 26, 148, 254, 235, 120, 104, 211, 18, 169, 123, 55, 114, 112, 134, 14,
];

fn make_encrypt_dict(v: i64, r: i64, length: i64, o: &[u8], u: &[u8]) -> HashMap<String, PDFObject> {
    let mut dict = HashMap::new();
    dict.insert("V".into(), PDFObject::Int(v));
    dict.insert("R".into(), PDFObject::Int(r));
    dict.insert("P".into(), PDFObject::Int(-4));
    dict.insert("Length".into(), PDFObject::Int(length));
    dict.insert("O".into(), PDFObject::String(o.to_vec()));
    dict.insert("U".into(), PDFObject::String(u.to_vec()));
    dict.insert("Filter".into(), PDFObject::Name("Standard".into()));
    dict
}

fn rc4_40() -> HashMap<String, PDFObject> {
    make_encrypt_dict(1, 2, 40, &RC4_40_O, &RC4_40_U)
}

fn rc4_128() -> HashMap<String, PDFObject> {
    make_encrypt_dict(2, 3, 128, &RC4_128_O, &RC4_128_U)
}

fn doc_id() -> Vec<Vec<u8>> {
    vec![DOCID.to_vec(), DOCID.to_vec()]
}

#[test]
fn test_rc4_40_correct_password() {
    let ctx = EncryptionContext::new(&rc4_40(), &doc_id(), "foo").unwrap();
    assert!(ctx.is_encrypted());
    assert_eq!(ctx.algorithm(), EncryptionAlgorithmCode::Rc4Bits40);
}

#[test]
fn test_rc4_40_wrong_password() {
    assert!(matches!(
        EncryptionContext::new(&rc4_40(), &doc_id(), "wrong"),
        Err(PdfError::IncorrectPassword)
    ));
    assert!(matches!(
        EncryptionContext::new(&rc4_40(), &doc_id(), ""),
        Err(PdfError::IncorrectPassword)
    ));
}

#[test]
fn test_rc4_128_correct_password() {
    let ctx = EncryptionContext::new(&rc4_128(), &doc_id(), "foo").unwrap();
    assert_eq!(ctx.algorithm(), EncryptionAlgorithmCode::Rc4Extended);
}

#[test]
fn test_rc4_128_wrong_password() {
    assert!(matches!(
        EncryptionContext::new(&rc4_128(), &doc_id(), "bar"),
        Err(PdfError::IncorrectPassword)
    ));
}

#[test]
fn test_unsupported_versions_fail_at_construction() {
    for v in [0, 3, 6, 99] {
        let dict = make_encrypt_dict(v, 2, 40, &RC4_40_O, &RC4_40_U);
        match EncryptionContext::new(&dict, &doc_id(), "foo") {
            Err(PdfError::UnsupportedEncryption { v: got, .. }) => assert_eq!(got, v),
            other => panic!("V={v}: unexpected {other:?}"),
        }
    }
}

#[test]
fn test_mismatched_revision_is_unsupported() {
    let dict = make_encrypt_dict(1, 5, 40, &RC4_40_O, &RC4_40_U);
    assert!(matches!(
        EncryptionContext::new(&dict, &doc_id(), "foo"),
        Err(PdfError::UnsupportedEncryption { v: 1, r: 5 })
    ));
}

#[test]
fn test_foreign_security_handler_is_rejected() {
    let mut dict = rc4_40();
    dict.insert("Filter".into(), PDFObject::Name("Adobe.PubSec".into()));
    assert!(matches!(
        EncryptionContext::new(&dict, &doc_id(), "foo"),
        Err(PdfError::EncryptionError(_))
    ));
}

#[test]
fn test_no_encryption_is_passthrough() {
    let ctx = EncryptionContext::none();
    assert!(!ctx.is_encrypted());
    let objref = PDFObjRef::new(12, 0);
    let data = b"any bytes at all \x00\xff";
    assert_eq!(ctx.decrypt(objref, data).unwrap(), data);
    assert_eq!(
        ctx.decrypt_stream(objref, data, &HashMap::new()).unwrap(),
        data
    );
    let obj = PDFObject::Array(vec![PDFObject::String(data.to_vec())]);
    assert_eq!(ctx.decrypt_strings(objref, obj.clone()).unwrap(), obj);
}

#[test]
fn test_rc4_is_symmetric_per_object() {
    let ctx = EncryptionContext::new(&rc4_128(), &doc_id(), "foo").unwrap();
    let objref = PDFObjRef::new(1, 0);
    let plaintext = b"Hello, PDF encryption!";
    let encrypted = ctx.decrypt(objref, plaintext).unwrap();
    assert_ne!(&encrypted[..], plaintext);
    assert_eq!(ctx.decrypt(objref, &encrypted).unwrap(), plaintext);
}

#[test]
fn test_object_number_and_generation_change_the_key() {
    let ctx = EncryptionContext::new(&rc4_128(), &doc_id(), "foo").unwrap();
    let plaintext = b"Test data";
    let a = ctx.decrypt(PDFObjRef::new(1, 0), plaintext).unwrap();
    let b = ctx.decrypt(PDFObjRef::new(2, 0), plaintext).unwrap();
    let c = ctx.decrypt(PDFObjRef::new(1, 1), plaintext).unwrap();
    assert_ne!(a, b);
    assert_ne!(a, c);
}

#[test]
fn test_rc4_40_object_key_matches_algorithm_1() {
    let ctx = EncryptionContext::new(&rc4_40(), &doc_id(), "foo").unwrap();

    // Recompute the file key (Algorithm 2, revision 2) from the inputs.
    let mut padded = b"foo".to_vec();
    padded.extend_from_slice(&lode_core::document::PASSWORD_PADDING[..29]);
    let mut context = md5::Context::new();
    context.consume(&padded);
    context.consume(RC4_40_O);
    context.consume((-4i32).to_le_bytes());
    context.consume(DOCID);
    let file_key = &context.finalize().0[..5];

    let mut object_key = file_key.to_vec();
    object_key.extend_from_slice(&[7, 0, 0, 0, 0]);
    let key = &md5::compute(&object_key).0[..10];

    let expected = rc4(key, b"secret").unwrap();
    assert_eq!(ctx.decrypt(PDFObjRef::new(7, 0), b"secret").unwrap(), expected);
}

#[test]
fn test_decrypt_strings_descends_into_containers() {
    let ctx = EncryptionContext::new(&rc4_128(), &doc_id(), "foo").unwrap();
    let objref = PDFObjRef::new(4, 0);
    let cipher = ctx.decrypt(objref, b"title").unwrap();

    let mut dict = HashMap::new();
    dict.insert("Title".to_string(), PDFObject::String(cipher.clone()));
    dict.insert("Count".to_string(), PDFObject::Int(3));
    let obj = PDFObject::Array(vec![PDFObject::Dict(dict), PDFObject::String(cipher)]);

    let PDFObject::Array(items) = ctx.decrypt_strings(objref, obj).unwrap() else {
        panic!("array expected");
    };
    assert_eq!(
        items[0].as_dict().unwrap()["Title"],
        PDFObject::String(b"title".to_vec())
    );
    assert_eq!(items[0].as_dict().unwrap()["Count"], PDFObject::Int(3));
    assert_eq!(items[1], PDFObject::String(b"title".to_vec()));
}

#[test]
fn test_empty_data_decryption() {
    let ctx = EncryptionContext::new(&rc4_128(), &doc_id(), "foo").unwrap();
    assert!(ctx.decrypt(PDFObjRef::new(1, 0), &[]).unwrap().is_empty());
}

#[test]
fn test_context_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<EncryptionContext>();
}
