//! Stream codecs and ciphers.
//!
//! - `bitstream`: MSB-first code reader
//! - `lzw`: LZW decompression
//! - `predictor`: PNG / TIFF predictors
//! - `flate`: zlib / deflate
//! - `ascii85`: ASCII85 and ASCIIHex
//! - `runlength`: RunLength
//! - `filter`: filter chain assembly
//! - `arcfour`, `aes`: ciphers for the security handler

pub mod aes;
pub mod arcfour;
pub mod ascii85;
pub mod bitstream;
pub mod filter;
pub mod flate;
pub mod lzw;
pub mod predictor;
pub mod runlength;

pub use aes::{aes_cbc_decrypt, aes_cbc_encrypt, unpad_aes};
pub use arcfour::Arcfour;
pub use ascii85::{ascii85decode, asciihexdecode};
pub use bitstream::BitStream;
pub use filter::{FilterChain, FilterKind, FilterParams};
pub use flate::flate_decode;
pub use lzw::lzw_decode;
pub use predictor::{Predictor, apply_predictor};
pub use runlength::rldecode;
