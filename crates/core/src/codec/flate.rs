//! `/FlateDecode` with recovery for damaged streams.

use std::io::Read;

use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{PdfError, Result};

/// Inflate zlib data.
///
/// A stream with a bad zlib header is retried as raw deflate. A stream that
/// fails part-way keeps the bytes produced before the failure; only a
/// stream that yields nothing at all is an error.
pub fn flate_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 3);
    if ZlibDecoder::new(data).read_to_end(&mut out).is_ok() {
        return Ok(out);
    }

    out.clear();
    if DeflateDecoder::new(data).read_to_end(&mut out).is_ok() && !out.is_empty() {
        tracing::debug!(len = data.len(), "flate stream decoded as raw deflate");
        return Ok(out);
    }

    let partial = decompress_corrupted(data);
    if partial.is_empty() && !data.is_empty() {
        return Err(PdfError::DecodeError("flate stream is not decodable".into()));
    }
    tracing::warn!(
        input = data.len(),
        recovered = partial.len(),
        "corrupt flate stream, keeping decoded prefix"
    );
    Ok(partial)
}

/// Feed the decoder one byte at a time and keep everything it produced
/// before failing (bad checksums near the end are common).
fn decompress_corrupted(data: &[u8]) -> Vec<u8> {
    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut buf = [0u8; 4096];
    let mut i = 0usize;
    while i < data.len() {
        let before_out = decoder.total_out();
        let before_in = decoder.total_in();
        let res = decoder.decompress(&data[i..i + 1], &mut buf, FlushDecompress::None);
        let produced = (decoder.total_out() - before_out) as usize;
        out.extend_from_slice(&buf[..produced]);
        let consumed = (decoder.total_in() - before_in) as usize;
        i += consumed.max(1);
        match res {
            Ok(Status::StreamEnd) | Err(_) => break,
            Ok(_) => {}
        }
    }
    out
}
