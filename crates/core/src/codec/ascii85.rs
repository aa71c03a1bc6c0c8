//! `/ASCII85Decode` and `/ASCIIHexDecode`.

use crate::parser::lexer::hex_value;
use crate::error::{PdfError, Result};

/// Decode ASCII85 data (PDF variant).
///
/// Accepts the optional `<~` prefix, `z` for four zero bytes, embedded
/// whitespace, and a missing `~>` terminator.
pub fn ascii85decode(data: &[u8]) -> Result<Vec<u8>> {
    let data = data.strip_prefix(b"<~").unwrap_or(data);
    let data = match data.iter().position(|&b| b == b'~') {
        Some(pos) => &data[..pos],
        None => data,
    };

    let mut result = Vec::with_capacity(data.len() * 4 / 5 + 4);
    let mut group = [0u8; 5];
    let mut filled = 0usize;

    for &byte in data {
        match byte {
            b'z' if filled == 0 => result.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[filled] = byte - b'!';
                filled += 1;
                if filled == 5 {
                    result.extend_from_slice(&group_value(&group)?.to_be_bytes());
                    filled = 0;
                }
            }
            b' ' | b'\t' | b'\n' | b'\r' | b'\x0c' | b'\x00' => {}
            other => {
                return Err(PdfError::DecodeError(format!(
                    "invalid ASCII85 character {:?}",
                    other as char
                )));
            }
        }
    }

    // A final partial group of n chars encodes n - 1 bytes; pad with 'u'.
    if filled > 1 {
        group[filled..].fill(b'u' - b'!');
        let bytes = group_value(&group)?.to_be_bytes();
        result.extend_from_slice(&bytes[..filled - 1]);
    }

    Ok(result)
}

fn group_value(group: &[u8; 5]) -> Result<u32> {
    let value = group
        .iter()
        .fold(0u64, |acc, &digit| acc * 85 + u64::from(digit));
    u32::try_from(value)
        .map_err(|_| PdfError::DecodeError("ASCII85 group exceeds 32 bits".into()))
}

/// Decode ASCIIHex data up to `>`. An odd final digit is the high nibble.
pub fn asciihexdecode(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut pending: Option<u8> = None;

    for &byte in data {
        if byte == b'>' {
            break;
        }
        let Some(nibble) = hex_value(byte) else {
            // Whitespace and stray bytes are skipped.
            continue;
        };
        match pending.take() {
            Some(high) => result.push((high << 4) | nibble),
            None => pending = Some(nibble),
        }
    }

    if let Some(high) = pending {
        result.push(high << 4);
    }

    Ok(result)
}
