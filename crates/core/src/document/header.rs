//! `%PDF-x.y` file header.

use crate::error::{PdfError, Result};

/// Version assumed when a lenient open finds no usable header.
pub const DEFAULT_VERSION: &str = "1.4";

/// Bytes searched for the header; some producers prepend junk.
const HEADER_WINDOW: usize = 1024;

/// Parsed header: the version string and where `%PDF-` starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfHeader {
    pub version: String,
    pub offset: usize,
}

/// Locate `%PDF-` in the first kilobyte and read the version after it.
///
/// A missing or unreadable header is an `InvalidHeader` error in strict
/// mode; lenient mode falls back to [`DEFAULT_VERSION`] at offset 0.
pub fn parse_header(data: &[u8], lenient: bool) -> Result<PdfHeader> {
    match find_header(data) {
        Some((offset, version)) => Ok(PdfHeader { version, offset }),
        None if lenient => {
            tracing::warn!("no %PDF- header, assuming version {DEFAULT_VERSION}");
            Ok(PdfHeader {
                version: DEFAULT_VERSION.to_string(),
                offset: 0,
            })
        }
        None => Err(PdfError::InvalidHeader(
            "no %PDF-<major>.<minor> in the first 1024 bytes".into(),
        )),
    }
}

/// Offset of a valid `%PDF-x.y` header, or 0 when there is none.
///
/// Files with bytes prepended often keep offsets relative to the header.
pub fn header_offset(data: &[u8]) -> usize {
    find_header(data).map_or(0, |(offset, _)| offset)
}

fn find_header(data: &[u8]) -> Option<(usize, String)> {
    let window = &data[..data.len().min(HEADER_WINDOW)];
    let offset = window.windows(5).position(|w| w == b"%PDF-")?;
    read_version(&window[offset + 5..]).map(|version| (offset, version))
}

/// `<digit>+ . <digit>+`
fn read_version(rest: &[u8]) -> Option<String> {
    let major = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if major == 0 || rest.get(major) != Some(&b'.') {
        return None;
    }
    let minor = rest[major + 1..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if minor == 0 {
        return None;
    }
    std::str::from_utf8(&rest[..major + 1 + minor])
        .ok()
        .map(str::to_string)
}
