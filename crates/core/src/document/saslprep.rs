//! SASLprep (RFC 4013) for AES-256 R6 passwords.
//!
//! Mapping and prohibition follow the stringprep tables of RFC 3454;
//! bidirectional categories come from `unicode-bidi`. Unassigned code
//! points are allowed (the "query" profile).

use unicode_bidi::{BidiClass, bidi_class};
use unicode_normalization::UnicodeNormalization;

use crate::error::{PdfError, Result};

/// Table B.1: mapped to nothing.
fn maps_to_nothing(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{034F}'
            | '\u{1806}'
            | '\u{180B}'..='\u{180D}'
            | '\u{200B}'..='\u{200D}'
            | '\u{2060}'
            | '\u{FE00}'..='\u{FE0F}'
            | '\u{FEFF}'
    )
}

/// Table C.1.2: non-ASCII spaces, mapped to U+0020.
fn is_non_ascii_space(c: char) -> bool {
    matches!(
        c,
        '\u{00A0}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200B}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
    )
}

/// Tables C.1.2 through C.9.
fn is_prohibited(c: char) -> bool {
    is_non_ascii_space(c)
        // C.2.1, C.2.2: control characters
        || c.is_control()
        || matches!(
            c,
            '\u{06DD}'
                | '\u{070F}'
                | '\u{180E}'
                | '\u{200C}'..='\u{200F}'
                | '\u{2028}'..='\u{202E}'
                | '\u{2060}'..='\u{2063}'
                | '\u{206A}'..='\u{206F}'
                | '\u{FEFF}'
                | '\u{FFF9}'..='\u{FFFD}'
                | '\u{1D173}'..='\u{1D17A}'
        )
        // C.3: private use
        || matches!(
            c,
            '\u{E000}'..='\u{F8FF}' | '\u{F0000}'..='\u{FFFFD}' | '\u{100000}'..='\u{10FFFD}'
        )
        // C.4: non-characters
        || matches!(c, '\u{FDD0}'..='\u{FDEF}')
        || (c as u32) & 0xFFFE == 0xFFFE
        // C.7, C.8, C.9
        || matches!(c, '\u{2FF0}'..='\u{2FFB}' | '\u{0340}' | '\u{0341}')
        || matches!(c, '\u{E0001}' | '\u{E0020}'..='\u{E007F}')
}

fn is_rand_al(c: char) -> bool {
    matches!(bidi_class(c), BidiClass::R | BidiClass::AL)
}

fn is_l(c: char) -> bool {
    bidi_class(c) == BidiClass::L
}

/// Prepare a password with the SASLprep profile.
pub fn saslprep(data: &str) -> Result<String> {
    let mapped: String = data
        .chars()
        .filter(|&c| !maps_to_nothing(c))
        .map(|c| if is_non_ascii_space(c) { ' ' } else { c })
        .collect();
    let normalized: String = mapped.nfkc().collect();

    if let Some(c) = normalized.chars().find(|&c| is_prohibited(c)) {
        return Err(PdfError::SaslPrepError(format!(
            "prohibited character U+{:04X}",
            c as u32
        )));
    }

    // RFC 3454 section 6: RandALCat text must start and end with RandALCat
    // and contain no LCat.
    if normalized.chars().any(is_rand_al) {
        let bounded = normalized.chars().next().is_some_and(is_rand_al)
            && normalized.chars().next_back().is_some_and(is_rand_al);
        if !bounded || normalized.chars().any(is_l) {
            return Err(PdfError::SaslPrepError(
                "failed bidirectional check".into(),
            ));
        }
    }

    Ok(normalized)
}
