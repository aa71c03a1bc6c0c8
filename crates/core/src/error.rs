//! Error types for the lode PDF object layer.

use thiserror::Error;

/// Primary error type for PDF parsing operations.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("invalid token at position {pos}: {msg}")]
    TokenError { pos: usize, msg: String },

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("key not found: {0}")]
    KeyError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF object not found: {objid} {genno} R")]
    ObjectNotFound { objid: u32, genno: u32 },

    #[error("no valid xref table found")]
    NoValidXRef,

    #[error("invalid PDF header: {0}")]
    InvalidHeader(String),

    #[error("trailer has no document catalog")]
    MissingRoot,

    #[error("PDF syntax error: {0}")]
    SyntaxError(String),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("SASLprep: {0}")]
    SaslPrepError(String),

    #[error("encryption error: {0}")]
    EncryptionError(String),

    #[error("incorrect password")]
    IncorrectPassword,

    #[error("unsupported encryption: V={v}, R={r}")]
    UnsupportedEncryption { v: i64, r: i64 },

    #[error("object scan cancelled")]
    ScanCancelled,

    #[error("object scan exceeded its deadline")]
    ScanDeadlineExceeded,
}

impl PdfError {
    /// Malformed file structure: bad tokens, broken xref, missing catalog.
    pub const fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::TokenError { .. }
                | Self::UnexpectedEof
                | Self::TypeError { .. }
                | Self::KeyError(_)
                | Self::NoValidXRef
                | Self::InvalidHeader(_)
                | Self::MissingRoot
                | Self::SyntaxError(_)
        )
    }

    /// Corrupt compressed data or a filter the chain cannot apply.
    pub const fn is_decode(&self) -> bool {
        matches!(self, Self::DecodeError(_) | Self::UnsupportedFilter(_))
    }

    /// A reference that no location source could satisfy.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. })
    }

    /// Security handler setup failures; raised once while opening.
    pub const fn is_encryption(&self) -> bool {
        matches!(
            self,
            Self::EncryptionError(_)
                | Self::IncorrectPassword
                | Self::UnsupportedEncryption { .. }
                | Self::SaslPrepError(_)
        )
    }

    /// The brute-force scan was stopped before it finished.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::ScanCancelled | Self::ScanDeadlineExceeded)
    }
}

/// Convenience Result type alias for PdfError.
pub type Result<T> = std::result::Result<T, PdfError>;
