//! Token scanner for PDF file syntax.
//!
//! Turns a byte buffer into numbers, names, strings, delimiters and
//! keywords. It has no notion of objects; `pdf_parser` builds those.

use crate::error::{PdfError, Result};

/// Keywords and delimiters that matter to the object layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Keyword {
    Obj,
    EndObj,
    R,
    Stream,
    EndStream,
    Xref,
    Trailer,
    StartXref,
    Null,
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    BraceOpen,
    BraceClose,
    /// Any other bare word, kept verbatim.
    Other(Vec<u8>),
}

impl Keyword {
    pub fn from_bytes(b: &[u8]) -> Self {
        match b {
            b"obj" => Self::Obj,
            b"endobj" => Self::EndObj,
            b"R" => Self::R,
            b"stream" => Self::Stream,
            b"endstream" => Self::EndStream,
            b"xref" => Self::Xref,
            b"trailer" => Self::Trailer,
            b"startxref" => Self::StartXref,
            b"null" => Self::Null,
            b"[" => Self::ArrayStart,
            b"]" => Self::ArrayEnd,
            b"<<" => Self::DictStart,
            b">>" => Self::DictEnd,
            b"{" => Self::BraceOpen,
            b"}" => Self::BraceClose,
            other => Self::Other(other.to_vec()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Obj => b"obj",
            Self::EndObj => b"endobj",
            Self::R => b"R",
            Self::Stream => b"stream",
            Self::EndStream => b"endstream",
            Self::Xref => b"xref",
            Self::Trailer => b"trailer",
            Self::StartXref => b"startxref",
            Self::Null => b"null",
            Self::ArrayStart => b"[",
            Self::ArrayEnd => b"]",
            Self::DictStart => b"<<",
            Self::DictEnd => b">>",
            Self::BraceOpen => b"{",
            Self::BraceClose => b"}",
            Self::Other(bytes) => bytes.as_slice(),
        }
    }
}

/// Lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Real(f64),
    Bool(bool),
    /// Name without the leading slash, `#xx` escapes resolved.
    Name(String),
    /// Literal or hex string, decoded to bytes.
    String(Vec<u8>),
    Keyword(Keyword),
}

pub(crate) const fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x00' | b'\x0c')
}

pub(crate) const fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// Byte that terminates a bare word.
pub(crate) const fn is_keyword_end(b: u8) -> bool {
    is_whitespace(b) || is_delimiter(b)
}

/// Cursor over a PDF byte buffer.
///
/// Seeking past the end is allowed; the next read reports end of input by
/// returning `None`.
pub struct TokenScanner<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> TokenScanner<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Underlying buffer.
    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    pub const fn len(&self) -> usize {
        self.data.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current byte offset.
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor, clamped to the buffer length.
    pub fn seek(&mut self, offset: usize) {
        self.pos = offset.min(self.data.len());
    }

    /// Unconsumed bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Skip whitespace and `%` comments.
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'%' {
                match self.remaining().iter().position(|&c| c == b'\r' || c == b'\n') {
                    Some(offset) => self.pos += offset + 1,
                    None => self.pos = self.data.len(),
                }
                continue;
            }
            if !is_whitespace(b) {
                return;
            }
            self.pos += 1;
        }
    }

    /// Consume the end-of-line that follows the `stream` keyword.
    ///
    /// Accepts CRLF, LF, and a lone CR. Spaces before the EOL are tolerated.
    pub fn skip_stream_eol(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'\r') => {
                self.pos += 1;
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            Some(b'\n') => self.pos += 1,
            _ => {}
        }
    }

    /// Read the next token without consuming it.
    pub fn peek_token(&mut self) -> Option<Result<(usize, Token)>> {
        let saved = self.pos;
        let token = self.next_token();
        self.pos = saved;
        token
    }

    /// Read the next token and its starting offset.
    pub fn next_token(&mut self) -> Option<Result<(usize, Token)>> {
        self.skip_whitespace();
        let start = self.pos;
        let b = self.peek()?;

        let result = match b {
            b'/' => self.parse_name(),
            b'(' => self.parse_string(),
            b'<' => {
                if self.peek_at(1) == Some(b'<') {
                    self.pos += 2;
                    Ok(Token::Keyword(Keyword::DictStart))
                } else {
                    self.parse_hex_string()
                }
            }
            b'>' => {
                if self.peek_at(1) == Some(b'>') {
                    self.pos += 2;
                    Ok(Token::Keyword(Keyword::DictEnd))
                } else {
                    self.pos += 1;
                    Ok(Token::Keyword(Keyword::Other(b">".to_vec())))
                }
            }
            b'[' => {
                self.pos += 1;
                Ok(Token::Keyword(Keyword::ArrayStart))
            }
            b']' => {
                self.pos += 1;
                Ok(Token::Keyword(Keyword::ArrayEnd))
            }
            b'{' => {
                self.pos += 1;
                Ok(Token::Keyword(Keyword::BraceOpen))
            }
            b'}' => {
                self.pos += 1;
                Ok(Token::Keyword(Keyword::BraceClose))
            }
            b')' => {
                self.pos += 1;
                Err(PdfError::TokenError {
                    pos: start,
                    msg: "unbalanced ')'".into(),
                })
            }
            b'+' | b'-' => {
                if matches!(self.peek_at(1), Some(c) if c.is_ascii_digit() || c == b'.') {
                    self.parse_number()
                } else {
                    self.parse_keyword()
                }
            }
            b'.' => {
                if matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
                    self.parse_number()
                } else {
                    self.parse_keyword()
                }
            }
            c if c.is_ascii_digit() => self.parse_number(),
            _ => self.parse_keyword(),
        };

        Some(result.map(|token| (start, token)))
    }

    fn parse_name(&mut self) -> Result<Token> {
        self.pos += 1;
        let mut name = Vec::new();

        while let Some(b) = self.peek() {
            if is_keyword_end(b) {
                break;
            }
            if b == b'#' {
                if let (Some(h1), Some(h2)) = (
                    self.peek_at(1).and_then(hex_value),
                    self.peek_at(2).and_then(hex_value),
                ) {
                    name.push((h1 << 4) | h2);
                    self.pos += 3;
                    continue;
                }
                // A '#' without two hex digits is dropped.
                self.pos += 1;
            } else {
                name.push(b);
                self.pos += 1;
            }
        }

        Ok(Token::Name(name_from_bytes(&name)))
    }

    fn parse_number(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut has_dot = false;

        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.pos += 1;
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else if b == b'.' && !has_dot {
                has_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }

        let text = std::str::from_utf8(&self.data[start..self.pos]).map_err(|_| {
            PdfError::TokenError {
                pos: start,
                msg: "invalid number".into(),
            }
        })?;

        if has_dot {
            // "5." and "-.5" are valid PDF reals; Rust's parser wants a digit.
            let normalized = if text.ends_with('.') {
                format!("{text}0")
            } else {
                text.to_string()
            };
            normalized
                .parse::<f64>()
                .map(Token::Real)
                .map_err(|_| PdfError::TokenError {
                    pos: start,
                    msg: format!("invalid real: {text}"),
                })
        } else {
            match text.parse::<i64>() {
                Ok(v) => Ok(Token::Int(v)),
                // Out-of-range integers degrade to reals.
                Err(_) => text
                    .parse::<f64>()
                    .map(Token::Real)
                    .map_err(|_| PdfError::TokenError {
                        pos: start,
                        msg: format!("invalid int: {text}"),
                    }),
            }
        }
    }

    fn parse_string(&mut self) -> Result<Token> {
        self.pos += 1;
        let mut result = Vec::new();
        let mut depth = 1usize;

        loop {
            match self.advance() {
                Some(b'(') => {
                    depth += 1;
                    result.push(b'(');
                }
                Some(b')') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    result.push(b')');
                }
                Some(b'\\') => match self.advance() {
                    Some(b'n') => result.push(b'\n'),
                    Some(b'r') => result.push(b'\r'),
                    Some(b't') => result.push(b'\t'),
                    Some(b'b') => result.push(0x08),
                    Some(b'f') => result.push(0x0c),
                    Some(b'\r') => {
                        if self.peek() == Some(b'\n') {
                            self.pos += 1;
                        }
                    }
                    Some(b'\n') => {}
                    Some(c @ b'0'..=b'7') => {
                        let mut octal = u32::from(c - b'0');
                        for _ in 0..2 {
                            match self.peek() {
                                Some(d @ b'0'..=b'7') => {
                                    self.pos += 1;
                                    octal = octal * 8 + u32::from(d - b'0');
                                }
                                _ => break,
                            }
                        }
                        result.push((octal & 0xFF) as u8);
                    }
                    Some(c) => result.push(c),
                    None => return Err(PdfError::UnexpectedEof),
                },
                Some(c) => result.push(c),
                None => return Err(PdfError::UnexpectedEof),
            }
        }

        Ok(Token::String(result))
    }

    fn parse_hex_string(&mut self) -> Result<Token> {
        let start = self.pos;
        self.pos += 1;
        let mut result = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            match self.advance() {
                Some(b'>') => break,
                Some(c) if is_whitespace(c) => {}
                Some(c) => {
                    let nibble = hex_value(c).ok_or_else(|| PdfError::TokenError {
                        pos: start,
                        msg: format!("invalid hex digit {:?}", c as char),
                    })?;
                    match pending.take() {
                        Some(high) => result.push((high << 4) | nibble),
                        None => pending = Some(nibble),
                    }
                }
                None => return Err(PdfError::UnexpectedEof),
            }
        }

        // Odd digit count: the final digit is the high nibble.
        if let Some(high) = pending {
            result.push(high << 4);
        }

        Ok(Token::String(result))
    }

    fn parse_keyword(&mut self) -> Result<Token> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_keyword_end(b) {
                break;
            }
            self.pos += 1;
        }
        // A stray delimiter such as ')' never reaches here, so the word is non-empty.
        let bytes = &self.data[start..self.pos];
        Ok(match bytes {
            b"true" => Token::Bool(true),
            b"false" => Token::Bool(false),
            _ => Token::Keyword(Keyword::from_bytes(bytes)),
        })
    }
}

pub(crate) const fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

pub(crate) fn name_from_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(data: &[u8]) -> Vec<Token> {
        let mut scanner = TokenScanner::new(data);
        let mut out = Vec::new();
        while let Some(tok) = scanner.next_token() {
            out.push(tok.unwrap().1);
        }
        out
    }

    #[test]
    fn keyword_round_trip() {
        for kw in [&b"obj"[..], b"endstream", b"startxref", b"BT"] {
            assert_eq!(Keyword::from_bytes(kw).as_bytes(), kw);
        }
    }

    #[test]
    fn scans_object_header_and_dict() {
        let toks = tokens(b"12 0 obj\n<< /Length 5 /F#20x (a\\)b) >>");
        assert_eq!(
            toks,
            vec![
                Token::Int(12),
                Token::Int(0),
                Token::Keyword(Keyword::Obj),
                Token::Keyword(Keyword::DictStart),
                Token::Name("Length".into()),
                Token::Int(5),
                Token::Name("F x".into()),
                Token::String(b"a)b".to_vec()),
                Token::Keyword(Keyword::DictEnd),
            ]
        );
    }

    #[test]
    fn reals_and_signs() {
        assert_eq!(
            tokens(b"-.5 +3 4. 1.25"),
            vec![
                Token::Real(-0.5),
                Token::Int(3),
                Token::Real(4.0),
                Token::Real(1.25)
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            tokens(b"%PDF-1.7\n%\xe2\xe3\ntrue"),
            vec![Token::Bool(true)]
        );
    }

    #[test]
    fn hex_string_odd_digits_pad_low_nibble() {
        assert_eq!(tokens(b"<4 1 4>"), vec![Token::String(vec![0x41, 0x40])]);
    }

    #[test]
    fn octal_escapes() {
        assert_eq!(
            tokens(b"(\\101\\7x)"),
            vec![Token::String(vec![b'A', 7, b'x'])]
        );
    }

    #[test]
    fn seek_past_end_reports_end_of_input() {
        let mut scanner = TokenScanner::new(b"1 2");
        scanner.seek(100);
        assert_eq!(scanner.position(), 3);
        assert!(scanner.next_token().is_none());
    }

    #[test]
    fn peek_does_not_consume() {
        let mut scanner = TokenScanner::new(b"xref 0 1");
        let peeked = scanner.peek_token().unwrap().unwrap();
        let next = scanner.next_token().unwrap().unwrap();
        assert_eq!(peeked, next);
        assert_eq!(next, (0, Token::Keyword(Keyword::Xref)));
    }

    #[test]
    fn unterminated_string_is_eof() {
        let mut scanner = TokenScanner::new(b"(abc");
        assert!(matches!(
            scanner.next_token(),
            Some(Err(PdfError::UnexpectedEof))
        ));
    }

    #[test]
    fn stream_eol_variants() {
        for (data, expected) in [
            (&b"\r\nX"[..], 2),
            (b"\nX", 1),
            (b"\rX", 1),
            (b"  \nX", 3),
        ] {
            let mut scanner = TokenScanner::new(data);
            scanner.skip_stream_eol();
            assert_eq!(scanner.position(), expected);
        }
    }
}
