//! PDF object parser built on [`TokenScanner`].
//!
//! Handles arrays, dictionaries and `objid genno R` references. Streams are
//! left to the materializer, which knows how to bound their payload.

use super::lexer::{Keyword, Token, TokenScanner};
use crate::error::{PdfError, Result};
use crate::model::objects::{PDFObjRef, PDFObject};
use std::collections::HashMap;

/// Nesting limit for arrays and dictionaries.
const MAX_DEPTH: usize = 256;

pub struct PDFParser<'a> {
    scanner: TokenScanner<'a>,
    lenient: bool,
}

impl<'a> PDFParser<'a> {
    pub const fn new(data: &'a [u8], lenient: bool) -> Self {
        Self {
            scanner: TokenScanner::new(data),
            lenient,
        }
    }

    pub const fn position(&self) -> usize {
        self.scanner.position()
    }

    pub fn seek(&mut self, offset: usize) {
        self.scanner.seek(offset);
    }

    pub fn scanner(&mut self) -> &mut TokenScanner<'a> {
        &mut self.scanner
    }

    fn next(&mut self) -> Result<Option<(usize, Token)>> {
        self.scanner.next_token().transpose()
    }

    fn next_required(&mut self) -> Result<(usize, Token)> {
        self.next()?.ok_or(PdfError::UnexpectedEof)
    }

    /// Consume the next token if it is `kw`.
    pub fn eat_keyword(&mut self, kw: &Keyword) -> bool {
        match self.scanner.peek_token() {
            Some(Ok((_, Token::Keyword(k)))) if &k == kw => {
                let _ = self.scanner.next_token();
                true
            }
            _ => false,
        }
    }

    /// Read `objid genno obj`, returning the reference.
    pub fn parse_indirect_header(&mut self) -> Result<PDFObjRef> {
        let (pos, objid) = self.next_required()?;
        let (_, genno) = self.next_required()?;
        let (_, kw) = self.next_required()?;
        if let (Token::Int(objid), Token::Int(genno), Token::Keyword(Keyword::Obj)) =
            (objid, genno, kw)
            && let (Ok(objid), Ok(genno)) = (u32::try_from(objid), u32::try_from(genno))
        {
            return Ok(PDFObjRef::new(objid, genno));
        }
        Err(PdfError::SyntaxError(format!(
            "no object header at offset {pos}"
        )))
    }

    /// Parse the next object.
    pub fn parse_object(&mut self) -> Result<PDFObject> {
        self.parse_object_at_depth(0)
    }

    fn parse_object_at_depth(&mut self, depth: usize) -> Result<PDFObject> {
        let (pos, token) = self.next_required()?;
        self.token_to_object(pos, token, depth)
    }

    fn token_to_object(&mut self, pos: usize, token: Token, depth: usize) -> Result<PDFObject> {
        match token {
            Token::Int(n) => Ok(self.try_reference(n).unwrap_or(PDFObject::Int(n))),
            Token::Real(n) => Ok(PDFObject::Real(n)),
            Token::Bool(b) => Ok(PDFObject::Bool(b)),
            Token::Name(s) => Ok(PDFObject::Name(s)),
            Token::String(s) => Ok(PDFObject::String(s)),
            Token::Keyword(Keyword::Null) => Ok(PDFObject::Null),
            Token::Keyword(Keyword::ArrayStart) => self.parse_array(depth + 1),
            Token::Keyword(Keyword::DictStart) => self.parse_dict(depth + 1),
            Token::Keyword(kw) => Err(PdfError::TokenError {
                pos,
                msg: format!(
                    "unexpected keyword: {}",
                    String::from_utf8_lossy(kw.as_bytes())
                ),
            }),
        }
    }

    /// Having read integer `objid`, consume `genno R` if present.
    fn try_reference(&mut self, objid: i64) -> Option<PDFObject> {
        let saved = self.scanner.position();
        let genno = match self.scanner.next_token() {
            Some(Ok((_, Token::Int(g)))) => g,
            _ => {
                self.scanner.seek(saved);
                return None;
            }
        };
        if let Some(Ok((_, Token::Keyword(Keyword::R)))) = self.scanner.next_token()
            && let (Ok(objid), Ok(genno)) = (u32::try_from(objid), u32::try_from(genno))
        {
            return Some(PDFObject::Ref(PDFObjRef::new(objid, genno)));
        }
        self.scanner.seek(saved);
        None
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(PdfError::SyntaxError(format!(
                "objects nested deeper than {MAX_DEPTH} at offset {}",
                self.scanner.position()
            )));
        }
        Ok(())
    }

    fn parse_array(&mut self, depth: usize) -> Result<PDFObject> {
        self.check_depth(depth)?;
        let mut arr = Vec::new();
        loop {
            let (pos, token) = self.next_required()?;
            match token {
                Token::Keyword(Keyword::ArrayEnd) => break,
                // Missing ']' before the end of the object.
                Token::Keyword(Keyword::EndObj) if self.lenient => {
                    self.scanner.seek(pos);
                    break;
                }
                token => arr.push(self.token_to_object(pos, token, depth)?),
            }
        }
        Ok(PDFObject::Array(arr))
    }

    fn parse_dict(&mut self, depth: usize) -> Result<PDFObject> {
        self.check_depth(depth)?;
        let mut dict = HashMap::new();
        loop {
            let (pos, token) = self.next_required()?;
            let key = match token {
                Token::Keyword(Keyword::DictEnd) => break,
                Token::Name(name) => name,
                Token::Keyword(Keyword::EndObj | Keyword::Stream) if self.lenient => {
                    self.scanner.seek(pos);
                    break;
                }
                _ if self.lenient => continue,
                _ => {
                    return Err(PdfError::TokenError {
                        pos,
                        msg: "expected name as dict key".into(),
                    });
                }
            };

            let (vpos, vtoken) = self.next_required()?;
            if self.lenient && matches!(vtoken, Token::Keyword(Keyword::DictEnd)) {
                // Key without a value right before '>>'.
                break;
            }
            let value = self.token_to_object(vpos, vtoken, depth)?;
            // A null value is equivalent to an absent key.
            if !value.is_null() {
                dict.insert(key, value);
            }
        }
        Ok(PDFObject::Dict(dict))
    }
}
