//! PDF syntax parsing.
//!
//! - `lexer`: token scanner
//! - `pdf_parser`: object parser

pub mod lexer;
pub mod pdf_parser;

pub use lexer::{Keyword, Token, TokenScanner};
pub use pdf_parser::PDFParser;
