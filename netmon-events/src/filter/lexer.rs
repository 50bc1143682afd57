//! Tokenizer for the filter grammar (spec.md §4.6).
//!
//! Punctuation is recognised directly; everything else is scanned as one
//! contiguous "word" and left for the parser to interpret as an identifier,
//! integer, bareword (event-type literal) or CIDR network, depending on
//! where it appears in the grammar. Quoted strings cover hostnames, domain
//! substrings and timestamps -- the latter needs quoting anyway since its
//! `YYYY/MM/DD hh:mm:ss` form contains an internal space that would
//! otherwise split into two words.

use crate::error::FilterError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    LParen,
    RParen,
    AndAnd,
    OrOr,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    Word(String),
    Str(String),
}

pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub fn lex(input: &str) -> Result<Vec<Spanned>, FilterError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        let token = match c {
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '&' if bytes.get(i + 1) == Some(&b'&') => {
                i += 2;
                Token::AndAnd
            }
            '|' if bytes.get(i + 1) == Some(&b'|') => {
                i += 2;
                Token::OrOr
            }
            '=' if bytes.get(i + 1) == Some(&b'=') => {
                i += 2;
                Token::Eq
            }
            '!' if bytes.get(i + 1) == Some(&b'=') => {
                i += 2;
                Token::Ne
            }
            '<' if bytes.get(i + 1) == Some(&b'=') => {
                i += 2;
                Token::Le
            }
            '>' if bytes.get(i + 1) == Some(&b'=') => {
                i += 2;
                Token::Ge
            }
            '<' => {
                i += 1;
                Token::Lt
            }
            '>' => {
                i += 1;
                Token::Gt
            }
            '"' => {
                i += 1;
                let str_start = i;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += 1;
                }
                if i >= bytes.len() {
                    return Err(FilterError::Syntax {
                        offset: start,
                        message: "unterminated string literal".to_string(),
                    });
                }
                let s = input[str_start..i].to_string();
                i += 1;
                Token::Str(s)
            }
            _ => {
                while i < bytes.len() && !is_boundary(bytes[i] as char) {
                    i += 1;
                }
                Token::Word(input[start..i].to_string())
            }
        };

        tokens.push(Spanned {
            token,
            offset: start,
        });
    }

    Ok(tokens)
}

fn is_boundary(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '&' | '|' | '=' | '!' | '<' | '>' | '"')
}
