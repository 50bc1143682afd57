//! Recursive-descent parser for the filter grammar (spec.md §4.6):
//!
//! ```text
//! expression  ::= "(" expression ")"
//!               | expression logical-operator expression
//!               | identifier relational-operator value
//! ```
//!
//! Mixing `&&` and `||` at the same parenthesis depth is a syntax error --
//! the grammar requires explicit parentheses to disambiguate, so a chain of
//! comparisons may only repeat one logical operator before it either ends or
//! hits the other one, at which point parsing fails.

use crate::error::FilterError;
use crate::filter::expr::{CmpOp, Expr, Ident, Value};
use crate::filter::lexer::{lex, Spanned, Token};

/// Matches the original implementation's recursion guard against
/// pathological input (spec.md §4.6 edge cases).
pub const MAX_DEPTH: usize = 64;

pub fn parse(input: &str) -> Result<Expr, FilterError> {
    let tokens = lex(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
    };
    let expr = parser.parse_chain(0)?;
    if parser.pos != parser.tokens.len() {
        let offset = parser.tokens[parser.pos].offset;
        return Err(FilterError::Syntax {
            offset,
            message: "unexpected trailing input".to_string(),
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LogicalOp {
    And,
    Or,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|s| s.offset)
            .unwrap_or_else(|| self.tokens.last().map(|s| s.offset + 1).unwrap_or(0))
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|s| s.token.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), FilterError> {
        match self.bump() {
            Some(ref t) if t == expected => Ok(()),
            _ => Err(FilterError::Syntax {
                offset: self.offset(),
                message: format!("expected {what}"),
            }),
        }
    }

    /// Parses a chain of terms joined by a single repeated logical operator
    /// at this depth, erroring if the other logical operator appears before
    /// the chain ends.
    fn parse_chain(&mut self, depth: usize) -> Result<Expr, FilterError> {
        let mut lhs = self.parse_term(depth)?;
        let mut chain_op: Option<LogicalOp> = None;

        loop {
            let op = match self.peek() {
                Some(Token::AndAnd) => LogicalOp::And,
                Some(Token::OrOr) => LogicalOp::Or,
                _ => break,
            };

            if let Some(existing) = chain_op {
                if existing != op {
                    return Err(FilterError::MixedLogicalOperators);
                }
            }
            chain_op = Some(op);

            self.bump();
            let rhs = self.parse_term(depth)?;
            lhs = match op {
                LogicalOp::And => Expr::And(Box::new(lhs), Box::new(rhs)),
                LogicalOp::Or => Expr::Or(Box::new(lhs), Box::new(rhs)),
            };
        }

        Ok(lhs)
    }

    fn parse_term(&mut self, depth: usize) -> Result<Expr, FilterError> {
        match self.peek() {
            Some(Token::LParen) => {
                if depth + 1 > MAX_DEPTH {
                    return Err(FilterError::TooDeep(MAX_DEPTH));
                }
                self.bump();
                let inner = self.parse_chain(depth + 1)?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            _ => self.parse_comparison(),
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, FilterError> {
        let ident_offset = self.offset();
        let ident_name = match self.bump() {
            Some(Token::Word(w)) => w,
            _ => {
                return Err(FilterError::Syntax {
                    offset: ident_offset,
                    message: "expected an identifier".to_string(),
                })
            }
        };
        let ident = Ident::parse(&ident_name).ok_or(FilterError::UnknownIdentifier(ident_name))?;

        let op = match self.bump() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Ge) => CmpOp::Ge,
            _ => {
                return Err(FilterError::Syntax {
                    offset: self.offset(),
                    message: "expected a comparison operator".to_string(),
                })
            }
        };
        Expr::validate(ident, op)?;

        let value_offset = self.offset();
        let (raw, quoted) = match self.bump() {
            Some(Token::Word(w)) => (w, false),
            Some(Token::Str(s)) => (s, true),
            _ => {
                return Err(FilterError::Syntax {
                    offset: value_offset,
                    message: "expected a value".to_string(),
                })
            }
        };
        let value = Value::for_ident(ident, &raw, quoted)?;

        Ok(Expr::Compare { ident, op, value })
    }
}
