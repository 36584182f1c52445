//! Recursive-descent, precedence-climbing parser (spec §4.2, C6).

pub mod lexer;

use std::sync::Arc;

use self::lexer::{SpannedToken, Token};
use crate::ast::{BinaryOp, ExprKind, ExprNode, IsAs, Literal, UnaryOp};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at offset {offset}: expected {expected}, found {found}")]
pub struct ParseError {
    pub offset: usize,
    pub expected: String,
    pub found: String,
}

pub fn parse_expression(src: &str) -> Result<Arc<ExprNode>, ParseError> {
    let tokens = lexer::Lexer::new(src).tokenize().map_err(|e| ParseError {
        offset: e.offset,
        expected: "a valid token".to_string(),
        found: e.message,
    })?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr(0)?;
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

/// (precedence, right-associative) for each binary operator token, per the
/// spec §6 table (higher number binds tighter).
fn binary_info(tok: &Token) -> Option<(BinaryOp, u8, bool)> {
    use Token::*;
    Some(match tok {
        Star => (BinaryOp::Mul, 11, false),
        Slash => (BinaryOp::Div, 11, false),
        Div => (BinaryOp::IntDiv, 11, false),
        Mod => (BinaryOp::Mod, 11, false),
        Plus => (BinaryOp::Add, 10, false),
        Minus => (BinaryOp::Sub, 10, false),
        Amp => (BinaryOp::Concat, 9, false),
        Pipe => (BinaryOp::Union, 7, false),
        Lt => (BinaryOp::Lt, 6, false),
        Gt => (BinaryOp::Gt, 6, false),
        Le => (BinaryOp::Le, 6, false),
        Ge => (BinaryOp::Ge, 6, false),
        Eq => (BinaryOp::Eq, 5, false),
        Ne => (BinaryOp::Ne, 5, false),
        Tilde => (BinaryOp::Equiv, 5, false),
        NotTilde => (BinaryOp::NotEquiv, 5, false),
        In => (BinaryOp::In, 4, false),
        Contains => (BinaryOp::Contains, 4, false),
        And => (BinaryOp::And, 3, false),
        Xor => (BinaryOp::Xor, 2, false),
        Or => (BinaryOp::Or, 1, false),
        Implies => (BinaryOp::Implies, 0, true),
        _ => return None,
    })
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].offset
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if matches!(self.peek(), Token::Eof) {
            Ok(())
        } else {
            Err(self.error("end of input", self.peek()))
        }
    }

    fn error(&self, expected: &str, found: &Token) -> ParseError {
        ParseError { offset: self.offset(), expected: expected.to_string(), found: format!("{found:?}") }
    }

    fn expect(&mut self, tok: Token) -> Result<(), ParseError> {
        if *self.peek() == tok {
            self.advance();
            Ok(())
        } else {
            let found = self.peek().clone();
            Err(self.error(&format!("{tok:?}"), &found))
        }
    }

    /// `is`/`as` have their own precedence level (8) and take a type
    /// specifier RHS rather than a general expression.
    fn parse_expr(&mut self, min_prec: u8) -> Result<Arc<ExprNode>, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            if matches!(self.peek(), Token::Is | Token::As) && 8 >= min_prec {
                let offset = self.offset();
                let is_as = if matches!(self.peek(), Token::Is) { IsAs::Is } else { IsAs::As };
                self.advance();
                let type_name = self.parse_type_name()?;
                left = ExprNode::new(ExprKind::TypeOp { is_as, value: left, type_name }, offset);
                continue;
            }
            let Some((op, prec, right_assoc)) = binary_info(self.peek()) else { break };
            if prec < min_prec {
                break;
            }
            let offset = self.offset();
            self.advance();
            let next_min = if right_assoc { prec } else { prec + 1 };
            let right = self.parse_expr(next_min)?;
            left = ExprNode::new(ExprKind::Binary(op, left, right), offset);
        }
        Ok(left)
    }

    fn parse_type_name(&mut self) -> Result<String, ParseError> {
        let mut name = match self.advance() {
            Token::Identifier(s) => s,
            Token::True => "true".to_string(),
            Token::False => "false".to_string(),
            other => return Err(self.error("a type name", &other)),
        };
        while matches!(self.peek(), Token::Dot) {
            self.advance();
            match self.advance() {
                Token::Identifier(s) => {
                    name.push('.');
                    name.push_str(&s);
                }
                other => return Err(self.error("identifier after '.'", &other)),
            }
        }
        Ok(name)
    }

    fn parse_unary(&mut self) -> Result<Arc<ExprNode>, ParseError> {
        let offset = self.offset();
        match self.peek() {
            Token::Plus => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(ExprNode::new(ExprKind::Unary(UnaryOp::Plus, operand), offset))
            }
            Token::Minus => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(ExprNode::new(ExprKind::Unary(UnaryOp::Minus, operand), offset))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Arc<ExprNode>, ParseError> {
        let mut term = self.parse_term()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    term = self.parse_invocation(Some(term))?;
                }
                Token::LBracket => {
                    let offset = self.offset();
                    self.advance();
                    let index = self.parse_expr(0)?;
                    self.expect(Token::RBracket)?;
                    term = ExprNode::new(ExprKind::Index_ { base: term, index }, offset);
                }
                _ => break,
            }
        }
        Ok(term)
    }

    /// Parses either a member path step or a function invocation, used both
    /// after `.` and (with `base: None`) at the start of a term.
    fn parse_invocation(&mut self, base: Option<Arc<ExprNode>>) -> Result<Arc<ExprNode>, ParseError> {
        let offset = self.offset();
        let name = self.take_invocation_name()?;
        if matches!(self.peek(), Token::LParen) {
            self.advance();
            let mut args = Vec::new();
            if !matches!(self.peek(), Token::RParen) {
                loop {
                    args.push(self.parse_expr(0)?);
                    if matches!(self.peek(), Token::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
            self.expect(Token::RParen)?;
            Ok(ExprNode::new(ExprKind::Invocation { base, name, args }, offset))
        } else {
            match base {
                Some(base) => Ok(ExprNode::new(ExprKind::Path { base, member: name }, offset)),
                None => Ok(ExprNode::new(ExprKind::Identifier(name), offset)),
            }
        }
    }

    /// Accepts both plain identifiers and the keyword tokens that the FHIRPath
    /// grammar permits as function/member names (`contains`, `as`, `is`, `div`,
    /// `mod`, `and`, `or`, `xor`, `implies`, `in`) — these are only reserved
    /// in binary-operator position, not invocation position.
    fn take_invocation_name(&mut self) -> Result<String, ParseError> {
        let tok = self.advance();
        Ok(match tok {
            Token::Identifier(s) => s,
            Token::And => "and".to_string(),
            Token::Or => "or".to_string(),
            Token::Xor => "xor".to_string(),
            Token::Implies => "implies".to_string(),
            Token::In => "in".to_string(),
            Token::Contains => "contains".to_string(),
            Token::Is => "is".to_string(),
            Token::As => "as".to_string(),
            Token::Div => "div".to_string(),
            Token::Mod => "mod".to_string(),
            other => return Err(self.error("an identifier", &other)),
        })
    }

    fn parse_term(&mut self) -> Result<Arc<ExprNode>, ParseError> {
        let offset = self.offset();
        match self.peek().clone() {
            Token::Integer(i) => {
                self.advance();
                Ok(ExprNode::new(ExprKind::Literal(Literal::Integer(i)), offset))
            }
            Token::Decimal(d) => {
                self.advance();
                Ok(ExprNode::new(ExprKind::Literal(Literal::Decimal(d)), offset))
            }
            Token::String(s) => {
                self.advance();
                Ok(ExprNode::new(ExprKind::Literal(Literal::String(s)), offset))
            }
            Token::True => {
                self.advance();
                Ok(ExprNode::new(ExprKind::Literal(Literal::Boolean(true)), offset))
            }
            Token::False => {
                self.advance();
                Ok(ExprNode::new(ExprKind::Literal(Literal::Boolean(false)), offset))
            }
            Token::Date(d) => {
                self.advance();
                Ok(ExprNode::new(ExprKind::Literal(Literal::Date(d)), offset))
            }
            Token::DateTime(d) => {
                self.advance();
                Ok(ExprNode::new(ExprKind::Literal(Literal::DateTime(d)), offset))
            }
            Token::Time(t) => {
                self.advance();
                Ok(ExprNode::new(ExprKind::Literal(Literal::Time(t)), offset))
            }
            Token::QuantityUnit(v, u) => {
                self.advance();
                Ok(ExprNode::new(ExprKind::Literal(Literal::Quantity(v, u)), offset))
            }
            Token::ExternalConstant(name) => {
                self.advance();
                Ok(ExprNode::new(ExprKind::ExternalConstant(name), offset))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr(0)?;
                self.expect(Token::RParen)?;
                Ok(ExprNode::new(ExprKind::Paren(inner), offset))
            }
            Token::LBrace => {
                self.advance();
                self.expect(Token::RBrace)?;
                Ok(ExprNode::new(ExprKind::Literal(Literal::Empty), offset))
            }
            Token::Dollar => {
                self.advance();
                match self.advance() {
                    Token::Identifier(s) if s == "this" => {
                        Ok(ExprNode::new(ExprKind::This, offset))
                    }
                    Token::Identifier(s) if s == "index" => {
                        Ok(ExprNode::new(ExprKind::Index, offset))
                    }
                    Token::Identifier(s) if s == "total" => {
                        Ok(ExprNode::new(ExprKind::Total, offset))
                    }
                    other => Err(self.error("this, index, or total", &other)),
                }
            }
            Token::Identifier(_)
            | Token::And
            | Token::Or
            | Token::Xor
            | Token::Implies
            | Token::In
            | Token::Contains
            | Token::Is
            | Token::As
            | Token::Div
            | Token::Mod => self.parse_invocation(None),
            other => Err(self.error("a term", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Arc<ExprNode> {
        parse_expression(src).unwrap()
    }

    #[test]
    fn path_navigation() {
        let e = parse("Patient.name.family");
        assert!(matches!(e.kind, ExprKind::Path { .. }));
    }

    #[test]
    fn precedence_mult_binds_tighter_than_add() {
        let e = parse("1 + 2 * 3");
        match &e.kind {
            ExprKind::Binary(BinaryOp::Add, _, rhs) => {
                assert!(matches!(rhs.kind, ExprKind::Binary(BinaryOp::Mul, _, _)));
            }
            _ => panic!("expected Add at top"),
        }
    }

    #[test]
    fn implies_is_right_associative() {
        let e = parse("true implies false implies true");
        match &e.kind {
            ExprKind::Binary(BinaryOp::Implies, _, rhs) => {
                assert!(matches!(rhs.kind, ExprKind::Binary(BinaryOp::Implies, _, _)));
            }
            _ => panic!("expected Implies at top"),
        }
    }

    #[test]
    fn function_call_with_args() {
        let e = parse("name.where(use = 'official')");
        match &e.kind {
            ExprKind::Invocation { name, args, .. } => {
                assert_eq!(name, "where");
                assert_eq!(args.len(), 1);
            }
            _ => panic!("expected invocation"),
        }
    }

    #[test]
    fn keyword_as_function_name() {
        let e = parse("name.contains('x')");
        assert!(matches!(e.kind, ExprKind::Invocation { .. }));
    }

    #[test]
    fn indexer() {
        let e = parse("name[0]");
        assert!(matches!(e.kind, ExprKind::Index_ { .. }));
    }

    #[test]
    fn unary_minus_binds_looser_than_dot() {
        let e = parse("-a.b");
        match &e.kind {
            ExprKind::Unary(UnaryOp::Minus, inner) => {
                assert!(matches!(inner.kind, ExprKind::Path { .. }));
            }
            _ => panic!("expected unary minus at top"),
        }
    }

    #[test]
    fn is_as_binary() {
        let e = parse("x is Integer");
        assert!(matches!(e.kind, ExprKind::TypeOp { is_as: IsAs::Is, .. }));
    }

    #[test]
    fn empty_collection_literal() {
        let e = parse("{}");
        assert!(matches!(e.kind, ExprKind::Literal(Literal::Empty)));
    }

    #[test]
    fn paren_roundtrip_parses() {
        let e = parse("(1 + 2)");
        assert!(matches!(e.kind, ExprKind::Paren(_)));
    }
}
