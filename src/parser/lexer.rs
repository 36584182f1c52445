//! Lexer (spec §4.1, C5).

use std::fmt;

use rust_decimal::Decimal;
use unicode_xid::UnicodeXID;

use crate::model::datetime::{PartialDate, PartialDateTime, PartialTime};
use crate::model::json::{try_parse_date, try_parse_datetime, try_parse_time};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Identifier(String),
    Integer(i64),
    Decimal(Decimal),
    String(String),
    Date(PartialDate),
    DateTime(PartialDateTime),
    Time(PartialTime),
    /// Number + unit string: `4 'wk'`.
    QuantityUnit(Decimal, String),
    ExternalConstant(String),

    // keywords
    And,
    Or,
    Xor,
    Implies,
    In,
    Contains,
    Is,
    As,
    Div,
    Mod,
    True,
    False,

    Dollar, // followed by this/index/total handled at identifier level
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Amp,
    Pipe,
    Eq,
    Ne,
    Tilde,
    NotTilde,
    Lt,
    Le,
    Gt,
    Ge,

    Eof,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("lex error at offset {offset}: {message}")]
pub struct LexError {
    pub offset: usize,
    pub message: String,
}

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

pub struct SpannedToken {
    pub token: Token,
    pub offset: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, bytes: src.as_bytes(), pos: 0 }
    }

    pub fn tokenize(mut self) -> Result<Vec<SpannedToken>, LexError> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia();
            let offset = self.pos;
            if self.pos >= self.bytes.len() {
                out.push(SpannedToken { token: Token::Eof, offset });
                break;
            }
            let token = self.next_token()?;
            out.push(SpannedToken { token, offset });
        }
        Ok(out)
    }

    fn skip_trivia(&mut self) {
        loop {
            while self.pos < self.bytes.len() && (self.bytes[self.pos] as char).is_whitespace() {
                self.pos += 1;
            }
            if self.peek() == Some('/') && self.peek_at(1) == Some('/') {
                while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }
            if self.peek() == Some('/') && self.peek_at(1) == Some('*') {
                self.pos += 2;
                while self.pos < self.bytes.len()
                    && !(self.peek() == Some('*') && self.peek_at(1) == Some('/'))
                {
                    self.pos += 1;
                }
                self.pos = (self.pos + 2).min(self.bytes.len());
                continue;
            }
            break;
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let c = self.peek().unwrap();
        match c {
            '\'' => self.lex_string(),
            '@' => self.lex_temporal(),
            '%' => self.lex_external_constant(),
            '0'..='9' => self.lex_number(),
            c if c == '_' || c.is_xid_start() => self.lex_identifier(),
            '`' => self.lex_backtick_identifier(),
            '.' => {
                self.bump();
                Ok(Token::Dot)
            }
            '(' => {
                self.bump();
                Ok(Token::LParen)
            }
            ')' => {
                self.bump();
                Ok(Token::RParen)
            }
            '[' => {
                self.bump();
                Ok(Token::LBracket)
            }
            ']' => {
                self.bump();
                Ok(Token::RBracket)
            }
            '{' => {
                self.bump();
                Ok(Token::LBrace)
            }
            '}' => {
                self.bump();
                Ok(Token::RBrace)
            }
            ',' => {
                self.bump();
                Ok(Token::Comma)
            }
            '+' => {
                self.bump();
                Ok(Token::Plus)
            }
            '-' => {
                self.bump();
                Ok(Token::Minus)
            }
            '*' => {
                self.bump();
                Ok(Token::Star)
            }
            '/' => {
                self.bump();
                Ok(Token::Slash)
            }
            '&' => {
                self.bump();
                Ok(Token::Amp)
            }
            '|' => {
                self.bump();
                Ok(Token::Pipe)
            }
            '=' => {
                self.bump();
                Ok(Token::Eq)
            }
            '~' => {
                self.bump();
                Ok(Token::Tilde)
            }
            '!' => {
                self.bump();
                match self.peek() {
                    Some('=') => {
                        self.bump();
                        Ok(Token::Ne)
                    }
                    Some('~') => {
                        self.bump();
                        Ok(Token::NotTilde)
                    }
                    _ => Err(self.err("expected '=' or '~' after '!'")),
                }
            }
            '<' => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    Ok(Token::Le)
                } else {
                    Ok(Token::Lt)
                }
            }
            '>' => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    Ok(Token::Ge)
                } else {
                    Ok(Token::Gt)
                }
            }
            '$' => {
                self.bump();
                Ok(Token::Dollar)
            }
            other => Err(self.err(&format!("unexpected character '{other}'"))),
        }
    }

    fn err(&self, message: &str) -> LexError {
        LexError { offset: self.pos, message: message.to_string() }
    }

    fn lex_string(&mut self) -> Result<Token, LexError> {
        self.bump(); // opening quote
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(self.err("unterminated string literal")),
                Some('\'') => break,
                Some('\\') => s.push(self.lex_escape()?),
                Some(c) => s.push(c),
            }
        }
        Ok(Token::String(s))
    }

    fn lex_escape(&mut self) -> Result<char, LexError> {
        match self.bump() {
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('t') => Ok('\t'),
            Some('\'') => Ok('\''),
            Some('"') => Ok('"'),
            Some('\\') => Ok('\\'),
            Some('/') => Ok('/'),
            Some('`') => Ok('`'),
            Some('u') => {
                let mut code = 0u32;
                for _ in 0..4 {
                    let c = self.bump().ok_or_else(|| self.err("truncated \\u escape"))?;
                    code = code * 16 + c.to_digit(16).ok_or_else(|| self.err("invalid hex digit"))?;
                }
                char::from_u32(code).ok_or_else(|| self.err("invalid unicode escape"))
            }
            _ => Err(self.err("invalid escape sequence")),
        }
    }

    fn lex_backtick_identifier(&mut self) -> Result<Token, LexError> {
        self.bump();
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(self.err("unterminated delimited identifier")),
                Some('`') => break,
                Some(c) => s.push(c),
            }
        }
        Ok(Token::Identifier(s))
    }

    fn lex_identifier(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '_' || c.is_xid_continue() {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        Ok(match text {
            "and" => Token::And,
            "or" => Token::Or,
            "xor" => Token::Xor,
            "implies" => Token::Implies,
            "in" => Token::In,
            "contains" => Token::Contains,
            "is" => Token::Is,
            "as" => Token::As,
            "div" => Token::Div,
            "mod" => Token::Mod,
            "true" => Token::True,
            "false" => Token::False,
            _ => Token::Identifier(text.to_string()),
        })
    }

    fn lex_external_constant(&mut self) -> Result<Token, LexError> {
        self.bump(); // %
        if self.peek() == Some('\'') {
            if let Token::String(s) = self.lex_string()? {
                return Ok(Token::ExternalConstant(s));
            }
            unreachable!()
        }
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '_' || c.is_xid_continue() {
                self.bump();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.err("expected identifier or string after '%'"));
        }
        Ok(Token::ExternalConstant(self.src[start..self.pos].to_string()))
    }

    fn lex_number(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        let mut is_decimal = false;
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_decimal = true;
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        let text = &self.src[start..self.pos];
        self.skip_inline_space();
        if self.peek() == Some('\'') {
            let unit_start = self.pos;
            self.bump();
            while self.peek().is_some_and(|c| c != '\'') {
                self.bump();
            }
            if self.peek() != Some('\'') {
                return Err(self.err("unterminated unit string"));
            }
            self.bump();
            let unit = &self.src[unit_start + 1..self.pos - 1];
            let value: Decimal = text.parse().map_err(|_| self.err("invalid number"))?;
            return Ok(Token::QuantityUnit(value, unit.to_string()));
        }
        if let Some(word) = self.peek_calendar_unit_word() {
            let value: Decimal = text.parse().map_err(|_| self.err("invalid number"))?;
            return Ok(Token::QuantityUnit(value, word));
        }
        if is_decimal {
            Ok(Token::Decimal(text.parse().map_err(|_| self.err("invalid decimal"))?))
        } else {
            match text.parse::<i64>() {
                Ok(i) => Ok(Token::Integer(i)),
                Err(_) => Ok(Token::Decimal(text.parse().map_err(|_| self.err("invalid integer"))?)),
            }
        }
    }

    fn skip_inline_space(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.bump();
        }
    }

    /// Bare calendar-duration words (`4 years`, `1 day`) are quantity
    /// literals too, per the grammar's `unit` production.
    fn peek_calendar_unit_word(&mut self) -> Option<String> {
        let save = self.pos;
        let start = self.pos;
        if !matches!(self.peek(), Some(c) if c.is_ascii_alphabetic()) {
            return None;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_alphabetic()) {
            self.bump();
        }
        let word = &self.src[start..self.pos];
        const UNITS: &[&str] = &[
            "years", "year", "months", "month", "weeks", "week", "days", "day", "hours", "hour",
            "minutes", "minute", "seconds", "second", "milliseconds", "millisecond", "ms",
        ];
        if UNITS.contains(&word) {
            Some(word.to_string())
        } else {
            self.pos = save;
            None
        }
    }

    fn lex_temporal(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        self.bump(); // @
        if self.peek() == Some('T') {
            self.bump();
            let ts = start + 2;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit() || matches!(c, ':' | '.' | '+' | '-' | 'Z')) {
                self.bump();
            }
            let text = &self.src[ts..self.pos];
            return try_parse_time(text)
                .map(Token::Time)
                .ok_or_else(|| self.err("invalid time literal"));
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || matches!(c, '-' | ':' | '.' | 'T' | '+' | 'Z')) {
            self.bump();
        }
        let text = &self.src[start + 1..self.pos];
        if text.contains('T') {
            try_parse_datetime(text).map(Token::DateTime).ok_or_else(|| self.err("invalid datetime literal"))
        } else {
            try_parse_date(text).map(Token::Date).ok_or_else(|| self.err("invalid date literal"))
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        Lexer::new(src).tokenize().unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn simple_path() {
        assert_eq!(
            toks("Patient.name"),
            vec![
                Token::Identifier("Patient".into()),
                Token::Dot,
                Token::Identifier("name".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn string_escape() {
        assert_eq!(toks("'a\\nb'"), vec![Token::String("a\nb".into()), Token::Eof]);
    }

    #[test]
    fn quantity_literal() {
        assert_eq!(
            toks("4 'wk'"),
            vec![Token::QuantityUnit("4".parse().unwrap(), "wk".into()), Token::Eof]
        );
    }

    #[test]
    fn keywords() {
        assert_eq!(toks("true and false"), vec![Token::True, Token::And, Token::False, Token::Eof]);
    }
}
