/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Hand-rolled lexer. Classifies identifiers against fixed keyword sets and
//! never aborts on bad input: malformed literals and unknown bytes become
//! `Error` tokens alongside a buffered diagnostic, so one pass can surface
//! every lexical problem in the file.

mod classify;

use std::sync::Arc;

use crate::diagnostics::{Diagnostics, SourceLocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    EndOfFile,
    Identifier,
    String,
    Integer,
    Float,
    Register,
    Variable,
    Comma,
    Colon,
    Semicolon,
    Equals,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Dot,
    Arrow,
    Instruction,
    Directive,
    Label,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterClass {
    Gp,
    Fp,
    Vec,
    Special,
}

impl RegisterClass {
    pub fn from_reg_id(id: u8) -> Self {
        match id {
            0x00..=0x0F => RegisterClass::Gp,
            0x10..=0x1F => RegisterClass::Fp,
            0x20..=0x2F => RegisterClass::Vec,
            _ => RegisterClass::Special,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenPayload {
    None,
    Integer(i64),
    Float(f64),
    Register(u8),
    Variable(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub location: SourceLocation,
    pub payload: TokenPayload,
}

impl Token {
    pub fn as_integer(&self) -> Option<i64> {
        match self.payload {
            TokenPayload::Integer(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.payload {
            TokenPayload::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_register(&self) -> Option<u8> {
        match self.payload {
            TokenPayload::Register(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<u8> {
        match self.payload {
            TokenPayload::Variable(v) => Some(v),
            _ => None,
        }
    }
}

/// Produces a finite sequence of Tokens from an immutable source buffer.
/// Whitespace and comments are dropped by the tokenization loop; the lexer
/// never throws, it records diagnostics on the shared sink and keeps going.
pub struct Lexer<'a> {
    source: &'a [u8],
    file: Arc<str>,
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(file: impl Into<Arc<str>>, source: &'a str) -> Self {
        Self {
            source: source.as_bytes(),
            file: file.into(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn here(&self) -> SourceLocation {
        SourceLocation::new(self.file.clone(), self.line, self.column)
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.advance();
                }
                Some(b';') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Produces every token through EndOfFile, buffering diagnostics for any
    /// lexical error encountered along the way.
    pub fn tokenize(mut self, diagnostics: &mut Diagnostics) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token(diagnostics);
            let done = token.kind == TokenKind::EndOfFile;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    fn next_token(&mut self, diagnostics: &mut Diagnostics) -> Token {
        self.skip_whitespace_and_comments();

        let start = self.here();
        let Some(b) = self.peek() else {
            return Token {
                kind: TokenKind::EndOfFile,
                text: String::new(),
                location: start,
                payload: TokenPayload::None,
            };
        };

        if b == b'"' {
            return self.scan_string(start, diagnostics);
        }
        if b == b'$' {
            return self.scan_variable(start, diagnostics);
        }
        if b.is_ascii_digit() || (b == b'-' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())) {
            return self.scan_number(start, diagnostics);
        }
        if b.is_ascii_alphabetic() || b == b'_' {
            return self.scan_identifier(start);
        }

        self.scan_punctuation(start, diagnostics)
    }

    fn scan_identifier(&mut self, start: SourceLocation) -> Token {
        let begin = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        let text = String::from_utf8_lossy(&self.source[begin..self.pos]).into_owned();
        classify::classify_identifier(text, start)
    }

    fn scan_variable(&mut self, start: SourceLocation, diagnostics: &mut Diagnostics) -> Token {
        self.advance(); // consume '$'
        let begin = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.advance();
        }
        let digits = String::from_utf8_lossy(&self.source[begin..self.pos]).into_owned();
        let text = format!("${digits}");

        if digits.is_empty() {
            diagnostics.error(start.clone(), "expected digits after '$'");
            return Token {
                kind: TokenKind::Error,
                text,
                location: start,
                payload: TokenPayload::None,
            };
        }

        match digits.parse::<u32>() {
            Ok(n) if n <= 255 => Token {
                kind: TokenKind::Variable,
                text,
                location: start,
                payload: TokenPayload::Variable(n as u8),
            },
            _ => {
                diagnostics.error(start.clone(), format!("variable id out of range: ${digits}"));
                Token {
                    kind: TokenKind::Error,
                    text,
                    location: start,
                    payload: TokenPayload::None,
                }
            }
        }
    }

    fn scan_number(&mut self, start: SourceLocation, diagnostics: &mut Diagnostics) -> Token {
        let begin = self.pos;
        if self.peek() == Some(b'-') {
            self.advance();
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.advance();
        }

        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.advance();
            }
        }

        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let save = (self.pos, self.line, self.column);
            self.advance();
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.advance();
            }
            if self.peek().is_some_and(|b| b.is_ascii_digit()) {
                is_float = true;
                while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                    self.advance();
                }
            } else {
                (self.pos, self.line, self.column) = save;
            }
        }

        let text = String::from_utf8_lossy(&self.source[begin..self.pos]).into_owned();

        if is_float {
            match text.parse::<f64>() {
                Ok(v) => Token {
                    kind: TokenKind::Float,
                    text,
                    location: start,
                    payload: TokenPayload::Float(v),
                },
                Err(_) => {
                    diagnostics.error(start.clone(), format!("malformed float literal: {text}"));
                    Token {
                        kind: TokenKind::Error,
                        text,
                        location: start,
                        payload: TokenPayload::None,
                    }
                }
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => Token {
                    kind: TokenKind::Integer,
                    text,
                    location: start,
                    payload: TokenPayload::Integer(v),
                },
                Err(_) => {
                    diagnostics.error(start.clone(), format!("malformed or overflowing integer literal: {text}"));
                    Token {
                        kind: TokenKind::Error,
                        text,
                        location: start,
                        payload: TokenPayload::None,
                    }
                }
            }
        }
    }

    fn scan_string(&mut self, start: SourceLocation, diagnostics: &mut Diagnostics) -> Token {
        self.advance(); // opening quote
        let mut content = Vec::new();
        loop {
            match self.peek() {
                None => {
                    diagnostics.error(start.clone(), "unterminated string literal");
                    return Token {
                        kind: TokenKind::Error,
                        text: String::from_utf8_lossy(&content).into_owned(),
                        location: start,
                        payload: TokenPayload::None,
                    };
                }
                Some(b'"') => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    match self.advance() {
                        Some(escaped) => content.push(escaped),
                        None => {
                            diagnostics.error(start.clone(), "unterminated escape sequence in string literal");
                            return Token {
                                kind: TokenKind::Error,
                                text: String::from_utf8_lossy(&content).into_owned(),
                                location: start,
                                payload: TokenPayload::None,
                            };
                        }
                    }
                }
                Some(b) => {
                    self.advance();
                    content.push(b);
                }
            }
        }

        Token {
            kind: TokenKind::String,
            text: String::from_utf8_lossy(&content).into_owned(),
            location: start,
            payload: TokenPayload::None,
        }
    }

    fn scan_punctuation(&mut self, start: SourceLocation, diagnostics: &mut Diagnostics) -> Token {
        let b = self.advance().expect("caller already peeked a byte");

        let kind = match b {
            b',' => TokenKind::Comma,
            b':' => TokenKind::Colon,
            b';' => TokenKind::Semicolon,
            b'=' => TokenKind::Equals,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b'+' => TokenKind::Plus,
            b'-' => {
                if self.peek() == Some(b'>') {
                    self.advance();
                    return Token {
                        kind: TokenKind::Arrow,
                        text: "->".to_string(),
                        location: start,
                        payload: TokenPayload::None,
                    };
                }
                TokenKind::Minus
            }
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b'.' => TokenKind::Dot,
            other => {
                diagnostics.error(start.clone(), format!("unexpected character: {:?}", other as char));
                TokenKind::Error
            }
        };

        Token {
            kind,
            text: (b as char).to_string(),
            location: start,
            payload: TokenPayload::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        let mut diagnostics = Diagnostics::new();
        let tokens = Lexer::new("test.coil", src).tokenize(&mut diagnostics);
        assert!(!diagnostics.has_errors(), "unexpected lex errors: {:?}", diagnostics.messages());
        tokens
    }

    #[test]
    fn classifies_literals() {
        // S5
        let tokens = lex(r#"42 -100 3.14159 "Hello, World!""#);
        assert_eq!(tokens[0].kind, TokenKind::Integer);
        assert_eq!(tokens[0].as_integer(), Some(42));
        assert_eq!(tokens[1].kind, TokenKind::Integer);
        assert_eq!(tokens[1].as_integer(), Some(-100));
        assert_eq!(tokens[2].kind, TokenKind::Float);
        assert!((tokens[2].as_float().unwrap() - 3.14159).abs() < 1e-9);
        assert_eq!(tokens[3].kind, TokenKind::String);
        assert_eq!(tokens[3].text, "Hello, World!");
        assert_eq!(tokens[4].kind, TokenKind::EndOfFile);
    }

    #[test]
    fn classifies_registers() {
        let tokens = lex("R0 F3 V15 PC SP FP FLAGS LR");
        assert_eq!(tokens[0].as_register(), Some(0x00));
        assert_eq!(tokens[1].as_register(), Some(0x13));
        assert_eq!(tokens[2].as_register(), Some(0x2F));
        assert_eq!(tokens[3].as_register(), Some(0x30));
        assert_eq!(tokens[4].as_register(), Some(0x31));
        assert_eq!(tokens[5].as_register(), Some(0x32));
        assert_eq!(tokens[6].as_register(), Some(0x33));
        assert_eq!(tokens[7].as_register(), Some(0x34));
    }

    #[test]
    fn classifies_category_and_directive_keywords() {
        let tokens = lex("MATH ADD DIR SECT");
        assert_eq!(tokens[0].kind, TokenKind::Instruction);
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[2].kind, TokenKind::Directive);
        assert_eq!(tokens[3].kind, TokenKind::Directive);
    }

    #[test]
    fn variable_token() {
        let tokens = lex("$7 $255");
        assert_eq!(tokens[0].as_variable(), Some(7));
        assert_eq!(tokens[1].as_variable(), Some(255));
    }

    #[test]
    fn arrow_digraph_before_minus() {
        let tokens = lex("a -> -5");
        assert_eq!(tokens[1].kind, TokenKind::Arrow);
        assert_eq!(tokens[2].kind, TokenKind::Integer);
        assert_eq!(tokens[2].as_integer(), Some(-5));
    }

    #[test]
    fn string_escape_is_raw_passthrough() {
        let tokens = lex(r#""a\"b\nc""#);
        assert_eq!(tokens[0].kind, TokenKind::String);
        // \" -> ", \n -> literal 'n' (no interpretation)
        assert_eq!(tokens[0].text, "a\"bnc");
    }

    #[test]
    fn comment_is_skipped() {
        let tokens = lex("MEM ; a comment\nMOV");
        assert_eq!(tokens[0].kind, TokenKind::Instruction);
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].text, "MOV");
        assert_eq!(tokens[1].location.line, 2);
    }

    #[test]
    fn unknown_byte_is_error_token_but_lexing_continues() {
        let mut diagnostics = Diagnostics::new();
        let tokens = Lexer::new("test.coil", "R0 ` R1").tokenize(&mut diagnostics);
        assert!(diagnostics.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::Register);
        assert_eq!(tokens[1].kind, TokenKind::Error);
        assert_eq!(tokens[2].kind, TokenKind::Register);
        assert_eq!(tokens[3].kind, TokenKind::EndOfFile);
    }

    #[test]
    fn line_and_column_tracking() {
        let tokens = lex("R0\nR1");
        assert_eq!(tokens[0].location.line, 1);
        assert_eq!(tokens[0].location.column, 1);
        assert_eq!(tokens[1].location.line, 2);
        assert_eq!(tokens[1].location.column, 1);
    }
}
