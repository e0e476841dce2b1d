//! Tokenizer for preprocessed shader text.
//!
//! Produces identifiers, numbers, string literals and single-character
//! punctuation. Positions are 0-based output lines with 1-based columns;
//! [`Preprocessed::locate`] maps them back to the original source.

use crate::message::{code, Messages};
use crate::preprocess::Preprocessed;

/// Token classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword.
    Ident,
    /// Numeric literal.
    Number,
    /// String literal, including quotes.
    Str,
    /// One punctuation character.
    Punct,
    /// End of input.
    Eof,
}

/// A token borrowed from the preprocessed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// Classification.
    pub kind: TokenKind,
    /// Source text of the token.
    pub text: &'a str,
    /// 0-based output line.
    pub line: usize,
    /// 1-based column.
    pub col: u32,
}

impl Token<'_> {
    /// Returns `true` if this is the punctuation character `c`.
    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct && self.text.len() == 1 && self.text.starts_with(c)
    }

    /// Returns `true` if this is the identifier `word`.
    pub fn is_ident(&self, word: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == word
    }
}

/// Tokenizes preprocessed text. The result always ends with an
/// [`TokenKind::Eof`] token.
pub fn lex<'a>(pre: &'a Preprocessed, messages: &mut Messages) -> Vec<Token<'a>> {
    let mut lexer = Lexer {
        source: pre.text.as_bytes(),
        text: &pre.text,
        pos: 0,
        line: 0,
        line_start: 0,
        pre,
        messages,
    };
    lexer.lex_all()
}

struct Lexer<'a, 'm> {
    source: &'a [u8],
    text: &'a str,
    pos: usize,
    line: usize,
    line_start: usize,
    pre: &'a Preprocessed,
    messages: &'m mut Messages,
}

impl<'a> Lexer<'a, '_> {
    fn lex_all(&mut self) -> Vec<Token<'a>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            if self.pos >= self.source.len() {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    text: "",
                    line: self.line,
                    col: self.col(),
                });
                break;
            }
            if let Some(tok) = self.next_token() {
                tokens.push(tok);
            }
        }
        tokens
    }

    fn peek(&self) -> u8 {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.source.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn col(&self) -> u32 {
        (self.pos - self.line_start + 1) as u32
    }

    fn advance(&mut self) -> u8 {
        let b = self.source[self.pos];
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.line_start = self.pos;
        }
        b
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.pos < self.source.len() && self.peek().is_ascii_whitespace() {
                self.advance();
            }
            if self.peek() == b'/' && self.peek_at(1) == b'/' {
                while self.pos < self.source.len() && self.peek() != b'\n' {
                    self.advance();
                }
                continue;
            }
            if self.peek() == b'/' && self.peek_at(1) == b'*' {
                self.pos += 2;
                while self.pos < self.source.len() && !(self.peek() == b'*' && self.peek_at(1) == b'/') {
                    self.advance();
                }
                self.pos = (self.pos + 2).min(self.source.len());
                continue;
            }
            break;
        }
    }

    fn token(&self, kind: TokenKind, start: usize, col: u32) -> Token<'a> {
        Token {
            kind,
            text: &self.text[start..self.pos],
            line: self.line,
            col,
        }
    }

    fn next_token(&mut self) -> Option<Token<'a>> {
        let start = self.pos;
        let col = self.col();
        let b = self.peek();

        if b.is_ascii_alphabetic() || b == b'_' {
            while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
                self.advance();
            }
            return Some(self.token(TokenKind::Ident, start, col));
        }

        if b.is_ascii_digit() || (b == b'.' && self.peek_at(1).is_ascii_digit()) {
            while self.peek().is_ascii_alphanumeric() || self.peek() == b'.' {
                let c = self.advance();
                if matches!(c, b'e' | b'E') && matches!(self.peek(), b'+' | b'-') {
                    self.advance();
                }
            }
            return Some(self.token(TokenKind::Number, start, col));
        }

        if b == b'"' {
            self.advance();
            loop {
                match self.peek() {
                    b'"' => {
                        self.advance();
                        break;
                    }
                    b'\\' => {
                        self.advance();
                        if self.pos < self.source.len() {
                            self.advance();
                        }
                    }
                    b'\n' | 0 => {
                        self.messages.error(
                            code::SYNTAX,
                            self.pre.locate(self.line, col),
                            "unterminated string literal",
                        );
                        break;
                    }
                    _ => {
                        self.advance();
                    }
                }
            }
            return Some(self.token(TokenKind::Str, start, col));
        }

        if b.is_ascii_punctuation() && !matches!(b, b'@' | b'$' | b'`' | b'\\') {
            self.advance();
            return Some(self.token(TokenKind::Punct, start, col));
        }

        let ch = self.text[self.pos..].chars().next().unwrap_or('?');
        self.pos += ch.len_utf8();
        self.messages.error(
            code::SYNTAX,
            self.pre.locate(self.line, col),
            format!("invalid character '{ch}'"),
        );
        None
    }
}
