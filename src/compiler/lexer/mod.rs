use string_interner::symbol::SymbolUsize;

use super::Interner;
use super::tokens::{Span, Token, TokenKind};

pub mod error;
mod keywords;
mod numbers;
mod punctuation;
mod strings;

pub use error::LexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub line: usize,
    pub col: usize,
}

pub struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    pub cursor: Cursor,
    pub file: SymbolUsize,
    pub tokens: Vec<Token>,
    interner: &'a mut Interner,
}

pub trait IdentChar {
    fn is_valid_ident_start(&self) -> bool;
    fn is_valid_ident_char(&self) -> bool;
}

impl IdentChar for char {
    fn is_valid_ident_start(&self) -> bool {
        self.is_ascii_alphabetic() || *self == '_'
    }

    fn is_valid_ident_char(&self) -> bool {
        self.is_ascii_alphanumeric() || *self == '_'
    }
}

impl<'a> Lexer<'a> {
    pub fn new(source: &str, interner: &'a mut Interner, file: SymbolUsize) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            cursor: Cursor { line: 1, col: 1 },
            file,
            tokens: Vec::with_capacity(source.len() / 4),
            interner,
        }
    }

    /// Lexes the whole input. The returned stream always ends with `Eof`.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        while let Some(c) = self.peek(0) {
            if c.is_whitespace() {
                self.bump();
                continue;
            }
            if c == '/' && self.peek(1) == Some('/') {
                while let Some(c) = self.peek(0) {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }

            if c.is_ascii_digit() {
                self.lex_number()?;
            } else if c.is_valid_ident_start() {
                self.lex_word();
            } else if c == '"' {
                self.lex_string()?;
            } else if c == '\'' {
                self.lex_char()?;
            } else if !self.check_punctuation() {
                return Err(LexError::UnexpectedCharacter {
                    character: c,
                    span: self.here().to_display(self.interner),
                });
            }
        }

        let eof = self.here();
        self.tokens.push(Token::new(TokenKind::Eof, eof));
        tracing::debug!(count = self.tokens.len(), "lexed tokens");
        Ok(self.tokens)
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.cursor.line += 1;
            self.cursor.col = 1;
        } else {
            self.cursor.col += 1;
        }
        Some(c)
    }

    fn here(&self) -> Span {
        Span::new(self.file, self.cursor.line, self.cursor.col, self.cursor.line, self.cursor.col)
    }

    /// Span from `start` up to (inclusive) the last consumed char.
    fn span_from(&self, start: Cursor) -> Span {
        Span::new(
            self.file,
            start.line,
            start.col,
            self.cursor.line,
            self.cursor.col.saturating_sub(1).max(start.col),
        )
    }

    fn push(&mut self, kind: TokenKind, start: Cursor) {
        let span = self.span_from(start);
        self.tokens.push(Token::new(kind, span));
    }
}

/// Convenience used by the driver, macro expansion and the tests.
pub fn tokenize(source: &str, interner: &mut Interner, file: SymbolUsize) -> Result<Vec<Token>, LexError> {
    Lexer::new(source, interner, file).tokenize()
}
