use crate::compiler::tokens::TokenKind;

use super::{Cursor, LexError, Lexer};

impl Lexer<'_> {
    fn escape(&mut self, start: Cursor) -> Result<char, LexError> {
        let Some(c) = self.bump() else {
            return Err(LexError::UnterminatedString {
                span: self.span_from(start).to_display(self.interner),
            });
        };
        Ok(match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            other => {
                return Err(LexError::UnknownEscape {
                    escape: other,
                    span: self.span_from(start).to_display(self.interner),
                });
            }
        })
    }

    pub fn lex_string(&mut self) -> Result<(), LexError> {
        let start = self.cursor;
        self.bump();

        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => value.push(self.escape(start)?),
                Some(c) => value.push(c),
                None => {
                    return Err(LexError::UnterminatedString {
                        span: self.span_from(start).to_display(self.interner),
                    });
                }
            }
        }

        let sym = self.interner.get_or_intern(&value);
        self.push(TokenKind::StringLiteral(sym), start);
        Ok(())
    }

    pub fn lex_char(&mut self) -> Result<(), LexError> {
        let start = self.cursor;
        self.bump();

        let c = match self.bump() {
            Some('\\') => self.escape(start)?,
            Some(c) if c != '\'' => c,
            _ => {
                return Err(LexError::InvalidChar {
                    span: self.span_from(start).to_display(self.interner),
                });
            }
        };

        if self.bump() != Some('\'') || !c.is_ascii() {
            return Err(LexError::InvalidChar {
                span: self.span_from(start).to_display(self.interner),
            });
        }

        self.push(TokenKind::CharLiteral(c as u8), start);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::Interner;
    use crate::compiler::lexer::{LexError, tokenize};
    use crate::compiler::tokens::TokenKind;

    #[test]
    fn test_lex_string_with_escapes() {
        let mut interner = Interner::new();
        let file = interner.get_or_intern("");
        let tokens = tokenize(r#""hi\n\"there\"""#, &mut interner, file).unwrap();
        let TokenKind::StringLiteral(sym) = tokens[0].kind else {
            panic!("expected a string literal, got {:?}", tokens[0].kind);
        };
        assert_eq!(interner.resolve(sym), Some("hi\n\"there\""));
    }

    #[test]
    fn test_lex_chars() {
        let mut interner = Interner::new();
        let file = interner.get_or_intern("");
        let tokens = tokenize(r"'a' '\n' '\0'", &mut interner, file).unwrap();
        let kinds = tokens.iter().map(|t| t.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                TokenKind::CharLiteral(b'a'),
                TokenKind::CharLiteral(b'\n'),
                TokenKind::CharLiteral(0),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let mut interner = Interner::new();
        let file = interner.get_or_intern("");
        let err = tokenize("\"never closed", &mut interner, file).unwrap_err();
        assert!(matches!(err, LexError::UnterminatedString { .. }));
    }
}
