use crate::compiler::tokens::TokenKind;

use super::{LexError, Lexer};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberBase {
    Decimal,
    Hex,
    Binary,
    Octal,
}

impl NumberBase {
    fn radix(self) -> u32 {
        match self {
            NumberBase::Decimal => 10,
            NumberBase::Hex => 16,
            NumberBase::Binary => 2,
            NumberBase::Octal => 8,
        }
    }
}

impl Lexer<'_> {
    pub fn lex_number(&mut self) -> Result<(), LexError> {
        let start = self.cursor;
        let mut base = NumberBase::Decimal;

        if self.peek(0) == Some('0') {
            let prefixed = match self.peek(1) {
                Some('x') => Some(NumberBase::Hex),
                Some('b') => Some(NumberBase::Binary),
                Some('o') => Some(NumberBase::Octal),
                _ => None,
            };
            if let Some(prefixed) = prefixed {
                base = prefixed;
                self.bump();
                self.bump();
            }
        }

        let mut digits = String::new();
        let mut float = false;
        while let Some(c) = self.peek(0) {
            if c == '_' {
                self.bump();
            } else if c.is_digit(base.radix()) {
                digits.push(c);
                self.bump();
            } else if c == '.' && !float && self.peek(1).is_some_and(|n| n.is_ascii_digit()) {
                float = true;
                digits.push(c);
                self.bump();
            } else {
                break;
            }
        }

        if float {
            if base != NumberBase::Decimal {
                return Err(LexError::NonDecimalFloat {
                    span: self.span_from(start).to_display(self.interner),
                });
            }
            let value = digits.parse::<f64>().map_err(|source| LexError::InvalidFloat {
                value: digits.clone(),
                span: self.span_from(start).to_display(self.interner),
                source,
            })?;
            self.push(TokenKind::FloatLiteral(value), start);
        } else {
            let value = i64::from_str_radix(&digits, base.radix()).map_err(|source| LexError::InvalidInteger {
                value: digits.clone(),
                span: self.span_from(start).to_display(self.interner),
                source,
            })?;
            self.push(TokenKind::IntLiteral(value), start);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::Interner;
    use crate::compiler::lexer::{LexError, tokenize};
    use crate::compiler::tokens::TokenKind::*;

    #[test]
    fn test_lex_numbers() {
        let mut interner = Interner::new();
        let file = interner.get_or_intern("");
        let tokens = tokenize("0 42 1_000 0xff 0b101 0o17 3.25", &mut interner, file).unwrap();
        let kinds = tokens.iter().map(|t| t.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                IntLiteral(0),
                IntLiteral(42),
                IntLiteral(1000),
                IntLiteral(255),
                IntLiteral(5),
                IntLiteral(15),
                FloatLiteral(3.25),
                Eof
            ]
        );
    }

    #[test]
    fn test_dot_after_integer_is_member_access() {
        let mut interner = Interner::new();
        let file = interner.get_or_intern("");
        let tokens = tokenize("p.0", &mut interner, file).unwrap();
        assert!(matches!(tokens[1].kind, Punctuation(_)));
        assert_eq!(tokens[2].kind, IntLiteral(0));
    }

    #[test]
    fn test_hex_float_is_rejected() {
        let mut interner = Interner::new();
        let file = interner.get_or_intern("");
        let err = tokenize("0x1.5", &mut interner, file).unwrap_err();
        assert!(matches!(err, LexError::NonDecimalFloat { .. }));
    }

    #[test]
    fn test_integer_overflow_is_an_error() {
        let mut interner = Interner::new();
        let file = interner.get_or_intern("");
        let err = tokenize("99999999999999999999", &mut interner, file).unwrap_err();
        assert!(matches!(err, LexError::InvalidInteger { .. }));
    }
}
