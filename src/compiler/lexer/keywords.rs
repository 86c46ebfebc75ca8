use crate::compiler::tokens::{Keyword, TokenKind};

use super::{IdentChar, Lexer};

pub fn keyword(word: &str) -> Option<Keyword> {
    use Keyword::*;
    Some(match word {
        "fn" => Fn,
        "let" => Let,
        "mut" => Mut,
        "return" => Return,
        "break" => Break,
        "if" => If,
        "else" => Else,
        "for" => For,
        "in" => In,
        "match" => Match,
        "struct" => Struct,
        "enum" => Enum,
        "impl" => Impl,
        "trait" => Trait,
        "macro" => Macro,
        "static" => Static,
        "type" => Type,
        "sizeof" => SizeOf,
        "self" => SelfValue,
        "Self" => SelfType,
        _ => return None,
    })
}

impl Lexer<'_> {
    /// Identifiers, keywords and the `true`/`false` literals.
    pub fn lex_word(&mut self) {
        let start = self.cursor;
        let mut word = String::new();
        while let Some(c) = self.peek(0) {
            if !c.is_valid_ident_char() {
                break;
            }
            word.push(c);
            self.bump();
        }

        let kind = match word.as_str() {
            "true" => TokenKind::BoolLiteral(true),
            "false" => TokenKind::BoolLiteral(false),
            _ => match keyword(&word) {
                Some(kw) => TokenKind::Keyword(kw),
                None => TokenKind::Identifier(self.interner.get_or_intern(&word)),
            },
        };
        self.push(kind, start);
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::Interner;
    use crate::compiler::lexer::tokenize;
    use crate::compiler::tokens::Keyword::*;
    use crate::compiler::tokens::TokenKind;

    #[test]
    fn test_lex_keywords() {
        let mut interner = Interner::new();
        let file = interner.get_or_intern("");
        let contents = "fn let mut return break if else for in match struct enum impl trait macro static type sizeof self Self";
        let tokens = tokenize(contents, &mut interner, file).unwrap();

        let expected = [
            Fn, Let, Mut, Return, Break, If, Else, For, In, Match, Struct, Enum, Impl, Trait, Macro, Static, Type,
            SizeOf, SelfValue, SelfType,
        ];
        let kinds = tokens.iter().map(|t| t.kind).collect::<Vec<_>>();
        assert_eq!(kinds.len(), expected.len() + 1);
        for (kind, kw) in kinds.iter().zip(expected) {
            assert_eq!(*kind, TokenKind::Keyword(kw));
        }
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        let mut interner = Interner::new();
        let file = interner.get_or_intern("");
        let tokens = tokenize("fnord letter selfish true_ false", &mut interner, file).unwrap();

        let names = tokens
            .iter()
            .filter_map(|t| match t.kind {
                TokenKind::Identifier(sym) => interner.resolve(sym).map(str::to_string),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["fnord", "letter", "selfish", "true_"]);
        assert_eq!(tokens[4].kind, TokenKind::BoolLiteral(false));
    }
}
