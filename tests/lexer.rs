use lygos::compiler::{
    Interner,
    lexer::{self, LexError},
    tokens::{Keyword, Punctuation, TokenKind},
};

fn lex(source: &str) -> Result<(Vec<TokenKind>, Interner), LexError> {
    let mut interner = Interner::new();
    let file = interner.get_or_intern("test.ly");
    let tokens = lexer::tokenize(source, &mut interner, file)?;
    Ok((tokens.into_iter().map(|t| t.kind).collect(), interner))
}

#[test]
fn test_lexer_declaration() {
    let (kinds, interner) = lex("let mut x: i64 = 0x1F + 2.5; // trailing").unwrap();
    let x = interner.get("x").unwrap();
    let i64_ = interner.get("i64").unwrap();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Keyword(Keyword::Let),
            TokenKind::Keyword(Keyword::Mut),
            TokenKind::Identifier(x),
            TokenKind::Punctuation(Punctuation::Colon),
            TokenKind::Identifier(i64_),
            TokenKind::Punctuation(Punctuation::Eq),
            TokenKind::IntLiteral(31),
            TokenKind::Punctuation(Punctuation::Plus),
            TokenKind::FloatLiteral(2.5),
            TokenKind::Punctuation(Punctuation::Semicolon),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_lexer_macro_punctuation() {
    let (kinds, _) = lex("#include get_ ## $name -> :: && ||").unwrap();
    let puncts: Vec<_> = kinds
        .iter()
        .filter_map(|k| match k {
            TokenKind::Punctuation(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert_eq!(
        puncts,
        vec![
            Punctuation::Hash,
            Punctuation::HashHash,
            Punctuation::Dollar,
            Punctuation::Arrow,
            Punctuation::ColonColon,
            Punctuation::AmpAmp,
            Punctuation::PipePipe,
        ]
    );
}

#[test]
fn test_lexer_string_and_char_escapes() {
    let (kinds, interner) = lex(r#""a\tb\n" '\0' true"#).unwrap();
    let TokenKind::StringLiteral(s) = kinds[0] else {
        panic!("expected a string, got {:?}", kinds[0]);
    };
    assert_eq!(interner.resolve(s), Some("a\tb\n"));
    assert_eq!(kinds[1], TokenKind::CharLiteral(0));
    assert_eq!(kinds[2], TokenKind::BoolLiteral(true));
}

#[test]
fn test_lexer_spans_are_line_and_column() {
    let mut interner = Interner::new();
    let file = interner.get_or_intern("test.ly");
    let tokens = lexer::tokenize("fn\n  main", &mut interner, file).unwrap();
    assert_eq!(tokens[0].span.start, (1, 1));
    assert_eq!(tokens[0].span.end, (1, 2));
    assert_eq!(tokens[1].span.start, (2, 3));
    assert_eq!(tokens[1].span.end, (2, 6));
}

#[test]
fn test_lexer_rejects_unknown_character() {
    let err = lex("let x = 1 @ 2;").unwrap_err();
    assert!(matches!(err, LexError::UnexpectedCharacter { character: '@', .. }), "{err:?}");
    assert_eq!(err.span().start, (1, 11));
}

#[test]
fn test_lexer_unterminated_string() {
    let err = lex("\"never closed").unwrap_err();
    assert!(matches!(err, LexError::UnterminatedString { .. }), "{err:?}");
}
