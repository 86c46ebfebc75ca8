use lygos::compiler::{
    Interner, lexer,
    parser::{Parser, ParseError, display::render_node, node::Ast},
};
use pretty_assertions::assert_eq;

fn parse_source(source: &str) -> Result<String, String> {
    let mut interner = Interner::new();
    let file = interner.get_or_intern("test.ly");
    let tokens = lexer::tokenize(source, &mut interner, file).map_err(|e| e.to_string())?;
    let mut ast = Ast::new();
    let root = Parser::new(tokens, &mut ast, &mut interner)
        .parse_module()
        .map_err(|e| e.to_string())?;
    Ok(render_node(&ast, &interner, root))
}

fn parse_error(source: &str) -> ParseError {
    let mut interner = Interner::new();
    let file = interner.get_or_intern("test.ly");
    let tokens = lexer::tokenize(source, &mut interner, file).unwrap();
    let mut ast = Ast::new();
    Parser::new(tokens, &mut ast, &mut interner).parse_module().unwrap_err()
}

#[test]
fn test_parse_simple_arithmetic() {
    let out = parse_source("fn add(a: i32, b: i32) -> i32 { return a + b * 2; }").unwrap();
    assert_eq!(out, "fn add(a: i32, b: i32) -> i32 {\n    return (a + (b * 2));\n}");
}

#[test]
fn test_parse_precedence_and_associativity() {
    let out = parse_source("fn f() { x = a - b - c == d && !e || f; }").unwrap();
    insta::assert_snapshot!(out, @r"
    fn f() -> void {
        x = (((((a - b) - c) == d) && !e) || f);
    }
    ");
}

#[test]
fn test_parse_struct_enum_alias_static() {
    let out = parse_source(
        "struct P<T> { x: T; next: *P<T>; }; enum E : u8 { A, B } type Byte = u8; static n: i32 = 4;",
    )
    .unwrap();
    assert_eq!(
        out,
        "struct P<T> {\n    x: T;\n    next: *P<T>;\n};\nenum E : u8 { A, B };\ntype Byte = u8;\nstatic n: i32 = 4;"
    );
}

#[test]
fn test_parse_for_and_match() {
    let out = parse_source(
        "fn f(c: i32) { for let mut i = 0 in i < 3 { i = i + 1; } match c { 1 -> { return; } } }",
    )
    .unwrap();
    assert_eq!(
        out,
        "fn f(c: i32) -> void {\n    for let mut i = 0 in (i < 3) {\n        i = (i + 1);\n    }\n    match c {\n        1 -> {\n            return;\n        }\n    }\n}"
    );
}

#[test]
fn test_parse_casts_members_and_calls() {
    let out = parse_source("fn f(p: *P) -> i64 { return (:i64) p->x + g(arr[1], &y).z; }").unwrap();
    assert_eq!(out, "fn f(p: *P) -> i64 {\n    return ((:i64) p->x + g(arr[1], &y).z);\n}");
}

#[test]
fn test_parse_macro_definition_and_call() {
    let out = parse_source("macro sq { (x: $) -> { $x * $x } } fn f() -> i32 { return sq$(1 + 2); }").unwrap();
    assert_eq!(
        out,
        "macro sq {\n    (x: $) -> { $x * $x }\n}\nfn f() -> i32 {\n    return sq$(1 + 2);\n}"
    );
}

#[test]
fn test_parse_error_reports_position() {
    let err = parse_error("fn main() -> i32 {\n    let = 3;\n}");
    assert_eq!(err.span().start.0, 2, "{err}");
}
