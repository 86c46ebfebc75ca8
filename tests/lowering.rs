use std::path::Path;

use lygos::compiler::{
    config::CompileOptions,
    error::{CompileError, CompilerPhase, SymbolClass},
    front_end,
};

fn lower(source: &str) -> Result<String, CompileError> {
    front_end(source, Path::new("test.ly"), &CompileOptions::default()).map(|f| f.render())
}

#[test]
fn test_expression_macro_substitutes_tokens_verbatim() {
    let out = lower("macro sq { (x: $) -> { $x * $x } } fn f() -> i32 { return sq$(2 + 1); }").unwrap();
    assert!(out.contains("return ((2 + (1 * 2)) + 1);"), "{out}");
    assert!(!out.contains("sq$("), "{out}");
}

#[test]
fn test_arm_is_selected_by_argument_count() {
    let src = r#"
        macro pick { (a: $) -> { $a } (a: $, b: $) -> { $a + $b } }
        fn f() -> i32 { return pick$(1) * pick$(2, 3); }
    "#;
    let out = lower(src).unwrap();
    assert!(out.contains("return (1 * (2 + 3));"), "{out}");
}

#[test]
fn test_unknown_macro() {
    let err = lower("fn f() -> i32 { return nope$(1); }").unwrap_err();
    assert!(
        matches!(
            err,
            CompileError::UnresolvedSymbol {
                class: SymbolClass::Macro,
                ..
            }
        ),
        "{err:?}"
    );
}

#[test]
fn test_statement_outside_function_is_rejected() {
    let err = lower("let x = 1;").unwrap_err();
    assert!(matches!(err, CompileError::Malformed { .. }), "{err:?}");
    assert_eq!(err.phase(), CompilerPhase::Validation);
}

#[test]
fn test_duplicate_struct_field() {
    let err = lower("struct P { x: i32; x: i64; };").unwrap_err();
    assert!(
        matches!(
            err,
            CompileError::DuplicateDeclaration {
                class: SymbolClass::Field,
                ..
            }
        ),
        "{err:?}"
    );
}

#[test]
fn test_missing_include_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("main.ly");
    let err = front_end("#include \"absent.ly\"", &main, &CompileOptions::default())
        .err()
        .unwrap();
    assert!(matches!(err, CompileError::Io { .. }), "{err:?}");
}

#[test]
fn test_included_functions_are_registered() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.ly"), "fn from_a() -> i32 { return 1; }").unwrap();
    let main = dir.path().join("main.ly");
    let frontend = front_end(
        "#include \"a.ly\"\nfn main() -> i32 { return from_a(); }",
        &main,
        &CompileOptions::default(),
    )
    .unwrap();
    assert_eq!(frontend.lowered.functions.len(), 2);
}

#[test]
fn test_initializer_in_conditionally_evaluated_position_is_rejected() {
    let prelude = "struct P { x: i32; }; fn pos(p: P) -> bool { return p.x > 0; }";

    let err = lower(&format!("{prelude} fn f(a: bool) -> bool {{ return a && pos(P {{ .x = 1 }}); }}")).unwrap_err();
    assert!(matches!(&err, CompileError::Malformed { what, .. } if what.contains("`&&` or `||`")), "{err:?}");

    let err = lower(&format!("{prelude} fn f() {{ for let mut i = 0 in pos({{ i }}) {{ i = i - 1; }} }}")).unwrap_err();
    assert!(matches!(&err, CompileError::Malformed { what, .. } if what.contains("loop condition")), "{err:?}");

    // evaluated exactly once, so hoisting is fine
    let out = lower(&format!("{prelude} fn f(a: bool) -> bool {{ return pos(P {{ .x = 1 }}) && a; }}")).unwrap();
    assert!(out.contains("__init0.x = 1;"), "{out}");
}
