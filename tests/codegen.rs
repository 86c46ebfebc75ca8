use std::path::Path;

use lygos::compiler::{
    build, compile_to_object,
    config::{CompileOptions, OptLevel},
    error::CompileError,
};

const PROGRAM: &str = r#"
struct Pair { a: i64; b: i64; };
static greeting: *u8;

fn swap(p: Pair) -> Pair {
    let out: Pair = { .a = p.b, .b = p.a };
    return out;
}

fn main() -> i32 {
    greeting = "hello";
    let p: Pair = { 1, 2 };
    let q = swap(p);
    return (:i32) (q.a - q.b);
}
"#;

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[test]
fn test_object_exports_defined_symbols() {
    let out = compile_to_object(PROGRAM, Path::new("pair.ly"), &CompileOptions::default()).unwrap();
    assert!(out.ir.is_none());
    assert!(contains(&out.bytes, b"swap"));
    assert!(contains(&out.bytes, b"greeting"));
    assert!(contains(&out.bytes, b"hello\0"));
}

#[test]
fn test_every_opt_level_compiles() {
    for opt_level in [OptLevel::None, OptLevel::Speed, OptLevel::SpeedAndSize] {
        let options = CompileOptions {
            opt_level,
            ..CompileOptions::default()
        };
        let out = compile_to_object(PROGRAM, Path::new("pair.ly"), &options);
        assert!(out.is_ok(), "{opt_level:?}: {:?}", out.err());
    }
}

#[test]
fn test_build_writes_object_and_ir() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("pair.ly");
    std::fs::write(&src, PROGRAM).unwrap();
    let options = CompileOptions {
        emit_ir: true,
        ..CompileOptions::default()
    };

    let object = build(&src, None, &options).unwrap();
    assert_eq!(object, dir.path().join("pair.o"));
    assert!(std::fs::metadata(&object).unwrap().len() > 0);

    let ir = std::fs::read_to_string(dir.path().join("pair.clif")).unwrap();
    assert!(ir.contains("; fn swap(p: Pair) -> Pair {"), "{ir}");
    assert!(ir.contains("function"), "{ir}");
}

#[test]
fn test_build_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = build(&dir.path().join("nope.ly"), None, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::Io { .. }), "{err:?}");
}

#[test]
fn test_unknown_type_in_signature() {
    let err = compile_to_object(
        "fn f(x: Widget) -> i32 { return 0; }",
        Path::new("t.ly"),
        &CompileOptions::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, CompileError::UnknownType { .. }), "{err:?}");
}

/// Number of block labels in the IR of `function`.
fn block_labels(ir: &str, function: &str) -> usize {
    let header = format!("; {function}");
    ir.lines()
        .skip_while(|l| *l != header)
        .skip(1)
        .take_while(|l| *l != "}")
        .filter(|l| l.starts_with("block"))
        .count()
}

fn ir_of(source: &str) -> String {
    let options = CompileOptions {
        emit_ir: true,
        ..CompileOptions::default()
    };
    compile_to_object(source, Path::new("blocks.ly"), &options)
        .unwrap()
        .ir
        .unwrap()
}

#[test]
fn test_if_without_else_emits_entry_then_and_merge() {
    let ir = ir_of("fn f(a: i32) -> i32 { let mut r = 0; if a > 0 { r = 1; } return r; }");
    assert_eq!(block_labels(&ir, "f"), 3, "{ir}");
}

#[test]
fn test_unreachable_merge_block_is_not_emitted() {
    // entry, then, else and the shared return block; the merge has no predecessors
    let ir = ir_of("fn g(a: i32) -> i32 { if a > 0 { return 1; } else { return 2; } }");
    assert_eq!(block_labels(&ir, "g"), 4, "{ir}");
}
