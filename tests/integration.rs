use std::path::Path;

use lygos::compiler::{
    compile_to_object,
    config::CompileOptions,
    error::{CompileError, SymbolClass},
    run_jit,
};

fn run(source: &str) -> Result<i64, String> {
    run_jit(source, Path::new("test.ly"), &CompileOptions::default()).map_err(|e| e.to_string())
}

fn run_err(source: &str) -> CompileError {
    run_jit(source, Path::new("test.ly"), &CompileOptions::default()).unwrap_err()
}

#[test]
fn test_end_to_end_simple_arithmetic() {
    assert_eq!(run("fn main() -> i32 { return 1 + 2 * 3; }"), Ok(7));
    assert_eq!(run("fn main() -> i32 { return (10 - 4) / 2 % 2; }"), Ok(1));
}

#[test]
fn test_struct_passed_by_value() {
    let src = r#"
        struct Point { x: i32; y: i32; };
        fn sum(p: Point) -> i32 { return p.x + p.y; }
        fn main() -> i32 {
            let p: Point = { .x = 1, .y = 2 };
            return sum(p);
        }
    "#;
    assert_eq!(run(src), Ok(3));
}

#[test]
fn test_typed_initializer_as_argument() {
    let src = r#"
        struct Point { x: i32; y: i32; };
        fn sum(p: Point) -> i32 { return p.x + p.y; }
        fn main() -> i32 { return sum(Point { .x = 1, .y = 2 }); }
    "#;
    assert_eq!(run(src), Ok(3));
}

#[test]
fn test_struct_returned_by_value() {
    let src = r#"
        struct Pair { a: i64; b: i64; };
        fn make(x: i64) -> Pair {
            let p: Pair = { .a = x, .b = x * 2 };
            return p;
        }
        fn main() -> i64 {
            let q = make(20);
            return q.a + q.b;
        }
    "#;
    assert_eq!(run(src), Ok(60));
}

#[test]
fn test_loop_with_break() {
    let src = r#"
        fn main() -> i32 {
            let mut total = 0;
            for let mut i = 0 in i < 10 {
                if i == 5 { break; }
                total = total + i;
                i = i + 1;
            }
            return total;
        }
    "#;
    assert_eq!(run(src), Ok(10));
}

#[test]
fn test_nested_returns_share_an_epilogue() {
    let src = r#"
        fn sign(x: i32) -> i32 {
            if x < 0 {
                return -1;
            } else {
                if x == 0 { return 0; }
            }
            return 1;
        }
        fn main() -> i32 { return sign(-5) + sign(0) * 10 + sign(7) * 100; }
    "#;
    assert_eq!(run(src), Ok(99));
}

#[test]
fn test_short_circuit_skips_right_side() {
    let src = r#"
        static calls: i32;
        fn bump() -> bool {
            calls = calls + 1;
            return true;
        }
        fn main() -> i32 {
            let a = false && bump();
            let b = true || bump();
            if a || !b { return 100; }
            return calls;
        }
    "#;
    assert_eq!(run(src), Ok(0));
}

#[test]
fn test_static_initializer() {
    let src = r#"
        static base: i64 = 40;
        fn main() -> i64 { base = base + 2; return base; }
    "#;
    assert_eq!(run(src), Ok(42));
}

#[test]
fn test_match_on_enum_falls_through_on_missing_case() {
    let src = r#"
        enum Color : u8 { Red, Green, Blue }
        fn code(c: Color) -> i32 {
            match c {
                Color::Red -> { return 10; }
                Color::Green -> { return 20; }
            }
            return 30;
        }
        fn main() -> i32 { return code(Color::Red) + code(Color::Green) + code(Color::Blue); }
    "#;
    assert_eq!(run(src), Ok(60));
}

#[test]
fn test_match_on_integers() {
    let src = r#"
        fn main() -> i32 {
            let mut out = 0;
            for let mut i = 0 in i < 4 {
                match i {
                    0 -> { out = out + 1; }
                    2 -> { out = out + 100; }
                }
                i = i + 1;
            }
            return out;
        }
    "#;
    assert_eq!(run(src), Ok(101));
}

#[test]
fn test_macros_single_and_variadic() {
    let src = r#"
        macro sq { (x: $) -> { $x * $x } }
        macro total { (xs: []) -> { add3($xs) } }
        fn add3(a: i32, b: i32, c: i32) -> i32 { return a + b + c; }
        fn main() -> i32 { return sq$(3) + total$(1, 2, 3); }
    "#;
    assert_eq!(run(src), Ok(15));
}

#[test]
fn test_statement_macro_declares_function() {
    let src = r#"
        macro getter { (name: $, v: $) -> { fn get_ ## $name() -> i32 { return $v; } } }
        getter$(answer, 42);
        fn main() -> i32 { return get_answer(); }
    "#;
    assert_eq!(run(src), Ok(42));
}

#[test]
fn test_methods_take_receiver_by_reference() {
    let src = r#"
        struct Counter { n: i32; };
        impl Counter {
            fn add(&mut self, k: i32) { self.n = self.n + k; }
            fn get(&self) -> i32 { return self.n; }
        }
        fn main() -> i32 {
            let mut c: Counter = { .n = 1 };
            c.add(4);
            c.add(5);
            return c.get();
        }
    "#;
    assert_eq!(run(src), Ok(10));
}

#[test]
fn test_trait_implementation() {
    let src = r#"
        trait Show { fn show(&self) -> i32; }
        struct P { x: i32; };
        impl Show for P { fn show(&self) -> i32 { return self.x; } }
        fn main() -> i32 {
            let p: P = { .x = 7 };
            return p.show();
        }
    "#;
    assert_eq!(run(src), Ok(7));
}

#[test]
fn test_arrays_and_pointer_indexing() {
    let src = r#"
        fn main() -> i32 {
            let mut arr: [i32; 4] = { 1, 2, 3, 4 };
            let p: *i32 = (:*i32) arr;
            let mut total = 0;
            for let mut i = 0 in i < 4 {
                total = total + arr[i] * p[i];
                i = i + 1;
            }
            return total;
        }
    "#;
    assert_eq!(run(src), Ok(30));
}

#[test]
fn test_pointer_arithmetic_scales_by_pointee() {
    let src = r#"
        fn main() -> i64 {
            let arr: [i64; 3] = { 5, 6, 7 };
            let p: *i64 = (:*i64) arr;
            let q = p + 2;
            return *q;
        }
    "#;
    assert_eq!(run(src), Ok(7));
}

#[test]
fn test_address_of_and_deref() {
    let src = r#"
        fn set(p: *mut i32, v: i32) { *p = v; }
        fn main() -> i32 {
            let mut x = 1;
            set(&x, 41);
            let q = &x;
            return *q + 1;
        }
    "#;
    assert_eq!(run(src), Ok(42));
}

#[test]
fn test_function_pointer_call() {
    let src = r#"
        fn twice(x: i32) -> i32 { return x * 2; }
        fn apply(f: fn(i32) -> i32, v: i32) -> i32 { return f(v); }
        fn main() -> i32 { return apply(&twice, 21); }
    "#;
    assert_eq!(run(src), Ok(42));
}

#[test]
fn test_generic_struct_variants() {
    let src = r#"
        struct Box<T> { v: T; };
        fn main() -> i64 {
            let a: Box<i64> = { .v = 40 };
            let b: Box<u8> = { .v = 2 };
            return a.v + (:i64) b.v;
        }
    "#;
    assert_eq!(run(src), Ok(42));
}

#[test]
fn test_float_casts_truncate() {
    let src = "fn main() -> i32 { let f = 3.75; return (:i32) f + (:i32) 2.5; }";
    assert_eq!(run(src), Ok(5));
}

#[test]
fn test_shadowing_in_nested_block() {
    let src = r#"
        fn main() -> i32 {
            let x = 1;
            {
                let x = 10;
                x = x + 1;
            }
            return x;
        }
    "#;
    assert_eq!(run(src), Ok(1));
}

#[test]
fn test_void_main_returns_zero() {
    assert_eq!(run("fn main() { let x = 1; }"), Ok(0));
}

#[test]
fn test_type_alias_and_sizeof() {
    let src = r#"
        type Byte = u8;
        struct S { a: Byte; b: i64; };
        fn main() -> i64 { return (:i64) sizeof(S); }
    "#;
    assert_eq!(run(src), Ok(16));
}

#[test]
fn test_include_resolves_next_to_the_source_and_only_once() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("lib.ly"), "fn helper() -> i32 { return 40; }").unwrap();
    let src = "#include \"lib.ly\"\n#include \"lib.ly\"\nfn main() -> i32 { return helper() + 2; }";
    let result = run_jit(src, &dir.path().join("main.ly"), &CompileOptions::default());
    assert_eq!(result.map_err(|e| e.to_string()), Ok(42));
}

#[test]
fn test_include_dir_is_searched() {
    let dir = tempfile::tempdir().unwrap();
    let inc = dir.path().join("inc");
    std::fs::create_dir(&inc).unwrap();
    std::fs::write(inc.join("consts.ly"), "fn seven() -> i32 { return 7; }").unwrap();
    let options = CompileOptions {
        include_dirs: vec![inc],
        ..CompileOptions::default()
    };
    let src = "#include \"consts.ly\"\nfn main() -> i32 { return seven(); }";
    let result = run_jit(src, &dir.path().join("main.ly"), &options);
    assert_eq!(result.map_err(|e| e.to_string()), Ok(7));
}

#[test]
fn test_external_prototype_resolves_from_host() {
    let src = r#"
        fn labs(x: i64) -> i64;
        fn main() -> i64 { return labs(-5); }
    "#;
    assert_eq!(run(src), Ok(5));
}

#[test]
fn test_object_output_with_ir() {
    let options = CompileOptions {
        emit_ir: true,
        ..CompileOptions::default()
    };
    let out = compile_to_object(
        "fn add(a: i32, b: i32) -> i32 { return a + b; }",
        Path::new("obj.ly"),
        &options,
    )
    .unwrap();
    assert!(!out.bytes.is_empty());
    let ir = out.ir.unwrap();
    assert!(ir.contains("; fn add(a: i32, b: i32) -> i32 {"), "{ir}");
    assert!(ir.contains("iadd"), "{ir}");
}

#[test]
fn test_unresolved_variable() {
    let err = run_err("fn main() -> i32 { return y; }");
    assert!(
        matches!(
            err,
            CompileError::UnresolvedSymbol {
                class: SymbolClass::Variable,
                ..
            }
        ),
        "{err:?}"
    );
}

#[test]
fn test_redeclaration_in_same_scope() {
    let err = run_err("fn main() -> i32 { let x = 1; let x = 2; return x; }");
    assert!(matches!(err, CompileError::DuplicateDeclaration { .. }), "{err:?}");
}

#[test]
fn test_break_outside_loop() {
    let err = run_err("fn main() -> i32 { break; return 0; }");
    assert!(matches!(err, CompileError::Malformed { .. }), "{err:?}");
}

#[test]
fn test_invalid_cast() {
    let err = run_err("struct P { x: i32; }; fn main() -> i32 { let p: P = { .x = 1 }; return (:i32) p; }");
    assert!(matches!(err, CompileError::InvalidCast { .. }), "{err:?}");
}

#[test]
fn test_call_arity_mismatch() {
    let err = run_err("fn f(a: i32) -> i32 { return a; } fn main() -> i32 { return f(1, 2); }");
    assert!(
        matches!(
            err,
            CompileError::ArityMismatch {
                expected: 1,
                found: 2,
                ..
            }
        ),
        "{err:?}"
    );
}

#[test]
fn test_trait_method_missing() {
    let src = r#"
        trait Show { fn show(&self) -> i32; }
        struct P { x: i32; };
        impl Show for P { }
        fn main() -> i32 { return 0; }
    "#;
    let err = run_err(src);
    assert!(
        matches!(
            err,
            CompileError::UnresolvedSymbol {
                class: SymbolClass::Method,
                ..
            }
        ),
        "{err:?}"
    );
}

#[test]
fn test_runaway_macro_recursion() {
    let err = run_err("macro r { (x: $) -> { r$($x) } } fn main() -> i32 { return r$(1); }");
    assert!(matches!(err, CompileError::MalformedMacroInvocation { .. }), "{err:?}");
}

#[test]
fn test_missing_main() {
    let err = run_err("fn helper() -> i32 { return 1; }");
    assert!(matches!(err, CompileError::Malformed { .. }), "{err:?}");
}

#[test]
fn test_nested_function_cannot_see_enclosing_locals() {
    let src = r#"
        fn main() -> i32 {
            let x = 5;
            fn inner() -> i32 { return x; }
            return inner();
        }
    "#;
    let err = run_err(src);
    assert!(
        matches!(
            err,
            CompileError::UnresolvedSymbol {
                class: SymbolClass::Variable,
                ..
            }
        ),
        "{err:?}"
    );
}

#[test]
fn test_nested_function_sees_statics() {
    let src = r#"
        static base: i32 = 40;
        fn main() -> i32 {
            fn inner() -> i32 { return base + 2; }
            return inner();
        }
    "#;
    assert_eq!(run(src), Ok(42));
}

#[test]
fn test_same_named_nested_functions_in_different_functions() {
    let src = r#"
        fn a() -> i32 { fn h() -> i32 { return 1; } return h(); }
        fn b() -> i32 { fn h() -> i32 { return 2; } return h(); }
        fn main() -> i32 { return a() * 10 + b(); }
    "#;
    assert_eq!(run(src), Ok(12));
}

#[test]
fn test_sizeof_oversized_array_is_an_error() {
    let err = run_err("fn main() -> i64 { return (:i64) sizeof([i64; 1000000000]); }");
    assert!(matches!(&err, CompileError::Malformed { what, .. } if what == "type is too large"));
}

#[test]
fn test_initializer_assignment_evaluates_target_once() {
    let src = r#"
        struct P { x: i32; y: i32; };
        static calls: i32;
        fn bump(p: *mut P) -> *mut P { calls = calls + 1; return p; }
        fn main() -> i32 {
            let mut p: P = P { .x = 0, .y = 0 };
            *bump(&p) = { .x = 1, .y = 2 };
            return calls * 100 + p.x * 10 + p.y;
        }
    "#;
    assert_eq!(run(src), Ok(112));
}
