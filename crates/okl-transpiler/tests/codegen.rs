//! Generated code over standard-spelled input, for every backend.

use okl_core::syntax::parse;
use okl_core::{ErrorCode, TargetBackend};
use okl_transpiler::{transpile_unit, SessionStage, TranspilerSession};
use pretty_assertions::assert_eq;

fn generate(source: &str, backend: TargetBackend) -> Result<String, Vec<okl_core::Error>> {
    let tu = parse(source).expect("parse");
    let mut session = TranspilerSession::new(backend);
    let mut stage = SessionStage::new(&mut session, source);
    transpile_unit(&mut stage, &tu)
}

fn brace_balance(text: &str) -> i64 {
    text.chars().fold(0, |depth, c| match c {
        '{' => depth + 1,
        '}' => depth - 1,
        _ => depth,
    })
}

const HEADERS: [&str; 5] = [
    "int i = 0; i < N; ++i",
    "int i = 0; i < N; i++",
    "int i = 0; i <= N; i += 2",
    "int i = N; i > 0; --i",
    "int i = N; i >= 0; i -= 3",
];

const SUB_LOOPS: [&str; 4] = ["", ", @outer", ", @outer, @inner", ", @inner"];

#[test]
fn tiles_keep_braces_balanced() {
    for backend in TargetBackend::all() {
        for header in HEADERS {
            for sub_loops in SUB_LOOPS {
                for check in ["true", "false"] {
                    let source = format!(
                        "void f(int N) {{ [[okl_tile(\"(16{sub_loops}, check={check})\")]] for ({header}) {{ body(i); }} }}"
                    );
                    let out = generate(&source, backend)
                        .unwrap_or_else(|errors| panic!("{backend} {source}: {errors:?}"));
                    assert_eq!(brace_balance(&out), 0, "{backend}: {out}");
                    assert!(out.contains("body(i);"), "{out}");
                    assert!(!out.contains("okl_tile"), "{out}");
                    assert_eq!(out.contains("if (i "), check == "true", "{out}");
                }
            }
        }
    }
}

#[test]
fn tile_keeps_comparison_and_direction() {
    let out = generate(
        "void f(int N) { [[okl_tile(\"(4)\")]] for (int i = N; i >= 0; i -= 3) { body(i); } }",
        TargetBackend::Serial,
    )
    .expect("generate");
    assert!(out.contains("_occa_tiled_i >= 0; _occa_tiled_i -= (4)"), "{out}");
    assert!(out.contains("i > (_occa_tiled_i - (4))"), "{out}");
    assert!(out.contains("if (i >= 0)"), "{out}");
}

#[test]
fn tile_with_axis_loops_on_cuda() {
    let out = generate(
        "void f(int N) { [[okl_tile(\"(16, @outer, @inner, check=false)\")]] for (int i = 0; i < N; ++i) { body(i); } }",
        TargetBackend::Cuda,
    )
    .expect("generate");
    assert_eq!(
        out,
        "void f(int N) { \
         {int _occa_tiled_i = (0) + ((16) * blockIdx.x);\
         {int i = _occa_tiled_i + threadIdx.x;\
         { body(i); }}} }"
    );
}

#[test]
fn unregistered_exclusive_is_soft_on_host_backends() {
    let source = "void f() { [[okl_exclusive(\"\")]] int x = 0; }";
    for backend in [TargetBackend::Serial, TargetBackend::OpenMp] {
        let tu = parse(source).expect("parse");
        let mut session = TranspilerSession::new(backend);
        let out = {
            let mut stage = SessionStage::new(&mut session, source);
            transpile_unit(&mut stage, &tu).expect("soft error only")
        };
        assert_eq!(out, source);
        let diagnostics = session.take_diagnostics();
        assert_eq!(diagnostics.len(), 1, "{backend}");
        assert_eq!(
            diagnostics[0].code.as_deref(),
            Some(ErrorCode::NoHandler.to_string().as_str())
        );
    }
}

#[test]
fn global_declarations_on_cuda() {
    let source = "const int BS = 16;\nfloat helper(float x) { return x * 2; }\n";
    let out = generate(source, TargetBackend::Cuda).expect("generate");
    assert_eq!(
        out,
        "__constant__ const int BS = 16;\n__device__ float helper(float x) { return x * 2; }\n"
    );
}

#[test]
fn invalid_loop_headers_are_errors() {
    let errors = generate(
        "void f(int N) { [[okl_outer(\"\")]] for (int i = 0; i != N; ++i) {} }",
        TargetBackend::Cuda,
    )
    .expect_err("!= is not a supported bound");
    assert_eq!(errors[0].code, ErrorCode::InvalidLoop);
}
