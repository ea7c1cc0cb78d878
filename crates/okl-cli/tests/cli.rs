//! End-to-end tests of the `okl` binary

use assert_cmd::Command;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

const KERNEL: &str = r#"
@kernel void scale(const int N, float *x @restrict, const float alpha) {
  for (int b = 0; b < N; b += 32; @outer) {
    for (int i = b; i < b + 32; ++i; @inner) {
      if (i < N) {
        x[i] *= alpha;
      }
    }
  }
}
"#;

fn okl() -> Command {
    Command::cargo_bin("okl").unwrap()
}

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("scale.okl"), KERNEL).unwrap();
    dir
}

#[test]
fn help_and_version() {
    okl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("transpile"));
    okl()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn transpile_to_stdout() {
    let dir = workspace();
    okl()
        .current_dir(dir.path())
        .args(["transpile", "scale.okl", "--backend", "cuda"])
        .assert()
        .success()
        .stdout(predicate::str::contains("_occa_scale_0"))
        .stdout(predicate::str::contains("blockIdx.x"));
}

#[test]
fn transpile_writes_output_and_metadata() {
    let dir = workspace();
    let out = dir.path().join("build/scale.cpp");
    let meta = dir.path().join("scale.json");
    okl()
        .current_dir(dir.path())
        .args(["transpile", "scale.okl", "-b", "openmp", "-o"])
        .arg(&out)
        .arg("--metadata")
        .arg(&meta)
        .assert()
        .success();

    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains("#pragma omp parallel for"));
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&meta).unwrap()).unwrap();
    assert_eq!(json["backend"], "openmp");
    assert_eq!(json["kernels"][0]["name"], "scale");
    assert_eq!(json["kernels"][0]["args"].as_array().map(Vec::len), Some(3));
}

#[test]
fn config_file_selects_the_backend() {
    let dir = workspace();
    fs::write(dir.path().join("okl.toml"), "[pipeline]\nbackend = \"hip\"\n").unwrap();
    okl()
        .current_dir(dir.path())
        .args(["transpile", "scale.okl"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hipBlockIdx_x"));

    okl()
        .current_dir(dir.path())
        .args(["transpile", "scale.okl", "--backend", "dpcpp"])
        .assert()
        .success()
        .stdout(predicate::str::contains("item_.get_group(2)"));
}

#[test]
fn normalize_prints_standard_attributes() {
    let dir = workspace();
    okl()
        .current_dir(dir.path())
        .args(["normalize", "scale.okl"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"[[okl_kernel("")]] void scale("#))
        .stdout(predicate::str::contains("@").not());
}

#[test]
fn backends_lists_all_targets() {
    okl()
        .arg("backends")
        .assert()
        .success()
        .stdout(predicate::str::contains("* serial"))
        .stdout(predicate::str::contains("dpcpp"));
}

#[test]
fn argument_errors() {
    okl().assert().failure();
    okl()
        .args(["transpile", "scale.okl", "--backend", "metal"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("metal"));
    okl()
        .args(["transpile", "--log", "loud", "scale.okl"])
        .assert()
        .failure();
}

#[test]
fn missing_input_fails() {
    let dir = TempDir::new().unwrap();
    okl()
        .current_dir(dir.path())
        .args(["transpile", "nope.okl"])
        .assert()
        .failure();
}

#[test]
fn transpiler_errors_fail_with_the_stage_name() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("bad.okl"),
        "@kernel void k(int N) {\n  for (int i = 0; i < N; ++i; @inner) {\n    for (int j = 0; j < N; ++j; @outer) {}\n  }\n}\n",
    )
    .unwrap();
    okl()
        .current_dir(dir.path())
        .args(["transpile", "bad.okl", "--backend", "cuda"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[transpile]"))
        .stderr(predicate::str::contains("LOOP_NESTING"));
}
