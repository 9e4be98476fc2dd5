// Integration tests: drive the `hlir` binary on serialized modules.
//
// Modules are built through the library, written as JSON under the target
// tmpdir, and passed to each subcommand. Exit codes: 0 success / equal,
// 1 different, 2 error.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use hlir::instruction::Instruction;
use hlir::module::Module;
use hlir::opcode::Opcode;
use hlir::shape::{ElementType, Shape};

fn hlir_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_hlir"))
}

fn tmp_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_TARGET_TMPDIR")).join(format!("cli_{}.json", name))
}

fn write_module(name: &str, module: &Module) -> PathBuf {
    let path = tmp_path(name);
    std::fs::write(&path, module.to_json().unwrap())
        .unwrap_or_else(|e| panic!("cannot write {}: {}", path.display(), e));
    path
}

fn run(args: &[&str]) -> Output {
    Command::new(hlir_binary())
        .args(args)
        .output()
        .expect("failed to run hlir")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn f32s(dims: &[i64]) -> Shape {
    Shape::array(ElementType::F32, dims)
}

fn elementwise(name: &str, opcode: Opcode) -> Module {
    let mut m = Module::new(name);
    let c = m.add_computation(format!("{}_main", name));
    let a = m
        .add_instruction(c, Instruction::parameter(f32s(&[4]), 0).unwrap())
        .unwrap();
    let b = m
        .add_instruction(c, Instruction::parameter(f32s(&[4]), 1).unwrap())
        .unwrap();
    m.add_with(c, |m| Instruction::binary(m, opcode, f32s(&[4]), a, b))
        .unwrap();
    m
}

fn with_channel(name: &str, complete: bool) -> Module {
    let mut m = Module::new(name);
    let c = m.add_computation("main");
    let p = m
        .add_instruction(c, Instruction::parameter(f32s(&[4]), 0).unwrap())
        .unwrap();
    let send = m.add_with(c, |m| Instruction::send(m, p, 7)).unwrap();
    if complete {
        m.add_with(c, |m| Instruction::send_done(m, send)).unwrap();
    }
    m
}

#[test]
fn print_default_and_canonical() {
    let path = write_module("print", &elementwise("print", Opcode::Add));
    let file = path.to_str().unwrap();

    let out = run(&["print", file]);
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.starts_with("HloModule print\n"), "{}", text);
    assert!(text.contains("ROOT %add.2 = f32[4] add(f32[4] %parameter.0, f32[4] %parameter.1)"));

    let out = run(&["print", file, "--canonical"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("ROOT %tmp_2 = f32[4] add(%tmp_0, %tmp_1)"));
}

#[test]
fn fingerprint_ignores_names() {
    let a = write_module("fp_a", &elementwise("first", Opcode::Add));
    let b = write_module("fp_b", &elementwise("second", Opcode::Add));
    let out_a = run(&["fingerprint", a.to_str().unwrap()]);
    let out_b = run(&["fingerprint", b.to_str().unwrap()]);
    assert!(out_a.status.success());
    assert_eq!(stdout(&out_a).trim().len(), 64);
    assert_eq!(stdout(&out_a), stdout(&out_b));
}

#[test]
fn compare_exit_codes() {
    let a = write_module("cmp_a", &elementwise("a", Opcode::Add));
    let b = write_module("cmp_b", &elementwise("b", Opcode::Add));
    let c = write_module("cmp_c", &elementwise("c", Opcode::Multiply));

    let same = run(&["compare", a.to_str().unwrap(), b.to_str().unwrap()]);
    assert_eq!(same.status.code(), Some(0));
    assert_eq!(stdout(&same).trim(), "equal");

    let different = run(&["compare", a.to_str().unwrap(), c.to_str().unwrap()]);
    assert_eq!(different.status.code(), Some(1));
    assert_eq!(stdout(&different).trim(), "different");
}

#[test]
fn verify_checks_channel_pairing() {
    let good = write_module("verify_good", &with_channel("good", true));
    let out = run(&["verify", good.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(stdout(&out).trim(), "ok: 1 channels");

    let bad = write_module("verify_bad", &with_channel("bad", false));
    let out = run(&["verify", bad.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("hlir: error: channel 7"));
}

#[test]
fn malformed_input_exits_with_2() {
    let path = tmp_path("malformed");
    std::fs::write(&path, "{ not json").unwrap();
    let out = run(&["print", path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).starts_with("hlir: error:"));

    let out = run(&["print", "/nonexistent/module.json"]);
    assert_eq!(out.status.code(), Some(2));
}
