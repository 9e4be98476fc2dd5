use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use hlir::*;

use hlir::instruction::Instruction;
use hlir::module::Module;
use hlir::opcode::Opcode;
use hlir::shape::{ElementType, Shape};

// Wide graphs: `width` independent chains of depth `depth` over one parameter,
// summed pairwise into a single root. Each chain mixes elementwise ops,
// slices and a reduce through a shared scalar body.

fn f32s(dims: &[i64]) -> Shape {
    Shape::array(ElementType::F32, dims)
}

fn generate_wide_module(name: &str, width: usize, depth: usize) -> Module {
    let mut m = Module::new(name);
    let body = m.add_computation("sum");
    let x = m
        .add_instruction(body, Instruction::parameter(f32s(&[]), 0).unwrap())
        .unwrap();
    let y = m
        .add_instruction(body, Instruction::parameter(f32s(&[]), 1).unwrap())
        .unwrap();
    m.add_with(body, |m| Instruction::binary(m, Opcode::Add, f32s(&[]), x, y))
        .unwrap();

    let main = m.add_computation("main");
    let p = m
        .add_instruction(main, Instruction::parameter(f32s(&[16, 16]), 0).unwrap())
        .unwrap();
    let zero = m
        .add_instruction(main, Instruction::constant(f32s(&[]), 0.0).unwrap())
        .unwrap();

    let mut heads = Vec::with_capacity(width);
    for w in 0..width {
        let mut cur = p;
        for d in 0..depth {
            cur = if (w + d) % 3 == 0 {
                m.add_with(main, |m| Instruction::transpose(m, f32s(&[16, 16]), cur, &[1, 0]))
            } else {
                let op = if d % 2 == 0 { Opcode::Add } else { Opcode::Maximum };
                m.add_with(main, |m| Instruction::binary(m, op, f32s(&[16, 16]), cur, p))
            }
            .unwrap();
        }
        let sliced = m
            .add_with(main, |m| {
                Instruction::slice(m, f32s(&[8, 16]), cur, &[0, 0], &[16, 16], &[2, 1])
            })
            .unwrap();
        let reduced = m
            .add_with(main, |m| Instruction::reduce(m, f32s(&[8]), sliced, zero, &[1], body))
            .unwrap();
        heads.push(reduced);
    }
    while heads.len() > 1 {
        let mut next = Vec::with_capacity(heads.len().div_ceil(2));
        for pair in heads.chunks(2) {
            next.push(match pair {
                [a, b] => m
                    .add_with(main, |m| Instruction::binary(m, Opcode::Add, f32s(&[8]), *a, *b))
                    .unwrap(),
                [a] => *a,
                _ => unreachable!(),
            });
        }
        heads = next;
    }
    if let Some(&root) = heads.first() {
        m.set_root(main, root).unwrap();
    }
    m
}

fn sizes() -> [(usize, usize); 3] {
    [(4, 4), (16, 8), (64, 16)]
}

fn bench_modules_equal(c: &mut Criterion) {
    let mut group = c.benchmark_group("equality/modules_equal");
    for (width, depth) in sizes() {
        let a = generate_wide_module("a", width, depth);
        let b = generate_wide_module("b", width, depth);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, depth)),
            &(a, b),
            |bench, (a, b)| {
                bench.iter(|| black_box(equality::modules_equal(black_box(a), black_box(b))));
            },
        );
    }
    group.finish();
}

fn bench_wire(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire");
    for (width, depth) in sizes() {
        let module = generate_wide_module("wire", width, depth);
        let id = format!("{}x{}", width, depth);
        group.bench_with_input(BenchmarkId::new("encode", &id), &module, |b, module| {
            b.iter(|| black_box(module.to_json().unwrap()));
        });
        let json = module.to_json().unwrap();
        group.bench_with_input(BenchmarkId::new("decode", &id), &json, |b, json| {
            b.iter_batched(
                || json.clone(),
                |json| black_box(Module::from_json(&json).unwrap()),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    for (width, depth) in sizes() {
        let module = generate_wide_module("fp", width, depth);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, depth)),
            &module,
            |b, module| {
                b.iter(|| black_box(fingerprint::fingerprint(black_box(module))));
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_modules_equal,
    bench_wire,
    bench_fingerprint
);
criterion_main!(benches);
