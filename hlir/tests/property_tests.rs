// Property-based tests for the node contract.
//
// Random straight-line modules are generated as step lists and built through
// the factories. Every opcode has a step, and slice steps include maximal
// strides, empty ranges and empty axis lists. Categories:
// 1. Wire round-trip: decode(encode(m)) is structurally equal to m and prints
//    identically
// 2. Equality laws: reflexive under renaming, symmetric
// 3. Slice identity: sensitive to start/limit/stride, blind to the hint
// 4. Cloning: attributes survive for every opcode
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use std::collections::HashSet;

use hlir::attrs::{BatchNormAttrs, FftType};
use hlir::equality::{instructions_equal, modules_equal};
use hlir::id::InstrId;
use hlir::instruction::Instruction;
use hlir::module::Module;
use hlir::opcode::{Opcode, ALL_OPCODES};
use hlir::shape::{ElementType, Shape};
use hlir::text::{module_to_string, PrintOptions};
use proptest::prelude::*;

// ── Module generator ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Step {
    Negate,
    Binary(Opcode),
    MaxConstant(f64),
    Slice { start: i64, stride: i64 },
    EmptySlice,
    Reverse,
    ReverseNoAxes,
    Fft(FftType),
    BatchNorm { epsilon: f32 },
    BatchNormInference,
    BatchNormGrad,
    Send,
    Recv,
    ReduceViaTranspose,
    Map,
    Concatenate,
    InPlace,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Negate),
        prop_oneof![
            Just(Opcode::Add),
            Just(Opcode::Subtract),
            Just(Opcode::Multiply),
            Just(Opcode::Maximum)
        ]
        .prop_map(Step::Binary),
        (-1000.0f64..1000.0f64).prop_map(Step::MaxConstant),
        (0i64..8, prop_oneof![1i64..4, Just(i64::MAX)])
            .prop_map(|(start, stride)| Step::Slice { start, stride }),
        Just(Step::EmptySlice),
        Just(Step::Reverse),
        Just(Step::ReverseNoAxes),
        prop_oneof![
            Just(FftType::Fft),
            Just(FftType::Ifft),
            Just(FftType::Rfft),
            Just(FftType::Irfft)
        ]
        .prop_map(Step::Fft),
        (1e-6f32..1.0f32).prop_map(|epsilon| Step::BatchNorm { epsilon }),
        Just(Step::BatchNormInference),
        Just(Step::BatchNormGrad),
        Just(Step::Send),
        Just(Step::Recv),
        Just(Step::ReduceViaTranspose),
        Just(Step::Map),
        Just(Step::Concatenate),
        Just(Step::InPlace),
    ]
}

fn arb_steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(arb_step(), 0..12)
}

/// One of each step.
fn every_step() -> Vec<Step> {
    vec![
        Step::Negate,
        Step::Binary(Opcode::Add),
        Step::Binary(Opcode::Subtract),
        Step::Binary(Opcode::Multiply),
        Step::MaxConstant(-2.5),
        Step::Slice {
            start: 1,
            stride: i64::MAX,
        },
        Step::Slice {
            start: 0,
            stride: 1,
        },
        Step::EmptySlice,
        Step::Reverse,
        Step::ReverseNoAxes,
        Step::Fft(FftType::Irfft),
        Step::BatchNorm { epsilon: 0.001 },
        Step::BatchNormInference,
        Step::BatchNormGrad,
        Step::Send,
        Step::Recv,
        Step::ReduceViaTranspose,
        Step::Map,
        Step::Concatenate,
        Step::InPlace,
    ]
}

fn f32s(dims: &[i64]) -> Shape {
    Shape::array(ElementType::F32, dims)
}

/// `ceil((limit - start) / stride)` without overflow.
fn extent(start: i64, limit: i64, stride: i64) -> i64 {
    let span = limit - start;
    span / stride + i64::from(span % stride != 0)
}

/// Build a chain over `f32[16]`, with a scalar add body for reduce and map.
/// Steps that do not apply to the current value are skipped. Side branches
/// (batch norm, empty slices, sends) hang off the chain without replacing it.
fn build(name: &str, steps: &[Step]) -> Module {
    let mut m = Module::new(name);
    let body = m.add_computation(format!("{}_sum", name));
    let x = m
        .add_instruction(body, Instruction::parameter(f32s(&[]), 0).unwrap())
        .unwrap();
    let y = m
        .add_instruction(body, Instruction::parameter(f32s(&[]), 1).unwrap())
        .unwrap();
    m.add_with(body, |m| Instruction::binary(m, Opcode::Add, f32s(&[]), x, y))
        .unwrap();

    let c = m.add_computation(format!("{}_main", name));
    let mut params = 0i64;
    let mut channels = 0i64;
    let mut len = 16i64;
    let mut cur = m
        .add_instruction(c, Instruction::parameter(f32s(&[len]), params).unwrap())
        .unwrap();
    params += 1;

    let mut param = |m: &mut Module, len: i64| {
        let p = m
            .add_instruction(c, Instruction::parameter(f32s(&[len]), params).unwrap())
            .unwrap();
        params += 1;
        p
    };

    for step in steps {
        match step {
            Step::Negate => {
                cur = m
                    .add_with(c, |m| Instruction::unary(m, Opcode::Negate, f32s(&[len]), cur))
                    .unwrap();
            }
            Step::Binary(op) => {
                let p = param(&mut m, len);
                cur = m
                    .add_with(c, |m| Instruction::binary(m, *op, f32s(&[len]), cur, p))
                    .unwrap();
            }
            Step::MaxConstant(v) => {
                let k = m
                    .add_instruction(c, Instruction::constant(f32s(&[len]), *v).unwrap())
                    .unwrap();
                cur = m
                    .add_with(c, |m| {
                        Instruction::binary(m, Opcode::Maximum, f32s(&[len]), cur, k)
                    })
                    .unwrap();
            }
            Step::Slice { start, stride } => {
                let start = start % len;
                let size = extent(start, len, *stride);
                cur = m
                    .add_with(c, |m| {
                        Instruction::slice(m, f32s(&[size]), cur, &[start], &[len], &[*stride])
                    })
                    .unwrap();
                len = size;
            }
            Step::EmptySlice => {
                let at = len / 2;
                m.add_with(c, |m| Instruction::slice(m, f32s(&[0]), cur, &[at], &[at], &[1]))
                    .unwrap();
            }
            Step::Reverse => {
                cur = m
                    .add_with(c, |m| Instruction::reverse(m, f32s(&[len]), cur, &[0]))
                    .unwrap();
            }
            Step::ReverseNoAxes => {
                cur = m
                    .add_with(c, |m| Instruction::reverse(m, f32s(&[len]), cur, &[]))
                    .unwrap();
            }
            Step::Fft(fft_type) => {
                cur = m
                    .add_with(c, |m| Instruction::fft(m, f32s(&[len]), cur, *fft_type, &[len]))
                    .unwrap();
            }
            Step::BatchNorm { epsilon } => {
                let scale = param(&mut m, len);
                let offset = param(&mut m, len);
                let shape = Shape::tuple(vec![f32s(&[len]), f32s(&[len]), f32s(&[len])]);
                m.add_with(c, |m| {
                    Instruction::batch_norm_training(
                        m,
                        shape,
                        [cur, scale, offset],
                        BatchNormAttrs {
                            epsilon: *epsilon,
                            feature_index: 0,
                        },
                    )
                })
                .unwrap();
            }
            Step::BatchNormInference | Step::BatchNormGrad => {
                let stats: Vec<InstrId> = (0..4).map(|_| param(&mut m, len)).collect();
                let operands = [cur, stats[0], stats[1], stats[2], stats[3]];
                let attrs = BatchNormAttrs {
                    epsilon: 1e-5,
                    feature_index: 0,
                };
                m.add_with(c, |m| {
                    if matches!(step, Step::BatchNormInference) {
                        Instruction::batch_norm_inference(m, f32s(&[len]), operands, attrs)
                    } else {
                        let shape = Shape::tuple(vec![f32s(&[len]), f32s(&[len]), f32s(&[len])]);
                        Instruction::batch_norm_grad(m, shape, operands, attrs)
                    }
                })
                .unwrap();
            }
            Step::Send => {
                let send = m
                    .add_with(c, |m| Instruction::send(m, cur, channels))
                    .unwrap();
                m.add_with(c, |m| Instruction::send_done(m, send)).unwrap();
                channels += 1;
            }
            Step::Recv => {
                let recv = m
                    .add_instruction(c, Instruction::recv(f32s(&[len]), channels).unwrap())
                    .unwrap();
                let received = m.add_with(c, |m| Instruction::recv_done(m, recv)).unwrap();
                channels += 1;
                cur = m
                    .add_with(c, |m| {
                        Instruction::binary(m, Opcode::Add, f32s(&[len]), cur, received)
                    })
                    .unwrap();
            }
            Step::ReduceViaTranspose => {
                let wide = m
                    .add_with(c, |m| Instruction::broadcast(m, f32s(&[len, 2]), cur, &[0]))
                    .unwrap();
                let flipped = m
                    .add_with(c, |m| Instruction::transpose(m, f32s(&[2, len]), wide, &[1, 0]))
                    .unwrap();
                let zero = m
                    .add_instruction(c, Instruction::constant(f32s(&[]), 0.0).unwrap())
                    .unwrap();
                cur = m
                    .add_with(c, |m| {
                        Instruction::reduce(m, f32s(&[len]), flipped, zero, &[0], body)
                    })
                    .unwrap();
            }
            Step::Map => {
                let p = param(&mut m, len);
                cur = m
                    .add_with(c, |m| Instruction::map(m, f32s(&[len]), &[cur, p], body, &[]))
                    .unwrap();
            }
            Step::Concatenate => {
                if len > 64 {
                    continue;
                }
                cur = m
                    .add_with(c, |m| {
                        Instruction::concatenate(m, f32s(&[2 * len]), &[cur, cur], 0)
                    })
                    .unwrap();
                len *= 2;
            }
            Step::InPlace => {
                m.set_in_place_slice(cur, true);
            }
        }
    }
    m.set_root(c, cur).unwrap();
    m
}

// ── 1. Wire round-trip ──────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn wire_roundtrip_preserves_structure(steps in arb_steps()) {
        let m = build("rt", &steps);
        let json = m.to_json().unwrap();
        let back = Module::from_json(&json).unwrap();

        prop_assert!(modules_equal(&m, &back), "round-trip changed structure:\n{}", json);
        prop_assert_eq!(back.to_json().unwrap(), json);
        prop_assert_eq!(
            module_to_string(&back, &PrintOptions::default()),
            module_to_string(&m, &PrintOptions::default())
        );
        prop_assert!(back.check_channel_pairs().is_ok());
    }

    #[test]
    fn equality_is_reflexive_under_renaming(steps in arb_steps()) {
        let a = build("a", &steps);
        let b = build("b", &steps);
        prop_assert!(modules_equal(&a, &a));
        prop_assert!(modules_equal(&a, &b));
        prop_assert_eq!(
            hlir::fingerprint::fingerprint(&a),
            hlir::fingerprint::fingerprint(&b)
        );
    }

    #[test]
    fn equality_is_symmetric(x in arb_steps(), y in arb_steps()) {
        let a = build("a", &x);
        let b = build("b", &y);
        prop_assert_eq!(modules_equal(&a, &b), modules_equal(&b, &a));
    }
}

// ── 3. Slice identity ───────────────────────────────────────────────────────

fn slice_pair(lhs: (i64, i64, i64), rhs: (i64, i64, i64), hint: bool) -> (Module, InstrId, InstrId) {
    let mut m = Module::new("slices");
    let c = m.add_computation("main");
    let p = m
        .add_instruction(c, Instruction::parameter(f32s(&[20]), 0).unwrap())
        .unwrap();
    let mut add = |(start, limit, stride): (i64, i64, i64)| {
        let size = extent(start, limit, stride);
        m.add_with(c, |m| {
            Instruction::slice(m, f32s(&[size]), p, &[start], &[limit], &[stride])
        })
        .unwrap()
    };
    let a = add(lhs);
    let b = add(rhs);
    m.set_in_place_slice(a, hint);
    (m, a, b)
}

fn arb_range() -> impl Strategy<Value = (i64, i64, i64)> {
    (0i64..20, 0i64..20, prop_oneof![1i64..5, Just(i64::MAX)])
        .prop_map(|(x, y, stride)| (x.min(y), x.max(y), stride))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn slice_identity_tracks_ranges_not_hint(
        lhs in arb_range(),
        rhs in arb_range(),
        hint in prop::bool::ANY,
    ) {
        let (m, a, b) = slice_pair(lhs, rhs, hint);
        prop_assert_eq!(instructions_equal(&m, a, &m, b), lhs == rhs);
    }
}

// ── 4. Cloning ──────────────────────────────────────────────────────────────

#[test]
fn every_opcode_round_trips() {
    let m = build("all", &every_step());
    let present: HashSet<Opcode> = m
        .instruction_ids()
        .filter_map(|id| m.instruction(id).map(|i| i.opcode()))
        .collect();
    for opcode in ALL_OPCODES {
        assert!(present.contains(&opcode), "{} is not generated", opcode);
    }

    let json = m.to_json().unwrap();
    let back = Module::from_json(&json).unwrap();
    assert!(modules_equal(&m, &back));
    assert_eq!(back.to_json().unwrap(), json);
    assert_eq!(
        module_to_string(&back, &PrintOptions::default()),
        module_to_string(&m, &PrintOptions::default())
    );
}

#[test]
fn clone_keeps_attributes_for_every_opcode() {
    let m = build("all", &every_step());
    let shape = f32s(&[7]);
    for id in m.instruction_ids() {
        let instr = m.instruction(id).unwrap();
        let operands: Vec<InstrId> = match instr.opcode() {
            Opcode::SendDone | Opcode::RecvDone => instr.operands().to_vec(),
            _ => instr.operands().iter().rev().copied().collect(),
        };
        let clone = instr.clone_with_new_operands(&m, shape.clone(), &operands);
        assert_eq!(clone.opcode(), instr.opcode());
        assert_eq!(clone.attributes(), instr.attributes(), "{}", instr.opcode());
        assert_eq!(clone.operands(), &operands[..]);
        assert_eq!(clone.shape(), &shape);
        assert_eq!(clone.is_in_place_slice(), instr.is_in_place_slice());
    }
}
