// wire.rs — Serialized form of instructions and modules
//
// Flat record per instruction: common fields plus the opcode-specific fields
// of its family, with absent/empty fields omitted. Handles are written as
// integer ids; a module lists callees before callers and, within a
// computation, operands before users, so decoding is a single forward pass.
//
// Preconditions: none for encoding. Decoding rejects ids that are used before
//   they are defined.
// Postconditions: `from_wire(to_wire(x))` is structurally identical to `x`
//   under the id remapping performed by `Module::from_proto`.
// Failure modes: malformed JSON, unknown opcodes, missing fields, dangling
//   ids and any factory rejection → `WireError`.
// Side effects: `debug!` logging while decoding.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::attrs::{Attributes, BatchNormAttrs, FftType};
use crate::error::{BuildError, WireError};
use crate::id::{ComputationId, InstrId};
use crate::instruction::{GraphContext, Instruction};
use crate::module::Module;
use crate::opcode::Opcode;
use crate::shape::Shape;

// ── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceDimension {
    pub start: i64,
    pub limit: i64,
    pub stride: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionProto {
    pub id: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub opcode: String,
    pub shape: Shape,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operand_ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fft_type: Option<FftType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fft_length: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub called_computation_ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_operand_ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slice_dimensions: Vec<SliceDimension>,
}

impl InstructionProto {
    fn new(opcode: Opcode, shape: Shape) -> Self {
        InstructionProto {
            id: 0,
            name: String::new(),
            opcode: opcode.name().to_string(),
            shape,
            operand_ids: Vec::new(),
            parameter_number: None,
            literal: None,
            epsilon: None,
            feature_index: None,
            fft_type: None,
            fft_length: Vec::new(),
            channel_id: None,
            dimensions: Vec::new(),
            called_computation_ids: Vec::new(),
            static_operand_ids: Vec::new(),
            slice_dimensions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationProto {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_id: Option<i64>,
    pub instructions: Vec<InstructionProto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleProto {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_computation_id: Option<i64>,
    pub computations: Vec<ComputationProto>,
}

// ── Instruction encoding ────────────────────────────────────────────────────

fn handle(id: InstrId) -> i64 {
    i64::from(id.0)
}

fn computation_handle(id: ComputationId) -> i64 {
    i64::from(id.0)
}

impl Instruction {
    /// Encode opcode, shape, operand handles and the family's fields. `id`
    /// and `name` are left for the container to fill in.
    pub fn to_wire(&self) -> InstructionProto {
        let mut proto = InstructionProto::new(self.opcode(), self.shape().clone());
        proto.operand_ids = self.operands().iter().map(|&o| handle(o)).collect();
        match self.attributes() {
            Attributes::None => {}
            Attributes::Parameter { number } => proto.parameter_number = Some(*number),
            Attributes::Constant { value } => proto.literal = Some(*value),
            Attributes::BatchNorm(bn) => {
                proto.epsilon = Some(bn.epsilon);
                proto.feature_index = Some(bn.feature_index);
            }
            Attributes::Fft(fft) => {
                proto.fft_type = Some(fft.fft_type);
                proto.fft_length = fft.fft_length.clone();
            }
            Attributes::Channel(ch) => proto.channel_id = Some(ch.channel_id),
            Attributes::Dimensions(dims) => proto.dimensions = dims.clone(),
            Attributes::Reduce(r) => {
                proto.dimensions = r.dimensions.clone();
                proto.called_computation_ids = vec![computation_handle(r.to_apply)];
            }
            Attributes::Map(m) => {
                proto.dimensions = m.dimensions.clone();
                proto.called_computation_ids = vec![computation_handle(m.to_apply)];
                proto.static_operand_ids =
                    m.static_operands.iter().map(|&o| handle(o)).collect();
            }
            Attributes::Slice(s) => {
                proto.slice_dimensions = (0..s.starts.len())
                    .map(|i| SliceDimension {
                        start: s.starts[i],
                        limit: s.limits[i],
                        stride: s.strides[i],
                    })
                    .collect();
            }
        }
        proto
    }

    /// Rebuild an instruction through its factory. `operands` and `called`
    /// are the already-resolved handles for `proto.operand_ids` and
    /// `proto.called_computation_ids`. The rebuilt result shape must match
    /// the recorded one.
    pub fn from_wire(
        ctx: &dyn GraphContext,
        proto: &InstructionProto,
        operands: &[InstrId],
        called: &[ComputationId],
    ) -> Result<Self, WireError> {
        let opcode: Opcode = proto
            .opcode
            .parse()
            .map_err(|_| WireError::UnknownOpcode(proto.opcode.clone()))?;
        let shape = proto.shape.clone();

        let instr = match opcode {
            Opcode::Parameter => {
                let number = proto
                    .parameter_number
                    .ok_or(WireError::MissingField {
                        opcode,
                        field: "parameter_number",
                    })?;
                Instruction::parameter(shape, number)?
            }
            Opcode::Constant => {
                let value = proto.literal.ok_or(WireError::MissingField {
                    opcode,
                    field: "literal",
                })?;
                Instruction::constant(shape, value)?
            }
            Opcode::Negate => {
                let [x] = fixed::<1>(opcode, operands)?;
                Instruction::unary(ctx, opcode, shape, x)?
            }
            Opcode::Add | Opcode::Subtract | Opcode::Multiply | Opcode::Maximum => {
                let [lhs, rhs] = fixed::<2>(opcode, operands)?;
                Instruction::binary(ctx, opcode, shape, lhs, rhs)?
            }
            Opcode::BatchNormTraining | Opcode::BatchNormInference | Opcode::BatchNormGrad => {
                let attrs = BatchNormAttrs {
                    epsilon: proto.epsilon.ok_or(WireError::MissingField {
                        opcode,
                        field: "epsilon",
                    })?,
                    feature_index: proto.feature_index.ok_or(WireError::MissingField {
                        opcode,
                        field: "feature_index",
                    })?,
                };
                Instruction::batch_norm(ctx, opcode, shape, operands, attrs)?
            }
            Opcode::Fft => {
                let [x] = fixed::<1>(opcode, operands)?;
                let fft_type = proto.fft_type.ok_or(WireError::MissingField {
                    opcode,
                    field: "fft_type",
                })?;
                Instruction::fft(ctx, shape, x, fft_type, &proto.fft_length)?
            }
            Opcode::Send => {
                let [x] = fixed::<1>(opcode, operands)?;
                Instruction::send(ctx, x, channel(opcode, proto)?)?
            }
            Opcode::Recv => {
                fixed::<0>(opcode, operands)?;
                let received = shape.tuple_shapes().first().cloned().ok_or_else(|| {
                    BuildError::InvalidAttribute {
                        opcode,
                        message: format!("expected a (value, status) tuple, got {}", shape),
                    }
                })?;
                Instruction::recv(received, channel(opcode, proto)?)?
            }
            Opcode::SendDone | Opcode::RecvDone => {
                let [x] = fixed::<1>(opcode, operands)?;
                let done = if opcode == Opcode::SendDone {
                    Instruction::send_done(ctx, x)?
                } else {
                    Instruction::recv_done(ctx, x)?
                };
                if let Some(recorded) = proto.channel_id {
                    if done.channel_id() != Some(recorded) {
                        return Err(BuildError::ChannelPairing {
                            channel_id: recorded,
                            message: format!(
                                "{} records channel {} but its operand uses {:?}",
                                opcode,
                                recorded,
                                done.channel_id()
                            ),
                        }
                        .into());
                    }
                }
                done
            }
            Opcode::Reverse => {
                let [x] = fixed::<1>(opcode, operands)?;
                Instruction::reverse(ctx, shape, x, &proto.dimensions)?
            }
            Opcode::Transpose => {
                let [x] = fixed::<1>(opcode, operands)?;
                Instruction::transpose(ctx, shape, x, &proto.dimensions)?
            }
            Opcode::Broadcast => {
                let [x] = fixed::<1>(opcode, operands)?;
                Instruction::broadcast(ctx, shape, x, &proto.dimensions)?
            }
            Opcode::Concatenate => {
                let [dimension]: [i64; 1] = proto.dimensions[..].try_into().map_err(|_| {
                    BuildError::AxisCountMismatch {
                        opcode,
                        expected: 1,
                        actual: proto.dimensions.len(),
                    }
                })?;
                Instruction::concatenate(ctx, shape, operands, dimension)?
            }
            Opcode::Reduce => {
                let [arg, init] = fixed::<2>(opcode, operands)?;
                let to_apply = callee(opcode, called)?;
                Instruction::reduce(ctx, shape, arg, init, &proto.dimensions, to_apply)?
            }
            Opcode::Map => {
                if !proto.static_operand_ids.is_empty() {
                    return Err(BuildError::Unsupported {
                        opcode,
                        feature: "static operands",
                    }
                    .into());
                }
                let to_apply = callee(opcode, called)?;
                Instruction::map(ctx, shape, operands, to_apply, &[])?
            }
            Opcode::Slice => {
                let [x] = fixed::<1>(opcode, operands)?;
                let dims = &proto.slice_dimensions;
                let starts: Vec<i64> = dims.iter().map(|d| d.start).collect();
                let limits: Vec<i64> = dims.iter().map(|d| d.limit).collect();
                let strides: Vec<i64> = dims.iter().map(|d| d.stride).collect();
                Instruction::slice(ctx, shape, x, &starts, &limits, &strides)?
            }
        };

        if instr.shape() != &proto.shape {
            return Err(BuildError::ShapeMismatch {
                opcode,
                expected: instr.shape().clone(),
                actual: proto.shape.clone(),
            }
            .into());
        }
        Ok(instr)
    }
}

fn fixed<const N: usize>(opcode: Opcode, operands: &[InstrId]) -> Result<[InstrId; N], BuildError> {
    operands.try_into().map_err(|_| BuildError::ArityMismatch {
        opcode,
        expected: N,
        actual: operands.len(),
    })
}

fn channel(opcode: Opcode, proto: &InstructionProto) -> Result<i64, WireError> {
    proto.channel_id.ok_or(WireError::MissingField {
        opcode,
        field: "channel_id",
    })
}

fn callee(opcode: Opcode, called: &[ComputationId]) -> Result<ComputationId, WireError> {
    match called {
        [one] => Ok(*one),
        _ => Err(WireError::MissingField {
            opcode,
            field: "called_computation_ids",
        }),
    }
}

// ── Module encoding ─────────────────────────────────────────────────────────

impl Module {
    /// Computations callees first, instructions in post-order.
    pub fn to_proto(&self) -> ModuleProto {
        let computations = self
            .computation_post_order()
            .into_iter()
            .filter_map(|id| self.computation(id))
            .map(|comp| ComputationProto {
                id: computation_handle(comp.id()),
                name: comp.name().to_string(),
                root_id: comp.root().map(handle),
                instructions: self
                    .post_order(comp.id())
                    .into_iter()
                    .filter_map(|id| {
                        let mut proto = self.instruction(id)?.to_wire();
                        proto.id = handle(id);
                        proto.name = self.instruction_name(id).unwrap_or_default().to_string();
                        Some(proto)
                    })
                    .collect(),
            })
            .collect();
        ModuleProto {
            name: self.name().to_string(),
            entry_computation_id: self.entry().map(computation_handle),
            computations,
        }
    }

    /// Rebuild a module in one forward pass, validating every instruction
    /// through its factory.
    pub fn from_proto(proto: &ModuleProto) -> Result<Module, WireError> {
        let mut module = Module::new(proto.name.clone());
        let mut computations: HashMap<i64, ComputationId> = HashMap::new();
        let mut instructions: HashMap<i64, InstrId> = HashMap::new();

        for comp_proto in &proto.computations {
            if comp_proto.instructions.is_empty() {
                return Err(WireError::EmptyComputation(comp_proto.name.clone()));
            }
            if computations.contains_key(&comp_proto.id) {
                return Err(WireError::DuplicateComputation(comp_proto.id));
            }
            let comp = module.add_computation(comp_proto.name.clone());
            computations.insert(comp_proto.id, comp);
            debug!(
                "decoding computation {} ({} instructions)",
                comp_proto.name,
                comp_proto.instructions.len()
            );

            for instr_proto in &comp_proto.instructions {
                if instructions.contains_key(&instr_proto.id) {
                    return Err(WireError::DuplicateInstruction(instr_proto.id));
                }
                let operands = instr_proto
                    .operand_ids
                    .iter()
                    .map(|id| {
                        instructions
                            .get(id)
                            .copied()
                            .ok_or(WireError::DanglingInstruction(*id))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let called = instr_proto
                    .called_computation_ids
                    .iter()
                    .map(|id| {
                        computations
                            .get(id)
                            .copied()
                            .ok_or(WireError::DanglingComputation(*id))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let instr = Instruction::from_wire(&module, instr_proto, &operands, &called)?;
                let id = if instr_proto.name.is_empty() {
                    module.add_instruction(comp, instr)?
                } else {
                    module.add_named_instruction(comp, instr_proto.name.clone(), instr)?
                };
                instructions.insert(instr_proto.id, id);
            }

            if let Some(root) = comp_proto.root_id {
                let id = instructions
                    .get(&root)
                    .copied()
                    .ok_or(WireError::DanglingInstruction(root))?;
                module.set_root(comp, id)?;
            }
        }

        if let Some(entry) = proto.entry_computation_id {
            let id = computations
                .get(&entry)
                .copied()
                .ok_or(WireError::DanglingComputation(entry))?;
            module.set_entry(id)?;
        }
        debug!(
            "decoded module {}: {} computations, {} instructions",
            proto.name,
            proto.computations.len(),
            instructions.len()
        );
        Ok(module)
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string_pretty(&self.to_proto())?)
    }

    pub fn from_json(text: &str) -> Result<Module, WireError> {
        let proto: ModuleProto = serde_json::from_str(text)?;
        Module::from_proto(&proto)
    }
}
