// build.rs — Validated instruction factories
//
// Every instruction enters the graph through one of these constructors. They
// resolve operand handles through the graph context, check the family's
// construction rules, and either return a complete node or a `BuildError`.
//
// Preconditions: operand and computation handles refer to live entries of
//   `ctx`.
// Postconditions: `opcode.family() == attrs.family()`; slice ranges and axis
//   lists are well formed; declared result shapes agree with the operands.
// Failure modes: any violated rule → `BuildError`, nothing constructed.
// Side effects: none.

use crate::attrs::{
    Attributes, BatchNormAttrs, ChannelAttrs, FftAttrs, FftType, MapAttrs, ReduceAttrs, SliceAttrs,
};
use crate::error::BuildError;
use crate::id::{ComputationId, InstrId};
use crate::instruction::{GraphContext, Instruction};
use crate::opcode::Opcode;
use crate::shape::{ElementType, Shape};

// ── Shared checks ───────────────────────────────────────────────────────────

fn resolve(ctx: &dyn GraphContext, id: InstrId) -> Result<&Instruction, BuildError> {
    ctx.instruction(id).ok_or(BuildError::UnknownInstruction(id))
}

fn check_arity(opcode: Opcode, expected: usize, actual: usize) -> Result<(), BuildError> {
    if expected != actual {
        return Err(BuildError::ArityMismatch {
            opcode,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Axes must lie in `0..rank` and be pairwise distinct.
fn check_axes(opcode: Opcode, axes: &[i64], rank: usize) -> Result<(), BuildError> {
    let mut seen = vec![false; rank];
    for &axis in axes {
        if axis < 0 || axis as usize >= rank {
            return Err(BuildError::AxisOutOfRange { opcode, axis, rank });
        }
        if std::mem::replace(&mut seen[axis as usize], true) {
            return Err(BuildError::DuplicateAxis { opcode, axis });
        }
    }
    Ok(())
}

fn expect_shape(opcode: Opcode, expected: Shape, actual: &Shape) -> Result<(), BuildError> {
    if &expected != actual {
        return Err(BuildError::ShapeMismatch {
            opcode,
            expected,
            actual: actual.clone(),
        });
    }
    Ok(())
}

fn require_array(opcode: Opcode, shape: &Shape) -> Result<ElementType, BuildError> {
    shape.element_type().ok_or_else(|| BuildError::InvalidAttribute {
        opcode,
        message: format!("expected an array shape, got {}", shape),
    })
}

fn channel_status_shape() -> Shape {
    Shape::scalar(ElementType::U32)
}

// ── Factories ───────────────────────────────────────────────────────────────

impl Instruction {
    pub fn parameter(shape: Shape, number: i64) -> Result<Self, BuildError> {
        if number < 0 {
            return Err(BuildError::InvalidAttribute {
                opcode: Opcode::Parameter,
                message: format!("parameter number {} is negative", number),
            });
        }
        Ok(Self::from_parts(
            Opcode::Parameter,
            shape,
            Vec::new(),
            Attributes::Parameter { number },
        ))
    }

    /// A constant whose every element is `value`.
    pub fn constant(shape: Shape, value: f64) -> Result<Self, BuildError> {
        require_array(Opcode::Constant, &shape)?;
        Ok(Self::from_parts(
            Opcode::Constant,
            shape,
            Vec::new(),
            Attributes::Constant { value },
        ))
    }

    pub fn unary(
        ctx: &dyn GraphContext,
        opcode: Opcode,
        shape: Shape,
        operand: InstrId,
    ) -> Result<Self, BuildError> {
        if opcode != Opcode::Negate {
            return Err(BuildError::InvalidAttribute {
                opcode,
                message: "not a unary elementwise opcode".to_string(),
            });
        }
        let x = resolve(ctx, operand)?;
        expect_shape(opcode, x.shape().clone(), &shape)?;
        Ok(Self::from_parts(opcode, shape, vec![operand], Attributes::None))
    }

    pub fn binary(
        ctx: &dyn GraphContext,
        opcode: Opcode,
        shape: Shape,
        lhs: InstrId,
        rhs: InstrId,
    ) -> Result<Self, BuildError> {
        if !opcode.is_elementwise_binary() {
            return Err(BuildError::InvalidAttribute {
                opcode,
                message: "not a binary elementwise opcode".to_string(),
            });
        }
        for id in [lhs, rhs] {
            let x = resolve(ctx, id)?;
            expect_shape(opcode, x.shape().clone(), &shape)?;
        }
        Ok(Self::from_parts(
            opcode,
            shape,
            vec![lhs, rhs],
            Attributes::None,
        ))
    }

    // ── Batch normalization ─────────────────────────────────────────────

    /// Operands: `[operand, scale, offset]`.
    pub fn batch_norm_training(
        ctx: &dyn GraphContext,
        shape: Shape,
        operands: [InstrId; 3],
        attrs: BatchNormAttrs,
    ) -> Result<Self, BuildError> {
        Self::batch_norm(ctx, Opcode::BatchNormTraining, shape, &operands, attrs)
    }

    /// Operands: `[operand, scale, offset, mean, variance]`.
    pub fn batch_norm_inference(
        ctx: &dyn GraphContext,
        shape: Shape,
        operands: [InstrId; 5],
        attrs: BatchNormAttrs,
    ) -> Result<Self, BuildError> {
        Self::batch_norm(ctx, Opcode::BatchNormInference, shape, &operands, attrs)
    }

    /// Operands: `[operand, scale, mean, variance, grad_output]`.
    pub fn batch_norm_grad(
        ctx: &dyn GraphContext,
        shape: Shape,
        operands: [InstrId; 5],
        attrs: BatchNormAttrs,
    ) -> Result<Self, BuildError> {
        Self::batch_norm(ctx, Opcode::BatchNormGrad, shape, &operands, attrs)
    }

    pub(crate) fn batch_norm(
        ctx: &dyn GraphContext,
        opcode: Opcode,
        shape: Shape,
        operands: &[InstrId],
        attrs: BatchNormAttrs,
    ) -> Result<Self, BuildError> {
        let expected = match opcode {
            Opcode::BatchNormTraining => 3,
            Opcode::BatchNormInference | Opcode::BatchNormGrad => 5,
            _ => {
                return Err(BuildError::InvalidAttribute {
                    opcode,
                    message: "not a batch-norm opcode".to_string(),
                })
            }
        };
        check_arity(opcode, expected, operands.len())?;
        let mut resolved = Vec::with_capacity(operands.len());
        for &id in operands {
            resolved.push(resolve(ctx, id)?);
        }
        let rank = resolved[0].shape().rank();
        if attrs.feature_index < 0 || attrs.feature_index as usize >= rank {
            return Err(BuildError::AxisOutOfRange {
                opcode,
                axis: attrs.feature_index,
                rank,
            });
        }
        Ok(Self::from_parts(
            opcode,
            shape,
            operands.to_vec(),
            Attributes::BatchNorm(attrs),
        ))
    }

    // ── FFT ─────────────────────────────────────────────────────────────

    pub fn fft(
        ctx: &dyn GraphContext,
        shape: Shape,
        operand: InstrId,
        fft_type: FftType,
        fft_length: &[i64],
    ) -> Result<Self, BuildError> {
        let x = resolve(ctx, operand)?;
        let rank = x.shape().rank();
        if fft_length.is_empty() || fft_length.len() > 3 || fft_length.len() > rank {
            return Err(BuildError::InvalidAttribute {
                opcode: Opcode::Fft,
                message: format!(
                    "fft_length must have 1 to 3 entries and at most rank {}, got {}",
                    rank,
                    fft_length.len()
                ),
            });
        }
        if let Some(&bad) = fft_length.iter().find(|&&n| n < 0) {
            return Err(BuildError::InvalidAttribute {
                opcode: Opcode::Fft,
                message: format!("negative fft length {}", bad),
            });
        }
        Ok(Self::from_parts(
            Opcode::Fft,
            shape,
            vec![operand],
            Attributes::Fft(FftAttrs {
                fft_type,
                fft_length: fft_length.to_vec(),
            }),
        ))
    }

    // ── Channels ────────────────────────────────────────────────────────

    /// Result shape is `(operand_shape, u32[])`.
    pub fn send(
        ctx: &dyn GraphContext,
        operand: InstrId,
        channel_id: i64,
    ) -> Result<Self, BuildError> {
        let x = resolve(ctx, operand)?;
        let shape = Shape::tuple(vec![x.shape().clone(), channel_status_shape()]);
        Ok(Self::from_parts(
            Opcode::Send,
            shape,
            vec![operand],
            Attributes::Channel(ChannelAttrs { channel_id }),
        ))
    }

    /// Completes `send`. The operand must be a send; its channel id is
    /// inherited.
    pub fn send_done(ctx: &dyn GraphContext, send: InstrId) -> Result<Self, BuildError> {
        let channel_id = paired_channel(ctx, Opcode::SendDone, Opcode::Send, send)?;
        Ok(Self::from_parts(
            Opcode::SendDone,
            Shape::nil(),
            vec![send],
            Attributes::Channel(ChannelAttrs { channel_id }),
        ))
    }

    /// Receives a value of `shape`. Result shape is `(shape, u32[])`.
    pub fn recv(shape: Shape, channel_id: i64) -> Result<Self, BuildError> {
        Ok(Self::from_parts(
            Opcode::Recv,
            Shape::tuple(vec![shape, channel_status_shape()]),
            Vec::new(),
            Attributes::Channel(ChannelAttrs { channel_id }),
        ))
    }

    /// Completes `recv`, producing the received value.
    pub fn recv_done(ctx: &dyn GraphContext, recv: InstrId) -> Result<Self, BuildError> {
        let channel_id = paired_channel(ctx, Opcode::RecvDone, Opcode::Recv, recv)?;
        let received = resolve(ctx, recv)?.shape().tuple_shapes()[0].clone();
        Ok(Self::from_parts(
            Opcode::RecvDone,
            received,
            vec![recv],
            Attributes::Channel(ChannelAttrs { channel_id }),
        ))
    }

    // ── Dimension-list ops ──────────────────────────────────────────────

    pub fn reverse(
        ctx: &dyn GraphContext,
        shape: Shape,
        operand: InstrId,
        dimensions: &[i64],
    ) -> Result<Self, BuildError> {
        let x = resolve(ctx, operand)?;
        check_axes(Opcode::Reverse, dimensions, x.shape().rank())?;
        expect_shape(Opcode::Reverse, x.shape().clone(), &shape)?;
        Ok(Self::from_parts(
            Opcode::Reverse,
            shape,
            vec![operand],
            Attributes::Dimensions(dimensions.to_vec()),
        ))
    }

    /// `dimensions` is a permutation: result axis `i` is operand axis
    /// `dimensions[i]`.
    pub fn transpose(
        ctx: &dyn GraphContext,
        shape: Shape,
        operand: InstrId,
        dimensions: &[i64],
    ) -> Result<Self, BuildError> {
        let x = resolve(ctx, operand)?;
        let rank = x.shape().rank();
        if dimensions.len() != rank {
            return Err(BuildError::AxisCountMismatch {
                opcode: Opcode::Transpose,
                expected: rank,
                actual: dimensions.len(),
            });
        }
        check_axes(Opcode::Transpose, dimensions, rank)?;
        let element_type = require_array(Opcode::Transpose, x.shape())?;
        let permuted: Vec<i64> = dimensions
            .iter()
            .map(|&d| x.shape().dimensions()[d as usize])
            .collect();
        expect_shape(
            Opcode::Transpose,
            Shape::array(element_type, &permuted),
            &shape,
        )?;
        Ok(Self::from_parts(
            Opcode::Transpose,
            shape,
            vec![operand],
            Attributes::Dimensions(dimensions.to_vec()),
        ))
    }

    /// `dimensions[i]` is the result axis that operand axis `i` maps to.
    pub fn broadcast(
        ctx: &dyn GraphContext,
        shape: Shape,
        operand: InstrId,
        dimensions: &[i64],
    ) -> Result<Self, BuildError> {
        let x = resolve(ctx, operand)?;
        let operand_rank = x.shape().rank();
        if dimensions.len() != operand_rank {
            return Err(BuildError::AxisCountMismatch {
                opcode: Opcode::Broadcast,
                expected: operand_rank,
                actual: dimensions.len(),
            });
        }
        check_axes(Opcode::Broadcast, dimensions, shape.rank())?;
        if x.shape().element_type() != shape.element_type() {
            return Err(BuildError::InvalidAttribute {
                opcode: Opcode::Broadcast,
                message: format!("cannot broadcast {} to {}", x.shape(), shape),
            });
        }
        for (i, &d) in dimensions.iter().enumerate() {
            let from = x.shape().dimensions()[i];
            let to = shape.dimensions()[d as usize];
            if from != to {
                return Err(BuildError::InvalidAttribute {
                    opcode: Opcode::Broadcast,
                    message: format!(
                        "operand dimension {} has size {} but result dimension {} has size {}",
                        i, from, d, to
                    ),
                });
            }
        }
        Ok(Self::from_parts(
            Opcode::Broadcast,
            shape,
            vec![operand],
            Attributes::Dimensions(dimensions.to_vec()),
        ))
    }

    pub fn concatenate(
        ctx: &dyn GraphContext,
        shape: Shape,
        operands: &[InstrId],
        dimension: i64,
    ) -> Result<Self, BuildError> {
        let opcode = Opcode::Concatenate;
        let Some(&first) = operands.first() else {
            return Err(BuildError::InvalidAttribute {
                opcode,
                message: "requires at least one operand".to_string(),
            });
        };
        let head = resolve(ctx, first)?;
        let element_type = require_array(opcode, head.shape())?;
        let rank = head.shape().rank();
        check_axes(opcode, &[dimension], rank)?;
        let axis = dimension as usize;

        let mut expected = head.shape().dimensions().to_vec();
        for &id in &operands[1..] {
            let x = resolve(ctx, id)?;
            let dims = x.shape().dimensions();
            let mismatched = x.shape().element_type() != Some(element_type)
                || dims.len() != rank
                || (0..rank).any(|i| i != axis && dims[i] != expected[i]);
            if mismatched {
                return Err(BuildError::InvalidAttribute {
                    opcode,
                    message: format!(
                        "operand {} cannot be concatenated with {} along axis {}",
                        x.shape(),
                        head.shape(),
                        dimension
                    ),
                });
            }
            expected[axis] += dims[axis];
        }
        expect_shape(opcode, Shape::array(element_type, &expected), &shape)?;
        Ok(Self::from_parts(
            opcode,
            shape,
            operands.to_vec(),
            Attributes::Dimensions(vec![dimension]),
        ))
    }

    // ── Computation-calling ops ─────────────────────────────────────────

    /// Reduce `arg` over `dimensions` with `to_apply`, starting from the
    /// scalar `init_value`.
    pub fn reduce(
        ctx: &dyn GraphContext,
        shape: Shape,
        arg: InstrId,
        init_value: InstrId,
        dimensions: &[i64],
        to_apply: ComputationId,
    ) -> Result<Self, BuildError> {
        let opcode = Opcode::Reduce;
        let x = resolve(ctx, arg)?;
        let init = resolve(ctx, init_value)?;
        let accumulator = ctx
            .computation(to_apply)
            .ok_or(BuildError::UnknownComputation(to_apply))?
            .root()
            .and_then(|root| ctx.instruction(root))
            .map(|root| root.shape().clone())
            .ok_or(BuildError::UnknownComputation(to_apply))?;
        if !init.shape().is_scalar() {
            return Err(BuildError::InvalidAttribute {
                opcode,
                message: format!("init value must be a scalar, got {}", init.shape()),
            });
        }
        expect_shape(opcode, accumulator, init.shape())?;

        let rank = x.shape().rank();
        check_axes(opcode, dimensions, rank)?;
        let element_type = require_array(opcode, init.shape())?;
        let kept: Vec<i64> = x
            .shape()
            .dimensions()
            .iter()
            .enumerate()
            .filter(|(i, _)| !dimensions.contains(&(*i as i64)))
            .map(|(_, &d)| d)
            .collect();
        expect_shape(opcode, Shape::array(element_type, &kept), &shape)?;
        Ok(Self::from_parts(
            opcode,
            shape,
            vec![arg, init_value],
            Attributes::Reduce(ReduceAttrs {
                dimensions: dimensions.to_vec(),
                to_apply,
            }),
        ))
    }

    /// Apply `to_apply` elementwise across `operands`. Static operands are not
    /// supported and must be empty.
    pub fn map(
        ctx: &dyn GraphContext,
        shape: Shape,
        operands: &[InstrId],
        to_apply: ComputationId,
        static_operands: &[InstrId],
    ) -> Result<Self, BuildError> {
        let opcode = Opcode::Map;
        if !static_operands.is_empty() {
            return Err(BuildError::Unsupported {
                opcode,
                feature: "static operands",
            });
        }
        let body = ctx
            .computation(to_apply)
            .ok_or(BuildError::UnknownComputation(to_apply))?;
        check_arity(opcode, body.parameters().len(), operands.len())?;
        for &id in operands {
            let x = resolve(ctx, id)?;
            if x.shape().dimensions() != shape.dimensions() {
                return Err(BuildError::InvalidAttribute {
                    opcode,
                    message: format!("operand {} does not match result {}", x.shape(), shape),
                });
            }
        }
        Ok(Self::from_parts(
            opcode,
            shape.clone(),
            operands.to_vec(),
            Attributes::Map(MapAttrs {
                dimensions: (0..shape.rank() as i64).collect(),
                to_apply,
                static_operands: Vec::new(),
            }),
        ))
    }

    // ── Slice ───────────────────────────────────────────────────────────

    /// Strided slice `[starts, limits)` of `operand`. The declared `shape`
    /// must have extent `ceil((limit - start) / stride)` in every dimension.
    pub fn slice(
        ctx: &dyn GraphContext,
        shape: Shape,
        operand: InstrId,
        starts: &[i64],
        limits: &[i64],
        strides: &[i64],
    ) -> Result<Self, BuildError> {
        let opcode = Opcode::Slice;
        let x = resolve(ctx, operand)?;
        let element_type = require_array(opcode, x.shape())?;
        let operand_dims = x.shape().dimensions();
        let rank = operand_dims.len();
        for len in [starts.len(), limits.len(), strides.len()] {
            if len != rank {
                return Err(BuildError::AxisCountMismatch {
                    opcode,
                    expected: rank,
                    actual: len,
                });
            }
        }
        for i in 0..rank {
            let (start, limit, stride) = (starts[i], limits[i], strides[i]);
            if start < 0 || start > limit || limit > operand_dims[i] || stride < 1 {
                return Err(BuildError::MalformedSlice {
                    dimension: i,
                    start,
                    limit,
                    stride,
                });
            }
        }
        let attrs = SliceAttrs {
            starts: starts.to_vec(),
            limits: limits.to_vec(),
            strides: strides.to_vec(),
            in_place: false,
        };
        let extents: Vec<i64> = (0..rank).map(|i| attrs.extent(i)).collect();
        expect_shape(opcode, Shape::array(element_type, &extents), &shape)?;
        Ok(Self::from_parts(
            opcode,
            shape,
            vec![operand],
            Attributes::Slice(attrs),
        ))
    }
}

fn paired_channel(
    ctx: &dyn GraphContext,
    opcode: Opcode,
    expected: Opcode,
    operand: InstrId,
) -> Result<i64, BuildError> {
    let x = resolve(ctx, operand)?;
    if x.opcode() != expected {
        return Err(BuildError::UnpairedDone {
            opcode,
            expected,
            actual: x.opcode(),
        });
    }
    x.channel_id().ok_or(BuildError::FamilyMismatch {
        opcode,
        expected: crate::opcode::Family::Channel,
        actual: x.attributes().family(),
    })
}
