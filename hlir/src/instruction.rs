// instruction.rs — The instruction node and its uniform contract
//
// One concrete node type: common fields (opcode, result shape, operand
// handles) plus exactly one attribute payload. The four node operations are
// exhaustive matches over the payload:
//   - identical / identical_attributes   (here, equality slow path)
//   - clone_with_new_operands            (here)
//   - render_attributes                  (text.rs)
//   - to_wire / from_wire                (wire.rs)
//
// Preconditions: instructions are created through the factories in build.rs,
//   which guarantee `opcode.family() == attrs.family()`.
// Failure modes: clone contract violations panic.
// Side effects: none.

use crate::attrs::{Attributes, BatchNormAttrs, FftAttrs, SliceAttrs};
use crate::id::{ComputationId, InstrId};
use crate::module::Computation;
use crate::opcode::Opcode;
use crate::shape::Shape;

// ── Graph context ───────────────────────────────────────────────────────────

/// Resolves the handles an instruction holds. Implemented by the owning
/// container; factories, cloning, equality and printing consult it instead of
/// following pointers.
pub trait GraphContext {
    fn instruction(&self, id: InstrId) -> Option<&Instruction>;
    fn computation(&self, id: ComputationId) -> Option<&Computation>;
    fn instruction_name(&self, id: InstrId) -> Option<&str>;

    fn computation_name(&self, id: ComputationId) -> Option<&str> {
        self.computation(id).map(|c| c.name())
    }
}

// ── Instruction ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    opcode: Opcode,
    shape: Shape,
    operands: Vec<InstrId>,
    attrs: Attributes,
}

impl Instruction {
    /// Assemble a node whose operands and attributes were already validated.
    pub(crate) fn from_parts(
        opcode: Opcode,
        shape: Shape,
        operands: Vec<InstrId>,
        attrs: Attributes,
    ) -> Self {
        debug_assert_eq!(opcode.family(), attrs.family());
        Instruction {
            opcode,
            shape,
            operands,
            attrs,
        }
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn operands(&self) -> &[InstrId] {
        &self.operands
    }

    pub fn operand(&self, i: usize) -> InstrId {
        self.operands[i]
    }

    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attrs
    }

    // ── Family accessors ────────────────────────────────────────────────

    /// Axis list of reverse, transpose, broadcast, concatenate, reduce, map.
    pub fn dimensions(&self) -> &[i64] {
        self.attrs.dimensions()
    }

    /// The concatenation axis; `None` for other opcodes.
    pub fn concatenate_dimension(&self) -> Option<i64> {
        match (&self.attrs, self.opcode) {
            (Attributes::Dimensions(dims), Opcode::Concatenate) => dims.first().copied(),
            _ => None,
        }
    }

    pub fn batch_norm_attrs(&self) -> Option<&BatchNormAttrs> {
        match &self.attrs {
            Attributes::BatchNorm(bn) => Some(bn),
            _ => None,
        }
    }

    pub fn fft_attrs(&self) -> Option<&FftAttrs> {
        match &self.attrs {
            Attributes::Fft(fft) => Some(fft),
            _ => None,
        }
    }

    pub fn channel_id(&self) -> Option<i64> {
        match &self.attrs {
            Attributes::Channel(ch) => Some(ch.channel_id),
            _ => None,
        }
    }

    pub fn slice_attrs(&self) -> Option<&SliceAttrs> {
        match &self.attrs {
            Attributes::Slice(s) => Some(s),
            _ => None,
        }
    }

    pub fn parameter_number(&self) -> Option<i64> {
        match self.attrs {
            Attributes::Parameter { number } => Some(number),
            _ => None,
        }
    }

    /// The sub-computation applied by reduce or map.
    pub fn to_apply(&self) -> Option<ComputationId> {
        match &self.attrs {
            Attributes::Reduce(r) => Some(r.to_apply),
            Attributes::Map(m) => Some(m.to_apply),
            _ => None,
        }
    }

    pub fn is_in_place_slice(&self) -> bool {
        matches!(&self.attrs, Attributes::Slice(s) if s.in_place)
    }

    /// Set the in-place hint of a slice. Returns the new value, or `None` if
    /// this is not a slice. The only attribute mutable after construction.
    pub fn set_in_place_slice(&mut self, value: bool) -> Option<bool> {
        match &mut self.attrs {
            Attributes::Slice(s) => {
                s.in_place = value;
                Some(value)
            }
            _ => None,
        }
    }

    /// Whether a transpose swaps the two axes of a rank-2 operand.
    pub fn is_rank2_transpose(&self) -> bool {
        self.opcode == Opcode::Transpose && self.dimensions() == [1, 0]
    }

    /// Elementwise-ness. Derived on demand for map: two operands and a body
    /// that is a single elementwise binary op over its two parameters.
    pub fn is_elementwise(&self, ctx: &dyn GraphContext) -> bool {
        match &self.attrs {
            Attributes::None => true,
            Attributes::Map(map) => {
                if self.operands.len() != 2 {
                    return false;
                }
                ctx.computation(map.to_apply)
                    .is_some_and(|body| body_is_single_binary_op(ctx, body))
            }
            _ => false,
        }
    }

    // ── Structural identity ─────────────────────────────────────────────

    /// Opcode, shape and arity agree. Operands and attributes not consulted.
    pub fn identical_shallow(&self, other: &Instruction) -> bool {
        self.opcode == other.opcode
            && self.shape == other.shape
            && self.operands.len() == other.operands.len()
    }

    /// Attribute equality. Sub-computations are compared only through
    /// `eq_computations`; the in-place slice hint is ignored.
    pub fn identical_attributes(
        &self,
        other: &Instruction,
        eq_computations: &mut dyn FnMut(ComputationId, ComputationId) -> bool,
    ) -> bool {
        match (&self.attrs, &other.attrs) {
            (Attributes::None, Attributes::None) => true,
            (Attributes::Parameter { number: a }, Attributes::Parameter { number: b }) => a == b,
            (Attributes::Constant { value: a }, Attributes::Constant { value: b }) => {
                a.to_bits() == b.to_bits()
            }
            (Attributes::BatchNorm(a), Attributes::BatchNorm(b)) => {
                a.feature_index == b.feature_index && a.epsilon.to_bits() == b.epsilon.to_bits()
            }
            (Attributes::Fft(a), Attributes::Fft(b)) => a == b,
            (Attributes::Channel(a), Attributes::Channel(b)) => a.channel_id == b.channel_id,
            (Attributes::Dimensions(a), Attributes::Dimensions(b)) => a == b,
            (Attributes::Reduce(a), Attributes::Reduce(b)) => {
                a.dimensions == b.dimensions && eq_computations(a.to_apply, b.to_apply)
            }
            (Attributes::Map(a), Attributes::Map(b)) => {
                a.dimensions == b.dimensions
                    && a.static_operands.len() == b.static_operands.len()
                    && eq_computations(a.to_apply, b.to_apply)
            }
            (Attributes::Slice(a), Attributes::Slice(b)) => {
                a.starts == b.starts && a.limits == b.limits && a.strides == b.strides
            }
            _ => false,
        }
    }

    /// Full node identity given caller-supplied operand and computation
    /// equivalences.
    pub fn identical(
        &self,
        other: &Instruction,
        mut eq_operands: impl FnMut(InstrId, InstrId) -> bool,
        mut eq_computations: impl FnMut(ComputationId, ComputationId) -> bool,
    ) -> bool {
        self.identical_shallow(other)
            && self
                .operands
                .iter()
                .zip(&other.operands)
                .all(|(&a, &b)| eq_operands(a, b))
            && self.identical_attributes(other, &mut eq_computations)
    }

    // ── Cloning ─────────────────────────────────────────────────────────

    /// A node of the same opcode with the attributes copied verbatim
    /// (optimizer hints included) and the given shape and operands.
    ///
    /// # Panics
    ///
    /// If the operand count differs from this node's, or if a send-done /
    /// recv-done operand does not resolve to a send / recv.
    pub fn clone_with_new_operands(
        &self,
        ctx: &dyn GraphContext,
        shape: Shape,
        new_operands: &[InstrId],
    ) -> Instruction {
        assert_eq!(
            new_operands.len(),
            self.operands.len(),
            "{}: clone must keep the operand count",
            self.opcode
        );
        match &self.attrs {
            Attributes::Channel(_) => {
                let paired = match self.opcode {
                    Opcode::SendDone => Some(Opcode::Send),
                    Opcode::RecvDone => Some(Opcode::Recv),
                    _ => None,
                };
                if let Some(expected) = paired {
                    let actual = ctx.instruction(new_operands[0]).map(|i| i.opcode);
                    assert_eq!(
                        actual,
                        Some(expected),
                        "{}: operand {} must be a {}",
                        self.opcode,
                        new_operands[0],
                        expected
                    );
                }
            }
            Attributes::None
            | Attributes::Parameter { .. }
            | Attributes::Constant { .. }
            | Attributes::BatchNorm(_)
            | Attributes::Fft(_)
            | Attributes::Dimensions(_)
            | Attributes::Reduce(_)
            | Attributes::Map(_)
            | Attributes::Slice(_) => {}
        }
        Instruction {
            opcode: self.opcode,
            shape,
            operands: new_operands.to_vec(),
            attrs: self.attrs.clone(),
        }
    }
}

fn body_is_single_binary_op(ctx: &dyn GraphContext, body: &Computation) -> bool {
    if body.instructions().len() != 3 || body.parameters().len() != 2 {
        return false;
    }
    let Some(root) = body.root().and_then(|r| ctx.instruction(r)) else {
        return false;
    };
    if !root.opcode.is_elementwise_binary() {
        return false;
    }
    let params = body.parameters();
    let (a, b) = (root.operands[0], root.operands[1]);
    (a == params[0] && b == params[1]) || (a == params[1] && b == params[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::{ChannelAttrs, ReduceAttrs};
    use crate::shape::ElementType;

    fn f32s(dims: &[i64]) -> Shape {
        Shape::array(ElementType::F32, dims)
    }

    fn slice(starts: &[i64], in_place: bool) -> Instruction {
        Instruction::from_parts(
            Opcode::Slice,
            f32s(&[3]),
            vec![InstrId(0)],
            Attributes::Slice(SliceAttrs {
                starts: starts.to_vec(),
                limits: vec![8],
                strides: vec![2],
                in_place,
            }),
        )
    }

    fn never(_: ComputationId, _: ComputationId) -> bool {
        false
    }

    #[test]
    fn in_place_hint_is_ignored_by_identity() {
        let a = slice(&[2], false);
        let b = slice(&[2], true);
        assert!(a.identical(&b, |x, y| x == y, never));
        assert!(!a.identical(&slice(&[1], false), |x, y| x == y, never));
    }

    #[test]
    fn set_in_place_only_applies_to_slices() {
        let mut s = slice(&[2], false);
        assert_eq!(s.set_in_place_slice(true), Some(true));
        assert!(s.is_in_place_slice());

        let mut add = Instruction::from_parts(
            Opcode::Add,
            f32s(&[3]),
            vec![InstrId(0), InstrId(1)],
            Attributes::None,
        );
        assert_eq!(add.set_in_place_slice(true), None);
    }

    #[test]
    fn reduce_defers_to_computation_predicate() {
        let reduce = |c| {
            Instruction::from_parts(
                Opcode::Reduce,
                f32s(&[4]),
                vec![InstrId(0), InstrId(1)],
                Attributes::Reduce(ReduceAttrs {
                    dimensions: vec![1],
                    to_apply: ComputationId(c),
                }),
            )
        };
        let mut calls = Vec::new();
        let same = reduce(0).identical(&reduce(1), |a, b| a == b, |a, b| {
            calls.push((a, b));
            true
        });
        assert!(same);
        assert_eq!(calls, vec![(ComputationId(0), ComputationId(1))]);
    }

    #[test]
    fn operand_predicate_sees_pairs_in_order() {
        let add = |a, b| {
            Instruction::from_parts(
                Opcode::Add,
                f32s(&[]),
                vec![InstrId(a), InstrId(b)],
                Attributes::None,
            )
        };
        let mut seen = Vec::new();
        add(0, 1).identical(&add(5, 6), |a, b| {
            seen.push((a.0, b.0));
            true
        }, never);
        assert_eq!(seen, vec![(0, 5), (1, 6)]);
    }

    #[test]
    fn different_channel_ids_are_not_identical() {
        let recv = |id| {
            Instruction::from_parts(
                Opcode::Recv,
                Shape::tuple(vec![f32s(&[2]), Shape::scalar(ElementType::U32)]),
                Vec::new(),
                Attributes::Channel(ChannelAttrs { channel_id: id }),
            )
        };
        assert!(recv(7).identical(&recv(7), |_, _| true, never));
        assert!(!recv(7).identical(&recv(8), |_, _| true, never));
    }
}
