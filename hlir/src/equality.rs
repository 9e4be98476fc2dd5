// equality.rs — Graph-level structural equality
//
// Drives `Instruction::identical_shallow` / `identical_attributes` across two
// graph contexts. Two instructions are structurally equal when they agree on
// opcode, shape, attributes and (recursively) operands; two computations when
// they agree on parameters and root.
//
// The matcher keeps an injective node map in both directions: a shared
// sub-DAG is compared once, and a renaming must be consistent (one lhs node
// cannot stand for two rhs nodes). Operand edges are walked with an explicit
// worklist, so chain depth never becomes stack depth. Pairs are bound when
// pushed and verified when popped; a failed comparison unbinds every pair it
// bound.
//
// Each called computation pair is compared under its own node map, so a body
// shared by two callers on one side may match two identical bodies on the
// other. Pairs are memoized and marked equal before their bodies are
// compared, which terminates comparisons of computations that refer to each
// other.
//
// Side effects: `trace!` logging of the first mismatch found.

use std::collections::HashMap;

use log::trace;

use crate::id::{ComputationId, InstrId};
use crate::instruction::GraphContext;
use crate::module::Module;

#[derive(Default)]
struct NodeMap {
    forward: HashMap<InstrId, InstrId>,
    reverse: HashMap<InstrId, InstrId>,
}

pub struct StructuralMatcher<'a> {
    lhs: &'a dyn GraphContext,
    rhs: &'a dyn GraphContext,
    nodes: NodeMap,
    computations: HashMap<(ComputationId, ComputationId), bool>,
}

impl<'a> StructuralMatcher<'a> {
    pub fn new(lhs: &'a dyn GraphContext, rhs: &'a dyn GraphContext) -> Self {
        StructuralMatcher {
            lhs,
            rhs,
            nodes: NodeMap::default(),
            computations: HashMap::new(),
        }
    }

    /// Number of instruction pairs matched so far in the outermost scope.
    pub fn matched(&self) -> usize {
        self.nodes.forward.len()
    }

    pub fn instructions_equal(&mut self, a: InstrId, b: InstrId) -> bool {
        let mut bound = Vec::new();
        let equal = self.match_from(a, b, &mut bound);
        if !equal {
            for (x, y) in bound {
                self.nodes.forward.remove(&x);
                self.nodes.reverse.remove(&y);
            }
        }
        equal
    }

    /// Bind `a` to `b` and record the pair in `bound`. If either side is
    /// already bound, nothing changes and the result says whether the
    /// existing binding agrees.
    fn bind(
        &mut self,
        a: InstrId,
        b: InstrId,
        bound: &mut Vec<(InstrId, InstrId)>,
    ) -> Option<bool> {
        if let Some(&mapped) = self.nodes.forward.get(&a) {
            if mapped != b {
                trace!("{} is already matched to {}, not {}", a, mapped, b);
            }
            return Some(mapped == b);
        }
        if self.nodes.reverse.contains_key(&b) {
            trace!("{} is already matched to another lhs instruction", b);
            return Some(false);
        }
        self.nodes.forward.insert(a, b);
        self.nodes.reverse.insert(b, a);
        bound.push((a, b));
        None
    }

    fn match_from(
        &mut self,
        a: InstrId,
        b: InstrId,
        bound: &mut Vec<(InstrId, InstrId)>,
    ) -> bool {
        if let Some(known) = self.bind(a, b, bound) {
            return known;
        }
        let (lhs, rhs) = (self.lhs, self.rhs);
        let mut pending = vec![(a, b)];
        while let Some((a, b)) = pending.pop() {
            let (Some(x), Some(y)) = (lhs.instruction(a), rhs.instruction(b)) else {
                trace!("{} or {} does not resolve", a, b);
                return false;
            };
            if !x.identical_shallow(y) {
                trace!(
                    "{} and {} differ: {} {} vs {} {}",
                    a,
                    b,
                    x.opcode(),
                    x.shape(),
                    y.opcode(),
                    y.shape()
                );
                return false;
            }
            let mut eq_computations = |ca: ComputationId, cb: ComputationId| {
                self.computations_equal(ca, cb)
            };
            if !x.identical_attributes(y, &mut eq_computations) {
                trace!("{} and {} differ in {} attributes", a, b, x.opcode());
                return false;
            }
            for (&oa, &ob) in x.operands().iter().zip(y.operands()) {
                match self.bind(oa, ob, bound) {
                    Some(true) => {}
                    Some(false) => return false,
                    None => pending.push((oa, ob)),
                }
            }
        }
        true
    }

    /// Compare two computations under a fresh node map. The outer map is
    /// restored afterwards.
    pub fn computations_equal(&mut self, a: ComputationId, b: ComputationId) -> bool {
        if let Some(&known) = self.computations.get(&(a, b)) {
            return known;
        }
        self.computations.insert((a, b), true);
        let outer = std::mem::take(&mut self.nodes);
        let equal = self.compare_computations(a, b);
        self.nodes = outer;
        self.computations.insert((a, b), equal);
        equal
    }

    fn compare_computations(&mut self, a: ComputationId, b: ComputationId) -> bool {
        let (lhs, rhs) = (self.lhs, self.rhs);
        let (Some(ca), Some(cb)) = (lhs.computation(a), rhs.computation(b)) else {
            trace!("{} or {} does not resolve", a, b);
            return false;
        };
        let (pa, pb) = (ca.parameters(), cb.parameters());
        if pa.len() != pb.len() || ca.instructions().len() != cb.instructions().len() {
            trace!(
                "{} and {} differ in size: {}/{} parameters, {}/{} instructions",
                ca.name(),
                cb.name(),
                pa.len(),
                pb.len(),
                ca.instructions().len(),
                cb.instructions().len()
            );
            return false;
        }
        if !pa.iter().zip(&pb).all(|(&x, &y)| self.instructions_equal(x, y)) {
            return false;
        }
        match (ca.root(), cb.root()) {
            (Some(ra), Some(rb)) => self.instructions_equal(ra, rb),
            (None, None) => true,
            _ => false,
        }
    }
}

pub fn instructions_equal(
    lhs: &dyn GraphContext,
    a: InstrId,
    rhs: &dyn GraphContext,
    b: InstrId,
) -> bool {
    StructuralMatcher::new(lhs, rhs).instructions_equal(a, b)
}

pub fn computations_equal(
    lhs: &dyn GraphContext,
    a: ComputationId,
    rhs: &dyn GraphContext,
    b: ComputationId,
) -> bool {
    StructuralMatcher::new(lhs, rhs).computations_equal(a, b)
}

/// Entry computations are structurally equal. Names are not compared.
pub fn modules_equal(lhs: &Module, rhs: &Module) -> bool {
    match (lhs.entry(), rhs.entry()) {
        (Some(a), Some(b)) => computations_equal(lhs, a, rhs, b),
        (None, None) => true,
        _ => false,
    }
}
