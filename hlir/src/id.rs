// id.rs — Arena handles for instructions and computations
//
// Instructions never own their operands or the computations they call; they
// hold these handles, and the owning module resolves them at call time.
// Handles are allocated densely in insertion order, so they double as arena
// indices and give deterministic numbering for printing and serialization.

use std::fmt;

/// Handle to an instruction slot in a module arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub u32);

/// Handle to a computation (an instruction DAG with parameters and a root).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputationId(pub u32);

impl InstrId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ComputationId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

impl fmt::Display for ComputationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Allocator for arena handles. Produces monotonically increasing IDs in
/// allocation order; a removed instruction's ID is never reused.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    next_instr: u32,
    next_computation: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_instr(&mut self) -> InstrId {
        let id = InstrId(self.next_instr);
        self.next_instr += 1;
        id
    }

    pub fn alloc_computation(&mut self) -> ComputationId {
        let id = ComputationId(self.next_computation);
        self.next_computation += 1;
        id
    }
}
