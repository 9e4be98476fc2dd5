// error.rs — Construction and wire-decoding errors
//
// Construction errors are reported before any instruction exists; there is
// no partially built node to clean up. Clone-time contract violations are
// not represented here: they panic, because only trusted rewrite code clones.

use thiserror::Error;

use crate::id::{ComputationId, InstrId};
use crate::opcode::{Family, Opcode};
use crate::shape::Shape;

/// A rejected instruction construction or graph edit.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("{opcode}: expected {expected} operands, got {actual}")]
    ArityMismatch {
        opcode: Opcode,
        expected: usize,
        actual: usize,
    },

    #[error("{opcode}: axis {axis} is out of range for rank {rank}")]
    AxisOutOfRange { opcode: Opcode, axis: i64, rank: usize },

    #[error("{opcode}: axis {axis} appears more than once")]
    DuplicateAxis { opcode: Opcode, axis: i64 },

    #[error("{opcode}: expected {expected} axes, got {actual}")]
    AxisCountMismatch {
        opcode: Opcode,
        expected: usize,
        actual: usize,
    },

    #[error("slice: dimension {dimension} has start {start}, limit {limit}, stride {stride}")]
    MalformedSlice {
        dimension: usize,
        start: i64,
        limit: i64,
        stride: i64,
    },

    #[error("{opcode}: expected shape {expected}, got {actual}")]
    ShapeMismatch {
        opcode: Opcode,
        expected: Shape,
        actual: Shape,
    },

    #[error("{opcode}: {message}")]
    InvalidAttribute { opcode: Opcode, message: String },

    #[error("{opcode}: operand must be {expected}, got {actual}")]
    UnpairedDone {
        opcode: Opcode,
        expected: Opcode,
        actual: Opcode,
    },

    #[error("{opcode}: attributes of family {actual:?} do not match family {expected:?}")]
    FamilyMismatch {
        opcode: Opcode,
        expected: Family,
        actual: Family,
    },

    #[error("{opcode}: {feature} is not supported")]
    Unsupported {
        opcode: Opcode,
        feature: &'static str,
    },

    #[error("unknown instruction {0}")]
    UnknownInstruction(InstrId),

    #[error("unknown computation {0}")]
    UnknownComputation(ComputationId),

    #[error("operand {operand} does not belong to computation {computation}")]
    ForeignOperand {
        operand: InstrId,
        computation: ComputationId,
    },

    #[error("instruction {id} still has {users} users")]
    StillInUse { id: InstrId, users: usize },

    #[error("channel {channel_id}: {message}")]
    ChannelPairing { channel_id: i64, message: String },
}

/// Failure to decode or reconstruct a serialized module.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown opcode '{0}'")]
    UnknownOpcode(String),

    #[error("{opcode}: missing field '{field}'")]
    MissingField { opcode: Opcode, field: &'static str },

    #[error("instruction {0} is referenced before it is defined")]
    DanglingInstruction(i64),

    #[error("computation {0} is referenced before it is defined")]
    DanglingComputation(i64),

    #[error("instruction id {0} is defined more than once")]
    DuplicateInstruction(i64),

    #[error("computation id {0} is defined more than once")]
    DuplicateComputation(i64),

    #[error("computation '{0}' has no instructions")]
    EmptyComputation(String),

    #[error(transparent)]
    Build(#[from] BuildError),
}
