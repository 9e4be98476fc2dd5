// opcode.rs — Operation tags
//
// Every opcode names exactly one attribute family. The family is what the
// four node operations dispatch on; the opcode only refines behaviour inside
// a family (e.g. which operands a batch-norm variant takes).

use std::fmt;
use std::str::FromStr;

/// Enumerated operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    Parameter,
    Constant,
    Add,
    Subtract,
    Multiply,
    Maximum,
    Negate,
    BatchNormTraining,
    BatchNormInference,
    BatchNormGrad,
    Fft,
    Send,
    SendDone,
    Recv,
    RecvDone,
    Reverse,
    Concatenate,
    Reduce,
    Transpose,
    Broadcast,
    Map,
    Slice,
}

/// Attribute family selected by an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    None,
    Parameter,
    Constant,
    BatchNorm,
    Fft,
    Channel,
    Dimensions,
    Reduce,
    Map,
    Slice,
}

/// All opcodes in declaration order.
pub const ALL_OPCODES: [Opcode; 22] = [
    Opcode::Parameter,
    Opcode::Constant,
    Opcode::Add,
    Opcode::Subtract,
    Opcode::Multiply,
    Opcode::Maximum,
    Opcode::Negate,
    Opcode::BatchNormTraining,
    Opcode::BatchNormInference,
    Opcode::BatchNormGrad,
    Opcode::Fft,
    Opcode::Send,
    Opcode::SendDone,
    Opcode::Recv,
    Opcode::RecvDone,
    Opcode::Reverse,
    Opcode::Concatenate,
    Opcode::Reduce,
    Opcode::Transpose,
    Opcode::Broadcast,
    Opcode::Map,
    Opcode::Slice,
];

impl Opcode {
    /// Stable text name, shared by the printer and the wire format.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Parameter => "parameter",
            Opcode::Constant => "constant",
            Opcode::Add => "add",
            Opcode::Subtract => "subtract",
            Opcode::Multiply => "multiply",
            Opcode::Maximum => "maximum",
            Opcode::Negate => "negate",
            Opcode::BatchNormTraining => "batch-norm-training",
            Opcode::BatchNormInference => "batch-norm-inference",
            Opcode::BatchNormGrad => "batch-norm-grad",
            Opcode::Fft => "fft",
            Opcode::Send => "send",
            Opcode::SendDone => "send-done",
            Opcode::Recv => "recv",
            Opcode::RecvDone => "recv-done",
            Opcode::Reverse => "reverse",
            Opcode::Concatenate => "concatenate",
            Opcode::Reduce => "reduce",
            Opcode::Transpose => "transpose",
            Opcode::Broadcast => "broadcast",
            Opcode::Map => "map",
            Opcode::Slice => "slice",
        }
    }

    pub fn family(self) -> Family {
        match self {
            Opcode::Parameter => Family::Parameter,
            Opcode::Constant => Family::Constant,
            Opcode::Add
            | Opcode::Subtract
            | Opcode::Multiply
            | Opcode::Maximum
            | Opcode::Negate => Family::None,
            Opcode::BatchNormTraining | Opcode::BatchNormInference | Opcode::BatchNormGrad => {
                Family::BatchNorm
            }
            Opcode::Fft => Family::Fft,
            Opcode::Send | Opcode::SendDone | Opcode::Recv | Opcode::RecvDone => Family::Channel,
            Opcode::Reverse | Opcode::Concatenate | Opcode::Transpose | Opcode::Broadcast => {
                Family::Dimensions
            }
            Opcode::Reduce => Family::Reduce,
            Opcode::Map => Family::Map,
            Opcode::Slice => Family::Slice,
        }
    }

    pub fn is_elementwise_binary(self) -> bool {
        matches!(
            self,
            Opcode::Add | Opcode::Subtract | Opcode::Multiply | Opcode::Maximum
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Opcode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_OPCODES
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| format!("unknown opcode '{}'", s))
    }
}
