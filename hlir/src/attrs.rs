// attrs.rs — Opcode-specific attribute payloads
//
// Pure data. One `Attributes` variant per family; families whose opcodes
// share fields (the three batch-norm variants, the four channel ops, the
// dimension-list ops) share one payload struct rather than a type chain.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{ComputationId, InstrId};
use crate::opcode::Family;

/// Fields shared by batch-norm training, inference and grad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchNormAttrs {
    /// Added to the variance to avoid division by zero.
    pub epsilon: f32,
    /// Index of the feature dimension of the operand.
    pub feature_index: i64,
}

/// Frequency-domain transform kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FftType {
    Fft,
    Ifft,
    Rfft,
    Irfft,
}

impl fmt::Display for FftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FftType::Fft => "FFT",
            FftType::Ifft => "IFFT",
            FftType::Rfft => "RFFT",
            FftType::Irfft => "IRFFT",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FftAttrs {
    pub fft_type: FftType,
    pub fft_length: Vec<i64>,
}

/// Channel identifier shared by the two halves of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelAttrs {
    pub channel_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceAttrs {
    pub dimensions: Vec<i64>,
    pub to_apply: ComputationId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapAttrs {
    pub dimensions: Vec<i64>,
    pub to_apply: ComputationId,
    /// Constant operands bound to every application. Always empty today:
    /// construction rejects a non-empty list.
    pub static_operands: Vec<InstrId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceAttrs {
    pub starts: Vec<i64>,
    /// Exclusive upper bounds.
    pub limits: Vec<i64>,
    pub strides: Vec<i64>,
    /// Optimizer hint: the slice may be lowered to an offset into the operand.
    /// Not part of structural identity.
    pub in_place: bool,
}

impl SliceAttrs {
    /// Extent of dimension `i` of the result: `ceil((limit - start) / stride)`.
    /// Requires `0 <= start <= limit` and `stride >= 1`; exact for any stride.
    pub fn extent(&self, i: usize) -> i64 {
        let span = self.limits[i] - self.starts[i];
        let stride = self.strides[i];
        span / stride + i64::from(span % stride != 0)
    }
}

/// The active payload of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Attributes {
    None,
    Parameter { number: i64 },
    Constant { value: f64 },
    BatchNorm(BatchNormAttrs),
    Fft(FftAttrs),
    Channel(ChannelAttrs),
    /// Reverse, transpose, broadcast; concatenate stores its single axis here.
    Dimensions(Vec<i64>),
    Reduce(ReduceAttrs),
    Map(MapAttrs),
    Slice(SliceAttrs),
}

impl Attributes {
    pub fn family(&self) -> Family {
        match self {
            Attributes::None => Family::None,
            Attributes::Parameter { .. } => Family::Parameter,
            Attributes::Constant { .. } => Family::Constant,
            Attributes::BatchNorm(_) => Family::BatchNorm,
            Attributes::Fft(_) => Family::Fft,
            Attributes::Channel(_) => Family::Channel,
            Attributes::Dimensions(_) => Family::Dimensions,
            Attributes::Reduce(_) => Family::Reduce,
            Attributes::Map(_) => Family::Map,
            Attributes::Slice(_) => Family::Slice,
        }
    }

    /// The axis list of the dimension-bearing families; empty otherwise.
    pub fn dimensions(&self) -> &[i64] {
        match self {
            Attributes::Dimensions(dims) => dims,
            Attributes::Reduce(r) => &r.dimensions,
            Attributes::Map(m) => &m.dimensions,
            _ => &[],
        }
    }

    /// Sub-computations referenced by this payload.
    pub fn called_computations(&self) -> Vec<ComputationId> {
        match self {
            Attributes::Reduce(r) => vec![r.to_apply],
            Attributes::Map(m) => vec![m.to_apply],
            _ => Vec::new(),
        }
    }
}
