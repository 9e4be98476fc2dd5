// shape.rs — Result-type descriptors
//
// A shape is either a dense array (element type + dimension sizes) or a
// tuple of shapes. Printing follows the IR text format: `f32[4,8]`, `u32[]`,
// `(f32[4], u32[])`, and `()` for the empty tuple.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Element type of an array shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Pred,
    S32,
    S64,
    U32,
    F16,
    F32,
    F64,
    C64,
}

impl ElementType {
    pub fn name(self) -> &'static str {
        match self {
            ElementType::Pred => "pred",
            ElementType::S32 => "s32",
            ElementType::S64 => "s64",
            ElementType::U32 => "u32",
            ElementType::F16 => "f16",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
            ElementType::C64 => "c64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result type of an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Array {
        element_type: ElementType,
        dimensions: Vec<i64>,
    },
    Tuple {
        tuple_shapes: Vec<Shape>,
    },
}

impl Shape {
    pub fn array(element_type: ElementType, dimensions: &[i64]) -> Self {
        Shape::Array {
            element_type,
            dimensions: dimensions.to_vec(),
        }
    }

    pub fn scalar(element_type: ElementType) -> Self {
        Self::array(element_type, &[])
    }

    pub fn tuple(tuple_shapes: Vec<Shape>) -> Self {
        Shape::Tuple { tuple_shapes }
    }

    /// The empty tuple, used as the result of completion ops.
    pub fn nil() -> Self {
        Shape::Tuple {
            tuple_shapes: Vec::new(),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Shape::Array { .. })
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Shape::Array { dimensions, .. } if dimensions.is_empty())
    }

    /// Dimension sizes; empty for tuples.
    pub fn dimensions(&self) -> &[i64] {
        match self {
            Shape::Array { dimensions, .. } => dimensions,
            Shape::Tuple { .. } => &[],
        }
    }

    /// Number of dimensions; tuples have rank 0.
    pub fn rank(&self) -> usize {
        self.dimensions().len()
    }

    pub fn element_type(&self) -> Option<ElementType> {
        match self {
            Shape::Array { element_type, .. } => Some(*element_type),
            Shape::Tuple { .. } => None,
        }
    }

    pub fn tuple_shapes(&self) -> &[Shape] {
        match self {
            Shape::Array { .. } => &[],
            Shape::Tuple { tuple_shapes } => tuple_shapes,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Array {
                element_type,
                dimensions,
            } => {
                write!(f, "{}[", element_type)?;
                for (i, d) in dimensions.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", d)?;
                }
                f.write_str("]")
            }
            Shape::Tuple { tuple_shapes } => {
                f.write_str("(")?;
                for (i, s) in tuple_shapes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", s)?;
                }
                f.write_str(")")
            }
        }
    }
}
