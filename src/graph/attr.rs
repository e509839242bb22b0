//! Node attribute values
//!
//! The engine treats attributes as opaque typed values; only const-to-attr
//! needs to convert between a constant tensor and a typed attribute.

/// Element storage of a constant tensor
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    /// Integer elements
    Int(Vec<i64>),
    /// Floating point elements
    Float(Vec<f32>),
}

impl TensorData {
    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            TensorData::Int(v) => v.len(),
            TensorData::Float(v) => v.len(),
        }
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A constant tensor value
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    /// Shape (empty for scalars)
    pub dims: Vec<i64>,
    /// Flattened elements
    pub data: TensorData,
}

impl Tensor {
    /// Scalar integer tensor
    pub fn scalar_i64(value: i64) -> Self {
        Self {
            dims: Vec::new(),
            data: TensorData::Int(vec![value]),
        }
    }

    /// Scalar float tensor
    pub fn scalar_f32(value: f32) -> Self {
        Self {
            dims: Vec::new(),
            data: TensorData::Float(vec![value]),
        }
    }

    /// 1-D integer tensor
    pub fn from_i64s(values: Vec<i64>) -> Self {
        Self {
            dims: vec![values.len() as i64],
            data: TensorData::Int(values),
        }
    }

    /// 1-D float tensor
    pub fn from_f32s(values: Vec<f32>) -> Self {
        Self {
            dims: vec![values.len() as i64],
            data: TensorData::Float(values),
        }
    }

    /// Whether the tensor holds exactly one element
    pub fn is_scalar_like(&self) -> bool {
        self.data.len() == 1 && self.dims.iter().all(|&d| d == 1)
    }
}

/// Typed attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Integer
    Int(i64),
    /// Float
    Float(f32),
    /// Boolean
    Bool(bool),
    /// String
    Str(String),
    /// Integer list
    Ints(Vec<i64>),
    /// Float list
    Floats(Vec<f32>),
    /// Constant tensor
    Tensor(Tensor),
}

/// Kind of attribute requested by an [`AttrSpec`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKind {
    /// Scalar integer
    Int,
    /// Scalar float
    Float,
    /// Integer list
    Ints,
    /// Float list
    Floats,
    /// Tensor kept as is
    Tensor,
}

/// Name and kind of the attribute created by const-to-attr
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttrSpec {
    /// Attribute name on the replacement node
    pub name: String,
    /// Attribute kind the constant is converted to
    pub kind: AttrKind,
}

impl AttrSpec {
    /// Create an attribute spec
    pub fn new(name: &str, kind: AttrKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

impl AttrValue {
    /// Short name of the variant, for logging
    pub fn kind_name(&self) -> &'static str {
        match self {
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Bool(_) => "bool",
            AttrValue::Str(_) => "string",
            AttrValue::Ints(_) => "ints",
            AttrValue::Floats(_) => "floats",
            AttrValue::Tensor(_) => "tensor",
        }
    }

    /// Convert a constant value to the requested attribute kind
    ///
    /// Returns `None` when the value cannot be represented (e.g. a
    /// multi-element tensor requested as a scalar).
    pub fn convert_to(&self, kind: AttrKind) -> Option<AttrValue> {
        match (kind, self) {
            (AttrKind::Tensor, AttrValue::Tensor(t)) => Some(AttrValue::Tensor(t.clone())),
            (AttrKind::Tensor, AttrValue::Int(v)) => {
                Some(AttrValue::Tensor(Tensor::scalar_i64(*v)))
            }
            (AttrKind::Tensor, AttrValue::Float(v)) => {
                Some(AttrValue::Tensor(Tensor::scalar_f32(*v)))
            }
            (AttrKind::Tensor, AttrValue::Ints(v)) => {
                Some(AttrValue::Tensor(Tensor::from_i64s(v.clone())))
            }
            (AttrKind::Tensor, AttrValue::Floats(v)) => {
                Some(AttrValue::Tensor(Tensor::from_f32s(v.clone())))
            }

            (AttrKind::Int, AttrValue::Int(v)) => Some(AttrValue::Int(*v)),
            (AttrKind::Int, AttrValue::Tensor(t)) if t.is_scalar_like() => match &t.data {
                TensorData::Int(v) => Some(AttrValue::Int(v[0])),
                TensorData::Float(_) => None,
            },

            (AttrKind::Float, AttrValue::Float(v)) => Some(AttrValue::Float(*v)),
            (AttrKind::Float, AttrValue::Int(v)) => Some(AttrValue::Float(*v as f32)),
            (AttrKind::Float, AttrValue::Tensor(t)) if t.is_scalar_like() => match &t.data {
                TensorData::Float(v) => Some(AttrValue::Float(v[0])),
                TensorData::Int(v) => Some(AttrValue::Float(v[0] as f32)),
            },

            (AttrKind::Ints, AttrValue::Ints(v)) => Some(AttrValue::Ints(v.clone())),
            (AttrKind::Ints, AttrValue::Int(v)) => Some(AttrValue::Ints(vec![*v])),
            (AttrKind::Ints, AttrValue::Tensor(t)) if t.dims.len() <= 1 => match &t.data {
                TensorData::Int(v) => Some(AttrValue::Ints(v.clone())),
                TensorData::Float(_) => None,
            },

            (AttrKind::Floats, AttrValue::Floats(v)) => Some(AttrValue::Floats(v.clone())),
            (AttrKind::Floats, AttrValue::Float(v)) => Some(AttrValue::Floats(vec![*v])),
            (AttrKind::Floats, AttrValue::Tensor(t)) if t.dims.len() <= 1 => match &t.data {
                TensorData::Float(v) => Some(AttrValue::Floats(v.clone())),
                TensorData::Int(v) => Some(AttrValue::Floats(v.iter().map(|&x| x as f32).collect())),
            },

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_tensor_to_int() {
        let value = AttrValue::Tensor(Tensor::scalar_i64(7));
        assert_eq!(value.convert_to(AttrKind::Int), Some(AttrValue::Int(7)));
    }

    #[test]
    fn test_vector_tensor_to_ints() {
        let value = AttrValue::Tensor(Tensor::from_i64s(vec![0, 2, 3]));
        assert_eq!(
            value.convert_to(AttrKind::Ints),
            Some(AttrValue::Ints(vec![0, 2, 3]))
        );
        // Not a scalar
        assert_eq!(value.convert_to(AttrKind::Int), None);
    }

    #[test]
    fn test_float_tensor_rejected_as_ints() {
        let value = AttrValue::Tensor(Tensor::from_f32s(vec![1.0, 2.0]));
        assert_eq!(value.convert_to(AttrKind::Ints), None);
        assert_eq!(
            value.convert_to(AttrKind::Floats),
            Some(AttrValue::Floats(vec![1.0, 2.0]))
        );
    }

    #[test]
    fn test_string_never_converts() {
        let value = AttrValue::Str("NCHW".to_string());
        assert_eq!(value.convert_to(AttrKind::Tensor), None);
        assert_eq!(value.kind_name(), "string");
    }
}
