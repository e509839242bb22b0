//! Common operator type families
//!
//! Type-tag sets used by the built-in passes. The operator domain is open:
//! these are plain string lists fed into a slot's accepted-type set, not a
//! closed enum.

/// Operators that forward their single input unchanged
pub const PASS_THROUGH_OPS: &[&str] = &[
    "Identity",
    "Copy",
    "Dropout",
    "StopGradient",
    "Snapshot",
];

/// Compile-time constant producers
pub const CONSTANT_OPS: &[&str] = &["Const", "Constant"];

/// Convolution-like operations
pub const CONV_LIKE: &[&str] = &["Conv", "ConvTranspose", "DepthwiseConv"];

/// Activation operations that fuse into a preceding convolution
pub const ACTIVATIONS: &[&str] = &[
    "Relu",
    "Relu6",
    "LeakyRelu",
    "Sigmoid",
    "Tanh",
    "Elu",
];

/// Quantization boundaries
pub const QUANT_OPS: &[&str] = &["Quant", "QuantizeLinear", "DequantizeLinear"];

/// Check if an op type forwards its input unchanged
pub fn is_pass_through(op_type: &str) -> bool {
    PASS_THROUGH_OPS.contains(&op_type)
}

/// Check if an op type produces a compile-time constant
pub fn is_constant_op(op_type: &str) -> bool {
    CONSTANT_OPS.contains(&op_type)
}

/// Check if an op type is a convolution-like operation
pub fn is_conv_like(op_type: &str) -> bool {
    CONV_LIKE.contains(&op_type)
}

/// Check if an op type is an activation function
pub fn is_activation(op_type: &str) -> bool {
    ACTIVATIONS.contains(&op_type)
}

/// Check if an op type is a quantization boundary
pub fn is_quant(op_type: &str) -> bool {
    QUANT_OPS.contains(&op_type)
}
