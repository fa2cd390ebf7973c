//! Common op kinds and predicates
//!
//! Kind sets and decision functions shared by pattern factories.

use crate::graph::{AttrValue, Op};

/// Element-wise unary activations
pub const ACTIVATIONS: &[&str] = &[
    "relu",
    "gelu",
    "sigmoid",
    "tanh",
    "elu",
    "swish",
    "hardswish",
    "clamp",
];

/// Element-wise binary operations
pub const BINARY_OPS: &[&str] = &["add", "sub", "mul", "div", "maximum", "minimum"];

/// Convolution-like operations
pub const CONV_LIKE: &[&str] = &["conv", "conv_transpose"];

/// Matrix multiplication operations
pub const MATMUL_LIKE: &[&str] = &["matmul", "batch_matmul"];

// ============================================================================
// Decision functions
// ============================================================================

/// Op has exactly `n` inputs
pub fn input_count(n: usize) -> impl Fn(&Op) -> bool + Send + Sync + 'static {
    move |op| op.inputs.len() == n
}

/// Op has exactly `n` outputs
pub fn output_count(n: usize) -> impl Fn(&Op) -> bool + Send + Sync + 'static {
    move |op| op.outputs.len() == n
}

/// Attribute `name` is present and equals `value`
pub fn attr_equals(
    name: &str,
    value: impl Into<AttrValue>,
) -> impl Fn(&Op) -> bool + Send + Sync + 'static {
    let name = name.to_string();
    let value = value.into();
    move |op| op.get_attr(&name) == Some(&value)
}

/// Attribute `name` is absent
pub fn attr_absent(name: &str) -> impl Fn(&Op) -> bool + Send + Sync + 'static {
    let name = name.to_string();
    move |op| !op.has_attr(&name)
}

/// Op is not the result of an earlier fusion
pub fn not_fused(op: &Op) -> bool {
    !op.is_fused()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_predicates() {
        let op = Op::new("add").with_inputs([crate::graph::TensorId(0), crate::graph::TensorId(1)]);
        assert!(input_count(2)(&op));
        assert!(!input_count(1)(&op));
        assert!(output_count(0)(&op));
    }

    #[test]
    fn test_attr_predicates() {
        let op = Op::new("relu").with_attr("alpha", 0.0f32);
        assert!(attr_equals("alpha", 0.0f32)(&op));
        assert!(!attr_equals("alpha", 0.5f32)(&op));
        assert!(!attr_equals("beta", 0.0f32)(&op));
        assert!(attr_absent("beta")(&op));
        assert!(!attr_absent("alpha")(&op));
        assert!(not_fused(&op));
    }
}
