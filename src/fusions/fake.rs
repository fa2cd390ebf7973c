//! Passes of the `fake` backend
//!
//! A small backend used to exercise every pattern construct end to end:
//!
//! | Pass              | Pattern                                              | Priority |
//! |-------------------|------------------------------------------------------|----------|
//! | `conv_bias_act`   | conv -> bias_add? -> (relu \| gelu)                  | 9.0      |
//! | `reorder_relu`    | reorder -> relu                                      | 8.5      |
//! | `matmul_post_ops` | matmul -> binary{1,4}                                | 8.0      |
//! | `eltwise_chain`   | activation{2,}                                       | 1.0      |

use crate::error::FusionResult;
use crate::pass::PassRegistry;
use crate::pattern::{
    in_edge, input_count, output_count, PatternGraph, ACTIVATIONS, BINARY_OPS, CONV_LIKE,
    MATMUL_LIKE, REPEAT_UNBOUNDED,
};

/// Backend name
pub const FAKE_BACKEND: &str = "fake";

/// Maximum number of post-ops fused behind a matmul
pub const MAX_POST_OPS: usize = 4;

/// Register every `fake` pass
pub fn register_fake_backend_passes(registry: &mut PassRegistry) -> FusionResult<()> {
    registry
        .register_pass(FAKE_BACKEND, "conv_bias_act", conv_bias_act)?
        .set_priority(9.0);
    registry
        .register_pass(FAKE_BACKEND, "reorder_relu", reorder_relu)?
        .set_priority(8.5);
    registry
        .register_pass(FAKE_BACKEND, "matmul_post_ops", matmul_post_ops)?
        .set_priority(8.0);
    registry
        .register_pass(FAKE_BACKEND, "eltwise_chain", eltwise_chain)?
        .set_priority(1.0);
    Ok(())
}

/// Single op wrapped with input 0 and output 0 as external ports
fn unary_body(name: &str, kind: &str) -> PatternGraph {
    let mut body = PatternGraph::new(name);
    let op = body.append_op(kind, &[]);
    body.create_input_port(0, op, 0).create_output_port(0, op, 0);
    body
}

/// reorder -> relu
pub fn reorder_relu(pg: &mut PatternGraph) {
    let reorder = pg.append_op("reorder", &[]);
    let relu = pg.append_op("relu", &[in_edge(0, reorder, 0)]);
    pg.create_input_port(0, reorder, 0)
        .create_output_port(0, relu, 0);
}

/// conv -> optional bias_add -> relu or gelu
///
/// Inputs are `[src, weight]`, followed by `bias` when the bias_add is
/// present.
pub fn conv_bias_act(pg: &mut PatternGraph) {
    let conv = pg.append_op_any_of(CONV_LIKE, &[]);
    pg.add_predicate(conv, input_count(2));

    let mut bias_body = PatternGraph::new("bias");
    let bias_add = bias_body.append_op("bias_add", &[]);
    bias_body
        .create_input_port(0, bias_add, 0)
        .create_input_port(1, bias_add, 1)
        .create_output_port(0, bias_add, 0);
    let bias = pg.append_optional(bias_body, &[in_edge(0, conv, 0)]);

    let act = pg.append_alternation(
        vec![unary_body("relu", "relu"), unary_body("gelu", "gelu")],
        &[in_edge(0, bias, 0)],
    );

    pg.create_input_port(0, conv, 0)
        .create_input_port(1, conv, 1)
        .create_input_port(2, bias, 1)
        .create_output_port(0, act, 0);
}

/// matmul followed by one to four binary post-ops
///
/// Inputs are `[src, weight]` followed by the other operand of each post-op
/// in chain order.
pub fn matmul_post_ops(pg: &mut PatternGraph) {
    let matmul = pg.append_op_any_of(MATMUL_LIKE, &[]);
    pg.add_predicate(matmul, input_count(2));

    let mut body = PatternGraph::new("post_op");
    let binary = body.append_op_any_of(BINARY_OPS, &[]);
    body.add_predicate(binary, input_count(2))
        .allow_commutative_inputs(binary)
        .create_input_port(0, binary, 0)
        .create_input_port(1, binary, 1)
        .create_output_port(0, binary, 0);
    let post = pg.append_repetition(body, (0, 0), 1, MAX_POST_OPS, &[in_edge(0, matmul, 0)]);

    pg.create_input_port(0, matmul, 0)
        .create_input_port(1, matmul, 1)
        .create_input_port(2, post, 1)
        .create_output_port(0, post, 0);
}

/// Two or more chained activations
pub fn eltwise_chain(pg: &mut PatternGraph) {
    let mut body = PatternGraph::new("activation");
    let act = body.append_op_any_of(ACTIVATIONS, &[]);
    body.add_predicate(act, input_count(1))
        .add_predicate(act, output_count(1))
        .create_input_port(0, act, 0)
        .create_output_port(0, act, 0);
    pg.append_repetition(body, (0, 0), 2, REPEAT_UNBOUNDED, &[]);
}
