//! Pattern graphs and the nested matcher
//!
//! This module provides the declarative side of fusion: a [`PatternGraph`]
//! describes a template subgraph, and [`NestedMatcher`] finds its
//! occurrences in a live [`Graph`](crate::graph::Graph).
//!
//! # Overview
//!
//! A pattern graph is an arena of nodes. Each node is one of
//!
//! 1. an op node: kind predicate plus optional decision functions
//! 2. an alternation: ordered nested graphs, the first match commits
//! 3. a repetition: a nested body chained through a port map, `[min, max]`
//!    times; an optional node is a repetition `[0, 1]`
//!
//! External ports name the slots that become the fused op's inputs and
//! outputs.
//!
//! # Example
//!
//! ```
//! use graph_fusion::graph::{Graph, Op};
//! use graph_fusion::pattern::{in_edge, NestedMatcher, PatternGraph};
//!
//! let mut graph = Graph::new();
//! let x = graph.add_input("x");
//! let t = graph.add_tensor("t");
//! let y = graph.add_tensor("y");
//! graph.add_op(Op::new("reorder").with_inputs([x]).with_outputs([t])).unwrap();
//! graph.add_op(Op::new("relu").with_inputs([t]).with_outputs([y])).unwrap();
//! graph.mark_output(y).unwrap();
//!
//! let mut pg = PatternGraph::new("reorder_relu");
//! let reorder = pg.append_op("reorder", &[]);
//! let relu = pg.append_op("relu", &[in_edge(0, reorder, 0)]);
//! pg.create_input_port(0, reorder, 0);
//! pg.create_output_port(0, relu, 0);
//!
//! let matcher = NestedMatcher::new(&graph);
//! assert_eq!(matcher.matches(&pg).count(), 1);
//! ```
//!
//! # Traversal
//!
//! [`traversal`] holds the cycle check run before contracting a match.

pub mod builder;
pub mod embedding;
pub mod matcher;
pub mod node;
pub mod ops;
pub mod traversal;

// Re-export main types
pub use builder::PatternGraph;
pub use embedding::{Binding, Endpoint, Match, PortTensor, SubMatch};
pub use matcher::{Anchor, NestedMatcher};
pub use node::{
    in_edge, InEdge, KindPredicate, NodeKind, OpPattern, OpPredicate, PatternNode, PatternNodeId,
    PortRef, Repetition, REPEAT_UNBOUNDED,
};
pub use ops::{attr_absent, attr_equals, input_count, not_fused, output_count};
pub use traversal::creates_cycle;

// Re-export kind sets
pub use ops::{ACTIVATIONS, BINARY_OPS, CONV_LIKE, MATMUL_LIKE};
