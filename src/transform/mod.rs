//! Pattern utilities: match and fuse
//!
//! This module connects the matcher to the graph rewrite:
//!
//! - [`match_pattern`]: disjoint, cycle-safe matches of one pattern
//! - [`fuse`]: replace each match by a single fused op
//!
//! # Overview
//!
//! Matching only reads the graph; fusing mutates it. A pass therefore
//! collects all of its matches first and then applies them as one batch.
//!
//! # Example
//!
//! ```
//! use graph_fusion::graph::{Graph, Op};
//! use graph_fusion::pattern::{in_edge, PatternGraph};
//! use graph_fusion::transform::{fuse, match_pattern};
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
//! let matches = match_pattern(&graph, &pg);
//! let report = fuse(&mut graph, &matches).unwrap();
//!
//! assert_eq!(report.fused.len(), 1);
//! assert_eq!(graph.op_count(), 1);
//! ```

pub mod core;
pub mod fuse;

// Re-export main types and functions
pub use self::core::{apply_pattern, apply_until_fixed_point, match_pattern};
pub use fuse::{fuse, fuse_match, FuseReport};
