//! Graph IR consumed by the matcher and the fuse step
//!
//! This module provides the data-flow graph the engine works on:
//!
//! - [`Graph`]: ops in insertion order plus a tensor table with O(1)
//!   producer/consumer lookups
//! - [`Op`]: kind, ordered input/output tensors and attributes
//! - [`maps`]: port and tensor-entry types
//!
//! # Example
//!
//! ```
//! use graph_fusion::graph::{Graph, Op};
//!
//! let mut graph = Graph::new();
//! let x = graph.add_input("x");
//! let y = graph.add_tensor("y");
//! let relu = graph.add_op(Op::new("relu").with_inputs([x]).with_outputs([y])).unwrap();
//!
//! assert_eq!(graph.producer_op(y), Some(relu));
//! assert!(graph.validate().is_ok());
//! ```
//!
//! # Maps
//!
//! | Map | Description |
//! |-----|-------------|
//! | `ops` | op id → Op (order preserved) |
//! | `tensors` | tensor id → producer port, consumer ports |
//! | `outputs` | tensors observed from outside the graph |

pub mod accessors;
pub mod context;
pub mod maps;
pub mod mutators;
pub mod op;

// Re-export main types
pub use context::Graph;
pub use maps::{ConsumerList, OpMap, OpSet, Port, TensorEntry, TensorMap};
pub use op::{AttrMap, AttrValue, FusedBody, Op, OpId, TensorId};
