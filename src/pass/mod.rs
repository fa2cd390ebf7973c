//! Pass registry and pattern-driven transformation passes
//!
//! # Overview
//!
//! Backends register passes into a [`PassRegistry`] at setup time. Each pass
//! owns exactly one pattern factory. A [`TransformationPass`] runs one pass:
//! build the pattern, match it, report the hit, fuse. A [`PassPipeline`] runs
//! every enabled pass of a backend in priority order.
//!
//! # Example
//!
//! ```
//! use graph_fusion::graph::{Graph, Op};
//! use graph_fusion::pass::{DiagnosticConfig, PassPipeline, PassRegistry, PipelineConfig};
//! use graph_fusion::pattern::in_edge;
//!
//! let mut registry = PassRegistry::new();
//! registry
//!     .register_pass("fake", "reorder_relu", |pg| {
//!         let reorder = pg.append_op("reorder", &[]);
//!         pg.append_op("relu", &[in_edge(0, reorder, 0)]);
//!     })
//!     .unwrap();
//!
//! let mut graph = Graph::new();
//! let x = graph.add_input("x");
//! let t = graph.add_tensor("t");
//! let y = graph.add_tensor("y");
//! graph.add_op(Op::new("reorder").with_inputs([x]).with_outputs([t])).unwrap();
//! graph.add_op(Op::new("relu").with_inputs([t]).with_outputs([y])).unwrap();
//! graph.mark_output(y).unwrap();
//!
//! let config = PipelineConfig::default().with_diagnostics(DiagnosticConfig::disabled());
//! let pipeline = PassPipeline::new(&registry, "fake", config).unwrap();
//! let stats = pipeline.run(&mut graph).unwrap();
//!
//! assert_eq!(stats.matches, 1);
//! assert_eq!(graph.op_count(), 1);
//! ```

pub mod diagnostics;
pub mod pipeline;
pub mod registry;
pub mod transformation;

// Re-export main types
pub use diagnostics::{
    DiagnosticConfig, DiagnosticSink, SharedWriter, DEFAULT_ENV_PREFIX, DEFAULT_NAMESPACE,
};
pub use pipeline::{PassPipeline, PipelineConfig, PipelineStats};
pub use registry::{pass_key, Pass, PassHandle, PassRegistry, PatternFactory};
pub use transformation::{PassOutcome, TransformationPass};
