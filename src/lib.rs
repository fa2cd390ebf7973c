//! # Graph Fusion
//!
//! Pattern-based subgraph matching and fusion for compute-graph compilers.
//!
//! Backends describe fusible subgraphs declaratively as pattern graphs,
//! register them as passes, and let the engine find and rewrite every
//! occurrence in a data-flow graph.
//!
//! ## Features
//!
//! - **Pattern DSL**: op predicates, optional nodes, repetition, alternation
//!   and external ports
//! - **Nested Matcher**: anchor selection plus backtracking over nested
//!   pattern levels
//! - **Fusion**: disjoint, cycle-safe rewrite of each match into one fused op
//! - **Pass Registry**: per-backend passes with priorities and diagnostics
//!
//! ## Example
//!
//! ```
//! use graph_fusion::prelude::*;
//!
//! let mut registry = PassRegistry::new();
//! register_fake_backend_passes(&mut registry).unwrap();
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
//! let pipeline = PassPipeline::new(&registry, FAKE_BACKEND, config).unwrap();
//! pipeline.run(&mut graph).unwrap();
//!
//! assert_eq!(graph.op_count(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// ============================================================================
// Module declarations
// ============================================================================

pub mod error;
pub mod fusions;
pub mod graph;
pub mod pass;
pub mod pattern;
pub mod traits;
pub mod transform;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use graph_fusion::prelude::*`
pub mod prelude {
    pub use crate::error::{FusionError, FusionResult};
    pub use crate::fusions::{register_fake_backend_passes, FAKE_BACKEND};
    pub use crate::graph::{AttrValue, Graph, Op, OpId, TensorId};
    pub use crate::pass::{
        DiagnosticConfig, DiagnosticSink, PassOutcome, PassPipeline, PassRegistry, PipelineConfig,
        TransformationPass,
    };
    pub use crate::pattern::{in_edge, Match, NestedMatcher, PatternGraph, REPEAT_UNBOUNDED};
    pub use crate::traits::GraphPass;
    pub use crate::transform::{fuse, match_pattern};
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use error::{FusionError, FusionResult};
pub use traits::GraphPass;

// ============================================================================
// Version information
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
