//! Core traits for graph-fusion
//!
//! Defines the interface shared by everything that rewrites a graph in place.

use crate::error::FusionResult;
use crate::graph::Graph;
use crate::pass::PassOutcome;

/// A named rewrite applied to a graph in place
///
/// # Example
///
/// ```
/// use graph_fusion::error::FusionResult;
/// use graph_fusion::graph::Graph;
/// use graph_fusion::pass::PassOutcome;
/// use graph_fusion::traits::GraphPass;
///
/// struct Noop;
///
/// impl GraphPass for Noop {
///     fn name(&self) -> &str {
///         "noop"
///     }
///
///     fn run(&self, _graph: &mut Graph) -> FusionResult<PassOutcome> {
///         Ok(PassOutcome::new(self.name()))
///     }
/// }
///
/// let outcome = Noop.run(&mut Graph::new()).unwrap();
/// assert!(!outcome.is_hit());
/// ```
pub trait GraphPass {
    /// Name reported in diagnostics and outcomes
    fn name(&self) -> &str;

    /// Rewrite the graph and report what changed
    fn run(&self, graph: &mut Graph) -> FusionResult<PassOutcome>;
}

/// Passes applied one after another
#[derive(Default)]
pub struct PassChain {
    passes: Vec<Box<dyn GraphPass>>,
}

impl PassChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pass
    #[allow(clippy::should_implement_trait)]
    pub fn add<P: GraphPass + 'static>(mut self, pass: P) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Number of passes
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Run every pass and collect their outcomes
    pub fn run_all(&self, graph: &mut Graph) -> FusionResult<Vec<PassOutcome>> {
        self.passes.iter().map(|pass| pass.run(graph)).collect()
    }
}

impl GraphPass for PassChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn run(&self, graph: &mut Graph) -> FusionResult<PassOutcome> {
        let mut total = PassOutcome::new(self.name());
        for pass in &self.passes {
            total.absorb(pass.run(graph)?);
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Op;

    /// Removes every op of one kind
    struct DropKind(&'static str);

    impl GraphPass for DropKind {
        fn name(&self) -> &str {
            self.0
        }

        fn run(&self, graph: &mut Graph) -> FusionResult<PassOutcome> {
            let mut outcome = PassOutcome::new(self.name());
            for id in graph.find_ops_by_kind(self.0) {
                graph.remove_op(id);
                outcome.removed_ops.push(id);
            }
            outcome.matches = outcome.removed_ops.len();
            Ok(outcome)
        }
    }

    #[test]
    fn test_pass_chain() {
        let mut graph = Graph::new();
        graph.add_op(Op::new("a")).unwrap();
        graph.add_op(Op::new("b")).unwrap();
        graph.add_op(Op::new("c")).unwrap();

        let chain = PassChain::new().add(DropKind("a")).add(DropKind("b"));
        assert_eq!(chain.len(), 2);

        let outcome = chain.run(&mut graph).unwrap();
        assert_eq!(outcome.matches, 2);
        assert_eq!(outcome.removed_ops.len(), 2);
        assert_eq!(graph.op_count(), 1);
    }

    #[test]
    fn test_run_all_keeps_per_pass_outcomes() {
        let mut graph = Graph::new();
        graph.add_op(Op::new("a")).unwrap();

        let chain = PassChain::new().add(DropKind("a")).add(DropKind("z"));
        let outcomes = chain.run_all(&mut graph).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_hit());
        assert!(!outcomes[1].is_hit());
    }
}
