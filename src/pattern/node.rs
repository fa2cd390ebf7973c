//! Pattern node records
//!
//! A pattern graph is an arena of [`PatternNode`]s addressed by
//! [`PatternNodeId`]. Edges are stored on the consumer side as [`InEdge`]s
//! pointing back at an earlier node, so every pattern is a DAG by
//! construction.

use std::fmt;
use std::sync::Arc;

use crate::graph::Op;

use super::builder::PatternGraph;

/// Index of a node inside its pattern graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternNodeId(pub usize);

impl fmt::Display for PatternNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Shared predicate over a concrete op
pub type OpPredicate = Arc<dyn Fn(&Op) -> bool + Send + Sync>;

/// Predicate over the kind of an op
#[derive(Clone)]
pub enum KindPredicate {
    /// Any op
    Any,
    /// Exactly this kind
    Exact(String),
    /// One of these kinds
    OneOf(Vec<String>),
    /// Arbitrary predicate over the whole op
    Custom(OpPredicate),
}

impl KindPredicate {
    /// Evaluate against an op
    pub fn matches(&self, op: &Op) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(kind) => op.kind == *kind,
            Self::OneOf(kinds) => kinds.iter().any(|k| *k == op.kind),
            Self::Custom(f) => f(op),
        }
    }
}

impl fmt::Debug for KindPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "Any"),
            Self::Exact(kind) => write!(f, "Exact({})", kind),
            Self::OneOf(kinds) => write!(f, "OneOf({:?})", kinds),
            Self::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

/// Template for a single op
#[derive(Clone)]
pub struct OpPattern {
    /// Kind predicate
    pub kind: KindPredicate,
    /// Additional decision functions, all of which must hold
    pub predicates: Vec<OpPredicate>,
    /// Inputs 0 and 1 may be matched in either order
    pub commutative: bool,
}

impl OpPattern {
    /// Create from a kind predicate
    pub fn new(kind: KindPredicate) -> Self {
        Self {
            kind,
            predicates: Vec::new(),
            commutative: false,
        }
    }

    /// Evaluate kind and decision functions against an op
    pub fn matches(&self, op: &Op) -> bool {
        self.kind.matches(op) && self.predicates.iter().all(|p| p(op))
    }
}

impl fmt::Debug for OpPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpPattern")
            .field("kind", &self.kind)
            .field("predicates", &self.predicates.len())
            .field("commutative", &self.commutative)
            .finish()
    }
}

/// Upper bound for repetitions with no limit
pub const REPEAT_UNBOUNDED: usize = usize::MAX;

/// A body repeated over a chain of iterations
#[derive(Debug, Clone)]
pub struct Repetition {
    /// The repeated sub-pattern
    pub body: PatternGraph,
    /// Body output port feeding the body input port of the next iteration
    pub port_map: (usize, usize),
    /// Minimum iteration count (0 makes the node optional)
    pub min: usize,
    /// Maximum iteration count, inclusive
    pub max: usize,
}

impl Repetition {
    /// Chain output port of the body
    pub fn chain_out(&self) -> usize {
        self.port_map.0
    }

    /// Chain input port of the body
    pub fn chain_in(&self) -> usize {
        self.port_map.1
    }
}

/// What a pattern node matches
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// A single op
    Op(OpPattern),
    /// The first of several nested sub-patterns that matches
    Alternation(Vec<PatternGraph>),
    /// A chain of repeated sub-patterns
    Repetition(Box<Repetition>),
}

/// Producer of one input slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InEdge {
    /// Input slot on the consumer node
    pub port: usize,
    /// Producer node
    pub producer: PatternNodeId,
    /// Output offset on the producer node
    pub offset: usize,
}

/// Shorthand for building an [`InEdge`]
pub fn in_edge(port: usize, producer: PatternNodeId, offset: usize) -> InEdge {
    InEdge {
        port,
        producer,
        offset,
    }
}

/// A `(node, port)` pair, used for external ports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRef {
    /// Node inside the pattern graph
    pub node: PatternNodeId,
    /// Input slot or output offset on that node
    pub port: usize,
}

/// One node of a pattern graph
#[derive(Debug, Clone)]
pub struct PatternNode {
    /// Position in the arena
    pub id: PatternNodeId,
    /// What the node matches
    pub kind: NodeKind,
    /// Wired input slots, sorted by port
    pub inputs: Vec<InEdge>,
    /// Matched for its edges only; the bound op is not part of the match
    pub context: bool,
}

impl PatternNode {
    /// Whether the node must bind at least one op
    pub fn is_mandatory(&self) -> bool {
        match &self.kind {
            NodeKind::Op(_) | NodeKind::Alternation(_) => true,
            NodeKind::Repetition(rep) => rep.min > 0,
        }
    }

    /// Producer edge of an input slot
    pub fn input_edge(&self, port: usize) -> Option<&InEdge> {
        self.inputs.iter().find(|e| e.port == port)
    }

    /// The op template, for single-op nodes
    pub fn op_pattern(&self) -> Option<&OpPattern> {
        match &self.kind {
            NodeKind::Op(p) => Some(p),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_predicates() {
        let relu = Op::new("relu");
        assert!(KindPredicate::Any.matches(&relu));
        assert!(KindPredicate::Exact("relu".into()).matches(&relu));
        assert!(!KindPredicate::Exact("gelu".into()).matches(&relu));
        assert!(KindPredicate::OneOf(vec!["gelu".into(), "relu".into()]).matches(&relu));
        assert!(KindPredicate::Custom(Arc::new(|op| op.kind.starts_with("re"))).matches(&relu));
    }

    #[test]
    fn test_op_pattern_decision_functions() {
        let mut pattern = OpPattern::new(KindPredicate::Exact("relu".into()));
        pattern
            .predicates
            .push(Arc::new(|op: &Op| op.get_attr_float("alpha", 0.0) == 0.0));

        assert!(pattern.matches(&Op::new("relu")));
        assert!(!pattern.matches(&Op::new("relu").with_attr("alpha", 0.1f32)));
    }
}
