//! Graph map types
//!
//! Defines the core data structures for efficient graph traversal.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::op::{Op, OpId, TensorId};

/// One endpoint of a tensor: an op and the port offset on that op
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Port {
    /// The op
    pub op: OpId,
    /// Input or output offset on the op
    pub offset: usize,
}

impl Port {
    /// Create a port
    pub fn new(op: OpId, offset: usize) -> Self {
        Self { op, offset }
    }
}

/// Consumer list, optimized for the common case of 1-4 consumers
pub type ConsumerList = SmallVec<[Port; 4]>;

/// Entry in the tensor map - connectivity of one tensor
#[derive(Debug, Clone, Default)]
pub struct TensorEntry {
    /// Debug name
    pub name: String,
    /// Producer port, `None` for graph inputs
    pub producer: Option<Port>,
    /// Consumer ports
    pub consumers: ConsumerList,
    /// Whether the tensor is fed from outside the graph
    pub graph_input: bool,
}

impl TensorEntry {
    /// Create an entry with no endpoints
    pub fn new(name: impl Into<String>, graph_input: bool) -> Self {
        Self {
            name: name.into(),
            graph_input,
            ..Default::default()
        }
    }

    /// Number of consumer ports
    pub fn use_count(&self) -> usize {
        self.consumers.len()
    }
}

/// Type alias for op map: id → Op (insertion order preserved)
pub type OpMap = IndexMap<OpId, Op>;

/// Type alias for tensor map: id → TensorEntry
pub type TensorMap = FxHashMap<TensorId, TensorEntry>;

/// Set of op ids
pub type OpSet = FxHashSet<OpId>;
