//! Graph container
//!
//! `Graph` is the live target of matching and fusion. It keeps the ops in
//! insertion order and a tensor table with producer/consumer ports for O(1)
//! traversal in either direction.

use super::maps::{OpMap, Port, TensorEntry, TensorMap};
use super::op::{Op, OpId, TensorId};

/// Data-flow graph of tensor operations
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Maps op id → Op (preserves insertion order)
    pub(super) ops: OpMap,

    /// Maps tensor id → producer/consumer ports
    pub(super) tensors: TensorMap,

    /// Tensors observed from outside the graph
    pub(super) outputs: Vec<TensorId>,

    pub(super) next_op: u32,
    pub(super) next_tensor: u32,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Op accessors
    // ========================================================================

    /// Get an op by id
    pub fn op(&self, id: OpId) -> Option<&Op> {
        self.ops.get(&id)
    }

    /// Check if an op exists
    pub fn contains_op(&self, id: OpId) -> bool {
        self.ops.contains_key(&id)
    }

    /// Number of live ops
    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    /// Iterate over ops in insertion order
    pub fn ops(&self) -> impl Iterator<Item = (OpId, &Op)> {
        self.ops.iter().map(|(id, op)| (*id, op))
    }

    /// Op ids in insertion order
    pub fn op_ids(&self) -> Vec<OpId> {
        self.ops.keys().copied().collect()
    }

    /// Position of an op in insertion order
    pub fn op_index(&self, id: OpId) -> Option<usize> {
        self.ops.get_index_of(&id)
    }

    /// Ids of ops of the given kind
    pub fn find_ops_by_kind(&self, kind: &str) -> Vec<OpId> {
        self.ops
            .iter()
            .filter(|(_, op)| op.kind == kind)
            .map(|(id, _)| *id)
            .collect()
    }

    // ========================================================================
    // Tensor accessors
    // ========================================================================

    /// Get a tensor entry
    pub fn tensor(&self, id: TensorId) -> Option<&TensorEntry> {
        self.tensors.get(&id)
    }

    /// Check if a tensor exists
    pub fn contains_tensor(&self, id: TensorId) -> bool {
        self.tensors.contains_key(&id)
    }

    /// Number of tensors
    pub fn tensor_count(&self) -> usize {
        self.tensors.len()
    }

    /// Producer port of a tensor
    pub fn producer(&self, tensor: TensorId) -> Option<Port> {
        self.tensors.get(&tensor).and_then(|t| t.producer)
    }

    /// Producer op of a tensor
    pub fn producer_op(&self, tensor: TensorId) -> Option<OpId> {
        self.producer(tensor).map(|p| p.op)
    }

    /// Consumer ports of a tensor
    pub fn consumers(&self, tensor: TensorId) -> &[Port] {
        self.tensors
            .get(&tensor)
            .map(|t| t.consumers.as_slice())
            .unwrap_or(&[])
    }

    /// Check if a tensor is fed from outside the graph
    pub fn is_graph_input(&self, tensor: TensorId) -> bool {
        self.tensors
            .get(&tensor)
            .map(|t| t.graph_input)
            .unwrap_or(false)
    }

    /// Check if a tensor is a graph output
    pub fn is_graph_output(&self, tensor: TensorId) -> bool {
        self.outputs.contains(&tensor)
    }

    /// Graph outputs in declaration order
    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }

    /// Check if a tensor is consumed exactly once and is not a graph output
    pub fn is_single_use(&self, tensor: TensorId) -> bool {
        self.consumers(tensor).len() == 1 && !self.is_graph_output(tensor)
    }
}
