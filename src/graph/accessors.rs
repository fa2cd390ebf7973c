//! Structural queries: neighbours, topological order and validation

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::error::{FusionError, FusionResult};

use super::context::Graph;
use super::maps::Port;
use super::op::{OpId, TensorId};

impl Graph {
    /// Ops consuming any output of `id`, deduplicated, in discovery order
    pub fn successors(&self, id: OpId) -> Vec<OpId> {
        let mut out = Vec::new();
        if let Some(op) = self.op(id) {
            for &t in &op.outputs {
                for port in self.consumers(t) {
                    if !out.contains(&port.op) {
                        out.push(port.op);
                    }
                }
            }
        }
        out
    }

    /// Ops producing any input of `id`, deduplicated, in input order
    pub fn predecessors(&self, id: OpId) -> Vec<OpId> {
        let mut out = Vec::new();
        if let Some(op) = self.op(id) {
            for &t in &op.inputs {
                if let Some(p) = self.producer_op(t) {
                    if !out.contains(&p) {
                        out.push(p);
                    }
                }
            }
        }
        out
    }

    /// Topological order of all ops
    ///
    /// Ready ops are released in insertion order, so the result is
    /// deterministic. Fails with [`FusionError::CyclicGraph`] if the graph
    /// has a cycle.
    pub fn topo_order(&self) -> FusionResult<Vec<OpId>> {
        let mut indegree: FxHashMap<OpId, usize> = FxHashMap::default();
        for (id, _) in self.ops() {
            indegree.insert(id, self.predecessors(id).len());
        }

        let mut ready: VecDeque<OpId> = self
            .ops()
            .filter(|(id, _)| indegree[id] == 0)
            .map(|(id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(self.op_count());

        while let Some(id) = ready.pop_front() {
            order.push(id);
            for succ in self.successors(id) {
                if let Some(d) = indegree.get_mut(&succ) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(succ);
                    }
                }
            }
        }

        if order.len() != self.op_count() {
            return Err(FusionError::CyclicGraph(self.op_count() - order.len()));
        }
        Ok(order)
    }

    /// Check that the graph has no cycle
    pub fn is_acyclic(&self) -> bool {
        self.topo_order().is_ok()
    }

    /// Check structural invariants
    ///
    /// - every op port references a live tensor whose port list points back
    /// - every tensor endpoint references a live op
    /// - consumed or output tensors have a producer unless they are graph inputs
    /// - the graph is acyclic
    pub fn validate(&self) -> FusionResult<()> {
        for (id, op) in self.ops() {
            for (offset, &t) in op.inputs.iter().enumerate() {
                let entry = self.tensor(t).ok_or_else(|| dangling(t, id))?;
                if !entry.consumers.contains(&Port::new(id, offset)) {
                    return Err(FusionError::InvalidTensor {
                        tensor: t,
                        reason: format!("missing consumer port {}:{}", id, offset),
                    });
                }
            }
            for (offset, &t) in op.outputs.iter().enumerate() {
                let entry = self.tensor(t).ok_or_else(|| dangling(t, id))?;
                if entry.producer != Some(Port::new(id, offset)) {
                    return Err(FusionError::InvalidTensor {
                        tensor: t,
                        reason: format!("producer is not {}:{}", id, offset),
                    });
                }
            }
        }

        for (&t, entry) in &self.tensors {
            let endpoints = entry.producer.iter().chain(entry.consumers.iter());
            for port in endpoints {
                if !self.contains_op(port.op) {
                    return Err(FusionError::InvalidTensor {
                        tensor: t,
                        reason: format!("references removed op {}", port.op),
                    });
                }
            }
            let observed = !entry.consumers.is_empty() || self.is_graph_output(t);
            if observed && entry.producer.is_none() && !entry.graph_input {
                return Err(FusionError::InvalidTensor {
                    tensor: t,
                    reason: "consumed but has no producer".to_string(),
                });
            }
        }

        for &t in &self.outputs {
            if !self.contains_tensor(t) {
                return Err(FusionError::InvalidTensor {
                    tensor: t,
                    reason: "graph output was removed".to_string(),
                });
            }
        }

        self.topo_order().map(|_| ())
    }
}

fn dangling(tensor: TensorId, op: OpId) -> FusionError {
    FusionError::InvalidTensor {
        tensor,
        reason: format!("referenced by {} but missing", op),
    }
}
