//! Graph mutation operations
//!
//! Methods for modifying the graph structure: adding and removing ops and
//! tensors, and (re)connecting tensor endpoints. Every mutator keeps the
//! tensor table consistent with the ops' port lists.

use crate::error::{FusionError, FusionResult};

use super::context::Graph;
use super::maps::{Port, TensorEntry};
use super::op::{AttrValue, Op, OpId, TensorId};

impl Graph {
    // ========================================================================
    // Tensor mutation
    // ========================================================================

    /// Create a tensor fed from outside the graph
    pub fn add_input(&mut self, name: impl Into<String>) -> TensorId {
        self.new_tensor(TensorEntry::new(name, true))
    }

    /// Create an intermediate tensor; it gets its producer from `add_op`
    pub fn add_tensor(&mut self, name: impl Into<String>) -> TensorId {
        self.new_tensor(TensorEntry::new(name, false))
    }

    fn new_tensor(&mut self, entry: TensorEntry) -> TensorId {
        let id = TensorId(self.next_tensor);
        self.next_tensor += 1;
        self.tensors.insert(id, entry);
        id
    }

    /// Mark a tensor as a graph output
    pub fn mark_output(&mut self, tensor: TensorId) -> FusionResult<()> {
        self.check_tensor(tensor)?;
        if !self.outputs.contains(&tensor) {
            self.outputs.push(tensor);
        }
        Ok(())
    }

    /// Remove a tensor that has no endpoints left
    pub fn remove_tensor(&mut self, tensor: TensorId) -> FusionResult<TensorEntry> {
        let entry = self.tensor(tensor).ok_or_else(|| FusionError::InvalidTensor {
            tensor,
            reason: "unknown tensor".to_string(),
        })?;
        if entry.producer.is_some() || !entry.consumers.is_empty() {
            return Err(FusionError::InvalidTensor {
                tensor,
                reason: "tensor is still connected".to_string(),
            });
        }
        if self.is_graph_output(tensor) {
            return Err(FusionError::InvalidTensor {
                tensor,
                reason: "tensor is a graph output".to_string(),
            });
        }
        self.tensors
            .remove(&tensor)
            .ok_or_else(|| FusionError::InvalidTensor {
                tensor,
                reason: "unknown tensor".to_string(),
            })
    }

    // ========================================================================
    // Op mutation
    // ========================================================================

    /// Insert an op and connect its ports
    ///
    /// Fails if a port references an unknown tensor or if an output tensor
    /// already has a producer.
    pub fn add_op(&mut self, op: Op) -> FusionResult<OpId> {
        for &t in op.inputs.iter().chain(op.outputs.iter()) {
            self.check_tensor(t)?;
        }
        for (offset, &t) in op.outputs.iter().enumerate() {
            let entry = &self.tensors[&t];
            if entry.producer.is_some() || entry.graph_input {
                return Err(FusionError::InvalidTensor {
                    tensor: t,
                    reason: format!("already produced, cannot bind to output {}", offset),
                });
            }
            if op.outputs[..offset].contains(&t) {
                return Err(FusionError::InvalidTensor {
                    tensor: t,
                    reason: "listed twice among outputs".to_string(),
                });
            }
        }

        let id = OpId(self.next_op);
        self.next_op += 1;
        self.attach_ports(id, &op);
        self.ops.insert(id, op);
        Ok(id)
    }

    /// Remove an op, disconnecting all of its ports
    ///
    /// Tensors stay in the table; their producer/consumer lists lose the
    /// removed op.
    pub fn remove_op(&mut self, id: OpId) -> Option<Op> {
        let op = self.ops.shift_remove(&id)?;
        self.detach_ports(id, &op);
        Some(op)
    }

    /// Connect `tensor` to input `port` of an op
    ///
    /// `port == inputs.len()` appends a new input.
    pub fn connect_input(&mut self, id: OpId, port: usize, tensor: TensorId) -> FusionResult<()> {
        self.check_tensor(tensor)?;
        let op = self
            .ops
            .get_mut(&id)
            .ok_or_else(|| FusionError::InvalidOp(id.to_string()))?;

        if port < op.inputs.len() {
            let old = std::mem::replace(&mut op.inputs[port], tensor);
            if let Some(entry) = self.tensors.get_mut(&old) {
                entry.consumers.retain(|p| *p != Port::new(id, port));
            }
        } else if port == op.inputs.len() {
            op.inputs.push(tensor);
        } else {
            return Err(FusionError::InvalidOp(format!(
                "{} has {} inputs, cannot connect port {}",
                id,
                op.inputs.len(),
                port
            )));
        }

        if let Some(entry) = self.tensors.get_mut(&tensor) {
            entry.consumers.push(Port::new(id, port));
        }
        Ok(())
    }

    /// Disconnect input `port` of an op; later inputs shift down by one
    pub fn disconnect_input(&mut self, id: OpId, port: usize) -> FusionResult<TensorId> {
        let op = self
            .ops
            .get(&id)
            .ok_or_else(|| FusionError::InvalidOp(id.to_string()))?
            .clone();
        if port >= op.inputs.len() {
            return Err(FusionError::InvalidOp(format!(
                "{} has no input port {}",
                id, port
            )));
        }

        self.detach_ports(id, &op);
        let mut op = op;
        let removed = op.inputs.remove(port);
        self.attach_ports(id, &op);
        if let Some(slot) = self.ops.get_mut(&id) {
            slot.inputs = op.inputs;
        }
        Ok(removed)
    }

    /// Set or update an attribute on a live op
    pub fn set_op_attr(
        &mut self,
        id: OpId,
        name: &str,
        value: impl Into<AttrValue>,
    ) -> FusionResult<()> {
        let op = self
            .ops
            .get_mut(&id)
            .ok_or_else(|| FusionError::InvalidOp(id.to_string()))?;
        op.attrs.insert(name.to_string(), value.into());
        Ok(())
    }

    // ========================================================================
    // Port bookkeeping
    // ========================================================================

    fn check_tensor(&self, tensor: TensorId) -> FusionResult<()> {
        if self.tensors.contains_key(&tensor) {
            Ok(())
        } else {
            Err(FusionError::InvalidTensor {
                tensor,
                reason: "unknown tensor".to_string(),
            })
        }
    }

    fn attach_ports(&mut self, id: OpId, op: &Op) {
        for (offset, t) in op.inputs.iter().enumerate() {
            if let Some(entry) = self.tensors.get_mut(t) {
                entry.consumers.push(Port::new(id, offset));
            }
        }
        for (offset, t) in op.outputs.iter().enumerate() {
            if let Some(entry) = self.tensors.get_mut(t) {
                entry.producer = Some(Port::new(id, offset));
            }
        }
    }

    fn detach_ports(&mut self, id: OpId, op: &Op) {
        for t in &op.inputs {
            if let Some(entry) = self.tensors.get_mut(t) {
                entry.consumers.retain(|p| p.op != id);
            }
        }
        for t in &op.outputs {
            if let Some(entry) = self.tensors.get_mut(t) {
                if entry.producer.map(|p| p.op) == Some(id) {
                    entry.producer = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_op_sets_producer() {
        let mut graph = Graph::new();
        let x = graph.add_input("x");
        let y = graph.add_tensor("y");
        let id = graph
            .add_op(Op::new("relu").with_inputs([x]).with_outputs([y]))
            .unwrap();

        assert_eq!(graph.producer(y), Some(Port::new(id, 0)));
        assert_eq!(graph.consumers(x), &[Port::new(id, 0)]);
    }

    #[test]
    fn test_add_op_rejects_second_producer() {
        let mut graph = Graph::new();
        let x = graph.add_input("x");
        let y = graph.add_tensor("y");
        graph
            .add_op(Op::new("relu").with_inputs([x]).with_outputs([y]))
            .unwrap();

        let err = graph
            .add_op(Op::new("gelu").with_inputs([x]).with_outputs([y]))
            .unwrap_err();
        assert!(matches!(err, FusionError::InvalidTensor { .. }));

        // graph inputs cannot be produced either
        let err = graph
            .add_op(Op::new("gelu").with_inputs([y]).with_outputs([x]))
            .unwrap_err();
        assert!(matches!(err, FusionError::InvalidTensor { .. }));
        assert_eq!(graph.op_count(), 1);
    }

    #[test]
    fn test_add_op_rejects_unknown_tensor() {
        let mut graph = Graph::new();
        let err = graph
            .add_op(Op::new("relu").with_inputs([TensorId(42)]))
            .unwrap_err();
        assert!(matches!(err, FusionError::InvalidTensor { .. }));
    }

    #[test]
    fn test_remove_op_disconnects() {
        let mut graph = Graph::new();
        let x = graph.add_input("x");
        let y = graph.add_tensor("y");
        let id = graph
            .add_op(Op::new("relu").with_inputs([x]).with_outputs([y]))
            .unwrap();

        let op = graph.remove_op(id).unwrap();
        assert_eq!(op.kind, "relu");
        assert!(graph.consumers(x).is_empty());
        assert!(graph.producer(y).is_none());
        assert!(graph.remove_op(id).is_none());

        graph.remove_tensor(y).unwrap();
        assert!(!graph.contains_tensor(y));
    }

    #[test]
    fn test_remove_tensor_still_connected() {
        let mut graph = Graph::new();
        let x = graph.add_input("x");
        let y = graph.add_tensor("y");
        graph
            .add_op(Op::new("relu").with_inputs([x]).with_outputs([y]))
            .unwrap();
        assert!(graph.remove_tensor(y).is_err());
    }

    #[test]
    fn test_connect_and_disconnect_input() {
        let mut graph = Graph::new();
        let a = graph.add_input("a");
        let b = graph.add_input("b");
        let c = graph.add_input("c");
        let y = graph.add_tensor("y");
        let add = graph
            .add_op(Op::new("add").with_inputs([a, b]).with_outputs([y]))
            .unwrap();

        graph.connect_input(add, 1, c).unwrap();
        assert!(graph.consumers(b).is_empty());
        assert_eq!(graph.consumers(c), &[Port::new(add, 1)]);

        graph.connect_input(add, 2, b).unwrap();
        assert_eq!(graph.op(add).unwrap().inputs, vec![a, c, b]);

        let removed = graph.disconnect_input(add, 0).unwrap();
        assert_eq!(removed, a);
        assert!(graph.consumers(a).is_empty());
        assert_eq!(graph.consumers(c), &[Port::new(add, 0)]);
        assert_eq!(graph.consumers(b), &[Port::new(add, 1)]);

        assert!(graph.connect_input(add, 5, a).is_err());
    }

    #[test]
    fn test_set_op_attr() {
        let mut graph = Graph::new();
        let x = graph.add_input("x");
        let id = graph.add_op(Op::new("relu").with_inputs([x])).unwrap();
        graph.set_op_attr(id, "alpha", 0.1f32).unwrap();
        assert_eq!(graph.op(id).unwrap().get_attr_float("alpha", 0.0), 0.1);
        assert!(graph.set_op_attr(OpId(99), "alpha", 0.1f32).is_err());
    }
}
