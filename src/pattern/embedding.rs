//! Embeddings of a pattern graph into a target graph
//!
//! A [`SubMatch`] records, for one level of a pattern graph, which concrete
//! ops each pattern node is bound to. Composite nodes carry nested
//! sub-matches. A completed top-level embedding is turned into a [`Match`]
//! once its boundary has been checked.

use smallvec::SmallVec;

use crate::error::{FusionError, FusionResult};
use crate::graph::{Graph, OpId, OpSet, Port, TensorId};

use super::builder::PatternGraph;
use super::node::{NodeKind, PatternNodeId, Repetition};

/// What a single pattern node is bound to
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// A concrete op; `swapped` exchanges input slots 0 and 1
    Op {
        /// Bound op
        op: OpId,
        /// Commutative inputs were matched in reverse order
        swapped: bool,
    },
    /// The committed alternative and its sub-match
    Alternation {
        /// Index of the alternative
        choice: usize,
        /// Embedding of the alternative
        inner: SubMatch,
    },
    /// Chained iterations of a repeated body
    Repetition {
        /// One sub-match per iteration, in chain order
        iterations: Vec<SubMatch>,
        /// Tensor flowing through an absent node
        passthrough: Option<TensorId>,
    },
}

impl Binding {
    /// Check if the node binds no op
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Repetition { iterations, .. } if iterations.is_empty())
    }

    /// Append every bound op to `out`
    pub fn collect_ops(&self, out: &mut Vec<OpId>) {
        match self {
            Self::Op { op, .. } => out.push(*op),
            Self::Alternation { inner, .. } => inner.collect_ops(out),
            Self::Repetition { iterations, .. } => {
                for it in iterations {
                    it.collect_ops(out);
                }
            }
        }
    }

    /// All bound ops
    pub fn ops(&self) -> Vec<OpId> {
        let mut out = Vec::new();
        self.collect_ops(&mut out);
        out
    }
}

/// Tensor seen at a pattern port under a partial embedding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortTensor {
    /// Not determined yet
    Unbound,
    /// Determined
    Bound(TensorId),
    /// The binding cannot provide this port
    Invalid,
}

impl PortTensor {
    /// Whether two port values can describe the same edge
    pub fn agrees_with(self, other: PortTensor) -> bool {
        match (self, other) {
            (Self::Bound(a), Self::Bound(b)) => a == b,
            (Self::Invalid, _) | (_, Self::Invalid) => false,
            _ => true,
        }
    }
}

impl From<Option<TensorId>> for PortTensor {
    fn from(t: Option<TensorId>) -> Self {
        t.map_or(Self::Invalid, Self::Bound)
    }
}

/// Slot of the op that pattern input `port` refers to
pub fn op_slot(port: usize, swapped: bool) -> usize {
    if swapped && port < 2 {
        1 - port
    } else {
        port
    }
}

fn alternative(pg: &PatternGraph, node: PatternNodeId, choice: usize) -> Option<&PatternGraph> {
    match &pg.node(node)?.kind {
        NodeKind::Alternation(alts) => alts.get(choice),
        _ => None,
    }
}

fn repetition(pg: &PatternGraph, node: PatternNodeId) -> Option<&Repetition> {
    match &pg.node(node)?.kind {
        NodeKind::Repetition(rep) => Some(rep),
        _ => None,
    }
}

/// Bindings for one level of a pattern graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubMatch {
    bindings: Vec<Option<Binding>>,
}

impl SubMatch {
    /// Empty embedding for a pattern with `len` nodes
    pub fn new(len: usize) -> Self {
        Self {
            bindings: vec![None; len],
        }
    }

    /// Binding of a node
    pub fn get(&self, node: PatternNodeId) -> Option<&Binding> {
        self.bindings.get(node.0).and_then(Option::as_ref)
    }

    /// Check if a node is bound
    pub fn is_bound(&self, node: PatternNodeId) -> bool {
        self.get(node).is_some()
    }

    /// Check if every node is bound
    pub fn is_complete(&self) -> bool {
        self.bindings.iter().all(Option::is_some)
    }

    /// Number of bound nodes
    pub fn bound_count(&self) -> usize {
        self.bindings.iter().filter(|b| b.is_some()).count()
    }

    pub(crate) fn bind(&mut self, node: PatternNodeId, binding: Binding) {
        if let Some(slot) = self.bindings.get_mut(node.0) {
            *slot = Some(binding);
        }
    }

    pub(crate) fn unbind(&mut self, node: PatternNodeId) -> Option<Binding> {
        self.bindings.get_mut(node.0).and_then(Option::take)
    }

    /// Append every bound op to `out`
    pub fn collect_ops(&self, out: &mut Vec<OpId>) {
        for binding in self.bindings.iter().flatten() {
            binding.collect_ops(out);
        }
    }

    /// All bound ops, in pattern order
    pub fn ops(&self) -> Vec<OpId> {
        let mut out = Vec::new();
        self.collect_ops(&mut out);
        out
    }

    /// Bound ops that belong to the match, in pattern order
    ///
    /// Ops bound by context nodes of `pg` are left out.
    pub fn member_ops(&self, pg: &PatternGraph) -> Vec<OpId> {
        let mut out = Vec::new();
        for node in pg.nodes() {
            match self.get(node.id) {
                Some(binding) if !node.context => binding.collect_ops(&mut out),
                _ => {}
            }
        }
        out
    }

    // ========================================================================
    // Port resolution
    // ========================================================================

    /// Tensor consumed at input slot `port` of `node`
    pub fn input_tensor(
        &self,
        graph: &Graph,
        pg: &PatternGraph,
        node: PatternNodeId,
        port: usize,
    ) -> PortTensor {
        let Some(binding) = self.get(node) else {
            return PortTensor::Unbound;
        };
        match binding {
            Binding::Op { op, swapped } => graph
                .op(*op)
                .and_then(|o| o.inputs.get(op_slot(port, *swapped)).copied())
                .into(),
            Binding::Alternation { choice, inner } => {
                let Some(alt) = alternative(pg, node, *choice) else {
                    return PortTensor::Invalid;
                };
                match alt.input_port(port) {
                    Some(p) => inner.input_tensor(graph, alt, p.node, p.port),
                    None => PortTensor::Invalid,
                }
            }
            Binding::Repetition {
                iterations,
                passthrough,
            } => {
                let Some(rep) = repetition(pg, node) else {
                    return PortTensor::Invalid;
                };
                match iterations.first() {
                    None if port == rep.chain_in() => {
                        passthrough.map_or(PortTensor::Unbound, PortTensor::Bound)
                    }
                    None => PortTensor::Unbound,
                    Some(first) => match rep.body.input_port(port) {
                        Some(p) => first.input_tensor(graph, &rep.body, p.node, p.port),
                        None => PortTensor::Invalid,
                    },
                }
            }
        }
    }

    /// Tensor produced at output offset `offset` of `node`
    pub fn output_tensor(
        &self,
        graph: &Graph,
        pg: &PatternGraph,
        node: PatternNodeId,
        offset: usize,
    ) -> PortTensor {
        let Some(binding) = self.get(node) else {
            return PortTensor::Unbound;
        };
        match binding {
            Binding::Op { op, .. } => graph
                .op(*op)
                .and_then(|o| o.outputs.get(offset).copied())
                .into(),
            Binding::Alternation { choice, inner } => {
                let Some(alt) = alternative(pg, node, *choice) else {
                    return PortTensor::Invalid;
                };
                match alt.output_port(offset) {
                    Some(p) => inner.output_tensor(graph, alt, p.node, p.port),
                    None => PortTensor::Invalid,
                }
            }
            Binding::Repetition {
                iterations,
                passthrough,
            } => {
                let Some(rep) = repetition(pg, node) else {
                    return PortTensor::Invalid;
                };
                match iterations.last() {
                    None if offset == rep.chain_out() => {
                        passthrough.map_or(PortTensor::Unbound, PortTensor::Bound)
                    }
                    None => PortTensor::Unbound,
                    Some(last) => match rep.body.output_port(offset) {
                        Some(p) => last.output_tensor(graph, &rep.body, p.node, p.port),
                        None => PortTensor::Invalid,
                    },
                }
            }
        }
    }

    /// Append the endpoints behind input slot `port` of `node`
    ///
    /// A repetition's chain input resolves to its first iteration; other
    /// slots resolve to every iteration in chain order. Returns `false` if
    /// the binding cannot provide the slot.
    pub fn collect_inputs(
        &self,
        pg: &PatternGraph,
        node: PatternNodeId,
        port: usize,
        out: &mut SmallVec<[Endpoint; 4]>,
    ) -> bool {
        match self.get(node) {
            None => false,
            Some(Binding::Op { op, swapped }) => {
                out.push(Endpoint::Input(Port::new(*op, op_slot(port, *swapped))));
                true
            }
            Some(Binding::Alternation { choice, inner }) => {
                let Some(alt) = alternative(pg, node, *choice) else {
                    return false;
                };
                match alt.input_port(port) {
                    Some(p) => inner.collect_inputs(alt, p.node, p.port, out),
                    None => false,
                }
            }
            Some(Binding::Repetition {
                iterations,
                passthrough,
            }) => {
                let Some(rep) = repetition(pg, node) else {
                    return false;
                };
                if iterations.is_empty() {
                    if port == rep.chain_in() {
                        out.extend(passthrough.map(Endpoint::Passthrough));
                    }
                    return true;
                }
                let Some(p) = rep.body.input_port(port) else {
                    return false;
                };
                if port == rep.chain_in() {
                    iterations[0].collect_inputs(&rep.body, p.node, p.port, out)
                } else {
                    iterations
                        .iter()
                        .all(|it| it.collect_inputs(&rep.body, p.node, p.port, out))
                }
            }
        }
    }

    /// Append the endpoints behind output offset `offset` of `node`
    ///
    /// A repetition's chain output resolves to its last iteration.
    pub fn collect_outputs(
        &self,
        pg: &PatternGraph,
        node: PatternNodeId,
        offset: usize,
        out: &mut SmallVec<[Endpoint; 4]>,
    ) -> bool {
        match self.get(node) {
            None => false,
            Some(Binding::Op { op, .. }) => {
                out.push(Endpoint::Output(Port::new(*op, offset)));
                true
            }
            Some(Binding::Alternation { choice, inner }) => {
                let Some(alt) = alternative(pg, node, *choice) else {
                    return false;
                };
                match alt.output_port(offset) {
                    Some(p) => inner.collect_outputs(alt, p.node, p.port, out),
                    None => false,
                }
            }
            Some(Binding::Repetition {
                iterations,
                passthrough,
            }) => {
                let Some(rep) = repetition(pg, node) else {
                    return false;
                };
                let Some(last) = iterations.last() else {
                    if offset == rep.chain_out() {
                        out.extend(passthrough.map(Endpoint::Passthrough));
                    }
                    return true;
                };
                let Some(p) = rep.body.output_port(offset) else {
                    return false;
                };
                if offset == rep.chain_out() {
                    last.collect_outputs(&rep.body, p.node, p.port, out)
                } else {
                    iterations
                        .iter()
                        .all(|it| it.collect_outputs(&rep.body, p.node, p.port, out))
                }
            }
        }
    }
}

// ============================================================================
// Match
// ============================================================================

/// Where a boundary tensor of a match is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Input slot of a bound op
    Input(Port),
    /// Output offset of a bound op
    Output(Port),
    /// Tensor flowing through an absent node
    Passthrough(TensorId),
}

impl Endpoint {
    /// Current tensor at this endpoint
    pub fn resolve(&self, graph: &Graph) -> Option<TensorId> {
        match self {
            Self::Input(p) => graph.op(p.op)?.inputs.get(p.offset).copied(),
            Self::Output(p) => graph.op(p.op)?.outputs.get(p.offset).copied(),
            Self::Passthrough(t) => graph.contains_tensor(*t).then_some(*t),
        }
    }
}

/// Accepted occurrence of a pattern
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// Name of the pattern graph
    pub pattern: String,
    /// Kind of the op replacing the occurrence
    pub fused_kind: String,
    /// Bound ops in graph order
    pub ops: Vec<OpId>,
    /// External inputs of the fused op, in port order
    pub inputs: SmallVec<[Endpoint; 4]>,
    /// External outputs of the fused op, in port order
    pub outputs: SmallVec<[Endpoint; 4]>,
}

impl Match {
    /// Bound ops as a set
    pub fn op_set(&self) -> OpSet {
        self.ops.iter().copied().collect()
    }

    /// Check if an op is part of the match
    pub fn contains(&self, op: OpId) -> bool {
        self.ops.contains(&op)
    }

    /// Number of bound ops
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Check if no op is bound
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Error describing why this match cannot be applied
    pub fn violation(&self, reason: impl Into<String>) -> FusionError {
        FusionError::FuseInvariantViolation {
            pattern: self.pattern.clone(),
            ops: self.ops.clone(),
            reason: reason.into(),
        }
    }

    fn resolve_all(&self, graph: &Graph, endpoints: &[Endpoint]) -> FusionResult<Vec<TensorId>> {
        endpoints
            .iter()
            .map(|e| {
                e.resolve(graph)
                    .ok_or_else(|| self.violation(format!("boundary endpoint {:?} is gone", e)))
            })
            .collect()
    }

    /// External input tensors against the current graph
    pub fn resolve_inputs(&self, graph: &Graph) -> FusionResult<Vec<TensorId>> {
        self.resolve_all(graph, &self.inputs)
    }

    /// External output tensors against the current graph
    pub fn resolve_outputs(&self, graph: &Graph) -> FusionResult<Vec<TensorId>> {
        self.resolve_all(graph, &self.outputs)
    }

    /// Check that the declared ports cover the whole boundary of the op set
    ///
    /// - every bound op is live and appears once
    /// - tensors entering the set are declared inputs, declared inputs are
    ///   not produced inside
    /// - tensors leaving the set (consumed outside or graph outputs) are
    ///   declared outputs, declared outputs are produced inside and unique
    pub fn check_boundary(&self, graph: &Graph) -> FusionResult<()> {
        let set = self.op_set();
        if set.len() != self.ops.len() {
            return Err(self.violation("an op is bound twice"));
        }
        if let Some(op) = self.ops.iter().find(|op| !graph.contains_op(**op)) {
            return Err(self.violation(format!("{} no longer exists", op)));
        }

        let inputs = self.resolve_inputs(graph)?;
        let outputs = self.resolve_outputs(graph)?;
        let inside = |t: TensorId| graph.producer_op(t).map_or(false, |p| set.contains(&p));

        if let Some(t) = inputs.iter().find(|t| inside(**t)) {
            return Err(self.violation(format!("declared input {} is produced inside", t)));
        }
        for (i, t) in outputs.iter().enumerate() {
            if !inside(*t) {
                return Err(self.violation(format!("declared output {} is produced outside", t)));
            }
            if outputs[..i].contains(t) {
                return Err(self.violation(format!("output {} is declared twice", t)));
            }
        }

        for &id in &self.ops {
            let Some(op) = graph.op(id) else { continue };
            if let Some(t) = op
                .inputs
                .iter()
                .find(|t| !inside(**t) && !inputs.contains(t))
            {
                return Err(self.violation(format!("{} enters {} undeclared", t, id)));
            }
            if let Some(t) = op
                .outputs
                .iter()
                .find(|t| escapes(graph, &set, **t) && !outputs.contains(t))
            {
                return Err(self.violation(format!("{} leaves {} undeclared", t, id)));
            }
        }
        Ok(())
    }
}

/// Check if a tensor is observed outside an op set
pub fn escapes(graph: &Graph, set: &OpSet, tensor: TensorId) -> bool {
    graph.is_graph_output(tensor) || graph.consumers(tensor).iter().any(|p| !set.contains(&p.op))
}

/// Boundary of an op set in op order, for patterns without declared ports
///
/// Inputs are deduplicated by tensor.
pub fn derive_ports(
    graph: &Graph,
    ops: &[OpId],
) -> (SmallVec<[Endpoint; 4]>, SmallVec<[Endpoint; 4]>) {
    let set: OpSet = ops.iter().copied().collect();
    let mut inputs: SmallVec<[Endpoint; 4]> = SmallVec::new();
    let mut outputs: SmallVec<[Endpoint; 4]> = SmallVec::new();
    let mut seen: Vec<TensorId> = Vec::new();

    for &id in ops {
        let Some(op) = graph.op(id) else { continue };
        for (slot, &t) in op.inputs.iter().enumerate() {
            let internal = graph.producer_op(t).map_or(false, |p| set.contains(&p));
            if !internal && !seen.contains(&t) {
                seen.push(t);
                inputs.push(Endpoint::Input(Port::new(id, slot)));
            }
        }
        for (offset, &t) in op.outputs.iter().enumerate() {
            if escapes(graph, &set, t) {
                outputs.push(Endpoint::Output(Port::new(id, offset)));
            }
        }
    }
    (inputs, outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Op;

    /// x -> conv -> relu -> y, conv output also observed by `tap`
    fn make_graph(tap: bool) -> (Graph, [OpId; 2], [TensorId; 3]) {
        let mut graph = Graph::new();
        let x = graph.add_input("x");
        let c = graph.add_tensor("c");
        let y = graph.add_tensor("y");
        let conv = graph
            .add_op(Op::new("conv").with_inputs([x]).with_outputs([c]))
            .unwrap();
        let relu = graph
            .add_op(Op::new("relu").with_inputs([c]).with_outputs([y]))
            .unwrap();
        if tap {
            graph.add_op(Op::new("tap").with_inputs([c])).unwrap();
        }
        graph.mark_output(y).unwrap();
        (graph, [conv, relu], [x, c, y])
    }

    fn conv_relu_match(conv: OpId, relu: OpId) -> Match {
        Match {
            pattern: "conv_relu".to_string(),
            fused_kind: "fused_conv_relu".to_string(),
            ops: vec![conv, relu],
            inputs: SmallVec::from_slice(&[Endpoint::Input(Port::new(conv, 0))]),
            outputs: SmallVec::from_slice(&[Endpoint::Output(Port::new(relu, 0))]),
        }
    }

    #[test]
    fn test_port_tensor_agreement() {
        let t = PortTensor::Bound(TensorId(1));
        assert!(t.agrees_with(PortTensor::Bound(TensorId(1))));
        assert!(!t.agrees_with(PortTensor::Bound(TensorId(2))));
        assert!(t.agrees_with(PortTensor::Unbound));
        assert!(!PortTensor::Unbound.agrees_with(PortTensor::Invalid));
    }

    #[test]
    fn test_op_slot_swaps_first_two_inputs() {
        assert_eq!(op_slot(0, true), 1);
        assert_eq!(op_slot(1, true), 0);
        assert_eq!(op_slot(2, true), 2);
        assert_eq!(op_slot(1, false), 1);
    }

    #[test]
    fn test_endpoint_resolution() {
        let (graph, [conv, relu], [x, _, y]) = make_graph(false);
        assert_eq!(Endpoint::Input(Port::new(conv, 0)).resolve(&graph), Some(x));
        assert_eq!(Endpoint::Output(Port::new(relu, 0)).resolve(&graph), Some(y));
        assert_eq!(Endpoint::Output(Port::new(relu, 3)).resolve(&graph), None);
        assert_eq!(Endpoint::Passthrough(x).resolve(&graph), Some(x));
    }

    #[test]
    fn test_boundary_accepts_closed_chain() {
        let (graph, [conv, relu], _) = make_graph(false);
        assert!(conv_relu_match(conv, relu).check_boundary(&graph).is_ok());
    }

    #[test]
    fn test_boundary_rejects_escaping_tensor() {
        let (graph, [conv, relu], _) = make_graph(true);
        let err = conv_relu_match(conv, relu).check_boundary(&graph).unwrap_err();
        assert!(err.is_invariant_violation());
        assert!(err.to_string().contains("undeclared"));
    }

    #[test]
    fn test_boundary_rejects_internal_input() {
        let (graph, [conv, relu], _) = make_graph(false);
        let mut m = conv_relu_match(conv, relu);
        m.inputs.push(Endpoint::Input(Port::new(relu, 0)));
        assert!(m.check_boundary(&graph).is_err());
    }

    #[test]
    fn test_derive_ports() {
        let (graph, [conv, relu], _) = make_graph(true);
        let (inputs, outputs) = derive_ports(&graph, &[conv, relu]);
        assert_eq!(inputs.as_slice(), &[Endpoint::Input(Port::new(conv, 0))]);
        // conv output feeds `tap`, relu output is a graph output
        assert_eq!(
            outputs.as_slice(),
            &[
                Endpoint::Output(Port::new(conv, 0)),
                Endpoint::Output(Port::new(relu, 0))
            ]
        );
    }

    #[test]
    fn test_member_ops_skip_context_nodes() {
        let mut pg = PatternGraph::new("p");
        let producer = pg.append_any(&[]);
        let relu = pg.append_op("relu", &[crate::pattern::in_edge(0, producer, 0)]);
        pg.set_context(producer);

        let mut sub = SubMatch::new(2);
        sub.bind(producer, Binding::Op { op: OpId(0), swapped: false });
        sub.bind(relu, Binding::Op { op: OpId(1), swapped: false });
        assert_eq!(sub.ops(), vec![OpId(0), OpId(1)]);
        assert_eq!(sub.member_ops(&pg), vec![OpId(1)]);
    }

    #[test]
    fn test_binding_ops() {
        let mut inner = SubMatch::new(2);
        inner.bind(PatternNodeId(0), Binding::Op { op: OpId(4), swapped: false });
        inner.bind(PatternNodeId(1), Binding::Op { op: OpId(5), swapped: false });
        let rep = Binding::Repetition {
            iterations: vec![inner.clone(), inner],
            passthrough: None,
        };
        assert_eq!(rep.ops(), vec![OpId(4), OpId(5), OpId(4), OpId(5)]);
        assert!(!rep.is_absent());

        let absent = Binding::Repetition {
            iterations: Vec::new(),
            passthrough: Some(TensorId(0)),
        };
        assert!(absent.is_absent());
        assert!(absent.ops().is_empty());
    }
}
