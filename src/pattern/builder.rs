//! Pattern graph builder
//!
//! Declarative construction of template subgraphs. Each `append_*` call adds
//! one node, wires its input slots to previously appended nodes and returns
//! the new node's id. External ports designate which slots become the fused
//! op's inputs and outputs, in index order.
//!
//! # Example
//!
//! ```
//! use graph_fusion::pattern::{in_edge, PatternGraph};
//!
//! let mut pg = PatternGraph::new("reorder_relu");
//! let reorder = pg.append_op("reorder", &[]);
//! let relu = pg.append_op("relu", &[in_edge(0, reorder, 0)]);
//! pg.create_input_port(0, reorder, 0);
//! pg.create_output_port(0, relu, 0);
//!
//! assert!(pg.validate().is_ok());
//! ```

use std::sync::Arc;

use crate::error::{FusionError, FusionResult};
use crate::graph::Op;

use super::node::{
    InEdge, KindPredicate, NodeKind, OpPattern, PatternNode, PatternNodeId, PortRef, Repetition,
};

/// Declarative template subgraph
#[derive(Debug, Clone)]
pub struct PatternGraph {
    name: String,
    nodes: Vec<PatternNode>,
    /// External ports keyed by index, sorted
    inputs: Vec<(usize, PortRef)>,
    outputs: Vec<(usize, PortRef)>,
    fused_kind: Option<String>,
}

impl PatternGraph {
    /// Create an empty pattern graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            fused_kind: None,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Pattern name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the pattern
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// All nodes in append order
    pub fn nodes(&self) -> &[PatternNode] {
        &self.nodes
    }

    /// Get a node by id
    pub fn node(&self, id: PatternNodeId) -> Option<&PatternNode> {
        self.nodes.get(id.0)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// External input port by index
    pub fn input_port(&self, index: usize) -> Option<PortRef> {
        find_port(&self.inputs, index)
    }

    /// External output port by index
    pub fn output_port(&self, index: usize) -> Option<PortRef> {
        find_port(&self.outputs, index)
    }

    /// Declared external inputs in index order
    pub fn input_ports(&self) -> Vec<PortRef> {
        self.inputs.iter().map(|(_, p)| *p).collect()
    }

    /// Declared external outputs in index order
    pub fn output_ports(&self) -> Vec<PortRef> {
        self.outputs.iter().map(|(_, p)| *p).collect()
    }

    /// Whether any external port was declared
    pub fn declares_ports(&self) -> bool {
        !self.inputs.is_empty() || !self.outputs.is_empty()
    }

    /// Kind given to the fused op
    pub fn fused_kind(&self) -> String {
        self.fused_kind
            .clone()
            .unwrap_or_else(|| format!("fused_{}", self.name))
    }

    /// Consumers of a node's output offset: `(consumer, input slot)`
    pub fn consumers_of(
        &self,
        producer: PatternNodeId,
    ) -> impl Iterator<Item = (PatternNodeId, InEdge)> + '_ {
        self.nodes.iter().flat_map(move |n| {
            n.inputs
                .iter()
                .filter(move |e| e.producer == producer)
                .map(move |e| (n.id, *e))
        })
    }

    // ========================================================================
    // Node construction
    // ========================================================================

    fn push(&mut self, kind: NodeKind, in_edges: &[InEdge]) -> PatternNodeId {
        let id = PatternNodeId(self.nodes.len());
        let mut inputs = in_edges.to_vec();
        inputs.sort_by_key(|e| e.port);
        self.nodes.push(PatternNode {
            id,
            kind,
            inputs,
            context: false,
        });
        id
    }

    fn push_op(&mut self, kind: KindPredicate, in_edges: &[InEdge]) -> PatternNodeId {
        self.push(NodeKind::Op(OpPattern::new(kind)), in_edges)
    }

    /// Append an op node matching exactly `kind`
    pub fn append_op(&mut self, kind: &str, in_edges: &[InEdge]) -> PatternNodeId {
        self.push_op(KindPredicate::Exact(kind.to_string()), in_edges)
    }

    /// Append an op node matching any of `kinds`
    pub fn append_op_any_of(&mut self, kinds: &[&str], in_edges: &[InEdge]) -> PatternNodeId {
        let kinds = kinds.iter().map(|k| k.to_string()).collect();
        self.push_op(KindPredicate::OneOf(kinds), in_edges)
    }

    /// Append an op node matching any op
    pub fn append_any(&mut self, in_edges: &[InEdge]) -> PatternNodeId {
        self.push_op(KindPredicate::Any, in_edges)
    }

    /// Append an op node matched by an arbitrary predicate
    pub fn append_op_with<F>(&mut self, predicate: F, in_edges: &[InEdge]) -> PatternNodeId
    where
        F: Fn(&Op) -> bool + Send + Sync + 'static,
    {
        self.push_op(KindPredicate::Custom(Arc::new(predicate)), in_edges)
    }

    /// Append a node satisfied by the first matching alternative
    ///
    /// Input slot `i` and output offset `o` of the node map to external
    /// input port `i` and external output port `o` of every alternative.
    pub fn append_alternation(
        &mut self,
        alternatives: Vec<PatternGraph>,
        in_edges: &[InEdge],
    ) -> PatternNodeId {
        self.push(NodeKind::Alternation(alternatives), in_edges)
    }

    /// Append a node repeating `body` between `min` and `max` times
    ///
    /// `port_map` is `(body output port, body input port)`: the output of one
    /// iteration feeds the input of the next. Outer edges may only touch
    /// those two chain ports.
    pub fn append_repetition(
        &mut self,
        body: PatternGraph,
        port_map: (usize, usize),
        min: usize,
        max: usize,
        in_edges: &[InEdge],
    ) -> PatternNodeId {
        let rep = Repetition {
            body,
            port_map,
            min,
            max,
        };
        self.push(NodeKind::Repetition(Box::new(rep)), in_edges)
    }

    /// Append a node that may be absent
    ///
    /// The body chains through its input port 0 and output port 0; an absent
    /// node passes its input tensor through to its consumers.
    pub fn append_optional(&mut self, body: PatternGraph, in_edges: &[InEdge]) -> PatternNodeId {
        self.append_repetition(body, (0, 0), 0, 1, in_edges)
    }

    // ========================================================================
    // Node modifiers
    // ========================================================================

    /// Add a decision function to an op node
    ///
    /// Has no effect on composite nodes.
    pub fn add_predicate<F>(&mut self, node: PatternNodeId, predicate: F) -> &mut Self
    where
        F: Fn(&Op) -> bool + Send + Sync + 'static,
    {
        if let Some(NodeKind::Op(p)) = self.nodes.get_mut(node.0).map(|n| &mut n.kind) {
            p.predicates.push(Arc::new(predicate));
        }
        self
    }

    /// Let inputs 0 and 1 of an op node match in either order
    pub fn allow_commutative_inputs(&mut self, node: PatternNodeId) -> &mut Self {
        if let Some(NodeKind::Op(p)) = self.nodes.get_mut(node.0).map(|n| &mut n.kind) {
            p.commutative = true;
        }
        self
    }

    /// Mark an op node as context
    ///
    /// A context node must match and its edges must hold, but the op it binds
    /// stays outside the match and is not fused. Has no effect on composite
    /// nodes.
    pub fn set_context(&mut self, node: PatternNodeId) -> &mut Self {
        if let Some(n) = self.nodes.get_mut(node.0) {
            if matches!(n.kind, NodeKind::Op(_)) {
                n.context = true;
            }
        }
        self
    }

    /// Whether any node at this level is a context node
    pub fn has_context(&self) -> bool {
        self.nodes.iter().any(|n| n.context)
    }

    /// Map external input `index` to input slot `port` of `node`
    pub fn create_input_port(
        &mut self,
        index: usize,
        node: PatternNodeId,
        port: usize,
    ) -> &mut Self {
        set_port(&mut self.inputs, index, PortRef { node, port });
        self
    }

    /// Map external output `index` to output offset `offset` of `node`
    pub fn create_output_port(
        &mut self,
        index: usize,
        node: PatternNodeId,
        offset: usize,
    ) -> &mut Self {
        set_port(&mut self.outputs, index, PortRef { node, port: offset });
        self
    }

    /// Set the kind given to the fused op
    pub fn set_fused_kind(&mut self, kind: impl Into<String>) -> &mut Self {
        self.fused_kind = Some(kind.into());
        self
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Check structural well-formedness
    pub fn validate(&self) -> FusionResult<()> {
        let fail = |reason: String| Err(FusionError::invalid_pattern(&self.name, reason));

        if self.nodes.is_empty() {
            return fail("pattern has no nodes".to_string());
        }
        if !self.nodes.iter().any(|n| n.is_mandatory() && !n.context) {
            return fail("pattern has no mandatory node".to_string());
        }

        for node in &self.nodes {
            for (i, edge) in node.inputs.iter().enumerate() {
                if edge.producer >= node.id {
                    return fail(format!(
                        "{} slot {} refers to {} which is not an earlier node",
                        node.id, edge.port, edge.producer
                    ));
                }
                if i > 0 && node.inputs[i - 1].port == edge.port {
                    return fail(format!("{} slot {} is wired twice", node.id, edge.port));
                }
            }
            self.validate_node(node)?;
        }

        for (what, ports) in [("input", &self.inputs), ("output", &self.outputs)] {
            for (position, (index, port)) in ports.iter().enumerate() {
                if *index != position {
                    return fail(format!("external {} port {} is not declared", what, position));
                }
                let Some(node) = self.node(port.node) else {
                    return fail(format!("external {} port {} refers to unknown node", what, index));
                };
                if node.context {
                    return fail(format!(
                        "external {} port {} refers to context node {}",
                        what, index, node.id
                    ));
                }
                let ok = match what {
                    "input" => has_input_slot(node, port.port),
                    _ => has_output_slot(node, port.port),
                };
                if !ok {
                    return fail(format!(
                        "external {} port {} refers to missing slot {} of {}",
                        what, index, port.port, node.id
                    ));
                }
            }
        }

        Ok(())
    }

    fn validate_node(&self, node: &PatternNode) -> FusionResult<()> {
        let fail = |reason: String| Err(FusionError::invalid_pattern(&self.name, reason));

        for edge in &node.inputs {
            if !has_input_slot(node, edge.port) {
                return fail(format!("{} has no input slot {}", node.id, edge.port));
            }
            if let Some(producer) = self.node(edge.producer) {
                if !has_output_slot(producer, edge.offset) {
                    return fail(format!(
                        "{} has no output offset {} feeding {}",
                        producer.id, edge.offset, node.id
                    ));
                }
            }
        }

        match &node.kind {
            NodeKind::Op(_) => Ok(()),
            NodeKind::Alternation(alternatives) => {
                if alternatives.is_empty() {
                    return fail(format!("alternation {} has no alternatives", node.id));
                }
                for alt in alternatives {
                    alt.validate()?;
                    if alt.has_context() {
                        return fail(format!("alternation {} nests a context node", node.id));
                    }
                }
                Ok(())
            }
            NodeKind::Repetition(rep) => {
                if rep.max == 0 || rep.min > rep.max {
                    return fail(format!(
                        "repetition {} has invalid bounds [{}, {}]",
                        node.id, rep.min, rep.max
                    ));
                }
                rep.body.validate()?;
                if rep.body.has_context() {
                    return fail(format!("repetition {} nests a context node", node.id));
                }
                if rep.body.input_port(rep.chain_in()).is_none()
                    || rep.body.output_port(rep.chain_out()).is_none()
                {
                    return fail(format!(
                        "repetition {} body does not declare chain ports {:?}",
                        node.id, rep.port_map
                    ));
                }
                if node.inputs.iter().any(|e| e.port != rep.chain_in()) {
                    return fail(format!(
                        "repetition {} is wired on a non-chain input slot",
                        node.id
                    ));
                }
                if self
                    .consumers_of(node.id)
                    .any(|(_, e)| e.offset != rep.chain_out())
                {
                    return fail(format!(
                        "repetition {} feeds a consumer from a non-chain output",
                        node.id
                    ));
                }
                Ok(())
            }
        }
    }
}

fn find_port(ports: &[(usize, PortRef)], index: usize) -> Option<PortRef> {
    ports
        .binary_search_by_key(&index, |(i, _)| *i)
        .ok()
        .map(|pos| ports[pos].1)
}

fn set_port(ports: &mut Vec<(usize, PortRef)>, index: usize, port: PortRef) {
    match ports.binary_search_by_key(&index, |(i, _)| *i) {
        Ok(pos) => ports[pos].1 = port,
        Err(pos) => ports.insert(pos, (index, port)),
    }
}

fn has_input_slot(node: &PatternNode, port: usize) -> bool {
    match &node.kind {
        NodeKind::Op(_) => true,
        NodeKind::Alternation(alts) => alts.iter().all(|a| a.input_port(port).is_some()),
        NodeKind::Repetition(rep) => rep.body.input_port(port).is_some(),
    }
}

fn has_output_slot(node: &PatternNode, offset: usize) -> bool {
    match &node.kind {
        NodeKind::Op(_) => true,
        NodeKind::Alternation(alts) => alts.iter().all(|a| a.output_port(offset).is_some()),
        NodeKind::Repetition(rep) => rep.body.output_port(offset).is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::node::{in_edge, REPEAT_UNBOUNDED};

    fn relu_body() -> PatternGraph {
        let mut body = PatternGraph::new("relu_body");
        let relu = body.append_op("relu", &[]);
        body.create_input_port(0, relu, 0);
        body.create_output_port(0, relu, 0);
        body
    }

    #[test]
    fn test_append_assigns_sequential_ids() {
        let mut pg = PatternGraph::new("p");
        let a = pg.append_op("conv", &[]);
        let b = pg.append_op_any_of(&["relu", "gelu"], &[in_edge(0, a, 0)]);
        assert_eq!(a, PatternNodeId(0));
        assert_eq!(b, PatternNodeId(1));
        assert_eq!(pg.len(), 2);
        assert_eq!(pg.consumers_of(a).count(), 1);
        assert_eq!(pg.fused_kind(), "fused_p");
    }

    #[test]
    fn test_validate_ok() {
        let mut pg = PatternGraph::new("conv_post");
        let conv = pg.append_op("conv", &[]);
        let post = pg.append_repetition(relu_body(), (0, 0), 1, REPEAT_UNBOUNDED, &[in_edge(0, conv, 0)]);
        pg.create_input_port(0, conv, 0)
            .create_output_port(0, post, 0)
            .set_fused_kind("conv_post_fused");

        assert!(pg.validate().is_ok());
        assert_eq!(pg.fused_kind(), "conv_post_fused");
    }

    #[test]
    fn test_validate_rejects_empty_and_all_optional() {
        assert!(PatternGraph::new("empty").validate().is_err());

        let mut pg = PatternGraph::new("optional_only");
        pg.append_optional(relu_body(), &[]);
        let err = pg.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("mandatory"));
    }

    #[test]
    fn test_validate_rejects_forward_edge() {
        let mut pg = PatternGraph::new("p");
        pg.append_op("relu", &[in_edge(0, PatternNodeId(3), 0)]);
        assert!(pg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_sparse_ports() {
        let mut pg = PatternGraph::new("p");
        let relu = pg.append_op("relu", &[]);
        pg.create_input_port(1, relu, 0);
        let err = pg.validate().unwrap_err();
        assert!(err.to_string().contains("input port 0"));
    }

    #[test]
    fn test_huge_port_index_is_rejected() {
        let mut pg = PatternGraph::new("p");
        let relu = pg.append_op("relu", &[]);
        pg.create_input_port(0, relu, 0)
            .create_output_port(usize::MAX, relu, 0);

        assert_eq!(pg.output_port(usize::MAX).map(|p| p.node), Some(relu));
        let err = pg.validate().unwrap_err();
        assert!(err.to_string().contains("output port 0"));
    }

    #[test]
    fn test_redeclared_port_replaces() {
        let mut pg = PatternGraph::new("p");
        let a = pg.append_op("reorder", &[]);
        let b = pg.append_op("relu", &[in_edge(0, a, 0)]);
        pg.create_output_port(0, a, 0).create_output_port(0, b, 0);
        assert_eq!(pg.output_ports().len(), 1);
        assert_eq!(pg.output_port(0).map(|p| p.node), Some(b));
        assert!(pg.validate().is_ok());
    }

    #[test]
    fn test_context_nodes() {
        let mut pg = PatternGraph::new("p");
        let producer = pg.append_any(&[]);
        let relu = pg.append_op("relu", &[in_edge(0, producer, 0)]);
        pg.set_context(producer)
            .create_input_port(0, relu, 0)
            .create_output_port(0, relu, 0);
        assert!(pg.node(producer).unwrap().context);
        assert!(pg.validate().is_ok());

        // ports cannot name a context node
        pg.create_input_port(1, producer, 0);
        assert!(pg.validate().unwrap_err().to_string().contains("context"));

        // a pattern of context nodes only binds nothing
        let mut only = PatternGraph::new("only");
        let any = only.append_any(&[]);
        only.set_context(any);
        assert!(only.validate().is_err());

        // context nodes stay at the top level
        let mut body = PatternGraph::new("body");
        let any = body.append_any(&[]);
        let relu = body.append_op("relu", &[in_edge(0, any, 0)]);
        body.set_context(any)
            .create_input_port(0, relu, 0)
            .create_output_port(0, relu, 0);
        let mut nested = PatternGraph::new("nested");
        nested.append_optional(body, &[]);
        nested.append_op("conv", &[]);
        assert!(nested.validate().is_err());
    }

    #[test]
    fn test_validate_repetition_bounds_and_chain_ports() {
        let mut pg = PatternGraph::new("bad_bounds");
        pg.append_repetition(relu_body(), (0, 0), 3, 2, &[]);
        assert!(pg.validate().is_err());

        let mut pg = PatternGraph::new("bad_chain");
        let conv = pg.append_op("conv", &[]);
        pg.append_repetition(relu_body(), (0, 0), 1, 4, &[in_edge(1, conv, 0)]);
        assert!(pg.validate().is_err());

        let mut pg = PatternGraph::new("bad_body_port");
        pg.append_repetition(relu_body(), (2, 0), 1, 4, &[]);
        assert!(pg.validate().is_err());
    }

    #[test]
    fn test_validate_alternation_ports() {
        let mut gelu = PatternGraph::new("gelu");
        gelu.append_op("gelu", &[]);
        // no ports declared on the second alternative

        let mut pg = PatternGraph::new("alt");
        let conv = pg.append_op("conv", &[]);
        pg.append_alternation(vec![relu_body(), gelu], &[in_edge(0, conv, 0)]);
        assert!(pg.validate().is_err());

        let mut pg = PatternGraph::new("alt_empty");
        pg.append_alternation(Vec::new(), &[]);
        assert!(pg.validate().is_err());
    }

    #[test]
    fn test_modifiers_only_touch_op_nodes() {
        let mut pg = PatternGraph::new("p");
        let add = pg.append_op("add", &[]);
        let opt = pg.append_optional(relu_body(), &[in_edge(0, add, 0)]);
        pg.allow_commutative_inputs(add)
            .allow_commutative_inputs(opt)
            .add_predicate(add, |op| op.inputs.len() == 2);

        let node = pg.node(add).unwrap().op_pattern().unwrap();
        assert!(node.commutative);
        assert_eq!(node.predicates.len(), 1);
        assert!(pg.node(opt).unwrap().op_pattern().is_none());
        assert!(!pg.node(opt).unwrap().is_mandatory());
    }
}
