//! Nested backtracking matcher
//!
//! Embeds a [`PatternGraph`] into a [`Graph`]. Each search starts at an
//! anchor (the pattern node with the fewest candidate ops) and grows the
//! embedding along pattern edges, drawing candidates from the real
//! producer/consumer relation of the tensor on the connecting edge.
//!
//! Composite nodes recurse into their nested graphs:
//!
//! - an alternation commits to the first alternative that matches
//! - a repetition commits to the longest chain of iterations (capped at its
//!   maximum) and fails if that chain is shorter than its minimum
//! - an optional node that cannot match is bound as absent and passes its
//!   chain input tensor through to its consumers
//!
//! A complete embedding becomes a [`Match`] only if its declared external
//! ports cover its whole boundary.

use smallvec::SmallVec;

use crate::graph::{Graph, OpId, OpSet, TensorId};

use super::builder::PatternGraph;
use super::embedding::{derive_ports, Binding, Match, PortTensor, SubMatch};
use super::node::{NodeKind, OpPattern, PatternNodeId, PortRef, Repetition};

/// Tensors pinned at the external ports of a nested level
#[derive(Debug, Clone, Default)]
struct Boundary {
    inputs: Vec<(PortRef, TensorId)>,
    outputs: Vec<(PortRef, TensorId)>,
}

/// Known tensor on an edge of an unbound node
#[derive(Debug, Clone, Copy)]
enum Seed {
    Input { port: usize, tensor: TensorId },
    Output { offset: usize, tensor: TensorId },
}

/// Next node to bind
struct Step {
    node: PatternNodeId,
    seeds: Vec<Seed>,
    /// A bound neighbour cannot provide the connecting port
    dead: bool,
}

/// Anchor node of a pattern and the ops it may start from
#[derive(Debug, Clone)]
pub struct Anchor {
    /// Anchor node at the top level of the pattern
    pub node: PatternNodeId,
    /// Candidate ops in topological order
    pub candidates: Vec<OpId>,
}

type Done<'a> = dyn FnMut(&SubMatch) -> bool + 'a;

/// Nested pattern matcher over one graph
pub struct NestedMatcher<'g> {
    graph: &'g Graph,
    order: Vec<OpId>,
}

impl<'g> NestedMatcher<'g> {
    /// Create a matcher
    ///
    /// Ops are visited in topological order, or insertion order if the graph
    /// is cyclic.
    pub fn new(graph: &'g Graph) -> Self {
        let order = graph.topo_order().unwrap_or_else(|_| graph.op_ids());
        Self { graph, order }
    }

    /// The target graph
    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// Pick the anchor of a pattern
    ///
    /// The op node satisfied by the fewest ops wins, ties going to the lowest
    /// node id. Context nodes never anchor. Without op nodes at the top
    /// level, the first mandatory composite node anchors and every op is a
    /// candidate.
    pub fn anchor(&self, pattern: &PatternGraph) -> Option<Anchor> {
        let mut best: Option<Anchor> = None;
        for node in pattern.nodes().iter().filter(|n| !n.context) {
            let NodeKind::Op(p) = &node.kind else { continue };
            let candidates: Vec<OpId> = self
                .order
                .iter()
                .copied()
                .filter(|id| self.graph.op(*id).map_or(false, |op| p.matches(op)))
                .collect();
            if best
                .as_ref()
                .map_or(true, |b| candidates.len() < b.candidates.len())
            {
                best = Some(Anchor {
                    node: node.id,
                    candidates,
                });
            }
        }
        best.or_else(|| {
            first_mandatory(pattern).map(|node| Anchor {
                node,
                candidates: self.order.clone(),
            })
        })
    }

    /// Find one embedding with the anchor node bound to `op`
    ///
    /// Ops in `exclude` are never bound. `accept` sees every boundary-checked
    /// candidate; rejecting it resumes the search.
    pub fn match_at(
        &self,
        pattern: &PatternGraph,
        anchor: PatternNodeId,
        op: OpId,
        exclude: &OpSet,
        accept: &mut dyn FnMut(&Match) -> bool,
    ) -> Option<Match> {
        let mut used = exclude.clone();
        let mut sub = SubMatch::new(pattern.len());
        let mut found = None;

        self.extend(
            pattern,
            &mut sub,
            &Boundary::default(),
            Some((anchor, op)),
            &mut used,
            &mut |s| match self.build_match(pattern, s) {
                Some(m) if accept(&m) => {
                    found = Some(m);
                    true
                }
                _ => false,
            },
        );
        found
    }

    /// One match per anchor candidate, in topological order
    ///
    /// Matches are found independently and may overlap.
    pub fn matches<'a>(&'a self, pattern: &'a PatternGraph) -> impl Iterator<Item = Match> + 'a {
        self.anchor(pattern).into_iter().flat_map(move |anchor| {
            let node = anchor.node;
            anchor.candidates.into_iter().filter_map(move |op| {
                self.match_at(pattern, node, op, &OpSet::default(), &mut |_| true)
            })
        })
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Bind the remaining nodes of one level, calling `done` on completion
    ///
    /// Returns `true` once `done` accepts. On `false` every binding made by
    /// this call has been undone.
    fn extend(
        &self,
        pg: &PatternGraph,
        sub: &mut SubMatch,
        boundary: &Boundary,
        hint: Option<(PatternNodeId, OpId)>,
        used: &mut OpSet,
        done: &mut Done<'_>,
    ) -> bool {
        let step = match hint {
            Some((node, _)) => Step {
                node,
                seeds: Vec::new(),
                dead: false,
            },
            None => match self.next_node(pg, sub, boundary) {
                Some(step) => step,
                None => return done(sub),
            },
        };
        if step.dead {
            return false;
        }

        let candidates = self.candidates(pg, step.node, &step.seeds, hint.map(|h| h.1), used);
        for binding in candidates {
            let ops = binding.ops();
            if ops.iter().any(|op| used.contains(op)) {
                continue;
            }
            used.extend(ops.iter().copied());
            sub.bind(step.node, binding);

            if self.edges_hold(pg, sub, boundary, step.node)
                && self.extend(pg, sub, boundary, None, used, done)
            {
                return true;
            }

            sub.unbind(step.node);
            for op in &ops {
                used.remove(op);
            }
        }
        false
    }

    /// First complete embedding of a nested level
    fn first_match(
        &self,
        pg: &PatternGraph,
        boundary: &Boundary,
        hint: Option<(PatternNodeId, OpId)>,
        used: &OpSet,
    ) -> Option<SubMatch> {
        let mut scratch = used.clone();
        let mut sub = SubMatch::new(pg.len());
        let mut found = None;
        self.extend(pg, &mut sub, boundary, hint, &mut scratch, &mut |s| {
            found = Some(s.clone());
            true
        });
        found
    }

    /// Lowest-id unbound node with a seed, else a mandatory one, else any
    fn next_node(&self, pg: &PatternGraph, sub: &SubMatch, boundary: &Boundary) -> Option<Step> {
        let mut mandatory = None;
        let mut any = None;
        for node in pg.nodes() {
            if sub.is_bound(node.id) {
                continue;
            }
            match self.seeds(pg, sub, boundary, node.id) {
                None => {
                    return Some(Step {
                        node: node.id,
                        seeds: Vec::new(),
                        dead: true,
                    })
                }
                Some(seeds) if !seeds.is_empty() => {
                    return Some(Step {
                        node: node.id,
                        seeds,
                        dead: false,
                    })
                }
                Some(_) => {
                    if node.is_mandatory() {
                        mandatory.get_or_insert(node.id);
                    }
                    any.get_or_insert(node.id);
                }
            }
        }
        mandatory.or(any).map(|node| Step {
            node,
            seeds: Vec::new(),
            dead: false,
        })
    }

    /// Known tensors around an unbound node; `None` if a neighbour is invalid
    fn seeds(
        &self,
        pg: &PatternGraph,
        sub: &SubMatch,
        boundary: &Boundary,
        node: PatternNodeId,
    ) -> Option<Vec<Seed>> {
        let mut seeds = Vec::new();
        let pattern_node = pg.node(node)?;

        for edge in &pattern_node.inputs {
            match sub.output_tensor(self.graph, pg, edge.producer, edge.offset) {
                PortTensor::Bound(tensor) => seeds.push(Seed::Input {
                    port: edge.port,
                    tensor,
                }),
                PortTensor::Invalid => return None,
                PortTensor::Unbound => {}
            }
        }
        for (consumer, edge) in pg.consumers_of(node) {
            match sub.input_tensor(self.graph, pg, consumer, edge.port) {
                PortTensor::Bound(tensor) => seeds.push(Seed::Output {
                    offset: edge.offset,
                    tensor,
                }),
                PortTensor::Invalid => return None,
                PortTensor::Unbound => {}
            }
        }
        for (port, tensor) in &boundary.inputs {
            if port.node == node {
                seeds.push(Seed::Input {
                    port: port.port,
                    tensor: *tensor,
                });
            }
        }
        for (port, tensor) in &boundary.outputs {
            if port.node == node {
                seeds.push(Seed::Output {
                    offset: port.port,
                    tensor: *tensor,
                });
            }
        }
        Some(seeds)
    }

    /// Check every edge between `node` and bound nodes or the boundary
    fn edges_hold(
        &self,
        pg: &PatternGraph,
        sub: &SubMatch,
        boundary: &Boundary,
        node: PatternNodeId,
    ) -> bool {
        let g = self.graph;
        let Some(pattern_node) = pg.node(node) else {
            return false;
        };

        let producers_hold = pattern_node.inputs.iter().all(|e| {
            sub.output_tensor(g, pg, e.producer, e.offset)
                .agrees_with(sub.input_tensor(g, pg, node, e.port))
        });
        let consumers_hold = pg.consumers_of(node).all(|(consumer, e)| {
            sub.output_tensor(g, pg, node, e.offset)
                .agrees_with(sub.input_tensor(g, pg, consumer, e.port))
        });
        let inputs_hold = boundary
            .inputs
            .iter()
            .filter(|(p, _)| p.node == node)
            .all(|(p, t)| sub.input_tensor(g, pg, node, p.port) == PortTensor::Bound(*t));
        let outputs_hold = boundary
            .outputs
            .iter()
            .filter(|(p, _)| p.node == node)
            .all(|(p, t)| sub.output_tensor(g, pg, node, p.port) == PortTensor::Bound(*t));

        producers_hold && consumers_hold && inputs_hold && outputs_hold
    }

    // ========================================================================
    // Candidate generation
    // ========================================================================

    fn candidates(
        &self,
        pg: &PatternGraph,
        node: PatternNodeId,
        seeds: &[Seed],
        hint: Option<OpId>,
        used: &OpSet,
    ) -> Vec<Binding> {
        let Some(pattern_node) = pg.node(node) else {
            return Vec::new();
        };
        match &pattern_node.kind {
            NodeKind::Op(p) => self.op_candidates(p, seeds.first(), hint, used),
            NodeKind::Alternation(alts) => self
                .alternation_candidate(alts, seeds, hint, used)
                .into_iter()
                .collect(),
            NodeKind::Repetition(rep) => {
                self.repetition_candidates(rep, pattern_node.is_mandatory(), seeds, hint, used)
            }
        }
    }

    fn op_candidates(
        &self,
        pattern: &OpPattern,
        seed: Option<&Seed>,
        hint: Option<OpId>,
        used: &OpSet,
    ) -> Vec<Binding> {
        let mut pairs: Vec<(OpId, bool)> = Vec::new();
        match (hint, seed) {
            (Some(op), _) => pairs.extend([(op, false), (op, true)]),
            (None, Some(Seed::Input { port, tensor })) => {
                for c in self.graph.consumers(*tensor) {
                    if c.offset == *port {
                        pairs.push((c.op, false));
                    }
                    if *port < 2 && c.offset == 1 - *port {
                        pairs.push((c.op, true));
                    }
                }
            }
            (None, Some(Seed::Output { offset, tensor })) => {
                if let Some(p) = self.graph.producer(*tensor) {
                    if p.offset == *offset {
                        pairs.extend([(p.op, false), (p.op, true)]);
                    }
                }
            }
            (None, None) => {
                for &op in &self.order {
                    pairs.extend([(op, false), (op, true)]);
                }
            }
        }

        pairs
            .into_iter()
            .filter(|(id, swapped)| {
                !used.contains(id)
                    && self.graph.op(*id).map_or(false, |op| {
                        pattern.matches(op)
                            && (!swapped || (pattern.commutative && op.inputs.len() >= 2))
                    })
            })
            .map(|(op, swapped)| Binding::Op { op, swapped })
            .collect()
    }

    fn alternation_candidate(
        &self,
        alternatives: &[PatternGraph],
        seeds: &[Seed],
        hint: Option<OpId>,
        used: &OpSet,
    ) -> Option<Binding> {
        for (choice, alt) in alternatives.iter().enumerate() {
            let Some(boundary) = nested_boundary(alt, seeds) else {
                continue;
            };
            let inner_hint = match hint {
                Some(op) => match first_mandatory(alt) {
                    Some(node) => Some((node, op)),
                    None => continue,
                },
                None => None,
            };
            if let Some(inner) = self.first_match(alt, &boundary, inner_hint, used) {
                return Some(Binding::Alternation { choice, inner });
            }
        }
        None
    }

    fn repetition_candidates(
        &self,
        rep: &Repetition,
        mandatory: bool,
        seeds: &[Seed],
        hint: Option<OpId>,
        used: &OpSet,
    ) -> Vec<Binding> {
        let chain_in = seeds.iter().find_map(|s| match s {
            Seed::Input { port, tensor } if *port == rep.chain_in() => Some(*tensor),
            _ => None,
        });
        let chain_out = seeds.iter().find_map(|s| match s {
            Seed::Output { offset, tensor } if *offset == rep.chain_out() => Some(*tensor),
            _ => None,
        });

        if let Some(t) = chain_in {
            let iterations = self.chain_forward(rep, Vec::new(), t, used);
            return longest(rep, iterations, Some(t));
        }
        if let Some(t) = chain_out {
            let iterations = self.chain_backward(rep, t, used);
            return longest(rep, iterations, Some(t));
        }
        if !mandatory {
            return vec![Binding::Repetition {
                iterations: Vec::new(),
                passthrough: None,
            }];
        }

        // unseeded: match one iteration anywhere, then grow forward
        let inner_hint = match hint {
            Some(op) => match first_mandatory(&rep.body) {
                Some(node) => Some((node, op)),
                None => return Vec::new(),
            },
            None => None,
        };
        let Some(first) = self.first_match(&rep.body, &Boundary::default(), inner_hint, used) else {
            return Vec::new();
        };
        let next = chain_tensor_out(self.graph, rep, &first);
        let mut iterations = vec![first];
        if let Some(t) = next {
            iterations = self.chain_forward(rep, iterations, t, used);
        }
        longest(rep, iterations, None)
    }

    /// Grow a chain from `start` by matching iterations fed by the last one
    fn chain_forward(
        &self,
        rep: &Repetition,
        mut iterations: Vec<SubMatch>,
        start: TensorId,
        used: &OpSet,
    ) -> Vec<SubMatch> {
        let Some(port) = rep.body.input_port(rep.chain_in()) else {
            return iterations;
        };
        let mut scratch = used.clone();
        for it in &iterations {
            scratch.extend(it.ops());
        }

        let mut next = start;
        while iterations.len() < rep.max {
            let boundary = Boundary {
                inputs: vec![(port, next)],
                outputs: Vec::new(),
            };
            let Some(it) = self.first_match(&rep.body, &boundary, None, &scratch) else {
                break;
            };
            scratch.extend(it.ops());
            let out = chain_tensor_out(self.graph, rep, &it);
            iterations.push(it);
            match out {
                Some(t) => next = t,
                None => break,
            }
        }
        iterations
    }

    /// Grow a chain backwards from the tensor its last iteration produces
    fn chain_backward(&self, rep: &Repetition, end: TensorId, used: &OpSet) -> Vec<SubMatch> {
        let mut iterations = Vec::new();
        let Some(port) = rep.body.output_port(rep.chain_out()) else {
            return iterations;
        };
        let mut scratch = used.clone();

        let mut prev = end;
        while iterations.len() < rep.max {
            let boundary = Boundary {
                inputs: Vec::new(),
                outputs: vec![(port, prev)],
            };
            let Some(it) = self.first_match(&rep.body, &boundary, None, &scratch) else {
                break;
            };
            scratch.extend(it.ops());
            let input = chain_tensor_in(self.graph, rep, &it);
            iterations.push(it);
            match input {
                Some(t) => prev = t,
                None => break,
            }
        }
        iterations.reverse();
        iterations
    }

    // ========================================================================
    // Acceptance
    // ========================================================================

    fn build_match(&self, pattern: &PatternGraph, sub: &SubMatch) -> Option<Match> {
        let mut ops = sub.member_ops(pattern);
        ops.sort_by_key(|id| self.graph.op_index(*id));

        let (inputs, outputs) = if pattern.declares_ports() {
            let mut inputs = SmallVec::new();
            let mut outputs = SmallVec::new();
            for port in pattern.input_ports() {
                if !sub.collect_inputs(pattern, port.node, port.port, &mut inputs) {
                    return None;
                }
            }
            for port in pattern.output_ports() {
                if !sub.collect_outputs(pattern, port.node, port.port, &mut outputs) {
                    return None;
                }
            }
            (inputs, outputs)
        } else {
            derive_ports(self.graph, &ops)
        };

        let m = Match {
            pattern: pattern.name().to_string(),
            fused_kind: pattern.fused_kind(),
            ops,
            inputs,
            outputs,
        };
        m.check_boundary(self.graph).ok().map(|_| m)
    }
}

/// Lowest-id mandatory node that is not context
fn first_mandatory(pg: &PatternGraph) -> Option<PatternNodeId> {
    pg.nodes()
        .iter()
        .find(|n| n.is_mandatory() && !n.context)
        .map(|n| n.id)
}

/// Map seeds on a composite node onto the external ports of a nested graph
///
/// `None` if the nested graph lacks one of the seeded ports.
fn nested_boundary(pg: &PatternGraph, seeds: &[Seed]) -> Option<Boundary> {
    let mut boundary = Boundary::default();
    for seed in seeds {
        match *seed {
            Seed::Input { port, tensor } => boundary.inputs.push((pg.input_port(port)?, tensor)),
            Seed::Output { offset, tensor } => {
                boundary.outputs.push((pg.output_port(offset)?, tensor))
            }
        }
    }
    Some(boundary)
}

fn chain_tensor_out(graph: &Graph, rep: &Repetition, it: &SubMatch) -> Option<TensorId> {
    let port = rep.body.output_port(rep.chain_out())?;
    match it.output_tensor(graph, &rep.body, port.node, port.port) {
        PortTensor::Bound(t) => Some(t),
        _ => None,
    }
}

fn chain_tensor_in(graph: &Graph, rep: &Repetition, it: &SubMatch) -> Option<TensorId> {
    let port = rep.body.input_port(rep.chain_in())?;
    match it.input_tensor(graph, &rep.body, port.node, port.port) {
        PortTensor::Bound(t) => Some(t),
        _ => None,
    }
}

/// The whole chain as one binding, or nothing if it is shorter than `min`
///
/// An empty chain passes `passthrough` through.
fn longest(
    rep: &Repetition,
    iterations: Vec<SubMatch>,
    passthrough: Option<TensorId>,
) -> Vec<Binding> {
    if iterations.len() < rep.min {
        return Vec::new();
    }
    let passthrough = if iterations.is_empty() { passthrough } else { None };
    vec![Binding::Repetition {
        iterations,
        passthrough,
    }]
}
