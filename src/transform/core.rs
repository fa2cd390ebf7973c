//! Match collection and the match-then-fuse loop
//!
//! [`match_pattern`] turns the per-anchor matches of the nested matcher into
//! a list of pairwise disjoint matches that can all be fused together
//! without creating a cycle.

use crate::error::FusionResult;
use crate::graph::{Graph, OpSet};
use crate::pattern::{creates_cycle, Match, NestedMatcher, PatternGraph};

use super::fuse::{fuse, FuseReport};

/// Collect disjoint matches of `pattern` in `graph`
///
/// Anchor candidates are visited in topological order and candidates already
/// covered by an accepted match are skipped. The first embedding found at an
/// anchor is kept only if it is disjoint from every accepted match;
/// overlapping embeddings are discarded, not retried. An embedding whose
/// contraction together with the accepted matches would create a cycle is
/// rejected and the search at that anchor continues. Discovery order is
/// preserved.
///
/// An empty result is the normal "no match" outcome.
pub fn match_pattern(graph: &Graph, pattern: &PatternGraph) -> Vec<Match> {
    let matcher = NestedMatcher::new(graph);
    let Some(anchor) = matcher.anchor(pattern) else {
        return Vec::new();
    };

    let mut matches = Vec::new();
    let mut covered = OpSet::default();
    let mut accepted: Vec<OpSet> = Vec::new();
    let none = OpSet::default();

    for op in anchor.candidates {
        if covered.contains(&op) {
            continue;
        }
        let found = matcher.match_at(pattern, anchor.node, op, &none, &mut |m| {
            if m.ops.iter().any(|id| covered.contains(id)) {
                return true;
            }
            let contracted: Vec<&OpSet> = accepted.iter().collect();
            !creates_cycle(graph, &m.op_set(), &contracted)
        });
        let Some(m) = found else { continue };

        if m.ops.iter().any(|id| covered.contains(id)) {
            log::trace!("pattern {}: discarding overlapping match at {}", pattern.name(), op);
            continue;
        }
        log::debug!(
            "pattern {} matched {} ops at anchor {}",
            pattern.name(),
            m.len(),
            op
        );
        covered.extend(m.ops.iter().copied());
        accepted.push(m.op_set());
        matches.push(m);
    }

    matches
}

/// Match `pattern` once and fuse every match
pub fn apply_pattern(graph: &mut Graph, pattern: &PatternGraph) -> FusionResult<FuseReport> {
    let matches = match_pattern(graph, pattern);
    if matches.is_empty() {
        return Ok(FuseReport::default());
    }
    fuse(graph, &matches)
}

/// Apply `pattern` until it stops matching or `max_iterations` is reached
pub fn apply_until_fixed_point(
    graph: &mut Graph,
    pattern: &PatternGraph,
    max_iterations: usize,
) -> FusionResult<FuseReport> {
    let mut total = FuseReport::default();

    for _ in 0..max_iterations {
        let report = apply_pattern(graph, pattern)?;
        if report.is_empty() {
            break;
        }
        total.merge(report);
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Op, OpId};
    use crate::pattern::in_edge;

    fn conv_relu_pattern() -> PatternGraph {
        let mut pg = PatternGraph::new("conv_relu");
        let conv = pg.append_op("conv", &[]);
        let relu = pg.append_op("relu", &[in_edge(0, conv, 0)]);
        pg.create_input_port(0, conv, 0);
        pg.create_output_port(0, relu, 0);
        pg
    }

    /// Two independent conv -> relu chains feeding an add
    fn make_two_branches() -> (Graph, Vec<OpId>) {
        let mut graph = Graph::new();
        let x = graph.add_input("x");
        let mut ids = Vec::new();
        let mut outs = Vec::new();
        for branch in 0..2 {
            let c = graph.add_tensor(format!("c{}", branch));
            let r = graph.add_tensor(format!("r{}", branch));
            ids.push(
                graph
                    .add_op(Op::new("conv").with_inputs([x]).with_outputs([c]))
                    .unwrap(),
            );
            ids.push(
                graph
                    .add_op(Op::new("relu").with_inputs([c]).with_outputs([r]))
                    .unwrap(),
            );
            outs.push(r);
        }
        let y = graph.add_tensor("y");
        ids.push(
            graph
                .add_op(Op::new("add").with_inputs(outs).with_outputs([y]))
                .unwrap(),
        );
        graph.mark_output(y).unwrap();
        (graph, ids)
    }

    #[test]
    fn test_match_pattern_collects_disjoint_matches() {
        let (graph, ids) = make_two_branches();
        let matches = match_pattern(&graph, &conv_relu_pattern());

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].ops, vec![ids[0], ids[1]]);
        assert_eq!(matches[1].ops, vec![ids[2], ids[3]]);
    }

    #[test]
    fn test_match_pattern_no_match_is_empty() {
        let (graph, _) = make_two_branches();
        let mut pg = PatternGraph::new("gelu");
        pg.append_op("gelu", &[]);
        assert!(match_pattern(&graph, &pg).is_empty());
    }

    #[test]
    fn test_overlapping_candidates_are_disjoint() {
        // relu -> relu -> relu, pattern relu -> relu
        let mut graph = Graph::new();
        let mut t = graph.add_input("x");
        for i in 0..3 {
            let out = graph.add_tensor(format!("r{}", i));
            graph
                .add_op(Op::new("relu").with_inputs([t]).with_outputs([out]))
                .unwrap();
            t = out;
        }
        graph.mark_output(t).unwrap();

        let mut pg = PatternGraph::new("relu_relu");
        let a = pg.append_op("relu", &[]);
        pg.append_op("relu", &[in_edge(0, a, 0)]);

        let matches = match_pattern(&graph, &pg);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].ops, vec![OpId(0), OpId(1)]);
    }

    #[test]
    fn test_overlapping_embedding_is_discarded_not_retried() {
        // r1 -> add1 <- r2 -> add2; the first embedding at r2 reuses add1
        let mut graph = Graph::new();
        let x = graph.add_input("x");
        let a = graph.add_tensor("a");
        let b = graph.add_tensor("b");
        let s = graph.add_tensor("s");
        let u = graph.add_tensor("u");
        let r1 = graph
            .add_op(Op::new("relu").with_inputs([x]).with_outputs([a]))
            .unwrap();
        graph
            .add_op(Op::new("relu").with_inputs([x]).with_outputs([b]))
            .unwrap();
        let add1 = graph
            .add_op(Op::new("add").with_inputs([a, b]).with_outputs([s]))
            .unwrap();
        graph
            .add_op(Op::new("add").with_inputs([b, x]).with_outputs([u]))
            .unwrap();
        graph.mark_output(s).unwrap();
        graph.mark_output(u).unwrap();

        let mut pg = PatternGraph::new("relu_add");
        let relu = pg.append_op("relu", &[]);
        let add = pg.append_op("add", &[in_edge(0, relu, 0)]);
        pg.allow_commutative_inputs(add);

        let matches = match_pattern(&graph, &pg);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].ops, vec![r1, add1]);
    }

    #[test]
    fn test_apply_until_fixed_point() {
        let (mut graph, _) = make_two_branches();
        let report = apply_until_fixed_point(&mut graph, &conv_relu_pattern(), 10).unwrap();

        assert_eq!(report.fused.len(), 2);
        assert_eq!(report.removed.len(), 4);
        assert_eq!(graph.op_count(), 3);
        assert!(graph.validate().is_ok());
    }
}
