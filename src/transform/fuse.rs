//! Graph rewrite for accepted matches
//!
//! Each match is replaced by one fused op that takes over the match's
//! external inputs and outputs in declared port order. The removed ops are
//! kept on the fused op as its [`FusedBody`].

use crate::error::FusionResult;
use crate::graph::{FusedBody, Graph, Op, OpId, TensorId};
use crate::pattern::{creates_cycle, Match};

/// Result of a fuse call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FuseReport {
    /// Ids of the inserted fused ops, one per match
    pub fused: Vec<OpId>,
    /// Ids of the removed ops
    pub removed: Vec<OpId>,
}

impl FuseReport {
    /// Check if nothing was rewritten
    pub fn is_empty(&self) -> bool {
        self.fused.is_empty()
    }

    /// Merge another report into this one
    pub fn merge(&mut self, other: FuseReport) {
        self.fused.extend(other.fused);
        self.removed.extend(other.removed);
    }
}

/// Fuse every match in order
///
/// Stops at the first match that would break the graph's invariants and
/// returns [`FuseInvariantViolation`](crate::error::FusionError::FuseInvariantViolation);
/// that match is left unapplied, earlier ones stay applied.
pub fn fuse(graph: &mut Graph, matches: &[Match]) -> FusionResult<FuseReport> {
    let mut report = FuseReport::default();

    for m in matches {
        let id = fuse_match(graph, m)?;
        report.fused.push(id);
        report.removed.extend(m.ops.iter().copied());
    }

    Ok(report)
}

/// Replace one match by a fused op
pub fn fuse_match(graph: &mut Graph, m: &Match) -> FusionResult<OpId> {
    if m.is_empty() {
        return Err(m.violation("match binds no op"));
    }
    m.check_boundary(graph)?;
    if creates_cycle(graph, &m.op_set(), &[]) {
        return Err(m.violation("contraction creates a cycle"));
    }

    let inputs = m.resolve_inputs(graph)?;
    let outputs = m.resolve_outputs(graph)?;

    let mut body = Vec::with_capacity(m.ops.len());
    for &id in &m.ops {
        let op = graph
            .remove_op(id)
            .ok_or_else(|| m.violation(format!("{} vanished while fusing", id)))?;
        body.push((id, op));
    }

    let internal: Vec<TensorId> = body
        .iter()
        .flat_map(|(_, op)| op.outputs.iter().copied())
        .filter(|t| !outputs.contains(t))
        .collect();
    let kinds: Vec<String> = body.iter().map(|(_, op)| op.kind.clone()).collect();

    let mut fused = Op::new(m.fused_kind.clone())
        .with_inputs(inputs)
        .with_outputs(outputs)
        .with_attr("pattern", m.pattern.as_str())
        .with_attr("fused_kinds", kinds);
    fused.body = Some(Box::new(FusedBody {
        pattern: m.pattern.clone(),
        ops: body,
    }));
    let id = graph.add_op(fused)?;

    for t in internal {
        graph
            .remove_tensor(t)
            .map_err(|e| m.violation(format!("internal tensor {} survives: {}", t, e)))?;
    }

    log::debug!(
        "fused {} ops of pattern {} into {} ({})",
        m.len(),
        m.pattern,
        id,
        m.fused_kind
    );
    Ok(id)
}
