//! Cycle check for contracting op groups
//!
//! Fusing a match contracts its ops into one. [`creates_cycle`] tells whether
//! that contraction, together with groups already contracted, would turn the
//! [`Graph`] cyclic.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::graph::{Graph, OpId, OpSet};

/// Check whether contracting `group` into one op would create a cycle
///
/// A cycle appears iff some path leaves the group and re-enters it. Each set
/// in `contracted` is treated as if it had already been contracted into a
/// single op, so paths through one member continue from all of its members.
pub fn creates_cycle(graph: &Graph, group: &OpSet, contracted: &[&OpSet]) -> bool {
    let mut owner: FxHashMap<OpId, usize> = FxHashMap::default();
    for (index, set) in contracted.iter().enumerate() {
        for &op in set.iter() {
            owner.insert(op, index);
        }
    }

    let mut queue: VecDeque<OpId> = VecDeque::new();
    for &op in group {
        for succ in graph.successors(op) {
            if !group.contains(&succ) {
                queue.push_back(succ);
            }
        }
    }

    let mut visited_ops = OpSet::default();
    let mut visited_sets: FxHashSet<usize> = FxHashSet::default();

    while let Some(op) = queue.pop_front() {
        if group.contains(&op) {
            return true;
        }
        let members: Vec<OpId> = match owner.get(&op) {
            Some(&index) => {
                if !visited_sets.insert(index) {
                    continue;
                }
                contracted[index].iter().copied().collect()
            }
            None => {
                if !visited_ops.insert(op) {
                    continue;
                }
                vec![op]
            }
        };
        for member in members {
            for succ in graph.successors(member) {
                if group.contains(&succ) {
                    return true;
                }
                queue.push_back(succ);
            }
        }
    }

    false
}
