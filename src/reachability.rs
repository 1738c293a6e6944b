//! Mark phase of the shading mark-and-sweep.
//!
//! Walks the class graph from its entry points and flags every class that can
//! be reached through recorded references. The sweep happens later, when the
//! assembler only writes visited classes.

use crate::graph::ClassId;

/// Traversal capabilities a frozen graph hands to the mark phase.
pub trait Reachability {
    fn roots(&self) -> impl Iterator<Item = ClassId> + '_;

    fn neighbors(&self, id: ClassId) -> impl Iterator<Item = ClassId> + '_;

    /// Returns `true` if the node was not visited before.
    fn mark_visited(&mut self, id: ClassId) -> bool;

    fn is_visited(&self, id: ClassId) -> bool;
}

/// Marks everything reachable from the roots and returns how many nodes were newly marked.
pub fn mark_reachable<G: Reachability>(graph: &mut G) -> usize {
    let mut stack: Vec<ClassId> = graph.roots().collect();
    stack.reverse();

    let mut marked = 0usize;
    while let Some(id) = stack.pop() {
        if !graph.mark_visited(id) {
            continue;
        }
        marked += 1;

        let pending: Vec<ClassId> = graph
            .neighbors(id)
            .filter(|n| !graph.is_visited(*n))
            .collect();
        stack.extend(pending.into_iter().rev());
    }

    marked
}
