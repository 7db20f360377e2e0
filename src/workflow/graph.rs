//! Persistence ordering over entity kinds.
//!
//! Kinds are nodes; every relation edge `child -> parent` contributes a dependency, so
//! the parent must be persisted before the child. Ordering uses Kahn's algorithm:
//!
//! 1. Keep only edges whose endpoints are both in the node set
//! 2. Compute each node's in-degree (number of kept edges pointing into it)
//! 3. Seed a FIFO queue with zero in-degree nodes, in node order
//! 4. Pop a node, emit it, decrement its dependents; enqueue those reaching zero
//! 5. If fewer nodes were emitted than exist, the leftovers sit on a cycle
//!
//! Node order is the order persistence bindings were declared, and dependents are
//! visited in the order relations were declared, so a fixed declaration order always
//! yields the same persist order.

use std::collections::{HashMap, VecDeque};

use crate::{
    error::Error,
    workflow::{kind::KindId, relation::RelationEdge},
};

/// Order `nodes` so that every dependency's parent precedes its child.
///
/// `dependencies` yields `(child, parent)` pairs. Pairs with an endpoint outside `nodes`
/// are ignored. Fails with [`Error::CyclicDependency`] naming the kinds that could not be
/// ordered; a partial order is never returned.
pub fn topological_order<D>(nodes: &[KindId], dependencies: D) -> Result<Vec<KindId>, Error>
where
    D: IntoIterator<Item = (KindId, KindId)>,
{
    let mut in_degree: HashMap<KindId, usize> = HashMap::with_capacity(nodes.len());
    let mut dependents: HashMap<KindId, Vec<KindId>> = HashMap::with_capacity(nodes.len());

    for &node in nodes {
        in_degree.entry(node).or_insert(0);
        dependents.entry(node).or_default();
    }

    for (child, parent) in dependencies {
        if !in_degree.contains_key(&child) || !in_degree.contains_key(&parent) {
            continue;
        }

        dependents.entry(parent).or_default().push(child);
        *in_degree.entry(child).or_insert(0) += 1;
    }

    let mut queue: VecDeque<KindId> = VecDeque::new();
    for &node in nodes {
        // Duplicated nodes are only seeded once
        if in_degree.get(&node) == Some(&0) && !queue.contains(&node) {
            queue.push_back(node);
        }
    }

    let mut order = Vec::with_capacity(in_degree.len());
    while let Some(node) = queue.pop_front() {
        order.push(node);

        for dependent in dependents.get(&node).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*dependent);
                }
            }
        }
    }

    if order.len() != in_degree.len() {
        let mut unresolved = Vec::new();
        for &node in nodes {
            if !order.contains(&node) && !unresolved.contains(&node) {
                unresolved.push(node);
            }
        }

        return Err(Error::CyclicDependency { unresolved });
    }

    Ok(order)
}

/// Order the persisted kinds using the declared relation edges.
pub fn sort<S, K>(bound: &[KindId], relations: &[RelationEdge<S, K>]) -> Result<Vec<KindId>, Error> {
    topological_order(
        bound,
        relations
            .iter()
            .map(|relation| (relation.child(), relation.parent())),
    )
}
