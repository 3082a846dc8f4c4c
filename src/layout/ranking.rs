use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::ir::SymbolId;

/// A dependency between two siblings of one scope, producer first.
pub(super) type RankEdge = (SymbolId, SymbolId);

/// One end of a hop as seen from inside a scope.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Endpoint {
    Sibling(SymbolId),
    /// A port on the scope's own boundary.
    Boundary,
}

/// A hop reduced to what sibling ordering needs. Slots are where along its owner's port
/// row each end attaches, as a fraction in `0..1`.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct PortLink {
    pub from: Endpoint,
    pub from_slot: f32,
    pub to: Endpoint,
    pub to_slot: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sweep {
    /// Order by producers, first rank to last.
    Down,
    /// Order by consumers, last rank to first.
    Up,
}

/// Reorders every rank by the barycenter of the ports each node connects to.
///
/// A neighbour's coordinate is its index in its rank plus the slot of the port the hop
/// uses, so the producer of argument 0 settles left of the producer of argument 1.
/// Boundary ports are pinned: inputs above the first rank, outputs below the last, each
/// spread over the widest rank.
pub(super) fn order_siblings(rank_nodes: &mut [Vec<SymbolId>], links: &[PortLink], passes: usize) {
    if links.is_empty() {
        return;
    }
    let width = rank_nodes.iter().map(Vec::len).max().unwrap_or(0) as f32;
    let ranks: Vec<usize> = (0..rank_nodes.len()).collect();

    for _ in 0..passes.max(1) {
        for sweep in [Sweep::Down, Sweep::Up] {
            let order: Box<dyn Iterator<Item = &usize>> = match sweep {
                Sweep::Down => Box::new(ranks.iter()),
                Sweep::Up => Box::new(ranks.iter().rev()),
            };
            for &rank in order {
                if rank_nodes[rank].len() <= 1 {
                    continue;
                }
                let mut keyed: Vec<(f32, usize, SymbolId)> = {
                    let positions = bucket_positions(rank_nodes);
                    rank_nodes[rank]
                        .iter()
                        .enumerate()
                        .map(|(current, id)| {
                            let score = barycenter(id, links, sweep, &positions, width)
                                .unwrap_or(current as f32);
                            (score, current, id.clone())
                        })
                        .collect()
                };
                keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                rank_nodes[rank] = keyed.into_iter().map(|(_, _, id)| id).collect();
            }
        }
    }
}

fn bucket_positions(rank_nodes: &[Vec<SymbolId>]) -> HashMap<&str, usize> {
    rank_nodes
        .iter()
        .flat_map(|bucket| bucket.iter().enumerate().map(|(idx, id)| (id.as_str(), idx)))
        .collect()
}

fn barycenter(
    id: &str,
    links: &[PortLink],
    sweep: Sweep,
    positions: &HashMap<&str, usize>,
    width: f32,
) -> Option<f32> {
    let (sum, count) = links
        .iter()
        .filter_map(|link| {
            let (own, other, slot) = match sweep {
                Sweep::Down => (&link.to, &link.from, link.from_slot),
                Sweep::Up => (&link.from, &link.to, link.to_slot),
            };
            if !matches!(own, Endpoint::Sibling(own) if own == id) {
                return None;
            }
            match other {
                Endpoint::Sibling(other) => positions.get(other.as_str()).map(|&at| at as f32 + slot),
                Endpoint::Boundary => Some(slot * width),
            }
        })
        .fold((0.0, 0usize), |(sum, count), at| (sum + at, count + 1));
    (count > 0).then(|| sum / count as f32)
}

/// Longest-path ranks over a topological order. Cycles are broken at the remaining node
/// earliest in `node_order`.
pub(super) fn compute_ranks(
    node_ids: &[SymbolId],
    edges: &[RankEdge],
    node_order: &HashMap<SymbolId, usize>,
) -> HashMap<SymbolId, usize> {
    let set: HashSet<&SymbolId> = node_ids.iter().collect();
    let mut adj: HashMap<&SymbolId, Vec<&SymbolId>> = HashMap::new();
    let mut indeg: HashMap<&SymbolId, usize> = node_ids.iter().map(|id| (id, 0)).collect();

    for (from, to) in edges {
        if from == to || !set.contains(from) || !set.contains(to) {
            continue;
        }
        adj.entry(from).or_default().push(to);
        if let Some(deg) = indeg.get_mut(to) {
            *deg += 1;
        }
    }

    let order_key = |id: &str| node_order.get(id).copied().unwrap_or(usize::MAX);

    let mut ready: BinaryHeap<Reverse<(usize, &SymbolId)>> = BinaryHeap::new();
    for id in node_ids {
        if indeg.get(id).copied().unwrap_or(0) == 0 {
            ready.push(Reverse((order_key(id.as_str()), id)));
        }
    }

    let mut order: Vec<&SymbolId> = Vec::with_capacity(set.len());
    let mut processed: HashSet<&SymbolId> = HashSet::new();
    loop {
        while let Some(Reverse((_key, id))) = ready.pop() {
            if !processed.insert(id) {
                continue;
            }
            order.push(id);
            if let Some(nexts) = adj.get(id) {
                for next in nexts {
                    if processed.contains(next) {
                        continue;
                    }
                    if let Some(deg) = indeg.get_mut(next) {
                        *deg = deg.saturating_sub(1);
                        if *deg == 0 {
                            ready.push(Reverse((order_key(next.as_str()), *next)));
                        }
                    }
                }
            }
        }

        if processed.len() >= set.len() {
            break;
        }

        // Cycle: treat the incoming edges of the earliest remaining node as back-edges.
        let best = node_ids
            .iter()
            .filter(|id| !processed.contains(id))
            .min_by_key(|id| order_key(id.as_str()));
        match best {
            Some(id) => ready.push(Reverse((order_key(id.as_str()), id))),
            None => break,
        }
    }

    let order_index: HashMap<&SymbolId, usize> =
        order.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();

    let mut ranks: HashMap<SymbolId, usize> = HashMap::new();
    for node in &order {
        let rank = *ranks.entry((*node).clone()).or_insert(0);
        if let Some(nexts) = adj.get(node) {
            let from_idx = order_index.get(node).copied().unwrap_or(0);
            for next in nexts {
                let to_idx = order_index.get(next).copied().unwrap_or(from_idx);
                if to_idx <= from_idx {
                    continue;
                }
                let entry = ranks.entry((*next).clone()).or_insert(0);
                *entry = (*entry).max(rank + 1);
            }
        }
    }

    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<SymbolId> {
        list.iter().map(|id| id.to_string()).collect()
    }

    fn edge(from: &str, to: &str) -> RankEdge {
        (from.to_string(), to.to_string())
    }

    fn declaration_order(nodes: &[SymbolId]) -> HashMap<SymbolId, usize> {
        nodes
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect()
    }

    #[test]
    fn ranks_follow_longest_path() {
        let nodes = ids(&["D1", "D2", "O1", "D0"]);
        let edges = vec![edge("D1", "O1"), edge("D2", "O1"), edge("O1", "D0"), edge("D1", "D0")];
        let ranks = compute_ranks(&nodes, &edges, &declaration_order(&nodes));
        assert_eq!(ranks["D1"], 0);
        assert_eq!(ranks["D2"], 0);
        assert_eq!(ranks["O1"], 1);
        assert_eq!(ranks["D0"], 2);
    }

    #[test]
    fn cycles_still_get_ranks() {
        let nodes = ids(&["A", "B"]);
        let edges = vec![edge("A", "B"), edge("B", "A")];
        let ranks = compute_ranks(&nodes, &edges, &declaration_order(&nodes));
        assert_eq!(ranks["A"], 0);
        assert_eq!(ranks["B"], 1);
    }

    fn link(from: &str, from_slot: f32, to: &str, to_slot: f32) -> PortLink {
        let end = |id: &str| {
            if id == "scope" {
                Endpoint::Boundary
            } else {
                Endpoint::Sibling(id.to_string())
            }
        };
        PortLink {
            from: end(from),
            from_slot,
            to: end(to),
            to_slot,
        }
    }

    #[test]
    fn ordering_untangles_crossed_pairs() {
        let mut buckets = vec![ids(&["a", "b"]), ids(&["x", "y"])];
        let links = vec![link("a", 0.5, "y", 0.5), link("b", 0.5, "x", 0.5)];
        order_siblings(&mut buckets, &links, 2);
        assert_eq!(buckets[0], ids(&["a", "b"]));
        assert_eq!(buckets[1], ids(&["y", "x"]));
    }

    #[test]
    fn producers_follow_argument_order() {
        // `q` feeds argument 0 of `op`, `p` feeds argument 1.
        let mut buckets = vec![ids(&["p", "q"]), ids(&["op"])];
        let links = vec![link("q", 0.5, "op", 0.25), link("p", 0.5, "op", 0.75)];
        order_siblings(&mut buckets, &links, 1);
        assert_eq!(buckets[0], ids(&["q", "p"]));
    }

    #[test]
    fn boundary_inputs_pin_the_first_rank() {
        let mut buckets = vec![ids(&["b", "a"]), ids(&["op"])];
        let links = vec![
            link("scope", 0.25, "a", 0.5),
            link("scope", 0.75, "b", 0.5),
            link("a", 0.5, "op", 0.5),
            link("b", 0.5, "op", 0.5),
        ];
        order_siblings(&mut buckets, &links, 1);
        assert_eq!(buckets[0], ids(&["a", "b"]));
    }

    #[test]
    fn unlinked_ranks_keep_their_order() {
        let mut buckets = vec![ids(&["c", "a", "b"])];
        order_siblings(&mut buckets, &[], 3);
        assert_eq!(buckets[0], ids(&["c", "a", "b"]));
    }
}
