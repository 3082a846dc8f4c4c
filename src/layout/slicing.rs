use crate::ir::{PortDirection, PortId, Scope, SymbolId};

use super::graph::{NodeIndex, PipelineContext, RawEdge};

/// One container-scoped segment of a raw edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlicedEdge {
    /// Index of the raw edge this hop belongs to.
    pub edge: usize,
    /// Position of the hop within its chain, producer side first.
    pub order: usize,
    pub from: PortId,
    pub to: PortId,
    pub scope: Scope,
}

impl SlicedEdge {
    /// Both endpoints must sit directly in the scope. A port on the scope container
    /// itself counts when it is used from the inside: an input port as a source, an
    /// output port as a target.
    pub fn is_well_scoped(&self, index: &NodeIndex) -> bool {
        let inside = |port: &PortId, inner_face: PortDirection| {
            if self.scope.container_id() == Some(port.node.as_str()) {
                return port.direction == inner_face;
            }
            Scope::from_parent(index.parent_of(&port.node)) == self.scope
        };
        inside(&self.from, PortDirection::In) && inside(&self.to, PortDirection::Out)
    }
}

/// A cross-iteration edge, kept whole so it can be drawn after layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalEdge {
    pub index: usize,
    pub edge: usize,
    /// Producer port, the container ports it exits through, the container ports it
    /// enters through, then the consumer port.
    pub ports: Vec<PortId>,
    /// `ports[..split]` belong to the producer side.
    pub split: usize,
    /// Producer followed by its ancestors, innermost first; `ports[i]` is owned by
    /// `from_lineage[i]` for `i < split`.
    pub from_lineage: Vec<SymbolId>,
    /// Consumer followed by its ancestors, innermost first; `ports[len - 1 - i]` is
    /// owned by `to_lineage[i]`.
    pub to_lineage: Vec<SymbolId>,
}

impl TemporalEdge {
    pub fn exit_port(&self) -> &PortId {
        &self.ports[self.split - 1]
    }

    pub fn entry_port(&self) -> &PortId {
        &self.ports[self.split]
    }
}

#[derive(Debug, Clone, Default)]
pub struct Slicing {
    pub hops: Vec<SlicedEdge>,
    pub temporal: Vec<TemporalEdge>,
}

impl Slicing {
    pub fn chain(&self, edge: usize) -> Vec<&SlicedEdge> {
        let mut chain: Vec<&SlicedEdge> = self.hops.iter().filter(|hop| hop.edge == edge).collect();
        chain.sort_by_key(|hop| hop.order);
        chain
    }
}

/// Splits every raw edge into hops whose endpoints share a direct parent, climbing the
/// containment tree from both ends until the sides meet.
pub fn slice_edges(index: &NodeIndex, edges: &[RawEdge], ctx: &mut PipelineContext) -> Slicing {
    let mut out = Slicing::default();
    for (edge_idx, edge) in edges.iter().enumerate() {
        slice_edge(index, edge_idx, edge, ctx, &mut out);
    }
    tracing::debug!(
        hops = out.hops.len(),
        temporal = out.temporal.len(),
        "sliced edges"
    );
    out
}

/// Pushes one side out of its container: a fresh port on the container and the
/// container's own parent scope. `None` when the scope is not a known container.
fn push_out(
    index: &NodeIndex,
    scope: &Scope,
    direction: PortDirection,
    ctx: &mut PipelineContext,
) -> Option<(PortId, Scope, bool)> {
    let container = index.get(scope.container_id()?)?;
    let port = ctx.ports.allocate(&container.id, direction);
    Some((port, container.scope(), container.is_temporal()))
}

fn slice_edge(
    index: &NodeIndex,
    edge_idx: usize,
    edge: &RawEdge,
    ctx: &mut PipelineContext,
    out: &mut Slicing,
) {
    let mut from_scope = Scope::from_parent(index.parent_of(&edge.from.node));
    let mut to_scope = Scope::from_parent(index.parent_of(&edge.to.node));
    let mut from_side = vec![edge.from.clone()];
    let mut to_side = vec![edge.to.clone()];
    let mut from_hops: Vec<(PortId, PortId, Scope)> = Vec::new();
    let mut to_hops: Vec<(PortId, PortId, Scope)> = Vec::new();
    let mut temporal = false;
    let mut budget = index.depth(&from_scope) + index.depth(&to_scope);

    // `None` when one side ran out of known containers before the sides met.
    let final_scope = loop {
        if from_scope == to_scope {
            break Some(from_scope);
        }
        if budget == 0 {
            break None;
        }
        budget -= 1;
        let from_depth = index.depth(&from_scope);
        let to_depth = index.depth(&to_scope);

        if from_depth >= to_depth {
            let Some((port, parent, crosses_temporal)) =
                push_out(index, &from_scope, PortDirection::Out, ctx)
            else {
                break None;
            };
            let last = from_side.last().cloned().unwrap_or_else(|| edge.from.clone());
            from_hops.push((last, port.clone(), from_scope));
            from_side.push(port);
            temporal |= crosses_temporal;
            from_scope = parent;
        }
        if to_depth >= from_depth {
            let Some((port, parent, crosses_temporal)) =
                push_out(index, &to_scope, PortDirection::In, ctx)
            else {
                break None;
            };
            let last = to_side.last().cloned().unwrap_or_else(|| edge.to.clone());
            to_hops.push((port.clone(), last, to_scope));
            to_side.push(port);
            temporal |= crosses_temporal;
            to_scope = parent;
        }
    };

    let Some(final_scope) = final_scope else {
        ctx.error(
            Some(&edge.from.node),
            format!(
                "edge {} from `{}` to `{}` never reached a common scope; dropped",
                edge_idx, edge.from, edge.to
            ),
        );
        return;
    };

    if temporal {
        let split = from_side.len();
        let mut ports = from_side;
        ports.extend(to_side.into_iter().rev());
        out.temporal.push(TemporalEdge {
            index: ctx.next_temporal_index(),
            edge: edge_idx,
            ports,
            split,
            from_lineage: index.lineage(&edge.from.node),
            to_lineage: index.lineage(&edge.to.node),
        });
        return;
    }

    let Some(from_last) = from_side.last().cloned() else {
        return;
    };
    let Some(to_last) = to_side.last().cloned() else {
        return;
    };
    let chain = from_hops
        .into_iter()
        .chain(std::iter::once((from_last, to_last, final_scope)))
        .chain(to_hops.into_iter().rev());
    for (order, (from, to, scope)) in chain.enumerate() {
        out.hops.push(SlicedEdge {
            edge: edge_idx,
            order,
            from,
            to,
            scope,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Snapshot, Symbol};
    use crate::layout::discover::discover;
    use crate::layout::fixtures::{scenario_a, scenario_b};

    fn slice(snapshot: &Snapshot) -> (Slicing, NodeIndex, Vec<RawEdge>, PipelineContext) {
        let mut ctx = PipelineContext::new();
        let found = discover(snapshot, &mut ctx).unwrap();
        let slicing = slice_edges(&found.index, &found.raw_edges, &mut ctx);
        (slicing, found.index, found.raw_edges, ctx)
    }

    fn assert_chains_reconstruct(slicing: &Slicing, edges: &[RawEdge], index: &NodeIndex) {
        for (idx, edge) in edges.iter().enumerate() {
            if slicing.temporal.iter().any(|t| t.edge == idx) {
                continue;
            }
            let chain = slicing.chain(idx);
            assert!(!chain.is_empty(), "edge {idx} has no hops");
            assert_eq!(chain[0].from, edge.from);
            assert_eq!(chain[chain.len() - 1].to, edge.to);
            for pair in chain.windows(2) {
                assert_eq!(pair[0].to, pair[1].from);
            }
            for hop in chain {
                assert!(hop.is_well_scoped(index), "badly scoped hop {hop:?}");
            }
        }
    }

    #[test]
    fn scenario_a_hops_are_scoped() {
        let (slicing, index, edges, _) = slice(&scenario_a());
        assert!(slicing.temporal.is_empty());
        assert_chains_reconstruct(&slicing, &edges, &index);

        let container = Scope::Container("C".to_string());
        for data in ["D1", "D2", "D3"] {
            let idx = edges
                .iter()
                .position(|edge| edge.from.node == data)
                .unwrap();
            let chain = slicing.chain(idx);
            assert_eq!(chain.len(), 1);
            assert_eq!(chain[0].scope, container);
        }

        let head = edges.iter().position(|edge| edge.to.node == "D0").unwrap();
        let chain = slicing.chain(head);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].scope, container);
        assert_eq!(chain[0].to, PortId::output("C", 0));
        assert_eq!(chain[1].scope, Scope::Root);
    }

    #[test]
    fn scenario_b_edge_is_deferred() {
        let (slicing, index, edges, _) = slice(&scenario_b());
        assert_eq!(slicing.temporal.len(), 1);
        let temporal = &slicing.temporal[0];
        assert_eq!(edges[temporal.edge].from.node, "D2");
        assert_eq!(edges[temporal.edge].to.node, "O2");
        assert!(slicing.hops.iter().all(|hop| hop.edge != temporal.edge));
        assert_eq!(
            temporal.ports,
            vec![
                PortId::output("D2", 0),
                PortId::output("C1", 0),
                PortId::input("C2", 0),
                PortId::input("O2", 0),
            ]
        );
        assert_eq!(temporal.split, 2);
        assert_eq!(temporal.exit_port(), &PortId::output("C1", 0));
        assert_eq!(temporal.entry_port(), &PortId::input("C2", 0));
        assert_eq!(temporal.from_lineage, vec!["D2", "C1"]);
        assert_eq!(temporal.to_lineage, vec!["O2", "C2"]);
        assert_chains_reconstruct(&slicing, &edges, &index);
    }

    #[test]
    fn deeper_side_climbs_first() {
        // P lives three levels down, Q one level down in a sibling branch.
        let mut snapshot = Snapshot::new("Q");
        snapshot.insert("Q", Symbol::data(Some("B"), Some("OQ"), 0));
        snapshot.insert("OQ", Symbol::op(Some("B"), &[Some("P")], &[]));
        snapshot.insert("P", Symbol::data(Some("A3"), None, 0));
        snapshot.insert("A3", Symbol::container(Some("A2"), &["P"], -1));
        snapshot.insert("A2", Symbol::container(Some("A1"), &["A3"], -1));
        snapshot.insert("A1", Symbol::container(None, &["A2"], -1));
        snapshot.insert("B", Symbol::container(None, &["OQ", "Q"], -1));

        let (slicing, index, edges, ctx) = slice(&snapshot);
        assert_chains_reconstruct(&slicing, &edges, &index);
        let idx = edges.iter().position(|edge| edge.from.node == "P").unwrap();
        let scopes: Vec<String> = slicing
            .chain(idx)
            .iter()
            .map(|hop| hop.scope.to_string())
            .collect();
        assert_eq!(scopes, vec!["A3", "A2", "A1", "root", "B"]);
        assert_eq!(ctx.ports.count("A1", PortDirection::Out), 1);
        assert_eq!(ctx.ports.count("B", PortDirection::In), 1);
    }

    #[test]
    fn container_ports_grow_per_edge() {
        let (_, _, _, ctx) = slice(&scenario_a());
        let mut snapshot = scenario_a();
        snapshot.insert("E", Symbol::data(None, Some("O2"), 0));
        snapshot.insert("O2", Symbol::op(None, &[Some("D0"), Some("D1"), Some("D2")], &[]));
        snapshot.head = "E".to_string();
        let (_, _, _, wider) = slice(&snapshot);
        assert_eq!(ctx.ports.count("C", PortDirection::Out), 1);
        let indices: Vec<usize> = wider
            .ports
            .ports("C", PortDirection::Out)
            .iter()
            .map(|port| port.index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn edges_inside_one_iteration_stay_ordinary() {
        let (slicing, _, edges, _) = slice(&scenario_b());
        let inner = edges
            .iter()
            .position(|edge| edge.from.node == "D1" && edge.to.node == "O1")
            .unwrap();
        let chain = slicing.chain(inner);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].scope, Scope::Container("C1".to_string()));
    }

    #[test]
    fn edges_from_unknown_containers_are_dropped() {
        use crate::layout::graph::{GraphNode, NodeKind};

        let mut index = NodeIndex::default();
        index.insert(GraphNode {
            id: "A".to_string(),
            kind: NodeKind::Op,
            parent: Some("GHOST".to_string()),
        });
        index.insert(GraphNode {
            id: "B".to_string(),
            kind: NodeKind::Data,
            parent: None,
        });
        let edges = vec![RawEdge {
            from: PortId::output("A", 0),
            to: PortId::input("B", 0),
            data: "B".to_string(),
            arg_name: "0".to_string(),
        }];

        let mut ctx = PipelineContext::new();
        let slicing = slice_edges(&index, &edges, &mut ctx);
        assert!(slicing.hops.is_empty());
        assert!(slicing.temporal.is_empty());
        assert_eq!(ctx.diagnostics.len(), 1);
        assert_eq!(ctx.diagnostics[0].node.as_deref(), Some("A"));
        assert!(ctx.diagnostics[0].message.contains("never reached a common scope"));
    }
}
