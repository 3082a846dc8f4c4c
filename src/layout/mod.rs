pub mod discover;
pub mod engine;
pub mod error;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod graph;
pub mod invoke;
mod ranking;
pub mod routing;
pub mod slicing;
pub mod temporal;
pub mod tree;
pub mod types;

pub use engine::{LayeredEngine, LayoutEngine, ScopeLayout, ScopeRequest};
pub use error::{EngineError, LayoutError};
pub use tree::ROOT_ID;
pub use types::*;

use std::collections::{BTreeSet, HashMap};

use crate::config::LayoutConfig;
use crate::ir::{Snapshot, SymbolId};

use discover::discover;
use graph::{PipelineContext, RawEdge};
use invoke::{Placed, invoke};
use slicing::{Slicing, slice_edges};
use temporal::synthesize;
use tree::{LayoutTree, TreeNode, build_tree};

/// Runs the whole pipeline on one snapshot: discovery, slicing, tree building, bottom-up
/// engine invocation and temporal edge synthesis.
pub async fn compute_layout<E: LayoutEngine + ?Sized>(
    snapshot: &Snapshot,
    config: &LayoutConfig,
    engine: &E,
) -> Result<Layout, LayoutError> {
    let mut ctx = PipelineContext::new();
    let found = discover(snapshot, &mut ctx)?;
    let slicing = slice_edges(&found.index, &found.raw_edges, &mut ctx);
    let tree = build_tree(snapshot, &found.index, &slicing, &ctx.ports, config);
    let placed = invoke(&tree, engine, config, &mut ctx).await?;

    let root = assemble(&tree, &placed);
    let origins = absolute_origins(&tree, &placed);
    let mut edges = join_sliced(&found.raw_edges, &slicing, &placed, &origins);
    edges.extend(synthesize(&slicing.temporal, &found.raw_edges, &placed, config));

    tracing::debug!(
        head = %snapshot.head,
        nodes = tree.node_count(),
        edges = edges.len(),
        diagnostics = ctx.diagnostics.len(),
        "layout computed"
    );
    Ok(Layout {
        width: root.width,
        height: root.height,
        root,
        edges,
        diagnostics: ctx.diagnostics,
    })
}

/// [`compute_layout`] driven to completion on the current thread.
pub fn compute_layout_blocking<E: LayoutEngine + ?Sized>(
    snapshot: &Snapshot,
    config: &LayoutConfig,
    engine: &E,
) -> Result<Layout, LayoutError> {
    futures::executor::block_on(compute_layout(snapshot, config, engine))
}

/// Visible nodes in pre-order, parents before children.
fn visible_preorder<'a>(tree: &'a LayoutTree, placed: &Placed) -> Vec<&'a TreeNode> {
    let mut order = Vec::new();
    let mut stack = vec![tree.root()];
    while let Some(node) = stack.pop() {
        order.push(node);
        if placed.rejected.contains_key(&node.id) {
            continue;
        }
        stack.extend(node.children.iter().rev().filter_map(|child| tree.get(child)));
    }
    order
}

fn assemble(tree: &LayoutTree, placed: &Placed) -> NodeLayout {
    let mut built: HashMap<&str, NodeLayout> = HashMap::new();
    for node in visible_preorder(tree, placed).into_iter().rev() {
        let rejected = placed.rejected.get(&node.id);
        let children = if rejected.is_some() {
            Vec::new()
        } else {
            node.children
                .iter()
                .filter_map(|child| built.remove(child.as_str()))
                .collect()
        };
        let mut payload = node.payload.clone();
        if let (Some(_), NodePayload::Container { expanded, .. }) = (rejected, &mut payload) {
            *expanded = false;
        }
        let layout = match placed.get(&node.id) {
            Some(placement) => NodeLayout {
                id: node.id.clone(),
                x: placement.x,
                y: placement.y,
                width: placement.width,
                height: placement.height,
                payload,
                ports: placement.ports.clone(),
                children,
                error: rejected.cloned(),
            },
            None => NodeLayout {
                id: node.id.clone(),
                x: 0.0,
                y: 0.0,
                width: 0.0,
                height: 0.0,
                payload,
                ports: Vec::new(),
                children,
                error: rejected.cloned(),
            },
        };
        built.insert(node.id.as_str(), layout);
    }
    built.remove(ROOT_ID).unwrap_or_else(|| NodeLayout {
        id: ROOT_ID.to_string(),
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
        payload: NodePayload::Root,
        ports: Vec::new(),
        children: Vec::new(),
        error: None,
    })
}

fn absolute_origins(tree: &LayoutTree, placed: &Placed) -> HashMap<SymbolId, Point> {
    let mut origins: HashMap<SymbolId, Point> = HashMap::new();
    for node in visible_preorder(tree, placed) {
        let parent = node
            .parent
            .as_ref()
            .and_then(|parent| origins.get(parent))
            .copied()
            .unwrap_or_default();
        let local = placed
            .get(&node.id)
            .map(|placement| Point::new(placement.x, placement.y))
            .unwrap_or_default();
        origins.insert(node.id.clone(), parent.offset(local.x, local.y));
    }
    origins
}

/// Joins the routed hops of every non-temporal raw edge into one absolute polyline.
/// Hops hidden inside collapsed or rejected containers are skipped, so the polyline
/// ends at the outermost visible boundary port.
fn join_sliced(
    raw_edges: &[RawEdge],
    slicing: &Slicing,
    placed: &Placed,
    origins: &HashMap<SymbolId, Point>,
) -> Vec<EdgeLayout> {
    let temporal: BTreeSet<usize> = slicing.temporal.iter().map(|t| t.edge).collect();
    let mut out = Vec::new();
    for (idx, raw) in raw_edges.iter().enumerate() {
        if temporal.contains(&idx) {
            continue;
        }
        let mut points: Vec<Point> = Vec::new();
        let mut scopes = Vec::new();
        let mut ends = None;
        for hop in slicing.chain(idx) {
            let owner = hop.scope.container_id().unwrap_or(ROOT_ID);
            if !placed.is_visible(owner) {
                continue;
            }
            let (Some(route), Some(origin)) = (placed.route(idx, hop.order), origins.get(owner))
            else {
                continue;
            };
            for point in &route.points {
                let at = origin.offset(point.x, point.y);
                if points.last() != Some(&at) {
                    points.push(at);
                }
            }
            scopes.push(hop.scope.clone());
            ends = match ends {
                None => Some((hop.from.clone(), hop.to.clone())),
                Some((from, _)) => Some((from, hop.to.clone())),
            };
        }
        let Some((from, to)) = ends else {
            continue;
        };
        out.push(EdgeLayout {
            edge: idx,
            from,
            to,
            data: raw.data.clone(),
            arg_name: raw.arg_name.clone(),
            kind: EdgeKind::Sliced { scopes },
            points,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{PortId, Scope};
    use super::fixtures::{scenario_a, scenario_b, shared_inputs};

    fn layout_of(snapshot: &Snapshot) -> Layout {
        let config = LayoutConfig::default();
        compute_layout_blocking(snapshot, &config, &LayeredEngine::new(config.clone())).unwrap()
    }

    #[test]
    fn sliced_edges_join_into_one_polyline() {
        let mut snapshot = scenario_a();
        snapshot.set_expanded("C", true);
        let layout = layout_of(&snapshot);
        let head = layout
            .edges
            .iter()
            .find(|edge| edge.to.node == "D0")
            .unwrap();
        assert_eq!(head.from, PortId::output("O1", 0));
        assert_eq!(
            head.kind,
            EdgeKind::Sliced {
                scopes: vec![Scope::Container("C".to_string()), Scope::Root],
            }
        );
        let positions = layout.absolute_positions();
        let port_at = |node: &str, port: PortId| {
            let found = layout.find(node).unwrap();
            let local = found.ports.iter().find(|p| p.id == port).unwrap();
            positions[node].offset(local.x, local.y)
        };
        let close = |a: Option<&Point>, b: Point| {
            a.is_some_and(|a| (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3)
        };
        assert!(close(head.points.first(), port_at("O1", PortId::output("O1", 0))));
        assert!(close(head.points.last(), port_at("D0", PortId::input("D0", 0))));
    }

    #[test]
    fn collapsed_scopes_shorten_sliced_edges() {
        let layout = layout_of(&scenario_a());
        assert_eq!(layout.edges.len(), 1);
        assert_eq!(layout.edges[0].from, PortId::output("C", 0));
        assert!(layout.find("O1").is_none());
        assert_eq!(layout.root.children.len(), 2);
    }

    #[test]
    fn scenario_b_has_one_temporal_polyline() {
        let layout = layout_of(&scenario_b());
        let temporal: Vec<&EdgeLayout> = layout
            .edges
            .iter()
            .filter(|edge| edge.kind == EdgeKind::Temporal)
            .collect();
        assert_eq!(temporal.len(), 1);
        let positions = layout.absolute_positions();
        assert!(positions["C1"].x < positions["C2"].x);
    }

    #[test]
    fn leaf_inputs_are_drawn_inside_their_first_iteration() {
        let layout = layout_of(&shared_inputs());
        let positions = layout.absolute_positions();
        let t0 = layout.find("T0").unwrap();
        let t1 = layout.find("T1").unwrap();
        let (left, right) = (positions["T0"].x, positions["T0"].x + t0.width);
        assert!(right < positions["T1"].x);
        assert_eq!(t0.height, t1.height);

        for input in ["W", "H0"] {
            assert!(t0.children.iter().any(|child| child.id == input));
            let x = positions[input].x;
            assert!(left < x && x < right, "{input} at {x}, outside {left}..{right}");
        }
        let feed = layout
            .edges
            .iter()
            .find(|edge| edge.from.node == "W" && edge.to == PortId::input("A0", 1))
            .unwrap();
        assert_eq!(
            feed.kind,
            EdgeKind::Sliced {
                scopes: vec![Scope::Container("T0".to_string())],
            }
        );
        assert!(feed.points.iter().all(|p| left <= p.x && p.x <= right));

        let carried: Vec<&EdgeLayout> = layout
            .edges
            .iter()
            .filter(|edge| edge.kind == EdgeKind::Temporal && edge.from.node == "W")
            .collect();
        assert_eq!(carried.len(), 1);
        assert_eq!(carried[0].to, PortId::input("A1", 1));
    }

    #[test]
    fn identical_snapshots_give_identical_layouts() {
        let mut snapshot = scenario_b();
        snapshot.set_expanded("C2", true);
        assert_eq!(layout_of(&snapshot), layout_of(&snapshot));
    }
}
