use std::collections::{BTreeMap, HashMap, HashSet};

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::config::LayoutConfig;
use crate::ir::{PortDirection, PortId, SymbolId};

use super::error::EngineError;
use super::ranking::{Endpoint, PortLink, RankEdge, compute_ranks, order_siblings};
use super::routing::{Anchor, distribute_ports, port_stub_length, route_orthogonal};
use super::tree::{TreeEdge, TreePort};
use super::types::{Orientation, Point, PortLayout, PortSide, Size};

/// Minimum distance between neighbouring ports on one side of a container.
const PORT_MIN_GAP: f32 = 20.0;

/// An already sized child of the scope being laid out. Port positions are relative to
/// the child.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildBox {
    pub id: SymbolId,
    pub size: Size,
    pub ports: Vec<PortLayout>,
}

/// One scope handed to a layout engine: its direct children, its own boundary ports and
/// the hops between them.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeRequest {
    pub scope: SymbolId,
    pub orientation: Orientation,
    pub ports: Vec<TreePort>,
    pub children: Vec<ChildBox>,
    pub edges: Vec<TreeEdge>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRoute {
    pub edge: usize,
    pub order: usize,
    /// Relative to the scope's top-left corner.
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeLayout {
    pub size: Size,
    /// Top-left corner of every child, relative to the scope.
    pub positions: BTreeMap<SymbolId, Point>,
    /// The scope's own boundary ports.
    pub ports: Vec<PortLayout>,
    pub routes: Vec<EdgeRoute>,
}

/// The hierarchical layout algorithm. It only ever sees one scope at a time; nesting is
/// handled by the caller.
pub trait LayoutEngine {
    fn layout<'a>(&'a self, request: ScopeRequest)
    -> LocalBoxFuture<'a, Result<ScopeLayout, EngineError>>;
}

impl ScopeRequest {
    /// Every edge endpoint must be a port of a child or of the scope itself.
    pub fn validate(&self) -> Result<(), EngineError> {
        let mut known: HashSet<&PortId> = self.ports.iter().map(|port| &port.id).collect();
        for child in &self.children {
            if !child.size.width.is_finite() || !child.size.height.is_finite() {
                return Err(EngineError::Rejected {
                    scope: self.scope.clone(),
                    reason: format!("child `{}` has no finite size", child.id),
                });
            }
            known.extend(child.ports.iter().map(|port| &port.id));
        }
        for (idx, edge) in self.edges.iter().enumerate() {
            for port in [&edge.from, &edge.to] {
                if !known.contains(port) {
                    return Err(EngineError::DanglingPort {
                        scope: self.scope.clone(),
                        edge: idx,
                        port: port.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Attachment points of every port reachable from inside `scope`, in scope coordinates.
/// The scope's own ports face inwards.
pub fn scope_anchors<'a>(
    scope: &str,
    own_ports: &[PortLayout],
    children: impl IntoIterator<Item = (Point, &'a [PortLayout])>,
) -> HashMap<PortId, Anchor> {
    let mut anchors = HashMap::new();
    for port in own_ports {
        anchors.insert(
            port.id.clone(),
            Anchor {
                at: Point::new(port.x, port.y),
                facing: if port.id.node == scope {
                    port.side.opposite()
                } else {
                    port.side
                },
            },
        );
    }
    for (origin, ports) in children {
        for port in ports {
            anchors.insert(
                port.id.clone(),
                Anchor {
                    at: origin.offset(port.x, port.y),
                    facing: port.side,
                },
            );
        }
    }
    anchors
}

/// Routes every hop whose endpoints both have an anchor.
pub fn route_edges(
    edges: &[TreeEdge],
    anchors: &HashMap<PortId, Anchor>,
    stub: f32,
) -> Vec<EdgeRoute> {
    edges
        .iter()
        .filter_map(|edge| {
            let from = anchors.get(&edge.from)?;
            let to = anchors.get(&edge.to)?;
            Some(EdgeRoute {
                edge: edge.edge,
                order: edge.order,
                points: route_orthogonal(*from, *to, stub),
            })
        })
        .collect()
}

/// Slot of every port along its owner's row of ports of the same direction, in `0..1`.
fn port_slots<'a>(ports: impl IntoIterator<Item = &'a PortId>) -> HashMap<PortId, f32> {
    let mut rows: BTreeMap<(&str, PortDirection), Vec<&PortId>> = BTreeMap::new();
    for port in ports {
        rows.entry((port.node.as_str(), port.direction))
            .or_default()
            .push(port);
    }
    let mut slots = HashMap::new();
    for row in rows.values_mut() {
        row.sort_by_key(|port| port.index);
        let count = row.len() as f32;
        for (idx, port) in row.iter().enumerate() {
            slots.insert((*port).clone(), (idx as f32 + 0.5) / count);
        }
    }
    slots
}

/// The scope's hops as seen by sibling ordering. Hops that start and end on the same
/// node, including pass-throughs of the scope itself, are left out.
fn port_links(request: &ScopeRequest) -> Vec<PortLink> {
    let slots = port_slots(
        request
            .ports
            .iter()
            .map(|port| &port.id)
            .chain(request.children.iter().flat_map(|child| child.ports.iter().map(|port| &port.id))),
    );
    let endpoint = |node: &str| {
        if node == request.scope {
            Endpoint::Boundary
        } else {
            Endpoint::Sibling(node.to_string())
        }
    };
    request
        .edges
        .iter()
        .filter(|edge| edge.from.node != edge.to.node)
        .map(|edge| PortLink {
            from: endpoint(&edge.from.node),
            from_slot: slots.get(&edge.from).copied().unwrap_or(0.5),
            to: endpoint(&edge.to.node),
            to_slot: slots.get(&edge.to).copied().unwrap_or(0.5),
        })
        .collect()
}

/// Layered layout: longest-path ranks, port-aware barycenter ordering, then rows (or columns)
/// packed with fixed spacing and centred on the widest one.
#[derive(Debug, Clone, Default)]
pub struct LayeredEngine {
    config: LayoutConfig,
}

impl LayeredEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn layout_scope(&self, request: &ScopeRequest) -> Result<ScopeLayout, EngineError> {
        request.validate()?;
        let config = &self.config;
        let horizontal = request.orientation == Orientation::Right;

        let node_ids: Vec<SymbolId> = request.children.iter().map(|c| c.id.clone()).collect();
        let node_order: HashMap<SymbolId, usize> = node_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect();
        let sizes: HashMap<&str, Size> = request
            .children
            .iter()
            .map(|child| (child.id.as_str(), child.size))
            .collect();

        let rank_edges: Vec<RankEdge> = request
            .edges
            .iter()
            .filter(|edge| {
                edge.from.node != request.scope
                    && edge.to.node != request.scope
                    && edge.from.node != edge.to.node
            })
            .map(|edge| (edge.from.node.clone(), edge.to.node.clone()))
            .collect();

        let ranks = compute_ranks(&node_ids, &rank_edges, &node_order);
        let max_rank = ranks.values().copied().max().unwrap_or(0);
        let mut rank_nodes: Vec<Vec<SymbolId>> = vec![Vec::new(); max_rank + 1];
        for id in &node_ids {
            let rank = ranks.get(id).copied().unwrap_or(0);
            rank_nodes[rank].push(id.clone());
        }
        let links = port_links(request);
        order_siblings(&mut rank_nodes, &links, config.order_passes);

        // (main, cross) extents, main being the rank axis.
        let extent = |id: &str| -> (f32, f32) {
            let size = sizes.get(id).copied().unwrap_or(Size::new(0.0, 0.0));
            if horizontal {
                (size.width, size.height)
            } else {
                (size.height, size.width)
            }
        };
        let rank_extents: Vec<(f32, f32)> = rank_nodes
            .iter()
            .map(|bucket| {
                let main = bucket.iter().map(|id| extent(id).0).fold(0.0, f32::max);
                let cross = bucket.iter().map(|id| extent(id).1).sum::<f32>()
                    + config.node_spacing * bucket.len().saturating_sub(1) as f32;
                (main, cross)
            })
            .collect();
        let max_cross = rank_extents.iter().map(|e| e.1).fold(0.0, f32::max);
        let occupied_ranks = rank_nodes.iter().filter(|bucket| !bucket.is_empty()).count();
        let total_main = rank_extents.iter().map(|e| e.0).sum::<f32>()
            + config.rank_spacing * occupied_ranks.saturating_sub(1) as f32;

        let pad = config.container_padding;
        let mut positions = BTreeMap::new();
        let mut main_cursor = pad;
        for (bucket, (rank_main, rank_cross)) in rank_nodes.iter().zip(&rank_extents) {
            if bucket.is_empty() {
                continue;
            }
            let mut cross_cursor = pad + (max_cross - rank_cross) * 0.5;
            for id in bucket {
                let (main, cross) = extent(id);
                let main_at = main_cursor + (rank_main - main) * 0.5;
                let at = if horizontal {
                    Point::new(main_at, cross_cursor)
                } else {
                    Point::new(cross_cursor, main_at)
                };
                positions.insert(id.clone(), at);
                cross_cursor += cross + config.node_spacing;
            }
            main_cursor += rank_main + config.rank_spacing;
        }

        let (content_w, content_h) = if horizontal {
            (total_main, max_cross)
        } else {
            (max_cross, total_main)
        };
        let mut size = Size::new(content_w + pad * 2.0, content_h + pad * 2.0);
        for side in [PortSide::North, PortSide::South, PortSide::West, PortSide::East] {
            let count = request.ports.iter().filter(|port| port.side == side).count();
            let needed = (count + 1) as f32 * PORT_MIN_GAP;
            if side.is_vertical() {
                size.width = size.width.max(needed);
            } else {
                size.height = size.height.max(needed);
            }
        }

        let child_anchors = scope_anchors(
            &request.scope,
            &[],
            request.children.iter().filter_map(|child| {
                positions
                    .get(&child.id)
                    .map(|at| (*at, child.ports.as_slice()))
            }),
        );
        let ports = self.place_boundary_ports(request, size, &child_anchors);

        let anchors = scope_anchors(
            &request.scope,
            &ports,
            request.children.iter().filter_map(|child| {
                positions
                    .get(&child.id)
                    .map(|at| (*at, child.ports.as_slice()))
            }),
        );
        let routes = route_edges(
            &request.edges,
            &anchors,
            port_stub_length(config.node_spacing),
        );

        tracing::trace!(
            scope = %request.scope,
            children = request.children.len(),
            width = size.width,
            height = size.height,
            "laid out scope"
        );
        Ok(ScopeLayout {
            size,
            positions,
            ports,
            routes,
        })
    }

    /// Orders each side's boundary ports by where their inner endpoints ended up, then
    /// spreads them evenly.
    fn place_boundary_ports(
        &self,
        request: &ScopeRequest,
        size: Size,
        child_anchors: &HashMap<PortId, Anchor>,
    ) -> Vec<PortLayout> {
        let inner_coordinate = |port: &TreePort| -> Option<f32> {
            request.edges.iter().find_map(|edge| {
                let inner = if edge.from == port.id {
                    &edge.to
                } else if edge.to == port.id {
                    &edge.from
                } else {
                    return None;
                };
                let anchor = child_anchors.get(inner)?;
                Some(if port.side.is_vertical() {
                    anchor.at.x
                } else {
                    anchor.at.y
                })
            })
        };

        let mut ordered: Vec<(usize, Option<f32>, &TreePort)> = request
            .ports
            .iter()
            .enumerate()
            .map(|(idx, port)| (idx, inner_coordinate(port), port))
            .collect();
        ordered.sort_by(|a, b| match (a.1, b.1) {
            (Some(x), Some(y)) => x
                .partial_cmp(&y)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.0.cmp(&b.0),
        });
        let sides: Vec<(PortId, PortSide)> = ordered
            .into_iter()
            .map(|(_, _, port)| (port.id.clone(), port.side))
            .collect();
        distribute_ports(size, &sides)
    }
}

impl LayoutEngine for LayeredEngine {
    fn layout<'a>(
        &'a self,
        request: ScopeRequest,
    ) -> LocalBoxFuture<'a, Result<ScopeLayout, EngineError>> {
        futures::future::ready(self.layout_scope(&request)).boxed_local()
    }
}
