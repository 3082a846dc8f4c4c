use std::collections::{BTreeMap, BTreeSet};

use futures::future::join_all;

use crate::config::LayoutConfig;
use crate::ir::{PortId, SymbolId};

use super::engine::{ChildBox, EdgeRoute, LayoutEngine, ScopeLayout, ScopeRequest};
use super::engine::{route_edges, scope_anchors};
use super::error::LayoutError;
use super::graph::PipelineContext;
use super::routing::{distribute_ports, port_stub_length};
use super::tree::{LayoutTree, ROOT_ID, TreeNode, collapsed_size};
use super::types::{Point, PortLayout, PortSide, Size};

/// Geometry of one visible node. `x`/`y` are relative to the parent; port positions are
/// relative to the node itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub ports: Vec<PortLayout>,
}

impl Placement {
    fn sized(size: Size, ports: Vec<PortLayout>) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: size.width,
            height: size.height,
            ports,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn port(&self, id: &PortId) -> Option<&PortLayout> {
        self.ports.iter().find(|port| &port.id == id)
    }
}

/// A hop route in the coordinates of the scope that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedRoute {
    pub scope: SymbolId,
    pub edge: usize,
    pub order: usize,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Default)]
pub struct Placed {
    pub placements: BTreeMap<SymbolId, Placement>,
    pub routes: Vec<PlacedRoute>,
    /// Containers the engine refused, with the reason. They are drawn collapsed.
    pub rejected: BTreeMap<SymbolId, String>,
    /// Nodes not hidden inside a rejected container. Includes the root.
    pub visible: BTreeSet<SymbolId>,
}

impl Placed {
    pub fn get(&self, id: &str) -> Option<&Placement> {
        self.placements.get(id)
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.visible.contains(id)
    }

    pub fn route(&self, edge: usize, order: usize) -> Option<&PlacedRoute> {
        self.routes
            .iter()
            .find(|route| route.edge == edge && route.order == order)
    }
}

fn port_sides(node: &TreeNode) -> Vec<(PortId, PortSide)> {
    node.ports
        .iter()
        .map(|port| (port.id.clone(), port.side))
        .collect()
}

/// Lays the tree out bottom-up. Every container one level deeper is awaited jointly
/// before the next level is scheduled.
pub async fn invoke<E: LayoutEngine + ?Sized>(
    tree: &LayoutTree,
    engine: &E,
    config: &LayoutConfig,
    ctx: &mut PipelineContext,
) -> Result<Placed, LayoutError> {
    let mut placed = Placed::default();
    for node in tree.nodes() {
        if let Some(size) = node.fixed_size {
            placed.placements.insert(
                node.id.clone(),
                Placement::sized(size, distribute_ports(size, &port_sides(node))),
            );
        }
    }

    for (round, level) in tree.open_levels().into_iter().enumerate() {
        let scopes: Vec<&TreeNode> = level.iter().filter_map(|id| tree.get(id)).collect();
        let requests: Vec<ScopeRequest> = scopes
            .iter()
            .map(|node| scope_request(node, &placed))
            .collect();
        tracing::debug!(round, scopes = requests.len(), "invoking layout engine");
        let results = join_all(requests.into_iter().map(|request| engine.layout(request))).await;

        for (node, result) in scopes.into_iter().zip(results) {
            match result {
                Ok(layout) => {
                    apply_scope(node, layout, &mut placed);
                    if node
                        .children
                        .iter()
                        .any(|child| tree.get(child).is_some_and(TreeNode::is_temporal))
                    {
                        order_temporal_children(tree, node, config, &mut placed);
                    }
                }
                Err(err) if node.id == ROOT_ID => return Err(LayoutError::RootRejected(err)),
                Err(err) => {
                    ctx.error(
                        Some(&node.id),
                        format!("layout engine rejected `{}`: {err}; drawing it collapsed", node.id),
                    );
                    let size = collapsed_size(node.is_temporal(), config);
                    placed.placements.insert(
                        node.id.clone(),
                        Placement::sized(size, distribute_ports(size, &port_sides(node))),
                    );
                    placed.rejected.insert(node.id.clone(), err.to_string());
                }
            }
        }
    }

    let mut stack = vec![tree.root()];
    while let Some(node) = stack.pop() {
        placed.visible.insert(node.id.clone());
        if placed.rejected.contains_key(&node.id) {
            continue;
        }
        stack.extend(node.children.iter().filter_map(|child| tree.get(child)));
    }
    Ok(placed)
}

fn scope_request(node: &TreeNode, placed: &Placed) -> ScopeRequest {
    let children = node
        .children
        .iter()
        .filter_map(|child| {
            let placement = placed.get(child)?;
            Some(ChildBox {
                id: child.clone(),
                size: placement.size(),
                ports: placement.ports.clone(),
            })
        })
        .collect();
    ScopeRequest {
        scope: node.id.clone(),
        orientation: node.orientation,
        ports: node.ports.clone(),
        children,
        edges: node.edges.clone(),
    }
}

fn apply_scope(node: &TreeNode, layout: ScopeLayout, placed: &mut Placed) {
    for (child, at) in &layout.positions {
        if let Some(placement) = placed.placements.get_mut(child) {
            placement.x = at.x;
            placement.y = at.y;
        }
    }
    let own = placed
        .placements
        .entry(node.id.clone())
        .or_insert_with(|| Placement::sized(layout.size, Vec::new()));
    own.width = layout.size.width;
    own.height = layout.size.height;
    own.ports = layout.ports;
    placed.routes.extend(layout.routes.into_iter().map(
        |EdgeRoute {
             edge,
             order,
             points,
         }| PlacedRoute {
            scope: node.id.clone(),
            edge,
            order,
            points,
        },
    ));
}

/// Replaces the engine's placement of a scope holding iterations: temporal children in
/// ascending step order from left to right, then any other children, all bottom-aligned
/// with a fixed gap. Expanded iterations share one height. The scope is re-fitted and its
/// hops re-routed.
fn order_temporal_children(
    tree: &LayoutTree,
    node: &TreeNode,
    config: &LayoutConfig,
    placed: &mut Placed,
) {
    let mut temporal: Vec<(usize, &SymbolId)> = Vec::new();
    let mut others: Vec<(f32, &SymbolId)> = Vec::new();
    for child in &node.children {
        let Some(placement) = placed.get(child) else {
            continue;
        };
        match tree.get(child).and_then(|c| c.temporal_step) {
            Some(step) => temporal.push((step, child)),
            None => others.push((placement.x, child)),
        }
    }
    temporal.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    let iterations: Vec<&SymbolId> = temporal.iter().map(|(_, id)| *id).collect();
    stretch_iterations(tree, &iterations, placed);
    others.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(b.1))
    });
    let row: Vec<SymbolId> = temporal
        .into_iter()
        .map(|(_, id)| id.clone())
        .chain(others.into_iter().map(|(_, id)| id.clone()))
        .collect();

    let pad = config.container_padding;
    let max_height = row
        .iter()
        .filter_map(|id| placed.get(id))
        .map(|placement| placement.height)
        .fold(0.0, f32::max);
    let mut x = pad;
    for id in &row {
        if let Some(placement) = placed.placements.get_mut(id) {
            placement.x = x;
            placement.y = pad + (max_height - placement.height);
            x += placement.width + config.temporal_gap;
        }
    }
    let content_width = if row.is_empty() {
        0.0
    } else {
        x - config.temporal_gap - pad
    };
    let size = Size::new(content_width + pad * 2.0, max_height + pad * 2.0);

    let mut sides: Vec<(PortId, PortSide)> = placed
        .get(&node.id)
        .map(|own| {
            own.ports
                .iter()
                .map(|port| (port.id.clone(), port.side))
                .collect()
        })
        .unwrap_or_default();
    if sides.is_empty() {
        sides = port_sides(node);
    }
    let ports = distribute_ports(size, &sides);

    let children: Vec<(Point, &[PortLayout])> = node
        .children
        .iter()
        .filter_map(|child| placed.get(child))
        .map(|placement| (Point::new(placement.x, placement.y), placement.ports.as_slice()))
        .collect();
    let anchors = scope_anchors(&node.id, &ports, children);
    let routes = route_edges(&node.edges, &anchors, port_stub_length(config.node_spacing));

    placed.routes.retain(|route| route.scope != node.id);
    placed.routes.extend(routes.into_iter().map(|route| PlacedRoute {
        scope: node.id.clone(),
        edge: route.edge,
        order: route.order,
        points: route.points,
    }));
    if let Some(own) = placed.placements.get_mut(&node.id) {
        own.width = size.width;
        own.height = size.height;
        own.ports = ports;
    }
}

/// Grows every expanded iteration to the tallest one. Content, ports and inner routes move
/// down with the bottom edge. Collapsed and rejected iterations keep their fixed size.
fn stretch_iterations(tree: &LayoutTree, iterations: &[&SymbolId], placed: &mut Placed) {
    let open: Vec<&TreeNode> = iterations
        .iter()
        .filter(|id| !placed.rejected.contains_key(id.as_str()))
        .filter_map(|id| tree.get(id))
        .filter(|node| node.is_open())
        .collect();
    let tallest = open
        .iter()
        .filter_map(|node| placed.get(&node.id))
        .map(|placement| placement.height)
        .fold(0.0, f32::max);

    for node in open {
        let Some(own) = placed.placements.get_mut(&node.id) else {
            continue;
        };
        let shift = tallest - own.height;
        if shift <= 0.0 {
            continue;
        }
        own.height = tallest;
        for port in &mut own.ports {
            port.y += shift;
        }
        for child in &node.children {
            if let Some(placement) = placed.placements.get_mut(child) {
                placement.y += shift;
            }
        }
        for route in placed.routes.iter_mut().filter(|route| route.scope == node.id) {
            for point in &mut route.points {
                point.y += shift;
            }
        }
        tracing::trace!(iteration = %node.id, shift, "stretched iteration");
    }
}
