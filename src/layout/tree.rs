use std::collections::BTreeMap;

use crate::config::LayoutConfig;
use crate::ir::{PortDirection, PortId, Scope, Snapshot, SymbolId};

use super::graph::{GraphNode, NodeIndex, NodeKind, PortAllocator};
use super::slicing::Slicing;
use super::types::{NodePayload, Orientation, PortSide, Size};

/// Id of the synthetic node wrapping every top-level node.
pub const ROOT_ID: &str = "__root__";

#[derive(Debug, Clone, PartialEq)]
pub struct TreePort {
    pub id: PortId,
    pub side: PortSide,
}

/// A hop handed to the layout engine of the scope it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEdge {
    pub edge: usize,
    pub order: usize,
    pub from: PortId,
    pub to: PortId,
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub id: SymbolId,
    pub parent: Option<SymbolId>,
    /// Distance from the root node, which has depth 0.
    pub depth: usize,
    pub payload: NodePayload,
    pub ports: Vec<TreePort>,
    pub children: Vec<SymbolId>,
    pub edges: Vec<TreeEdge>,
    pub orientation: Orientation,
    /// Set for leaves and collapsed containers, whose size does not depend on content.
    pub fixed_size: Option<Size>,
    pub temporal_step: Option<usize>,
}

impl TreeNode {
    /// Open nodes are laid out by the engine from their children.
    pub fn is_open(&self) -> bool {
        self.fixed_size.is_none()
    }

    pub fn is_temporal(&self) -> bool {
        self.temporal_step.is_some()
    }
}

/// The nested node/port tree consumed by the layout invoker.
#[derive(Debug, Clone)]
pub struct LayoutTree {
    root: TreeNode,
    nodes: BTreeMap<SymbolId, TreeNode>,
    /// Hops whose scope is hidden inside a collapsed container.
    pub dropped_hops: usize,
}

impl LayoutTree {
    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    pub fn get(&self, id: &str) -> Option<&TreeNode> {
        if id == ROOT_ID {
            return Some(&self.root);
        }
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TreeNode> {
        if id == ROOT_ID {
            return Some(&mut self.root);
        }
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        id == ROOT_ID || self.nodes.contains_key(id)
    }

    /// Every visible node except the root.
    pub fn nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values()
    }

    /// Visible nodes including the root.
    pub fn node_count(&self) -> usize {
        self.nodes.len() + 1
    }

    /// Open nodes grouped by depth, deepest level first and the root last.
    pub fn open_levels(&self) -> Vec<Vec<SymbolId>> {
        let mut levels: BTreeMap<usize, Vec<SymbolId>> = BTreeMap::new();
        for node in self.nodes.values().filter(|node| node.is_open()) {
            levels.entry(node.depth).or_default().push(node.id.clone());
        }
        let mut out: Vec<Vec<SymbolId>> = levels.into_values().rev().collect();
        out.push(vec![ROOT_ID.to_string()]);
        out
    }
}

fn port_side(temporal: bool, direction: PortDirection) -> PortSide {
    match (temporal, direction) {
        (true, PortDirection::In) => PortSide::West,
        (true, PortDirection::Out) => PortSide::East,
        (false, PortDirection::In) => PortSide::North,
        (false, PortDirection::Out) => PortSide::South,
    }
}

fn payload_for(snapshot: &Snapshot, node: &GraphNode, expanded: bool) -> NodePayload {
    let symbol = snapshot.symbol_table.get(&node.id);
    let name = symbol.and_then(|symbol| symbol.name.clone());
    let label = symbol.map(|symbol| symbol.str.clone()).unwrap_or_default();
    match &node.kind {
        NodeKind::Op => NodePayload::Op { name, label },
        NodeKind::Data => NodePayload::Data { name, label },
        NodeKind::Container { temporal_step, .. } => NodePayload::Container {
            name,
            label,
            temporal_step: *temporal_step,
            expanded,
        },
        NodeKind::Placeholder { reason } => NodePayload::Placeholder {
            reason: reason.clone(),
        },
    }
}

fn fixed_size(node: &GraphNode, expanded: bool, config: &LayoutConfig) -> Option<Size> {
    match &node.kind {
        NodeKind::Op => Some(Size::new(config.op_width, config.op_height)),
        NodeKind::Data => Some(Size::new(config.data_width, config.data_height)),
        NodeKind::Placeholder { .. } => Some(Size::new(
            config.placeholder_width,
            config.placeholder_height,
        )),
        NodeKind::Container { .. } if expanded => None,
        NodeKind::Container { temporal_step, .. } => Some(collapsed_size(
            temporal_step.is_some(),
            config,
        )),
    }
}

pub fn collapsed_size(temporal: bool, config: &LayoutConfig) -> Size {
    if temporal {
        Size::new(
            config.collapsed_temporal_width,
            config.collapsed_temporal_height,
        )
    } else {
        Size::new(config.collapsed_width, config.collapsed_height)
    }
}

/// Builds the visible tree: containers contribute children only when expanded, and every
/// non-temporal hop is attached to the node of its scope.
pub fn build_tree(
    snapshot: &Snapshot,
    index: &NodeIndex,
    slicing: &Slicing,
    ports: &PortAllocator,
    config: &LayoutConfig,
) -> LayoutTree {
    let mut members: BTreeMap<Scope, Vec<&GraphNode>> = BTreeMap::new();
    for node in index.nodes.values() {
        members.entry(node.scope()).or_default().push(node);
    }
    let has_temporal_child = |scope: &Scope| {
        members
            .get(scope)
            .is_some_and(|children| children.iter().any(|child| child.is_temporal()))
    };

    let mut root = TreeNode {
        id: ROOT_ID.to_string(),
        parent: None,
        depth: 0,
        payload: NodePayload::Root,
        ports: Vec::new(),
        children: Vec::new(),
        edges: Vec::new(),
        orientation: if has_temporal_child(&Scope::Root) {
            Orientation::Right
        } else {
            Orientation::Down
        },
        fixed_size: None,
        temporal_step: None,
    };
    let mut nodes: BTreeMap<SymbolId, TreeNode> = BTreeMap::new();

    let mut stack: Vec<(Scope, usize)> = vec![(Scope::Root, 0)];
    while let Some((scope, depth)) = stack.pop() {
        let Some(children) = members.get(&scope) else {
            continue;
        };
        let mut child_ids = Vec::with_capacity(children.len());
        for child in children {
            let temporal = child.is_temporal();
            let expanded = child.is_container() && snapshot.is_expanded(&child.id, temporal);
            let own_scope = Scope::Container(child.id.clone());
            let orientation = if temporal || (expanded && has_temporal_child(&own_scope)) {
                Orientation::Right
            } else {
                Orientation::Down
            };
            let mut node_ports = Vec::new();
            for direction in [PortDirection::In, PortDirection::Out] {
                for id in ports.ports(&child.id, direction) {
                    node_ports.push(TreePort {
                        id,
                        side: port_side(temporal, direction),
                    });
                }
            }
            nodes.insert(
                child.id.clone(),
                TreeNode {
                    id: child.id.clone(),
                    parent: Some(
                        scope
                            .container_id()
                            .unwrap_or(ROOT_ID)
                            .to_string(),
                    ),
                    depth: depth + 1,
                    payload: payload_for(snapshot, child, expanded),
                    ports: node_ports,
                    children: Vec::new(),
                    edges: Vec::new(),
                    orientation,
                    fixed_size: fixed_size(child, expanded, config),
                    temporal_step: child.temporal_step(),
                },
            );
            child_ids.push(child.id.clone());
            if expanded {
                stack.push((own_scope, depth + 1));
            }
        }
        match scope.container_id() {
            None => root.children = child_ids,
            Some(id) => {
                if let Some(node) = nodes.get_mut(id) {
                    node.children = child_ids;
                }
            }
        }
    }

    let mut tree = LayoutTree {
        root,
        nodes,
        dropped_hops: 0,
    };
    for hop in &slicing.hops {
        let owner = hop.scope.container_id().unwrap_or(ROOT_ID);
        match tree.get_mut(owner) {
            Some(node) if node.is_open() => node.edges.push(TreeEdge {
                edge: hop.edge,
                order: hop.order,
                from: hop.from.clone(),
                to: hop.to.clone(),
            }),
            _ => tree.dropped_hops += 1,
        }
    }
    tracing::debug!(
        nodes = tree.node_count(),
        dropped_hops = tree.dropped_hops,
        "built layout tree"
    );
    tree
}
