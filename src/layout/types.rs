use std::collections::BTreeMap;

use serde::Serialize;

use crate::ir::{PortId, Scope, SymbolId};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PortSide {
    North,
    South,
    West,
    East,
}

impl PortSide {
    pub fn opposite(self) -> Self {
        match self {
            PortSide::North => PortSide::South,
            PortSide::South => PortSide::North,
            PortSide::West => PortSide::East,
            PortSide::East => PortSide::West,
        }
    }

    /// North and south sides; ports there are left vertically.
    pub fn is_vertical(self) -> bool {
        matches!(self, PortSide::North | PortSide::South)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Orientation {
    Down,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

/// A non-fatal problem found while laying out; the rest of the graph is still produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub node: Option<SymbolId>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodePayload {
    Op {
        name: Option<String>,
        label: String,
    },
    Data {
        name: Option<String>,
        label: String,
    },
    Container {
        name: Option<String>,
        label: String,
        temporal_step: Option<usize>,
        expanded: bool,
    },
    Placeholder {
        reason: String,
    },
    Root,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortLayout {
    pub id: PortId,
    pub side: PortSide,
    /// Relative to the owning node's top-left corner.
    pub x: f32,
    pub y: f32,
}

/// A node of the positioned tree. `x`/`y` are relative to the parent node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeLayout {
    pub id: SymbolId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub payload: NodePayload,
    pub ports: Vec<PortLayout>,
    pub children: Vec<NodeLayout>,
    /// Set when the layout engine rejected this container; it is then drawn collapsed.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeKind {
    /// Joined from the container-scoped hops of one raw edge.
    Sliced { scopes: Vec<Scope> },
    /// Synthesized after layout for edges that cross iterations.
    Temporal,
}

/// Final geometry of one logical edge, in absolute coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeLayout {
    /// Index of the raw edge this geometry belongs to.
    pub edge: usize,
    pub from: PortId,
    pub to: PortId,
    pub data: SymbolId,
    pub arg_name: String,
    pub kind: EdgeKind,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub root: NodeLayout,
    pub edges: Vec<EdgeLayout>,
    pub width: f32,
    pub height: f32,
    pub diagnostics: Vec<Diagnostic>,
}

impl Layout {
    /// Absolute top-left corner of every visible node, keyed by id.
    pub fn absolute_positions(&self) -> BTreeMap<SymbolId, Point> {
        let mut positions = BTreeMap::new();
        let mut stack: Vec<(&NodeLayout, Point)> = self
            .root
            .children
            .iter()
            .map(|child| (child, Point::default()))
            .collect();
        while let Some((node, origin)) = stack.pop() {
            let at = origin.offset(node.x, node.y);
            positions.insert(node.id.clone(), at);
            for child in &node.children {
                stack.push((child, at));
            }
        }
        positions
    }

    pub fn find(&self, id: &str) -> Option<&NodeLayout> {
        let mut stack: Vec<&NodeLayout> = vec![&self.root];
        while let Some(node) = stack.pop() {
            if node.id == id {
                return Some(node);
            }
            stack.extend(node.children.iter());
        }
        None
    }
}
