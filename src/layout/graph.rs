use std::collections::{BTreeMap, HashMap};

use crate::ir::{PortDirection, PortId, Scope, SymbolId};

use super::types::{Diagnostic, Severity};

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Op,
    Data,
    Container { temporal_step: Option<usize> },
    /// Stands in for a symbol that is missing from the table or has the wrong type.
    Placeholder { reason: String },
}

/// A discovered node. Ports live in the [`PortAllocator`], not here, since they keep
/// growing while edges are sliced.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: SymbolId,
    pub kind: NodeKind,
    pub parent: Option<SymbolId>,
}

impl GraphNode {
    pub fn scope(&self) -> Scope {
        Scope::from_parent(self.parent.as_deref())
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, NodeKind::Container { .. })
    }

    pub fn temporal_step(&self) -> Option<usize> {
        match &self.kind {
            NodeKind::Container { temporal_step, .. } => *temporal_step,
            _ => None,
        }
    }

    pub fn is_temporal(&self) -> bool {
        self.temporal_step().is_some()
    }
}

/// A single producer -> consumer dependency before slicing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEdge {
    pub from: PortId,
    pub to: PortId,
    /// Data value carried along the edge.
    pub data: SymbolId,
    /// Argument name on the consumer (`"0"`, `"1"`, ... for positional ones).
    pub arg_name: String,
}

/// All relevant nodes, indexed by id.
#[derive(Debug, Clone, Default)]
pub struct NodeIndex {
    pub nodes: BTreeMap<SymbolId, GraphNode>,
    depths: BTreeMap<SymbolId, usize>,
}

impl NodeIndex {
    pub fn insert(&mut self, node: GraphNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn get(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).and_then(|node| node.parent.as_deref())
    }

    pub(super) fn set_depth(&mut self, id: &str, depth: usize) {
        self.depths.insert(id.to_string(), depth);
    }

    /// Nesting depth of a scope: root is 0, a top-level container is 1.
    pub fn depth(&self, scope: &Scope) -> usize {
        match scope {
            Scope::Root => 0,
            Scope::Container(id) => self.depths.get(id).copied().unwrap_or(1),
        }
    }

    /// `id` followed by each of its ancestors, innermost first.
    pub fn lineage(&self, id: &str) -> Vec<SymbolId> {
        let mut chain = vec![id.to_string()];
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            if chain.iter().any(|seen| seen == parent) {
                break;
            }
            chain.push(parent.to_string());
            current = self.parent_of(parent);
        }
        chain
    }
}

#[derive(Debug, Clone, Default)]
struct PortCounter {
    next: usize,
    assigned: Vec<usize>,
}

/// Hands out port indices per (node, direction). Indices never repeat and only grow.
#[derive(Debug, Clone, Default)]
pub struct PortAllocator {
    counters: HashMap<(SymbolId, PortDirection), PortCounter>,
}

impl PortAllocator {
    /// Claims a specific index, as decided by the symbol table (argument positions,
    /// creator positions). Claiming an index twice is a no-op.
    pub fn claim(&mut self, port: &PortId) {
        let counter = self
            .counters
            .entry((port.node.clone(), port.direction))
            .or_default();
        if counter.assigned.contains(&port.index) {
            return;
        }
        counter.assigned.push(port.index);
        counter.assigned.sort_unstable();
        counter.next = counter.next.max(port.index + 1);
    }

    /// Allocates a fresh port past every index handed out so far.
    pub fn allocate(&mut self, node: &str, direction: PortDirection) -> PortId {
        let counter = self
            .counters
            .entry((node.to_string(), direction))
            .or_default();
        let index = counter.next;
        counter.next += 1;
        counter.assigned.push(index);
        PortId {
            node: node.to_string(),
            direction,
            index,
        }
    }

    pub fn ports(&self, node: &str, direction: PortDirection) -> Vec<PortId> {
        self.counters
            .get(&(node.to_string(), direction))
            .map(|counter| {
                counter
                    .assigned
                    .iter()
                    .map(|&index| PortId {
                        node: node.to_string(),
                        direction,
                        index,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn count(&self, node: &str, direction: PortDirection) -> usize {
        self.counters
            .get(&(node.to_string(), direction))
            .map_or(0, |counter| counter.assigned.len())
    }
}

/// Working state of one pipeline run. Never shared between runs.
#[derive(Debug, Default)]
pub struct PipelineContext {
    pub ports: PortAllocator,
    pub diagnostics: Vec<Diagnostic>,
    next_temporal: usize,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_temporal_index(&mut self) -> usize {
        let index = self.next_temporal;
        self.next_temporal += 1;
        index
    }

    pub fn warn(&mut self, node: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(node = node.unwrap_or("-"), "{message}");
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            node: node.map(str::to_string),
            message,
        });
    }

    pub fn error(&mut self, node: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(node = node.unwrap_or("-"), "{message}");
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            node: node.map(str::to_string),
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_ports_follow_claimed_ones() {
        let mut ports = PortAllocator::default();
        ports.claim(&PortId::input("O1", 0));
        ports.claim(&PortId::input("O1", 3));
        ports.claim(&PortId::input("O1", 3));
        let fresh = ports.allocate("O1", PortDirection::In);
        assert_eq!(fresh.index, 4);
        let indices: Vec<usize> = ports
            .ports("O1", PortDirection::In)
            .into_iter()
            .map(|port| port.index)
            .collect();
        assert_eq!(indices, vec![0, 3, 4]);
        assert_eq!(ports.count("O1", PortDirection::Out), 0);
    }

    #[test]
    fn diagnostics_keep_their_severity() {
        let mut ctx = PipelineContext::new();
        ctx.warn(Some("C"), "detached");
        ctx.error(None, "dropped");
        let severities: Vec<Severity> = ctx.diagnostics.iter().map(|d| d.severity).collect();
        assert_eq!(severities, vec![Severity::Warning, Severity::Error]);
        assert_eq!(ctx.diagnostics[0].node.as_deref(), Some("C"));
        assert_eq!(ctx.diagnostics[1].node, None);
    }

    #[test]
    fn lineage_stops_on_containment_loop() {
        let mut index = NodeIndex::default();
        for (id, parent) in [("A", Some("B")), ("B", Some("A")), ("x", Some("A"))] {
            index.insert(GraphNode {
                id: id.to_string(),
                kind: NodeKind::Container {
                    temporal_step: None,
                },
                parent: parent.map(str::to_string),
            });
        }
        assert_eq!(index.lineage("x"), vec!["x", "A", "B"]);
    }
}
