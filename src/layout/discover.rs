use std::collections::{BTreeMap, HashMap, HashSet};

use crate::ir::{PortId, Snapshot, SymbolId, SymbolKind};

use super::error::LayoutError;
use super::graph::{GraphNode, NodeIndex, NodeKind, PipelineContext, RawEdge};

const PLACEHOLDER_PREFIX: &str = "placeholder:";

/// An op input fed by a data value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumer {
    pub op: SymbolId,
    pub port: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub index: NodeIndex,
    pub data_outputs: BTreeMap<SymbolId, Vec<Consumer>>,
    pub raw_edges: Vec<RawEdge>,
    pub containers: Vec<SymbolId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    OnPath,
    Done,
}

enum Step {
    Visit(SymbolId),
    Finish(SymbolId),
}

struct Discoverer<'a> {
    snapshot: &'a Snapshot,
    ctx: &'a mut PipelineContext,
    out: Discovery,
    seen_data: HashSet<SymbolId>,
    stack: Vec<Step>,
    /// Container-less leaf inputs and the earliest iteration consuming them. `None` pins
    /// the input to the root because a consumer sits outside every iteration.
    leaf_homes: BTreeMap<SymbolId, Option<(usize, SymbolId)>>,
}

/// Walks producer links backwards from the snapshot's head and collects every node and
/// raw edge that contributes to it.
pub fn discover(snapshot: &Snapshot, ctx: &mut PipelineContext) -> Result<Discovery, LayoutError> {
    let head = snapshot.head.as_str();
    let Some(symbol) = snapshot.symbol_table.get(head) else {
        return Err(LayoutError::MissingHead(head.to_string()));
    };

    let mut discoverer = Discoverer {
        snapshot,
        ctx,
        out: Discovery::default(),
        seen_data: HashSet::new(),
        stack: Vec::new(),
        leaf_homes: BTreeMap::new(),
    };

    match &symbol.kind {
        SymbolKind::Data { .. } => {
            if let Some(creator) = discoverer.visit_data(head) {
                discoverer.stack.push(Step::Visit(creator));
            }
        }
        SymbolKind::Op { .. } => discoverer.stack.push(Step::Visit(head.to_string())),
        SymbolKind::Container { .. } | SymbolKind::Other => {
            return Err(LayoutError::InvalidHead {
                id: head.to_string(),
                kind: symbol.type_name().to_string(),
            });
        }
    }

    discoverer.run();
    let Discoverer {
        ctx,
        mut out,
        leaf_homes,
        ..
    } = discoverer;
    for (data_id, home) in leaf_homes {
        let (Some((step, container)), Some(node)) = (home, out.index.nodes.get_mut(&data_id))
        else {
            continue;
        };
        tracing::trace!(data = %data_id, container = %container, step, "moving leaf input into its first iteration");
        node.parent = Some(container);
    }
    resolve_containers(snapshot, &mut out, ctx);
    tracing::debug!(
        nodes = out.index.nodes.len(),
        edges = out.raw_edges.len(),
        containers = out.containers.len(),
        "discovered graph"
    );
    Ok(out)
}

impl Discoverer<'_> {
    fn run(&mut self) {
        let mut states: HashMap<SymbolId, VisitState> = HashMap::new();
        while let Some(step) = self.stack.pop() {
            match step {
                Step::Finish(id) => {
                    states.insert(id, VisitState::Done);
                }
                Step::Visit(id) => match states.get(&id) {
                    Some(VisitState::Done) => {}
                    Some(VisitState::OnPath) => {
                        self.ctx.warn(
                            Some(&id),
                            format!("dependency cycle through `{id}`; treating it as already processed"),
                        );
                    }
                    None => {
                        states.insert(id.clone(), VisitState::OnPath);
                        self.stack.push(Step::Finish(id.clone()));
                        self.expand_op(&id);
                    }
                },
            }
        }
    }

    fn expand_op(&mut self, op_id: &str) {
        let snapshot = self.snapshot;
        let Some(SymbolKind::Op { data }) = snapshot.symbol_table.get(op_id).map(|s| &s.kind) else {
            return;
        };
        let viewer = &data.viewer;
        self.out.index.insert(GraphNode {
            id: op_id.to_string(),
            kind: NodeKind::Op,
            parent: viewer.container.clone(),
        });

        let positional = viewer
            .args
            .iter()
            .enumerate()
            .filter_map(|(pos, arg)| arg.as_ref().map(|id| (pos, pos.to_string(), id)));
        let keyword = viewer
            .kwargs
            .iter()
            .enumerate()
            .filter_map(|(idx, (name, arg))| {
                arg.as_ref().map(|id| (viewer.args.len() + idx, name.clone(), id))
            });
        let inputs: Vec<(usize, String, SymbolId)> = positional
            .chain(keyword)
            .map(|(port, name, id)| (port, name, id.clone()))
            .collect();

        for (port, arg_name, data_id) in inputs {
            self.consume(&data_id, op_id, viewer.container.as_deref(), port, arg_name);
        }
    }

    /// Records `data_id` feeding input `port` of `op_id`.
    fn consume(
        &mut self,
        data_id: &str,
        op_id: &str,
        op_parent: Option<&str>,
        port: usize,
        arg_name: String,
    ) {
        let snapshot = self.snapshot;
        let source = match snapshot.symbol_table.get(data_id).map(|s| &s.kind) {
            Some(SymbolKind::Data { data }) => {
                // Pushed on every use so a producer reached from its own subtree shows up
                // as a cycle.
                if let Some(creator) = self.visit_data(data_id) {
                    self.stack.push(Step::Visit(creator));
                }
                let viewer = &data.viewer;
                if viewer.creatorop.is_none() && viewer.container.is_none() {
                    self.adopt_leaf(data_id, op_id);
                }
                data_id.to_string()
            }
            Some(_) => {
                let found = snapshot.symbol_table[data_id].type_name();
                self.placeholder(
                    data_id,
                    op_parent,
                    format!("`{data_id}` is a {found}, expected graphdata"),
                )
            }
            None => self.placeholder(
                data_id,
                op_parent,
                format!("`{data_id}` is missing from the symbol table"),
            ),
        };

        let consumers = self.out.data_outputs.entry(source.clone()).or_default();
        let out_port = consumers.len();
        consumers.push(Consumer {
            op: op_id.to_string(),
            port,
        });
        self.add_edge(RawEdge {
            from: PortId::output(&source, out_port),
            to: PortId::input(op_id, port),
            data: data_id.to_string(),
            arg_name,
        });
    }

    /// Adds a data node once, together with the edge from its creator op. Returns the
    /// creator op to explore, if there is a valid one.
    fn visit_data(&mut self, data_id: &str) -> Option<SymbolId> {
        let snapshot = self.snapshot;
        let Some(SymbolKind::Data { data }) = snapshot.symbol_table.get(data_id).map(|s| &s.kind)
        else {
            return None;
        };
        let viewer = &data.viewer;
        let first_visit = self.seen_data.insert(data_id.to_string());
        if first_visit {
            self.out.index.insert(GraphNode {
                id: data_id.to_string(),
                kind: NodeKind::Data,
                parent: viewer.container.clone(),
            });
        }
        let creator = viewer.creatorop.as_deref()?;
        let creator_is_op = matches!(
            snapshot.symbol_table.get(creator).map(|s| &s.kind),
            Some(SymbolKind::Op { .. })
        );
        if !first_visit {
            return creator_is_op.then(|| creator.to_string());
        }

        let producer = match snapshot.symbol_table.get(creator) {
            Some(_) if creator_is_op => creator.to_string(),
            Some(found) => self.placeholder(
                creator,
                viewer.container.as_deref(),
                format!(
                    "creator `{creator}` of `{data_id}` is a {}, expected graphop",
                    found.type_name()
                ),
            ),
            None => self.placeholder(
                creator,
                viewer.container.as_deref(),
                format!("creator `{creator}` of `{data_id}` is missing from the symbol table"),
            ),
        };
        self.add_edge(RawEdge {
            from: PortId::output(&producer, viewer.creatorpos),
            to: PortId::input(data_id, 0),
            data: data_id.to_string(),
            arg_name: String::new(),
        });
        creator_is_op.then(|| creator.to_string())
    }

    /// Keeps the earliest iteration among the consumers of a container-less leaf input,
    /// so the input is drawn next to its first use instead of after the last iteration.
    fn adopt_leaf(&mut self, data_id: &str, op_id: &str) {
        let home = first_iteration(self.snapshot, op_id);
        let current = self
            .leaf_homes
            .entry(data_id.to_string())
            .or_insert_with(|| home.clone());
        if home < *current {
            *current = home;
        }
    }

    fn placeholder(&mut self, symbol_id: &str, parent: Option<&str>, reason: String) -> SymbolId {
        let id = format!("{PLACEHOLDER_PREFIX}{symbol_id}");
        if !self.out.index.contains(&id) {
            self.ctx.error(Some(symbol_id), reason.clone());
            self.out.index.insert(GraphNode {
                id: id.clone(),
                kind: NodeKind::Placeholder { reason },
                parent: parent.map(str::to_string),
            });
        }
        id
    }

    fn add_edge(&mut self, edge: RawEdge) {
        self.ctx.ports.claim(&edge.from);
        self.ctx.ports.claim(&edge.to);
        self.out.raw_edges.push(edge);
    }
}

/// Innermost temporal container enclosing `id`, with its step.
fn first_iteration(snapshot: &Snapshot, id: &str) -> Option<(usize, SymbolId)> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut current = snapshot.symbol_table.get(id)?.parent();
    while let Some(container) = current {
        if !seen.insert(container) {
            return None;
        }
        let symbol = snapshot.symbol_table.get(container)?;
        let SymbolKind::Container { data } = &symbol.kind else {
            return None;
        };
        if let Some(step) = data.viewer.temporal_step() {
            return Some((step, container.to_string()));
        }
        current = symbol.parent();
    }
    None
}

/// Materializes every container on the ancestor chains of discovered nodes and computes
/// nesting depths. Broken chains (missing containers, containment loops) are cut so the
/// containment relation stays a tree.
fn resolve_containers(snapshot: &Snapshot, out: &mut Discovery, ctx: &mut PipelineContext) {
    let mut pending: Vec<SymbolId> = out
        .index
        .nodes
        .values()
        .filter_map(|node| node.parent.clone())
        .collect();
    let mut detached: Vec<SymbolId> = Vec::new();

    while let Some(container_id) = pending.pop() {
        if out.index.contains(&container_id) {
            continue;
        }
        match snapshot.symbol_table.get(&container_id).map(|s| &s.kind) {
            Some(SymbolKind::Container { data }) => {
                let viewer = &data.viewer;
                out.index.insert(GraphNode {
                    id: container_id.clone(),
                    kind: NodeKind::Container {
                        temporal_step: viewer.temporal_step(),
                    },
                    parent: viewer.container.clone(),
                });
                if let Some(parent) = &viewer.container {
                    pending.push(parent.clone());
                }
            }
            found => {
                let what = match found {
                    Some(_) => "is not a graphcontainer",
                    None => "is missing from the symbol table",
                };
                ctx.error(
                    Some(&container_id),
                    format!("container `{container_id}` {what}; its contents are placed in the enclosing scope"),
                );
                detached.push(container_id);
            }
        }
    }

    for node in out.index.nodes.values_mut() {
        if node
            .parent
            .as_ref()
            .is_some_and(|parent| detached.contains(parent))
        {
            node.parent = None;
        }
    }

    let container_ids: Vec<SymbolId> = out
        .index
        .nodes
        .values()
        .filter(|node| node.is_container())
        .map(|node| node.id.clone())
        .collect();

    for id in &container_ids {
        let mut seen = vec![id.clone()];
        let mut current = out.index.parent_of(id).map(str::to_string);
        while let Some(parent) = current {
            if seen.contains(&parent) {
                ctx.warn(
                    Some(&parent),
                    format!("container `{parent}` is its own ancestor; cutting the loop"),
                );
                if let Some(node) = out.index.nodes.get_mut(&parent) {
                    node.parent = None;
                }
                break;
            }
            seen.push(parent.clone());
            current = out.index.parent_of(&parent).map(str::to_string);
        }
    }

    for id in &container_ids {
        let depth = out.index.lineage(id).len();
        out.index.set_depth(id, depth);
    }
    out.containers = container_ids;
}
