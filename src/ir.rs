use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type SymbolId = String;

/// One entry of the debugger's symbol table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub str: String,
    #[serde(flatten)]
    pub kind: SymbolKind,
}

/// Type-dependent payload, tagged by the symbol's `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SymbolKind {
    #[serde(rename = "graphop")]
    Op { data: Viewer<OpViewer> },
    #[serde(rename = "graphdata")]
    Data { data: Viewer<DataViewer> },
    #[serde(rename = "graphcontainer")]
    Container { data: Viewer<ContainerViewer> },
    /// Primitives, lists, tensors, ... anything that is not a graph node.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewer<T> {
    pub viewer: T,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpViewer {
    #[serde(default)]
    pub args: Vec<Option<SymbolId>>,
    /// Sorted by key so port assignment never depends on document order.
    #[serde(default)]
    pub kwargs: BTreeMap<String, Option<SymbolId>>,
    #[serde(default)]
    pub container: Option<SymbolId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataViewer {
    #[serde(default)]
    pub creatorop: Option<SymbolId>,
    #[serde(default)]
    pub creatorpos: usize,
    #[serde(default)]
    pub container: Option<SymbolId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerViewer {
    #[serde(default)]
    pub contents: Vec<SymbolId>,
    #[serde(default)]
    pub container: Option<SymbolId>,
    #[serde(default = "non_temporal")]
    pub temporalstep: i64,
    #[serde(default)]
    pub height: usize,
}

fn non_temporal() -> i64 {
    -1
}

impl Default for ContainerViewer {
    fn default() -> Self {
        Self {
            contents: Vec::new(),
            container: None,
            temporalstep: non_temporal(),
            height: 0,
        }
    }
}

impl ContainerViewer {
    pub fn temporal_step(&self) -> Option<usize> {
        usize::try_from(self.temporalstep).ok()
    }
}

impl Symbol {
    pub fn op(container: Option<&str>, args: &[Option<&str>], kwargs: &[(&str, &str)]) -> Self {
        Self {
            name: None,
            str: String::new(),
            kind: SymbolKind::Op {
                data: Viewer {
                    viewer: OpViewer {
                        args: args.iter().map(|arg| arg.map(str::to_string)).collect(),
                        kwargs: kwargs
                            .iter()
                            .map(|(key, id)| (key.to_string(), Some(id.to_string())))
                            .collect(),
                        container: container.map(str::to_string),
                    },
                },
            },
        }
    }

    pub fn data(container: Option<&str>, creator: Option<&str>, creator_pos: usize) -> Self {
        Self {
            name: None,
            str: String::new(),
            kind: SymbolKind::Data {
                data: Viewer {
                    viewer: DataViewer {
                        creatorop: creator.map(str::to_string),
                        creatorpos: creator_pos,
                        container: container.map(str::to_string),
                    },
                },
            },
        }
    }

    pub fn container(container: Option<&str>, contents: &[&str], temporal_step: i64) -> Self {
        Self {
            name: None,
            str: String::new(),
            kind: SymbolKind::Container {
                data: Viewer {
                    viewer: ContainerViewer {
                        contents: contents.iter().map(|id| id.to_string()).collect(),
                        container: container.map(str::to_string),
                        temporalstep: temporal_step,
                        height: 0,
                    },
                },
            },
        }
    }

    /// Direct parent container declared by the symbol, if any.
    pub fn parent(&self) -> Option<&str> {
        match &self.kind {
            SymbolKind::Op { data } => data.viewer.container.as_deref(),
            SymbolKind::Data { data } => data.viewer.container.as_deref(),
            SymbolKind::Container { data } => data.viewer.container.as_deref(),
            SymbolKind::Other => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            SymbolKind::Op { .. } => "graphop",
            SymbolKind::Data { .. } => "graphdata",
            SymbolKind::Container { .. } => "graphcontainer",
            SymbolKind::Other => "other",
        }
    }
}

/// Everything one pipeline run reads: the symbol table, the head to draw from and the
/// expansion flags of containers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub head: SymbolId,
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub symbol_table: BTreeMap<SymbolId, Symbol>,
    #[serde(default)]
    pub expansion: BTreeMap<SymbolId, bool>,
}

impl Snapshot {
    pub fn new(head: &str) -> Self {
        Self {
            head: head.to_string(),
            ..Default::default()
        }
    }

    pub fn insert(&mut self, id: &str, symbol: Symbol) {
        self.symbol_table.insert(id.to_string(), symbol);
    }

    pub fn set_expanded(&mut self, id: &str, expanded: bool) {
        self.expansion.insert(id.to_string(), expanded);
    }

    /// Absent abstractive containers start collapsed; absent temporal containers start
    /// expanded so iterations are visible by default.
    pub fn is_expanded(&self, id: &str, temporal: bool) -> bool {
        self.expansion.get(id).copied().unwrap_or(temporal)
    }

    pub fn identity(&self) -> SnapshotId {
        SnapshotId {
            head: self.head.clone(),
            revision: self.revision,
            expansion: self.expansion.clone(),
        }
    }
}

/// What decides whether a finished computation may still be committed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SnapshotId {
    pub head: SymbolId,
    pub revision: u64,
    pub expansion: BTreeMap<SymbolId, bool>,
}

/// Parent of a node: either a container or the synthetic root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scope {
    Root,
    Container(SymbolId),
}

impl Scope {
    pub fn from_parent(parent: Option<&str>) -> Self {
        match parent {
            Some(id) => Scope::Container(id.to_string()),
            None => Scope::Root,
        }
    }

    pub fn container_id(&self) -> Option<&str> {
        match self {
            Scope::Root => None,
            Scope::Container(id) => Some(id.as_str()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Root => f.write_str("root"),
            Scope::Container(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    In,
    Out,
}

/// A port on a node boundary, e.g. `O1_2i` is input port 2 of `O1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortId {
    pub node: SymbolId,
    pub direction: PortDirection,
    pub index: usize,
}

impl PortId {
    pub fn input(node: &str, index: usize) -> Self {
        Self {
            node: node.to_string(),
            direction: PortDirection::In,
            index,
        }
    }

    pub fn output(node: &str, index: usize) -> Self {
        Self {
            node: node.to_string(),
            direction: PortDirection::Out,
            index,
        }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.direction {
            PortDirection::In => 'i',
            PortDirection::Out => 'o',
        };
        write!(f, "{}_{}{}", self.node, self.index, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_symbols() {
        let json = r#"{
            "O1": {"type": "graphop", "str": "add", "data": {"viewer": {"args": ["D1", null], "kwargs": {"b": "D2", "a": "D3"}, "container": "C"}}},
            "D1": {"type": "graphdata", "name": "x", "str": "1", "data": {"viewer": {"creatorop": null, "creatorpos": 0, "container": null}}},
            "C": {"type": "graphcontainer", "str": "", "data": {"viewer": {"contents": ["O1"], "container": null, "temporalstep": 2, "height": 1}}},
            "n": {"type": "number", "str": "3", "data": null}
        }"#;
        let table: BTreeMap<SymbolId, Symbol> = serde_json::from_str(json).unwrap();
        match &table["O1"].kind {
            SymbolKind::Op { data } => {
                assert_eq!(data.viewer.args, vec![Some("D1".to_string()), None]);
                let keys: Vec<&str> = data.viewer.kwargs.keys().map(String::as_str).collect();
                assert_eq!(keys, vec!["a", "b"]);
            }
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(table["D1"].name.as_deref(), Some("x"));
        match &table["C"].kind {
            SymbolKind::Container { data } => assert_eq!(data.viewer.temporal_step(), Some(2)),
            other => panic!("unexpected kind {other:?}"),
        }
        assert!(matches!(table["n"].kind, SymbolKind::Other));
    }

    #[test]
    fn expansion_defaults_depend_on_container_kind() {
        let mut snapshot = Snapshot::new("D0");
        assert!(!snapshot.is_expanded("C", false));
        assert!(snapshot.is_expanded("T", true));
        snapshot.set_expanded("T", false);
        assert!(!snapshot.is_expanded("T", true));
    }

    #[test]
    fn port_ids_render_like_layout_ids() {
        assert_eq!(PortId::input("O1", 2).to_string(), "O1_2i");
        assert_eq!(PortId::output("C", 0).to_string(), "C_0o");
    }
}
