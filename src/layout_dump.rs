use crate::ir::SymbolId;
use crate::layout::{Diagnostic, EdgeKind, Layout, NodeLayout, NodePayload, Point, PortSide};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Flat, absolute-coordinate view of a [`Layout`] for tooling and golden files.
#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub id: SymbolId,
    pub parent: Option<SymbolId>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub payload: NodePayload,
    pub ports: Vec<PortDump>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PortDump {
    pub id: String,
    pub side: PortSide,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Serialize)]
pub struct EdgeDump {
    pub edge: usize,
    pub from: String,
    pub to: String,
    pub data: SymbolId,
    pub arg_name: String,
    pub kind: EdgeKind,
    pub points: Vec<[f32; 2]>,
}

impl LayoutDump {
    pub fn from_layout(layout: &Layout) -> Self {
        let mut nodes = Vec::new();
        let mut stack: Vec<(&NodeLayout, Option<&str>, Point)> = layout
            .root
            .children
            .iter()
            .rev()
            .map(|child| (child, None, Point::default()))
            .collect();
        while let Some((node, parent, origin)) = stack.pop() {
            let at = origin.offset(node.x, node.y);
            nodes.push(NodeDump {
                id: node.id.clone(),
                parent: parent.map(str::to_string),
                x: at.x,
                y: at.y,
                width: node.width,
                height: node.height,
                payload: node.payload.clone(),
                ports: node
                    .ports
                    .iter()
                    .map(|port| PortDump {
                        id: port.id.to_string(),
                        side: port.side,
                        x: at.x + port.x,
                        y: at.y + port.y,
                    })
                    .collect(),
                error: node.error.clone(),
            });
            for child in node.children.iter().rev() {
                stack.push((child, Some(node.id.as_str()), at));
            }
        }

        let edges = layout
            .edges
            .iter()
            .map(|edge| EdgeDump {
                edge: edge.edge,
                from: edge.from.to_string(),
                to: edge.to.to_string(),
                data: edge.data.clone(),
                arg_name: edge.arg_name.clone(),
                kind: edge.kind.clone(),
                points: edge.points.iter().map(|p| [p.x, p.y]).collect(),
            })
            .collect();

        LayoutDump {
            width: layout.width,
            height: layout.height,
            nodes,
            edges,
            diagnostics: layout.diagnostics.clone(),
        }
    }
}

/// Writes the dump as JSON to `path`, or to stdout when no path is given.
pub fn write_layout_dump(path: Option<&Path>, layout: &Layout, pretty: bool) -> anyhow::Result<()> {
    let dump = LayoutDump::from_layout(layout);
    match path {
        Some(path) => {
            let file = File::create(path)?;
            write_json(BufWriter::new(file), &dump, pretty)
        }
        None => {
            let stdout = io::stdout();
            write_json(stdout.lock(), &dump, pretty)
        }
    }
}

fn write_json<W: Write>(mut writer: W, dump: &LayoutDump, pretty: bool) -> anyhow::Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut writer, dump)?;
    } else {
        serde_json::to_writer(&mut writer, dump)?;
    }
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
