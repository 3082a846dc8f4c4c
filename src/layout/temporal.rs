use std::collections::HashMap;

use crate::config::LayoutConfig;
use crate::ir::{PortId, SymbolId};

use super::graph::RawEdge;
use super::invoke::Placed;
use super::routing::elbow;
use super::slicing::TemporalEdge;
use super::types::{EdgeKind, EdgeLayout, Point};

/// Absolute position of a port owned by `lineage[0]`: its offset plus the local offsets
/// of every node along the chain. `None` when any node on the chain is not visible.
fn absolute_port(placed: &Placed, lineage: &[SymbolId], port: &PortId) -> Option<Point> {
    let owner = lineage.first()?;
    let local = placed.get(owner)?.port(port)?;
    let mut at = Point::new(local.x, local.y);
    for id in lineage {
        if !placed.is_visible(id) {
            return None;
        }
        let placement = placed.get(id)?;
        at = at.offset(placement.x, placement.y);
    }
    Some(at)
}

/// Visible ports on one side of a temporal edge, innermost first. `ports[i]` belongs to
/// `lineage[i]`.
fn visible_side(placed: &Placed, ports: &[PortId], lineage: &[SymbolId]) -> Vec<Point> {
    ports
        .iter()
        .enumerate()
        .filter_map(|(depth, port)| absolute_port(placed, lineage.get(depth..)?, port))
        .collect()
}

/// Draws every deferred cross-iteration edge from final geometry. Node placements are
/// only read.
pub fn synthesize(
    temporal: &[TemporalEdge],
    raw_edges: &[RawEdge],
    placed: &Placed,
    config: &LayoutConfig,
) -> Vec<EdgeLayout> {
    let mut out_lanes: HashMap<&str, usize> = HashMap::new();
    let mut in_lanes: HashMap<&str, usize> = HashMap::new();
    let mut edges = Vec::with_capacity(temporal.len());

    for record in temporal {
        let Some(raw) = raw_edges.get(record.edge) else {
            continue;
        };
        let from_ports = &record.ports[..record.split];
        let mut to_ports: Vec<PortId> = record.ports[record.split..].to_vec();
        to_ports.reverse();

        let exit_owner = record.from_lineage.get(record.split - 1);
        let entry_owner = record.to_lineage.get(to_ports.len() - 1);
        let (Some(exit_owner), Some(entry_owner)) = (exit_owner, entry_owner) else {
            continue;
        };
        let exit = absolute_port(
            placed,
            &record.from_lineage[record.split - 1..],
            record.exit_port(),
        );
        let entry = absolute_port(
            placed,
            &record.to_lineage[to_ports.len() - 1..],
            record.entry_port(),
        );
        let (Some(exit), Some(entry)) = (exit, entry) else {
            tracing::debug!(edge = record.edge, "temporal edge has a hidden end; skipped");
            continue;
        };

        let out_lane = {
            let count = out_lanes.entry(exit_owner.as_str()).or_insert(0);
            *count += 1;
            *count
        };
        let in_lane = {
            let count = in_lanes.entry(entry_owner.as_str()).or_insert(0);
            *count += 1;
            *count
        };
        let out_offset = config.lane_pitch * out_lane as f32;
        let in_offset = config.lane_pitch * in_lane as f32;

        let mut points: Vec<Point> = Vec::new();
        let from_side = visible_side(placed, from_ports, &record.from_lineage);
        for pair in from_side.windows(2) {
            points.extend(elbow(pair[0], pair[1], true));
        }
        points.push(exit);

        let lane_start = Point::new(exit.x + out_offset, exit.y);
        let lane_end = Point::new(entry.x - in_offset, entry.y);
        points.extend(elbow(lane_start, lane_end, true));
        points.push(entry);

        let mut to_side = visible_side(placed, &to_ports, &record.to_lineage);
        to_side.reverse();
        for pair in to_side.windows(2) {
            points.extend(elbow(pair[0], pair[1], false));
        }
        points.push(to_side.last().copied().unwrap_or(entry));

        edges.push(EdgeLayout {
            edge: record.edge,
            from: raw.from.clone(),
            to: raw.to.clone(),
            data: raw.data.clone(),
            arg_name: raw.arg_name.clone(),
            kind: EdgeKind::Temporal,
            points: dedup(points),
        });
    }
    tracing::debug!(count = edges.len(), "synthesized temporal edges");
    edges
}

/// Boundary crossings stay in the polyline even on straight runs.
fn dedup(points: Vec<Point>) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for point in points {
        if out.last() != Some(&point) {
            out.push(point);
        }
    }
    out
}
