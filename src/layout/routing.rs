use std::collections::BTreeMap;

use crate::ir::PortId;

use super::types::{Point, PortLayout, PortSide, Size};

// ── Port stub sizing ────────────────────────────────────────────────
/// Ratio of node_spacing used as port stub length.
const PORT_STUB_RATIO: f32 = 0.35;
/// Hard clamp range for port stub length.
const PORT_STUB_MIN: f32 = 6.0;
const PORT_STUB_MAX: f32 = 22.0;

const EPSILON: f32 = 1e-4;

/// Where a route attaches and which way it leaves (or arrives from).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub at: Point,
    pub facing: PortSide,
}

pub fn port_stub_length(node_spacing: f32) -> f32 {
    (node_spacing * PORT_STUB_RATIO).clamp(PORT_STUB_MIN, PORT_STUB_MAX)
}

pub fn port_stub_point(point: Point, facing: PortSide, length: f32) -> Point {
    match facing {
        PortSide::West => point.offset(-length, 0.0),
        PortSide::East => point.offset(length, 0.0),
        PortSide::North => point.offset(0.0, -length),
        PortSide::South => point.offset(0.0, length),
    }
}

/// Spreads ports evenly along each side of a box. Ports keep their relative order per
/// side.
pub fn distribute_ports(size: Size, ports: &[(PortId, PortSide)]) -> Vec<PortLayout> {
    let mut per_side: BTreeMap<u8, Vec<&(PortId, PortSide)>> = BTreeMap::new();
    for port in ports {
        per_side.entry(side_slot(port.1)).or_default().push(port);
    }

    let mut out = Vec::with_capacity(ports.len());
    for port in ports {
        let Some(group) = per_side.get(&side_slot(port.1)) else {
            continue;
        };
        let Some(slot) = group.iter().position(|other| other.0 == port.0) else {
            continue;
        };
        let step = (slot + 1) as f32;
        let slots = (group.len() + 1) as f32;
        let (x, y) = match port.1 {
            PortSide::North => (size.width * step / slots, 0.0),
            PortSide::South => (size.width * step / slots, size.height),
            PortSide::West => (0.0, size.height * step / slots),
            PortSide::East => (size.width, size.height * step / slots),
        };
        out.push(PortLayout {
            id: port.0.clone(),
            side: port.1,
            x,
            y,
        });
    }
    out
}

fn side_slot(side: PortSide) -> u8 {
    match side {
        PortSide::North => 0,
        PortSide::South => 1,
        PortSide::West => 2,
        PortSide::East => 3,
    }
}

/// Drops repeated points and interior points on a straight run. The stubs right after
/// the start and right before the end are kept.
pub fn compress_path(points: &[Point]) -> Vec<Point> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    out.push(points[0]);
    for idx in 1..points.len() - 1 {
        let prev = out[out.len() - 1];
        let curr = points[idx];
        if same_point(prev, curr) {
            continue;
        }
        if idx == 1 || idx == points.len() - 2 {
            out.push(curr);
            continue;
        }
        let next = points[idx + 1];
        let dx1 = curr.x - prev.x;
        let dy1 = curr.y - prev.y;
        let dx2 = next.x - curr.x;
        let dy2 = next.y - curr.y;
        if (dx1.abs() <= EPSILON && dx2.abs() <= EPSILON)
            || (dy1.abs() <= EPSILON && dy2.abs() <= EPSILON)
        {
            continue;
        }
        out.push(curr);
    }
    let last = points[points.len() - 1];
    if !same_point(last, out[out.len() - 1]) {
        out.push(last);
    }
    out
}

fn same_point(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() <= EPSILON && (a.y - b.y).abs() <= EPSILON
}

/// Orthogonal route between two anchors: a stub out of each port joined through a
/// midline.
pub fn route_orthogonal(from: Anchor, to: Anchor, stub: f32) -> Vec<Point> {
    let a = port_stub_point(from.at, from.facing, stub);
    let b = port_stub_point(to.at, to.facing, stub);
    let mut points = vec![from.at, a];
    if from.facing.is_vertical() {
        let mid = (a.y + b.y) * 0.5;
        points.push(Point::new(a.x, mid));
        points.push(Point::new(b.x, mid));
    } else {
        let mid = (a.x + b.x) * 0.5;
        points.push(Point::new(mid, a.y));
        points.push(Point::new(mid, b.y));
    }
    points.push(b);
    points.push(to.at);
    compress_path(&points)
}

/// One right-angle bend from `a` to `b`.
pub fn elbow(a: Point, b: Point, vertical_first: bool) -> [Point; 3] {
    let corner = if vertical_first {
        Point::new(a.x, b.y)
    } else {
        Point::new(b.x, a.y)
    };
    [a, corner, b]
}

pub fn is_orthogonal(points: &[Point]) -> bool {
    points
        .windows(2)
        .all(|pair| (pair[0].x - pair[1].x).abs() <= EPSILON || (pair[0].y - pair[1].y).abs() <= EPSILON)
}
