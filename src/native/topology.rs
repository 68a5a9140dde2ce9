//! Building of nodes, areas and isles from stored primitives.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::geom::{angle, locate, signed_area2, Location};
use super::primitives::{BoundBox, LineRecord, LineType, Vertex};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Node {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Attached lines; positive if the line starts here, negative if it ends here.
    /// Ordered by the direction angle of the line leaving the node.
    pub lines: Vec<i32>,
    pub angles: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct LineTopo {
    pub n1: i32,
    pub n2: i32,
    /// Area (positive) or isle (negative) to the left, 0 if none.
    pub left: i32,
    /// Area (positive) or isle (negative) to the right, 0 if none.
    pub right: i32,
    /// Centroids only: area id, negative for a duplicate centroid, 0 if outside.
    pub area: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Area {
    /// Directed boundaries of the outer ring, counter-clockwise.
    pub boundaries: Vec<i32>,
    pub isles: Vec<i32>,
    pub centroid: i32,
    pub bbox: BoundBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Isle {
    /// Directed boundaries of the ring, clockwise.
    pub boundaries: Vec<i32>,
    /// Enclosing area, 0 for the outer face.
    pub area: i32,
    pub bbox: BoundBox,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Topology {
    pub nodes: Vec<Node>,
    pub lines: Vec<LineTopo>,
    pub areas: Vec<Area>,
    pub isles: Vec<Isle>,
}

fn node_key(p: &Vertex) -> (u64, u64) {
    // `+ 0.0` folds -0.0 into 0.0
    ((p.x + 0.0).to_bits(), (p.y + 0.0).to_bits())
}

/// Angle of a line leaving its first vertex, `None` for degenerate lines.
fn start_angle(points: &[Vertex]) -> Option<f64> {
    let first = points.first()?;
    points
        .iter()
        .find(|p| !p.same_xy(first))
        .map(|p| angle(first, p))
}

fn end_angle(points: &[Vertex]) -> Option<f64> {
    let last = points.last()?;
    points
        .iter()
        .rev()
        .find(|p| !p.same_xy(last))
        .map(|p| angle(last, p))
}

/// Concatenates the points of directed lines into one closed ring.
pub(crate) fn ring_points(lines: &[LineRecord], directed: &[i32]) -> Vec<Vertex> {
    let mut ring: Vec<Vertex> = Vec::new();
    for &d in directed {
        let Some(line) = lines.get(d.unsigned_abs() as usize - 1) else {
            continue;
        };
        let skip = usize::from(!ring.is_empty());
        if d > 0 {
            ring.extend(line.points.iter().skip(skip).copied());
        } else {
            ring.extend(line.points.iter().rev().skip(skip).copied());
        }
    }
    ring
}

impl Topology {
    pub fn build(lines: &[LineRecord]) -> Topology {
        let mut topo = Topology {
            lines: vec![LineTopo::default(); lines.len()],
            ..Topology::default()
        };
        topo.build_nodes(lines);
        let rings = topo.build_areas(lines);
        topo.attach_isles(&rings);
        topo.attach_centroids(lines, &rings);
        topo
    }

    fn build_nodes(&mut self, lines: &[LineRecord]) {
        let mut index: HashMap<(u64, u64), usize> = HashMap::new();
        let mut node_for = |nodes: &mut Vec<Node>, p: &Vertex| -> usize {
            *index.entry(node_key(p)).or_insert_with(|| {
                nodes.push(Node {
                    x: p.x,
                    y: p.y,
                    z: p.z,
                    ..Node::default()
                });
                nodes.len() - 1
            })
        };

        for (i, line) in lines.iter().enumerate() {
            if !line.alive || !line.line_type.is_line_like() || line.points.len() < 2 {
                continue;
            }
            let id = i as i32 + 1;
            let (first, last) = (&line.points[0], &line.points[line.points.len() - 1]);
            let n1 = node_for(&mut self.nodes, first);
            let n2 = node_for(&mut self.nodes, last);
            let a1 = start_angle(&line.points).unwrap_or(f64::NAN);
            let a2 = end_angle(&line.points).unwrap_or(f64::NAN);
            self.nodes[n1].lines.push(id);
            self.nodes[n1].angles.push(a1);
            self.nodes[n2].lines.push(-id);
            self.nodes[n2].angles.push(a2);
            self.lines[i].n1 = n1 as i32 + 1;
            self.lines[i].n2 = n2 as i32 + 1;
        }

        for node in &mut self.nodes {
            let mut pairs: Vec<(f64, i32)> = node
                .angles
                .iter()
                .copied()
                .zip(node.lines.iter().copied())
                .collect();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            node.angles = pairs.iter().map(|p| p.0).collect();
            node.lines = pairs.iter().map(|p| p.1).collect();
        }
    }

    /// Node reached at the end of a directed line.
    fn end_node(&self, directed: i32) -> i32 {
        let topo = &self.lines[directed.unsigned_abs() as usize - 1];
        if directed > 0 {
            topo.n2
        } else {
            topo.n1
        }
    }

    /// Traces all faces left of directed boundaries. Returns the ring of every
    /// area followed by the ring of every isle, indexed as built.
    fn build_areas(&mut self, lines: &[LineRecord]) -> (Vec<Vec<Vertex>>, Vec<Vec<Vertex>>) {
        let is_face_edge = |d: i32, angle: f64| {
            let line = &lines[d.unsigned_abs() as usize - 1];
            line.alive && line.line_type == LineType::Boundary && !angle.is_nan()
        };
        // Outgoing boundary half-edges of every node, sorted by angle.
        let outgoing: Vec<Vec<i32>> = self
            .nodes
            .iter()
            .map(|n| {
                n.lines
                    .iter()
                    .zip(n.angles.iter())
                    .filter(|&(&d, &a)| is_face_edge(d, a))
                    .map(|(&d, _)| d)
                    .collect()
            })
            .collect();

        let mut visited: HashSet<i32> = HashSet::new();
        let mut area_rings = Vec::new();
        let mut isle_rings = Vec::new();
        let max_steps = 2 * lines.len() + 1;

        for start in outgoing.iter().flatten().copied().collect::<Vec<_>>() {
            if visited.contains(&start) {
                continue;
            }
            let mut cycle = Vec::new();
            let mut current = start;
            for _ in 0..max_steps {
                visited.insert(current);
                cycle.push(current);
                let node = self.end_node(current) as usize - 1;
                let around = &outgoing[node];
                let Some(k) = around.iter().position(|&d| d == -current) else {
                    break;
                };
                let next = around[(k + around.len() - 1) % around.len()];
                if next == start {
                    break;
                }
                current = next;
            }

            // Dangles are walked there and back, drop them from the ring.
            let directed: Vec<i32> = cycle
                .iter()
                .copied()
                .filter(|d| !cycle.contains(&-d))
                .collect();
            if directed.is_empty() {
                continue;
            }
            let ring = ring_points(lines, &directed);
            let area2 = signed_area2(&ring);
            let Some(bbox) = BoundBox::of_points(&ring) else {
                continue;
            };
            let face = if area2 > 0.0 {
                self.areas.push(Area {
                    boundaries: directed.clone(),
                    isles: Vec::new(),
                    centroid: 0,
                    bbox,
                });
                area_rings.push(ring);
                self.areas.len() as i32
            } else if area2 < 0.0 {
                self.isles.push(Isle {
                    boundaries: directed.clone(),
                    area: 0,
                    bbox,
                });
                isle_rings.push(ring);
                -(self.isles.len() as i32)
            } else {
                continue;
            };
            for d in directed {
                let topo = &mut self.lines[d.unsigned_abs() as usize - 1];
                if d > 0 {
                    topo.left = face;
                } else {
                    topo.right = face;
                }
            }
        }
        (area_rings, isle_rings)
    }

    fn attach_isles(&mut self, rings: &(Vec<Vec<Vertex>>, Vec<Vec<Vertex>>)) {
        let (area_rings, isle_rings) = rings;
        for (i, isle_ring) in isle_rings.iter().enumerate() {
            let isle_area = signed_area2(isle_ring).abs();
            let isle_box = self.isles[i].bbox;
            let mut best: Option<(usize, f64)> = None;
            for (a, area_ring) in area_rings.iter().enumerate() {
                let area_box = &self.areas[a].bbox;
                if isle_box.w < area_box.w
                    || isle_box.e > area_box.e
                    || isle_box.s < area_box.s
                    || isle_box.n > area_box.n
                {
                    continue;
                }
                let size = signed_area2(area_ring).abs();
                if size <= isle_area {
                    continue;
                }
                if isle_ring
                    .iter()
                    .any(|p| locate(p, area_ring) == Location::Outside)
                {
                    continue;
                }
                if best.map_or(true, |(_, s)| size < s) {
                    best = Some((a, size));
                }
            }
            if let Some((a, _)) = best {
                self.isles[i].area = a as i32 + 1;
                self.areas[a].isles.push(i as i32 + 1);
            }
        }
    }

    fn attach_centroids(
        &mut self,
        lines: &[LineRecord],
        rings: &(Vec<Vec<Vertex>>, Vec<Vec<Vertex>>),
    ) {
        let (area_rings, isle_rings) = rings;
        for (i, line) in lines.iter().enumerate() {
            if !line.alive || line.line_type != LineType::Centroid {
                continue;
            }
            let Some(p) = line.points.first() else {
                continue;
            };
            let found = (0..self.areas.len()).find(|&a| {
                let bbox = &self.areas[a].bbox;
                p.x >= bbox.w
                    && p.x <= bbox.e
                    && p.y >= bbox.s
                    && p.y <= bbox.n
                    && locate(p, &area_rings[a]) == Location::Inside
                    && self.areas[a]
                        .isles
                        .iter()
                        .all(|&isle| locate(p, &isle_rings[isle as usize - 1]) == Location::Outside)
            });
            let id = i as i32 + 1;
            self.lines[i].area = match found {
                Some(a) if self.areas[a].centroid == 0 => {
                    self.areas[a].centroid = id;
                    a as i32 + 1
                }
                Some(a) => -(a as i32 + 1),
                None => 0,
            };
        }
    }

    /// Area on one side of a boundary: isle sides resolve to the area that
    /// encloses the isle, 0 for the outer face.
    pub fn side_area(&self, side: i32) -> i32 {
        if side >= 0 {
            side
        } else {
            self.isles
                .get(side.unsigned_abs() as usize - 1)
                .map_or(0, |isle| isle.area)
        }
    }
}
