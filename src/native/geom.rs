//! Planar predicates used by topology building and polygon selections.

use super::primitives::Vertex;

/// Twice the signed area of a ring; positive for counter-clockwise rings.
pub(crate) fn signed_area2(ring: &[Vertex]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..ring.len() {
        let a = &ring[i];
        let b = &ring[(i + 1) % ring.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    sum
}

/// Where a point lies relative to a ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Location {
    Inside,
    Boundary,
    Outside,
}

fn on_segment(p: &Vertex, a: &Vertex, b: &Vertex) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross != 0.0 {
        return false;
    }
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Even-odd location of `p` relative to a (closed or open) ring.
pub(crate) fn locate(p: &Vertex, ring: &[Vertex]) -> Location {
    let n = ring.len();
    if n == 0 {
        return Location::Outside;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let a = &ring[i];
        let b = &ring[j];
        if on_segment(p, a, b) {
            return Location::Boundary;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let x = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    if inside {
        Location::Inside
    } else {
        Location::Outside
    }
}

fn orientation(a: &Vertex, b: &Vertex, c: &Vertex) -> i8 {
    let v = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Whether segments `p1-p2` and `q1-q2` share at least one point.
pub(crate) fn segments_intersect(p1: &Vertex, p2: &Vertex, q1: &Vertex, q2: &Vertex) -> bool {
    let o1 = orientation(p1, p2, q1);
    let o2 = orientation(p1, p2, q2);
    let o3 = orientation(q1, q2, p1);
    let o4 = orientation(q1, q2, p2);
    if o1 != o2 && o3 != o4 {
        return true;
    }
    (o1 == 0 && on_segment(q1, p1, p2))
        || (o2 == 0 && on_segment(q2, p1, p2))
        || (o3 == 0 && on_segment(p1, q1, q2))
        || (o4 == 0 && on_segment(p2, q1, q2))
}

/// Whether any segment of `line` crosses any segment of `ring`.
pub(crate) fn polyline_crosses_ring(line: &[Vertex], ring: &[Vertex]) -> bool {
    if ring.len() < 2 {
        return false;
    }
    line.windows(2).any(|seg| {
        ring.windows(2)
            .any(|edge| segments_intersect(&seg[0], &seg[1], &edge[0], &edge[1]))
    })
}

/// Whether a polyline (or a single point) shares at least one point with the
/// area enclosed by `ring`.
pub(crate) fn polyline_intersects_ring(line: &[Vertex], ring: &[Vertex]) -> bool {
    if line
        .iter()
        .any(|p| locate(p, ring) != Location::Outside)
    {
        return true;
    }
    polyline_crosses_ring(line, ring)
}

/// Direction angle of the segment `from -> to`, in radians.
pub(crate) fn angle(from: &Vertex, to: &Vertex) -> f64 {
    (to.y - from.y).atan2(to.x - from.x)
}

/// A point strictly inside the polygon made of `outer` and `holes`, found on
/// a horizontal scan line through the polygon.
pub(crate) fn interior_point(outer: &[Vertex], holes: &[Vec<Vertex>]) -> Option<Vertex> {
    let mut ys: Vec<f64> = outer
        .iter()
        .chain(holes.iter().flatten())
        .map(|p| p.y)
        .collect();
    ys.sort_by(f64::total_cmp);
    ys.dedup();
    if ys.len() < 2 {
        return None;
    }
    // Try scan lines between consecutive distinct vertex ordinates, middle first.
    let mid = ys.len() / 2;
    let mut order: Vec<usize> = (1..ys.len()).collect();
    order.sort_by_key(|&i| i.abs_diff(mid));
    for i in order {
        let y = (ys[i - 1] + ys[i]) / 2.0;
        let mut xs = Vec::new();
        for ring in std::iter::once(outer).chain(holes.iter().map(Vec::as_slice)) {
            let n = ring.len();
            for k in 0..n {
                let a = &ring[k];
                let b = &ring[(k + 1) % n];
                if (a.y > y) != (b.y > y) {
                    xs.push((b.x - a.x) * (y - a.y) / (b.y - a.y) + a.x);
                }
            }
        }
        xs.sort_by(f64::total_cmp);
        let widest = xs
            .chunks_exact(2)
            .filter(|pair| pair[1] > pair[0])
            .max_by(|a, b| (a[1] - a[0]).total_cmp(&(b[1] - b[0])));
        if let Some(pair) = widest {
            return Some(Vertex::xy((pair[0] + pair[1]) / 2.0, y));
        }
    }
    None
}
