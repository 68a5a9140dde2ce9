//! Spatial selections by box and by polygon.

use super::geom::{locate, polyline_crosses_ring, polyline_intersects_ring, Location};
use super::primitives::{BoundBox, Vertex};
use super::NativeMap;
use crate::options::GeometryType;

impl NativeMap {
    /// Live lines of the given types whose bounding box overlaps `bbox`.
    pub fn select_lines_by_box(&self, bbox: &BoundBox, types: GeometryType) -> Vec<i32> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.alive && types.intersects(l.line_type.flag()))
            .filter(|(_, l)| BoundBox::of_points(&l.points).is_some_and(|b| b.overlaps(bbox)))
            .map(|(i, _)| i as i32 + 1)
            .collect()
    }

    /// Live lines of the given types sharing at least one point with the
    /// polygon.
    pub fn select_lines_by_polygon(&self, polygon: &[Vertex], types: GeometryType) -> Vec<i32> {
        let Some(poly_box) = BoundBox::of_points(polygon) else {
            return Vec::new();
        };
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.alive && types.intersects(l.line_type.flag()))
            .filter(|(_, l)| {
                BoundBox::of_points(&l.points).is_some_and(|b| xy_overlaps(&b, &poly_box))
                    && polyline_intersects_ring(&l.points, polygon)
            })
            .map(|(i, _)| i as i32 + 1)
            .collect()
    }

    /// Areas whose bounding box overlaps `bbox`.
    pub fn select_areas_by_box(&self, bbox: &BoundBox) -> Vec<i32> {
        (1..=self.num_areas())
            .filter(|&aid| self.area_bbox(aid).is_some_and(|b| xy_overlaps(&b, bbox)))
            .collect()
    }

    /// Areas sharing at least one point with the polygon.
    pub fn select_areas_by_polygon(&self, polygon: &[Vertex]) -> Vec<i32> {
        let Some(poly_box) = BoundBox::of_points(polygon) else {
            return Vec::new();
        };
        self.select_areas_by_box(&poly_box)
            .into_iter()
            .filter(|&aid| self.area_intersects_polygon(aid, polygon))
            .collect()
    }

    fn area_intersects_polygon(&self, aid: i32, polygon: &[Vertex]) -> bool {
        let Some(outer) = self.area_points(aid) else {
            return false;
        };
        if polyline_intersects_ring(&outer, polygon) {
            return true;
        }
        // The polygon may lie entirely inside the area, clear of its isles.
        let isles: Vec<Vec<Vertex>> = self
            .area_isles(aid)
            .into_iter()
            .filter_map(|iid| self.isle_points(iid))
            .collect();
        polygon.iter().any(|p| {
            locate(p, &outer) == Location::Inside
                && isles.iter().all(|isle| locate(p, isle) == Location::Outside)
        }) || isles.iter().any(|isle| polyline_crosses_ring(polygon, isle))
    }

    /// Nodes inside `bbox`.
    pub fn select_nodes_by_box(&self, bbox: &BoundBox) -> Vec<i32> {
        (1..=self.num_nodes())
            .filter(|&nid| {
                self.node_coor(nid).is_some_and(|p| {
                    p.x >= bbox.w && p.x <= bbox.e && p.y >= bbox.s && p.y <= bbox.n
                })
            })
            .collect()
    }
}

fn xy_overlaps(a: &BoundBox, b: &BoundBox) -> bool {
    a.w <= b.e && a.e >= b.w && a.s <= b.n && a.n >= b.s
}
