use tracing::{debug, warn};

use crate::errors::GrassError;
use crate::native::{BoundBox, NativeMap, Vertex};
use crate::options::GeometryType;
use crate::vector::LayerKind;

/// Which native ids pass a spatial filter.
///
/// Without a filter every id is selected. With a filter the mask covers ids
/// `0..=max(lines, areas)` (nodes included for node layers); ids outside of
/// it are never selected.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    mask: Option<Vec<bool>>,
}

impl Selection {
    /// Selection without a spatial filter.
    pub fn all() -> Selection {
        Selection { mask: None }
    }

    /// Builds the mask for `rect`. The caller holds the native lock.
    ///
    /// Bounding boxes are compared unless `exact` is set, in which case the
    /// rectangle is turned into a closed polygon and tested against the real
    /// geometries. Node layers always compare boxes.
    ///
    /// While `editing`, every layer other than a topology layer is read as
    /// its points and lines, so the mask holds point and line ids whatever
    /// the kind.
    pub fn build(
        map: &NativeMap,
        kind: LayerKind,
        rect: &geo_types::Rect<f64>,
        exact: bool,
        editing: bool,
    ) -> Selection {
        let mut size = map.num_lines().max(map.num_areas());
        if kind == LayerKind::TopoNode {
            size = size.max(map.num_nodes());
        }
        let mut mask = vec![false; size as usize + 1];

        let bbox = BoundBox::from_rect(rect);
        let edited = GeometryType::POINTS | GeometryType::LINES;
        let ids = match kind {
            LayerKind::TopoNode => map.select_nodes_by_box(&bbox),
            _ if editing && !kind.is_topo() => {
                if exact {
                    map.select_lines_by_polygon(&rect_polygon(rect), edited)
                } else {
                    map.select_lines_by_box(&bbox, edited)
                }
            }
            LayerKind::Polygon if exact => map.select_areas_by_polygon(&rect_polygon(rect)),
            LayerKind::Polygon => map.select_areas_by_box(&bbox),
            _ if exact => map.select_lines_by_polygon(&rect_polygon(rect), kind.type_mask()),
            _ => map.select_lines_by_box(&bbox, kind.type_mask()),
        };
        let selected = ids.len();
        for id in ids {
            match usize::try_from(id).ok().and_then(|i| mask.get_mut(i)) {
                Some(slot) => *slot = true,
                None => warn!(
                    "{}",
                    GrassError::MalformedId {
                        id,
                        size: mask.len()
                    }
                ),
            }
        }
        debug!(?kind, exact, editing, selected, size = mask.len(), "built selection");
        Selection { mask: Some(mask) }
    }

    pub fn is_filtered(&self) -> bool {
        self.mask.is_some()
    }

    /// Whether the native id passes the filter.
    pub fn contains(&self, id: i32) -> bool {
        match &self.mask {
            None => true,
            Some(mask) => usize::try_from(id)
                .ok()
                .and_then(|i| mask.get(i))
                .copied()
                .unwrap_or(false),
        }
    }

    /// Size of the mask, 0 without a filter.
    pub fn len(&self) -> usize {
        self.mask.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Closed five-vertex polygon of a rectangle, spanning all heights.
pub(crate) fn rect_polygon(rect: &geo_types::Rect<f64>) -> Vec<Vertex> {
    let (min, max) = (rect.min(), rect.max());
    vec![
        Vertex::new(min.x, min.y, -f64::MAX),
        Vertex::new(max.x, min.y, f64::MAX),
        Vertex::new(max.x, max.y, 0.0),
        Vertex::new(min.x, max.y, 0.0),
        Vertex::new(min.x, min.y, 0.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_polygon_is_closed() {
        let rect = geo_types::Rect::new((0.0, 0.0), (10.0, 5.0));
        let polygon = rect_polygon(&rect);
        assert_eq!(polygon.len(), 5);
        assert!(polygon[0].same_xy(&polygon[4]));
        assert_eq!(polygon[2].x, 10.0);
        assert_eq!(polygon[2].y, 5.0);
    }

    #[test]
    fn test_unfiltered_selection_contains_everything() {
        let selection = Selection::all();
        assert!(!selection.is_filtered());
        assert!(selection.contains(1));
        assert!(selection.contains(123_456));
        assert!(selection.is_empty());
    }
}
