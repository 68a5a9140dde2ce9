use std::fmt;
use std::str::FromStr;

use crate::errors::GrassError;
use crate::native::{LineType, NativeMap};
use crate::options::GeometryType;
use crate::vector::{Field, FieldType, WkbType};

/// What a layer shows of a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Point,
    Line,
    Face,
    Polygon,
    Boundary,
    Centroid,
    /// Points and centroids with their node.
    TopoPoint,
    /// Lines and boundaries with their nodes and sides.
    TopoLine,
    TopoNode,
}

impl LayerKind {
    /// Native types the layer reads.
    pub fn type_mask(self) -> GeometryType {
        match self {
            LayerKind::Point => GeometryType::POINT,
            LayerKind::Line => GeometryType::LINE,
            LayerKind::Face => GeometryType::FACE,
            LayerKind::Polygon => GeometryType::AREA,
            LayerKind::Boundary => GeometryType::BOUNDARY,
            LayerKind::Centroid => GeometryType::CENTROID,
            LayerKind::TopoPoint => GeometryType::POINTS,
            LayerKind::TopoLine => GeometryType::LINES,
            LayerKind::TopoNode => GeometryType::empty(),
        }
    }

    pub fn wkb_type(self) -> WkbType {
        match self {
            LayerKind::Point | LayerKind::Centroid | LayerKind::TopoPoint | LayerKind::TopoNode => {
                WkbType::Point
            }
            LayerKind::Line | LayerKind::Boundary | LayerKind::TopoLine => WkbType::LineString,
            LayerKind::Face | LayerKind::Polygon => WkbType::Polygon,
        }
    }

    /// Layers listing raw topology instead of categorised features.
    pub fn is_topo(self) -> bool {
        matches!(
            self,
            LayerKind::TopoPoint | LayerKind::TopoLine | LayerKind::TopoNode
        )
    }

    /// Fixed schema of topology layers, `None` for attribute layers.
    pub fn topo_fields(self) -> Option<Vec<Field>> {
        let int = |name: &str| Field::new(name, FieldType::Integer);
        match self {
            LayerKind::TopoPoint => Some(vec![
                int("id"),
                Field::new("type", FieldType::String),
                int("node"),
            ]),
            LayerKind::TopoLine => Some(vec![
                int("id"),
                Field::new("type", FieldType::String),
                int("node1"),
                int("node2"),
                int("left"),
                int("right"),
            ]),
            LayerKind::TopoNode => Some(vec![int("id"), Field::new("lines", FieldType::String)]),
            _ => None,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            LayerKind::Point => "point",
            LayerKind::Line => "line",
            LayerKind::Face => "face",
            LayerKind::Polygon => "polygon",
            LayerKind::Boundary => "boundary",
            LayerKind::Centroid => "centroid",
            LayerKind::TopoPoint => "point",
            LayerKind::TopoLine => "line",
            LayerKind::TopoNode => "node",
        }
    }
}

/// Parsed layer name: `<field>_<type>` or `topo_<type>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerName {
    /// Category field, 0 for topology layers.
    pub field: i32,
    pub kind: LayerKind,
}

impl FromStr for LayerName {
    type Err = GrassError;

    fn from_str(name: &str) -> Result<LayerName, GrassError> {
        let invalid = || GrassError::InvalidLayerName(name.to_string());
        let (prefix, suffix) = name.split_once('_').ok_or_else(invalid)?;
        if prefix == "topo" {
            let kind = match suffix {
                "point" => LayerKind::TopoPoint,
                "line" => LayerKind::TopoLine,
                "node" => LayerKind::TopoNode,
                _ => return Err(invalid()),
            };
            return Ok(LayerName { field: 0, kind });
        }
        let field: i32 = prefix.parse().map_err(|_| invalid())?;
        if field < 1 {
            return Err(invalid());
        }
        let kind = match suffix {
            "point" => LayerKind::Point,
            "line" => LayerKind::Line,
            "face" => LayerKind::Face,
            "polygon" => LayerKind::Polygon,
            "boundary" => LayerKind::Boundary,
            "centroid" => LayerKind::Centroid,
            _ => return Err(invalid()),
        };
        Ok(LayerName { field, kind })
    }
}

impl fmt::Display for LayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_topo() {
            write!(f, "topo_{}", self.kind.suffix())
        } else {
            write!(f, "{}_{}", self.field, self.kind.suffix())
        }
    }
}

/// Topological classification of an object, shown while editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopoSymbol {
    Undefined,
    Point,
    Line,
    /// Boundary without areas on either side.
    Boundary0,
    /// Boundary with an area on one side.
    Boundary1,
    /// Boundary between two areas.
    Boundary2,
    CentroidIn,
    CentroidOut,
    CentroidDupl,
    /// Node without lines.
    Node0,
    Node1,
    Node2,
}

impl TopoSymbol {
    pub const ALL: [TopoSymbol; 12] = [
        TopoSymbol::Undefined,
        TopoSymbol::Point,
        TopoSymbol::Line,
        TopoSymbol::Boundary0,
        TopoSymbol::Boundary1,
        TopoSymbol::Boundary2,
        TopoSymbol::CentroidIn,
        TopoSymbol::CentroidOut,
        TopoSymbol::CentroidDupl,
        TopoSymbol::Node0,
        TopoSymbol::Node1,
        TopoSymbol::Node2,
    ];

    /// Stable code stored in the topology symbol column.
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<TopoSymbol> {
        TopoSymbol::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn label(self) -> &'static str {
        match self {
            TopoSymbol::Undefined => "Undefined",
            TopoSymbol::Point => "Point",
            TopoSymbol::Line => "Line",
            TopoSymbol::Boundary0 => "Boundary (isolated)",
            TopoSymbol::Boundary1 => "Boundary (area on one side)",
            TopoSymbol::Boundary2 => "Boundary (areas on both sides)",
            TopoSymbol::CentroidIn => "Centroid (in area)",
            TopoSymbol::CentroidOut => "Centroid (outside area)",
            TopoSymbol::CentroidDupl => "Centroid (duplicate in area)",
            TopoSymbol::Node0 => "Node (isolated)",
            TopoSymbol::Node1 => "Node (dangle)",
            TopoSymbol::Node2 => "Node (connecting lines)",
        }
    }

    /// Classifies a boundary by the areas on its two sides (0 for none).
    pub fn for_boundary(left_area: i32, right_area: i32) -> TopoSymbol {
        match (left_area != 0, right_area != 0) {
            (true, true) => TopoSymbol::Boundary2,
            (false, false) => TopoSymbol::Boundary0,
            _ => TopoSymbol::Boundary1,
        }
    }

    /// Classifies a centroid by the area it was attached to.
    pub fn for_centroid(area: i32) -> TopoSymbol {
        match area {
            0 => TopoSymbol::CentroidOut,
            a if a > 0 => TopoSymbol::CentroidIn,
            _ => TopoSymbol::CentroidDupl,
        }
    }

    pub fn for_node(line_count: usize) -> TopoSymbol {
        match line_count {
            0 => TopoSymbol::Node0,
            1 => TopoSymbol::Node1,
            _ => TopoSymbol::Node2,
        }
    }

    /// Classifies a live line. The caller holds the native lock.
    pub fn of_line(map: &NativeMap, lid: i32, line_type: LineType) -> TopoSymbol {
        match line_type {
            LineType::Point => TopoSymbol::Point,
            LineType::Line => TopoSymbol::Line,
            LineType::Centroid => TopoSymbol::for_centroid(map.centroid_area(lid)),
            LineType::Boundary => {
                let (left, right) = map.line_areas(lid).unwrap_or((0, 0));
                TopoSymbol::for_boundary(map.side_area(left), map.side_area(right))
            }
            LineType::Face | LineType::Kernel => TopoSymbol::Undefined,
        }
    }

    pub fn of_node(map: &NativeMap, nid: i32) -> TopoSymbol {
        TopoSymbol::for_node(map.node_lines(nid).len())
    }
}

impl fmt::Display for TopoSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_layer_names() {
        let name: LayerName = "1_point".parse().unwrap();
        assert_eq!((name.field, name.kind), (1, LayerKind::Point));
        let name: LayerName = "12_polygon".parse().unwrap();
        assert_eq!((name.field, name.kind), (12, LayerKind::Polygon));
        assert_eq!(name.to_string(), "12_polygon");
        let name: LayerName = "topo_node".parse().unwrap();
        assert_eq!((name.field, name.kind), (0, LayerKind::TopoNode));
        assert_eq!(name.to_string(), "topo_node");
        for bad in ["point", "x_point", "1_area", "0_line", "topo_area", ""] {
            assert!(
                matches!(bad.parse::<LayerName>(), Err(GrassError::InvalidLayerName(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_kind_types() {
        assert_eq!(LayerKind::Polygon.type_mask(), GeometryType::AREA);
        assert_eq!(LayerKind::TopoLine.type_mask(), GeometryType::LINES);
        assert_eq!(LayerKind::Boundary.wkb_type(), WkbType::LineString);
        assert_eq!(LayerKind::Face.wkb_type(), WkbType::Polygon);
        assert_eq!(LayerKind::TopoLine.topo_fields().unwrap().len(), 6);
        assert!(LayerKind::Line.topo_fields().is_none());
    }

    #[test]
    fn test_boundary_classification() {
        assert_eq!(TopoSymbol::for_boundary(0, 0), TopoSymbol::Boundary0);
        assert_eq!(TopoSymbol::for_boundary(3, 0), TopoSymbol::Boundary1);
        assert_eq!(TopoSymbol::for_boundary(0, 3), TopoSymbol::Boundary1);
        assert_eq!(TopoSymbol::for_boundary(3, 7), TopoSymbol::Boundary2);
        assert_eq!(TopoSymbol::Boundary0.label(), "Boundary (isolated)");
    }

    #[test]
    fn test_symbol_codes_are_stable() {
        for (i, symbol) in TopoSymbol::ALL.iter().enumerate() {
            assert_eq!(symbol.code(), i as i32);
            assert_eq!(TopoSymbol::from_code(i as i32), Some(*symbol));
        }
        assert_eq!(TopoSymbol::from_code(12), None);
        assert_eq!(TopoSymbol::for_centroid(-2), TopoSymbol::CentroidDupl);
        assert_eq!(TopoSymbol::for_node(5), TopoSymbol::Node2);
    }
}
