use serde::{Deserialize, Serialize};

use crate::options::GeometryType;

/// Type of a single native primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineType {
    Point,
    Line,
    Boundary,
    Centroid,
    Face,
    Kernel,
}

impl LineType {
    /// The bit-flag of this type, as used in native type masks.
    pub fn flag(self) -> GeometryType {
        match self {
            LineType::Point => GeometryType::POINT,
            LineType::Line => GeometryType::LINE,
            LineType::Boundary => GeometryType::BOUNDARY,
            LineType::Centroid => GeometryType::CENTROID,
            LineType::Face => GeometryType::FACE,
            LineType::Kernel => GeometryType::KERNEL,
        }
    }

    /// Converts a single bit-flag back to a type. Masks with more than one
    /// bit, and `AREA`, have no primitive type.
    pub fn from_flag(flag: GeometryType) -> Option<LineType> {
        [
            LineType::Point,
            LineType::Line,
            LineType::Boundary,
            LineType::Centroid,
            LineType::Face,
            LineType::Kernel,
        ]
        .into_iter()
        .find(|t| t.flag() == flag)
    }

    pub fn is_point_like(self) -> bool {
        GeometryType::POINTS.contains(self.flag()) || self == LineType::Kernel
    }

    pub fn is_line_like(self) -> bool {
        GeometryType::LINES.contains(self.flag())
    }

    /// Name of the type as shown in topology layers.
    pub fn name(self) -> &'static str {
        match self {
            LineType::Point => "point",
            LineType::Line => "line",
            LineType::Boundary => "boundary",
            LineType::Centroid => "centroid",
            LineType::Face => "face",
            LineType::Kernel => "kernel",
        }
    }

    /// Smallest number of vertices an object of this type needs.
    pub(crate) fn min_points(self) -> usize {
        if self.is_point_like() {
            1
        } else if self == LineType::Face {
            3
        } else {
            2
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Vertex {
    pub fn new(x: f64, y: f64, z: f64) -> Vertex {
        Vertex { x, y, z }
    }

    pub fn xy(x: f64, y: f64) -> Vertex {
        Vertex { x, y, z: 0.0 }
    }

    pub(crate) fn same_xy(&self, other: &Vertex) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl From<geo_types::Coord<f64>> for Vertex {
    fn from(c: geo_types::Coord<f64>) -> Vertex {
        Vertex::xy(c.x, c.y)
    }
}

impl From<Vertex> for geo_types::Coord<f64> {
    fn from(v: Vertex) -> geo_types::Coord<f64> {
        geo_types::Coord { x: v.x, y: v.y }
    }
}

/// A (field, category) pair attached to a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    pub field: i32,
    pub cat: i32,
}

/// The categories of one primitive, in the order they were attached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Categories(Vec<Category>);

impl Categories {
    pub fn new() -> Categories {
        Categories(Vec::new())
    }

    pub fn single(field: i32, cat: i32) -> Categories {
        Categories(vec![Category { field, cat }])
    }

    pub fn add(&mut self, field: i32, cat: i32) {
        let category = Category { field, cat };
        if !self.0.contains(&category) {
            self.0.push(category);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Category> {
        self.0.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.0.iter()
    }

    /// Categories of one field.
    pub fn of_field(&self, field: i32) -> impl Iterator<Item = i32> + '_ {
        self.0
            .iter()
            .filter(move |c| c.field == field)
            .map(|c| c.cat)
    }
}

/// One stored primitive as it appears in the `coor` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct LineRecord {
    pub line_type: LineType,
    pub points: Vec<Vertex>,
    pub cats: Categories,
    pub alive: bool,
}

/// Bounding box with a vertical extent, as used by native selections.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundBox {
    pub n: f64,
    pub s: f64,
    pub e: f64,
    pub w: f64,
    pub t: f64,
    pub b: f64,
}

impl BoundBox {
    /// Box covering the rectangle horizontally and everything vertically.
    pub fn from_rect(rect: &geo_types::Rect<f64>) -> BoundBox {
        BoundBox {
            n: rect.max().y,
            s: rect.min().y,
            e: rect.max().x,
            w: rect.min().x,
            t: f64::MAX,
            b: -f64::MAX,
        }
    }

    /// Box of a non-empty vertex list.
    pub fn of_points(points: &[Vertex]) -> Option<BoundBox> {
        let first = points.first()?;
        let mut bbox = BoundBox {
            n: first.y,
            s: first.y,
            e: first.x,
            w: first.x,
            t: first.z,
            b: first.z,
        };
        for p in &points[1..] {
            bbox.expand(p);
        }
        Some(bbox)
    }

    pub fn expand(&mut self, p: &Vertex) {
        self.n = self.n.max(p.y);
        self.s = self.s.min(p.y);
        self.e = self.e.max(p.x);
        self.w = self.w.min(p.x);
        self.t = self.t.max(p.z);
        self.b = self.b.min(p.z);
    }

    pub fn overlaps(&self, other: &BoundBox) -> bool {
        self.w <= other.e
            && self.e >= other.w
            && self.s <= other.n
            && self.n >= other.s
            && self.b <= other.t
            && self.t >= other.b
    }

    pub fn contains_point(&self, p: &Vertex) -> bool {
        p.x >= self.w
            && p.x <= self.e
            && p.y >= self.s
            && p.y <= self.n
            && p.z >= self.b
            && p.z <= self.t
    }
}
