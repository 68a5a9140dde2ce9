//! Binary geometry buffers in the well-known binary layout.
//!
//! Only the subset produced from topology is supported: points, line strings
//! and polygons with rings, all 2-D.

use crate::errors::{GrassError, Result};
use crate::native::{LineType, NativeMap, Vertex};

/// Geometry type codes of the well-known binary encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum WkbType {
    Point = 1,
    LineString = 2,
    Polygon = 3,
}

impl WkbType {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Result<WkbType> {
        match code {
            1 => Ok(WkbType::Point),
            2 => Ok(WkbType::LineString),
            3 => Ok(WkbType::Polygon),
            other => Err(GrassError::UnsupportedGeometry(other)),
        }
    }
}

/// Byte order marker: 0 for big endian (XDR), 1 for little endian (NDR).
pub const WKB_XDR: u8 = 0;
pub const WKB_NDR: u8 = 1;

/// An owned geometry buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wkb(Vec<u8>);

impl Wkb {
    /// Wraps raw bytes after checking the header.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Wkb> {
        if bytes.len() < 5 {
            return Err(GrassError::MalformedWkb(format!(
                "buffer of {} bytes is shorter than the header",
                bytes.len()
            )));
        }
        if bytes[0] > WKB_NDR {
            return Err(GrassError::MalformedWkb(format!(
                "invalid byte order marker {}",
                bytes[0]
            )));
        }
        Ok(Wkb(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_little_endian(&self) -> bool {
        self.0[0] == WKB_NDR
    }

    /// Type code stored in the header.
    pub fn type_code(&self) -> u32 {
        let raw = [self.0[1], self.0[2], self.0[3], self.0[4]];
        if self.is_little_endian() {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        }
    }

    pub fn wkb_type(&self) -> Result<WkbType> {
        WkbType::from_code(self.type_code())
    }
}

impl AsRef<[u8]> for Wkb {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Appends typed values to a geometry buffer, keeping track of the layout.
#[derive(Debug)]
pub struct WkbWriter {
    buf: Vec<u8>,
    little_endian: bool,
}

impl WkbWriter {
    /// Starts a buffer in the byte order of the host.
    pub fn new(wkb_type: WkbType) -> WkbWriter {
        WkbWriter::with_byte_order(wkb_type, cfg!(target_endian = "little"))
    }

    pub fn with_byte_order(wkb_type: WkbType, little_endian: bool) -> WkbWriter {
        let mut writer = WkbWriter {
            buf: Vec::with_capacity(64),
            little_endian,
        };
        writer
            .buf
            .push(if little_endian { WKB_NDR } else { WKB_XDR });
        writer.write_u32(wkb_type.code());
        writer
    }

    pub fn write_u32(&mut self, value: u32) {
        let bytes = if self.little_endian {
            value.to_le_bytes()
        } else {
            value.to_be_bytes()
        };
        self.buf.extend_from_slice(&bytes);
    }

    pub fn write_f64(&mut self, value: f64) {
        let bytes = if self.little_endian {
            value.to_le_bytes()
        } else {
            value.to_be_bytes()
        };
        self.buf.extend_from_slice(&bytes);
    }

    pub fn write_xy(&mut self, p: &Vertex) {
        self.write_f64(p.x);
        self.write_f64(p.y);
    }

    /// Point count followed by the points.
    pub fn write_points(&mut self, points: &[Vertex]) {
        self.write_u32(points.len() as u32);
        for p in points {
            self.write_xy(p);
        }
    }

    pub fn finish(self) -> Wkb {
        Wkb(self.buf)
    }
}

/// Native object a feature is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeObject {
    Line { lid: i32, line_type: LineType },
    Area { aid: i32 },
    Node { nid: i32 },
}

/// Builds geometry buffers from native objects.
#[derive(Debug, Clone, Copy)]
pub struct GeometryBuilder {
    /// Type code written for line and point objects.
    wkb_type: WkbType,
    /// Edit sessions only show simple points and lines.
    normalize: bool,
}

impl GeometryBuilder {
    pub fn new(wkb_type: WkbType, normalize: bool) -> GeometryBuilder {
        GeometryBuilder {
            wkb_type,
            normalize,
        }
    }

    pub fn point(p: &Vertex, wkb_type: WkbType) -> Wkb {
        let mut writer = WkbWriter::new(wkb_type);
        writer.write_xy(p);
        writer.finish()
    }

    pub fn line(points: &[Vertex], wkb_type: WkbType) -> Wkb {
        let mut writer = WkbWriter::new(wkb_type);
        writer.write_points(points);
        writer.finish()
    }

    /// Polygon from the outer ring followed by inner rings.
    pub fn polygon<'r, I>(outer: &[Vertex], inner: I) -> Wkb
    where
        I: IntoIterator<Item = &'r [Vertex]>,
        I::IntoIter: ExactSizeIterator,
    {
        let inner = inner.into_iter();
        let mut writer = WkbWriter::new(WkbType::Polygon);
        writer.write_u32(1 + inner.len() as u32);
        writer.write_points(outer);
        for ring in inner {
            writer.write_points(ring);
        }
        writer.finish()
    }

    /// Geometry of a primitive given its type and points.
    pub fn primitive(&self, line_type: LineType, points: &[Vertex]) -> Result<Wkb> {
        let wkb_type = if self.normalize {
            match line_type {
                t if t.is_point_like() => WkbType::Point,
                t if t.is_line_like() => WkbType::LineString,
                _ => WkbType::Polygon,
            }
        } else {
            self.wkb_type
        };
        match line_type {
            LineType::Face => {
                let mut writer = WkbWriter::new(wkb_type);
                writer.write_u32(1);
                writer.write_points(points);
                Ok(writer.finish())
            }
            t if t.is_point_like() => {
                let p = points.first().ok_or(GrassError::InvalidPrimitive {
                    line_type: t,
                    points: 0,
                })?;
                Ok(GeometryBuilder::point(p, wkb_type))
            }
            _ => Ok(GeometryBuilder::line(points, wkb_type)),
        }
    }

    /// Reads a native object and builds its geometry. The caller holds the
    /// native lock.
    pub fn build(&self, map: &NativeMap, object: NativeObject) -> Result<Wkb> {
        match object {
            NativeObject::Node { nid } => {
                let p = map.node_coor(nid).ok_or_else(|| GrassError::NativeCall {
                    method_name: "node_coor",
                    msg: format!("node {nid} does not exist"),
                })?;
                Ok(GeometryBuilder::point(&p, WkbType::Point))
            }
            NativeObject::Line { lid, .. } => {
                let (line_type, points, _) = map.read_line(lid)?;
                self.primitive(line_type, &points)
            }
            NativeObject::Area { aid } => {
                let outer = map.area_points(aid).ok_or_else(|| GrassError::NativeCall {
                    method_name: "area_points",
                    msg: format!("area {aid} does not exist"),
                })?;
                // Isle sizes are only known once each isle is read.
                let mut writer = WkbWriter::new(WkbType::Polygon);
                let isles = map.area_isles(aid);
                writer.write_u32(1 + isles.len() as u32);
                writer.write_points(&outer);
                for iid in isles {
                    let ring = map.isle_points(iid).ok_or_else(|| GrassError::NativeCall {
                        method_name: "isle_points",
                        msg: format!("isle {iid} of area {aid} does not exist"),
                    })?;
                    writer.write_points(&ring);
                }
                Ok(writer.finish())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(n: usize) -> Vec<Vertex> {
        (0..n).map(|i| Vertex::xy(i as f64, i as f64 * 2.0)).collect()
    }

    #[test]
    fn test_buffer_sizes() {
        let point = GeometryBuilder::point(&Vertex::xy(1.0, 2.0), WkbType::Point);
        assert_eq!(point.len(), 1 + 4 + 16);
        for k in [2, 5, 17] {
            let line = GeometryBuilder::line(&points(k), WkbType::LineString);
            assert_eq!(line.len(), 1 + 4 + 4 + 16 * k);
        }
        let outer = points(5);
        let isles = [points(4), points(7)];
        let polygon = GeometryBuilder::polygon(&outer, isles.iter().map(Vec::as_slice));
        assert_eq!(
            polygon.len(),
            1 + 4 + 4 + 4 + 16 * 5 + (4 + 16 * 4) + (4 + 16 * 7)
        );
    }

    #[test]
    fn test_header() {
        let wkb = WkbWriter::with_byte_order(WkbType::LineString, false).finish();
        assert_eq!(wkb.as_bytes(), &[0, 0, 0, 0, 2]);
        assert_eq!(wkb.wkb_type().unwrap(), WkbType::LineString);
        let wkb = WkbWriter::with_byte_order(WkbType::Polygon, true).finish();
        assert_eq!(wkb.as_bytes(), &[1, 3, 0, 0, 0]);
        assert!(wkb.is_little_endian());
        assert!(Wkb::from_bytes(vec![1, 2]).is_err());
        assert!(Wkb::from_bytes(vec![7, 1, 0, 0, 0]).is_err());
        assert!(matches!(
            WkbType::from_code(6),
            Err(GrassError::UnsupportedGeometry(6))
        ));
    }

    #[test]
    fn test_normalized_primitive_types() {
        let builder = GeometryBuilder::new(WkbType::Polygon, true);
        let wkb = builder
            .primitive(LineType::Boundary, &points(3))
            .unwrap();
        assert_eq!(wkb.wkb_type().unwrap(), WkbType::LineString);
        let wkb = builder
            .primitive(LineType::Centroid, &points(1))
            .unwrap();
        assert_eq!(wkb.wkb_type().unwrap(), WkbType::Point);

        let builder = GeometryBuilder::new(WkbType::Polygon, false);
        let face = builder.primitive(LineType::Face, &points(4)).unwrap();
        assert_eq!(face.len(), 1 + 4 + 4 + 4 + 16 * 4);
    }
}
