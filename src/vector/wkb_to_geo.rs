use std::convert::TryFrom;

use crate::errors::{GrassError, Result};
use crate::vector::{Wkb, WkbType};

/// Sequential reader over a geometry buffer.
struct WkbReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    little_endian: bool,
}

impl<'a> WkbReader<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let slice = self.bytes.get(self.pos..end).ok_or_else(|| {
            GrassError::MalformedWkb(format!(
                "unexpected end of buffer at byte {} of {}",
                self.pos,
                self.bytes.len()
            ))
        })?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let raw = self.take::<4>()?;
        Ok(if self.little_endian {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        })
    }

    fn read_f64(&mut self) -> Result<f64> {
        let raw = self.take::<8>()?;
        Ok(if self.little_endian {
            f64::from_le_bytes(raw)
        } else {
            f64::from_be_bytes(raw)
        })
    }

    fn read_coord(&mut self) -> Result<geo_types::Coord<f64>> {
        Ok(geo_types::Coord {
            x: self.read_f64()?,
            y: self.read_f64()?,
        })
    }

    fn read_line_string(&mut self) -> Result<geo_types::LineString<f64>> {
        let n = self.read_u32()? as usize;
        if n > (self.bytes.len() - self.pos) / 16 {
            return Err(GrassError::MalformedWkb(format!(
                "point count {n} exceeds buffer size"
            )));
        }
        let coords = (0..n)
            .map(|_| self.read_coord())
            .collect::<Result<Vec<_>>>()?;
        Ok(geo_types::LineString(coords))
    }
}

impl TryFrom<&Wkb> for geo_types::Geometry<f64> {
    type Error = GrassError;

    fn try_from(wkb: &Wkb) -> Result<geo_types::Geometry<f64>> {
        let mut reader = WkbReader {
            bytes: wkb.as_bytes(),
            pos: 5,
            little_endian: wkb.is_little_endian(),
        };
        let geometry = match wkb.wkb_type()? {
            WkbType::Point => geo_types::Geometry::Point(geo_types::Point(reader.read_coord()?)),
            WkbType::LineString => geo_types::Geometry::LineString(reader.read_line_string()?),
            WkbType::Polygon => {
                let rings = reader.read_u32()? as usize;
                if rings == 0 {
                    return Err(GrassError::MalformedWkb("polygon without rings".to_string()));
                }
                let outer = reader.read_line_string()?;
                let holes = (1..rings)
                    .map(|_| reader.read_line_string())
                    .collect::<Result<Vec<_>>>()?;
                geo_types::Geometry::Polygon(geo_types::Polygon::new(outer, holes))
            }
        };
        if reader.pos != reader.bytes.len() {
            return Err(GrassError::MalformedWkb(format!(
                "{} trailing bytes",
                reader.bytes.len() - reader.pos
            )));
        }
        Ok(geometry)
    }
}

impl TryFrom<Wkb> for geo_types::Geometry<f64> {
    type Error = GrassError;

    fn try_from(wkb: Wkb) -> Result<geo_types::Geometry<f64>> {
        geo_types::Geometry::try_from(&wkb)
    }
}
