// MinIO Rust Library for Overture Maps GeoParquet Extraction
// Copyright 2025 MinIO, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Well-known binary (WKB) geometry decoding.
//!
//! Geometries are stored as ISO WKB in the `geometry` column. Decoding produces a
//! [`Geometry`] which can report its envelope (for the row filter) and render itself
//! as a GeoJSON geometry object (for the GeoJSON sinks). EWKB Z/M/SRID flags are
//! accepted as well; M ordinates are read and discarded.

use crate::geo::BoundingBox;
use serde_json::{Value, json};
use thiserror::Error;

const BIG_ENDIAN: u8 = 0;
const LITTLE_ENDIAN: u8 = 1;

const EWKB_Z_FLAG: u32 = 0x8000_0000;
const EWKB_M_FLAG: u32 = 0x4000_0000;
const EWKB_SRID_FLAG: u32 = 0x2000_0000;
const EWKB_FLAGS: u32 = EWKB_Z_FLAG | EWKB_M_FLAG | EWKB_SRID_FLAG;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WkbError {
    #[error("WKB data is empty")]
    EmptyInput,
    #[error(
        "unexpected end of WKB buffer: expected {expected} bytes at position {position}, but only {remaining} remaining"
    )]
    UnexpectedEndOfBuffer {
        expected: usize,
        remaining: usize,
        position: usize,
    },
    #[error("invalid byte order: {0}")]
    InvalidByteOrder(u8),
    #[error("invalid or unsupported geometry type: {0}")]
    InvalidType(u32),
    #[error("expected {expected} in multi geometry at position {position}")]
    UnexpectedMember {
        expected: &'static str,
        position: usize,
    },
}

/// A single position; `z` is kept when the source carries it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Coord {
    fn to_json(self) -> Value {
        match self.z {
            Some(z) => json!([self.x, self.y, z]),
            None => json!([self.x, self.y]),
        }
    }
}

/// Decoded simple-features geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// `None` is the empty point
    Point(Option<Coord>),
    LineString(Vec<Coord>),
    Polygon(Vec<Vec<Coord>>),
    MultiPoint(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
    GeometryCollection(Vec<Geometry>),
}

impl Geometry {
    /// Decode a complete WKB buffer.
    pub fn from_wkb(buf: &[u8]) -> Result<Self, WkbError> {
        if buf.is_empty() {
            return Err(WkbError::EmptyInput);
        }
        WkbReader::new(buf).read_geometry()
    }

    /// Axis-aligned envelope of every coordinate; `None` for empty geometries.
    pub fn envelope(&self) -> Option<BoundingBox> {
        let mut bounds: Option<(f64, f64, f64, f64)> = None;
        self.for_each_coord(&mut |c| {
            bounds = Some(match bounds {
                None => (c.x, c.y, c.x, c.y),
                Some((min_x, min_y, max_x, max_y)) => {
                    (min_x.min(c.x), min_y.min(c.y), max_x.max(c.x), max_y.max(c.y))
                }
            });
        });
        bounds.and_then(|(min_x, min_y, max_x, max_y)| {
            BoundingBox::from_envelope(min_x, min_y, max_x, max_y)
        })
    }

    /// GeoJSON geometry object (RFC 7946 section 3.1).
    pub fn to_geojson(&self) -> Value {
        fn line(coords: &[Coord]) -> Value {
            Value::Array(coords.iter().map(|c| c.to_json()).collect())
        }
        fn rings(rings: &[Vec<Coord>]) -> Value {
            Value::Array(rings.iter().map(|r| line(r)).collect())
        }

        match self {
            Geometry::Point(Some(c)) => json!({"type": "Point", "coordinates": c.to_json()}),
            Geometry::Point(None) => json!({"type": "Point", "coordinates": []}),
            Geometry::LineString(coords) => {
                json!({"type": "LineString", "coordinates": line(coords)})
            }
            Geometry::Polygon(r) => json!({"type": "Polygon", "coordinates": rings(r)}),
            Geometry::MultiPoint(coords) => {
                json!({"type": "MultiPoint", "coordinates": line(coords)})
            }
            Geometry::MultiLineString(lines) => {
                json!({"type": "MultiLineString", "coordinates": rings(lines)})
            }
            Geometry::MultiPolygon(polygons) => {
                let coordinates: Vec<Value> = polygons.iter().map(|p| rings(p)).collect();
                json!({"type": "MultiPolygon", "coordinates": coordinates})
            }
            Geometry::GeometryCollection(members) => {
                let geometries: Vec<Value> = members.iter().map(|g| g.to_geojson()).collect();
                json!({"type": "GeometryCollection", "geometries": geometries})
            }
        }
    }

    fn for_each_coord(&self, f: &mut impl FnMut(&Coord)) {
        match self {
            Geometry::Point(Some(c)) => f(c),
            Geometry::Point(None) => {}
            Geometry::LineString(coords) | Geometry::MultiPoint(coords) => {
                coords.iter().for_each(f)
            }
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                rings.iter().flatten().for_each(f)
            }
            Geometry::MultiPolygon(polygons) => polygons.iter().flatten().flatten().for_each(f),
            Geometry::GeometryCollection(members) => {
                for member in members {
                    member.for_each_coord(f);
                }
            }
        }
    }
}

/// Decode only the envelope of a WKB buffer.
pub fn wkb_envelope(buf: &[u8]) -> Result<Option<BoundingBox>, WkbError> {
    Geometry::from_wkb(buf).map(|g| g.envelope())
}

#[derive(Debug, Clone, Copy)]
struct Dimensions {
    has_z: bool,
    has_m: bool,
}

struct WkbReader<'a> {
    buf: &'a [u8],
    position: usize,
    little_endian: bool,
}

impl<'a> WkbReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            position: 0,
            little_endian: true,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WkbError> {
        let remaining = self.buf.len().saturating_sub(self.position);
        if remaining < n {
            return Err(WkbError::UnexpectedEndOfBuffer {
                expected: n,
                remaining,
                position: self.position,
            });
        }
        let bytes = &self.buf[self.position..self.position + n];
        self.position += n;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, WkbError> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, WkbError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(if self.little_endian {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        })
    }

    fn read_f64(&mut self) -> Result<f64, WkbError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(if self.little_endian {
            f64::from_le_bytes(raw)
        } else {
            f64::from_be_bytes(raw)
        })
    }

    fn read_coord(&mut self, dims: Dimensions) -> Result<Coord, WkbError> {
        let x = self.read_f64()?;
        let y = self.read_f64()?;
        let z = if dims.has_z {
            Some(self.read_f64()?)
        } else {
            None
        };
        if dims.has_m {
            self.read_f64()?;
        }
        Ok(Coord { x, y, z })
    }

    fn read_coords(&mut self, dims: Dimensions) -> Result<Vec<Coord>, WkbError> {
        let count = self.read_u32()? as usize;
        // Cap the allocation by what the buffer can actually hold.
        let mut coords = Vec::with_capacity(count.min(self.buf.len() / 16));
        for _ in 0..count {
            coords.push(self.read_coord(dims)?);
        }
        Ok(coords)
    }

    fn read_rings(&mut self, dims: Dimensions) -> Result<Vec<Vec<Coord>>, WkbError> {
        let count = self.read_u32()? as usize;
        let mut rings = Vec::with_capacity(count.min(self.buf.len() / 4));
        for _ in 0..count {
            rings.push(self.read_coords(dims)?);
        }
        Ok(rings)
    }

    /// Reads the byte order marker and type code, returning the base type and dimensions.
    fn read_header(&mut self) -> Result<(u32, Dimensions), WkbError> {
        self.little_endian = match self.read_u8()? {
            LITTLE_ENDIAN => true,
            BIG_ENDIAN => false,
            other => return Err(WkbError::InvalidByteOrder(other)),
        };
        let raw = self.read_u32()?;
        let mut has_z = raw & EWKB_Z_FLAG != 0;
        let mut has_m = raw & EWKB_M_FLAG != 0;
        if raw & EWKB_SRID_FLAG != 0 {
            self.read_u32()?;
        }
        let code = raw & !EWKB_FLAGS;
        match code / 1000 {
            0 => {}
            1 => has_z = true,
            2 => has_m = true,
            3 => {
                has_z = true;
                has_m = true;
            }
            _ => return Err(WkbError::InvalidType(raw)),
        }
        Ok((code % 1000, Dimensions { has_z, has_m }))
    }

    fn read_geometry(&mut self) -> Result<Geometry, WkbError> {
        let (kind, dims) = self.read_header()?;
        match kind {
            1 => {
                let c = self.read_coord(dims)?;
                if c.x.is_nan() && c.y.is_nan() {
                    Ok(Geometry::Point(None))
                } else {
                    Ok(Geometry::Point(Some(c)))
                }
            }
            2 => Ok(Geometry::LineString(self.read_coords(dims)?)),
            3 => Ok(Geometry::Polygon(self.read_rings(dims)?)),
            4 => {
                let members = self.read_members()?;
                let mut points = Vec::with_capacity(members.len());
                for member in members {
                    match member {
                        Geometry::Point(Some(c)) => points.push(c),
                        Geometry::Point(None) => {}
                        _ => return Err(self.unexpected("Point")),
                    }
                }
                Ok(Geometry::MultiPoint(points))
            }
            5 => {
                let mut lines = Vec::new();
                for member in self.read_members()? {
                    match member {
                        Geometry::LineString(coords) => lines.push(coords),
                        _ => return Err(self.unexpected("LineString")),
                    }
                }
                Ok(Geometry::MultiLineString(lines))
            }
            6 => {
                let mut polygons = Vec::new();
                for member in self.read_members()? {
                    match member {
                        Geometry::Polygon(rings) => polygons.push(rings),
                        _ => return Err(self.unexpected("Polygon")),
                    }
                }
                Ok(Geometry::MultiPolygon(polygons))
            }
            7 => Ok(Geometry::GeometryCollection(self.read_members()?)),
            other => Err(WkbError::InvalidType(other)),
        }
    }

    fn read_members(&mut self) -> Result<Vec<Geometry>, WkbError> {
        let count = self.read_u32()? as usize;
        let mut members = Vec::with_capacity(count.min(self.buf.len() / 5));
        for _ in 0..count {
            members.push(self.read_geometry()?);
        }
        Ok(members)
    }

    fn unexpected(&self, expected: &'static str) -> WkbError {
        WkbError::UnexpectedMember {
            expected,
            position: self.position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(out: &mut Vec<u8>, little: bool, kind: u32) {
        out.push(if little { LITTLE_ENDIAN } else { BIG_ENDIAN });
        out.extend(if little {
            kind.to_le_bytes()
        } else {
            kind.to_be_bytes()
        });
    }

    fn f64s(out: &mut Vec<u8>, little: bool, values: &[f64]) {
        for v in values {
            out.extend(if little {
                v.to_le_bytes()
            } else {
                v.to_be_bytes()
            });
        }
    }

    fn u32s(out: &mut Vec<u8>, little: bool, v: u32) {
        out.extend(if little {
            v.to_le_bytes()
        } else {
            v.to_be_bytes()
        });
    }

    fn point(little: bool, x: f64, y: f64) -> Vec<u8> {
        let mut out = Vec::new();
        header(&mut out, little, 1);
        f64s(&mut out, little, &[x, y]);
        out
    }

    fn square(little: bool, x: f64, y: f64, size: f64) -> Vec<u8> {
        let mut out = Vec::new();
        header(&mut out, little, 3);
        u32s(&mut out, little, 1);
        u32s(&mut out, little, 5);
        f64s(
            &mut out,
            little,
            &[x, y, x + size, y, x + size, y + size, x, y + size, x, y],
        );
        out
    }

    #[test]
    fn test_point_little_endian() {
        let g = Geometry::from_wkb(&point(true, -71.06, 42.36)).unwrap();
        assert_eq!(
            g,
            Geometry::Point(Some(Coord {
                x: -71.06,
                y: 42.36,
                z: None
            }))
        );
        assert_eq!(g.envelope().unwrap().to_array(), [-71.06, 42.36, -71.06, 42.36]);
        assert_eq!(
            g.to_geojson(),
            json!({"type": "Point", "coordinates": [-71.06, 42.36]})
        );
    }

    #[test]
    fn test_polygon_big_endian() {
        let g = Geometry::from_wkb(&square(false, 1.0, 2.0, 0.5)).unwrap();
        assert_eq!(g.envelope().unwrap().to_array(), [1.0, 2.0, 1.5, 2.5]);
        let geojson = g.to_geojson();
        assert_eq!(geojson["type"], "Polygon");
        assert_eq!(geojson["coordinates"][0].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_multipolygon_mixed_byte_order() {
        let mut out = Vec::new();
        header(&mut out, true, 6);
        u32s(&mut out, true, 2);
        out.extend(square(false, 0.0, 0.0, 1.0));
        out.extend(square(true, 10.0, 10.0, 1.0));
        let g = Geometry::from_wkb(&out).unwrap();
        assert!(matches!(&g, Geometry::MultiPolygon(p) if p.len() == 2));
        assert_eq!(g.envelope().unwrap().to_array(), [0.0, 0.0, 11.0, 11.0]);
    }

    #[test]
    fn test_iso_point_z() {
        let mut out = Vec::new();
        header(&mut out, true, 1001);
        f64s(&mut out, true, &[1.0, 2.0, 3.0]);
        let g = Geometry::from_wkb(&out).unwrap();
        assert_eq!(g.to_geojson()["coordinates"], json!([1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_ewkb_srid_and_m() {
        let mut out = Vec::new();
        header(&mut out, true, 1 | EWKB_SRID_FLAG | EWKB_M_FLAG);
        u32s(&mut out, true, 4326);
        f64s(&mut out, true, &[5.0, 6.0, 99.0]);
        let g = Geometry::from_wkb(&out).unwrap();
        assert_eq!(
            g,
            Geometry::Point(Some(Coord {
                x: 5.0,
                y: 6.0,
                z: None
            }))
        );
    }

    #[test]
    fn test_empty_point_has_no_envelope() {
        let g = Geometry::from_wkb(&point(true, f64::NAN, f64::NAN)).unwrap();
        assert_eq!(g, Geometry::Point(None));
        assert!(g.envelope().is_none());
    }

    #[test]
    fn test_truncated_buffer() {
        let mut buf = square(true, 0.0, 0.0, 1.0);
        buf.truncate(buf.len() - 3);
        assert!(matches!(
            Geometry::from_wkb(&buf),
            Err(WkbError::UnexpectedEndOfBuffer { .. })
        ));
    }

    #[test]
    fn test_invalid_byte_order_and_type() {
        assert_eq!(Geometry::from_wkb(&[]), Err(WkbError::EmptyInput));
        assert_eq!(
            Geometry::from_wkb(&[7, 1, 0, 0, 0]),
            Err(WkbError::InvalidByteOrder(7))
        );
        let mut out = Vec::new();
        header(&mut out, true, 42);
        assert_eq!(Geometry::from_wkb(&out), Err(WkbError::InvalidType(42)));
    }

    #[test]
    fn test_multipoint_rejects_polygon_member() {
        let mut out = Vec::new();
        header(&mut out, true, 4);
        u32s(&mut out, true, 1);
        out.extend(square(true, 0.0, 0.0, 1.0));
        assert!(matches!(
            Geometry::from_wkb(&out),
            Err(WkbError::UnexpectedMember {
                expected: "Point",
                ..
            })
        ));
    }
}
