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

//! Longitude/latitude bounding boxes.
//!
//! A [`BoundingBox`] whose `west` edge is greater than its `east` edge crosses the
//! antimeridian. Every intersection test splits such a box into two non-wrapping
//! longitude ranges, so callers never need to special-case it.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

const MIN_LONGITUDE: f64 = -180.0;
const MAX_LONGITUDE: f64 = 180.0;
const MIN_LATITUDE: f64 = -90.0;
const MAX_LATITUDE: f64 = 90.0;

/// Axis-aligned box in degrees, ordered `(west, south, east, north)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    west: f64,
    south: f64,
    east: f64,
    north: f64,
}

impl BoundingBox {
    /// Create a validated bounding box.
    ///
    /// Longitudes must lie in `[-180, 180]`, latitudes in `[-90, 90]` and
    /// `south <= north`. `west > east` is accepted and denotes an antimeridian crossing.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self> {
        for v in [west, south, east, north] {
            if !v.is_finite() {
                return Err(Error::InvalidBbox(format!(
                    "coordinates must be finite, got {west},{south},{east},{north}"
                )));
            }
        }
        for lon in [west, east] {
            if !(MIN_LONGITUDE..=MAX_LONGITUDE).contains(&lon) {
                return Err(Error::InvalidBbox(format!(
                    "longitude {lon} is outside [{MIN_LONGITUDE}, {MAX_LONGITUDE}]"
                )));
            }
        }
        for lat in [south, north] {
            if !(MIN_LATITUDE..=MAX_LATITUDE).contains(&lat) {
                return Err(Error::InvalidBbox(format!(
                    "latitude {lat} is outside [{MIN_LATITUDE}, {MAX_LATITUDE}]"
                )));
            }
        }
        if south > north {
            return Err(Error::InvalidBbox(format!(
                "south {south} is greater than north {north}"
            )));
        }
        Ok(Self {
            west,
            south,
            east,
            north,
        })
    }

    /// Envelope of data coordinates, as found in statistics or computed from geometry.
    ///
    /// Envelopes never wrap; returns `None` when the values are not finite or inverted.
    pub fn from_envelope(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Option<Self> {
        let finite = [min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite());
        if !finite || min_x > max_x || min_y > max_y {
            return None;
        }
        Some(Self {
            west: min_x,
            south: min_y,
            east: max_x,
            north: max_y,
        })
    }

    pub fn west(&self) -> f64 {
        self.west
    }

    pub fn south(&self) -> f64 {
        self.south
    }

    pub fn east(&self) -> f64 {
        self.east
    }

    pub fn north(&self) -> f64 {
        self.north
    }

    /// True when the box crosses the antimeridian.
    pub fn wraps_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// `[west, south, east, north]`, the order used by GeoJSON and GeoParquet metadata.
    pub fn to_array(&self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }

    /// Longitude ranges covered by the box; a wrapping box yields two.
    fn longitude_ranges(&self) -> [Option<(f64, f64)>; 2] {
        if self.wraps_antimeridian() {
            [
                Some((self.west, MAX_LONGITUDE)),
                Some((MIN_LONGITUDE, self.east)),
            ]
        } else {
            [Some((self.west, self.east)), None]
        }
    }

    /// Closed-interval intersection test, antimeridian aware.
    ///
    /// Boxes that only touch along an edge intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        if self.south > other.north || other.south > self.north {
            return false;
        }
        let theirs = other.longitude_ranges();
        self.longitude_ranges().iter().flatten().any(|(a_min, a_max)| {
            theirs
                .iter()
                .flatten()
                .any(|(b_min, b_max)| a_min <= b_max && b_min <= a_max)
        })
    }

    /// Grow this envelope to cover `other`. Only meaningful for non-wrapping envelopes.
    pub fn extend(&mut self, other: &BoundingBox) {
        self.west = self.west.min(other.west);
        self.south = self.south.min(other.south);
        self.east = self.east.max(other.east);
        self.north = self.north.max(other.north);
    }
}

impl FromStr for BoundingBox {
    type Err = Error;

    /// Parses `west,south,east,north`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            Error::InvalidBbox(format!(
                "bbox must be 4 floating point numbers separated by commas. Got '{s}'"
            ))
        };
        let values = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<f64>, _>>()
            .map_err(|_| invalid())?;
        match values.as_slice() {
            [west, south, east, north] => BoundingBox::new(*west, *south, *east, *north),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}
