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

//! Exact per-record filtering of decoded batches.
//!
//! Partition and row-group pruning only ever over-select. This is the stage that makes
//! the output exact: every record is tested against the query and non-matching records
//! are dropped before a batch reaches a sink.
//!
//! A record's envelope is computed from its WKB `geometry`. When the geometry is
//! missing, null, empty or undecodable, the per-row `bbox` struct is used instead.
//! A record with neither is dropped by a spatial predicate.

use crate::error::Result;
use crate::geo::{BoundingBox, Geometry};
use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BinaryViewArray, BooleanArray, Float64Array,
    LargeBinaryArray, Scalar, StringArray, StructArray,
};
use arrow::compute::kernels::cmp::eq;
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::{DataType, Float64Type};
use arrow::record_batch::RecordBatch;

/// Name of the WKB geometry column
pub const GEOMETRY_COLUMN: &str = "geometry";
/// Name of the per-row bbox struct column
pub const BBOX_COLUMN: &str = "bbox";
/// Name of the GERS identifier column
pub const ID_COLUMN: &str = "id";

/// What a record must satisfy to be kept.
#[derive(Debug, Clone, PartialEq)]
pub enum RowPredicate {
    /// Envelope intersects the box (closed intervals, antimeridian aware)
    Intersects(BoundingBox),
    /// `id` column equals the value
    IdEquals(String),
    /// Keep every record
    All,
}

enum WkbColumn<'a> {
    Binary(&'a BinaryArray),
    Large(&'a LargeBinaryArray),
    View(&'a BinaryViewArray),
}

impl<'a> WkbColumn<'a> {
    fn of(array: &'a ArrayRef) -> Option<Self> {
        match array.data_type() {
            DataType::Binary => Some(WkbColumn::Binary(array.as_binary::<i32>())),
            DataType::LargeBinary => Some(WkbColumn::Large(array.as_binary::<i64>())),
            DataType::BinaryView => Some(WkbColumn::View(array.as_binary_view())),
            _ => None,
        }
    }

    fn value(&self, row: usize) -> Option<&'a [u8]> {
        match self {
            WkbColumn::Binary(a) => a.is_valid(row).then(|| a.value(row)),
            WkbColumn::Large(a) => a.is_valid(row).then(|| a.value(row)),
            WkbColumn::View(a) => a.is_valid(row).then(|| a.value(row)),
        }
    }
}

/// `bbox` struct leaves cast to f64
struct BboxColumn {
    validity: StructArray,
    xmin: Float64Array,
    ymin: Float64Array,
    xmax: Float64Array,
    ymax: Float64Array,
}

impl BboxColumn {
    fn of(array: &ArrayRef) -> Result<Option<Self>> {
        let Some(bbox) = array.as_struct_opt() else {
            return Ok(None);
        };
        let leaf = |name: &str| -> Result<Option<Float64Array>> {
            match bbox.column_by_name(name) {
                Some(col) => Ok(Some(
                    cast(col, &DataType::Float64)?
                        .as_primitive::<Float64Type>()
                        .clone(),
                )),
                None => Ok(None),
            }
        };
        match (leaf("xmin")?, leaf("ymin")?, leaf("xmax")?, leaf("ymax")?) {
            (Some(xmin), Some(ymin), Some(xmax), Some(ymax)) => Ok(Some(Self {
                validity: bbox.clone(),
                xmin,
                ymin,
                xmax,
                ymax,
            })),
            _ => Ok(None),
        }
    }

    fn envelope(&self, row: usize) -> Option<BoundingBox> {
        let leaves = [&self.xmin, &self.ymin, &self.xmax, &self.ymax];
        if self.validity.is_null(row) || leaves.iter().any(|a| a.is_null(row)) {
            return None;
        }
        BoundingBox::from_envelope(
            self.xmin.value(row),
            self.ymin.value(row),
            self.xmax.value(row),
            self.ymax.value(row),
        )
    }
}

/// Envelope of every record in `batch`, from geometry first and the `bbox` column second.
pub fn record_envelopes(batch: &RecordBatch) -> Result<Vec<Option<BoundingBox>>> {
    let geometry = batch.column_by_name(GEOMETRY_COLUMN);
    let wkb = geometry.and_then(WkbColumn::of);
    let bbox = match batch.column_by_name(BBOX_COLUMN) {
        Some(col) => BboxColumn::of(col)?,
        None => None,
    };

    Ok((0..batch.num_rows())
        .map(|row| {
            wkb.as_ref()
                .and_then(|w| w.value(row))
                .and_then(|bytes| Geometry::from_wkb(bytes).ok())
                .and_then(|g| g.envelope())
                .or_else(|| bbox.as_ref().and_then(|b| b.envelope(row)))
        })
        .collect())
}

/// Applies a [`RowPredicate`] to decoded batches.
#[derive(Debug, Clone)]
pub struct RowFilter {
    predicate: RowPredicate,
}

impl RowFilter {
    pub fn new(predicate: RowPredicate) -> Self {
        Self { predicate }
    }

    /// Identifier equality when an id is given, otherwise the bbox test, otherwise all.
    pub fn for_query(bbox: Option<BoundingBox>, id: Option<&str>) -> Self {
        let predicate = match (id, bbox) {
            (Some(id), _) => RowPredicate::IdEquals(id.to_string()),
            (None, Some(bbox)) => RowPredicate::Intersects(bbox),
            (None, None) => RowPredicate::All,
        };
        Self::new(predicate)
    }

    pub fn predicate(&self) -> &RowPredicate {
        &self.predicate
    }

    /// Selection mask for `batch`.
    pub fn evaluate(&self, batch: &RecordBatch) -> Result<BooleanArray> {
        match &self.predicate {
            RowPredicate::All => Ok(BooleanArray::from(vec![true; batch.num_rows()])),
            RowPredicate::Intersects(query) => Ok(record_envelopes(batch)?
                .iter()
                .map(|envelope| Some(envelope.is_some_and(|e| query.intersects(&e))))
                .collect()),
            RowPredicate::IdEquals(id) => match batch.column_by_name(ID_COLUMN) {
                Some(col) => {
                    let ids = cast(col, &DataType::Utf8)?;
                    let target = Scalar::new(StringArray::from(vec![id.as_str()]));
                    Ok(eq(&ids, &target)?)
                }
                None => Ok(BooleanArray::from(vec![false; batch.num_rows()])),
            },
        }
    }

    /// Matching records of `batch`, or `None` when nothing matches.
    pub fn apply(&self, batch: &RecordBatch) -> Result<Option<RecordBatch>> {
        if batch.num_rows() == 0 {
            return Ok(None);
        }
        if self.predicate == RowPredicate::All {
            return Ok(Some(batch.clone()));
        }
        let mask = self.evaluate(batch)?;
        let filtered = filter_record_batch(batch, &mask)?;
        Ok((filtered.num_rows() > 0).then_some(filtered))
    }
}
