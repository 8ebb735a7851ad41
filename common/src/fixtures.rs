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

//! Builders for Overture-shaped records and parquet files.

use arrow::array::{ArrayRef, BinaryArray, Float64Array, StringArray, StructArray};
use arrow::datatypes::{DataType, Field, Fields, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use overturemaps::geo::BoundingBox;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use std::sync::Arc;

const WKB_POINT: u32 = 1;
const WKB_POLYGON: u32 = 3;

pub fn point_wkb(x: f64, y: f64) -> Vec<u8> {
    let mut out = vec![1u8];
    out.extend(WKB_POINT.to_le_bytes());
    out.extend(x.to_le_bytes());
    out.extend(y.to_le_bytes());
    out
}

/// Single-ring polygon; the ring is closed if it is not already.
pub fn polygon_wkb(ring: &[(f64, f64)]) -> Vec<u8> {
    let mut ring = ring.to_vec();
    if ring.first() != ring.last() {
        ring.push(ring[0]);
    }
    let mut out = vec![1u8];
    out.extend(WKB_POLYGON.to_le_bytes());
    out.extend(1u32.to_le_bytes());
    out.extend((ring.len() as u32).to_le_bytes());
    for (x, y) in ring {
        out.extend(x.to_le_bytes());
        out.extend(y.to_le_bytes());
    }
    out
}

/// One record of the fixture dataset.
#[derive(Debug, Clone)]
pub struct FixtureFeature {
    pub id: String,
    pub wkb: Vec<u8>,
    /// `[xmin, ymin, xmax, ymax]`
    pub bbox: [f64; 4],
    pub name: Option<String>,
    pub height: Option<f64>,
}

impl FixtureFeature {
    pub fn point(id: &str, x: f64, y: f64, name: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            wkb: point_wkb(x, y),
            bbox: [x, y, x, y],
            name: name.map(str::to_string),
            height: None,
        }
    }

    /// Axis-aligned square footprint centred on `(x, y)`.
    pub fn square(id: &str, x: f64, y: f64, half: f64, height: Option<f64>) -> Self {
        let (w, s, e, n) = (x - half, y - half, x + half, y + half);
        Self {
            id: id.to_string(),
            wkb: polygon_wkb(&[(w, s), (e, s), (e, n), (w, n)]),
            bbox: [w, s, e, n],
            name: None,
            height,
        }
    }

    pub fn envelope(&self) -> BoundingBox {
        let [w, s, e, n] = self.bbox;
        BoundingBox::from_envelope(w, s, e, n).unwrap()
    }
}

/// Union of the feature envelopes.
pub fn extent_of(features: &[FixtureFeature]) -> Option<BoundingBox> {
    features.iter().map(FixtureFeature::envelope).reduce(|mut a, b| {
        a.extend(&b);
        a
    })
}

fn bbox_fields() -> Fields {
    Fields::from(vec![
        Field::new("xmin", DataType::Float64, false),
        Field::new("ymin", DataType::Float64, false),
        Field::new("xmax", DataType::Float64, false),
        Field::new("ymax", DataType::Float64, false),
    ])
}

fn bbox_array(boxes: &[[f64; 4]]) -> StructArray {
    let leaf = |i: usize| -> ArrayRef {
        Arc::new(Float64Array::from_iter_values(boxes.iter().map(|b| b[i])))
    };
    StructArray::new(bbox_fields(), vec![leaf(0), leaf(1), leaf(2), leaf(3)], None)
}

pub fn feature_schema() -> SchemaRef {
    let names = Fields::from(vec![Field::new("primary", DataType::Utf8, true)]);
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("geometry", DataType::Binary, true),
        Field::new("bbox", DataType::Struct(bbox_fields()), false),
        Field::new("names", DataType::Struct(names), true),
        Field::new("height", DataType::Float64, true),
    ]))
}

pub fn feature_batch(features: &[FixtureFeature]) -> RecordBatch {
    let names_fields = Fields::from(vec![Field::new("primary", DataType::Utf8, true)]);
    let primary: ArrayRef = Arc::new(StringArray::from_iter(
        features.iter().map(|f| f.name.as_deref()),
    ));
    let names = StructArray::new(names_fields, vec![primary], None);
    let boxes: Vec<[f64; 4]> = features.iter().map(|f| f.bbox).collect();

    RecordBatch::try_new(
        feature_schema(),
        vec![
            Arc::new(StringArray::from_iter_values(features.iter().map(|f| &f.id))),
            Arc::new(BinaryArray::from_iter_values(features.iter().map(|f| &f.wkb))),
            Arc::new(bbox_array(&boxes)),
            Arc::new(names),
            Arc::new(Float64Array::from_iter(features.iter().map(|f| f.height))),
        ],
    )
    .unwrap()
}

/// Registry rows `(id, path relative to the release, bbox)`, sorted by id.
pub fn registry_batch(entries: &[(String, String, [f64; 4])]) -> RecordBatch {
    let mut entries = entries.to_vec();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("path", DataType::Utf8, false),
        Field::new("bbox", DataType::Struct(bbox_fields()), false),
    ]));
    let boxes: Vec<[f64; 4]> = entries.iter().map(|e| e.2).collect();
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from_iter_values(entries.iter().map(|e| &e.0))),
            Arc::new(StringArray::from_iter_values(entries.iter().map(|e| &e.1))),
            Arc::new(bbox_array(&boxes)),
        ],
    )
    .unwrap()
}

/// Encode `batch` as parquet with chunk statistics and `max_row_group_size` rows per group.
pub fn write_parquet(batch: &RecordBatch, max_row_group_size: usize) -> Bytes {
    let props = WriterProperties::builder()
        .set_max_row_group_size(max_row_group_size)
        .set_statistics_enabled(EnabledStatistics::Chunk)
        .build();
    let mut writer = ArrowWriter::try_new(Vec::new(), batch.schema(), Some(props)).unwrap();
    writer.write(batch).unwrap();
    Bytes::from(writer.into_inner().unwrap())
}
