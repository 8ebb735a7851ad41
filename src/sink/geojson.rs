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

//! GeoJSON encoders.
//!
//! Each record becomes a compact `Feature`. The WKB `geometry` column is decoded into
//! the feature geometry; every other column except `bbox` becomes a property. Null
//! properties are dropped at the top level only, nested nulls are kept as written.

use super::OutputTarget;
use crate::error::Result;
use crate::geo::Geometry;
use crate::pruning::row_filter::{BBOX_COLUMN, GEOMETRY_COLUMN};
use arrow::array::{Array, AsArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::json::{LineDelimitedWriter, WriterBuilder, writer::LineDelimited};
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;

const COLLECTION_HEADER: &[u8] = b"{\"type\": \"FeatureCollection\", \"features\": [\n";
const COLLECTION_SEPARATOR: &[u8] = b",\n";
const COLLECTION_FOOTER: &[u8] = b"]}";

/// A GeoJSON feature; serializes as `{"type":"Feature","geometry":..,"properties":..}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    pub geometry: Value,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(geometry: Value, properties: Map<String, Value>) -> Self {
        Self {
            kind: "Feature",
            geometry,
            properties,
        }
    }
}

fn geometries(batch: &RecordBatch) -> Result<Vec<Value>> {
    let Some(column) = batch.column_by_name(GEOMETRY_COLUMN) else {
        return Ok(vec![Value::Null; batch.num_rows()]);
    };
    let binary = cast(column, &DataType::Binary)?;
    let binary = binary.as_binary::<i32>();
    (0..binary.len())
        .map(|row| {
            if binary.is_null(row) {
                return Ok(Value::Null);
            }
            Ok(Geometry::from_wkb(binary.value(row))?.to_geojson())
        })
        .collect()
}

fn properties(batch: &RecordBatch) -> Result<Vec<Map<String, Value>>> {
    let keep: Vec<usize> = batch
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| f.name() != GEOMETRY_COLUMN && f.name() != BBOX_COLUMN)
        .map(|(i, _)| i)
        .collect();
    if keep.is_empty() {
        return Ok(vec![Map::new(); batch.num_rows()]);
    }
    let projected = batch.project(&keep)?;

    let mut writer: LineDelimitedWriter<Vec<u8>> = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, LineDelimited>(Vec::new());
    writer.write(&projected)?;
    writer.finish()?;
    let buf = writer.into_inner();

    buf.split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| {
            let mut props: Map<String, Value> = serde_json::from_slice(line)?;
            props.retain(|_, v| !v.is_null());
            Ok(props)
        })
        .collect()
}

/// Convert every record of `batch` into a feature, in row order.
pub fn batch_to_features(batch: &RecordBatch) -> Result<Vec<Feature>> {
    let geometries = geometries(batch)?;
    let properties = properties(batch)?;
    Ok(geometries
        .into_iter()
        .zip(properties)
        .map(|(g, p)| Feature::new(g, p))
        .collect())
}

/// Single FeatureCollection document; features are held until `finish`.
pub struct FeatureCollectionWriter {
    target: OutputTarget,
    features: Vec<Vec<u8>>,
}

impl FeatureCollectionWriter {
    pub fn new(target: OutputTarget) -> Self {
        Self {
            target,
            features: Vec::new(),
        }
    }

    pub fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        for feature in batch_to_features(batch)? {
            self.features.push(serde_json::to_vec(&feature)?);
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<OutputTarget> {
        self.target.write_all(COLLECTION_HEADER)?;
        for (i, feature) in self.features.iter().enumerate() {
            if i > 0 {
                self.target.write_all(COLLECTION_SEPARATOR)?;
            }
            self.target.write_all(feature)?;
        }
        self.target.write_all(COLLECTION_FOOTER)?;
        Ok(self.target)
    }

    pub fn into_target(self) -> OutputTarget {
        self.target
    }
}

/// Newline-delimited features, each flushed as soon as it is encoded.
pub struct FeatureSequenceWriter {
    target: OutputTarget,
}

impl FeatureSequenceWriter {
    pub fn new(target: OutputTarget) -> Self {
        Self { target }
    }

    pub fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        for feature in batch_to_features(batch)? {
            serde_json::to_writer(&mut self.target, &feature)?;
            self.target.write_all(b"\n")?;
            self.target.flush()?;
        }
        Ok(())
    }

    pub fn finish(self) -> Result<OutputTarget> {
        Ok(self.target)
    }

    pub fn into_target(self) -> OutputTarget {
        self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sink::{FeatureSink, OutputFormat, SharedBuffer};
    use arrow::array::{ArrayRef, BinaryArray, Float64Array, Int64Array, StringArray, StructArray};
    use arrow::datatypes::{Field, Fields, Schema};
    use serde_json::json;
    use std::sync::Arc;

    fn point_wkb(x: f64, y: f64) -> Vec<u8> {
        let mut out = vec![1u8];
        out.extend(1u32.to_le_bytes());
        out.extend(x.to_le_bytes());
        out.extend(y.to_le_bytes());
        out
    }

    fn places() -> RecordBatch {
        let bbox_fields = Fields::from(vec![
            Field::new("xmin", DataType::Float64, false),
            Field::new("ymin", DataType::Float64, false),
            Field::new("xmax", DataType::Float64, false),
            Field::new("ymax", DataType::Float64, false),
        ]);
        let names_fields = Fields::from(vec![
            Field::new("primary", DataType::Utf8, true),
            Field::new("common", DataType::Utf8, true),
        ]);
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("geometry", DataType::Binary, true),
            Field::new("bbox", DataType::Struct(bbox_fields.clone()), true),
            Field::new("names", DataType::Struct(names_fields.clone()), true),
            Field::new("level", DataType::Int64, true),
        ]));
        let coords = [(-71.06, 42.36), (-71.05, 42.35)];
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["p1", "p2"])),
                Arc::new(BinaryArray::from_iter_values(
                    coords.iter().map(|(x, y)| point_wkb(*x, *y)),
                )),
                Arc::new(StructArray::new(
                    bbox_fields,
                    vec![
                        Arc::new(Float64Array::from(vec![-71.06, -71.05])) as ArrayRef,
                        Arc::new(Float64Array::from(vec![42.36, 42.35])),
                        Arc::new(Float64Array::from(vec![-71.06, -71.05])),
                        Arc::new(Float64Array::from(vec![42.36, 42.35])),
                    ],
                    None,
                )),
                Arc::new(StructArray::new(
                    names_fields,
                    vec![
                        Arc::new(StringArray::from(vec![Some("Cafe"), Some("Deli")])) as ArrayRef,
                        Arc::new(StringArray::from(vec![None::<&str>, None])),
                    ],
                    None,
                )),
                Arc::new(Int64Array::from(vec![Some(1), None])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_feature_shape() {
        let features = batch_to_features(&places()).unwrap();
        assert_eq!(features.len(), 2);
        let encoded = serde_json::to_string(&features[0]).unwrap();
        assert!(encoded.starts_with(r#"{"type":"Feature","geometry":{"type":"Point""#));

        let first: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(first["geometry"]["coordinates"], json!([-71.06, 42.36]));
        assert_eq!(first["properties"]["id"], "p1");
        assert_eq!(first["properties"]["level"], 1);
        assert!(first["properties"].get("bbox").is_none());
        assert!(first["properties"].get("geometry").is_none());
        // nested nulls survive
        assert_eq!(first["properties"]["names"]["common"], Value::Null);

        let second = serde_json::to_value(&features[1]).unwrap();
        assert!(second["properties"].get("level").is_none());
    }

    #[test]
    fn test_sequence_output() {
        let buffer = SharedBuffer::new();
        let mut sink =
            FeatureSink::open(OutputFormat::GeoJsonSeq, OutputTarget::from_writer(buffer.clone()));
        sink.write_batch(&places()).unwrap();
        // features are visible before close
        assert_eq!(buffer.to_string_lossy().lines().count(), 2);
        sink.close().unwrap();
        for line in buffer.to_string_lossy().lines() {
            let feature: Value = serde_json::from_str(line).unwrap();
            assert_eq!(feature["type"], "Feature");
        }
    }

    #[test]
    fn test_collection_output() {
        let buffer = SharedBuffer::new();
        let mut sink =
            FeatureSink::open(OutputFormat::GeoJson, OutputTarget::from_writer(buffer.clone()));
        sink.write_batch(&places()).unwrap();
        sink.write_batch(&places()).unwrap();
        assert!(buffer.contents().is_empty());
        let summary = sink.close().unwrap();
        assert_eq!(summary.rows, 4);

        let text = buffer.to_string_lossy();
        assert!(text.starts_with("{\"type\": \"FeatureCollection\", \"features\": [\n"));
        assert!(text.ends_with("]}"));
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["features"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_empty_collection_is_valid() {
        let buffer = SharedBuffer::new();
        let mut sink =
            FeatureSink::open(OutputFormat::GeoJson, OutputTarget::from_writer(buffer.clone()));
        sink.close().unwrap();
        let doc: Value = serde_json::from_str(&buffer.to_string_lossy()).unwrap();
        assert_eq!(doc, json!({"type": "FeatureCollection", "features": []}));
    }

    #[test]
    fn test_undecodable_geometry_fails() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "geometry",
            DataType::Binary,
            true,
        )]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(BinaryArray::from_iter_values([vec![7u8, 1, 2]]))],
        )
        .unwrap();
        assert!(matches!(batch_to_features(&batch), Err(Error::Wkb(_))));
    }

    #[test]
    fn test_geometry_only_batch_has_empty_properties() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "geometry",
            DataType::Binary,
            true,
        )]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(BinaryArray::from(vec![
                Some(point_wkb(1.0, 2.0).as_slice()),
                None,
            ]))],
        )
        .unwrap();
        let features = batch_to_features(&batch).unwrap();
        assert!(features[0].properties.is_empty());
        assert_eq!(features[1].geometry, Value::Null);
    }
}
