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

//! GeoParquet encoder.
//!
//! Source batches are written unchanged except for the `geometry` field, which is
//! tagged with the `geoarrow.wkb` extension. The file level `geo` metadata records the
//! WKB encoding and the extent of everything written, so it can only be produced on
//! close.

use super::OutputTarget;
use crate::error::{Error, Result};
use crate::geo::BoundingBox;
use crate::pruning::row_filter::{GEOMETRY_COLUMN, record_envelopes};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use serde_json::json;
use std::sync::Arc;

const GEO_METADATA_KEY: &str = "geo";
const GEOPARQUET_VERSION: &str = "1.1.0";
const EXTENSION_NAME_KEY: &str = "ARROW:extension:name";
const WKB_EXTENSION: &str = "geoarrow.wkb";

/// `schema` with the geometry field tagged as `geoarrow.wkb`.
pub fn geoarrow_schema(schema: &SchemaRef) -> SchemaRef {
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|f| {
            if f.name() != GEOMETRY_COLUMN {
                return f.as_ref().clone();
            }
            let mut metadata = f.metadata().clone();
            metadata.insert(EXTENSION_NAME_KEY.to_string(), WKB_EXTENSION.to_string());
            f.as_ref().clone().with_metadata(metadata)
        })
        .collect();
    Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()))
}

fn geo_metadata(extent: Option<&BoundingBox>, has_geometry: bool) -> Result<String> {
    let mut column = json!({
        "encoding": "WKB",
        "geometry_types": [],
    });
    if let Some(extent) = extent {
        column["bbox"] = json!(extent.to_array());
    }
    let columns = if has_geometry {
        json!({ GEOMETRY_COLUMN: column })
    } else {
        json!({})
    };
    Ok(serde_json::to_string(&json!({
        "version": GEOPARQUET_VERSION,
        "primary_column": GEOMETRY_COLUMN,
        "columns": columns,
    }))?)
}

/// Schema of an output that saw no source partition at all.
fn fallback_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(GEOMETRY_COLUMN, DataType::Binary, true),
    ]))
}

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build()
}

/// Streams batches into a GeoParquet file; every batch becomes its own row group.
pub struct GeoParquetWriter {
    target: Option<OutputTarget>,
    writer: Option<ArrowWriter<OutputTarget>>,
    schema: Option<SchemaRef>,
    extent: Option<BoundingBox>,
}

impl GeoParquetWriter {
    pub fn new(target: OutputTarget) -> Self {
        Self {
            target: Some(target),
            writer: None,
            schema: None,
            extent: None,
        }
    }

    fn writer(&mut self, schema: &SchemaRef) -> Result<&mut ArrowWriter<OutputTarget>> {
        if self.writer.is_none() {
            let schema = geoarrow_schema(schema);
            let target = self.target.take().ok_or_else(|| {
                Error::SinkState("GeoParquet target already consumed".to_string())
            })?;
            self.writer = Some(ArrowWriter::try_new(
                target,
                schema.clone(),
                Some(writer_properties()),
            )?);
            self.schema = Some(schema);
        }
        self.writer.as_mut().ok_or_else(|| {
            Error::SinkState("GeoParquet writer unavailable".to_string())
        })
    }

    pub fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        for envelope in record_envelopes(batch)?.into_iter().flatten() {
            match &mut self.extent {
                Some(extent) => extent.extend(&envelope),
                None => self.extent = Some(envelope),
            }
        }
        self.writer(&batch.schema())?;
        let (Some(schema), Some(writer)) = (self.schema.clone(), self.writer.as_mut()) else {
            return Err(Error::SinkState("GeoParquet writer unavailable".to_string()));
        };
        let tagged = RecordBatch::try_new(schema, batch.columns().to_vec())?;
        writer.write(&tagged)?;
        // one row group per source batch, handed to the target right away
        writer.flush()?;
        Ok(())
    }

    /// Write the footer. With no batches the file still carries `schema`.
    pub fn finish(
        mut self,
        schema: Option<SchemaRef>,
    ) -> Result<(OutputTarget, Option<BoundingBox>)> {
        if self.writer.is_none() {
            let schema = schema.unwrap_or_else(fallback_schema);
            self.writer(&schema)?;
        }
        let has_geometry = self
            .schema
            .as_ref()
            .is_some_and(|s| s.field_with_name(GEOMETRY_COLUMN).is_ok());
        let metadata = geo_metadata(self.extent.as_ref(), has_geometry)?;
        let mut writer = self.writer.take().ok_or_else(|| {
            Error::SinkState("GeoParquet writer unavailable".to_string())
        })?;
        writer.append_key_value_metadata(KeyValue::new(GEO_METADATA_KEY.to_string(), metadata));
        let target = writer.into_inner()?;
        log::debug!("geoparquet extent: {:?}", self.extent);
        Ok((target, self.extent))
    }

    /// Recover the target without a valid footer, for discarding.
    pub fn into_target(self) -> Option<OutputTarget> {
        match self.writer {
            Some(writer) => writer.into_inner().ok(),
            None => self.target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{FeatureSink, OutputFormat, SharedBuffer};
    use arrow::array::{BinaryArray, StringArray};
    use bytes::Bytes;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use serde_json::Value;

    fn point_wkb(x: f64, y: f64) -> Vec<u8> {
        let mut out = vec![1u8];
        out.extend(1u32.to_le_bytes());
        out.extend(x.to_le_bytes());
        out.extend(y.to_le_bytes());
        out
    }

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("geometry", DataType::Binary, true),
        ]))
    }

    fn batch(points: &[(&str, f64, f64)]) -> RecordBatch {
        RecordBatch::try_new(
            schema(),
            vec![
                Arc::new(StringArray::from_iter_values(points.iter().map(|p| p.0))),
                Arc::new(BinaryArray::from_iter_values(
                    points.iter().map(|p| point_wkb(p.1, p.2)),
                )),
            ],
        )
        .unwrap()
    }

    fn geo_of(buffer: &SharedBuffer) -> (usize, Value) {
        let reader =
            ParquetRecordBatchReaderBuilder::try_new(Bytes::from(buffer.contents())).unwrap();
        let geo = reader
            .metadata()
            .file_metadata()
            .key_value_metadata()
            .and_then(|kv| kv.iter().find(|kv| kv.key == "geo").cloned())
            .and_then(|kv| kv.value)
            .unwrap();
        let rows = reader
            .build()
            .unwrap()
            .map(|b| b.unwrap().num_rows())
            .sum();
        (rows, serde_json::from_str(&geo).unwrap())
    }

    #[test]
    fn test_geo_metadata_and_extent() {
        let buffer = SharedBuffer::new();
        let mut sink =
            FeatureSink::open(OutputFormat::GeoParquet, OutputTarget::from_writer(buffer.clone()));
        sink.write_batch(&batch(&[("a", -71.1, 42.3), ("b", -71.0, 42.4)]))
            .unwrap();
        sink.write_batch(&batch(&[("c", -70.9, 42.35)])).unwrap();
        let summary = sink.close().unwrap();
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.extent.unwrap().to_array(), [-71.1, 42.3, -70.9, 42.4]);

        let (rows, geo) = geo_of(&buffer);
        assert_eq!(rows, 3);
        assert_eq!(geo["version"], "1.1.0");
        assert_eq!(geo["primary_column"], "geometry");
        assert_eq!(geo["columns"]["geometry"]["encoding"], "WKB");
        assert_eq!(
            geo["columns"]["geometry"]["bbox"],
            serde_json::json!([-71.1, 42.3, -70.9, 42.4])
        );
    }

    #[test]
    fn test_batches_are_written_as_they_arrive() {
        let buffer = SharedBuffer::new();
        let mut sink =
            FeatureSink::open(OutputFormat::GeoParquet, OutputTarget::from_writer(buffer.clone()));
        for b in 0..3 {
            let ids: Vec<String> = (0..2000).map(|i| format!("08b2a1{b}{i:05}")).collect();
            let points: Vec<(&str, f64, f64)> = ids
                .iter()
                .enumerate()
                .map(|(i, id)| {
                    let t = (b * 2000 + i) as f64;
                    (id.as_str(), -71.0 + t * 1.37e-5, 42.0 + t * 0.91e-5)
                })
                .collect();
            sink.write_batch(&batch(&points)).unwrap();
        }
        assert!(!buffer.contents().is_empty());
        sink.close().unwrap();

        let reader =
            ParquetRecordBatchReaderBuilder::try_new(Bytes::from(buffer.contents())).unwrap();
        assert_eq!(reader.metadata().num_row_groups(), 3);
        assert_eq!(geo_of(&buffer).0, 6000);
    }

    #[test]
    fn test_empty_file_keeps_declared_schema() {
        let buffer = SharedBuffer::new();
        let mut sink =
            FeatureSink::open(OutputFormat::GeoParquet, OutputTarget::from_writer(buffer.clone()));
        sink.declare_schema(schema()).unwrap();
        let summary = sink.close().unwrap();
        assert_eq!(summary.rows, 0);
        assert!(summary.extent.is_none());

        let (rows, geo) = geo_of(&buffer);
        assert_eq!(rows, 0);
        assert!(geo["columns"]["geometry"].get("bbox").is_none());

        let reader =
            ParquetRecordBatchReaderBuilder::try_new(Bytes::from(buffer.contents())).unwrap();
        let field = reader.schema().field_with_name("geometry").unwrap().clone();
        assert_eq!(
            field.metadata().get("ARROW:extension:name").map(String::as_str),
            Some("geoarrow.wkb")
        );
    }
}
