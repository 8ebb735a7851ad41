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

//! STAC item index as a [`PartitionCatalog`].
//!
//! Every release publishes `<stac>/<release>/collections.parquet`, a stac-geoparquet
//! table with one item per data file. The columns used here are:
//!
//! - `collection`: the type name
//! - `bbox`: struct of `xmin`, `ymin`, `xmax`, `ymax`
//! - `assets.aws.alternate.s3.href`: `s3://<bucket>/release/...parquet`
//!
//! The index is downloaded once per release and kept for the lifetime of the catalog.

use super::{CatalogError, PartitionCatalog};
use crate::geo::BoundingBox;
use crate::release::{PartitionRoot, Release};
use crate::storage::Partition;
use arrow::array::{Array, ArrayRef, AsArray, Float64Array};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

const INDEX_FILE: &str = "collections.parquet";
const HREF_PATH: &[&str] = &["assets", "aws", "alternate", "s3", "href"];

/// One data file listed in the index.
#[derive(Debug, Clone, PartialEq)]
pub struct StacItem {
    pub collection: Option<String>,
    /// Object key relative to the bucket
    pub path: String,
    pub bbox: Option<BoundingBox>,
}

/// Catalog backed by the public STAC index.
#[derive(Debug, Clone)]
pub struct StacCatalog {
    client: reqwest::Client,
    base: Url,
    index: Arc<Mutex<HashMap<String, Arc<Vec<StacItem>>>>>,
}

impl StacCatalog {
    pub fn new(client: reqwest::Client, mut base: Url) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self {
            client,
            base,
            index: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// `<stac>/<release>/collections.parquet`
    pub fn index_url(&self, release: &Release) -> Result<Url, CatalogError> {
        Ok(self
            .base
            .join(&format!("{}/{INDEX_FILE}", release.version()))?)
    }

    /// Seed the index of `release` without a download.
    pub async fn preload(&self, release: &Release, items: Vec<StacItem>) {
        self.index
            .lock()
            .await
            .insert(release.version().to_string(), Arc::new(items));
    }

    async fn items(&self, release: &Release) -> Result<Arc<Vec<StacItem>>, CatalogError> {
        let mut index = self.index.lock().await;
        if let Some(items) = index.get(release.version()) {
            return Ok(items.clone());
        }
        let url = self.index_url(release)?;
        log::debug!("fetching catalog index {url}");
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(CatalogError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        let items = Arc::new(parse_index(response.bytes().await?)?);
        log::debug!("catalog index for {release}: {} items", items.len());
        index.insert(release.version().to_string(), items.clone());
        Ok(items)
    }
}

#[async_trait]
impl PartitionCatalog for StacCatalog {
    async fn query(
        &self,
        release: &Release,
        roots: &[PartitionRoot],
        bbox: &BoundingBox,
    ) -> Result<Vec<Partition>, CatalogError> {
        let items = self.items(release).await?;
        Ok(items
            .iter()
            .filter(|item| roots.iter().any(|r| r.contains(&item.path)))
            .filter(|item| item.bbox.is_none_or(|extent| extent.intersects(bbox)))
            .map(|item| Partition {
                path: item.path.clone(),
                size: None,
                extent: item.bbox,
            })
            .collect())
    }
}

/// Object key from an `s3://bucket/key` href.
fn href_to_key(href: &str) -> Option<String> {
    let url = Url::parse(href).ok()?;
    let key = url.path().trim_start_matches('/');
    (!key.is_empty()).then(|| key.to_string())
}

/// Column at a dotted struct path, with every level along the way.
fn nested<'a>(batch: &'a RecordBatch, path: &[&str]) -> Option<Vec<&'a ArrayRef>> {
    let (first, rest) = path.split_first()?;
    let mut current = batch.column_by_name(first)?;
    let mut levels = vec![current];
    for name in rest {
        current = current.as_struct_opt()?.column_by_name(name)?;
        levels.push(current);
    }
    Some(levels)
}

fn valid_at(levels: &[&ArrayRef], row: usize) -> bool {
    levels.iter().all(|a| a.is_valid(row))
}

fn float_leaf(bbox: &ArrayRef, name: &str) -> Result<Option<Float64Array>, CatalogError> {
    let Some(leaf) = bbox.as_struct_opt().and_then(|s| s.column_by_name(name)) else {
        return Ok(None);
    };
    Ok(Some(
        cast(leaf, &DataType::Float64)?
            .as_primitive::<Float64Type>()
            .clone(),
    ))
}

fn items_from_batch(batch: &RecordBatch) -> Result<Vec<StacItem>, CatalogError> {
    let href_levels = nested(batch, HREF_PATH).ok_or_else(|| {
        CatalogError::Malformed(format!("missing column {}", HREF_PATH.join(".")))
    })?;
    let Some(href_column) = href_levels.last() else {
        return Ok(Vec::new());
    };
    let hrefs = cast(*href_column, &DataType::Utf8)?;
    let hrefs = hrefs.as_string::<i32>();

    let collections = match batch.column_by_name("collection") {
        Some(col) => Some(cast(col, &DataType::Utf8)?),
        None => None,
    };
    let collections = collections.as_ref().map(|c| c.as_string::<i32>());

    let bbox = batch.column_by_name("bbox");
    let leaves = match bbox {
        Some(bbox) => match (
            float_leaf(bbox, "xmin")?,
            float_leaf(bbox, "ymin")?,
            float_leaf(bbox, "xmax")?,
            float_leaf(bbox, "ymax")?,
        ) {
            (Some(a), Some(b), Some(c), Some(d)) => Some([a, b, c, d]),
            _ => None,
        },
        None => None,
    };

    let mut items = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        if !valid_at(&href_levels, row) {
            continue;
        }
        let Some(path) = href_to_key(hrefs.value(row)) else {
            log::debug!("skipping catalog item with href {}", hrefs.value(row));
            continue;
        };
        let extent = match (&leaves, bbox) {
            (Some(leaves), Some(bbox))
                if bbox.is_valid(row) && leaves.iter().all(|a| a.is_valid(row)) =>
            {
                let [w, s, e, n] = leaves.each_ref().map(|a| a.value(row));
                // west > east is an antimeridian-crossing extent
                BoundingBox::from_envelope(w, s, e, n)
                    .or_else(|| BoundingBox::new(w, s, e, n).ok())
            }
            _ => None,
        };
        items.push(StacItem {
            collection: collections
                .filter(|c| c.is_valid(row))
                .map(|c| c.value(row).to_string()),
            path,
            bbox: extent,
        });
    }
    Ok(items)
}

/// Decode a `collections.parquet` index.
pub fn parse_index(bytes: Bytes) -> Result<Vec<StacItem>, CatalogError> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)?.build()?;
    let mut items = Vec::new();
    for batch in reader {
        items.extend(items_from_batch(&batch?)?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, StringArray, StructArray};
    use arrow::datatypes::{Field, Fields, Schema};
    use parquet::arrow::ArrowWriter;

    /// Struct array with a single child column `name`
    fn wrap(name: &str, child: ArrayRef) -> ArrayRef {
        let field = Field::new(name, child.data_type().clone(), true);
        Arc::new(StructArray::new(Fields::from(vec![field]), vec![child], None))
    }

    fn index_bytes() -> Bytes {
        let hrefs: ArrayRef = Arc::new(StringArray::from(vec![
            Some("s3://overturemaps-us-west-2/release/2025-10-22.0/theme=buildings/type=building/part-0.parquet"),
            Some("s3://overturemaps-us-west-2/release/2025-10-22.0/theme=places/type=place/part-0.parquet"),
            None,
        ]));
        let assets = wrap("aws", wrap("alternate", wrap("s3", wrap("href", hrefs))));

        let bbox_fields = Fields::from(vec![
            Field::new("xmin", DataType::Float64, true),
            Field::new("ymin", DataType::Float64, true),
            Field::new("xmax", DataType::Float64, true),
            Field::new("ymax", DataType::Float64, true),
        ]);
        let bbox = StructArray::new(
            bbox_fields.clone(),
            vec![
                Arc::new(Float64Array::from(vec![-72.0, 179.0, 0.0])) as ArrayRef,
                Arc::new(Float64Array::from(vec![42.0, -18.0, 0.0])),
                Arc::new(Float64Array::from(vec![-70.0, -179.0, 1.0])),
                Arc::new(Float64Array::from(vec![43.0, -16.0, 1.0])),
            ],
            None,
        );
        let schema = Arc::new(Schema::new(vec![
            Field::new("collection", DataType::Utf8, true),
            Field::new("bbox", DataType::Struct(bbox_fields), true),
            Field::new("assets", assets.data_type().clone(), true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["building", "place", "water"])),
                Arc::new(bbox),
                assets,
            ],
        )
        .unwrap();
        let mut writer = ArrowWriter::try_new(Vec::new(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        Bytes::from(writer.into_inner().unwrap())
    }

    #[test]
    fn test_parse_index() {
        let items = parse_index(index_bytes()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].path,
            "release/2025-10-22.0/theme=buildings/type=building/part-0.parquet"
        );
        assert_eq!(items[0].collection.as_deref(), Some("building"));
        assert_eq!(items[0].bbox.unwrap().to_array(), [-72.0, 42.0, -70.0, 43.0]);
        // inverted longitudes are a wrapping extent
        assert!(items[1].bbox.unwrap().wraps_antimeridian());
    }

    #[test]
    fn test_malformed_index() {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Utf8, false)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(StringArray::from(vec!["a"]))],
        )
        .unwrap();
        let mut writer = ArrowWriter::try_new(Vec::new(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        let bytes = Bytes::from(writer.into_inner().unwrap());
        assert!(matches!(parse_index(bytes), Err(CatalogError::Malformed(_))));
        assert!(parse_index(Bytes::from_static(b"not parquet")).is_err());
    }

    #[tokio::test]
    async fn test_query_filters_roots_and_extent() {
        let catalog = StacCatalog::new(
            reqwest::Client::new(),
            Url::parse("http://127.0.0.1:9/stac").unwrap(),
        );
        let release = Release::pinned("2025-10-22.0").unwrap();
        catalog.preload(&release, parse_index(index_bytes()).unwrap()).await;

        let roots = vec![release.root("buildings", "building")];
        let boston = BoundingBox::new(-71.1, 42.3, -71.0, 42.4).unwrap();
        let hits = catalog.query(&release, &roots, &boston).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].extent.is_some());

        let paris = BoundingBox::new(2.2, 48.8, 2.4, 48.9).unwrap();
        assert!(catalog.query(&release, &roots, &paris).await.unwrap().is_empty());
    }

    #[test]
    fn test_index_url() {
        let catalog = StacCatalog::new(
            reqwest::Client::new(),
            Url::parse("https://stac.overturemaps.org").unwrap(),
        );
        let release = Release::pinned("2025-10-22.0").unwrap();
        assert_eq!(
            catalog.index_url(&release).unwrap().as_str(),
            "https://stac.overturemaps.org/2025-10-22.0/collections.parquet"
        );
    }
}
