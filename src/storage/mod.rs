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

//! Access to partitioned parquet data in object storage.
//!
//! [`PartitionStore`] is the seam between the extraction pipeline and the bytes: it
//! lists releases and partitions, reads parquet footers and streams the row groups the
//! pruners kept. [`ObjectStorePartitionStore`] implements it on top of any
//! `object_store::ObjectStore`, which covers S3 in production and `InMemory` in tests.

mod parquet_store;

pub use self::parquet_store::ObjectStorePartitionStore;

use crate::error::Result;
use crate::geo::BoundingBox;
use crate::release::PartitionRoot;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use parquet::arrow::arrow_reader::ArrowReaderMetadata;
use std::fmt;

/// Default number of rows per decoded batch
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Stream of decoded record batches from one partition
pub type BatchStream = BoxStream<'static, Result<RecordBatch>>;

/// One parquet object under a partition root.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Object key relative to the bucket
    pub path: String,
    /// Object size in bytes, when known from a listing
    pub size: Option<u64>,
    /// Spatial extent reported by a catalog
    pub extent: Option<BoundingBox>,
}

impl Partition {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: None,
            extent: None,
        }
    }
}

/// Per row group facts taken from the parquet footer.
#[derive(Debug, Clone, PartialEq)]
pub struct RowGroupSummary {
    pub index: usize,
    pub num_rows: i64,
    /// Envelope built from `bbox.*` column statistics; `None` when unusable
    pub bbox: Option<BoundingBox>,
    /// `(min, max)` of the `id` column
    pub id_range: Option<(String, String)>,
}

/// Footer of one partition: schema and row group summaries.
#[derive(Clone)]
pub struct PartitionStats {
    pub schema: SchemaRef,
    pub row_groups: Vec<RowGroupSummary>,
    /// Decoded footer, reused when reading so it is fetched only once
    pub reader_metadata: Option<ArrowReaderMetadata>,
}

impl PartitionStats {
    pub fn num_rows(&self) -> i64 {
        self.row_groups.iter().map(|rg| rg.num_rows).sum()
    }
}

impl fmt::Debug for PartitionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionStats")
            .field("fields", &self.schema.fields().len())
            .field("row_groups", &self.row_groups)
            .finish()
    }
}

/// Storage collaborator used by every pipeline stage.
#[async_trait]
pub trait PartitionStore: Send + Sync + fmt::Debug {
    /// Version names found directly under `release/`.
    async fn list_releases(&self) -> Result<Vec<String>>;

    /// Every `.parquet` object below `root`, sorted by path.
    async fn list(&self, root: &PartitionRoot) -> Result<Vec<Partition>>;

    /// Read only the footer of `partition`.
    async fn row_group_stats(&self, partition: &Partition) -> Result<PartitionStats>;

    /// Stream the selected row groups, in file order. An empty selection yields nothing.
    async fn read_batches(
        &self,
        partition: &Partition,
        stats: &PartitionStats,
        row_groups: Vec<usize>,
        batch_size: usize,
    ) -> Result<BatchStream>;
}
