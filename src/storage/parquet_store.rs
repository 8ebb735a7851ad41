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

//! [`PartitionStore`] over an `object_store::ObjectStore`.
//!
//! Footers are fetched with ranged reads through [`ParquetObjectReader`]; only the row
//! groups selected by the pruners are requested afterwards. Timeouts configured on the
//! client surface as storage errors and are not retried here.

use super::{BatchStream, Partition, PartitionStats, PartitionStore};
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::pruning::summarize_row_groups;
use crate::release::{PartitionRoot, RELEASE_PREFIX};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{ClientOptions, ObjectMeta, ObjectStore};
use parquet::arrow::arrow_reader::{ArrowReaderMetadata, ArrowReaderOptions};
use parquet::arrow::async_reader::{ParquetObjectReader, ParquetRecordBatchStreamBuilder};
use std::sync::Arc;

const PARQUET_SUFFIX: &str = ".parquet";

/// Partition store backed by any object store.
#[derive(Debug, Clone)]
pub struct ObjectStorePartitionStore {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStorePartitionStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// S3 store for the configured bucket. Anonymous access skips request signing.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let mut options = ClientOptions::new();
        if let Some(timeout) = config.connect_timeout {
            options = options.with_connect_timeout(timeout);
        }
        if let Some(timeout) = config.request_timeout {
            options = options.with_timeout(timeout);
        }

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_skip_signature(config.anonymous)
            .with_client_options(options);
        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"))
                .with_virtual_hosted_style_request(false);
        }
        if !config.anonymous {
            builder = Self::with_env_credentials(builder);
        }

        log::debug!(
            "object store: bucket={} region={} endpoint={:?} anonymous={}",
            config.bucket,
            config.region,
            config.endpoint,
            config.anonymous
        );
        Ok(Self::new(Arc::new(builder.build()?)))
    }

    fn with_env_credentials(mut builder: AmazonS3Builder) -> AmazonS3Builder {
        if let Ok(key) = std::env::var("AWS_ACCESS_KEY_ID") {
            builder = builder.with_access_key_id(key);
        }
        if let Ok(secret) = std::env::var("AWS_SECRET_ACCESS_KEY") {
            builder = builder.with_secret_access_key(secret);
        }
        if let Ok(token) = std::env::var("AWS_SESSION_TOKEN") {
            builder = builder.with_token(token);
        }
        builder
    }

    fn reader(&self, partition: &Partition) -> ParquetObjectReader {
        let reader =
            ParquetObjectReader::new(self.store.clone(), Path::from(partition.path.as_str()));
        match partition.size {
            Some(size) => reader.with_file_size(size),
            None => reader,
        }
    }
}

fn to_partition(meta: ObjectMeta) -> Option<Partition> {
    let path = meta.location.to_string();
    path.ends_with(PARQUET_SUFFIX).then(|| Partition {
        path,
        size: Some(meta.size),
        extent: None,
    })
}

#[async_trait]
impl PartitionStore for ObjectStorePartitionStore {
    async fn list_releases(&self) -> Result<Vec<String>> {
        let prefix = Path::from(RELEASE_PREFIX);
        let listing = self.store.list_with_delimiter(Some(&prefix)).await?;
        Ok(listing
            .common_prefixes
            .iter()
            .filter_map(|p| p.filename().map(str::to_string))
            .collect())
    }

    async fn list(&self, root: &PartitionRoot) -> Result<Vec<Partition>> {
        let prefix = Path::from(root.prefix.as_str());
        let objects: Vec<ObjectMeta> = self.store.list(Some(&prefix)).try_collect().await?;
        let mut partitions: Vec<Partition> = objects.into_iter().filter_map(to_partition).collect();
        partitions.sort_by(|a, b| a.path.cmp(&b.path));
        log::debug!("{}: {} partitions listed", root.prefix, partitions.len());
        Ok(partitions)
    }

    async fn row_group_stats(&self, partition: &Partition) -> Result<PartitionStats> {
        let mut reader = self.reader(partition);
        let metadata =
            ArrowReaderMetadata::load_async(&mut reader, ArrowReaderOptions::new()).await?;
        Ok(PartitionStats {
            schema: metadata.schema().clone(),
            row_groups: summarize_row_groups(metadata.metadata()),
            reader_metadata: Some(metadata),
        })
    }

    async fn read_batches(
        &self,
        partition: &Partition,
        stats: &PartitionStats,
        row_groups: Vec<usize>,
        batch_size: usize,
    ) -> Result<BatchStream> {
        if row_groups.is_empty() {
            return Ok(stream::empty().boxed());
        }
        let reader = self.reader(partition);
        let builder = match &stats.reader_metadata {
            Some(metadata) => {
                ParquetRecordBatchStreamBuilder::new_with_metadata(reader, metadata.clone())
            }
            None => ParquetRecordBatchStreamBuilder::new(reader).await?,
        };
        let batches = builder
            .with_row_groups(row_groups)
            .with_batch_size(batch_size)
            .build()?;
        Ok(batches.map_err(Error::from).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use object_store::PutPayload;
    use object_store::memory::InMemory;

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let memory = Arc::new(InMemory::new());
        for key in [
            "release/2025-10-22.0/theme=places/type=place/b.parquet",
            "release/2025-10-22.0/theme=places/type=place/a.parquet",
            "release/2025-10-22.0/theme=places/type=place/_SUCCESS",
            "release/2025-09-24.0/theme=places/type=place/a.parquet",
        ] {
            memory
                .put(&Path::from(key), PutPayload::from(Bytes::from_static(b"x")))
                .await
                .unwrap();
        }
        let store = ObjectStorePartitionStore::new(memory);

        let mut releases = store.list_releases().await.unwrap();
        releases.sort();
        assert_eq!(releases, vec!["2025-09-24.0", "2025-10-22.0"]);

        let root = PartitionRoot {
            theme: "places".into(),
            type_name: "place".into(),
            prefix: "release/2025-10-22.0/theme=places/type=place".into(),
        };
        let partitions = store.list(&root).await.unwrap();
        let paths: Vec<&str> = partitions.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "release/2025-10-22.0/theme=places/type=place/a.parquet",
                "release/2025-10-22.0/theme=places/type=place/b.parquet",
            ]
        );
        assert_eq!(partitions[0].size, Some(1));
    }

    #[tokio::test]
    async fn test_empty_selection_reads_nothing() {
        let store = ObjectStorePartitionStore::new(Arc::new(InMemory::new()));
        let stats = PartitionStats {
            schema: Arc::new(arrow::datatypes::Schema::empty()),
            row_groups: vec![],
            reader_metadata: None,
        };
        let batches: Vec<_> = store
            .read_batches(&Partition::new("missing.parquet"), &stats, vec![], 1024)
            .await
            .unwrap()
            .collect()
            .await;
        assert!(batches.is_empty());
    }
}
