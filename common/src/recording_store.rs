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

//! Instrumented and failing collaborators.

use async_trait::async_trait;
use overturemaps::catalog::{CatalogError, PartitionCatalog};
use overturemaps::error::{Error, Result};
use overturemaps::geo::BoundingBox;
use overturemaps::release::{PartitionRoot, Release};
use overturemaps::storage::{BatchStream, Partition, PartitionStats, PartitionStore};
use std::sync::{Arc, Mutex};

/// Delegating store that remembers which footers and row groups were read.
#[derive(Debug)]
pub struct RecordingStore {
    inner: Arc<dyn PartitionStore>,
    footers: Mutex<Vec<String>>,
    reads: Mutex<Vec<(String, Vec<usize>)>>,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn PartitionStore>) -> Self {
        Self {
            inner,
            footers: Mutex::new(Vec::new()),
            reads: Mutex::new(Vec::new()),
        }
    }

    /// Partitions whose footer was fetched, in order.
    pub fn footers(&self) -> Vec<String> {
        self.footers.lock().unwrap().clone()
    }

    /// `(partition, row groups)` of every non-empty read, in order.
    pub fn reads(&self) -> Vec<(String, Vec<usize>)> {
        self.reads.lock().unwrap().clone()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.footers.lock().unwrap().clear();
        self.reads.lock().unwrap().clear();
    }
}

#[async_trait]
impl PartitionStore for RecordingStore {
    async fn list_releases(&self) -> Result<Vec<String>> {
        self.inner.list_releases().await
    }

    async fn list(&self, root: &PartitionRoot) -> Result<Vec<Partition>> {
        self.inner.list(root).await
    }

    async fn row_group_stats(&self, partition: &Partition) -> Result<PartitionStats> {
        self.footers.lock().unwrap().push(partition.path.clone());
        self.inner.row_group_stats(partition).await
    }

    async fn read_batches(
        &self,
        partition: &Partition,
        stats: &PartitionStats,
        row_groups: Vec<usize>,
        batch_size: usize,
    ) -> Result<BatchStream> {
        if !row_groups.is_empty() {
            self.reads
                .lock()
                .unwrap()
                .push((partition.path.clone(), row_groups.clone()));
        }
        self.inner
            .read_batches(partition, stats, row_groups, batch_size)
            .await
    }
}

fn outage() -> Error {
    Error::Storage(object_store::Error::Generic {
        store: "fixture",
        source: "simulated outage".into(),
    })
}

/// Store whose every call fails.
#[derive(Debug, Default)]
pub struct BrokenStore;

#[async_trait]
impl PartitionStore for BrokenStore {
    async fn list_releases(&self) -> Result<Vec<String>> {
        Err(outage())
    }

    async fn list(&self, _: &PartitionRoot) -> Result<Vec<Partition>> {
        Err(outage())
    }

    async fn row_group_stats(&self, _: &Partition) -> Result<PartitionStats> {
        Err(outage())
    }

    async fn read_batches(
        &self,
        _: &Partition,
        _: &PartitionStats,
        _: Vec<usize>,
        _: usize,
    ) -> Result<BatchStream> {
        Err(outage())
    }
}

/// Store that lists and reads footers normally but fails once data is requested.
#[derive(Debug)]
pub struct ReadFailingStore {
    inner: Arc<dyn PartitionStore>,
}

impl ReadFailingStore {
    pub fn new(inner: Arc<dyn PartitionStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl PartitionStore for ReadFailingStore {
    async fn list_releases(&self) -> Result<Vec<String>> {
        self.inner.list_releases().await
    }

    async fn list(&self, root: &PartitionRoot) -> Result<Vec<Partition>> {
        self.inner.list(root).await
    }

    async fn row_group_stats(&self, partition: &Partition) -> Result<PartitionStats> {
        self.inner.row_group_stats(partition).await
    }

    async fn read_batches(
        &self,
        _: &Partition,
        _: &PartitionStats,
        _: Vec<usize>,
        _: usize,
    ) -> Result<BatchStream> {
        Err(outage())
    }
}

/// Catalog that is always down.
#[derive(Debug, Default)]
pub struct FailingCatalog;

#[async_trait]
impl PartitionCatalog for FailingCatalog {
    async fn query(
        &self,
        _: &Release,
        _: &[PartitionRoot],
        _: &BoundingBox,
    ) -> std::result::Result<Vec<Partition>, CatalogError> {
        Err(CatalogError::Unavailable("simulated outage".to_string()))
    }
}
