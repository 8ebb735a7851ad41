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

//! Partition pruning for spatial queries.
//!
//! This module decides which parquet files of a release have to be opened at all.
//!
//! # Architecture
//!
//! Partition pruning works by:
//! 1. Asking the spatial catalog for the files whose extent intersects the query box
//! 2. Keeping only catalog hits under the requested partition roots
//! 3. Falling back to listing every file under the roots when the catalog is disabled,
//!    not configured, not applicable (no bbox) or fails
//!
//! Both paths produce the same order: roots in the order given, files sorted by path
//! within a root. Pruning can therefore be switched on and off without changing output.

use super::PruningStats;
use crate::catalog::{CatalogError, PartitionCatalog};
use crate::error::{Error, Result};
use crate::geo::BoundingBox;
use crate::release::{PartitionRoot, Release};
use crate::storage::{Partition, PartitionStore};
use std::future::Future;
use std::sync::Arc;

/// Which mechanism produced a partition selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruningSource {
    /// Spatial catalog extents
    Catalog,
    /// Full enumeration of the roots
    Listing,
}

/// Partitions to read, in read order
#[derive(Debug, Clone)]
pub struct PartitionSelection {
    pub partitions: Vec<Partition>,
    pub source: PruningSource,
    pub stats: PruningStats,
}

/// Use `attempt` when it succeeded, otherwise log a warning and run `fallback`.
///
/// Catalog errors never escape this combinator; errors from `fallback` do.
pub async fn or_fallback<T, F, Fut>(
    attempt: std::result::Result<T, CatalogError>,
    fallback: F,
) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match attempt {
        Ok(value) => Ok(value),
        Err(e) => {
            log::warn!("catalog unavailable, listing partitions instead: {e}");
            fallback().await
        }
    }
}

/// Selects the partitions a query must read.
#[derive(Debug, Clone)]
pub struct PartitionPruner {
    store: Arc<dyn PartitionStore>,
    catalog: Option<Arc<dyn PartitionCatalog>>,
}

impl PartitionPruner {
    pub fn new(
        store: Arc<dyn PartitionStore>,
        catalog: Option<Arc<dyn PartitionCatalog>>,
    ) -> Self {
        Self { store, catalog }
    }

    /// Every partition under `roots`, roots in order and paths sorted within a root.
    pub async fn list_all(&self, roots: &[PartitionRoot]) -> Result<Vec<Partition>> {
        let mut partitions = Vec::new();
        for root in roots {
            let mut listed = self.store.list(root).await?;
            listed.sort_by(|a, b| a.path.cmp(&b.path));
            partitions.extend(listed);
        }
        Ok(partitions)
    }

    /// Catalog hits under `roots` whose extent intersects `bbox`, in listing order.
    fn keep_catalog_hits(
        found: Vec<Partition>,
        roots: &[PartitionRoot],
        bbox: &BoundingBox,
    ) -> (Vec<Partition>, PruningStats) {
        let total = found.len();
        let mut kept: Vec<(usize, Partition)> = found
            .into_iter()
            .filter(|p| p.extent.is_none_or(|extent| extent.intersects(bbox)))
            .filter_map(|p| {
                roots
                    .iter()
                    .position(|root| root.contains(&p.path))
                    .map(|i| (i, p))
            })
            .collect();
        kept.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| a.path.cmp(&b.path)));
        kept.dedup_by(|(_, a), (_, b)| a.path == b.path);
        let partitions: Vec<Partition> = kept.into_iter().map(|(_, p)| p).collect();
        let stats = PruningStats::new(total, partitions.len());
        (partitions, stats)
    }

    /// Choose the partitions of `release` under `roots` that may intersect `bbox`.
    pub async fn select(
        &self,
        release: &Release,
        roots: &[PartitionRoot],
        bbox: Option<&BoundingBox>,
        use_catalog: bool,
    ) -> Result<PartitionSelection> {
        let listing = || async {
            let partitions = self.list_all(roots).await?;
            let stats = PruningStats::new(partitions.len(), partitions.len());
            Ok::<_, Error>((partitions, stats, PruningSource::Listing))
        };

        let (partitions, stats, source) = match (use_catalog, &self.catalog, bbox) {
            (true, Some(catalog), Some(bbox)) => {
                let attempt = catalog
                    .query(release, roots, bbox)
                    .await
                    .map(|found| {
                        let (partitions, stats) = Self::keep_catalog_hits(found, roots, bbox);
                        (partitions, stats, PruningSource::Catalog)
                    });
                or_fallback(attempt, listing).await?
            }
            _ => listing().await?,
        };

        log::info!(
            "partition pruning ({source:?}): kept {} of {} partitions ({:.1}% eliminated)",
            stats.retained,
            stats.total,
            stats.elimination_percentage()
        );
        Ok(PartitionSelection {
            partitions,
            source,
            stats,
        })
    }
}
