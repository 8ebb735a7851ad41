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

//! The extraction pipeline.
//!
//! [`Extractor::download`] drives the stages for a [`StreamingQuery`] and feeds a
//! [`FeatureSink`]; [`Extractor::lookup`] runs the same stages with an identifier
//! predicate and stops at the first match.
//!
//! Work is pulled lazily: partitions are opened in order, footers are read one
//! partition at a time, and row groups are fetched only while the consumer asks for
//! more batches. Dropping the batch stream cancels any read still in flight.

use crate::catalog::{GersRegistry, PartitionCatalog, StacCatalog};
use crate::config::{CatalogConfig, StorageConfig};
use crate::error::{Error, Result};
use crate::geo::BoundingBox;
use crate::pruning::{
    PartitionPruner, PartitionSelection, PruningSource, PruningStats, RowFilter,
    StatisticsPruner,
};
use crate::release::{LogicalType, Release, ReleaseResolver};
use crate::sink::{FeatureSink, OutputFormat};
use crate::storage::{DEFAULT_BATCH_SIZE, ObjectStorePartitionStore, Partition, PartitionStore};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use futures_util::{Stream, TryStreamExt};
use std::sync::Arc;
use typed_builder::TypedBuilder;

pub use crate::release::TypeSelection;

/// One extraction request; immutable once built.
#[derive(Debug, Clone, TypedBuilder)]
pub struct StreamingQuery {
    /// Spatial filter; `None` reads the whole type
    #[builder(default, setter(strip_option))]
    pub bbox: Option<BoundingBox>,
    pub types: TypeSelection,
    /// Pinned release; latest when unset
    #[builder(default, setter(strip_option, into))]
    pub release: Option<String>,
    /// Identifier predicate; takes precedence over `bbox` in the row filter
    #[builder(default, setter(strip_option, into))]
    pub id: Option<String>,
    #[builder(default = OutputFormat::GeoJsonSeq)]
    pub format: OutputFormat,
    #[builder(default = true)]
    pub use_catalog: bool,
    /// Row-group statistics pruning; turning it off must not change the output
    #[builder(default = true)]
    pub use_statistics: bool,
    #[builder(default = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
}

/// Release, type and partitions a query will read.
#[derive(Debug, Clone)]
pub struct ExtractionPlan {
    pub release: Release,
    pub logical_type: LogicalType,
    pub selection: PartitionSelection,
}

/// Outcome of [`Extractor::download`].
#[derive(Debug, Clone)]
pub struct ExtractSummary {
    pub release: Release,
    pub partition_source: PruningSource,
    pub partitions: PruningStats,
    pub row_groups: PruningStats,
    pub rows_written: usize,
    pub extent: Option<BoundingBox>,
}

/// A record found by [`Extractor::lookup`].
#[derive(Debug, Clone)]
pub struct LookupHit {
    pub release: Release,
    /// Partition the record was read from
    pub partition: String,
    /// Single-row batch
    pub record: RecordBatch,
}

enum Scanned {
    Partition {
        path: String,
        schema: SchemaRef,
        row_groups: PruningStats,
    },
    Batch(RecordBatch),
}

/// Runs queries and lookups against one dataset.
#[derive(Debug, Clone)]
pub struct Extractor {
    store: Arc<dyn PartitionStore>,
    catalog: Option<Arc<dyn PartitionCatalog>>,
    registry: Option<GersRegistry>,
}

impl Extractor {
    pub fn new(store: Arc<dyn PartitionStore>) -> Self {
        Self {
            store,
            catalog: None,
            registry: None,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn PartitionCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_registry(mut self, registry: GersRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// S3-backed extractor with the STAC catalog and GERS registry as configured.
    pub fn from_config(storage: &StorageConfig, catalog: &CatalogConfig) -> Result<Self> {
        let store: Arc<dyn PartitionStore> =
            Arc::new(ObjectStorePartitionStore::from_config(storage)?);
        let mut extractor = Self::new(store.clone());
        if catalog.enabled || catalog.registry {
            let client = catalog.http_client()?;
            let base = catalog.stac_base()?;
            if catalog.enabled {
                let stac = StacCatalog::new(client.clone(), base.clone());
                extractor = extractor.with_catalog(Arc::new(stac));
            }
            if catalog.registry {
                extractor = extractor.with_registry(GersRegistry::new(
                    client,
                    &base,
                    store,
                    catalog.registry_prefix.clone(),
                )?);
            }
        }
        Ok(extractor)
    }

    pub fn store(&self) -> &Arc<dyn PartitionStore> {
        &self.store
    }

    /// Available release versions, oldest first.
    pub async fn releases(&self) -> Result<Vec<String>> {
        ReleaseResolver::new(self.store.clone()).available().await
    }

    pub async fn resolve_release(&self, pin: Option<&str>) -> Result<Release> {
        ReleaseResolver::new(self.store.clone()).resolve(pin).await
    }

    /// Resolve the release and type of `query` and choose its partitions.
    pub async fn plan(&self, query: &StreamingQuery) -> Result<ExtractionPlan> {
        let release = self.resolve_release(query.release.as_deref()).await?;
        let logical_type = release.resolve_type(&query.types)?;
        let selection = PartitionPruner::new(self.store.clone(), self.catalog.clone())
            .select(
                &release,
                &logical_type.roots,
                query.bbox.as_ref(),
                query.use_catalog,
            )
            .await?;
        Ok(ExtractionPlan {
            release,
            logical_type,
            selection,
        })
    }

    fn scan<'a>(
        &'a self,
        partitions: &'a [Partition],
        pruner: &'a StatisticsPruner,
        filter: &'a RowFilter,
        batch_size: usize,
    ) -> impl Stream<Item = Result<Scanned>> + 'a {
        async_stream::try_stream! {
            for partition in partitions {
                let stats = self.store.row_group_stats(partition).await?;
                let (selected, row_groups) = pruner.select_row_groups(&stats);
                log::debug!(
                    "{}: reading {} of {} row groups",
                    partition.path,
                    row_groups.retained,
                    row_groups.total
                );
                yield Scanned::Partition {
                    path: partition.path.clone(),
                    schema: stats.schema.clone(),
                    row_groups,
                };

                let mut batches = self
                    .store
                    .read_batches(partition, &stats, selected, batch_size)
                    .await?;
                while let Some(batch) = batches.try_next().await? {
                    if let Some(batch) = filter.apply(&batch)? {
                        yield Scanned::Batch(batch);
                    }
                }
            }
        }
    }

    /// Stream the records matching `query` into `sink` and close it.
    ///
    /// On any error the sink is aborted before the error is returned.
    pub async fn download(
        &self,
        query: &StreamingQuery,
        sink: &mut FeatureSink,
    ) -> Result<ExtractSummary> {
        match self.run(query, sink).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                sink.abort();
                Err(e)
            }
        }
    }

    async fn run(&self, query: &StreamingQuery, sink: &mut FeatureSink) -> Result<ExtractSummary> {
        let plan = self.plan(query).await?;
        let pruner = StatisticsPruner::new(query.bbox, query.id.clone(), query.use_statistics);
        let filter = RowFilter::for_query(query.bbox, query.id.as_deref());

        let mut row_groups = PruningStats::default();
        let mut scanned = Box::pin(self.scan(
            &plan.selection.partitions,
            &pruner,
            &filter,
            query.batch_size,
        ));
        while let Some(item) = scanned.try_next().await? {
            match item {
                Scanned::Partition {
                    schema,
                    row_groups: stats,
                    ..
                } => {
                    sink.declare_schema(schema)?;
                    row_groups.merge(&stats);
                }
                Scanned::Batch(batch) => sink.write_batch(&batch)?,
            }
        }
        drop(scanned);

        log::info!(
            "row group pruning: kept {} of {} row groups ({:.1}% eliminated)",
            row_groups.retained,
            row_groups.total,
            row_groups.elimination_percentage()
        );
        let closed = sink.close()?;
        Ok(ExtractSummary {
            release: plan.release,
            partition_source: plan.selection.source,
            partitions: plan.selection.stats,
            row_groups,
            rows_written: closed.rows,
            extent: closed.extent,
        })
    }

    /// Find the record with identifier `id`.
    ///
    /// The GERS registry is consulted first when configured; a registry miss or failure
    /// falls back to scanning every partition of `hint` (or of every type). A registry
    /// entry outside the hinted type is ignored.
    pub async fn lookup(
        &self,
        id: &str,
        hint: Option<&TypeSelection>,
        release: Option<&str>,
    ) -> Result<LookupHit> {
        let release = self.resolve_release(release).await?;
        let logical_type = release.resolve_type(hint.unwrap_or(&TypeSelection::All))?;

        if let Some(registry) = &self.registry {
            match registry.lookup(id, &release).await {
                Ok(Some(entry))
                    if !logical_type.roots.iter().any(|r| r.contains(&entry.path)) =>
                {
                    log::debug!(
                        "registry places {id} in {}, outside {}; scanning instead",
                        entry.path,
                        logical_type.name
                    );
                }
                Ok(Some(entry)) => {
                    let partition = Partition {
                        path: entry.path,
                        size: None,
                        extent: entry.bbox,
                    };
                    log::debug!("registry places {id} in {}", partition.path);
                    match self.first_match(id, std::slice::from_ref(&partition)).await {
                        Ok(Some((path, record))) => {
                            return Ok(LookupHit {
                                release,
                                partition: path,
                                record,
                            });
                        }
                        Ok(None) => log::warn!(
                            "registry entry for {id} points at {} which does not hold it",
                            partition.path
                        ),
                        Err(e) => log::warn!("reading registry partition failed: {e}"),
                    }
                }
                Ok(None) => log::debug!("{id} is not in the registry"),
                Err(e) => log::warn!("registry unavailable, scanning partitions instead: {e}"),
            }
        }

        let partitions = PartitionPruner::new(self.store.clone(), None)
            .list_all(&logical_type.roots)
            .await?;
        log::info!(
            "scanning {} partitions of {} for {id}",
            partitions.len(),
            logical_type.name
        );
        match self.first_match(id, &partitions).await? {
            Some((path, record)) => Ok(LookupHit {
                release,
                partition: path,
                record,
            }),
            None => Err(Error::NotFound { id: id.to_string() }),
        }
    }

    async fn first_match(
        &self,
        id: &str,
        partitions: &[Partition],
    ) -> Result<Option<(String, RecordBatch)>> {
        let pruner = StatisticsPruner::new(None, Some(id.to_string()), true);
        let filter = RowFilter::for_query(None, Some(id));
        let mut scanned = Box::pin(self.scan(partitions, &pruner, &filter, DEFAULT_BATCH_SIZE));
        let mut current = String::new();
        while let Some(item) = scanned.try_next().await? {
            match item {
                Scanned::Partition { path, .. } => current = path,
                Scanned::Batch(batch) => {
                    log::info!("found {id} in {current}");
                    return Ok(Some((current, batch.slice(0, 1))));
                }
            }
        }
        Ok(None)
    }
}
