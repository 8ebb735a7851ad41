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

//! GERS registry: direct id → partition lookup.
//!
//! The registry is a set of parquet files sorted by `id`, stored under `registry/` in
//! the bucket. Each row holds `id`, the data file `path` relative to the release and
//! the feature `bbox`. A small JSON manifest on the STAC host lists the files and the
//! inclusive id range each one covers:
//!
//! ```json
//! { "files": ["part-0.parquet", "part-1.parquet"],
//!   "bounds": [["0000...", "7fff..."], ["8000...", "ffff..."]] }
//! ```

use super::CatalogError;
use crate::error::Result;
use crate::geo::BoundingBox;
use crate::pruning::{RowFilter, StatisticsPruner};
use crate::release::Release;
use crate::storage::{DEFAULT_BATCH_SIZE, Partition, PartitionStore};
use arrow::array::{Array, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type};
use arrow::record_batch::RecordBatch;
use futures_util::TryStreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::OnceCell;
use url::Url;

const MANIFEST_FILE: &str = "registry-manifest.json";

/// Registry file listing and the id range of each file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegistryManifest {
    pub files: Vec<String>,
    pub bounds: Vec<[String; 2]>,
}

impl RegistryManifest {
    /// File whose id range contains `id`.
    pub fn file_for(&self, id: &str) -> Option<&str> {
        self.bounds
            .iter()
            .zip(&self.files)
            .find(|([min, max], _)| min.as_str() <= id && id <= max.as_str())
            .map(|(_, file)| file.as_str())
    }
}

/// Where the registry says a feature lives.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub id: String,
    /// Data file key, under the release base
    pub path: String,
    pub bbox: Option<BoundingBox>,
}

/// Registry accelerator used by identifier lookup.
#[derive(Debug, Clone)]
pub struct GersRegistry {
    client: reqwest::Client,
    manifest_url: Option<Url>,
    manifest: Arc<OnceCell<RegistryManifest>>,
    store: Arc<dyn PartitionStore>,
    prefix: String,
}

impl GersRegistry {
    /// Registry whose manifest is fetched from `<stac>/registry-manifest.json`.
    pub fn new(
        client: reqwest::Client,
        stac_base: &Url,
        store: Arc<dyn PartitionStore>,
        prefix: impl Into<String>,
    ) -> std::result::Result<Self, CatalogError> {
        let mut base = stac_base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client,
            manifest_url: Some(base.join(MANIFEST_FILE)?),
            manifest: Arc::new(OnceCell::new()),
            store,
            prefix: prefix.into(),
        })
    }

    /// Registry with a known manifest; nothing is fetched over HTTP.
    pub fn with_manifest(
        manifest: RegistryManifest,
        store: Arc<dyn PartitionStore>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            manifest_url: None,
            manifest: Arc::new(OnceCell::new_with(Some(manifest))),
            store,
            prefix: prefix.into(),
        }
    }

    async fn manifest(&self) -> std::result::Result<&RegistryManifest, CatalogError> {
        self.manifest
            .get_or_try_init(|| async {
                let url = self
                    .manifest_url
                    .clone()
                    .ok_or_else(|| CatalogError::Unavailable("no manifest url".to_string()))?;
                log::debug!("fetching registry manifest {url}");
                let response = self.client.get(url.clone()).send().await?;
                if !response.status().is_success() {
                    return Err(CatalogError::Status {
                        status: response.status().as_u16(),
                        url: url.to_string(),
                    });
                }
                let manifest: RegistryManifest = serde_json::from_slice(&response.bytes().await?)?;
                if manifest.files.len() != manifest.bounds.len() {
                    return Err(CatalogError::Malformed(format!(
                        "{} registry files but {} bounds",
                        manifest.files.len(),
                        manifest.bounds.len()
                    )));
                }
                Ok(manifest)
            })
            .await
    }

    /// Locate `id` in `release`. `Ok(None)` means the registry has no such id.
    pub async fn lookup(&self, id: &str, release: &Release) -> Result<Option<RegistryEntry>> {
        let manifest = self.manifest().await?;
        let Some(file) = manifest.file_for(id) else {
            log::debug!("id {id} is outside every registry file range");
            return Ok(None);
        };

        let partition = Partition::new(format!("{}/{}", self.prefix.trim_end_matches('/'), file));
        let stats = self.store.row_group_stats(&partition).await?;
        let (row_groups, _) =
            StatisticsPruner::new(None, Some(id.to_string()), true).select_row_groups(&stats);
        let filter = RowFilter::for_query(None, Some(id));
        let mut batches = self
            .store
            .read_batches(&partition, &stats, row_groups, DEFAULT_BATCH_SIZE)
            .await?;
        while let Some(batch) = batches.try_next().await? {
            if let Some(hit) = filter.apply(&batch)? {
                return entry_from_row(id, &hit, release);
            }
        }
        Ok(None)
    }
}

fn entry_from_row(
    id: &str,
    batch: &RecordBatch,
    release: &Release,
) -> Result<Option<RegistryEntry>> {
    let Some(path) = batch.column_by_name("path") else {
        return Ok(None);
    };
    let path = cast(path, &DataType::Utf8)?;
    let path = path.as_string::<i32>();
    if path.is_null(0) {
        return Ok(None);
    }

    let bbox = match batch.column_by_name("bbox").and_then(|b| b.as_struct_opt()) {
        Some(bbox) if bbox.is_valid(0) => {
            let mut values = [0f64; 4];
            let mut complete = true;
            for (slot, name) in values.iter_mut().zip(["xmin", "ymin", "xmax", "ymax"]) {
                match bbox.column_by_name(name) {
                    Some(leaf) if leaf.is_valid(0) => {
                        *slot = cast(leaf, &DataType::Float64)?
                            .as_primitive::<Float64Type>()
                            .value(0);
                    }
                    _ => complete = false,
                }
            }
            let [w, s, e, n] = values;
            complete
                .then(|| BoundingBox::from_envelope(w, s, e, n))
                .flatten()
        }
        _ => None,
    };

    Ok(Some(RegistryEntry {
        id: id.to_string(),
        path: format!("{}/{}", release.base(), path.value(0).trim_start_matches('/')),
        bbox,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> RegistryManifest {
        serde_json::from_str(
            r#"{"files": ["a.parquet", "b.parquet"],
                "bounds": [["0", "7fffffff"], ["80000000", "ffffffff"]]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_file_for() {
        let m = manifest();
        assert_eq!(m.file_for("12345678"), Some("a.parquet"));
        assert_eq!(m.file_for("80000000"), Some("b.parquet"));
        assert_eq!(m.file_for("ffffffff"), Some("b.parquet"));
        assert_eq!(m.file_for("g"), None);
    }

    #[test]
    fn test_new_builds_manifest_url() {
        #[derive(Debug)]
        struct NoStore;
        #[async_trait::async_trait]
        impl PartitionStore for NoStore {
            async fn list_releases(&self) -> Result<Vec<String>> {
                Ok(vec![])
            }
            async fn list(&self, _: &crate::release::PartitionRoot) -> Result<Vec<Partition>> {
                Ok(vec![])
            }
            async fn row_group_stats(
                &self,
                _: &Partition,
            ) -> Result<crate::storage::PartitionStats> {
                Err(crate::error::Error::NotFound { id: String::new() })
            }
            async fn read_batches(
                &self,
                _: &Partition,
                _: &crate::storage::PartitionStats,
                _: Vec<usize>,
                _: usize,
            ) -> Result<crate::storage::BatchStream> {
                Err(crate::error::Error::NotFound { id: String::new() })
            }
        }

        let registry = GersRegistry::new(
            reqwest::Client::new(),
            &Url::parse("https://stac.overturemaps.org").unwrap(),
            Arc::new(NoStore),
            "registry",
        )
        .unwrap();
        assert_eq!(
            registry.manifest_url.unwrap().as_str(),
            "https://stac.overturemaps.org/registry-manifest.json"
        );
    }
}
