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

use crate::fixtures::{
    FixtureFeature, extent_of, feature_batch, registry_batch, write_parquet,
};
use crate::recording_store::RecordingStore;
use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use overturemaps::catalog::gers::RegistryManifest;
use overturemaps::catalog::stac::StacItem;
use overturemaps::catalog::{GersRegistry, StacCatalog};
use overturemaps::extract::Extractor;
use overturemaps::geo::BoundingBox;
use overturemaps::release::Release;
use overturemaps::storage::{ObjectStorePartitionStore, PartitionStore};
use std::sync::Arc;
use url::Url;

pub const LATEST_RELEASE: &str = "2025-10-22.0";
pub const PREVIOUS_RELEASE: &str = "2025-09-24.0";
pub const REGISTRY_PREFIX: &str = "registry";
pub const REGISTRY_FILE: &str = "registry-00000.parquet";

/// Downtown Boston; covers part of the Boston buildings and places.
pub const BOSTON: [f64; 4] = [-71.065, 42.355, -71.055, 42.365];
/// Open Atlantic; nothing there.
pub const MID_OCEAN: [f64; 4] = [-40.0, 30.0, -39.0, 31.0];
/// Fiji, crossing the antimeridian.
pub const FIJI: [f64; 4] = [179.0, -18.5, -179.0, -16.5];

pub fn bbox(b: [f64; 4]) -> BoundingBox {
    BoundingBox::new(b[0], b[1], b[2], b[3]).unwrap()
}

/// One partition of the fixture and what is in it.
#[derive(Debug, Clone)]
pub struct FixturePartition {
    pub path: String,
    pub features: Vec<FixtureFeature>,
    pub extent: BoundingBox,
}

impl FixturePartition {
    pub fn type_name(&self) -> &str {
        self.path
            .split('/')
            .find_map(|p| p.strip_prefix("type="))
            .unwrap()
    }
}

/// In-memory dataset laid out like the public bucket.
pub struct TestContext {
    pub memory: Arc<InMemory>,
    pub store: Arc<RecordingStore>,
    pub partitions: Vec<FixturePartition>,
    pub row_group_size: usize,
}

fn grid(prefix: &str, x: f64, y: f64, step: f64, n: usize) -> Vec<FixtureFeature> {
    (0..n * n)
        .map(|i| {
            let (col, row) = ((i % n) as f64, (i / n) as f64);
            FixtureFeature::square(
                &format!("{prefix}{i:04}"),
                x + col * step,
                y + row * step,
                step / 8.0,
                (i % 3 != 0).then_some(10.0 + i as f64),
            )
        })
        .collect()
}

fn latest_partitions() -> Vec<(String, Vec<FixtureFeature>)> {
    let buildings = format!("release/{LATEST_RELEASE}/theme=buildings/type=building");
    let places = format!("release/{LATEST_RELEASE}/theme=places/type=place");

    let mut mixed = grid("08b2a3", -71.061, 42.361, 0.002, 2);
    mixed.extend(grid("08b194", -0.13, 51.5, 0.01, 2));

    vec![
        // Boston grid, spanning in and around BOSTON
        (
            format!("{buildings}/part-00000.parquet"),
            grid("08b2a1", -71.07, 42.35, 0.004, 5),
        ),
        // Washington DC
        (
            format!("{buildings}/part-00001.parquet"),
            grid("08b2aa", -77.04, 38.89, 0.003, 3),
        ),
        // Fiji, both sides of the antimeridian
        (
            format!("{buildings}/part-00002.parquet"),
            vec![
                FixtureFeature::square("08b9b6000001", 179.95, -17.0, 0.01, None),
                FixtureFeature::square("08b9b6000002", -179.95, -16.9, 0.01, Some(4.0)),
                FixtureFeature::square("08b9b6000003", 178.4, -18.1, 0.01, None),
                FixtureFeature::square("08b9b6000004", 177.0, -17.5, 0.01, None),
            ],
        ),
        // Boston and London in one file
        (format!("{buildings}/part-00003.parquet"), mixed),
        (
            format!("{places}/part-00000.parquet"),
            vec![
                FixtureFeature::point("08f2a1000001", -71.058, 42.360, Some("Cafe Luna")),
                FixtureFeature::point("08f2a1000002", -71.062, 42.358, Some("Old State House")),
                FixtureFeature::point("08f2a1000003", -71.100, 42.340, Some("Fenway")),
                FixtureFeature::point("08f2a1000004", -71.056, 42.364, None),
            ],
        ),
        (
            format!("{places}/part-00001.parquet"),
            vec![
                FixtureFeature::point("08f1fb000001", 2.35, 48.85, Some("Notre-Dame")),
                FixtureFeature::point("08f1fb000002", 2.29, 48.86, Some("Tour Eiffel")),
            ],
        ),
    ]
}

fn previous_partitions() -> Vec<(String, Vec<FixtureFeature>)> {
    vec![(
        format!("release/{PREVIOUS_RELEASE}/theme=buildings/type=building/part-00000.parquet"),
        grid("08b2a0", -71.06, 42.36, 0.004, 2),
    )]
}

impl TestContext {
    /// Build the fixture. `OVERTURE_FIXTURE_ROW_GROUP_SIZE` overrides the rows per group.
    pub async fn new() -> Self {
        const DEFAULT_ROW_GROUP_SIZE: &str = "3";
        let row_group_size: usize = std::env::var("OVERTURE_FIXTURE_ROW_GROUP_SIZE")
            .unwrap_or(DEFAULT_ROW_GROUP_SIZE.to_string())
            .parse()
            .unwrap_or(3);
        log::debug!("OVERTURE_FIXTURE_ROW_GROUP_SIZE={row_group_size}");

        let memory = Arc::new(InMemory::new());
        let mut partitions = Vec::new();
        for (path, features) in latest_partitions().into_iter().chain(previous_partitions()) {
            let bytes = write_parquet(&feature_batch(&features), row_group_size);
            put(&memory, &path, bytes).await;
            partitions.push(FixturePartition {
                extent: extent_of(&features).unwrap(),
                path,
                features,
            });
        }
        // stray objects that are not partitions
        put(
            &memory,
            &format!("release/{LATEST_RELEASE}/theme=buildings/type=building/_SUCCESS"),
            Bytes::new(),
        )
        .await;
        put(&memory, "release/scratch/README", Bytes::from_static(b"x")).await;

        let ctx = Self {
            store: Arc::new(RecordingStore::new(Arc::new(ObjectStorePartitionStore::new(
                memory.clone(),
            )))),
            memory,
            partitions,
            row_group_size,
        };
        put(
            &ctx.memory,
            &format!("{REGISTRY_PREFIX}/{REGISTRY_FILE}"),
            write_parquet(&registry_batch(&ctx.registry_entries()), row_group_size),
        )
        .await;
        ctx
    }

    pub fn release(&self) -> Release {
        Release::pinned(LATEST_RELEASE).unwrap()
    }

    /// Partitions of the latest release holding `type_name`, in path order.
    pub fn partitions_of(&self, type_name: &str) -> Vec<&FixturePartition> {
        let prefix = format!("release/{LATEST_RELEASE}/");
        let mut found: Vec<&FixturePartition> = self
            .partitions
            .iter()
            .filter(|p| p.path.starts_with(&prefix) && p.type_name() == type_name)
            .collect();
        found.sort_by(|a, b| a.path.cmp(&b.path));
        found
    }

    /// Features of `type_name` in the latest release, in partition then row order.
    pub fn features_of(&self, type_name: &str) -> Vec<&FixtureFeature> {
        self.partitions_of(type_name)
            .into_iter()
            .flat_map(|p| p.features.iter())
            .collect()
    }

    /// Ids of `type_name` features whose envelope intersects `query`, in read order.
    pub fn expected_ids(&self, type_name: &str, query: &BoundingBox) -> Vec<String> {
        self.features_of(type_name)
            .into_iter()
            .filter(|f| f.envelope().intersects(query))
            .map(|f| f.id.clone())
            .collect()
    }

    fn registry_entries(&self) -> Vec<(String, String, [f64; 4])> {
        let base = format!("release/{LATEST_RELEASE}/");
        self.partitions
            .iter()
            .filter_map(|p| p.path.strip_prefix(&base).map(|rel| (rel.to_string(), p)))
            .flat_map(|(rel, p)| {
                p.features
                    .iter()
                    .map(move |f| (f.id.clone(), rel.clone(), f.bbox))
            })
            .collect()
    }

    pub fn partition_store(&self) -> Arc<dyn PartitionStore> {
        self.store.clone()
    }

    /// Extractor over the fixture without catalog or registry.
    pub fn extractor(&self) -> Extractor {
        Extractor::new(self.partition_store())
    }

    /// STAC catalog preloaded with the latest release; never touches the network.
    pub async fn stac_catalog(&self) -> StacCatalog {
        let catalog = StacCatalog::new(
            reqwest::Client::new(),
            Url::parse("http://127.0.0.1:9/stac").unwrap(),
        );
        let items = self
            .partitions
            .iter()
            .map(|p| StacItem {
                collection: Some(p.type_name().to_string()),
                path: p.path.clone(),
                bbox: Some(p.extent),
            })
            .collect();
        catalog.preload(&self.release(), items).await;
        catalog
    }

    /// Registry over the fixture's `registry/` files with an inline manifest.
    pub fn registry(&self) -> GersRegistry {
        let mut ids: Vec<String> = self.registry_entries().into_iter().map(|e| e.0).collect();
        ids.sort();
        let manifest = RegistryManifest {
            files: vec![REGISTRY_FILE.to_string()],
            bounds: vec![[ids[0].clone(), ids[ids.len() - 1].clone()]],
        };
        GersRegistry::with_manifest(manifest, self.partition_store(), REGISTRY_PREFIX)
    }
}

pub async fn put(memory: &InMemory, key: &str, bytes: Bytes) {
    memory
        .put(&Path::from(key), PutPayload::from(bytes))
        .await
        .unwrap();
}
