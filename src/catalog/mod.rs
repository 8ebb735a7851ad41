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

//! Spatial catalogs: services that know which partitions cover which area.
//!
//! A catalog is an optimisation. Callers must tolerate any [`CatalogError`] by falling
//! back to listing the partition roots.

pub mod gers;
pub mod stac;

pub use gers::{GersRegistry, RegistryEntry};
pub use stac::StacCatalog;

use crate::geo::BoundingBox;
use crate::release::{PartitionRoot, Release};
use crate::storage::Partition;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Failures of a catalog collaborator
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("catalog returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("malformed catalog index: {0}")]
    Malformed(String),
    #[error("catalog index could not be decoded: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("catalog index could not be decoded: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("catalog manifest could not be decoded: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid catalog url: {0}")]
    Url(#[from] url::ParseError),
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Maps a bbox to the partitions whose extent intersects it.
#[async_trait]
pub trait PartitionCatalog: Send + Sync + fmt::Debug {
    /// Partitions of `release` under `roots` that may intersect `bbox`.
    ///
    /// Results may over-select; they are filtered again by the pruner.
    async fn query(
        &self,
        release: &Release,
        roots: &[PartitionRoot],
        bbox: &BoundingBox,
    ) -> Result<Vec<Partition>, CatalogError>;
}
