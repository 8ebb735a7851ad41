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

//! # Overture Maps extraction (`overturemaps`)
//!
//! This crate streams a bounded (or unbounded) subset of an Overture Maps GeoParquet
//! release out of object storage, reading as little of the dataset as possible.
//!
//! Data flows through a pull-based pipeline:
//!
//! 1. [`release::ReleaseResolver`] picks the release and maps a type name to partition roots
//! 2. [`pruning::PartitionPruner`] selects partitions, using a [`catalog::PartitionCatalog`]
//!    when one is available and falling back to a full listing otherwise
//! 3. [`pruning::StatisticsPruner`] skips row groups whose bbox statistics miss the query
//! 4. [`pruning::RowFilter`] re-checks every record's envelope exactly
//! 5. [`sink::FeatureSink`] encodes the surviving records as GeoJSON, GeoJSONSeq or GeoParquet
//!
//! The same machinery serves point lookups by GERS id ([`extract::Extractor::lookup`]).
//!
//! ## Basic Usage
//!
//! ```no_run
//! use overturemaps::config::{CatalogConfig, StorageConfig};
//! use overturemaps::extract::{Extractor, StreamingQuery, TypeSelection};
//! use overturemaps::geo::BoundingBox;
//! use overturemaps::sink::{FeatureSink, OutputFormat, OutputTarget};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), overturemaps::error::Error> {
//!     let catalog = CatalogConfig::from_env()?;
//!     let extractor = Extractor::from_config(&StorageConfig::from_env(), &catalog)?;
//!
//!     let query = StreamingQuery::builder()
//!         .bbox("-71.068,42.353,-71.058,42.363".parse::<BoundingBox>()?)
//!         .types(TypeSelection::Named("building".into()))
//!         .format(OutputFormat::GeoJsonSeq)
//!         .build();
//!
//!     let mut sink = FeatureSink::open(query.format, OutputTarget::stdout());
//!     let summary = extractor.download(&query, &mut sink).await?;
//!     log::info!("wrote {} features", summary.rows_written);
//!     Ok(())
//! }
//! ```

#![allow(clippy::result_large_err)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod geo;
pub mod pruning;
pub mod release;
pub mod sink;
pub mod storage;

#[cfg(test)]
#[macro_use]
extern crate quickcheck;
