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

//! Error definitions for extraction operations

use crate::catalog::CatalogError;
use crate::geo::WkbError;
use thiserror::Error;

/// Errors raised while resolving, pruning, reading or writing an extraction.
///
/// Catalog failures are absorbed by the partition pruner and only surface here when a
/// caller talks to a catalog directly.
#[derive(Debug, Error)]
pub enum Error {
    /// No dataset release could be resolved
    #[error("no release found: {reason}")]
    ReleaseNotFound {
        /// What went wrong while resolving
        reason: String,
    },
    /// Release version string is not of the form `YYYY-MM-DD.N`
    #[error("invalid release version '{0}'")]
    InvalidRelease(String),
    /// Type name is not in the theme/type table and no override was given
    #[error("unknown type '{name}'; expected one of: {expected}")]
    UnknownType {
        /// The requested type name
        name: String,
        /// Comma separated list of known types
        expected: String,
    },
    /// Bounding box could not be parsed or violates its invariants
    #[error("invalid bbox: {0}")]
    InvalidBbox(String),

    /// Spatial catalog failure
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    /// Object store failure (connection, read, timeout)
    #[error("storage error: {0}")]
    Storage(#[from] object_store::Error),
    /// Parquet decoding or encoding failure
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    /// Arrow compute or conversion failure
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    /// Local I/O failure while writing output
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// HTTP failure talking to the catalog service
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// JSON encoding or decoding failure
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Geometry could not be decoded
    #[error("invalid geometry: {0}")]
    Wkb(#[from] WkbError),

    /// Identifier lookup scanned every candidate partition without a match
    #[error("no feature found with id '{id}'")]
    NotFound {
        /// The identifier that was looked up
        id: String,
    },
    /// A sink was used outside of its `Open -> Writing -> Closed` lifecycle
    #[error("sink state violation: {0}")]
    SinkState(String),
}

impl Error {
    /// Returns true for the expected "identifier absent" outcome of a lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
