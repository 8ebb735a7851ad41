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

//! Storage and catalog configuration.
//!
//! Both configs have public-dataset defaults and can be read from the environment:
//!
//! | Variable | Default |
//! |---|---|
//! | `OVERTURE_BUCKET` | `overturemaps-us-west-2` |
//! | `OVERTURE_REGION` | `us-west-2` |
//! | `OVERTURE_ENDPOINT` | AWS |
//! | `OVERTURE_ANONYMOUS` | `true` |
//! | `OVERTURE_STAC_URL` | `https://stac.overturemaps.org` |
//! | `OVERTURE_CONNECT_TIMEOUT` | none (seconds) |
//! | `OVERTURE_REQUEST_TIMEOUT` | none (seconds) |

use crate::catalog::CatalogError;
use crate::error::Result;
use std::time::Duration;
use typed_builder::TypedBuilder;
use url::Url;

pub const DEFAULT_BUCKET: &str = "overturemaps-us-west-2";
pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_STAC_URL: &str = "https://stac.overturemaps.org";
pub const DEFAULT_REGISTRY_PREFIX: &str = "registry";

fn env_or(key: &str, default: &str) -> String {
    let value = std::env::var(key).unwrap_or(default.to_string());
    log::debug!("{key}={value}");
    value
}

fn env_seconds(key: &str) -> Option<Duration> {
    let value = std::env::var(key).ok()?;
    match value.parse::<f64>() {
        Ok(secs) if secs > 0.0 && secs.is_finite() => Some(Duration::from_secs_f64(secs)),
        _ => {
            log::warn!("ignoring {key}={value}: expected a positive number of seconds");
            None
        }
    }
}

/// Where the dataset lives and how to reach it.
#[derive(Clone, Debug, TypedBuilder)]
pub struct StorageConfig {
    #[builder(default = DEFAULT_BUCKET.to_string(), setter(into))]
    pub bucket: String,
    #[builder(default = DEFAULT_REGION.to_string(), setter(into))]
    pub region: String,
    /// Skip request signing
    #[builder(default = true)]
    pub anonymous: bool,
    /// Custom S3 endpoint (MinIO, LocalStack, ...)
    #[builder(default, setter(strip_option, into))]
    pub endpoint: Option<String>,
    #[builder(default, setter(strip_option))]
    pub connect_timeout: Option<Duration>,
    #[builder(default, setter(strip_option))]
    pub request_timeout: Option<Duration>,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let anonymous: bool = env_or("OVERTURE_ANONYMOUS", "true")
            .parse()
            .unwrap_or(true);
        Self {
            bucket: env_or("OVERTURE_BUCKET", DEFAULT_BUCKET),
            region: env_or("OVERTURE_REGION", DEFAULT_REGION),
            anonymous,
            endpoint: std::env::var("OVERTURE_ENDPOINT").ok(),
            connect_timeout: env_seconds("OVERTURE_CONNECT_TIMEOUT"),
            request_timeout: env_seconds("OVERTURE_REQUEST_TIMEOUT"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Spatial catalog and GERS registry settings.
#[derive(Clone, Debug, TypedBuilder)]
pub struct CatalogConfig {
    #[builder(default = DEFAULT_STAC_URL.to_string(), setter(into))]
    pub stac_url: String,
    /// Use the STAC index for partition pruning
    #[builder(default = true)]
    pub enabled: bool,
    /// Use the GERS registry for identifier lookups
    #[builder(default = true)]
    pub registry: bool,
    /// Registry parquet files, relative to the bucket
    #[builder(default = DEFAULT_REGISTRY_PREFIX.to_string(), setter(into))]
    pub registry_prefix: String,
    #[builder(default, setter(strip_option))]
    pub connect_timeout: Option<Duration>,
    #[builder(default, setter(strip_option))]
    pub request_timeout: Option<Duration>,
}

impl CatalogConfig {
    /// Read the environment; fails only when `OVERTURE_STAC_URL` is not a URL.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            stac_url: env_or("OVERTURE_STAC_URL", DEFAULT_STAC_URL),
            enabled: true,
            registry: true,
            registry_prefix: DEFAULT_REGISTRY_PREFIX.to_string(),
            connect_timeout: env_seconds("OVERTURE_CONNECT_TIMEOUT"),
            request_timeout: env_seconds("OVERTURE_REQUEST_TIMEOUT"),
        };
        config.stac_base()?;
        Ok(config)
    }

    pub fn stac_base(&self) -> Result<Url> {
        Ok(Url::parse(&self.stac_url).map_err(CatalogError::from)?)
    }

    /// HTTP client for the STAC host; timeouts are applied as given and never retried.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("overturemaps-rs/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
