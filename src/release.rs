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

//! Release resolution and the theme/type table.
//!
//! A release is a dated snapshot stored under `release/<version>/` in the bucket.
//! Inside a release every logical type lives in its own hive-style partition root,
//! `theme=<theme>/type=<type>/`, holding one or more parquet files.

use crate::error::{Error, Result};
use crate::storage::PartitionStore;
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Prefix under which every release lives
pub const RELEASE_PREFIX: &str = "release";

/// Logical type name to theme, in the order types are scanned when no type is given.
pub const TYPE_THEME_MAP: &[(&str, &str)] = &[
    ("address", "addresses"),
    ("bathymetry", "base"),
    ("building", "buildings"),
    ("building_part", "buildings"),
    ("division", "divisions"),
    ("division_area", "divisions"),
    ("division_boundary", "divisions"),
    ("place", "places"),
    ("segment", "transportation"),
    ("connector", "transportation"),
    ("infrastructure", "base"),
    ("land", "base"),
    ("land_cover", "base"),
    ("land_use", "base"),
    ("water", "base"),
];

lazy_static! {
    static ref VERSION_REGEX: Regex =
        Regex::new(r"^(\d{4}-\d{2}-\d{2})(?:-([a-z]+))?\.(\d+)$").unwrap();
}

/// Theme owning `type_name`, if it is a known type.
pub fn theme_for_type(type_name: &str) -> Option<&'static str> {
    TYPE_THEME_MAP
        .iter()
        .find(|(t, _)| *t == type_name)
        .map(|(_, theme)| *theme)
}

/// Every known type name, in table order.
pub fn all_types() -> Vec<&'static str> {
    TYPE_THEME_MAP.iter().map(|(t, _)| *t).collect()
}

/// Ordering key of a version string. Parseable versions always sort after unparseable ones.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum VersionKey<'a> {
    Unparsed(&'a str),
    Parsed(NaiveDate, u32, &'a str),
}

impl<'a> VersionKey<'a> {
    fn of(version: &'a str) -> Self {
        let Some(caps) = VERSION_REGEX.captures(version) else {
            return VersionKey::Unparsed(version);
        };
        let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d");
        let seq = caps[3].parse::<u32>();
        match (date, seq) {
            (Ok(date), Ok(seq)) => VersionKey::Parsed(date, seq, version),
            _ => VersionKey::Unparsed(version),
        }
    }
}

/// Order two release versions: by date, then by the numeric suffix.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    VersionKey::of(a).cmp(&VersionKey::of(b))
}

/// The newest version in `versions`, if any.
pub fn latest_version<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    versions
        .into_iter()
        .map(String::as_str)
        .max_by(|a, b| compare_versions(a, b))
}

/// A resolved dataset snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    version: String,
}

impl Release {
    /// Validate a pinned version string. The release is not looked up in storage.
    pub fn pinned(version: &str) -> Result<Self> {
        if matches!(VersionKey::of(version), VersionKey::Unparsed(_)) {
            return Err(Error::InvalidRelease(version.to_string()));
        }
        Ok(Self {
            version: version.to_string(),
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// `release/<version>`
    pub fn base(&self) -> String {
        format!("{RELEASE_PREFIX}/{}", self.version)
    }

    pub fn root(&self, theme: &str, type_name: &str) -> PartitionRoot {
        PartitionRoot {
            theme: theme.to_string(),
            type_name: type_name.to_string(),
            prefix: format!("{}/theme={theme}/type={type_name}", self.base()),
        }
    }

    /// Map a type selection onto this release's partition roots.
    pub fn resolve_type(&self, selection: &TypeSelection) -> Result<LogicalType> {
        match selection {
            TypeSelection::Override { theme, type_name } => Ok(LogicalType {
                name: type_name.clone(),
                roots: vec![self.root(theme, type_name)],
            }),
            TypeSelection::Named(name) => match theme_for_type(name) {
                Some(theme) => Ok(LogicalType {
                    name: name.clone(),
                    roots: vec![self.root(theme, name)],
                }),
                None => Err(Error::UnknownType {
                    name: name.clone(),
                    expected: all_types().join(", "),
                }),
            },
            TypeSelection::All => Ok(LogicalType {
                name: "*".to_string(),
                roots: TYPE_THEME_MAP
                    .iter()
                    .map(|(type_name, theme)| self.root(theme, type_name))
                    .collect(),
            }),
        }
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.version)
    }
}

/// Location of one theme/type inside a release, without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRoot {
    pub theme: String,
    pub type_name: String,
    pub prefix: String,
}

impl PartitionRoot {
    /// True when `path` is an object somewhere below this root.
    pub fn contains(&self, path: &str) -> bool {
        path.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Which type(s) a query reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSelection {
    /// A type from [`TYPE_THEME_MAP`]
    Named(String),
    /// Explicit theme/type, bypassing the table
    Override { theme: String, type_name: String },
    /// Every type in table order
    All,
}

impl TypeSelection {
    /// Combine a type name with optional theme/type override flags.
    ///
    /// An explicit theme always wins over the table; a theme given with only a type name
    /// uses that name as the override type. Returns `None` when nothing usable was given.
    pub fn from_parts(
        name: Option<String>,
        theme: Option<String>,
        type_name: Option<String>,
    ) -> Option<Self> {
        match (name, theme, type_name) {
            (_, Some(theme), Some(type_name)) | (Some(type_name), Some(theme), None) => {
                Some(TypeSelection::Override { theme, type_name })
            }
            (Some(name), None, _) | (None, None, Some(name)) => Some(TypeSelection::Named(name)),
            (None, Some(_), None) => None,
            (None, None, None) => None,
        }
    }
}

/// A type name and the partition roots that hold it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalType {
    pub name: String,
    pub roots: Vec<PartitionRoot>,
}

/// Picks the release to read, pinned or latest.
#[derive(Debug, Clone)]
pub struct ReleaseResolver {
    store: Arc<dyn PartitionStore>,
}

impl ReleaseResolver {
    pub fn new(store: Arc<dyn PartitionStore>) -> Self {
        Self { store }
    }

    async fn listing(&self) -> Result<Vec<String>> {
        let mut names = self
            .store
            .list_releases()
            .await
            .map_err(|e| Error::ReleaseNotFound {
                reason: format!("listing {RELEASE_PREFIX}/ failed: {e}"),
            })?;
        names.sort_by(|a, b| compare_versions(a, b));
        Ok(names)
    }

    /// Every release version in storage, oldest first. Directories whose names are not
    /// versions are left out.
    pub async fn available(&self) -> Result<Vec<String>> {
        let mut versions = self.listing().await?;
        versions.retain(|v| !matches!(VersionKey::of(v), VersionKey::Unparsed(_)));
        Ok(versions)
    }

    /// Resolve `pin` as-is, or the newest release in storage when no pin is given.
    ///
    /// When storage holds no version-named directory at all, the last name in listing
    /// order is used instead.
    pub async fn resolve(&self, pin: Option<&str>) -> Result<Release> {
        if let Some(version) = pin {
            let release = Release::pinned(version)?;
            log::debug!("using pinned release {release}");
            return Ok(release);
        }
        let names = self.listing().await?;
        let latest = latest_version(&names).ok_or_else(|| Error::ReleaseNotFound {
            reason: format!("no versions under {RELEASE_PREFIX}/"),
        })?;
        if matches!(VersionKey::of(latest), VersionKey::Unparsed(_)) {
            log::warn!("no release version under {RELEASE_PREFIX}/, falling back to {latest}");
        } else {
            log::info!("resolved latest release {latest} ({} listed)", names.len());
        }
        Ok(Release {
            version: latest.to_string(),
        })
    }
}
