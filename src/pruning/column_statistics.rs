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

//! Row-group pruning from parquet footer statistics.
//!
//! Every Overture record carries a `bbox` struct (`xmin`, `ymin`, `xmax`, `ymax`). The
//! column chunk statistics of those four leaves give a conservative envelope per row
//! group:
//!
//! ```text
//! (min(bbox.xmin), min(bbox.ymin), max(bbox.xmax), max(bbox.ymax))
//! ```
//!
//! A row group whose envelope does not intersect the query box cannot contain a
//! matching record and is never fetched. The same idea applies to identifier lookups
//! using the min/max statistics of the `id` column.
//!
//! # Missing statistics
//!
//! Statistics are optional in parquet. Whenever a leaf is absent, has no min/max, or has
//! a physical type other than FLOAT/DOUBLE (BYTE_ARRAY for `id`), the row group is kept.

use super::PruningStats;
use crate::geo::BoundingBox;
use crate::storage::{PartitionStats, RowGroupSummary};
use parquet::file::metadata::{ParquetMetaData, RowGroupMetaData};
use parquet::file::statistics::Statistics;

const BBOX_XMIN: &str = "bbox.xmin";
const BBOX_YMIN: &str = "bbox.ymin";
const BBOX_XMAX: &str = "bbox.xmax";
const BBOX_YMAX: &str = "bbox.ymax";
const ID_COLUMN: &str = "id";

fn column_statistics<'a>(rg: &'a RowGroupMetaData, path: &str) -> Option<&'a Statistics> {
    rg.columns()
        .iter()
        .find(|c| c.column_path().string() == path)
        .and_then(|c| c.statistics())
}

fn float_bound(stats: Option<&Statistics>, max: bool) -> Option<f64> {
    match stats? {
        Statistics::Float(s) => {
            let v = if max { s.max_opt() } else { s.min_opt() };
            v.map(|v| *v as f64)
        }
        Statistics::Double(s) => {
            if max {
                s.max_opt().copied()
            } else {
                s.min_opt().copied()
            }
        }
        _ => None,
    }
}

fn string_range(stats: Option<&Statistics>) -> Option<(String, String)> {
    match stats? {
        Statistics::ByteArray(s) => {
            let min = s.min_opt()?.as_utf8().ok()?;
            let max = s.max_opt()?.as_utf8().ok()?;
            Some((min.to_string(), max.to_string()))
        }
        _ => None,
    }
}

fn summarize(index: usize, rg: &RowGroupMetaData) -> RowGroupSummary {
    let bbox = match (
        float_bound(column_statistics(rg, BBOX_XMIN), false),
        float_bound(column_statistics(rg, BBOX_YMIN), false),
        float_bound(column_statistics(rg, BBOX_XMAX), true),
        float_bound(column_statistics(rg, BBOX_YMAX), true),
    ) {
        (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) => {
            BoundingBox::from_envelope(min_x, min_y, max_x, max_y)
        }
        _ => None,
    };
    RowGroupSummary {
        index,
        num_rows: rg.num_rows(),
        bbox,
        id_range: string_range(column_statistics(rg, ID_COLUMN)),
    }
}

/// Summaries of every row group in a parquet footer, in file order.
pub fn summarize_row_groups(metadata: &ParquetMetaData) -> Vec<RowGroupSummary> {
    metadata
        .row_groups()
        .iter()
        .enumerate()
        .map(|(i, rg)| summarize(i, rg))
        .collect()
}

/// Decides which row groups of a partition to read.
#[derive(Debug, Clone)]
pub struct StatisticsPruner {
    bbox: Option<BoundingBox>,
    id: Option<String>,
    enabled: bool,
}

impl StatisticsPruner {
    pub fn new(bbox: Option<BoundingBox>, id: Option<String>, enabled: bool) -> Self {
        Self { bbox, id, enabled }
    }

    /// True when the row group may contain a matching record.
    pub fn may_match(&self, rg: &RowGroupSummary) -> bool {
        if !self.enabled {
            return true;
        }
        if let (Some(query), Some(envelope)) = (&self.bbox, &rg.bbox) {
            if !query.intersects(envelope) {
                return false;
            }
        }
        if let (Some(id), Some((min, max))) = (&self.id, &rg.id_range) {
            if id.as_str() < min.as_str() || id.as_str() > max.as_str() {
                return false;
            }
        }
        true
    }

    /// Indices of row groups to read, plus how many were skipped.
    pub fn select_row_groups(&self, stats: &PartitionStats) -> (Vec<usize>, PruningStats) {
        let selected: Vec<usize> = stats
            .row_groups
            .iter()
            .filter(|rg| self.may_match(rg))
            .map(|rg| rg.index)
            .collect();
        let pruning = PruningStats::new(stats.row_groups.len(), selected.len());
        (selected, pruning)
    }
}
