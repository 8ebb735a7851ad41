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

//! Conservative-then-exact filtering of the dataset.
//!
//! Three stages narrow the data a query touches:
//!
//! - **Partition pruning** ([`PartitionPruner`]): catalog extents or a full listing
//! - **Row-group pruning** ([`StatisticsPruner`]): `bbox.*` and `id` footer statistics
//! - **Row filtering** ([`RowFilter`]): exact envelope or identifier test per record
//!
//! The first two may keep data that turns out not to match; only the last one decides.

pub mod column_statistics;
pub mod partition_pruning;
pub mod row_filter;

pub use column_statistics::{StatisticsPruner, summarize_row_groups};
pub use partition_pruning::{PartitionPruner, PartitionSelection, PruningSource};
pub use row_filter::{RowFilter, RowPredicate};

/// Counts of one pruning decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruningStats {
    /// Candidates before pruning
    pub total: usize,
    /// Candidates kept
    pub retained: usize,
    /// Candidates skipped
    pub eliminated: usize,
}

impl PruningStats {
    pub fn new(total: usize, retained: usize) -> Self {
        Self {
            total,
            retained,
            eliminated: total.saturating_sub(retained),
        }
    }

    /// Calculate elimination percentage
    pub fn elimination_percentage(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            (self.eliminated as f32 / self.total as f32) * 100.0
        }
    }

    /// Sum of two decisions, used to total row groups across partitions.
    pub fn merge(&mut self, other: &PruningStats) {
        self.total += other.total;
        self.retained += other.retained;
        self.eliminated += other.eliminated;
    }
}
